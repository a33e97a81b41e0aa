use clap::Parser;
use config::Config;
use flume::bounded;
use immunity_rs::{cli::Cli, logging, signals::wait_for_signal};
use orchestrator::{Check, ImmunityEngine, Services};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.verbosity, cli.logfile.as_deref())?;

    debug!(config = ?cli);

    let mut config = match &cli.conffile {
        Some(path) => Config::load(path)?,
        _ => Config::new(),
    };
    cli.apply(&mut config);

    if let Some(path) = &cli.save_config {
        config.save(path)?;
        info!(?path, "effective configuration written");
    }

    // without a gateway and a host only the local checks can run
    if !config.monitor.features.is_empty() {
        warn!(
            features = config.monitor.features.len(),
            "no host attached, feature subsystem checks disabled"
        );
    }
    let engine = ImmunityEngine::with_checks(config, Services::standalone(), Check::local());

    let issues = engine.startup().await?;
    if !issues.is_empty() {
        warn!(?issues, "critical files needed repair at startup");
    }

    if cli.once {
        for result in engine.immunity_sweep().await? {
            info!(subsystem = result.check.subsystem(), status = %result.status, "check finished");
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let runner = tokio::spawn({
        let engine = engine.clone();
        let cancel = cancel.clone();
        async move { engine.run_until(cancel, control_rx).await }
    });

    let (events_tx, events_rx) = bounded(8);

    loop {
        tokio::select! {
            err = wait_for_signal(&events_tx) => {
                tracing::error!(error = ?err, "Error while waiting for signal");
                err?;
            }
            res = events_rx.recv_async() => {
                let event = res?;
                debug!(?event, "Received signal event");
                control_tx.send(event.into())?;
            }
            res = tokio::signal::ctrl_c() => {
                res?;
                info!("interrupted, shutting down");
                break;
            }
        }
    }

    cancel.cancel();
    runner.await??;
    Ok(())
}
