use crate::error::Error;
use flume::Sender;
use orchestrator::ControlEvent;
use tokio::signal::unix::{SignalKind, signal};

/// Indefinitely listens to signals and sends signal events to the provided channel.
pub async fn wait_for_signal(signal_event: &Sender<SignalEvent>) -> Result<(), Error> {
    let mut sigusr1 = signal(SignalKind::user_defined1()).map_err(Error::SignalHandler)?;
    let mut sigusr2 = signal(SignalKind::user_defined2()).map_err(Error::SignalHandler)?;

    loop {
        tokio::select! {
            _ = sigusr1.recv() => {
                signal_event.send_async(SignalEvent::SigUSR1).await?;
            }
            _ = sigusr2.recv() => {
                signal_event.send_async(SignalEvent::SigUSR2).await?;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    /// Dump recovery statistics.
    SigUSR1,
    /// Force emergency recovery.
    SigUSR2,
}

impl From<SignalEvent> for ControlEvent {
    fn from(event: SignalEvent) -> Self {
        match event {
            SignalEvent::SigUSR1 => Self::DumpStats,
            SignalEvent::SigUSR2 => Self::Emergency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signals_map_to_operator_commands() {
        assert_eq!(ControlEvent::from(SignalEvent::SigUSR1), ControlEvent::DumpStats);
        assert_eq!(ControlEvent::from(SignalEvent::SigUSR2), ControlEvent::Emergency);
    }
}
