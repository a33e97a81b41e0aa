#![forbid(unsafe_code)]

use crate::clock::{Clock, SystemClock};
use crate::diagnostics::{Check, CheckResult, Diagnostics};
use crate::dispatcher::RepairDispatcher;
use crate::error::Error;
use crate::host::{Host, NoopHost, NoopTransport, Transport};
use crate::stats::{PerformanceMetrics, RecoveryStats};
use chrono::Utc;
use config::Config;
use humansize::{BINARY, format_size};
use kernel::{
    BackupArchive, BackupSnapshot, FileIssue, FileProblem, HealthRegistry, IntegrityGuard,
    KvStore, LogRotation, PatternLearner, Prediction, Problem, ProblemPattern, RecoveryLog,
    RepairOutcome, ResourceProbe, SysinfoProbe,
};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Missing critical files that turn a health sweep into an emergency.
pub const EMERGENCY_MISSING_FILES: usize = 2;

/// Free space below which the health sweep warns.
pub const LOW_DISK_BYTES: u64 = 1024 * 1024 * 1024;

/// Predictions above this confidence pre-escalate their problem.
pub const MAINTENANCE_CONFIDENCE: f32 = 0.7;

/// Fix success rate below which repeatedly failing problems are escalated.
pub const EFFECTIVENESS_FLOOR: f32 = 0.7;

/// Failed fixes a problem type may accumulate before that escalation.
pub const FAILURE_TOLERANCE: u32 = 3;

/// Pattern counts above this are reported by the learning sweep.
pub const PATTERN_REPORT_MIN: usize = 3;

pub const ERROR_PATTERNS_KEY: &str = "error_patterns";
pub const PERFORMANCE_METRICS_KEY: &str = "performance_metrics";

pub struct Services {
    pub transport: Arc<dyn Transport>,
    pub host: Arc<dyn Host>,
    pub probe: Arc<dyn ResourceProbe>,
    pub clock: Arc<dyn Clock>,
}

impl Services {
    /// No gateway and no host, real resource readings and wall time.
    pub fn standalone() -> Self {
        Self {
            transport: Arc::new(NoopTransport),
            host: Arc::new(NoopHost),
            probe: Arc::new(SysinfoProbe::new()),
            clock: Arc::new(SystemClock),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    DumpStats,
    Emergency,
    Reset(String),
}

/// The periodic jobs, each on its own timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sweep {
    Backup,
    Health,
    Immunity,
    Deep,
    Prediction,
    Learning,
    Log,
    Maintenance,
    Improvement,
}

impl Sweep {
    pub const ALL: [Self; 9] = [
        Self::Backup,
        Self::Health,
        Self::Immunity,
        Self::Deep,
        Self::Prediction,
        Self::Learning,
        Self::Log,
        Self::Maintenance,
        Self::Improvement,
    ];

    pub fn interval(self, monitor: &config::Monitor) -> Duration {
        match self {
            Self::Backup => monitor.backup_interval,
            Self::Health => monitor.health_interval,
            Self::Immunity => monitor.immunity_interval,
            Self::Deep => monitor.deep_interval,
            Self::Prediction => monitor.prediction_interval,
            Self::Learning => monitor.learning_interval,
            Self::Log => monitor.log_interval,
            Self::Maintenance => monitor.maintenance_interval,
            Self::Improvement => monitor.improvement_interval,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Backup => "backup",
            Self::Health => "health",
            Self::Immunity => "immunity",
            Self::Deep => "deep",
            Self::Prediction => "prediction",
            Self::Learning => "learning",
            Self::Log => "log",
            Self::Maintenance => "maintenance",
            Self::Improvement => "improvement",
        }
    }
}

impl fmt::Display for Sweep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmergencyReport {
    pub snapshot: Option<String>,
    pub recovered: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

struct EngineInner {
    config: Config,
    services: Services,
    registry: HealthRegistry,
    learner: PatternLearner,
    log: RecoveryLog,
    store: KvStore,
    guard: IntegrityGuard,
    rotation: LogRotation,
    diagnostics: Diagnostics,
    dispatcher: RepairDispatcher,
    // sweeps hold it shared, emergency recovery exclusively
    gate: RwLock<()>,
    paused: AtomicBool,
}

/// Owns every component and drives the sweeps. Cheap to clone.
#[derive(Clone)]
pub struct ImmunityEngine {
    inner: Arc<EngineInner>,
}

impl ImmunityEngine {
    pub fn new(config: Config, services: Services) -> Self {
        let checks = Check::defaults(&config.monitor);
        Self::with_checks(config, services, checks)
    }

    pub fn with_checks(config: Config, services: Services, checks: Vec<Check>) -> Self {
        let log = RecoveryLog::open(config.resolve(&config.persistence.journal_path));
        let store = KvStore::open(
            config
                .persistence
                .store_file()
                .map(|path| config.resolve(path)),
        );
        let archive = BackupArchive::from_config(&config);
        let guard = IntegrityGuard::from_config(&config, archive, log.clone());
        let registry = HealthRegistry::from_config(&config.recovery);
        let learner = PatternLearner::from_config(&config.recovery);
        let rotation = LogRotation::from_config(&config);

        let diagnostics = Diagnostics::new(
            checks,
            services.transport.clone(),
            services.host.clone(),
            services.probe.clone(),
            guard.clone(),
            config.monitor.memory,
            config.monitor.hook_timeout,
        );
        let dispatcher = RepairDispatcher::new(
            services.transport.clone(),
            services.host.clone(),
            services.probe.clone(),
            services.clock.clone(),
            registry.clone(),
            learner.clone(),
            log.clone(),
            guard.clone(),
            config.monitor.memory,
            config.monitor.hook_timeout,
            config.recovery.notify_channel,
        );

        Self {
            inner: Arc::new(EngineInner {
                config,
                services,
                registry,
                learner,
                log,
                store,
                guard,
                rotation,
                diagnostics,
                dispatcher,
                gate: RwLock::new(()),
                paused: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn registry(&self) -> &HealthRegistry {
        &self.inner.registry
    }

    pub fn learner(&self) -> &PatternLearner {
        &self.inner.learner
    }

    pub fn recovery_log(&self) -> &RecoveryLog {
        &self.inner.log
    }

    pub fn store(&self) -> &KvStore {
        &self.inner.store
    }

    pub fn guard(&self) -> &IntegrityGuard {
        &self.inner.guard
    }

    pub fn archive(&self) -> &BackupArchive {
        self.inner.guard.archive()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.inner.diagnostics
    }

    /// Whether emergency recovery currently holds the sweeps back.
    pub fn paused(&self) -> bool {
        self.inner.paused.load(Ordering::Acquire)
    }

    /// Snapshot once, then repair whatever the integrity check finds. Too
    /// many missing files go straight to emergency recovery.
    pub async fn startup(&self) -> Result<Vec<FileIssue>, Error> {
        if let Err(err) = self.backup_sweep().await {
            warn!(%err, "startup backup failed");
        }
        let issues = self.health_files().await?;
        info!(issues = issues.len(), "startup integrity check");
        Ok(issues)
    }

    /// Pause every sweep, snapshot, force-repair each missing or empty
    /// critical file, then resume.
    pub async fn emergency_recovery(&self) -> Result<EmergencyReport, Error> {
        let _pause = self.inner.gate.write().await;
        self.inner.paused.store(true, Ordering::Release);
        warn!("emergency recovery started, sweeps paused");

        let result = self.recover_files().await;

        self.inner.paused.store(false, Ordering::Release);
        match &result {
            Ok(report) => info!(
                recovered = report.recovered.len(),
                failed = report.failed.len(),
                "emergency recovery finished, sweeps resumed"
            ),
            Err(err) => error!(%err, "emergency recovery failed, sweeps resumed"),
        }
        result
    }

    async fn recover_files(&self) -> Result<EmergencyReport, Error> {
        let guard = self.inner.guard.clone();
        let report = tokio::task::spawn_blocking(move || {
            let snapshot = match guard.archive().snapshot() {
                Ok(snapshot) => Some(snapshot.id),
                Err(err) => {
                    warn!(%err, "emergency snapshot failed");
                    None
                }
            };
            let mut report = EmergencyReport {
                snapshot,
                ..Default::default()
            };
            for issue in guard.check_all() {
                if !matches!(issue.problem, FileProblem::Missing | FileProblem::Empty) {
                    continue;
                }
                match guard.force_repair(&issue.file, issue.problem) {
                    RepairOutcome::Repaired(_) => report.recovered.push(issue.file),
                    RepairOutcome::Skipped | RepairOutcome::Failed(_) => {
                        report.failed.push(issue.file)
                    }
                }
            }
            report
        })
        .await?;
        Ok(report)
    }

    pub async fn backup_sweep(&self) -> Result<BackupSnapshot, Error> {
        let _permit = self.inner.gate.read().await;
        let archive = self.archive().clone();
        let snapshot = tokio::task::spawn_blocking(move || archive.snapshot()).await??;
        Ok(snapshot)
    }

    /// Integrity check with repairs, a self-lookup probe and a disk space
    /// warning.
    pub async fn health_sweep(&self) -> Result<Vec<FileIssue>, Error> {
        let issues = self.health_files().await?;

        let _permit = self.inner.gate.read().await;
        let transport = &self.inner.services.transport;
        if transport.is_connected() {
            match tokio::time::timeout(self.inner.config.monitor.hook_timeout, transport.self_lookup())
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(%err, "self lookup failed"),
                Err(_) => warn!("self lookup timed out"),
            }
        }

        let probe = self.inner.services.probe.clone();
        let root = self.inner.config.files.root.clone();
        if let Some(free) = tokio::task::spawn_blocking(move || probe.disk_free(&root)).await?
            && free < LOW_DISK_BYTES
        {
            warn!(free = %format_size(free, BINARY), "low disk space");
        }
        Ok(issues)
    }

    async fn health_files(&self) -> Result<Vec<FileIssue>, Error> {
        let permit = self.inner.gate.read().await;
        let guard = self.inner.guard.clone();
        let issues = tokio::task::spawn_blocking(move || guard.check_all()).await?;

        let missing = issues
            .iter()
            .filter(|issue| issue.problem == FileProblem::Missing)
            .count();
        if missing >= EMERGENCY_MISSING_FILES {
            drop(permit);
            warn!(missing, "critical files missing");
            self.emergency_recovery().await?;
            return Ok(issues);
        }

        let guard = self.inner.guard.clone();
        let repair = issues.clone();
        tokio::task::spawn_blocking(move || {
            for issue in repair {
                guard.repair(&issue.file, issue.problem);
            }
        })
        .await?;
        Ok(issues)
    }

    /// One diagnostic cycle: record every result, feed problems to the
    /// learner and hand them to the dispatcher.
    pub async fn immunity_sweep(&self) -> Result<Vec<CheckResult>, Error> {
        let _permit = self.inner.gate.read().await;
        let results = self.inner.diagnostics.run_cycle().await;
        for result in &results {
            let subsystem = result.check.subsystem();
            self.inner.registry.record(subsystem, result.status);
            if let Some(problem) = result.status.problem() {
                self.inner.learner.observe(subsystem, problem);
                self.inner.dispatcher.try_fix(&result.check, problem).await;
            }
        }
        Ok(results)
    }

    /// System-wide memory pressure check.
    pub async fn deep_sweep(&self) -> Result<Option<f32>, Error> {
        let _permit = self.inner.gate.read().await;
        let probe = self.inner.services.probe.clone();
        let percent = tokio::task::spawn_blocking(move || probe.system_memory_percent()).await?;
        if let Some(percent) = percent
            && percent > self.inner.config.monitor.memory.system_pressure
        {
            warn!(percent, "system memory pressure, releasing memory");
            let release = self.inner.services.host.release_memory();
            match tokio::time::timeout(self.inner.config.monitor.hook_timeout, release).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(%err, "memory release failed"),
                Err(_) => warn!("memory release timed out"),
            }
        }
        Ok(percent)
    }

    pub async fn prediction_sweep(&self) -> Result<Vec<Prediction>, Error> {
        let _permit = self.inner.gate.read().await;
        let predictions = self.inner.learner.predict();
        for prediction in &predictions {
            info!(
                subsystem = %prediction.subsystem,
                problem = %prediction.problem,
                confidence = prediction.confidence,
                "problem likely to recur"
            );
        }
        Ok(predictions)
    }

    /// Pre-escalate confidently predicted problems. Returns the newly
    /// escalated ones.
    pub async fn maintenance_sweep(&self) -> Result<Vec<Problem>, Error> {
        let _permit = self.inner.gate.read().await;
        let mut escalated = Vec::new();
        for prediction in self.inner.learner.predict() {
            if prediction.confidence > MAINTENANCE_CONFIDENCE
                && self.inner.learner.escalate(prediction.problem)
            {
                info!(
                    subsystem = %prediction.subsystem,
                    problem = %prediction.problem,
                    confidence = prediction.confidence,
                    "would apply fix ahead of time, escalated instead"
                );
                escalated.push(prediction.problem);
            }
        }
        Ok(escalated)
    }

    /// Persist the frequency table under [`ERROR_PATTERNS_KEY`].
    pub async fn learning_sweep(&self) -> Result<Vec<ProblemPattern>, Error> {
        let _permit = self.inner.gate.read().await;
        let patterns = self.inner.learner.patterns();
        for pattern in patterns.iter().filter(|p| p.occurrences > PATTERN_REPORT_MIN) {
            info!(
                problem = %pattern.problem,
                occurrences = pattern.occurrences,
                escalated = pattern.escalated,
                "recurring problem"
            );
        }

        let table: BTreeMap<&str, usize> = patterns
            .iter()
            .map(|pattern| (pattern.problem.as_str(), pattern.occurrences))
            .collect();
        let value = serde_json::to_value(table).map_err(kernel::Error::from)?;
        let store = self.inner.store.clone();
        tokio::task::spawn_blocking(move || store.set(ERROR_PATTERNS_KEY, value)).await??;
        Ok(patterns)
    }

    /// Escalate problems whose fixes keep failing, persist performance
    /// metrics, compact history and enforce the total log budget.
    pub async fn improvement_sweep(&self) -> Result<PerformanceMetrics, Error> {
        let _permit = self.inner.gate.read().await;
        let learner = &self.inner.learner;
        let success_rate = learner.effectiveness();
        if let Some(rate) = success_rate
            && rate < EFFECTIVENESS_FLOOR
        {
            for problem in learner.failing_types(FAILURE_TOLERANCE) {
                if learner.escalate(problem) {
                    info!(%problem, rate, "fixes keep failing, escalated");
                }
            }
        }

        let compacted = learner.compact();
        if compacted > 0 {
            debug!(compacted, "problem history compacted");
        }

        let totals = learner.fix_totals();
        let metrics = PerformanceMetrics {
            fix_attempts: totals.total(),
            successful_fixes: totals.succeeded,
            failed_fixes: totals.failed,
            success_rate,
            history_len: learner.history_len(),
            updated_at: Utc::now(),
        };

        let store = self.inner.store.clone();
        let rotation = self.inner.rotation.clone();
        let value = serde_json::to_value(&metrics).map_err(kernel::Error::from)?;
        tokio::task::spawn_blocking(move || {
            rotation.sweep_total(Utc::now());
            store.set(PERFORMANCE_METRICS_KEY, value)
        })
        .await??;
        Ok(metrics)
    }

    /// Archive oversized log files.
    pub async fn log_sweep(&self) -> Result<Vec<PathBuf>, Error> {
        let _permit = self.inner.gate.read().await;
        let rotation = self.inner.rotation.clone();
        let archived = tokio::task::spawn_blocking(move || rotation.sweep(Utc::now())).await?;
        Ok(archived)
    }

    pub async fn run_sweep(&self, sweep: Sweep) -> Result<(), Error> {
        let span = info_span!("sweep", name = sweep.name());
        async {
            match sweep {
                Sweep::Backup => self.backup_sweep().await.map(drop),
                Sweep::Health => self.health_sweep().await.map(drop),
                Sweep::Immunity => self.immunity_sweep().await.map(drop),
                Sweep::Deep => self.deep_sweep().await.map(drop),
                Sweep::Prediction => self.prediction_sweep().await.map(drop),
                Sweep::Learning => self.learning_sweep().await.map(drop),
                Sweep::Log => self.log_sweep().await.map(drop),
                Sweep::Maintenance => self.maintenance_sweep().await.map(drop),
                Sweep::Improvement => self.improvement_sweep().await.map(drop),
            }
        }
        .instrument(span)
        .await
    }

    pub async fn stats(&self) -> Result<RecoveryStats, Error> {
        let archive = self.archive().clone();
        let probe = self.inner.services.probe.clone();
        let root = self.inner.config.files.root.clone();
        let (snapshots, disk_free) =
            tokio::task::spawn_blocking(move || (archive.count(), probe.disk_free(&root))).await?;

        Ok(RecoveryStats {
            log: self.inner.log.stats(),
            snapshots,
            disk_free,
            immunity: self.inner.registry.summary(),
            subsystems: self.inner.registry.snapshot(),
            patterns: self.inner.learner.patterns(),
            fix_effectiveness: self.inner.learner.effectiveness(),
            paused: self.paused(),
        })
    }

    /// Operator override: give `subsystem` a fresh attempt budget.
    pub fn reset(&self, subsystem: &str) {
        self.inner.registry.reset(subsystem);
        info!(subsystem, "repair budget reset");
    }

    /// Start every sweep timer and serve control events until cancelled.
    pub async fn run_until(
        &self,
        cancel: CancellationToken,
        mut control_rx: mpsc::UnboundedReceiver<ControlEvent>,
    ) -> Result<(), Error> {
        let mut timers = JoinSet::new();
        for sweep in Sweep::ALL {
            let engine = self.clone();
            let cancel = cancel.clone();
            timers.spawn(async move { engine.run_timer(sweep, cancel).await });
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("shutdown requested");
                    break;
                }
                Some(event) = control_rx.recv() => {
                    self.handle_control(event).await;
                }
            }
        }

        while let Some(result) = timers.join_next().await {
            result?;
        }
        Ok(())
    }

    async fn run_timer(&self, sweep: Sweep, cancel: CancellationToken) {
        let period = sweep.interval(&self.inner.config.monitor);
        if period.is_zero() {
            debug!(%sweep, "sweep disabled");
            return;
        }
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.inner.services.clock.sleep(period) => {}
            }
            if let Err(err) = self.run_sweep(sweep).await {
                warn!(%sweep, %err, "sweep failed");
            }
        }
    }

    async fn handle_control(&self, event: ControlEvent) {
        match event {
            ControlEvent::DumpStats => match self.stats().await {
                Ok(stats) => match serde_json::to_string(&stats) {
                    Ok(json) => info!(
                        stats = %json,
                        disk_free = ?stats.disk_free_human(),
                        "recovery stats"
                    ),
                    Err(err) => warn!(%err, "cannot encode stats"),
                },
                Err(err) => warn!(%err, "cannot collect stats"),
            },
            ControlEvent::Emergency => {
                if let Err(err) = self.emergency_recovery().await {
                    error!(%err, "emergency recovery failed");
                }
            }
            ControlEvent::Reset(subsystem) => self.reset(&subsystem),
        }
    }
}
