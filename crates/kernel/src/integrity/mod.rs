mod encoding;
mod templates;

pub use encoding::SourceEncoding;

use crate::{
    Error, backup::BackupArchive, cooldown::Cooldown, journal::RecoveryLog,
    problem::FileProblem, utils::TextRules,
};
use config::Config;
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    collections::HashMap,
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

/// A defect found in one critical file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FileIssue {
    /// Path relative to the files root.
    pub file: PathBuf,
    pub problem: FileProblem,
}

/// How a file was brought back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairMethod {
    RestoredBackup,
    Placeholder,
    Reencoded(SourceEncoding),
    DeclarationInjected,
}

impl fmt::Display for RepairMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RestoredBackup => f.write_str("restore_backup"),
            Self::Placeholder => f.write_str("placeholder"),
            Self::Reencoded(encoding) => write!(f, "reencode_from_{encoding}"),
            Self::DeclarationInjected => f.write_str("inject_declaration"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    /// The attempt cap or the file cooldown held the repair back.
    Skipped,
    Repaired(RepairMethod),
    Failed(String),
}

impl RepairOutcome {
    pub fn is_repaired(&self) -> bool {
        matches!(self, Self::Repaired(_))
    }
}

#[derive(Debug)]
struct Gate {
    max_attempts: u32,
    attempts: HashMap<(PathBuf, FileProblem), u32>,
    cooldown: Cooldown<PathBuf>,
}

impl Gate {
    /// `true` to skip. Otherwise the attempt is counted and the cooldown starts.
    fn should_skip(&mut self, file: &Path, problem: FileProblem, now: Instant) -> bool {
        let key = (file.to_path_buf(), problem);
        let attempts = self.attempts.get(&key).copied().unwrap_or(0);
        if attempts >= self.max_attempts {
            debug!(?file, %problem, attempts, "attempt cap reached");
            return true;
        }
        if let Some(remaining) = self.cooldown.remaining(file, now) {
            debug!(?file, %problem, ?remaining, "file cooling down");
            return true;
        }
        self.attempts.insert(key, attempts + 1);
        self.cooldown.mark(file.to_path_buf(), now);
        false
    }

    fn force(&mut self, file: &Path, problem: FileProblem, now: Instant) {
        *self.attempts.entry((file.to_path_buf(), problem)).or_default() += 1;
        self.cooldown.mark(file.to_path_buf(), now);
    }
}

/// Checks the critical files and repairs them in place.
#[derive(Debug, Clone)]
pub struct IntegrityGuard {
    files_root: PathBuf,
    critical: Vec<PathBuf>,
    rules: TextRules,
    archive: BackupArchive,
    log: RecoveryLog,
    gate: Arc<Mutex<Gate>>,
}

impl IntegrityGuard {
    pub fn new(
        files_root: impl Into<PathBuf>,
        critical: Vec<PathBuf>,
        rules: TextRules,
        archive: BackupArchive,
        log: RecoveryLog,
        max_attempts: u32,
        cooldown: Duration,
    ) -> Self {
        Self {
            files_root: files_root.into(),
            critical,
            rules,
            archive,
            log,
            gate: Arc::new(Mutex::new(Gate {
                max_attempts,
                attempts: HashMap::new(),
                cooldown: Cooldown::new(cooldown),
            })),
        }
    }

    pub fn from_config(config: &Config, archive: BackupArchive, log: RecoveryLog) -> Self {
        Self::new(
            config.files.root.clone(),
            config.files.critical.clone(),
            TextRules::from_config(&config.files),
            archive,
            log,
            config.recovery.file_max_attempts,
            config.recovery.file_cooldown,
        )
    }

    pub fn critical_files(&self) -> &[PathBuf] {
        &self.critical
    }

    pub fn archive(&self) -> &BackupArchive {
        &self.archive
    }

    /// Issues over every critical file, in configuration order.
    pub fn check_all(&self) -> Vec<FileIssue> {
        self.critical
            .iter()
            .filter_map(|file| {
                self.check_file(file).map(|problem| FileIssue {
                    file: file.clone(),
                    problem,
                })
            })
            .collect()
    }

    pub fn check_file(&self, file: impl AsRef<Path>) -> Option<FileProblem> {
        let file = file.as_ref();
        let bytes = match fs::read(self.files_root.join(file)) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Some(FileProblem::Missing),
            Err(err) => {
                debug!(?file, %err, "cannot read critical file");
                return Some(FileProblem::Unreadable);
            }
        };
        let Ok(content) = std::str::from_utf8(&bytes) else {
            return Some(FileProblem::Encoding);
        };
        if content.trim().is_empty() {
            return Some(FileProblem::Empty);
        }
        (!self.rules.is_plausible(file, content)).then_some(FileProblem::InvalidStructure)
    }

    pub fn repair(&self, file: impl AsRef<Path>, problem: FileProblem) -> RepairOutcome {
        self.repair_at(file, problem, Instant::now())
    }

    /// Repair unless the (file, problem) attempt cap or the file cooldown
    /// holds it back.
    pub fn repair_at(
        &self,
        file: impl AsRef<Path>,
        problem: FileProblem,
        now: Instant,
    ) -> RepairOutcome {
        let file = file.as_ref();
        if self.gate.lock().should_skip(file, problem, now) {
            return RepairOutcome::Skipped;
        }
        self.apply_and_log(file, problem)
    }

    /// Repair regardless of the gate. Still counts as an attempt.
    pub fn force_repair(&self, file: impl AsRef<Path>, problem: FileProblem) -> RepairOutcome {
        let file = file.as_ref();
        self.gate.lock().force(file, problem, Instant::now());
        self.apply_and_log(file, problem)
    }

    fn apply_and_log(&self, file: &Path, problem: FileProblem) -> RepairOutcome {
        let subject = file.display().to_string();
        match self.apply(file, problem) {
            Ok(method) => {
                info!(?file, %problem, %method, "file repaired");
                self.log.record(subject, problem.as_str(), method.to_string(), true);
                RepairOutcome::Repaired(method)
            }
            Err(err) => {
                warn!(?file, %problem, %err, "file repair failed");
                self.log.record(subject, problem.as_str(), planned_action(problem), false);
                RepairOutcome::Failed(err.to_string())
            }
        }
    }

    fn apply(&self, file: &Path, problem: FileProblem) -> Result<RepairMethod, Error> {
        let path = self.files_root.join(file);
        match problem {
            FileProblem::Missing | FileProblem::Unreadable | FileProblem::Empty => {
                match self.archive.restore(file, &path) {
                    Ok(_) => Ok(RepairMethod::RestoredBackup),
                    Err(Error::NoBackup(_)) => {
                        if let Some(parent) = path.parent() {
                            fs::create_dir_all(parent)?;
                        }
                        fs::write(&path, templates::placeholder(file, &self.rules))?;
                        Ok(RepairMethod::Placeholder)
                    }
                    Err(err) => Err(err),
                }
            }
            FileProblem::Encoding => {
                let bytes = fs::read(&path)?;
                let (text, encoding) =
                    encoding::decode(&bytes).ok_or_else(|| Error::Undecodable(file.to_path_buf()))?;
                fs::write(&path, text)?;
                Ok(RepairMethod::Reencoded(encoding))
            }
            FileProblem::InvalidStructure => {
                let content = fs::read_to_string(&path)?;
                let patched = format!("{}\n{content}", templates::declaration(&self.rules));
                if !self.rules.is_plausible(file, &patched) {
                    return Err(Error::Implausible(file.to_path_buf()));
                }
                fs::write(&path, patched)?;
                Ok(RepairMethod::DeclarationInjected)
            }
        }
    }
}

fn planned_action(problem: FileProblem) -> &'static str {
    match problem {
        FileProblem::Missing | FileProblem::Unreadable | FileProblem::Empty => "restore",
        FileProblem::Encoding => "reencode",
        FileProblem::InvalidStructure => "inject_declaration",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::WINDOWS_1251;
    use pretty_assertions::assert_eq;
    use tempfile::{TempDir, tempdir};

    const COOLDOWN: Duration = Duration::from_secs(5 * 60);

    fn guard(dir: &TempDir) -> (IntegrityGuard, RecoveryLog) {
        let critical: Vec<PathBuf> = ["config.py", "bot.py", "requirements.txt", "role_system.py"]
            .into_iter()
            .map(PathBuf::from)
            .collect();
        let archive = BackupArchive::new(
            dir.path().join("backups"),
            dir.path(),
            critical.clone(),
            10,
            TextRules::default(),
        );
        let log = RecoveryLog::in_memory();
        let guard = IntegrityGuard::new(
            dir.path(),
            critical,
            TextRules::default(),
            archive,
            log.clone(),
            3,
            COOLDOWN,
        );
        (guard, log)
    }

    fn write_all_valid(dir: &TempDir) {
        fs::write(dir.path().join("config.py"), "import os\nTOKEN = ''\n").unwrap();
        fs::write(dir.path().join("bot.py"), "import discord\n").unwrap();
        fs::write(dir.path().join("requirements.txt"), "discord.py\n").unwrap();
        fs::write(dir.path().join("role_system.py"), "class RoleSystem: ...\n").unwrap();
    }

    #[test]
    fn check_all_reports_distinct_codes() {
        let dir = tempdir().unwrap();
        let (guard, _) = guard(&dir);
        fs::write(dir.path().join("config.py"), " \n").unwrap();
        fs::write(dir.path().join("bot.py"), [0xff, 0xfe, 0x41]).unwrap();
        fs::write(dir.path().join("role_system.py"), "x = 1\n").unwrap();

        let issues = guard.check_all();
        assert_eq!(
            issues,
            vec![
                FileIssue { file: "config.py".into(), problem: FileProblem::Empty },
                FileIssue { file: "bot.py".into(), problem: FileProblem::Encoding },
                FileIssue { file: "requirements.txt".into(), problem: FileProblem::Missing },
                FileIssue { file: "role_system.py".into(), problem: FileProblem::InvalidStructure },
            ]
        );
        // checking has no side effects
        assert_eq!(guard.check_all(), issues);
    }

    #[test]
    fn cooldown_allows_one_repair_per_window() {
        let dir = tempdir().unwrap();
        let (guard, log) = guard(&dir);
        let now = Instant::now();

        let first = guard.repair_at("bot.py", FileProblem::Missing, now);
        assert_eq!(first, RepairOutcome::Repaired(RepairMethod::Placeholder));
        fs::remove_file(dir.path().join("bot.py")).unwrap();

        let second = guard.repair_at("bot.py", FileProblem::Missing, now + COOLDOWN / 2);
        assert_eq!(second, RepairOutcome::Skipped);
        assert!(!dir.path().join("bot.py").exists());
        assert_eq!(log.len(), 1);

        let third = guard.repair_at("bot.py", FileProblem::Missing, now + COOLDOWN);
        assert!(third.is_repaired());
    }

    #[test]
    fn attempt_cap_per_file_and_problem() {
        let dir = tempdir().unwrap();
        let (guard, _) = guard(&dir);
        let mut now = Instant::now();
        for _ in 0..3 {
            assert!(guard.repair_at("bot.py", FileProblem::Missing, now).is_repaired());
            now += COOLDOWN;
        }
        assert_eq!(guard.repair_at("bot.py", FileProblem::Missing, now), RepairOutcome::Skipped);
        // other problems on the same file keep their own budget
        fs::write(dir.path().join("bot.py"), "x = 1\n").unwrap();
        assert_eq!(
            guard.repair_at("bot.py", FileProblem::InvalidStructure, now),
            RepairOutcome::Repaired(RepairMethod::DeclarationInjected)
        );
    }

    #[test]
    fn empty_config_gets_plausible_content() {
        let dir = tempdir().unwrap();
        let (guard, log) = guard(&dir);
        write_all_valid(&dir);
        fs::write(dir.path().join("config.py"), "").unwrap();

        assert_eq!(guard.check_file("config.py"), Some(FileProblem::Empty));
        assert!(guard.repair("config.py", FileProblem::Empty).is_repaired());
        assert_eq!(guard.check_file("config.py"), None);
        assert_eq!(log.stats().successful, 1);
    }

    #[test]
    fn empty_file_prefers_backup() {
        let dir = tempdir().unwrap();
        let (guard, _) = guard(&dir);
        write_all_valid(&dir);
        guard.archive().snapshot().unwrap();
        fs::write(dir.path().join("bot.py"), "\n").unwrap();

        assert_eq!(
            guard.repair("bot.py", FileProblem::Empty),
            RepairOutcome::Repaired(RepairMethod::RestoredBackup)
        );
        assert_eq!(fs::read_to_string(dir.path().join("bot.py")).unwrap(), "import discord\n");
    }

    #[test]
    fn windows_1251_is_resaved_as_utf8() {
        let dir = tempdir().unwrap();
        let (guard, _) = guard(&dir);
        let text = "import discord\n# Модуль ролей\nclass RoleSystem: ...\n";
        let (bytes, _, _) = WINDOWS_1251.encode(text);
        fs::write(dir.path().join("role_system.py"), &bytes).unwrap();

        assert_eq!(guard.check_file("role_system.py"), Some(FileProblem::Encoding));
        assert_eq!(
            guard.repair("role_system.py", FileProblem::Encoding),
            RepairOutcome::Repaired(RepairMethod::Reencoded(SourceEncoding::Windows1251))
        );
        assert_eq!(fs::read_to_string(dir.path().join("role_system.py")).unwrap(), text);
        assert_eq!(guard.check_file("role_system.py"), None);
    }

    #[test]
    fn force_repair_ignores_cooldown() {
        let dir = tempdir().unwrap();
        let (guard, _) = guard(&dir);
        assert!(guard.repair("config.py", FileProblem::Missing).is_repaired());
        fs::remove_file(dir.path().join("config.py")).unwrap();

        assert_eq!(guard.repair("config.py", FileProblem::Missing), RepairOutcome::Skipped);
        assert!(guard.force_repair("config.py", FileProblem::Missing).is_repaired());
        assert_eq!(guard.check_file("config.py"), None);
    }
}
