use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use config::Config;
use std::path::{Path, PathBuf};

/// Immunity: self-monitoring and self-repair for a community bot
///
/// Watches the bot's critical files, keeps rotating backups of them, runs
/// periodic diagnostics and repairs what it can without operator help.
#[derive(Debug, Parser, Clone)]
#[command(about, long_about, version)]
pub struct Cli {
    /// Path to configuration file.
    ///
    /// Without it, built-in defaults are used.
    #[arg(short, long, value_parser = validate_file)]
    pub conffile: Option<PathBuf>,

    /// Directory holding the bot's files. Overrides `files.root`.
    #[arg(short, long, value_parser = validate_dir)]
    pub root: Option<PathBuf>,

    /// File to load and save learned state to.
    ///
    /// Empty string means state is kept in memory.
    #[arg(short, long)]
    pub statefile: Option<String>,

    /// Path to log file.
    ///
    /// Without it, logs go to stderr.
    #[arg(short, long)]
    pub logfile: Option<PathBuf>,

    /// Write the effective configuration to this path and continue.
    #[arg(long)]
    pub save_config: Option<PathBuf>,

    /// Run startup checks and a single diagnostic sweep, then exit.
    #[arg(long)]
    pub once: bool,

    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,
}

impl Cli {
    /// Apply command line overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(root) = &self.root {
            config.files.root = root.clone();
        }
        if let Some(statefile) = &self.statefile {
            config.persistence.store_path = PathBuf::from(statefile);
        }
    }
}

/// Check if the file exists.
#[inline(always)]
fn validate_file(file: &str) -> Result<PathBuf, String> {
    let path = Path::new(file);
    if path.is_file() {
        Ok(path.to_owned())
    } else {
        Err(format!("File not found: {:?}", path))
    }
}

#[inline(always)]
fn validate_dir(dir: &str) -> Result<PathBuf, String> {
    let path = Path::new(dir);
    if path.is_dir() {
        Ok(path.to_owned())
    } else {
        Err(format!("Not a directory: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_statefile_means_memory() {
        let cli = Cli::parse_from(["immunity-rs", "--statefile", ""]);
        let mut config = Config::new();
        cli.apply(&mut config);
        assert_eq!(config.persistence.store_file(), None);

        let cli = Cli::parse_from(["immunity-rs", "-s", "state.json"]);
        cli.apply(&mut config);
        assert_eq!(config.persistence.store_file(), Some(Path::new("state.json")));
    }

    #[test]
    fn missing_conffile_is_rejected() {
        assert!(Cli::try_parse_from(["immunity-rs", "-c", "/nonexistent/immunity.toml"]).is_err());
    }

    proptest! {
        #[test]
        fn statefile_overrides_store(name in "[a-z0-9_][a-z0-9_./]{0,31}") {
            let cli = Cli::parse_from(["immunity-rs", "--statefile", name.as_str()]);
            let mut config = Config::new();
            cli.apply(&mut config);
            prop_assert_eq!(config.persistence.store_file(), Some(Path::new(name.as_str())));
        }
    }
}
