use crate::error::Error;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::{fs::OpenOptions, path::Path, sync::Mutex};
use tracing_log::AsTrace;

/// Install the global subscriber, writing to `logfile` when given.
pub fn init(verbosity: &Verbosity<WarnLevel>, logfile: Option<&Path>) -> Result<(), Error> {
    let builder = tracing_subscriber::fmt()
        .with_max_level(verbosity.log_level_filter().as_trace())
        .with_level(true)
        .with_file(true)
        .with_line_number(true);

    match logfile {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| Error::LogFile {
                    path: path.to_path_buf(),
                    source,
                })?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.init(),
    }
    Ok(())
}
