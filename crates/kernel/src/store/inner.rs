use crate::{Error, utils::write_atomic};
use serde_json::{Map, Value};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub(crate) struct StoreInner {
    /// Backing file. `None` keeps everything in memory.
    pub(crate) path: Option<PathBuf>,

    pub(crate) data: Map<String, Value>,
}

impl StoreInner {
    pub(crate) fn open(path: Option<PathBuf>) -> Self {
        let data = match &path {
            Some(path) => match read_map(path) {
                Ok(data) => data,
                Err(Error::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                    debug!(?path, "no store file yet, starting empty");
                    Map::new()
                }
                Err(err) => {
                    warn!(?path, %err, "store file unusable, starting empty");
                    Map::new()
                }
            },
            None => Map::new(),
        };
        Self { path, data }
    }

    /// Write the whole map to disk. Memory-only stores are a no-op.
    pub(crate) fn flush(&self) -> Result<(), Error> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(&self.data)?;
        write_atomic(path, &bytes)?;
        Ok(())
    }
}

fn read_map(path: &Path) -> Result<Map<String, Value>, Error> {
    let bytes = fs::read(path)?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice(&bytes)? {
        Value::Object(map) => Ok(map),
        _ => Err(Error::NotAnObject(path.to_path_buf())),
    }
}
