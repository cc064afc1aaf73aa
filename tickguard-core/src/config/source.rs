//! Hot-reloadable symbol configuration
//!
//! The coordinator polls a [`ConfigSource`] on a fixed cadence. A source only
//! reports a new list when its backing store actually changed, so an
//! unchanged file costs one `stat` per poll.

use super::types::{load_symbols, ConfigError, SymbolConfig};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

pub trait ConfigSource: Send {
    /// `Ok(Some(list))` when the configuration changed since the last
    /// successful poll, `Ok(None)` when it did not
    fn poll_for_update(&mut self) -> Result<Option<Vec<SymbolConfig>>, ConfigError>;
}

/// Symbols file watched by modification time
#[derive(Debug)]
pub struct FileConfigSource {
    path: PathBuf,
    last_modified: Option<SystemTime>,
}

impl FileConfigSource {
    /// Load the file once and start watching it
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, Vec<SymbolConfig>), ConfigError> {
        let path = path.as_ref().to_path_buf();
        let modified = modified_at(&path)?;
        let configs = load_symbols(&path)?;
        info!(path = %path.display(), symbols = configs.len(), "Loaded symbol configuration");

        Ok((
            Self {
                path,
                last_modified: Some(modified),
            },
            configs,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for FileConfigSource {
    fn poll_for_update(&mut self) -> Result<Option<Vec<SymbolConfig>>, ConfigError> {
        let modified = modified_at(&self.path)?;
        if self.last_modified == Some(modified) {
            return Ok(None);
        }

        // The marker only advances on a good parse, so a half-written file is
        // retried on the next poll.
        let configs = load_symbols(&self.path)?;
        debug!(path = %self.path.display(), "Symbol configuration changed");
        self.last_modified = Some(modified);
        Ok(Some(configs))
    }
}

fn modified_at(path: &Path) -> Result<SystemTime, ConfigError> {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
}
