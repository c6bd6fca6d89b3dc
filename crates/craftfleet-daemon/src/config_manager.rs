//! Active target-server configuration.
//!
//! The config is an immutable snapshot shared as `Arc<ServerConfig>`;
//! sessions keep the snapshot they were opened with. Replacing it writes the
//! new config to disk first, so memory and disk never disagree after a
//! failed write.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use craftfleet_types::{FleetError, ServerConfig};

pub struct ConfigManager {
    current: Arc<ServerConfig>,
    path: Option<PathBuf>,
}

impl ConfigManager {
    /// Hold `initial`, persisting replacements to `path` when given.
    pub fn new(initial: ServerConfig, path: Option<PathBuf>) -> Self {
        Self {
            current: Arc::new(initial),
            path,
        }
    }

    /// Start from the config persisted at `path`, falling back to `fallback`
    /// when the file is missing or invalid.
    pub fn load_or(path: PathBuf, fallback: ServerConfig) -> Self {
        let initial = match std::fs::read_to_string(&path) {
            Ok(content) => match ServerConfig::from_toml(&content) {
                Ok(config) => {
                    info!(path = %path.display(), server = %config.address(), "loaded persisted server config");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "ignoring invalid persisted server config");
                    fallback
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => fallback,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read persisted server config");
                fallback
            }
        };
        Self::new(initial, Some(path))
    }

    pub fn snapshot(&self) -> Arc<ServerConfig> {
        Arc::clone(&self.current)
    }

    /// Validate, persist, then swap in `next`.
    pub fn replace(&mut self, next: ServerConfig) -> Result<Arc<ServerConfig>, FleetError> {
        next.validate()?;
        if let Some(path) = &self.path {
            persist(path, &next)?;
        }
        self.current = Arc::new(next);
        Ok(self.snapshot())
    }
}

/// Write the config atomically: temp file, fsync, rename.
fn persist(path: &Path, config: &ServerConfig) -> Result<(), FleetError> {
    let toml_str = config.to_toml()?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            FleetError::Persistence(format!("failed to create {}: {e}", parent.display()))
        })?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    let file = std::fs::File::create(&tmp_path)
        .map_err(|e| FleetError::Persistence(format!("failed to create temp config: {e}")))?;
    let mut writer = std::io::BufWriter::new(file);
    writer
        .write_all(toml_str.as_bytes())
        .map_err(|e| FleetError::Persistence(format!("failed to write temp config: {e}")))?;
    writer
        .into_inner()
        .map_err(|e| FleetError::Persistence(format!("failed to flush temp config: {e}")))?
        .sync_all()
        .map_err(|e| FleetError::Persistence(format!("failed to sync temp config: {e}")))?;

    std::fs::rename(&tmp_path, path)
        .map_err(|e| FleetError::Persistence(format!("failed to replace config: {e}")))?;
    Ok(())
}
