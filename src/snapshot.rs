use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{HookError, Result};
use crate::fsio::write_atomic;
use crate::model::roster::PluginRoster;

/// The JSON roster shared between the before- and after-plugin-add hooks.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(working_dir: &Path, file_name: &str) -> Self {
        Self {
            path: working_dir.join(file_name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the snapshot with `roster`.
    pub fn record(&self, roster: &PluginRoster) -> Result<()> {
        let json = serde_json::to_vec(roster).map_err(|err| HookError::SnapshotFormat {
            path: self.path.clone(),
            source: err,
        })?;
        write_atomic(&self.path, &json)?;

        tracing::info!(
            path = %self.path.display(),
            plugins = roster.len(),
            "recorded plugin snapshot"
        );
        Ok(())
    }

    pub fn load(&self) -> Result<PluginRoster> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(HookError::SnapshotMissing(self.path.clone()));
            }
            Err(err) => return Err(HookError::read(&self.path, err)),
        };

        serde_json::from_str(&raw).map_err(|err| HookError::SnapshotFormat {
            path: self.path.clone(),
            source: err,
        })
    }
}
