use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HookError>;

#[derive(Debug, Error)]
pub enum HookError {
    #[error("plugin snapshot not found at {0} (did the before_plugin_add hook run?)")]
    SnapshotMissing(PathBuf),

    #[error("invalid plugin snapshot {path}: {source}")]
    SnapshotFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed manifest {path}: {message}")]
    MalformedManifest { path: PathBuf, message: String },

    #[error("permission {0} does not belong to the manifest being rewritten")]
    ForeignEntry(String),

    #[error("permission prompt cancelled")]
    PromptCancelled,

    #[error("permission prompt failed: {0}")]
    Prompt(#[source] io::Error),

    #[error("platform {platform}: {action} of plugin {plugin} failed: {message}")]
    Platform {
        platform: String,
        plugin: String,
        action: &'static str,
        message: String,
    },

    #[error("{0}")]
    Usage(String),
}

impl HookError {
    pub fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    pub fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }
}
