use std::path::{Path, PathBuf};

use thiserror::Error;
use vqa_model::{ItemId, ModelError};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid json in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{}: {source}", path.display())]
    Record {
        path: PathBuf,
        #[source]
        source: ModelError,
    },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("input contains no items")]
    EmptyInput,

    #[error("duplicate item id '{0}'")]
    DuplicateId(ItemId),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("merge integrity check failed: {0}")]
    Integrity(String),
}

impl CoreError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        CoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn json(path: &Path, source: serde_json::Error) -> Self {
        CoreError::Json {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Errors that must stop a run before any worker is launched.
    pub fn is_partition_failure(&self) -> bool {
        matches!(
            self,
            CoreError::EmptyInput
                | CoreError::DuplicateId(_)
                | CoreError::Model(_)
                | CoreError::Record { .. }
                | CoreError::Config(_)
        )
    }
}
