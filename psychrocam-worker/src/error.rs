//! Error types for the refresh worker

use std::path::PathBuf;

use psychrocam_connectors::ConnectorError;
use psychrocam_core::{CacheError, ConfigError, StoreError};
use thiserror::Error;

/// Result type for worker operations
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Durable configuration storage failures
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing a configuration file failed
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A configuration file is not valid YAML
    #[error("YAML error in {path}: {reason}")]
    Yaml {
        /// File involved
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// Empty or non-mapping configurations are never written
    #[error("Refusing to save {name}: {reason}")]
    Rejected {
        /// Logical configuration name
        name: &'static str,
        /// What is wrong with it
        reason: &'static str,
    },
}

/// Rendering collaborator failures
#[derive(Debug, Error)]
pub enum RenderError {
    /// The render context could not be serialized
    #[error("Cannot serialize render context: {0}")]
    Context(String),

    /// The renderer process could not be started or talked to
    #[error("Renderer I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The renderer did not finish in time
    #[error("Renderer timed out after {0}s")]
    Timeout(u64),

    /// The renderer exited unsuccessfully
    #[error("Renderer exited with {status}: {stderr}")]
    Failed {
        /// Exit status as reported by the OS
        status: String,
        /// Captured standard error
        stderr: String,
    },

    /// The renderer produced nothing
    #[error("Renderer produced an empty chart")]
    Empty,
}

/// Any failure inside a worker operation
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Shared store backend failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Typed cache failure
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Sensor configuration could not be parsed
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Durable configuration storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Chart rendering failure
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Remote telemetry source failure
    #[error(transparent)]
    Connector(#[from] ConnectorError),
}
