// SHOREBENCH ERROR TAXONOMY
// ONE VARIANT PER FAILURE CLASS. EVERY VARIANT RENDERS AS A SINGLE LINE.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    // MISSING PREREQUISITES OR A DIRTY WORKING DIRECTORY
    #[error("{0}")]
    Provision(String),

    #[error("failed generating {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed spawning shore instance. Check {} for details.", capture.display())]
    Spawn { capture: PathBuf },

    #[error("cannot connect to server on port {port}: {source}")]
    Connect {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("server on port {port} closed the control connection")]
    ConnectionLost { port: u16 },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("timed out after {} waiting for {what}", humantime::format_duration(*after))]
    Timeout { what: String, after: Duration },

    #[error("interrupted while waiting for {0}")]
    Cancelled(String),

    #[error("affinity binder {binder} failed: {reason}")]
    Bind { binder: &'static str, reason: String },

    #[error("catalog: {0}")]
    Catalog(String),
}

pub type Result<T> = std::result::Result<T, BenchError>;

impl BenchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}
