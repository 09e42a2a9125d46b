//! Error taxonomy.
//!
//! Only failures that a caller can act on are modelled as [`ShellError`].
//! Policy outcomes (blocked protocol, untrusted target, rejected download
//! source, certificate error) are not errors: they travel as
//! [`BlockReason`](crate::warning::BlockReason) inside decisions.

use std::io;

use crate::lifecycle::StorageClass;

/// Result alias used across the crate.
pub type ShellResult<T> = Result<T, ShellError>;

#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    /// Clearing one storage class failed. Logged and swallowed at shutdown.
    #[error("failed to clear {class}: {source}")]
    StorageClear {
        class: StorageClass,
        #[source]
        source: io::Error,
    },

    /// Clearing the HTTP cache failed.
    #[error("failed to clear http cache: {0}")]
    HttpCacheClear(#[source] io::Error),

    /// Flushing pending storage writes failed.
    #[error("failed to flush storage: {0}")]
    Flush(#[source] io::Error),

    /// The download engine refused or failed an instruction.
    #[error("download engine error for download {id}: {reason}")]
    DownloadEngine { id: u64, reason: String },

    /// The local-pages root cannot be expressed as an absolute `file:` URL.
    #[error("invalid local pages root '{0}'")]
    InvalidLocalRoot(String),

    /// The profile directory is not absolute (or cannot be determined).
    /// Nothing is purged in that case.
    #[error("refusing to use profile directory '{0}': not an absolute path")]
    InvalidProfileDir(String),

    /// The guard service is gone (its task ended or panicked).
    #[error("navigation guard service is not running")]
    ServiceClosed,

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}
