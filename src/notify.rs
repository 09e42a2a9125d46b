//! Seam towards the UI collaborator.
//!
//! The shell chrome renders whatever it is told through [`Notifier`]. Nothing
//! in this crate depends on how it is drawn.

use std::fmt;

use tracing::{info, warn};

use crate::surface::SurfaceId;

/// Payloads delivered to the UI, addressed to the originating surface.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Warning { message: String },
    DownloadProgress { file_name: String, progress: f64 },
    DownloadComplete { file_name: String },
    DownloadCanceled { file_name: String },
    DownloadError { message: String },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning { message } => write!(f, "⚠️  {message}"),
            Self::DownloadProgress {
                file_name,
                progress,
            } => write!(f, "{file_name}: {progress:.1}%"),
            Self::DownloadComplete { file_name } => write!(f, "{file_name}: complete"),
            Self::DownloadCanceled { file_name } => write!(f, "{file_name}: canceled"),
            Self::DownloadError { message } => write!(f, "download failed: {message}"),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, surface: SurfaceId, notice: Notice);
}

/// Notifier for headless use: every notice becomes a log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, surface: SurfaceId, notice: Notice) {
        match &notice {
            Notice::Warning { .. } | Notice::DownloadError { .. } => {
                warn!(%surface, "{notice}")
            }
            _ => info!(%surface, "{notice}"),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Mutex, PoisonError};

    use super::*;

    /// Keeps every notice for assertions.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingNotifier {
        notices: Mutex<Vec<(SurfaceId, Notice)>>,
    }

    impl RecordingNotifier {
        pub(crate) fn notices(&self) -> Vec<(SurfaceId, Notice)> {
            self.notices
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        pub(crate) fn warnings(&self) -> Vec<String> {
            self.notices()
                .into_iter()
                .filter_map(|(_, n)| match n {
                    Notice::Warning { message } => Some(message),
                    _ => None,
                })
                .collect()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, surface: SurfaceId, notice: Notice) {
            self.notices
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((surface, notice));
        }
    }
}
