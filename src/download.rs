//! Download safety gate.
//!
//! Every download runs through a small state machine:
//!
//! ```text
//! Requested ──source rejected──▶ SourceRejected            (terminal)
//!     │      ──owner destroyed──▶ Failed                    (terminal)
//!     ▼
//! AwaitingSaveLocation ──prompt canceled──▶ SaveCanceled    (terminal)
//!     │                ──owner destroyed──▶ Failed          (terminal)
//!     ▼
//! InProgress ──progress──▶ InProgress
//!     └──engine done──▶ Completed | Failed                  (terminal)
//! ```
//!
//! The source URL is vetted with the strict download-grade classifier
//! before anything touches the filesystem. Terminal items are dropped from
//! tracking once the originating surface has been notified.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::classifier::UrlClassifier;
use crate::error::ShellResult;
use crate::notify::{Notice, Notifier};
use crate::surface::{SurfaceId, SurfaceLiveness};
use crate::warning::BlockReason;

pub type DownloadId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Requested,
    SourceRejected,
    AwaitingSaveLocation,
    SaveCanceled,
    InProgress,
    Completed,
    Failed,
}

impl DownloadState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::SourceRejected | Self::SaveCanceled | Self::Completed | Self::Failed
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadItem {
    pub id: DownloadId,
    pub source_url: String,
    pub file_name: String,
    pub total_bytes: u64,
    pub received_bytes: u64,
    pub state: DownloadState,
}

impl DownloadItem {
    pub fn progress(&self) -> f64 {
        progress_percent(self.received_bytes, self.total_bytes)
    }
}

/// Percentage in `[0, 100]`. An unknown (zero) total yields 0.
pub fn progress_percent(received: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (received as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// Final state reported by the download engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOutcome {
    Completed,
    Cancelled,
    Interrupted,
}

/// A download-initiated event.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub id: DownloadId,
    pub source_url: String,
    pub suggested_file_name: String,
    pub total_bytes: u64,
    pub owner: SurfaceId,
    pub owner_liveness: SurfaceLiveness,
}

/// The engine actually moving bytes.
pub trait DownloadEngine: Send + Sync {
    fn cancel(&self, id: DownloadId) -> ShellResult<()>;
    /// Starts writing to `path`.
    fn set_save_path(&self, id: DownloadId, path: &Path) -> ShellResult<()>;
}

/// User-interactive save dialog. `None` means canceled.
#[async_trait]
pub trait SaveLocationPrompt: Send + Sync {
    async fn choose(&self, file_name: &str) -> Option<PathBuf>;
}

struct Tracked {
    item: DownloadItem,
    owner: SurfaceId,
}

pub struct DownloadGate {
    classifier: UrlClassifier,
    engine: Arc<dyn DownloadEngine>,
    prompt: Arc<dyn SaveLocationPrompt>,
    notifier: Arc<dyn Notifier>,
    items: Mutex<HashMap<DownloadId, Tracked>>,
}

impl DownloadGate {
    pub fn new(
        classifier: UrlClassifier,
        engine: Arc<dyn DownloadEngine>,
        prompt: Arc<dyn SaveLocationPrompt>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            classifier,
            engine,
            prompt,
            notifier,
            items: Mutex::new(HashMap::new()),
        }
    }

    /// Drives a new download up to `InProgress` or a terminal state.
    ///
    /// The only suspension point is the save-location prompt; no lock is
    /// held across it, so progress of other downloads keeps flowing.
    pub async fn begin(&self, request: DownloadRequest) -> DownloadState {
        let id = request.id;
        let file_name = request.suggested_file_name.clone();
        self.items().insert(
            id,
            Tracked {
                item: DownloadItem {
                    id,
                    source_url: request.source_url.clone(),
                    file_name: file_name.clone(),
                    total_bytes: request.total_bytes,
                    received_bytes: 0,
                    state: DownloadState::Requested,
                },
                owner: request.owner,
            },
        );

        if !request.owner_liveness.is_alive() {
            self.cancel_in_engine(id);
            return self.fail(id, "the window that started this download is closed");
        }

        if self
            .classifier
            .classify_download_source(&request.source_url)
            .is_rejected()
        {
            warn!(id, source = %request.source_url, "Download source rejected");
            self.cancel_in_engine(id);
            let message = BlockReason::DownloadSourceRejected.message(&request.source_url);
            return self.finish(id, DownloadState::SourceRejected, Notice::DownloadError { message });
        }

        self.set_state(id, DownloadState::AwaitingSaveLocation);
        let choice = self.prompt.choose(&file_name).await;

        // `on_done` may have failed the item while the prompt was open.
        if self.state(id).is_none() {
            return DownloadState::Failed;
        }

        let Some(path) = choice else {
            info!(id, file_name = %file_name, "Save location canceled");
            self.cancel_in_engine(id);
            return self.finish(id, DownloadState::SaveCanceled, Notice::DownloadCanceled { file_name });
        };

        if !request.owner_liveness.is_alive() {
            self.cancel_in_engine(id);
            return self.fail(id, "the window that started this download is closed");
        }

        if let Err(e) = self.engine.set_save_path(id, &path) {
            warn!(id, error = %e, "Download engine refused the save path");
            self.cancel_in_engine(id);
            return self.fail(id, &e.to_string());
        }

        info!(id, path = %path.display(), "Download started");
        self.set_state(id, DownloadState::InProgress);
        DownloadState::InProgress
    }

    /// Progress callback from the engine. Returns the percentage reported to
    /// the surface, or `None` when the item is not in progress.
    pub fn on_progress(&self, id: DownloadId, received_bytes: u64, total_bytes: u64) -> Option<f64> {
        let (owner, notice, progress) = {
            let mut items = self.items();
            let tracked = items.get_mut(&id)?;
            if tracked.item.state != DownloadState::InProgress {
                return None;
            }
            tracked.item.received_bytes = received_bytes;
            if total_bytes != 0 {
                tracked.item.total_bytes = total_bytes;
            }
            let progress = tracked.item.progress();
            let notice = Notice::DownloadProgress {
                file_name: tracked.item.file_name.clone(),
                progress,
            };
            (tracked.owner, notice, progress)
        };
        self.notifier.notify(owner, notice);
        Some(progress)
    }

    /// Completion signal from the engine. Anything but `Completed` is a
    /// failure, and so is any signal for a download that never reached
    /// `InProgress` (no save location was applied yet).
    pub fn on_done(&self, id: DownloadId, outcome: EngineOutcome) -> Option<DownloadState> {
        let (file_name, current) = {
            let items = self.items();
            let tracked = items.get(&id)?;
            (tracked.item.file_name.clone(), tracked.item.state)
        };
        if current != DownloadState::InProgress {
            warn!(id, state = ?current, outcome = ?outcome, "Engine finished a download that had not started");
            self.cancel_in_engine(id);
            return Some(self.fail(id, "ended before a save location was chosen"));
        }
        let state = match outcome {
            EngineOutcome::Completed => {
                info!(id, file_name = %file_name, "Download complete");
                self.finish(id, DownloadState::Completed, Notice::DownloadComplete { file_name })
            }
            other => {
                warn!(id, outcome = ?other, "Download did not complete");
                self.fail(id, outcome_label(other))
            }
        };
        Some(state)
    }

    pub fn get(&self, id: DownloadId) -> Option<DownloadItem> {
        self.items().get(&id).map(|t| t.item.clone())
    }

    /// Downloads still tracked (non-terminal).
    pub fn active(&self) -> Vec<DownloadItem> {
        let mut items: Vec<_> = self.items().values().map(|t| t.item.clone()).collect();
        items.sort_by_key(|i| i.id);
        items
    }

    fn fail(&self, id: DownloadId, reason: &str) -> DownloadState {
        let message = match self.get(id) {
            Some(item) => format!("{}: {reason}", item.file_name),
            None => reason.to_owned(),
        };
        self.finish(id, DownloadState::Failed, Notice::DownloadError { message })
    }

    /// Enters a terminal state: notify the owner, then stop tracking.
    fn finish(&self, id: DownloadId, state: DownloadState, notice: Notice) -> DownloadState {
        debug_assert!(state.is_terminal());
        let removed = self.items().remove(&id);
        if let Some(tracked) = removed {
            debug!(id, ?state, "Download finished");
            self.notifier.notify(tracked.owner, notice);
        }
        state
    }

    fn cancel_in_engine(&self, id: DownloadId) {
        if let Err(e) = self.engine.cancel(id) {
            warn!(id, error = %e, "Download engine cancel failed");
        }
    }

    fn set_state(&self, id: DownloadId, state: DownloadState) {
        if let Some(tracked) = self.items().get_mut(&id) {
            tracked.item.state = state;
        }
    }

    fn state(&self, id: DownloadId) -> Option<DownloadState> {
        self.items().get(&id).map(|t| t.item.state)
    }

    fn items(&self) -> MutexGuard<'_, HashMap<DownloadId, Tracked>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn outcome_label(outcome: EngineOutcome) -> &'static str {
    match outcome {
        EngineOutcome::Completed => "completed",
        EngineOutcome::Cancelled => "cancelled",
        EngineOutcome::Interrupted => "interrupted",
    }
}
