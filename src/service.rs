//! The navigation guard as a Tokio task.
//!
//! One task owns the [`SurfaceRegistry`] and the [`NavigationGuard`];
//! callers talk to it through a cloneable [`GuardHandle`]. Commands are
//! processed one at a time from an mpsc queue, so the events of a surface
//! are resolved in the order they were sent and each is fully decided
//! before the next one is looked at. Replies come back on a oneshot
//! channel.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::classifier::NavigationTarget;
use crate::error::{ShellError, ShellResult};
use crate::guard::{NavigationDecision, NavigationEvent, NavigationGuard, NewWindowOutcome};
use crate::local_pages::BuiltinPage;
use crate::surface::{ContentSurface, SurfaceBuilder, SurfaceId, SurfaceRegistry};
use crate::warning::BlockReason;

enum GuardCommand {
    OpenBuiltin {
        page: BuiltinPage,
        reply: oneshot::Sender<SurfaceId>,
    },
    Attach {
        builder: SurfaceBuilder,
        reply: oneshot::Sender<Result<SurfaceId, BlockReason>>,
    },
    Navigate {
        surface: SurfaceId,
        raw: String,
        reply: oneshot::Sender<Option<NavigationTarget>>,
    },
    Event {
        surface: SurfaceId,
        event: NavigationEvent,
        reply: oneshot::Sender<NavigationDecision>,
    },
    NewWindow {
        opener: SurfaceId,
        url: String,
        reply: oneshot::Sender<Result<SurfaceId, BlockReason>>,
    },
    Snapshot {
        surface: SurfaceId,
        reply: oneshot::Sender<Option<ContentSurface>>,
    },
    List {
        reply: oneshot::Sender<Vec<SurfaceId>>,
    },
    Close {
        surface: SurfaceId,
        reply: oneshot::Sender<bool>,
    },
}

/// Cheap to clone; every clone talks to the same task.
#[derive(Clone)]
pub struct GuardHandle {
    tx: mpsc::Sender<GuardCommand>,
}

/// Starts the guard task. It ends once every handle is dropped.
pub fn spawn(guard: NavigationGuard, capacity: usize) -> (GuardHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let task = tokio::spawn(run(guard, rx));
    (GuardHandle { tx }, task)
}

async fn run(guard: NavigationGuard, mut rx: mpsc::Receiver<GuardCommand>) {
    let mut surfaces = SurfaceRegistry::default();
    info!("Navigation guard running");

    while let Some(command) = rx.recv().await {
        match command {
            GuardCommand::OpenBuiltin { page, reply } => {
                let id = surfaces.allocate_id();
                surfaces.insert(guard.open_builtin(id, page));
                let _ = reply.send(id);
            }
            GuardCommand::Attach { builder, reply } => {
                let id = surfaces.allocate_id();
                let result = guard.attach(id, builder).map(|s| surfaces.insert(s));
                let _ = reply.send(result);
            }
            GuardCommand::Navigate {
                surface,
                raw,
                reply,
            } => {
                let target = surfaces
                    .get_mut(surface)
                    .map(|s| guard.navigate(s, &raw));
                let _ = reply.send(target);
            }
            GuardCommand::Event {
                surface,
                event,
                reply,
            } => {
                let decision = match surfaces.get_mut(surface) {
                    Some(s) => guard.handle(s, event),
                    None => {
                        debug!(%surface, "Event for unknown surface");
                        NavigationDecision::Cancel {
                            reason: BlockReason::SurfaceClosed,
                            stop_loading: false,
                        }
                    }
                };
                let _ = reply.send(decision);
            }
            GuardCommand::NewWindow { opener, url, reply } => {
                let outcome = surfaces.get(opener).map(|s| guard.new_window(s, &url));
                let result = match outcome {
                    None => Err(BlockReason::SurfaceClosed),
                    Some(NewWindowOutcome::Dropped(reason)) => Err(reason),
                    Some(NewWindowOutcome::OpenTab(target)) => {
                        let id = surfaces.allocate_id();
                        guard
                            .attach(id, SurfaceBuilder::new(target.as_str()))
                            .map(|s| surfaces.insert(s))
                    }
                };
                let _ = reply.send(result);
            }
            GuardCommand::Snapshot { surface, reply } => {
                let _ = reply.send(surfaces.get(surface).cloned());
            }
            GuardCommand::List { reply } => {
                let _ = reply.send(surfaces.ids().collect());
            }
            GuardCommand::Close { surface, reply } => {
                let closed = surfaces.close(surface).is_some();
                if closed {
                    debug!(%surface, "Surface closed");
                }
                let _ = reply.send(closed);
            }
        }
    }

    info!(open = surfaces.len(), "Navigation guard stopped");
}

impl GuardHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> GuardCommand,
    ) -> ShellResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| ShellError::ServiceClosed)?;
        rx.await.map_err(|_| ShellError::ServiceClosed)
    }

    pub async fn open_builtin(&self, page: BuiltinPage) -> ShellResult<SurfaceId> {
        self.request(|reply| GuardCommand::OpenBuiltin { page, reply })
            .await
    }

    pub async fn attach(&self, builder: SurfaceBuilder) -> ShellResult<Result<SurfaceId, BlockReason>> {
        self.request(|reply| GuardCommand::Attach { builder, reply })
            .await
    }

    /// `None` when the surface does not exist.
    pub async fn navigate(&self, surface: SurfaceId, raw: &str) -> ShellResult<Option<NavigationTarget>> {
        let raw = raw.to_owned();
        self.request(|reply| GuardCommand::Navigate {
            surface,
            raw,
            reply,
        })
        .await
    }

    pub async fn dispatch(&self, surface: SurfaceId, event: NavigationEvent) -> ShellResult<NavigationDecision> {
        self.request(|reply| GuardCommand::Event {
            surface,
            event,
            reply,
        })
        .await
    }

    /// Opens `url` in a new tab when the guard accepts it.
    pub async fn new_window(&self, opener: SurfaceId, url: &str) -> ShellResult<Result<SurfaceId, BlockReason>> {
        let url = url.to_owned();
        self.request(|reply| GuardCommand::NewWindow { opener, url, reply })
            .await
    }

    pub async fn snapshot(&self, surface: SurfaceId) -> ShellResult<Option<ContentSurface>> {
        self.request(|reply| GuardCommand::Snapshot { surface, reply })
            .await
    }

    pub async fn surfaces(&self) -> ShellResult<Vec<SurfaceId>> {
        self.request(|reply| GuardCommand::List { reply }).await
    }

    pub async fn close(&self, surface: SurfaceId) -> ShellResult<bool> {
        self.request(|reply| GuardCommand::Close { surface, reply })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::classifier::{TargetCategory, UrlClassifier};
    use crate::local_pages::LocalPages;
    use crate::notify::testing::RecordingNotifier;
    use crate::surface::NavigationState;
    use crate::warning::WarningCenter;

    const ROOT: &str = "file:///srv/obsidian/pages/";

    fn start() -> (GuardHandle, JoinHandle<()>, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let pages = LocalPages::from_root_url(url::Url::parse(ROOT).unwrap()).unwrap();
        let guard = NavigationGuard::new(
            UrlClassifier::default(),
            pages,
            Arc::new(WarningCenter::default()),
            notifier.clone(),
        );
        let (handle, task) = spawn(guard, 16);
        (handle, task, notifier)
    }

    #[tokio::test]
    async fn test_builtin_then_remote_navigation() {
        let (guard, _task, _) = start();
        let tab = guard.open_builtin(BuiltinPage::NewTab).await.unwrap();

        let target = guard.navigate(tab, "rust lang").await.unwrap().unwrap();
        assert_eq!(target.category(), TargetCategory::SearchQuery);

        let decision = guard
            .dispatch(tab, NavigationEvent::DidNavigate(target.resolved_url().unwrap().to_string()))
            .await
            .unwrap();
        assert!(decision.is_allowed());

        let snapshot = guard.snapshot(tab).await.unwrap().unwrap();
        assert_eq!(snapshot.navigation_state(), NavigationState::Committed);
        assert!(!snapshot.is_trusted_local_surface());
    }

    #[tokio::test]
    async fn test_events_are_resolved_in_order() {
        let (guard, _task, notifier) = start();
        let tab = guard
            .attach(SurfaceBuilder::new("https://example.com/"))
            .await
            .unwrap()
            .unwrap();

        let first = guard.dispatch(tab, NavigationEvent::WillNavigate("javascript:alert(1)".into()));
        let second = guard.dispatch(tab, NavigationEvent::WillNavigate("https://example.org/".into()));
        let (first, second) = tokio::join!(first, second);

        assert!(!first.unwrap().is_allowed());
        assert!(second.unwrap().is_allowed());
        assert_eq!(notifier.warnings().len(), 1);
    }

    #[tokio::test]
    async fn test_new_window_opens_a_tab() {
        let (guard, _task, _) = start();
        let opener = guard
            .attach(SurfaceBuilder::new("https://example.com/"))
            .await
            .unwrap()
            .unwrap();

        let tab = guard
            .new_window(opener, "https://example.org/popup")
            .await
            .unwrap()
            .unwrap();
        assert_ne!(tab, opener);
        assert_eq!(guard.surfaces().await.unwrap(), vec![opener, tab]);

        let dropped = guard.new_window(opener, "file:///etc/passwd").await.unwrap();
        assert_eq!(dropped, Err(BlockReason::BlockedProtocol));
        let dropped = guard.new_window(opener, "gopher://example.org/x").await.unwrap();
        assert_eq!(dropped, Err(BlockReason::UntrustedTarget));
    }

    #[tokio::test]
    async fn test_closed_surface_events_are_cancelled() {
        let (guard, _task, notifier) = start();
        let tab = guard.open_builtin(BuiltinPage::History).await.unwrap();
        let liveness = guard.snapshot(tab).await.unwrap().unwrap().liveness();

        assert!(guard.close(tab).await.unwrap());
        assert!(!liveness.is_alive());
        assert!(!guard.close(tab).await.unwrap());

        let decision = guard
            .dispatch(tab, NavigationEvent::DidNavigate("https://example.com/".into()))
            .await
            .unwrap();
        assert_eq!(
            decision,
            NavigationDecision::Cancel {
                reason: BlockReason::SurfaceClosed,
                stop_loading: false
            }
        );
        assert!(notifier.warnings().is_empty());
        assert!(guard.navigate(tab, "example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_untrusted_attach_is_refused() {
        let (guard, _task, _) = start();
        let refused = guard
            .attach(SurfaceBuilder::new("file:///home/user/secret.html"))
            .await
            .unwrap();
        assert_eq!(refused, Err(BlockReason::BlockedProtocol));
        assert!(guard.surfaces().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_task_stops_when_handles_drop() {
        let (guard, task, _) = start();
        drop(guard);
        task.await.unwrap();
    }
}
