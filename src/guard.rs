//! Navigation guard: the allow/block decision for every event a content
//! surface emits.
//!
//! ## Trust rules
//!
//! A target is trusted when one of these holds:
//!
//! 1. it is an already-formed `http`/`https` URL (no search fallback),
//! 2. it is a `file:` URL inside the local-pages root,
//! 3. the surface itself shows a built-in page (new tab, settings, history):
//!    those pages come from the shell, not from remote content.
//!
//! ## Effects
//!
//! ```text
//! will-navigate / will-redirect  ── trusted ──▶ Allow, record URL (Pending)
//!                                └─ untrusted ─▶ Cancel + warning, URL untouched
//! did-navigate                   ── trusted ──▶ Allow, record URL (Committed)
//!                                └─ untrusted ─▶ Cancel + stop loading + warning
//! certificate-error              ─────────────▶ Cancel + stop loading + warning
//! new-window                     ── http(s) ──▶ open a new tab with that URL
//!                                └─ other ────▶ drop + warning (never a search)
//! attach                         ── trusted ──▶ build with enforced isolation
//!                                └─ untrusted ─▶ never instantiated
//! ```

use std::borrow::Cow;
use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use crate::classifier::{NavigationTarget, UrlClassifier, is_blocked_protocol};
use crate::local_pages::{BuiltinPage, LocalPages};
use crate::notify::{Notice, Notifier};
use crate::surface::{ContentSurface, NavigationState, SurfaceBuilder, SurfaceId};
use crate::warning::{BlockReason, WarningCenter};

/// Longest target quoted in a warning.
const MAX_TARGET_IN_WARNING: usize = 120;

/// Events a content surface reports to the guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationEvent {
    WillNavigate(String),
    WillRedirect(String),
    /// Already committed by the engine.
    DidNavigate(String),
    CertificateError(String),
}

impl NavigationEvent {
    pub fn url(&self) -> &str {
        match self {
            Self::WillNavigate(url)
            | Self::WillRedirect(url)
            | Self::DidNavigate(url)
            | Self::CertificateError(url) => url,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::WillNavigate(_) => "will-navigate",
            Self::WillRedirect(_) => "will-redirect",
            Self::DidNavigate(_) => "did-navigate",
            Self::CertificateError(_) => "certificate-error",
        }
    }
}

/// Decision applied back onto the triggering event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationDecision {
    Allow,
    Cancel {
        reason: BlockReason,
        /// The surface must stop loading (the navigation already happened).
        stop_loading: bool,
    },
}

impl NavigationDecision {
    pub fn is_allowed(self) -> bool {
        self == Self::Allow
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewWindowOutcome {
    /// Open a new tab on exactly this URL.
    OpenTab(Url),
    Dropped(BlockReason),
}

enum Trust {
    External(Url),
    Local(Url),
    /// Built-in page surface; the URL is recorded only when it is a
    /// document URL (http, https, file).
    Exempt(Option<Url>),
}

pub struct NavigationGuard {
    classifier: UrlClassifier,
    pages: LocalPages,
    warnings: Arc<WarningCenter>,
    notifier: Arc<dyn Notifier>,
}

impl NavigationGuard {
    pub fn new(
        classifier: UrlClassifier,
        pages: LocalPages,
        warnings: Arc<WarningCenter>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            classifier,
            pages,
            warnings,
            notifier,
        }
    }

    pub fn classifier(&self) -> &UrlClassifier {
        &self.classifier
    }

    pub fn pages(&self) -> &LocalPages {
        &self.pages
    }

    pub fn warnings(&self) -> &WarningCenter {
        &self.warnings
    }

    /// Resolves one navigation event of `surface`.
    pub fn handle(&self, surface: &mut ContentSurface, event: NavigationEvent) -> NavigationDecision {
        if !surface.is_active() {
            debug!(surface = %surface.id(), event = event.kind(), "Event for closed surface ignored");
            return NavigationDecision::Cancel {
                reason: BlockReason::SurfaceClosed,
                stop_loading: false,
            };
        }

        let kind = event.kind();
        match event {
            NavigationEvent::CertificateError(url) => {
                self.block(surface.id(), BlockReason::CertificateError, &url);
                surface.stop_loading();
                NavigationDecision::Cancel {
                    reason: BlockReason::CertificateError,
                    stop_loading: true,
                }
            }
            NavigationEvent::WillNavigate(url) | NavigationEvent::WillRedirect(url) => {
                match self.assess(surface, &url) {
                    Ok(trust) => {
                        debug!(surface = %surface.id(), event = kind, url = %url, "Navigation allowed");
                        apply(surface, trust, NavigationState::Pending);
                        NavigationDecision::Allow
                    }
                    Err(reason) => {
                        self.block(surface.id(), reason, &url);
                        NavigationDecision::Cancel {
                            reason,
                            stop_loading: false,
                        }
                    }
                }
            }
            NavigationEvent::DidNavigate(url) => match self.assess(surface, &url) {
                Ok(trust) => {
                    debug!(surface = %surface.id(), event = kind, url = %url, "Navigation committed");
                    apply(surface, trust, NavigationState::Committed);
                    NavigationDecision::Allow
                }
                Err(reason) => {
                    self.block(surface.id(), reason, &url);
                    surface.stop_loading();
                    NavigationDecision::Cancel {
                        reason,
                        stop_loading: true,
                    }
                }
            },
        }
    }

    /// Address-bar submission. The classifier output is shell-originated, so
    /// anything it resolves is loaded; a rejection leaves the surface as is.
    pub fn navigate(&self, surface: &mut ContentSurface, raw: &str) -> NavigationTarget {
        let target = self.classifier.classify(raw);
        if !surface.is_active() {
            return target;
        }
        match target.resolved_url() {
            Some(url) => {
                info!(surface = %surface.id(), url = %url, category = ?target.category(), "Navigating");
                surface.record_navigation(url.clone(), false, NavigationState::Pending);
            }
            None => self.block(surface.id(), BlockReason::UntrustedTarget, raw),
        }
        target
    }

    /// `target=_blank` / `window.open` request from `opener`. Never opened
    /// in-process and never rewritten into a search.
    pub fn new_window(&self, opener: &ContentSurface, url: &str) -> NewWindowOutcome {
        match self.classifier.classify_download_source(url).into_url() {
            Some(resolved) => {
                info!(opener = %opener.id(), url = %resolved, "New window opens as tab");
                NewWindowOutcome::OpenTab(resolved)
            }
            None => {
                let reason = reason_for(url);
                self.block(opener.id(), reason, url);
                NewWindowOutcome::Dropped(reason)
            }
        }
    }

    /// Vets the initial source of a surface before it exists. On success the
    /// surface is built with enforced isolation.
    pub fn attach(&self, id: SurfaceId, builder: SurfaceBuilder) -> Result<ContentSurface, BlockReason> {
        let src = builder.src().to_owned();

        if let Some(url) = self.classifier.accept_external(&src) {
            debug!(surface = %id, url = %url, "Surface attached");
            return Ok(builder.build(id, url, false));
        }
        if self.pages.is_trusted(&src)
            && let Ok(url) = Url::parse(&src)
        {
            let builder = match self.pages.builtin_page(&url) {
                Some(page) => builder.builtin(page),
                None => builder,
            };
            debug!(surface = %id, url = %url, "Local surface attached");
            return Ok(builder.build(id, url, true));
        }

        let reason = reason_for(&src);
        debug!(surface = %id, "Surface attachment refused");
        self.block(id, reason, &src);
        Err(reason)
    }

    /// A surface showing one of the built-in pages.
    pub fn open_builtin(&self, id: SurfaceId, page: BuiltinPage) -> ContentSurface {
        let url = self.pages.page_url(page);
        SurfaceBuilder::new(url.as_str())
            .builtin(page)
            .build(id, url, true)
    }

    fn assess(&self, surface: &ContentSurface, url: &str) -> Result<Trust, BlockReason> {
        if let Some(external) = self.classifier.accept_external(url) {
            return Ok(Trust::External(external));
        }
        if self.pages.is_trusted(url)
            && let Ok(local) = Url::parse(url)
        {
            return Ok(Trust::Local(local));
        }
        if surface.is_trusted_local_surface() {
            let recorded = Url::parse(url)
                .ok()
                .filter(|u| matches!(u.scheme(), "http" | "https" | "file"));
            return Ok(Trust::Exempt(recorded));
        }
        Err(reason_for(url))
    }

    fn block(&self, surface: SurfaceId, reason: BlockReason, target: &str) {
        let target = shorten(target);
        warn!(%surface, %reason, target = %target, "Blocked");
        if let Some(warning) = self.warnings.raise(reason.message(&target)) {
            self.notifier.notify(
                surface,
                Notice::Warning {
                    message: warning.message().to_owned(),
                },
            );
        }
    }
}

fn apply(surface: &mut ContentSurface, trust: Trust, state: NavigationState) {
    match trust {
        Trust::External(url) => surface.record_navigation(url, false, state),
        Trust::Local(url) => surface.record_navigation(url, true, state),
        Trust::Exempt(Some(url)) => {
            let local = url.scheme() == "file";
            surface.record_navigation(url, local, state);
        }
        Trust::Exempt(None) => {}
    }
}

fn reason_for(target: &str) -> BlockReason {
    if is_blocked_protocol(target.trim()) {
        BlockReason::BlockedProtocol
    } else {
        BlockReason::UntrustedTarget
    }
}

fn shorten(target: &str) -> Cow<'_, str> {
    if target.chars().count() <= MAX_TARGET_IN_WARNING {
        Cow::Borrowed(target)
    } else {
        let head: String = target.chars().take(MAX_TARGET_IN_WARNING).collect();
        Cow::Owned(format!("{head}…"))
    }
}
