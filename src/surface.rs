//! Content surfaces: one isolated browsing context per tab.
//!
//! A surface can only be instantiated through [`SurfaceBuilder`], and only by
//! the navigation guard once the initial source has been vetted. Whatever
//! isolation settings the caller asked for, the builder overwrites them with
//! [`IsolationFlags::ENFORCED`] before construction.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;
use url::Url;

use crate::classifier::display_url;
use crate::local_pages::BuiltinPage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SurfaceId(u64);

impl SurfaceId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    Active,
    Closed,
}

/// Per-surface navigation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationState {
    Idle,
    /// A navigation was allowed and has not committed yet.
    Pending,
    Committed,
}

/// Padlock shown next to the address bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityIndicator {
    Secure,
    Insecure,
    /// Local pages show no indicator.
    Hidden,
}

impl SecurityIndicator {
    pub fn for_url(url: &Url, local: bool) -> Self {
        match url.scheme() {
            _ if local => Self::Hidden,
            "https" => Self::Secure,
            "http" => Self::Insecure,
            _ => Self::Hidden,
        }
    }
}

/// Security-relevant settings of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsolationFlags {
    /// Page scripts run in a world separate from the shell's.
    pub context_isolation: bool,
    /// Page scripts may reach host (shell process) APIs.
    pub host_api_access: bool,
    pub origin_isolation: bool,
    pub sandbox: bool,
    /// Same-origin policy and mixed-content blocking.
    pub web_security: bool,
}

impl IsolationFlags {
    pub const ENFORCED: Self = Self {
        context_isolation: true,
        host_api_access: false,
        origin_isolation: true,
        sandbox: true,
        web_security: true,
    };
}

impl Default for IsolationFlags {
    fn default() -> Self {
        Self::ENFORCED
    }
}

/// Liveness token of a surface, observable after the surface is gone.
#[derive(Debug, Clone)]
pub struct SurfaceLiveness(Arc<AtomicBool>);

impl SurfaceLiveness {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn kill(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Token of a surface that no longer exists.
    pub fn dead() -> Self {
        let token = Self::new();
        token.kill();
        token
    }
}

/// Requested configuration for a dynamically attached surface.
#[derive(Debug, Clone)]
pub struct SurfaceBuilder {
    src: String,
    isolation: IsolationFlags,
    allow_popups: bool,
    builtin: Option<BuiltinPage>,
}

impl SurfaceBuilder {
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            isolation: IsolationFlags::ENFORCED,
            allow_popups: false,
            builtin: None,
        }
    }

    /// Requested isolation. Overwritten at build time.
    pub fn isolation(mut self, flags: IsolationFlags) -> Self {
        self.isolation = flags;
        self
    }

    pub fn allow_popups(mut self, allow: bool) -> Self {
        self.allow_popups = allow;
        self
    }

    pub(crate) fn builtin(mut self, page: BuiltinPage) -> Self {
        self.builtin = Some(page);
        self
    }

    pub fn src(&self) -> &str {
        &self.src
    }

    pub fn requested_isolation(&self) -> IsolationFlags {
        self.isolation
    }

    pub(crate) fn build(self, id: SurfaceId, url: Url, local: bool) -> ContentSurface {
        if self.isolation != IsolationFlags::ENFORCED {
            debug!(%id, requested = ?self.isolation, "Overriding requested isolation flags");
        }
        let trusted_local = self.builtin.is_some();
        let title = match self.builtin {
            Some(page) => builtin_title(page).to_owned(),
            None => display_url(&url),
        };
        ContentSurface {
            id,
            indicator: SecurityIndicator::for_url(&url, local || trusted_local),
            url: Some(url),
            title,
            trusted_local,
            state: SurfaceState::Active,
            navigation: NavigationState::Pending,
            loading: true,
            isolation: IsolationFlags::ENFORCED,
            allow_popups: self.allow_popups,
            liveness: SurfaceLiveness::new(),
        }
    }
}

fn builtin_title(page: BuiltinPage) -> &'static str {
    match page {
        BuiltinPage::NewTab => "New Tab",
        BuiltinPage::Settings => "Settings",
        BuiltinPage::History => "History",
    }
}

#[derive(Debug, Clone)]
pub struct ContentSurface {
    id: SurfaceId,
    url: Option<Url>,
    title: String,
    trusted_local: bool,
    state: SurfaceState,
    navigation: NavigationState,
    indicator: SecurityIndicator,
    loading: bool,
    isolation: IsolationFlags,
    allow_popups: bool,
    liveness: SurfaceLiveness,
}

impl ContentSurface {
    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// `true` while the surface shows one of the shell's own pages.
    pub fn is_trusted_local_surface(&self) -> bool {
        self.trusted_local
    }

    pub fn state(&self) -> SurfaceState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SurfaceState::Active
    }

    pub fn navigation_state(&self) -> NavigationState {
        self.navigation
    }

    pub fn indicator(&self) -> SecurityIndicator {
        self.indicator
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn isolation(&self) -> IsolationFlags {
        self.isolation
    }

    pub fn allows_popups(&self) -> bool {
        self.allow_popups
    }

    pub fn liveness(&self) -> SurfaceLiveness {
        self.liveness.clone()
    }

    /// Title reported by the page. Empty titles keep the URL form.
    pub fn set_title(&mut self, title: &str) {
        let title = title.trim();
        if !title.is_empty() {
            self.title = title.to_owned();
        }
    }

    /// Records an allowed navigation and refreshes the derived indicators.
    pub(crate) fn record_navigation(&mut self, url: Url, local: bool, state: NavigationState) {
        if state == NavigationState::Committed && !local {
            // Remote content now occupies the surface.
            self.trusted_local = false;
        }
        self.indicator = SecurityIndicator::for_url(&url, local || self.trusted_local);
        if !self.trusted_local {
            self.title = display_url(&url);
        }
        self.url = Some(url);
        self.navigation = state;
        self.loading = state == NavigationState::Pending;
    }

    pub(crate) fn stop_loading(&mut self) {
        self.loading = false;
        self.navigation = NavigationState::Idle;
    }

    fn close(&mut self) {
        self.state = SurfaceState::Closed;
        self.loading = false;
        self.liveness.kill();
    }
}

/// Tabs and the surfaces they own.
#[derive(Debug, Default)]
pub struct SurfaceRegistry {
    next_id: u64,
    surfaces: BTreeMap<SurfaceId, ContentSurface>,
}

impl SurfaceRegistry {
    pub fn allocate_id(&mut self) -> SurfaceId {
        self.next_id += 1;
        SurfaceId(self.next_id)
    }

    pub fn insert(&mut self, surface: ContentSurface) -> SurfaceId {
        let id = surface.id();
        self.surfaces.insert(id, surface);
        id
    }

    pub fn get(&self, id: SurfaceId) -> Option<&ContentSurface> {
        self.surfaces.get(&id)
    }

    pub fn get_mut(&mut self, id: SurfaceId) -> Option<&mut ContentSurface> {
        self.surfaces.get_mut(&id)
    }

    /// Closes the tab: the surface is marked closed and dropped.
    pub fn close(&mut self, id: SurfaceId) -> Option<ContentSurface> {
        let mut surface = self.surfaces.remove(&id)?;
        surface.close();
        Some(surface)
    }

    pub fn ids(&self) -> impl Iterator<Item = SurfaceId> + '_ {
        self.surfaces.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }
}
