//! Security warnings shown to the user when something is blocked.
//!
//! A single most-recent-warning slot is shared by every surface. An identical
//! warning raised again inside the suppression window is swallowed so that a
//! page hammering a blocked target cannot flood the UI. Once the window has
//! elapsed the slot is reset and the next warning is shown again.

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Why a navigation, window, download or load was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// `javascript:`, `data:`, `file:` outside the local root, ...
    BlockedProtocol,
    UntrustedTarget,
    CertificateError,
    DownloadSourceRejected,
    /// The surface was already closed; no warning is raised.
    SurfaceClosed,
}

impl BlockReason {
    /// User-facing message naming the blocked target.
    pub fn message(self, target: &str) -> String {
        match self {
            Self::BlockedProtocol => format!("Blocked navigation to {target}: protocol not allowed"),
            Self::UntrustedTarget => format!("Blocked navigation to untrusted target {target}"),
            Self::CertificateError => format!(
                "{target} has an invalid security certificate. Connection blocked for your safety."
            ),
            Self::DownloadSourceRejected => format!("Download blocked: untrusted source {target}"),
            Self::SurfaceClosed => format!("Ignored event for closed tab ({target})"),
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BlockedProtocol => "blocked protocol",
            Self::UntrustedTarget => "untrusted target",
            Self::CertificateError => "certificate error",
            Self::DownloadSourceRejected => "download source rejected",
            Self::SurfaceClosed => "surface closed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityWarning {
    message: String,
    first_shown_at: Instant,
}

impl SecurityWarning {
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn first_shown_at(&self) -> Instant {
        self.first_shown_at
    }
}

/// Owner of the shared most-recent-warning state.
///
/// Mutated from the event loop only, but guarded by a mutex so that download
/// tasks on other threads serialize through it as well.
#[derive(Debug)]
pub struct WarningCenter {
    window: Duration,
    last: Mutex<Option<SecurityWarning>>,
}

impl Default for WarningCenter {
    fn default() -> Self {
        Self::new(Duration::from_secs(4))
    }
}

impl WarningCenter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: Mutex::new(None),
        }
    }

    /// Raises a warning now. Returns `None` when it was suppressed.
    pub fn raise(&self, message: impl Into<String>) -> Option<SecurityWarning> {
        self.raise_at(message, Instant::now())
    }

    pub fn raise_at(&self, message: impl Into<String>, now: Instant) -> Option<SecurityWarning> {
        let message = message.into();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(previous) = last.as_ref()
            && previous.message == message
            && now.saturating_duration_since(previous.first_shown_at) < self.window
        {
            debug!(message = %message, "Duplicate security warning suppressed");
            return None;
        }

        warn!(message = %message, "Security warning");
        let warning = SecurityWarning {
            message,
            first_shown_at: now,
        };
        *last = Some(warning.clone());
        Some(warning)
    }

    /// The warning currently on screen, if its window has not elapsed.
    pub fn current_at(&self, now: Instant) -> Option<SecurityWarning> {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if last
            .as_ref()
            .is_some_and(|w| now.saturating_duration_since(w.first_shown_at) >= self.window)
        {
            *last = None;
        }
        last.clone()
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_warning_suppressed_inside_window() {
        let center = WarningCenter::default();
        let t0 = Instant::now();
        assert!(center.raise_at("blocked", t0).is_some());
        assert!(center.raise_at("blocked", t0 + Duration::from_secs(1)).is_none());
        assert!(center.raise_at("blocked", t0 + Duration::from_millis(3_999)).is_none());
    }

    #[test]
    fn test_window_is_measured_from_first_display() {
        let center = WarningCenter::default();
        let t0 = Instant::now();
        center.raise_at("blocked", t0);
        // Suppressed repeats do not extend the window.
        center.raise_at("blocked", t0 + Duration::from_secs(3));
        let again = center.raise_at("blocked", t0 + Duration::from_secs(4));
        assert_eq!(again.unwrap().first_shown_at(), t0 + Duration::from_secs(4));
    }

    #[test]
    fn test_different_message_is_shown_immediately() {
        let center = WarningCenter::default();
        let t0 = Instant::now();
        center.raise_at("first", t0);
        assert!(center.raise_at("second", t0).is_some());
        // "first" is no longer the most recent, so it shows again.
        assert!(center.raise_at("first", t0).is_some());
    }

    #[test]
    fn test_current_resets_after_window() {
        let center = WarningCenter::new(Duration::from_secs(4));
        let t0 = Instant::now();
        center.raise_at("blocked", t0);
        assert!(center.current_at(t0 + Duration::from_secs(2)).is_some());
        assert!(center.current_at(t0 + Duration::from_secs(5)).is_none());
        assert!(center.current_at(t0).is_none(), "slot stays cleared");
    }

    #[test]
    fn test_messages_name_the_target() {
        let msg = BlockReason::UntrustedTarget.message("data:text/html,x");
        assert!(msg.contains("data:text/html,x"));
        assert!(BlockReason::CertificateError.message("https://bad.example").contains("certificate"));
    }
}
