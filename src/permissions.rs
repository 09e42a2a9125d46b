//! Permission requests and checks from content surfaces.
//!
//! A permission is granted only when the requesting surface is a secure
//! context *and* the permission is on the allow-list. Everything else is
//! denied without ever prompting.

use std::net::{Ipv4Addr, Ipv6Addr};

use tracing::debug;
use url::{Host, Url};

use crate::config::PrivacyConfig;
use crate::surface::ContentSurface;

#[derive(Debug, Clone)]
pub struct PermissionPolicy {
    allowed: Vec<String>,
}

impl Default for PermissionPolicy {
    fn default() -> Self {
        Self::from_config(&PrivacyConfig::default())
    }
}

impl PermissionPolicy {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &PrivacyConfig) -> Self {
        Self::new(config.allowed_permissions.iter().cloned())
    }

    /// Grant decision for `(surface_url, permission)`.
    pub fn check(&self, surface_url: Option<&Url>, permission: &str) -> bool {
        let secure = surface_url.is_some_and(is_secure_context);
        let listed = self.allowed.iter().any(|p| p == permission);
        let granted = secure && listed;
        debug!(
            url = surface_url.map(Url::as_str).unwrap_or(""),
            permission, secure, listed, granted, "Permission decision"
        );
        granted
    }

    /// Same decision, using the surface's current URL.
    pub fn check_surface(&self, surface: &ContentSurface, permission: &str) -> bool {
        surface.is_active() && self.check(surface.url(), permission)
    }
}

/// `https`, or `http` on a loopback host.
pub fn is_secure_context(url: &Url) -> bool {
    match url.scheme() {
        "https" => true,
        "http" => match url.host() {
            Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
            Some(Host::Ipv4(ip)) => ip == Ipv4Addr::LOCALHOST || ip == Ipv4Addr::UNSPECIFIED,
            Some(Host::Ipv6(ip)) => ip == Ipv6Addr::LOCALHOST,
            None => false,
        },
        _ => false,
    }
}
