//! Bundled local pages and the trusted-local-path check.
//!
//! The shell ships its built-in pages (new tab, settings, history) in a single
//! directory, the local-pages root. A `file:` URL is trusted only when it is a
//! proven descendant of that root. The check is lexical: both sides are
//! percent-decoded *before* comparing, so an encoded `..%2F` cannot smuggle a
//! traversal past the prefix test.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use url::Url;

use crate::classifier::NavigationTarget;
use crate::error::{ShellError, ShellResult};

/// Pages bundled with the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinPage {
    NewTab,
    Settings,
    History,
}

impl BuiltinPage {
    pub const ALL: [BuiltinPage; 3] = [Self::NewTab, Self::Settings, Self::History];

    pub fn file_name(self) -> &'static str {
        match self {
            Self::NewTab => "newtab.html",
            Self::Settings => "settings.html",
            Self::History => "history.html",
        }
    }
}

/// The local-pages root, fixed at process start.
#[derive(Debug, Clone)]
pub struct LocalPages {
    root: Url,
}

impl LocalPages {
    /// Builds the root from a directory. Existing directories are
    /// canonicalized (symlinks resolved); others are made absolute.
    pub fn new(root: &Path) -> ShellResult<Self> {
        let resolved = match root.canonicalize() {
            Ok(canonical) => canonical,
            Err(_) => std::path::absolute(root)?,
        };
        let url = Url::from_directory_path(&resolved)
            .map_err(|()| ShellError::InvalidLocalRoot(resolved.display().to_string()))?;
        Self::from_root_url(url)
    }

    /// Builds the root from a `file:` URL.
    pub fn from_root_url(url: Url) -> ShellResult<Self> {
        if url.scheme() != "file" || url.host().is_some() || canonical_root(url.as_str()).is_none()
        {
            return Err(ShellError::InvalidLocalRoot(url.to_string()));
        }
        let mut root = url;
        if !root.path().ends_with('/') {
            let path = format!("{}/", root.path());
            root.set_path(&path);
        }
        info!(root = %root, "Local pages root");
        Ok(Self { root })
    }

    pub fn root_url(&self) -> &Url {
        &self.root
    }

    /// `file:` URL of a built-in page.
    pub fn page_url(&self, page: BuiltinPage) -> Url {
        let mut url = self.root.clone();
        let path = format!("{}{}", self.root.path(), page.file_name());
        url.set_path(&path);
        url
    }

    /// Built-in page as a `TrustedLocal` navigation target.
    pub fn resolve(&self, page: BuiltinPage) -> NavigationTarget {
        let url = self.page_url(page);
        NavigationTarget::trusted_local(page.file_name(), url)
    }

    /// Which built-in page, if any, `url` designates.
    pub fn builtin_page(&self, url: &Url) -> Option<BuiltinPage> {
        BuiltinPage::ALL
            .into_iter()
            .find(|page| self.page_url(*page).path() == url.path() && url.scheme() == "file")
    }

    pub fn is_trusted(&self, url: &str) -> bool {
        is_trusted_local(url, self.root.as_str())
    }

    /// Filesystem location of the root, for diagnostics.
    pub fn root_path(&self) -> Option<PathBuf> {
        self.root.to_file_path().ok()
    }
}

/// `true` iff `url` is a `file:` URL lying inside `local_root`.
///
/// `local_root` may be a `file:` URL or an absolute filesystem path. Any
/// parse or decode failure means untrusted.
pub fn is_trusted_local(url: &str, local_root: &str) -> bool {
    let Some(root) = canonical_root(local_root) else {
        return false;
    };
    let Some(candidate) = canonical_candidate(url) else {
        return false;
    };

    let Some(remainder) = candidate.strip_prefix(root.as_str()) else {
        debug!(url, root = %root, "file URL outside local pages root");
        return false;
    };
    if has_parent_segment(remainder) {
        debug!(url, "decoded traversal segment in local URL");
        return false;
    }
    true
}

/// Decoded absolute path of a `file:` candidate.
fn canonical_candidate(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if parsed.scheme() != "file" || parsed.host().is_some() {
        return None;
    }
    decode(parsed.path())
}

/// Decoded absolute path of the root, always ending with `/`.
fn canonical_root(local_root: &str) -> Option<String> {
    let url = if local_root.get(..5).is_some_and(|s| s.eq_ignore_ascii_case("file:")) {
        Url::parse(local_root).ok()?
    } else {
        let path = Path::new(local_root);
        if !path.is_absolute() {
            return None;
        }
        // Round-trip through the parser so dot segments are resolved.
        Url::parse(Url::from_directory_path(path).ok()?.as_str()).ok()?
    };
    if url.scheme() != "file" || url.host().is_some() {
        return None;
    }

    let mut decoded = decode(url.path())?;
    if has_parent_segment(&decoded) {
        return None;
    }
    if !decoded.ends_with('/') {
        decoded.push('/');
    }
    Some(decoded)
}

fn decode(path: &str) -> Option<String> {
    let decoded = urlencoding::decode(path).ok()?;
    if decoded.contains('\0') {
        return None;
    }
    Some(match decoded {
        Cow::Borrowed(s) => s.to_owned(),
        Cow::Owned(s) => s,
    })
}

fn has_parent_segment(path: &str) -> bool {
    path.split(['/', '\\']).any(|segment| segment == "..")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "file:///srv/obsidian/pages/";

    #[test]
    fn test_page_inside_root_is_trusted() {
        assert!(is_trusted_local("file:///srv/obsidian/pages/newtab.html", ROOT));
        assert!(is_trusted_local(
            "file:///srv/obsidian/pages/assets/style.css?v=2",
            ROOT
        ));
    }

    #[test]
    fn test_root_without_trailing_slash() {
        assert!(is_trusted_local(
            "file:///srv/obsidian/pages/newtab.html",
            "file:///srv/obsidian/pages"
        ));
        // Sibling directory sharing the prefix.
        assert!(!is_trusted_local(
            "file:///srv/obsidian/pages-evil/newtab.html",
            "file:///srv/obsidian/pages"
        ));
    }

    #[test]
    fn test_non_file_schemes_are_untrusted() {
        assert!(!is_trusted_local("https://srv/obsidian/pages/newtab.html", ROOT));
        assert!(!is_trusted_local("data:text/html,hi", ROOT));
    }

    #[test]
    fn test_plain_traversal_is_normalized_away() {
        assert!(!is_trusted_local("file:///srv/obsidian/pages/../secret", ROOT));
        assert!(!is_trusted_local("file:///srv/obsidian/pages/%2e%2e/secret", ROOT));
    }

    #[test]
    fn test_encoded_slash_traversal_is_rejected() {
        // Raw string stays under the root; decoded it climbs out.
        let url = "file:///srv/obsidian/pages/..%2F..%2Fetc%2Fpasswd";
        assert!(url.starts_with(ROOT));
        assert!(!is_trusted_local(url, ROOT));
        assert!(!is_trusted_local("file:///srv/obsidian/pages/a/..%5Csecret", ROOT));
        assert!(!is_trusted_local("file:///srv/obsidian/pages/a/%2E%2E%2F", ROOT));
    }

    #[test]
    fn test_remote_file_hosts_are_untrusted() {
        assert!(!is_trusted_local("file://fileserver/srv/obsidian/pages/x.html", ROOT));
    }

    #[test]
    fn test_garbage_is_untrusted() {
        assert!(!is_trusted_local("not a url", ROOT));
        assert!(!is_trusted_local("file:///srv/obsidian/pages/x%00.html", ROOT));
        assert!(!is_trusted_local("file:///srv/obsidian/pages/x.html", "relative/root"));
    }

    #[test]
    fn test_encoded_root_matches_decoded_candidate() {
        let root = "file:///srv/my%20pages/";
        assert!(is_trusted_local("file:///srv/my%20pages/newtab.html", root));
    }

    #[test]
    fn test_builtin_pages_resolve_inside_root() {
        let pages = LocalPages::from_root_url(Url::parse(ROOT).unwrap()).unwrap();
        for page in BuiltinPage::ALL {
            let target = pages.resolve(page);
            let url = target.resolved_url().unwrap();
            assert!(pages.is_trusted(url.as_str()), "{url} should be trusted");
            assert_eq!(pages.builtin_page(url), Some(page));
        }
    }

    #[test]
    fn test_rejects_non_file_root() {
        assert!(LocalPages::from_root_url(Url::parse("https://example.com/").unwrap()).is_err());
    }

    #[test]
    fn test_new_from_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let pages = LocalPages::new(dir.path()).unwrap();
        assert!(pages.root_url().path().ends_with('/'));
        let newtab = pages.page_url(BuiltinPage::NewTab);
        assert!(pages.is_trusted(newtab.as_str()));
    }
}
