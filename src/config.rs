//! TOML-based configuration system.
//!
//! Loads settings from a `config.toml` file, falling back to defaults that
//! reproduce the shell's built-in behavior. Every struct implements `Default`
//! so a missing or partial config file produces the same behavior as no file.
//!
//! ## Config file search order
//!
//! 1. `OBSIDIAN_CONFIG` environment variable (explicit override)
//! 2. Next to the executable (`<exe_dir>/config.toml`)
//! 3. Platform config directory (`%APPDATA%\Obsidian\config.toml` on Windows)
//! 4. Current working directory (`./config.toml`)
//! 5. No file found → `Config::default()`

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ShellError, ShellResult};

// ─────────────────────────────────────────────────────────────────────────────
// Config structs
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub search: SearchConfig,
    pub pages: PagesConfig,
    pub privacy: PrivacyConfig,
    pub warnings: WarningsConfig,
    pub lifecycle: LifecycleConfig,
}

/// Search engine used for the search-query fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Query prefix; the percent-encoded input is appended verbatim.
    pub engine_url: String,
    /// Destination for an empty address-bar submission.
    pub home_url: String,
}

/// Bundled local pages (new tab, settings, history).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PagesConfig {
    /// Local-pages root. `None` = discover `resources/pages`.
    pub root: Option<PathBuf>,
}

/// Network-layer privacy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacyConfig {
    /// Substrings matched against outgoing request URLs.
    pub blocklist: Vec<String>,
    /// Extra `*.txt` lists merged into the blocklist at startup.
    pub filters_dir: Option<PathBuf>,
    /// Permissions grantable to secure contexts.
    pub allowed_permissions: Vec<String>,
    /// Value forced into every response's `Content-Security-Policy` header.
    pub content_security_policy: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarningsConfig {
    /// Identical consecutive warnings inside this window are shown once.
    pub suppression_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Hard deadline for the shutdown sequence.
    pub shutdown_timeout_ms: u64,
    /// Profile directory purged at startup and shutdown. `None` = platform data dir.
    pub profile_dir: Option<PathBuf>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Default impls
// ─────────────────────────────────────────────────────────────────────────────

pub const DEFAULT_BLOCKLIST: &[&str] = &[
    "doubleclick.net",
    "googleadservices.com",
    "googlesyndication.com",
    "facebook.com/tr",
    "analytics.google.com",
];

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            engine_url: "https://www.google.com/search?q=".to_string(),
            home_url: "https://www.google.com".to_string(),
        }
    }
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            blocklist: DEFAULT_BLOCKLIST.iter().map(|s| s.to_string()).collect(),
            filters_dir: None,
            allowed_permissions: vec!["notifications".to_string(), "media".to_string()],
            content_security_policy: "default-src 'self'; script-src 'self' 'unsafe-inline'; \
                                      style-src 'self' 'unsafe-inline';"
                .to_string(),
        }
    }
}

impl Default for WarningsConfig {
    fn default() -> Self {
        Self { suppression_secs: 4 }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: 3_000,
            profile_dir: None,
        }
    }
}

impl WarningsConfig {
    pub fn suppression_window(&self) -> Duration {
        Duration::from_secs(self.suppression_secs)
    }
}

impl LifecycleConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Profile directory, falling back to the platform local data directory.
    ///
    /// The profile is wiped at startup and shutdown, so only an absolute path
    /// is ever returned.
    pub fn profile_dir(&self) -> ShellResult<PathBuf> {
        let dir = match &self.profile_dir {
            Some(dir) => dir.clone(),
            None => platform_dir(DirKind::Data)
                .ok_or_else(|| ShellError::InvalidProfileDir("no platform data directory".into()))?
                .join("profile"),
        };
        if !dir.is_absolute() {
            return Err(ShellError::InvalidProfileDir(dir.display().to_string()));
        }
        Ok(dir)
    }
}

impl PagesConfig {
    /// Configured root, or the first `resources/pages` directory found.
    pub fn root(&self) -> PathBuf {
        self.root
            .clone()
            .or_else(find_pages_dir)
            .unwrap_or_else(|| PathBuf::from("resources").join("pages"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Config loading and saving
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Loads configuration from a TOML file. Never panics — returns defaults
    /// if no file is found or if parsing fails.
    pub fn load() -> Self {
        match find_config_path() {
            Some(path) => match Self::load_from(&path) {
                Ok(config) => {
                    info!(path = %path.display(), "Configuration loaded");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Invalid config, using defaults");
                    Config::default()
                }
            },
            None => {
                info!("No config file found, using defaults");
                Config::default()
            }
        }
    }

    /// Reads and parses one specific file.
    pub fn load_from(path: &Path) -> ShellResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str::<Config>(&content)?)
    }

    /// Saves configuration to the platform config directory.
    /// Creates the directory if it doesn't exist.
    pub fn save(&self) -> io::Result<()> {
        let path = save_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(io::Error::other)?;
        fs::write(&path, content)?;
        info!(path = %path.display(), "Configuration saved");
        Ok(())
    }
}

/// Searches for a config file in the standard locations.
fn find_config_path() -> Option<PathBuf> {
    // 1. Explicit env var override
    if let Ok(path) = std::env::var("OBSIDIAN_CONFIG") {
        let p = PathBuf::from(path);
        if p.is_file() {
            return Some(p);
        }
    }

    // 2. Next to the executable
    if let Ok(exe) = std::env::current_exe()
        && let Some(dir) = exe.parent()
    {
        let p = dir.join("config.toml");
        if p.is_file() {
            return Some(p);
        }
    }

    // 3. Platform config directory
    if let Some(dir) = platform_dir(DirKind::Config) {
        let p = dir.join("config.toml");
        if p.is_file() {
            return Some(p);
        }
    }

    // 4. Current working directory
    let p = PathBuf::from("config.toml");
    if p.is_file() {
        return Some(p);
    }

    None
}

/// Looks for `resources/pages/` next to the executable, at the project root
/// when running from `target/{debug,release}/`, then in the current directory.
fn find_pages_dir() -> Option<PathBuf> {
    if let Ok(exe_path) = std::env::current_exe()
        && let Ok(canonical) = exe_path.canonicalize()
        && let Some(exe_dir) = canonical.parent()
    {
        let path = exe_dir.join("resources").join("pages");
        if path.is_dir() {
            return Some(path);
        }

        if let Some(target_dir) = exe_dir.parent()
            && target_dir.file_name().is_some_and(|n| n == "target")
            && let Some(project_root) = target_dir.parent()
        {
            let path = project_root.join("resources").join("pages");
            if path.is_dir() {
                return Some(path);
            }
        }
    }

    let path = std::env::current_dir().ok()?.join("resources").join("pages");
    if path.is_dir() {
        return Some(path);
    }

    warn!("resources/pages/ not found, built-in pages will not resolve");
    None
}

/// Returns the platform-specific save path for the config file.
fn save_path() -> PathBuf {
    platform_dir(DirKind::Config)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("config.toml")
}

enum DirKind {
    Config,
    Data,
}

/// Platform config or local data directory for the application
/// (`%APPDATA%\Obsidian`, `~/Library/Application Support/obsidian`,
/// `$XDG_CONFIG_HOME/obsidian`...).
fn platform_dir(kind: DirKind) -> Option<PathBuf> {
    let base = match kind {
        DirKind::Config => dirs::config_dir(),
        DirKind::Data => dirs::data_local_dir(),
    }?;
    let name = if cfg!(windows) { "Obsidian" } else { "obsidian" };
    Some(base.join(name))
}
