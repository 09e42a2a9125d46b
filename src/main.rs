//! Point d'entrée d'Obsidian.
//!
//! Usage :
//!   obsidian                               → shell interactif (défaut)
//!   obsidian classify "rust lang"          → catégorie + URL résolue
//!   obsidian check-download ftp://x/f      → source de téléchargement acceptée ?
//!   obsidian check-request https://…       → verdict du filtre réseau
//!   obsidian check-local file:///…         → URL dans la racine des pages ?
//!   obsidian config [--write]              → configuration effective

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use obsidian::classifier::{SearchEngine, UrlClassifier, display_url};
use obsidian::config::Config;
use obsidian::download::{DownloadEngine, DownloadGate, DownloadId, DownloadRequest, SaveLocationPrompt};
use obsidian::error::ShellResult;
use obsidian::filter::{Blocklist, RequestFilter, RequestVerdict};
use obsidian::guard::{NavigationEvent, NavigationGuard};
use obsidian::headers::ResponseHeaderPolicy;
use obsidian::lifecycle::{ProcessExit, SessionLifecycle};
use obsidian::local_pages::{BuiltinPage, LocalPages, is_trusted_local};
use obsidian::notify::LogNotifier;
use obsidian::permissions::PermissionPolicy;
use obsidian::profile::DiskProfile;
use obsidian::service::{self, GuardHandle};
use obsidian::surface::{SurfaceBuilder, SurfaceId};
use obsidian::warning::WarningCenter;

#[derive(Parser)]
#[command(name = "obsidian", version, about = "Trust boundary of the Obsidian browser shell")]
struct Cli {
    /// Configuration file (otherwise OBSIDIAN_CONFIG, then the usual places).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Classify address-bar input.
    Classify { input: String },
    /// Check a download source URL.
    CheckDownload { url: String },
    /// Run a request URL through the ad/tracker filter.
    CheckRequest { url: String },
    /// Check whether a file URL lies inside the local-pages root.
    CheckLocal {
        url: String,
        /// Root to check against instead of the configured one.
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Print the effective configuration.
    Config {
        /// Also write it to the platform config directory.
        #[arg(long)]
        write: bool,
    },
    /// Interactive shell driving the navigation guard (default).
    Shell,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Shell);
    obsidian::logging::init(!matches!(command, Command::Shell));

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    let classifier = UrlClassifier::new(SearchEngine::from_config(&config.search));

    match command {
        Command::Classify { input } => {
            let target = classifier.classify(&input);
            match target.resolved_url() {
                Some(url) => println!("{:?}\t{}\t{}", target.category(), url, display_url(url)),
                None => println!("{:?}", target.category()),
            }
        }
        Command::CheckDownload { url } => {
            match classifier.classify_download_source(&url).into_url() {
                Some(url) => println!("accepted\t{url}"),
                None => println!("rejected"),
            }
        }
        Command::CheckRequest { url } => {
            let filter = RequestFilter::new(Blocklist::from_config(&config.privacy));
            match filter.evaluate(&url) {
                RequestVerdict::Proceed => println!("proceed"),
                RequestVerdict::Cancel { matched } => println!("cancel\t{matched}"),
            }
        }
        Command::CheckLocal { url, root } => {
            let pages = LocalPages::new(&root.unwrap_or_else(|| config.pages.root()))?;
            let trusted = is_trusted_local(&url, pages.root_url().as_str());
            println!("{}\t{}", if trusted { "trusted" } else { "untrusted" }, pages.root_url());
        }
        Command::Config { write } => {
            print!("{}", toml::to_string_pretty(&config)?);
            if write {
                config.save()?;
            }
        }
        Command::Shell => run_shell(config, classifier).await?,
    }
    Ok(())
}

/// Reads commands from stdin until EOF, `:q` or Ctrl-C, then shuts down.
async fn run_shell(config: Config, classifier: UrlClassifier) -> Result<(), Box<dyn Error>> {
    // ── 1. Remise à zéro avant toute surface ───────────────────────────
    let profile = DiskProfile::new(config.lifecycle.profile_dir()?);
    info!(profile = %profile.root().display(), "Using profile");
    let lifecycle =
        SessionLifecycle::from_config(&config.lifecycle, Arc::new(profile), Arc::new(ProcessExit));
    lifecycle.startup().await;

    // ── 2. Garde de navigation et politiques ───────────────────────────
    let pages = LocalPages::new(&config.pages.root())?;
    let warnings = Arc::new(WarningCenter::new(config.warnings.suppression_window()));
    let notifier = Arc::new(LogNotifier);
    let downloads = DownloadGate::new(
        classifier.clone(),
        Arc::new(LogEngine),
        Arc::new(DownloadDirPrompt(dirs::download_dir())),
        notifier.clone(),
    );
    let guard = NavigationGuard::new(classifier, pages, warnings, notifier);
    let (guard, _task) = service::spawn(guard, 64);

    let current = guard.open_builtin(BuiltinPage::NewTab).await?;
    let mut shell = Shell {
        guard,
        filter: RequestFilter::new(Blocklist::from_config(&config.privacy)),
        permissions: PermissionPolicy::from_config(&config.privacy),
        headers: ResponseHeaderPolicy::from_config(&config.privacy),
        downloads,
        current,
        next_download: 1,
    };
    println!("{current} opened. Type `help` for commands.");

    // ── 3. Boucle de commandes ─────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line == ":q" {
            break;
        }
        if let Err(e) = shell.execute(line).await {
            warn!(error = %e, "Command failed");
        }
    }

    // ── 4. Arrêt borné ─────────────────────────────────────────────────
    lifecycle.shutdown().await;
    Ok(())
}

/// The shell moves no bytes: the engine only logs what it is told.
struct LogEngine;

impl DownloadEngine for LogEngine {
    fn cancel(&self, id: DownloadId) -> ShellResult<()> {
        info!(id, "Engine: download canceled");
        Ok(())
    }

    fn set_save_path(&self, id: DownloadId, path: &Path) -> ShellResult<()> {
        info!(id, path = %path.display(), "Engine: saving");
        Ok(())
    }
}

/// Saves into the platform download directory without asking. No such
/// directory counts as a canceled dialog.
struct DownloadDirPrompt(Option<PathBuf>);

#[async_trait]
impl SaveLocationPrompt for DownloadDirPrompt {
    async fn choose(&self, file_name: &str) -> Option<PathBuf> {
        self.0.as_ref().map(|dir| dir.join(file_name))
    }
}

struct Shell {
    guard: GuardHandle,
    filter: RequestFilter,
    permissions: PermissionPolicy,
    headers: ResponseHeaderPolicy,
    downloads: DownloadGate,
    current: SurfaceId,
    next_download: DownloadId,
}

impl Shell {
    async fn execute(&mut self, line: &str) -> Result<(), Box<dyn Error>> {
        let (cmd, arg) = line.split_once(' ').unwrap_or((line, ""));
        let arg = arg.trim();
        let guard = &self.guard;
        let current = self.current;

        match cmd {
            "" => {}
            "help" => println!(
                "go <input> | will <url> | redirect <url> | did <url> | cert <url> | popup <url>\n\
                 attach <url> | request <url> | perm <name> | headers [csp] | download <url>\n\
                 downloads | new | settings | history | tabs | tab <n> | close | :q"
            ),
            "go" => match guard.navigate(current, arg).await? {
                Some(target) => match target.resolved_url() {
                    Some(url) => println!("{:?} {}", target.category(), display_url(url)),
                    None => println!("rejected"),
                },
                None => println!("{current} is closed"),
            },
            "will" | "redirect" | "did" | "cert" => {
                let event = match cmd {
                    "will" => NavigationEvent::WillNavigate(arg.to_owned()),
                    "redirect" => NavigationEvent::WillRedirect(arg.to_owned()),
                    "did" => NavigationEvent::DidNavigate(arg.to_owned()),
                    _ => NavigationEvent::CertificateError(arg.to_owned()),
                };
                println!("{:?}", guard.dispatch(current, event).await?);
            }
            "popup" => match guard.new_window(current, arg).await? {
                Ok(tab) => {
                    self.current = tab;
                    println!("{tab} opened");
                }
                Err(reason) => println!("dropped: {reason}"),
            },
            "attach" => match guard.attach(SurfaceBuilder::new(arg)).await? {
                Ok(tab) => {
                    self.current = tab;
                    println!("{tab} attached");
                }
                Err(reason) => println!("refused: {reason}"),
            },
            "request" => println!("{:?}", self.filter.evaluate(arg)),
            "perm" => match guard.snapshot(current).await? {
                Some(surface) => {
                    let granted = self.permissions.check_surface(&surface, arg);
                    println!("{}", if granted { "granted" } else { "denied" });
                }
                None => println!("{current} is closed"),
            },
            "headers" => {
                let mut headers = vec![("Content-Type".to_owned(), "text/html".to_owned())];
                if !arg.is_empty() {
                    headers.push(("Content-Security-Policy".to_owned(), arg.to_owned()));
                }
                self.headers.apply(&mut headers);
                for (name, value) in headers {
                    println!("{name}: {value}");
                }
            }
            "download" => {
                let Some(surface) = guard.snapshot(current).await? else {
                    println!("{current} is closed");
                    return Ok(());
                };
                let id = self.next_download;
                self.next_download += 1;
                let file_name = arg
                    .rsplit('/')
                    .find(|segment| !segment.is_empty())
                    .unwrap_or("download")
                    .to_owned();
                let state = self
                    .downloads
                    .begin(DownloadRequest {
                        id,
                        source_url: arg.to_owned(),
                        suggested_file_name: file_name,
                        total_bytes: 0,
                        owner: current,
                        owner_liveness: surface.liveness(),
                    })
                    .await;
                println!("download {id}: {state:?}");
            }
            "downloads" => {
                for item in self.downloads.active() {
                    println!("{} {} {:?} {:.1}%", item.id, item.file_name, item.state, item.progress());
                }
            }
            "new" | "settings" | "history" => {
                let page = match cmd {
                    "new" => BuiltinPage::NewTab,
                    "settings" => BuiltinPage::Settings,
                    _ => BuiltinPage::History,
                };
                self.current = guard.open_builtin(page).await?;
                println!("{} opened", self.current);
            }
            "tabs" => {
                for id in guard.surfaces().await? {
                    if let Some(surface) = guard.snapshot(id).await? {
                        let marker = if id == current { '*' } else { ' ' };
                        let url = surface.url().map(display_url).unwrap_or_default();
                        println!("{marker} {id} {:?} {url}", surface.indicator());
                    }
                }
            }
            "tab" => {
                let id = SurfaceId::new(arg.parse()?);
                if guard.snapshot(id).await?.is_some() {
                    self.current = id;
                } else {
                    println!("no such tab");
                }
            }
            "close" => {
                guard.close(current).await?;
                self.current = match guard.surfaces().await?.last() {
                    Some(id) => *id,
                    None => guard.open_builtin(BuiltinPage::NewTab).await?,
                };
                println!("now on {}", self.current);
            }
            other => println!("unknown command `{other}`"),
        }
        Ok(())
    }
}
