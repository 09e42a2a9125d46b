//! Middleware de filtrage réseau (publicités, traqueurs).
//!
//! Chaque requête sortante (navigation principale comme sous-ressource)
//! est testée contre une liste de blocage statique avant son envoi. Le test
//! est une recherche de sous-chaîne dans `autorité + chemin` de l'URL.
//!
//! ## Imprécision assumée
//!
//! La correspondance par sous-chaîne peut sur-bloquer (un hôte contenant le
//! jeton par coïncidence) et sous-bloquer (un traqueur servi depuis un autre
//! domaine). Ce comportement est conservé tel quel : ne pas le remplacer par
//! une égalité de nom d'hôte sans décision explicite.
//!
//! ## Listes supplémentaires
//!
//! Les fichiers `*.txt` de `filters_dir` (un jeton par ligne, commentaires
//! `!` ou `#`) sont fusionnés à la liste configurée au démarrage. La liste
//! obtenue est immuable.

use std::borrow::Cow;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use crate::config::PrivacyConfig;

/// Liste de blocage immuable, partageable sans synchronisation.
#[derive(Debug, Clone, Default)]
pub struct Blocklist {
    entries: Arc<[String]>,
}

impl Blocklist {
    /// Jetons vides ignorés, doublons retirés, ordre conservé.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for entry in entries {
            let entry: String = entry.into();
            let entry = entry.trim();
            if !entry.is_empty() && !unique.iter().any(|e| e == entry) {
                unique.push(entry.to_owned());
            }
        }
        Self {
            entries: unique.into(),
        }
    }

    /// Liste configurée + fichiers de `filters_dir`.
    pub fn from_config(config: &PrivacyConfig) -> Self {
        let mut entries = config.blocklist.clone();
        if let Some(dir) = &config.filters_dir {
            entries.extend(load_filter_lists(dir));
        }
        let list = Self::new(entries);
        info!(entries = list.len(), "Blocklist loaded");
        list
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    fn find_in(&self, haystack: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| haystack.contains(entry.as_str()))
            .map(String::as_str)
    }
}

/// Verdict pour une requête sortante.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestVerdict {
    Proceed,
    /// Annulée avant envoi ; `matched` est le jeton trouvé.
    Cancel { matched: String },
}

/// Filtre évalué sur chaque requête réseau, avant le garde de navigation.
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    blocklist: Blocklist,
}

impl RequestFilter {
    pub fn new(blocklist: Blocklist) -> Self {
        Self { blocklist }
    }

    pub fn blocklist(&self) -> &Blocklist {
        &self.blocklist
    }

    pub fn evaluate(&self, url: &str) -> RequestVerdict {
        let target = match_target(url);
        match self.blocklist.find_in(&target) {
            Some(matched) => {
                debug!(url, matched, "Requête bloquée");
                RequestVerdict::Cancel {
                    matched: matched.to_owned(),
                }
            }
            None => RequestVerdict::Proceed,
        }
    }

    pub fn should_block(&self, url: &str) -> bool {
        matches!(self.evaluate(url), RequestVerdict::Cancel { .. })
    }
}

/// `hôte[:port] + chemin` de l'URL ; la chaîne brute si elle ne s'analyse pas.
fn match_target(url: &str) -> Cow<'_, str> {
    match Url::parse(url) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or("");
            match parsed.port() {
                Some(port) => Cow::Owned(format!("{host}:{port}{}", parsed.path())),
                None => Cow::Owned(format!("{host}{}", parsed.path())),
            }
        }
        Err(_) => Cow::Borrowed(url),
    }
}

/// Lit tous les `*.txt` du dossier, un jeton par ligne.
fn load_filter_lists(dir: &Path) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Dossier de filtres illisible {} : {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut paths: Vec<_> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    paths.sort();

    let mut tokens = Vec::new();
    for path in &paths {
        match fs::read_to_string(path) {
            Ok(content) => {
                let before = tokens.len();
                tokens.extend(
                    content
                        .lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty() && !l.starts_with('!') && !l.starts_with('#'))
                        .map(str::to_owned),
                );
                info!(
                    "Liste de filtres chargée : {} ({} entrées)",
                    path.display(),
                    tokens.len() - before
                );
            }
            Err(e) => {
                warn!("Impossible de lire {} : {}", path.display(), e);
            }
        }
    }
    tokens
}
