//! Classificateur d'URL — résolution de la saisie utilisateur en cible de navigation.
//!
//! Ce module transforme une chaîne brute (barre d'adresse, contenu de page)
//! en [`NavigationTarget`] : URL externe http(s), requête de recherche, page
//! locale de confiance, ou rejet.
//!
//! Aucune entrée utilisant un protocole dangereux (`javascript:`, `data:`,
//! `file:`...) n'est jamais exécutée : elle est échappée dans une requête de
//! recherche. Le mode « source de téléchargement » est plus strict et rejette
//! tout ce qui n'est pas http(s), sans repli vers la recherche.
//!
//! Aucune dépendance au moteur : ce module est purement logique.

use url::Url;
use tracing::warn;

use crate::config::SearchConfig;

/// Préfixes de protocoles jamais navigables depuis la barre d'adresse.
/// Comparés sans tenir compte de la casse.
pub const BLOCKED_PROTOCOLS: &[&str] = &[
    "javascript:",
    "data:",
    "file:",
    "about:",
    "chrome:",
    "smb:",
    "ftp:",
    "ssh:",
    "tel:",
    "mailto:",
];

/// Catégorie de confiance d'une cible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetCategory {
    /// Texte libre réécrit en requête de recherche.
    SearchQuery,
    /// URL http ou https.
    ExternalHttp,
    /// `file:` descendant prouvé de la racine des pages locales.
    TrustedLocal,
    Rejected,
}

/// Résultat d'une classification.
///
/// Invariant : `resolved_url` est `None` si et seulement si la catégorie est
/// [`TargetCategory::Rejected`]. Les constructeurs sont privés au crate pour
/// le garantir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationTarget {
    raw_input: String,
    resolved_url: Option<Url>,
    category: TargetCategory,
}

impl NavigationTarget {
    pub(crate) fn external(raw: &str, url: Url) -> Self {
        Self::resolved(raw, url, TargetCategory::ExternalHttp)
    }

    pub(crate) fn search(raw: &str, url: Url) -> Self {
        Self::resolved(raw, url, TargetCategory::SearchQuery)
    }

    pub(crate) fn trusted_local(raw: &str, url: Url) -> Self {
        Self::resolved(raw, url, TargetCategory::TrustedLocal)
    }

    pub(crate) fn rejected(raw: &str) -> Self {
        Self {
            raw_input: raw.to_owned(),
            resolved_url: None,
            category: TargetCategory::Rejected,
        }
    }

    fn resolved(raw: &str, url: Url, category: TargetCategory) -> Self {
        Self {
            raw_input: raw.to_owned(),
            resolved_url: Some(url),
            category,
        }
    }

    pub fn raw_input(&self) -> &str {
        &self.raw_input
    }

    pub fn resolved_url(&self) -> Option<&Url> {
        self.resolved_url.as_ref()
    }

    pub fn into_url(self) -> Option<Url> {
        self.resolved_url
    }

    pub fn category(&self) -> TargetCategory {
        self.category
    }

    pub fn is_rejected(&self) -> bool {
        self.category == TargetCategory::Rejected
    }
}

/// Moteur de recherche utilisé pour le repli « requête de recherche ».
#[derive(Debug, Clone)]
pub struct SearchEngine {
    query_prefix: String,
    home: Url,
}

impl SearchEngine {
    /// Construit le moteur depuis la configuration. Une configuration
    /// invalide retombe sur les valeurs par défaut (jamais de panique).
    pub fn from_config(config: &SearchConfig) -> Self {
        match Self::try_new(&config.engine_url, &config.home_url) {
            Some(engine) => engine,
            None => {
                warn!(
                    engine_url = %config.engine_url,
                    home_url = %config.home_url,
                    "Invalid search engine configuration, using defaults"
                );
                Self::default()
            }
        }
    }

    fn try_new(query_prefix: &str, home: &str) -> Option<Self> {
        let home = Url::parse(home).ok().filter(is_http)?;
        // Le préfixe doit produire une URL http(s) valide une fois complété.
        Url::parse(&format!("{query_prefix}probe"))
            .ok()
            .filter(is_http)?;
        Some(Self {
            query_prefix: query_prefix.to_owned(),
            home,
        })
    }

    /// URL de recherche pour `input`, encodé en pourcentage tel quel.
    pub fn query_url(&self, input: &str) -> Url {
        let encoded = urlencoding::encode(input);
        match Url::parse(&format!("{}{encoded}", self.query_prefix)) {
            Ok(url) => url,
            // Inatteignable : le préfixe a été validé à la construction.
            Err(_) => self.home.clone(),
        }
    }

    pub fn home(&self) -> &Url {
        &self.home
    }
}

impl Default for SearchEngine {
    fn default() -> Self {
        let defaults = SearchConfig::default();
        Self {
            query_prefix: defaults.engine_url,
            home: Url::parse(&defaults.home_url)
                .unwrap_or_else(|_| unreachable!("default home URL is a valid literal")),
        }
    }
}

/// Classificateur d'URL. Sans état mutable : partageable entre surfaces.
#[derive(Debug, Clone, Default)]
pub struct UrlClassifier {
    search: SearchEngine,
}

/// Étapes 1 à 4 de la résolution, communes aux deux modes.
enum Prepared {
    Empty,
    BlockedProtocol,
    PlainText,
    Candidate(String),
}

impl UrlClassifier {
    pub fn new(search: SearchEngine) -> Self {
        Self { search }
    }

    pub fn search_engine(&self) -> &SearchEngine {
        &self.search
    }

    /// Résolution d'une saisie de la barre d'adresse.
    ///
    /// - Entrée vide → page d'accueil du moteur de recherche.
    /// - Protocole bloqué → requête de recherche (catégorie `ExternalHttp`),
    ///   l'entrée n'est jamais exécutée.
    /// - Pas de schéma et pas de point → requête de recherche.
    /// - Pas de schéma → on ajoute `https://`.
    /// - Analyse impossible → requête de recherche.
    /// - Schéma http(s) → `ExternalHttp`, sinon `Rejected`.
    pub fn classify(&self, raw: &str) -> NavigationTarget {
        match prepare(raw) {
            Prepared::Empty => NavigationTarget::external(raw, self.search.home.clone()),
            Prepared::BlockedProtocol => {
                NavigationTarget::external(raw, self.search.query_url(raw.trim()))
            }
            Prepared::PlainText => NavigationTarget::search(raw, self.search.query_url(raw.trim())),
            Prepared::Candidate(candidate) => match Url::parse(&candidate) {
                Ok(url) if is_http(&url) => NavigationTarget::external(raw, url),
                Ok(_) => NavigationTarget::rejected(raw),
                Err(_) => NavigationTarget::search(raw, self.search.query_url(raw.trim())),
            },
        }
    }

    /// Variante stricte pour les sources de téléchargement et les nouvelles
    /// fenêtres : seules les URL http(s) passent, tout repli vers la
    /// recherche devient un rejet.
    pub fn classify_download_source(&self, raw: &str) -> NavigationTarget {
        match prepare(raw) {
            Prepared::Candidate(candidate) => match Url::parse(&candidate) {
                Ok(url) if is_http(&url) => NavigationTarget::external(raw, url),
                _ => NavigationTarget::rejected(raw),
            },
            Prepared::Empty | Prepared::BlockedProtocol | Prepared::PlainText => {
                NavigationTarget::rejected(raw)
            }
        }
    }

    /// Mode navigation externe : l'URL est déjà complète (émise par le
    /// contenu), aucun `https://` ajouté, aucun repli.
    pub fn accept_external(&self, url: &str) -> Option<Url> {
        Url::parse(url.trim()).ok().filter(is_http)
    }
}

fn prepare(raw: &str) -> Prepared {
    let input = raw.trim();
    if input.is_empty() {
        return Prepared::Empty;
    }
    if is_blocked_protocol(input) {
        return Prepared::BlockedProtocol;
    }
    match scheme_token(input) {
        Some(_) => Prepared::Candidate(input.to_owned()),
        None if !input.contains('.') => Prepared::PlainText,
        None => Prepared::Candidate(format!("https://{input}")),
    }
}

/// `true` si l'entrée commence par un protocole de [`BLOCKED_PROTOCOLS`].
pub fn is_blocked_protocol(input: &str) -> bool {
    BLOCKED_PROTOCOLS.iter().any(|p| {
        input
            .get(..p.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(p))
    })
}

/// Détecte un préfixe `schéma:`. Un `hôte:port` (ex. `localhost:3000`) n'est
/// pas un schéma.
fn scheme_token(input: &str) -> Option<&str> {
    let colon = input.find(':')?;
    let (scheme, rest) = (&input[..colon], &input[colon + 1..]);

    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic()
        || !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        return None;
    }

    let port_len = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
    if port_len > 0 && matches!(rest.as_bytes().get(port_len), None | Some(b'/' | b'?' | b'#')) {
        return None;
    }

    Some(scheme)
}

fn is_http(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// Normalise une URL pour l'affichage (attaques homographes).
///
/// 1. Les domaines punycode (`xn--...`) reçoivent un avertissement visible.
/// 2. Les caractères invisibles (espaces de largeur nulle, BOM...) sont
///    retirés pour qu'ils ne masquent pas une partie de l'URL.
pub fn display_url(url: &Url) -> String {
    let host = url.host_str().unwrap_or("");

    if host.starts_with("xn--") || host.contains(".xn--") {
        return format!("⚠️  {url} (Punycode)");
    }

    url.as_str()
        .chars()
        .filter(|c| {
            !matches!(
                *c,
                '\u{200B}'..='\u{200D}' // Zero-width space, ZWNJ, ZWJ
                | '\u{2060}'            // Word joiner
                | '\u{FEFF}'            // Zero-width no-break space (BOM)
                | '\u{034F}'            // Combining grapheme joiner
                | '\u{2028}'            // Line separator
                | '\u{2029}'            // Paragraph separator
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> UrlClassifier {
        UrlClassifier::default()
    }

    #[test]
    fn test_empty_input_goes_home() {
        let target = classifier().classify("   ");
        assert_eq!(target.category(), TargetCategory::ExternalHttp);
        assert_eq!(
            target.resolved_url().map(Url::as_str),
            Some("https://www.google.com/")
        );
    }

    #[test]
    fn test_blocked_protocols_become_search_queries() {
        let c = classifier();
        for input in [
            "javascript:alert(1)",
            "JavaScript:alert(document.cookie)",
            "data:text/html,<script>x</script>",
            "file:///etc/passwd",
            "about:blank",
            "chrome://settings",
            "smb://share/x",
            "ftp://host/file",
            "ssh:user@host",
            "tel:+3312345678",
            "MAILTO:a@b.c",
        ] {
            let target = c.classify(input);
            assert_eq!(
                target.category(),
                TargetCategory::ExternalHttp,
                "{input} should be escaped into a search"
            );
            let url = target.resolved_url().unwrap();
            assert!(
                url.as_str().starts_with("https://www.google.com/search?q="),
                "{input} resolved to {url}"
            );
            let encoded = urlencoding::encode(input);
            assert!(
                url.as_str().ends_with(encoded.as_ref()),
                "{url} should carry the verbatim encoding of {input}"
            );
        }
    }

    #[test]
    fn test_word_without_dot_is_search() {
        let target = classifier().classify("example");
        assert_eq!(target.category(), TargetCategory::SearchQuery);
        assert_eq!(
            target.resolved_url().unwrap().as_str(),
            "https://www.google.com/search?q=example"
        );
    }

    #[test]
    fn test_text_with_spaces_is_encoded() {
        let target = classifier().classify("hello world");
        assert_eq!(
            target.resolved_url().unwrap().as_str(),
            "https://www.google.com/search?q=hello%20world"
        );
    }

    #[test]
    fn test_domain_gets_https_prefix() {
        let target = classifier().classify("example.com");
        assert_eq!(target.category(), TargetCategory::ExternalHttp);
        let url = target.resolved_url().unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_host_port_is_not_a_scheme() {
        let target = classifier().classify("example.com:8080/app");
        let url = target.resolved_url().unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.port(), Some(8080));
    }

    #[test]
    fn test_plain_http_private_address_is_accepted() {
        let target = classifier().classify("http://192.168.1.1");
        assert_eq!(target.category(), TargetCategory::ExternalHttp);
        assert_eq!(target.resolved_url().unwrap().scheme(), "http");
    }

    #[test]
    fn test_unknown_scheme_is_rejected() {
        let target = classifier().classify("gopher://example.org");
        assert!(target.is_rejected());
        assert!(target.resolved_url().is_none());
    }

    #[test]
    fn test_unparseable_input_falls_back_to_search() {
        // "https://exa mple.com" has a space in the host
        let target = classifier().classify("exa mple.com");
        assert_eq!(target.category(), TargetCategory::SearchQuery);
    }

    #[test]
    fn test_download_source_rejects_javascript() {
        let target = classifier().classify_download_source("javascript:alert(1)");
        assert!(target.is_rejected(), "must never fall back to a search");
    }

    #[test]
    fn test_download_source_grades() {
        let c = classifier();
        assert!(!c.classify_download_source("http://192.168.1.1").is_rejected());
        assert!(!c.classify_download_source("https://example.com/a.zip").is_rejected());
        assert!(!c.classify_download_source("example.com/a.zip").is_rejected());
        assert!(c.classify_download_source("ftp://host/file").is_rejected());
        assert!(c.classify_download_source("example").is_rejected());
        assert!(c.classify_download_source("").is_rejected());
        assert!(c.classify_download_source("gopher://x.org").is_rejected());
    }

    #[test]
    fn test_accept_external_does_not_prefix() {
        let c = classifier();
        assert!(c.accept_external("https://example.com/").is_some());
        assert!(c.accept_external("example.com").is_none());
        assert!(c.accept_external("data:text/html,hi").is_none());
    }

    #[test]
    fn test_invalid_search_config_uses_defaults() {
        let engine = SearchEngine::from_config(&SearchConfig {
            engine_url: "not a url".to_string(),
            home_url: "javascript:void(0)".to_string(),
        });
        assert_eq!(engine.home().as_str(), "https://www.google.com/");
    }

    #[test]
    fn test_custom_search_engine() {
        let engine = SearchEngine::from_config(&SearchConfig {
            engine_url: "https://duckduckgo.com/?q=".to_string(),
            home_url: "https://duckduckgo.com".to_string(),
        });
        let c = UrlClassifier::new(engine);
        assert_eq!(
            c.classify("rust").resolved_url().unwrap().as_str(),
            "https://duckduckgo.com/?q=rust"
        );
    }

    #[test]
    fn test_punycode_warning() {
        let url = Url::parse("https://xn--ggle-0nd.com/path").unwrap();
        let shown = display_url(&url);
        assert!(shown.contains("⚠️"), "Should contain warning emoji: {shown}");
        assert!(shown.contains("xn--ggle-0nd.com"), "Should show the punycode: {shown}");
    }

    #[test]
    fn test_normal_domain_unchanged() {
        let url = Url::parse("https://google.com/path?query=value").unwrap();
        assert_eq!(display_url(&url), "https://google.com/path?query=value");
    }
}
