//! # Obsidian — couche de confiance du shell de navigation
//!
//! Tout ce qui décide si une chaîne, une URL ou une requête a le droit
//! d'atteindre le moteur de rendu ou le disque. Le rendu lui-même, le chrome
//! et les dialogues natifs sont des collaborateurs externes, vus à travers
//! des traits.
//!
//! ## Architecture des modules
//!
//! - [`classifier`] : Classification des saisies (barre d'adresse, sources de
//!   téléchargement) en URL externe, recherche, page locale ou rejet.
//!
//! - [`local_pages`] : Racine des pages intégrées (nouvel onglet, réglages,
//!   historique) et vérification qu'une URL `file:` reste dans cette racine.
//!
//! - [`guard`] : Décision autoriser/annuler pour chaque événement de
//!   navigation d'une surface ; [`service`] l'expose comme tâche Tokio.
//!
//! - [`surface`] : Surfaces de contenu, indicateurs et registre des onglets.
//!
//! - [`warning`] : Raisons de blocage et avertissement courant (dédoublonné).
//!
//! - [`download`] : Machine à états des téléchargements.
//!
//! - [`filter`] : Filtrage des publicités et traqueurs par sous-chaîne.
//!
//! - [`headers`], [`permissions`] : Politique CSP et permissions.
//!
//! - [`lifecycle`], [`profile`] : Remise à zéro au démarrage, arrêt borné,
//!   stockage disque du profil.
//!
//! - [`config`], [`error`], [`logging`], [`notify`] : Configuration TOML,
//!   erreurs, logs, interface vers l'UI.

pub mod classifier;
pub mod config;
pub mod download;
pub mod error;
pub mod filter;
pub mod guard;
pub mod headers;
pub mod lifecycle;
pub mod local_pages;
pub mod logging;
pub mod notify;
pub mod permissions;
pub mod profile;
pub mod service;
pub mod surface;
pub mod warning;
