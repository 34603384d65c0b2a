//! # Configuration (§6, AMBIENT STACK §A.3)
//! Typed structs for the five configuration files, each with its own JSON
//! loader, mirroring the crate's existing `AiConfig::load_from_file` /
//! `load_whitelist_default` pattern: read-to-string, `serde_json::from_str`,
//! contextual errors, light post-load normalisation.

pub mod app;
pub mod dedup_thresholds;
pub mod queries;
pub mod sources;
pub mod tag_synonyms;

pub use app::AppConfig;
pub use dedup_thresholds::DedupThresholdsConfig;
pub use queries::QueriesConfig;
pub use sources::SourcesConfig;
pub use tag_synonyms::TagSynonymsConfig;
