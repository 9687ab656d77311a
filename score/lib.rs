#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

//! Bridging-based helpfulness scoring for community-authored notes.
//!
//! A note is only called helpful when raters who sit on opposite ends of a
//! latent viewpoint axis agree that it is. The engine runs as a pure batch
//! computation: raw ratings are filtered for participation volume, mapped to
//! dense indices, fitted with a one-dimensional matrix factorization, and each
//! note's fitted intercept/factor pair is turned into a status label.

pub mod config;
pub mod eligibility;
pub mod factorization;
pub mod index;
pub mod io;
pub mod optimizer;
pub mod pipeline;
pub mod progress;
pub mod status;
pub mod types;

pub use config::{ConfigError, EligibilityConfig, FitConfig, ScorerConfig};
pub use pipeline::BridgingScorer;
pub use status::classify;
pub use types::{Helpfulness, InvalidHelpfulness, NoteScore, NoteStatus, Rating};
