//! Evidex Core crate - domain types, evidence filters, configuration,
//! persisted settings and the shared error type.

pub mod config;
pub mod error;
pub mod filters;
pub mod settings;
pub mod types;

pub use config::EvidexConfig;
pub use error::{EvidexError, Result};
pub use filters::{EvidenceFilters, Tri};
pub use settings::{AppSettings, ServerSetting};
pub use types::*;
