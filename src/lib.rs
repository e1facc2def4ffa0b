// src/lib.rs
//! Turns spreadsheet rows describing public works into normalized records with
//! derived financial figures, and renders one report per record.
//!
//! raw row → `normalize::Normalizer` → `CanonicalRecord` → `render::RenderJob`

pub mod calc;
pub mod config;
pub mod error;
pub mod format;
pub mod normalize;
pub mod pipeline;
pub mod record;
pub mod render;
pub mod source;

pub use config::EngineConfig;
pub use error::{ConfigError, RenderError, SourceError, ValidationError};
pub use normalize::Normalizer;
pub use pipeline::{BatchOutcome, BatchSummary, Pipeline, Scope};
pub use record::{CanonicalRecord, RawRow, RawValue, SourceBatch};
