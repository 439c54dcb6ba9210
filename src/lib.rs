//! Symbol index and file-level change impact analysis for TypeScript and
//! JavaScript projects.
//!
//! [`index`] walks a project and extracts the declarations, imports and
//! exports of every source file. [`impact`] reports which files depend on a
//! target file, which files it depends on, the import cycles it sits on and
//! the resulting risks. Both results are cached under `<root>/.codeimpact`
//! and rebuilt when the tracked sources change.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod index;
pub mod indexer;
pub mod query;

pub use config::{load_config, Config};
pub use engine::{impact, index, Engine};
pub use error::{Error, Result};
pub use graph::{DependencyGraph, GraphArtifact};
pub use index::{Category, Classify, FileRecord, ImportRecord, ProjectIndex, Symbol, SymbolKind, TriggerMetadata};
pub use query::impact::{ImpactResult, Risk, RiskType, Severity};
