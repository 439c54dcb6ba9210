// Queries over the index and the dependency graph

pub mod impact;

pub use impact::{analyze, find_cycles, ImpactResult, Reach, Risk, RiskType, Severity};
