// CLI command implementations

pub mod clean;
pub mod impact;
pub mod index;
pub mod stats;
