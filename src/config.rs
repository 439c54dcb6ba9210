// Configuration management for codeimpact

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Name of the per-project configuration file
pub const CONFIG_FILE: &str = ".codeimpact.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub project: ProjectConfig,
    pub indexing: IndexingConfig,
    pub triggers: TriggersConfig,
    pub impact: ImpactConfig,
    pub graph: GraphConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Directory names skipped at any depth
    pub exclude_dirs: Vec<String>,
    /// File extensions (without the dot) treated as source
    pub extensions: Vec<String>,
    /// Parse worker count
    pub threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggersConfig {
    /// Modules whose exports are trigger factories; sub-paths match too
    pub modules: Vec<String>,
    /// Factory names used when import resolution fails
    pub factories: Vec<String>,
}

/// Risk thresholds used by the impact analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactConfig {
    pub widely_used_high: usize,
    pub widely_used_medium: usize,
    pub deep_chain_medium: usize,
    pub deep_chain_low: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// "imports" (built-in) or "command" (external engine)
    pub engine: String,
    /// Program and arguments; `{root}` and `{extensions}` are substituted
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "unnamed-project".to_string(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            exclude_dirs: ["node_modules", "dist", "build", "coverage", "out"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            extensions: ["ts", "tsx", "js", "jsx", "mjs", "cjs", "mts", "cts"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

impl Default for TriggersConfig {
    fn default() -> Self {
        Self {
            modules: vec!["firebase-functions".to_string()],
            factories: DEFAULT_TRIGGER_FACTORIES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            widely_used_high: 15,
            widely_used_medium: 5,
            deep_chain_medium: 20,
            deep_chain_low: 10,
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            engine: "imports".to_string(),
            command: ["npx", "madge", "--json", "--extensions", "{extensions}", "{root}"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            timeout_secs: 120,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: ".codeimpact".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Trigger factory vocabulary for the textual fallback
pub const DEFAULT_TRIGGER_FACTORIES: &[&str] = &[
    "onDocumentCreated",
    "onDocumentUpdated",
    "onDocumentDeleted",
    "onDocumentWritten",
    "onDocumentCreatedWithAuthContext",
    "onDocumentUpdatedWithAuthContext",
    "onDocumentDeletedWithAuthContext",
    "onDocumentWrittenWithAuthContext",
    "onValueCreated",
    "onValueUpdated",
    "onValueDeleted",
    "onValueWritten",
    "onSchedule",
    "onCall",
    "onRequest",
    "onObjectFinalized",
    "onObjectDeleted",
    "onObjectArchived",
    "onObjectMetadataUpdated",
    "onMessagePublished",
    "onTaskDispatched",
    "beforeUserCreated",
    "beforeUserSignedIn",
];

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config: Config = toml::from_str(&content).map_err(|e| Error::Config {
            message: format!("{}: {}", path.display(), e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from project directory
    /// Looks for .codeimpact.toml in the project root
    pub fn from_project_dir<P: AsRef<Path>>(project_dir: P) -> Self {
        let config_path = project_dir.as_ref().join(CONFIG_FILE);

        if !config_path.exists() {
            tracing::debug!("No {} in {}, using defaults", CONFIG_FILE, project_dir.as_ref().display());
            return Self::default();
        }

        match Self::from_file(&config_path) {
            Ok(config) => {
                tracing::info!("Loaded configuration from {}", config_path.display());
                config
            }
            Err(e) => {
                tracing::warn!("Could not load config from {}: {}", config_path.display(), e);
                tracing::info!("Using default configuration");
                Self::default()
            }
        }
    }

    /// Whether a directory name is on the ignore list
    pub fn is_excluded_dir(&self, name: &str) -> bool {
        self.indexing.exclude_dirs.iter().any(|d| d == name)
    }

    /// Whether a file name carries one of the configured source extensions
    pub fn has_source_extension(&self, file_name: &str) -> bool {
        match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                self.indexing.extensions.iter().any(|e| e == ext)
            }
            _ => false,
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(Error::Config { message });

        if self.project.name.is_empty() {
            return invalid("Project name cannot be empty".to_string());
        }

        if self.indexing.extensions.is_empty() {
            return invalid("At least one source extension is required".to_string());
        }
        if let Some(ext) = self.indexing.extensions.iter().find(|e| e.starts_with('.')) {
            return invalid(format!("Extension must not start with a dot: {}", ext));
        }
        if self.indexing.threads == 0 {
            return invalid("Thread count must be greater than 0".to_string());
        }

        if self.impact.widely_used_medium > self.impact.widely_used_high {
            return invalid("widely_used_medium must not exceed widely_used_high".to_string());
        }
        if self.impact.deep_chain_low > self.impact.deep_chain_medium {
            return invalid("deep_chain_low must not exceed deep_chain_medium".to_string());
        }

        match self.graph.engine.as_str() {
            "imports" => {}
            "command" => {
                if self.graph.command.is_empty() {
                    return invalid("graph.command is required for the command engine".to_string());
                }
            }
            other => return invalid(format!("Invalid graph engine: {}", other)),
        }
        if self.graph.timeout_secs == 0 {
            return invalid("Graph engine timeout must be greater than 0".to_string());
        }

        if self.cache.dir.is_empty() || self.cache.dir.contains("..") {
            return invalid(format!("Invalid cache directory: {:?}", self.cache.dir));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return invalid(format!("Invalid log level: {}", self.logging.level));
        }
        let valid_formats = ["compact", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return invalid(format!("Invalid log format: {}", self.logging.format));
        }

        Ok(())
    }
}

/// Load configuration for a project
pub fn load_config(project_dir: impl AsRef<Path>) -> Config {
    Config::from_project_dir(project_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.project.name, "unnamed-project");
        assert!(config.indexing.exclude_dirs.contains(&"node_modules".to_string()));
        assert_eq!(config.impact.widely_used_high, 15);
        assert_eq!(config.impact.widely_used_medium, 5);
        assert_eq!(config.impact.deep_chain_medium, 20);
        assert_eq!(config.impact.deep_chain_low, 10);
        assert_eq!(config.cache.dir, ".codeimpact");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_source_extensions() {
        let config = Config::default();

        assert!(config.has_source_extension("index.ts"));
        assert!(config.has_source_extension("App.tsx"));
        assert!(config.has_source_extension("types.d.ts"));
        assert!(!config.has_source_extension("README.md"));
        assert!(!config.has_source_extension(".ts"));
        assert!(!config.has_source_extension("Makefile"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [project]
            name = "shop"

            [impact]
            widely_used_high = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.project.name, "shop");
        assert_eq!(config.impact.widely_used_high, 30);
        assert_eq!(config.impact.widely_used_medium, 5);
        assert_eq!(config.graph.engine, "imports");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        // Valid config should pass
        assert!(config.validate().is_ok());

        // Test invalid project name
        config.project.name = "".to_string();
        assert!(config.validate().is_err());
        config.project.name = "test".to_string();

        // Test dotted extension
        config.indexing.extensions = vec![".ts".to_string()];
        assert!(config.validate().is_err());
        config.indexing.extensions = vec!["ts".to_string()];

        // Test zero threads
        config.indexing.threads = 0;
        assert!(config.validate().is_err());
        config.indexing.threads = 2;

        // Test inverted thresholds
        config.impact.widely_used_medium = 50;
        assert!(config.validate().is_err());
        config.impact.widely_used_medium = 5;

        // Test unknown engine
        config.graph.engine = "invalid".to_string();
        assert!(config.validate().is_err());
        config.graph.engine = "command".to_string();
        config.graph.command.clear();
        assert!(config.validate().is_err());
        config.graph.engine = "imports".to_string();

        // Test escaping cache dir
        config.cache.dir = "../elsewhere".to_string();
        assert!(config.validate().is_err());
        config.cache.dir = ".codeimpact".to_string();

        // Test invalid log level
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
        config.logging.level = "info".to_string();

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_config_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_project_dir(dir.path());
        assert_eq!(config.project.name, "unnamed-project");
    }

    #[test]
    fn test_invalid_config_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[logging]\nlevel = \"loud\"\n").unwrap();
        let config = Config::from_project_dir(dir.path());
        assert_eq!(config.logging.level, "info");
    }
}
