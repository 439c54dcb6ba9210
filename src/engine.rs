// Entry points: index a project, analyze the impact of changing a file

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cache::CacheStore;
use crate::config::{load_config, Config};
use crate::error::{Error, Result};
use crate::graph::engine::{engine_from_config, GraphEngine, GraphInput};
use crate::graph::{DependencyGraph, GraphArtifact};
use crate::index::{Classify, PathClassifier, ProjectIndex};
use crate::indexer::compiler::CompilerContext;
use crate::indexer::discovery::{self, normalize_lexical, relative_path};
use crate::indexer::Indexer;
use crate::query::impact::{analyze, ImpactResult};

/// Indexer, graph adapter and impact analyzer behind the cache
pub struct Engine {
    config: Config,
    classifier: Arc<dyn Classify>,
    graph_engine: Box<dyn GraphEngine>,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let graph_engine = engine_from_config(&config)?;
        Ok(Self {
            config,
            classifier: Arc::new(PathClassifier),
            graph_engine,
        })
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classify>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_graph_engine(mut self, graph_engine: Box<dyn GraphEngine>) -> Self {
        self.graph_engine = graph_engine;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self, root: &Path) -> Result<CacheStore> {
        Ok(CacheStore::new(&resolve_root(root)?, &self.config))
    }

    pub async fn index(&self, root: &Path, use_cache: bool) -> Result<ProjectIndex> {
        self.index_with_cancel(root, use_cache, CancellationToken::new())
            .await
    }

    pub async fn index_with_cancel(
        &self,
        root: &Path,
        use_cache: bool,
        cancel: CancellationToken,
    ) -> Result<ProjectIndex> {
        let root = resolve_root(root)?;
        let store = CacheStore::new(&root, &self.config);
        self.cached_index(&root, &store, use_cache, cancel).await
    }

    /// Dependency graph of the project, built with the configured engine
    pub async fn graph(&self, root: &Path, use_cache: bool) -> Result<GraphArtifact> {
        let root = resolve_root(root)?;
        let store = CacheStore::new(&root, &self.config);
        self.cached_graph(&root, &store, use_cache).await
    }

    /// Upstream/downstream closure, cycles and risks for `target`, a path
    /// relative to `root` (or absolute under it)
    pub async fn impact(&self, root: &Path, target: &str, use_cache: bool) -> Result<ImpactResult> {
        let root = resolve_root(root)?;
        let store = CacheStore::new(&root, &self.config);
        let artifact = self.cached_graph(&root, &store, use_cache).await?;

        let target = normalize_target(&root, target);
        let result = analyze(&target, &artifact.graph, &self.config.impact)?;
        info!(
            "Impact of {}: {} upstream, {} downstream, {} risks",
            result.target,
            result.upstream.total(),
            result.downstream.total(),
            result.risks.len()
        );
        Ok(result)
    }

    async fn cached_index(
        &self,
        root: &Path,
        store: &CacheStore,
        use_cache: bool,
        cancel: CancellationToken,
    ) -> Result<ProjectIndex> {
        store
            .get_or_build(use_cache, move || async move {
                Indexer::new(self.config.clone(), Arc::clone(&self.classifier))
                    .index_with_cancel(root, cancel)
                    .await
            })
            .await
    }

    async fn cached_graph(&self, root: &Path, store: &CacheStore, use_cache: bool) -> Result<GraphArtifact> {
        store
            .get_or_build(use_cache, move || async move {
                let index = self
                    .cached_index(root, store, use_cache, CancellationToken::new())
                    .await?;
                let files = discover_paths(root, &self.config).await?;
                let compiler = CompilerContext::load(root);

                let raw = self
                    .graph_engine
                    .build(GraphInput {
                        root,
                        files: &files,
                        index: &index,
                        compiler: &compiler,
                        extensions: &self.config.indexing.extensions,
                    })
                    .await?;
                let graph = DependencyGraph::normalize(raw, root, &files);
                info!(
                    "Built dependency graph with {} engine: {} files, {} edges",
                    self.graph_engine.name(),
                    graph.len(),
                    graph.edge_count()
                );

                Ok(GraphArtifact {
                    built_at: chrono::Utc::now(),
                    files: files.into_iter().collect(),
                    graph,
                })
            })
            .await
    }
}

async fn discover_paths(root: &Path, config: &Config) -> Result<BTreeSet<String>> {
    let walk_root = root.to_path_buf();
    let config = config.clone();
    let files = tokio::task::spawn_blocking(move || discovery::discover(&walk_root, &config))
        .await
        .map_err(|e| Error::io(root, std::io::Error::new(std::io::ErrorKind::Other, e)))??;
    Ok(files.into_iter().map(|f| f.path).collect())
}

fn resolve_root(root: &Path) -> Result<PathBuf> {
    root.canonicalize().map_err(|e| Error::io(root, e))
}

/// Project-relative form of a user-supplied target path
fn normalize_target(root: &Path, target: &str) -> String {
    let path = Path::new(target);
    if path.is_absolute() {
        if let Some(relative) = path
            .canonicalize()
            .ok()
            .and_then(|p| relative_path(root, &p))
            .or_else(|| relative_path(root, path))
        {
            return relative;
        }
    }
    normalize_lexical(target).unwrap_or_else(|| target.to_string())
}

/// Index `root` with the configuration found in it
pub async fn index(root: impl AsRef<Path>, use_cache: bool) -> Result<ProjectIndex> {
    let root = root.as_ref();
    Engine::new(load_config(root))?.index(root, use_cache).await
}

/// Impact of changing `target` in `root`, with the configuration found in it
pub async fn impact(root: impl AsRef<Path>, target: &str, use_cache: bool) -> Result<ImpactResult> {
    let root = root.as_ref();
    Engine::new(load_config(root))?.impact(root, target, use_cache).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_target() {
        let root = Path::new("/work/app");
        assert_eq!(normalize_target(root, "./src/a.ts"), "src/a.ts");
        assert_eq!(normalize_target(root, "src\\b.ts"), "src/b.ts");
        assert_eq!(normalize_target(root, "/work/app/src/c.ts"), "src/c.ts");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = Config::default();
        config.graph.engine = "telepathy".to_string();
        assert!(matches!(Engine::new(config), Err(Error::Config { .. })));
    }
}
