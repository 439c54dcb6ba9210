// Source indexing: discovery, per-file extraction, assembly

pub mod compiler;
pub mod discovery;
pub mod parser;
pub mod syntax;
pub mod triggers;

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::index::{Classify, FileRecord, ProjectIndex};
use compiler::CompilerContext;
use discovery::SourceFile;
use parser::{Extractor, TypeScriptExtractor};

/// Builds a [`ProjectIndex`] for a project root
pub struct Indexer {
    config: Config,
    classifier: Arc<dyn Classify>,
}

impl Indexer {
    pub fn new(config: Config, classifier: Arc<dyn Classify>) -> Self {
        Self { config, classifier }
    }

    pub async fn index(&self, root: &Path) -> Result<ProjectIndex> {
        self.index_with_cancel(root, CancellationToken::new()).await
    }

    /// Index every discovered file. Once `cancel` fires no further file is
    /// dispatched; files already being parsed finish and the build returns
    /// [`Error::Cancelled`].
    pub async fn index_with_cancel(&self, root: &Path, cancel: CancellationToken) -> Result<ProjectIndex> {
        let started = Instant::now();

        let files = {
            let walk_root = root.to_path_buf();
            let config = self.config.clone();
            tokio::task::spawn_blocking(move || discovery::discover(&walk_root, &config))
                .await
                .map_err(|e| Error::io(root, std::io::Error::new(std::io::ErrorKind::Other, e)))??
        };
        let discovered = files.len();

        let compiler = CompilerContext::load(root);
        let extractor: Arc<dyn Extractor> = Arc::new(TypeScriptExtractor::new(
            compiler,
            &self.config.triggers,
            Arc::clone(&self.classifier),
        )?);

        let (files, unsupported): (Vec<SourceFile>, Vec<SourceFile>) =
            files.into_iter().partition(|f| extractor.can_parse(&f.path));
        for file in &unsupported {
            debug!("No grammar for {}, skipping", file.path);
        }

        let threads = self.config.indexing.threads.max(1);
        debug!("Indexing {} files with {} workers", files.len(), threads);

        let mut results = stream::iter(files)
            .take_while(|_| futures::future::ready(!cancel.is_cancelled()))
            .map(|file| {
                let extractor = Arc::clone(&extractor);
                tokio::task::spawn_blocking(move || extract_file(extractor.as_ref(), &file))
            })
            .buffer_unordered(threads);

        let mut records: Vec<FileRecord> = Vec::with_capacity(discovered);
        let mut skipped = unsupported.len();
        while let Some(joined) = results.next().await {
            match joined {
                Ok(Ok(record)) => records.push(record),
                Ok(Err(e)) if e.is_recoverable() => {
                    warn!("{}", e);
                    skipped += 1;
                }
                Ok(Err(e)) => return Err(e),
                Err(e) => {
                    warn!("Extraction worker failed: {}", e);
                    skipped += 1;
                }
            }
        }

        if cancel.is_cancelled() {
            info!("Indexing of {} cancelled", root.display());
            return Err(Error::Cancelled);
        }

        // symbolsByName lists must not depend on worker completion order
        records.sort_by(|a, b| a.path.cmp(&b.path));
        let mut index = ProjectIndex::new();
        for record in records {
            index.insert_file(record);
        }

        info!(
            "Indexed {} files ({} symbols, {} skipped) in {:?}",
            index.file_count(),
            index.symbol_count(),
            skipped,
            started.elapsed()
        );
        Ok(index)
    }
}

/// Read one file and run the extractor on it. Unreadable and non-UTF-8
/// files are reported as skipped.
fn extract_file(extractor: &dyn Extractor, file: &SourceFile) -> Result<FileRecord> {
    let skipped = |reason: String| Error::ParseSkipped {
        path: file.path.clone(),
        reason,
    };

    let bytes = std::fs::read(&file.absolute).map_err(|e| skipped(format!("unreadable: {}", e)))?;
    let content = String::from_utf8(bytes).map_err(|_| skipped("not valid UTF-8".to_string()))?;

    extractor.extract(&file.path, &content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::PathClassifier;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn indexer() -> Indexer {
        Indexer::new(Config::default(), Arc::new(PathClassifier))
    }

    #[tokio::test]
    async fn test_index_skips_broken_and_binary_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/ok.ts", "export const ok = 1;\n");
        write(dir.path(), "src/broken.ts", "export function (\n");
        fs::write(dir.path().join("src/binary.ts"), [0xff, 0xfe, 0x00]).unwrap();

        let index = indexer().index(dir.path()).await.unwrap();
        assert_eq!(index.file_count(), 1);
        assert!(index.file("src/ok.ts").is_some());
        assert!(index.is_consistent());
    }

    #[tokio::test]
    async fn test_symbols_by_name_in_path_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c", "a", "b"] {
            write(dir.path(), &format!("src/{}.ts", name), "export function shared() {}\n");
        }

        let index = indexer().index(dir.path()).await.unwrap();
        let files: Vec<&str> = index.lookup("shared").iter().map(|s| s.file.as_str()).collect();
        assert_eq!(files, vec!["src/a.ts", "src/b.ts", "src/c.ts"]);
    }

    #[tokio::test]
    async fn test_cancelled_build_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/a.ts", "export const a = 1;\n");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = indexer().index_with_cancel(dir.path(), cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn test_missing_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = indexer().index(&dir.path().join("missing")).await.unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
