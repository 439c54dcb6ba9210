use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use codeimpact::{Config, Engine};

pub async fn index_project(project: String, no_cache: bool, summary: bool) -> Result<()> {
    info!("Indexing project: {}", project);

    let config = Config::from_project_dir(&project);
    let engine = Engine::new(config).context("Invalid configuration")?;

    // Ctrl+C stops dispatching new files; the partial build is discarded
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight files");
            on_signal.cancel();
        }
    });

    let root = PathBuf::from(&project);
    let index = engine
        .index_with_cancel(&root, !no_cache, cancel)
        .await
        .with_context(|| format!("Failed to index {}", project))?;

    if summary {
        println!("Files: {}", index.file_count());
        println!("Symbols: {}", index.symbol_count());
        for (kind, count) in index.kind_breakdown() {
            println!("  {}: {}", kind, count);
        }
    } else {
        println!("{}", serde_json::to_string_pretty(&index)?);
    }

    Ok(())
}
