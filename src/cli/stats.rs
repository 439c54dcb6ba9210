use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;

use codeimpact::{Config, Engine, ProjectIndex};

pub async fn show_stats(project: String, verbose: bool) -> Result<()> {
    let config = Config::from_project_dir(&project);
    let loaded = config.project.name != "unnamed-project";
    let engine = Engine::new(config).context("Invalid configuration")?;
    let root = PathBuf::from(&project);

    println!("codeimpact {}", env!("CARGO_PKG_VERSION"));
    println!("Project: {}", project);
    println!("Config: {}", if loaded { "loaded" } else { "default" });

    let index = engine
        .index(&root, true)
        .await
        .with_context(|| format!("Failed to index {}", project))?;
    let artifact = engine
        .graph(&root, true)
        .await
        .with_context(|| format!("Failed to build dependency graph for {}", project))?;

    println!("\nIndex:");
    println!("  Files: {}", index.file_count());
    println!("  Symbols: {}", index.symbol_count());
    println!("  Exported: {}", exported_count(&index));
    println!("Graph:");
    println!("  Nodes: {}", artifact.graph.len());
    println!("  Edges: {}", artifact.graph.edge_count());
    println!("  Cycles: {}", codeimpact::query::find_cycles(&artifact.graph).len());

    if verbose {
        println!("\nSymbols by kind:");
        for (kind, count) in index.kind_breakdown() {
            println!("  {}: {}", kind, count);
        }

        println!("Files by category:");
        for (category, count) in category_breakdown(&index) {
            println!("  {}: {}", category, count);
        }

        let store = engine.cache(&root)?;
        let meta = store.meta().await?;
        println!("Cache ({}):", store.dir().display());
        for (kind, entry) in [("index", &meta.index), ("graph", &meta.graph)] {
            match entry {
                Some(m) => println!("  {}: built {} ({})", kind, m.built_at.to_rfc3339(), m.source_fingerprint),
                None => println!("  {}: not cached", kind),
            }
        }
    }

    Ok(())
}

fn exported_count(index: &ProjectIndex) -> usize {
    index
        .files()
        .values()
        .flat_map(|f| f.symbols.iter())
        .filter(|s| s.is_exported)
        .count()
}

fn category_breakdown(index: &ProjectIndex) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for file in index.files().values() {
        *counts.entry(file.category.as_str()).or_insert(0) += 1;
    }
    counts
}
