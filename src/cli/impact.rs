use anyhow::{Context, Result};
use std::path::PathBuf;

use codeimpact::{Config, Engine};

pub async fn analyze_impact(target: String, project: String, no_cache: bool) -> Result<()> {
    let config = Config::from_project_dir(&project);
    let engine = Engine::new(config).context("Invalid configuration")?;

    let root = PathBuf::from(&project);
    let result = engine
        .impact(&root, &target, !no_cache)
        .await
        .with_context(|| format!("Impact analysis failed for {}", target))?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
