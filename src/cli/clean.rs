use anyhow::{Context, Result};
use std::path::PathBuf;

use codeimpact::{Config, Engine};

pub async fn clean_cache(project: String) -> Result<()> {
    let config = Config::from_project_dir(&project);
    let engine = Engine::new(config).context("Invalid configuration")?;

    let store = engine.cache(&PathBuf::from(&project))?;
    store.clear().await?;
    println!("Removed {}", store.dir().display());
    Ok(())
}
