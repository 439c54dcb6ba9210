use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use codeimpact::{load_config, Config};

mod cli;

#[derive(Parser)]
#[command(name = "codeimpact")]
#[command(version)]
#[command(about = "Symbol index and change impact analysis for TypeScript/JavaScript projects", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a project and print the symbol index as JSON
    Index {
        /// Project directory to index
        #[arg(short, long, default_value = ".")]
        project: String,

        /// Rebuild even if the cached index is fresh
        #[arg(long)]
        no_cache: bool,

        /// Print counts instead of the full index
        #[arg(short, long)]
        summary: bool,
    },

    /// Analyze the impact of changing a file
    Impact {
        /// Target file, relative to the project root
        target: String,

        /// Project directory
        #[arg(short, long, default_value = ".")]
        project: String,

        /// Rebuild even if the cached graph is fresh
        #[arg(long)]
        no_cache: bool,
    },

    /// Show index and graph statistics
    Stats {
        /// Project directory
        #[arg(short, long, default_value = ".")]
        project: String,
    },

    /// Remove the cache directory
    Clean {
        /// Project directory
        #[arg(short, long, default_value = ".")]
        project: String,
    },
}

impl Commands {
    fn project(&self) -> &str {
        match self {
            Commands::Index { project, .. }
            | Commands::Impact { project, .. }
            | Commands::Stats { project }
            | Commands::Clean { project } => project,
        }
    }
}

/// Flags win over `RUST_LOG`, which wins over `[logging] level`
fn init_logging(debug: bool, verbose: bool, config: &Config) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.logging.format == "pretty" {
        builder.pretty().init();
    } else {
        builder.compact().init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.command.project());
    init_logging(cli.debug, cli.verbose, &config);

    debug!("codeimpact v{} starting...", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Index {
            project,
            no_cache,
            summary,
        } => {
            cli::index::index_project(project, no_cache, summary).await?;
        }

        Commands::Impact {
            target,
            project,
            no_cache,
        } => {
            cli::impact::analyze_impact(target, project, no_cache).await?;
        }

        Commands::Stats { project } => {
            cli::stats::show_stats(project, cli.verbose).await?;
        }

        Commands::Clean { project } => {
            cli::clean::clean_cache(project).await?;
        }
    }

    Ok(())
}
