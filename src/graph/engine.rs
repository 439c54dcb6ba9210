// Graph engines: built-in import resolution and external command

use std::collections::BTreeSet;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, info};

use super::{parse_engine_output, RawGraph};
use crate::config::{Config, GraphConfig};
use crate::error::{Error, Result};
use crate::index::ProjectIndex;
use crate::indexer::compiler::CompilerContext;
use crate::indexer::discovery::normalize_lexical;

/// Everything an engine may look at
pub struct GraphInput<'a> {
    pub root: &'a Path,
    /// Discovered source files, project-relative
    pub files: &'a BTreeSet<String>,
    pub index: &'a ProjectIndex,
    pub compiler: &'a CompilerContext,
    pub extensions: &'a [String],
}

/// Produces file-level import edges for a project
pub trait GraphEngine: Send + Sync {
    fn name(&self) -> &'static str;

    fn build<'a>(&'a self, input: GraphInput<'a>) -> BoxFuture<'a, Result<RawGraph>>;
}

/// Engine selected by `[graph] engine`
pub fn engine_from_config(config: &Config) -> Result<Box<dyn GraphEngine>> {
    match config.graph.engine.as_str() {
        "imports" => Ok(Box::new(ImportGraphEngine)),
        "command" => Ok(Box::new(CommandGraphEngine::new(&config.graph)?)),
        other => Err(Error::Config {
            message: format!("Invalid graph engine: {}", other),
        }),
    }
}

/// Resolves the extractor's import records against the discovered files
pub struct ImportGraphEngine;

impl GraphEngine for ImportGraphEngine {
    fn name(&self) -> &'static str {
        "imports"
    }

    fn build<'a>(&'a self, input: GraphInput<'a>) -> BoxFuture<'a, Result<RawGraph>> {
        Box::pin(async move {
            let resolver = ImportResolver {
                files: input.files,
                compiler: input.compiler,
                extensions: input.extensions,
            };

            let mut raw: RawGraph = input.files.iter().map(|f| (f.clone(), Vec::new())).collect();
            for (path, record) in input.index.files() {
                let edges = raw.entry(path.clone()).or_default();
                for import in &record.imports {
                    if let Some(target) = resolver.resolve(path, &import.source) {
                        edges.push(target);
                    }
                }
            }
            debug!("Resolved imports of {} files", input.index.file_count());
            Ok(raw)
        })
    }
}

struct ImportResolver<'a> {
    files: &'a BTreeSet<String>,
    compiler: &'a CompilerContext,
    extensions: &'a [String],
}

impl ImportResolver<'_> {
    /// Project file imported by `specifier` from `from`, if any
    fn resolve(&self, from: &str, specifier: &str) -> Option<String> {
        if specifier == "." || specifier == ".." || specifier.starts_with("./") || specifier.starts_with("../") {
            let dir = from.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
            return normalize_lexical(&format!("{}/{}", dir, specifier)).and_then(|p| self.probe(&p));
        }

        for alias in &self.compiler.paths {
            let Some(captured) = match_alias(&alias.pattern, specifier) else {
                continue;
            };
            let found = alias
                .targets
                .iter()
                .find_map(|target| self.probe(&target.replacen('*', captured, 1)));
            if found.is_some() {
                return found;
            }
        }

        let base = self.compiler.base_url.as_deref()?;
        normalize_lexical(&format!("{}/{}", base, specifier)).and_then(|p| self.probe(&p))
    }

    /// Try the path as written, with each extension, as a `.js` alias of a
    /// TypeScript source, and as a directory index
    fn probe(&self, candidate: &str) -> Option<String> {
        if candidate.is_empty() {
            return self.probe_index("");
        }
        if self.files.contains(candidate) {
            return Some(candidate.to_string());
        }
        for ext in self.extensions {
            let path = format!("{}.{}", candidate, ext);
            if self.files.contains(&path) {
                return Some(path);
            }
        }
        if let Some((stem, ext)) = candidate.rsplit_once('.') {
            let swapped = match ext {
                "js" => &["ts", "tsx"][..],
                "jsx" => &["tsx"][..],
                "mjs" => &["mts"][..],
                "cjs" => &["cts"][..],
                _ => &[][..],
            };
            for ext in swapped {
                let path = format!("{}.{}", stem, ext);
                if self.files.contains(&path) {
                    return Some(path);
                }
            }
        }
        self.probe_index(candidate)
    }

    fn probe_index(&self, dir: &str) -> Option<String> {
        self.extensions.iter().find_map(|ext| {
            let path = if dir.is_empty() {
                format!("index.{}", ext)
            } else {
                format!("{}/index.{}", dir, ext)
            };
            self.files.contains(&path).then_some(path)
        })
    }
}

/// Text matched by the single `*` of a `paths` pattern, or `""` for an exact match
fn match_alias<'s>(pattern: &str, specifier: &'s str) -> Option<&'s str> {
    match pattern.split_once('*') {
        Some((prefix, suffix)) => specifier
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(suffix)),
        None => (pattern == specifier).then_some(""),
    }
}

/// Runs an external dependency tool and parses its JSON stdout
pub struct CommandGraphEngine {
    command: Vec<String>,
    timeout: Duration,
}

impl CommandGraphEngine {
    pub fn new(config: &GraphConfig) -> Result<Self> {
        if config.command.is_empty() {
            return Err(Error::Config {
                message: "graph.command is required for the command engine".to_string(),
            });
        }
        Ok(Self {
            command: config.command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn expand(&self, root: &Path, extensions: &[String]) -> Vec<String> {
        let root = root.display().to_string();
        let extensions = extensions.join(",");
        self.command
            .iter()
            .map(|arg| arg.replace("{root}", &root).replace("{extensions}", &extensions))
            .collect()
    }
}

impl GraphEngine for CommandGraphEngine {
    fn name(&self) -> &'static str {
        "command"
    }

    fn build<'a>(&'a self, input: GraphInput<'a>) -> BoxFuture<'a, Result<RawGraph>> {
        Box::pin(async move {
            let args = self.expand(input.root, input.extensions);
            let (program, args) = args
                .split_first()
                .ok_or_else(|| Error::engine("empty graph command"))?;
            info!("Running graph engine: {} {}", program, args.join(" "));

            let mut command = tokio::process::Command::new(program);
            command
                .args(args)
                .current_dir(input.root)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            let output = tokio::time::timeout(self.timeout, command.output())
                .await
                .map_err(|_| Error::engine(format!("{} timed out after {:?}", program, self.timeout)))?
                .map_err(|e| Error::engine(format!("failed to run {}: {}", program, e)))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(Error::engine(format!(
                    "{} exited with {}: {}",
                    program,
                    output.status,
                    stderr.trim()
                )));
            }

            parse_engine_output(&String::from_utf8_lossy(&output.stdout))
        })
    }
}
