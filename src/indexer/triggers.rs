// Event-trigger detection
//
// Two tiers: the call's root identifier is first resolved through the file's
// import bindings; when that does not lead to a trigger module, the call text
// is matched against the factory vocabulary.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use super::syntax::{CallExpr, ImportBinding, Imported, LeadingArgument};
use crate::config::TriggersConfig;
use crate::error::{Error, Result};
use crate::index::TriggerMetadata;

static PATH_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\b(?:document|ref)\s*:\s*["'`]([^"'`]+)["'`]"#).expect("valid regex"));
static SCHEDULE_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bschedule\s*:\s*["'`]([^"'`]+)["'`]"#).expect("valid regex"));
static BUCKET_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bbucket\s*:\s*["'`]([^"'`]+)["'`]"#).expect("valid regex"));

/// Import bindings of one file, keyed by local name
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    by_local: HashMap<String, (String, Imported)>,
}

impl BindingTable {
    pub fn insert(&mut self, module: &str, binding: ImportBinding) {
        self.by_local
            .insert(binding.local, (module.to_string(), binding.imported));
    }

    /// Module and imported form behind a local name
    pub fn resolve(&self, local: &str) -> Option<(&str, &Imported)> {
        self.by_local
            .get(local)
            .map(|(module, imported)| (module.as_str(), imported))
    }
}

/// What the trigger reacts to; decides which metadata fields are read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerFamily {
    Document,
    Value,
    Schedule,
    Storage,
    Https,
    PubSub,
    Other,
}

impl TriggerFamily {
    fn of(segments: &[&str]) -> Self {
        let has = |needle: &str| {
            segments
                .iter()
                .any(|s| s.to_ascii_lowercase().contains(needle))
        };
        if has("schedule") {
            TriggerFamily::Schedule
        } else if has("document") || has("firestore") {
            TriggerFamily::Document
        } else if has("value") || has("database") {
            TriggerFamily::Value
        } else if has("object") || has("storage") || has("bucket") {
            TriggerFamily::Storage
        } else if has("oncall") || has("onrequest") || has("https") {
            TriggerFamily::Https
        } else if has("pubsub") || has("message") || has("topic") {
            TriggerFamily::PubSub
        } else {
            TriggerFamily::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerMatch {
    pub trigger_type: String,
    pub family: TriggerFamily,
}

impl TriggerMatch {
    fn new(segments: &[&str]) -> Self {
        Self {
            trigger_type: segments.join("."),
            family: TriggerFamily::of(segments),
        }
    }

    /// Read path/schedule hints from the leading arguments of the call and
    /// of the calls in its callee chain. Handler bodies are never scanned;
    /// fields that do not match stay unset.
    pub fn metadata(&self, call: &CallExpr, source: &str) -> TriggerMetadata {
        let chain = call.call_chain();
        let arguments: Vec<(usize, Option<&str>, LeadingArgument)> = chain
            .iter()
            .enumerate()
            .filter_map(|(depth, c)| {
                c.leading_argument(source)
                    .map(|arg| (depth, c.method_name(source), arg))
            })
            .collect();

        // a literal counts when it is passed to the factory itself or to the
        // chain step that names it, like `document("p")` in v1 chains
        let literal = |keyword: &str| {
            arguments.iter().find_map(|(depth, method, arg)| match arg {
                LeadingArgument::Literal(text)
                    if *depth == 0
                        || method.is_some_and(|m| m.to_ascii_lowercase().contains(keyword)) =>
                {
                    Some(text.clone())
                }
                _ => None,
            })
        };
        let field = |re: &Regex| {
            arguments.iter().find_map(|(_, _, arg)| match arg {
                LeadingArgument::Object(text) => re
                    .captures(text)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string()),
                LeadingArgument::Literal(_) => None,
            })
        };

        let mut path = None;
        let mut schedule = None;
        match self.family {
            TriggerFamily::Document => path = literal("document").or_else(|| field(&PATH_FIELD)),
            TriggerFamily::Value => path = literal("ref").or_else(|| field(&PATH_FIELD)),
            TriggerFamily::Schedule => schedule = field(&SCHEDULE_FIELD).or_else(|| literal("schedule")),
            TriggerFamily::Storage => path = field(&BUCKET_FIELD).or_else(|| literal("bucket")),
            _ => {}
        }
        if path.is_none() {
            path = field(&BUCKET_FIELD);
        }

        TriggerMetadata {
            trigger_type: self.trigger_type.clone(),
            path,
            schedule,
        }
    }
}

/// One strategy for deciding whether a call registers an event trigger
pub trait TriggerResolver: Send + Sync {
    fn resolve(&self, call: &CallExpr, source: &str, bindings: &BindingTable) -> Option<TriggerMatch>;
}

/// Structural tier: follows the callee's root identifier through import bindings
pub struct ImportResolver {
    modules: Vec<String>,
    factories: Vec<String>,
}

impl ImportResolver {
    pub fn new(config: &TriggersConfig) -> Self {
        Self {
            modules: config.modules.clone(),
            factories: config.factories.clone(),
        }
    }

    fn is_trigger_module(&self, module: &str) -> bool {
        self.modules.iter().any(|m| {
            module == m
                || module
                    .strip_prefix(m.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    fn is_factory_name(&self, name: &str) -> bool {
        if self.factories.iter().any(|f| f == name) {
            return true;
        }
        ["on", "before"].iter().any(|prefix| {
            name.strip_prefix(prefix)
                .and_then(|rest| rest.chars().next())
                .is_some_and(|c| c.is_ascii_uppercase())
        })
    }
}

impl TriggerResolver for ImportResolver {
    fn resolve(&self, call: &CallExpr, source: &str, bindings: &BindingTable) -> Option<TriggerMatch> {
        let root = call.root_identifier(source)?;
        let (module, imported) = bindings.resolve(root)?;
        if !self.is_trigger_module(module) {
            return None;
        }

        let mut segments: Vec<&str> = Vec::new();
        if let Imported::Named(name) = imported {
            segments.push(name.as_str());
        }
        segments.extend(call.member_path(source));

        let last = segments.last()?;
        if !self.is_factory_name(last) {
            return None;
        }
        Some(TriggerMatch::new(&segments))
    }
}

/// Textual tier: matches a known factory name followed by optional generics and `(`
pub struct PatternResolver {
    pattern: Option<Regex>,
}

impl PatternResolver {
    pub fn new(config: &TriggersConfig) -> Result<Self> {
        if config.factories.is_empty() {
            return Ok(Self { pattern: None });
        }
        let names: Vec<String> = config.factories.iter().map(|f| regex::escape(f)).collect();
        let pattern = format!(r"(?:^|[.\s(])({})\s*(?:<[^>()]*>)?\s*\(", names.join("|"));
        let pattern = Regex::new(&pattern).map_err(|e| Error::Config {
            message: format!("invalid trigger vocabulary: {}", e),
        })?;
        Ok(Self {
            pattern: Some(pattern),
        })
    }
}

impl TriggerResolver for PatternResolver {
    fn resolve(&self, call: &CallExpr, source: &str, _bindings: &BindingTable) -> Option<TriggerMatch> {
        let captures = self.pattern.as_ref()?.captures(call.text(source))?;
        let name = captures.get(1)?.as_str();
        Some(TriggerMatch::new(&[name]))
    }
}

/// Runs the structural tier, then the textual fallback
pub struct TriggerDetector {
    tiers: Vec<Box<dyn TriggerResolver>>,
}

impl TriggerDetector {
    pub fn new(config: &TriggersConfig) -> Result<Self> {
        Ok(Self {
            tiers: vec![
                Box::new(ImportResolver::new(config)),
                Box::new(PatternResolver::new(config)?),
            ],
        })
    }

    pub fn detect(&self, call: &CallExpr, source: &str, bindings: &BindingTable) -> Option<TriggerMatch> {
        self.tiers
            .iter()
            .find_map(|tier| tier.resolve(call, source, bindings))
    }
}
