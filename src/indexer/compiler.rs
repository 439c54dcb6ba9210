// Compiler configuration context (tsconfig.json / jsconfig.json)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use super::discovery::normalize_lexical;

const CONFIG_FILES: &[&str] = &["tsconfig.json", "jsconfig.json"];

/// Grammar used to parse a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    TypeScript,
    Tsx,
}

/// A `paths` entry such as `"@/*": ["src/*"]`, with targets made project-relative
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathAlias {
    pub pattern: String,
    pub targets: Vec<String>,
}

/// Language-feature flags and module-resolution hints read from the project's
/// compiler configuration. Nothing here is used for type checking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerContext {
    /// Parse plain JavaScript files with JSX enabled
    pub jsx: bool,
    /// Project-relative `baseUrl`
    pub base_url: Option<String>,
    pub paths: Vec<PathAlias>,
    pub config_file: Option<PathBuf>,
}

impl Default for CompilerContext {
    fn default() -> Self {
        Self {
            jsx: true,
            base_url: None,
            paths: Vec::new(),
            config_file: None,
        }
    }
}

impl CompilerContext {
    /// Load from the first compiler config found in `root`. A missing or
    /// unreadable file yields the defaults.
    pub fn load(root: &Path) -> Self {
        for name in CONFIG_FILES {
            let path = root.join(name);
            if !path.is_file() {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(content) => match Self::parse(&content) {
                    Some(mut context) => {
                        debug!("Loaded compiler context from {}", path.display());
                        context.config_file = Some(path);
                        return context;
                    }
                    None => warn!("Could not parse {}, using defaults", path.display()),
                },
                Err(e) => warn!("Could not read {}: {}", path.display(), e),
            }
            return Self {
                config_file: Some(path),
                ..Self::default()
            };
        }
        Self::default()
    }

    /// Parse compiler config text. Comments and trailing commas are accepted.
    pub fn parse(content: &str) -> Option<Self> {
        let cleaned = strip_trailing_commas(&strip_comments(content));
        let value: Value = serde_json::from_str(&cleaned).ok()?;
        let options = value.get("compilerOptions");

        let jsx = options
            .and_then(|o| o.get("jsx"))
            .map(|v| !v.is_null())
            .unwrap_or(false);

        let base_url = options
            .and_then(|o| o.get("baseUrl"))
            .and_then(Value::as_str)
            .and_then(normalize_lexical);

        let mut paths = Vec::new();
        if let Some(map) = options.and_then(|o| o.get("paths")).and_then(Value::as_object) {
            let base = base_url.clone().unwrap_or_default();
            for (pattern, targets) in map {
                let targets: Vec<String> = targets
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(Value::as_str)
                    .filter_map(|t| normalize_lexical(&format!("{}/{}", base, t)))
                    .collect();
                if !targets.is_empty() {
                    paths.push(PathAlias {
                        pattern: pattern.clone(),
                        targets,
                    });
                }
            }
        }
        paths.sort_by(|a, b| a.pattern.cmp(&b.pattern));

        Some(Self {
            jsx,
            base_url,
            paths,
            config_file: None,
        })
    }

    /// Grammar for a project-relative path, or `None` for unsupported extensions
    pub fn grammar_for(&self, path: &str) -> Option<Grammar> {
        let ext = path.rsplit_once('.')?.1;
        match ext {
            "ts" | "mts" | "cts" => Some(Grammar::TypeScript),
            "tsx" | "jsx" => Some(Grammar::Tsx),
            "js" | "mjs" | "cjs" => Some(if self.jsx { Grammar::Tsx } else { Grammar::TypeScript }),
            _ => None,
        }
    }
}

/// Remove `//` and `/* */` comments outside string literals
fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        let next = chars.peek().copied();
        match (c, next) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }

    out
}

/// Drop commas directly followed (modulo whitespace) by `}` or `]`
fn strip_trailing_commas(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if c == '\\' && i + 1 < chars.len() {
                out.push(chars[i + 1]);
                i += 2;
                continue;
            }
            if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
            out.push(c);
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if !matches!(next, Some('}') | Some(']')) {
                out.push(c);
            }
        } else {
            out.push(c);
        }
        i += 1;
    }

    out
}
