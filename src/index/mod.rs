// Index data model

pub mod category;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use category::{Category, Classify, PathClassifier};

/// Format version of the persisted index
pub const INDEX_VERSION: u32 = 1;

/// One declared entity in one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Symbol {
    pub name: String,
    pub file: String,
    pub line: u32,
    pub kind: SymbolKind,
    pub signature: String,
    pub is_exported: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_metadata: Option<TriggerMetadata>,
}

impl Symbol {
    /// Identity of a symbol across the project
    pub fn key(&self) -> (&str, u32, &str) {
        (self.file.as_str(), self.line, self.name.as_str())
    }
}

/// Symbol kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SymbolKind {
    Function,
    Type,
    Interface,
    Enum,
    Constant,
    Component,
    Hook,
    EventTrigger,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Type => "type",
            SymbolKind::Interface => "interface",
            SymbolKind::Enum => "enum",
            SymbolKind::Constant => "constant",
            SymbolKind::Component => "component",
            SymbolKind::Hook => "hook",
            SymbolKind::EventTrigger => "event-trigger",
        }
    }
}

/// Details of an event-handler registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerMetadata {
    pub trigger_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
}

/// One import statement (or re-export) of a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRecord {
    pub source: String,
    pub specifiers: Vec<String>,
    pub is_type_only: bool,
}

/// One indexed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub path: String,
    pub category: Category,
    pub symbols: Vec<Symbol>,
    pub imports: Vec<ImportRecord>,
    pub exports: Vec<String>,
}

/// Project-wide symbol table
///
/// `symbols_by_name` is a read-optimized view of `files`. The two are only
/// ever populated together through [`ProjectIndex::insert_file`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectIndex {
    pub version: u32,
    pub built_at: chrono::DateTime<chrono::Utc>,
    files: BTreeMap<String, FileRecord>,
    symbols_by_name: BTreeMap<String, Vec<Symbol>>,
    file_count: usize,
    symbol_count: usize,
}

impl Default for ProjectIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectIndex {
    pub fn new() -> Self {
        Self {
            version: INDEX_VERSION,
            built_at: chrono::Utc::now(),
            files: BTreeMap::new(),
            symbols_by_name: BTreeMap::new(),
            file_count: 0,
            symbol_count: 0,
        }
    }

    /// Add a file and every one of its symbols to both tables.
    /// A record for an already indexed path replaces the old one.
    pub fn insert_file(&mut self, record: FileRecord) {
        if self.files.contains_key(&record.path) {
            self.remove_file(&record.path);
        }

        for symbol in &record.symbols {
            self.symbols_by_name
                .entry(symbol.name.clone())
                .or_default()
                .push(symbol.clone());
        }
        self.symbol_count += record.symbols.len();
        self.files.insert(record.path.clone(), record);
        self.file_count = self.files.len();
    }

    fn remove_file(&mut self, path: &str) {
        let Some(old) = self.files.remove(path) else {
            return;
        };
        for symbol in &old.symbols {
            if let Some(list) = self.symbols_by_name.get_mut(&symbol.name) {
                list.retain(|s| s.file != path);
                if list.is_empty() {
                    self.symbols_by_name.remove(&symbol.name);
                }
            }
        }
        self.symbol_count -= old.symbols.len();
        self.file_count = self.files.len();
    }

    pub fn files(&self) -> &BTreeMap<String, FileRecord> {
        &self.files
    }

    pub fn file(&self, path: &str) -> Option<&FileRecord> {
        self.files.get(path)
    }

    pub fn symbols_by_name(&self) -> &BTreeMap<String, Vec<Symbol>> {
        &self.symbols_by_name
    }

    /// All symbols declared under `name`, across files
    pub fn lookup(&self, name: &str) -> &[Symbol] {
        self.symbols_by_name
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn file_count(&self) -> usize {
        self.file_count
    }

    pub fn symbol_count(&self) -> usize {
        self.symbol_count
    }

    /// Check that the derived tables agree with `files`. Used to reject
    /// hand-edited or truncated cache artifacts.
    pub fn is_consistent(&self) -> bool {
        if self.file_count != self.files.len() {
            return false;
        }

        let mut expected: BTreeMap<&str, Vec<&Symbol>> = BTreeMap::new();
        let mut total = 0;
        for record in self.files.values() {
            for symbol in &record.symbols {
                if symbol.file != record.path {
                    return false;
                }
                expected.entry(symbol.name.as_str()).or_default().push(symbol);
                total += 1;
            }
        }
        if total != self.symbol_count || expected.len() != self.symbols_by_name.len() {
            return false;
        }

        expected.into_iter().all(|(name, mut wanted)| {
            let Some(actual) = self.symbols_by_name.get(name) else {
                return false;
            };
            let mut actual: Vec<&Symbol> = actual.iter().collect();
            wanted.sort_by(|a, b| a.key().cmp(&b.key()));
            actual.sort_by(|a, b| a.key().cmp(&b.key()));
            wanted == actual
        })
    }

    /// Symbol counts per kind, for stats output
    pub fn kind_breakdown(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for symbol in self.files.values().flat_map(|f| f.symbols.iter()) {
            *counts.entry(symbol.kind.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(file: &str, line: u32, name: &str) -> Symbol {
        Symbol {
            name: name.to_string(),
            file: file.to_string(),
            line,
            kind: SymbolKind::Function,
            signature: format!("function {}()", name),
            is_exported: true,
            params: Some(Vec::new()),
            return_type: None,
            definition: None,
            trigger_metadata: None,
        }
    }

    fn record(path: &str, symbols: Vec<Symbol>) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            category: Category::Utility,
            symbols,
            imports: Vec::new(),
            exports: Vec::new(),
        }
    }

    #[test]
    fn test_insert_populates_both_tables() {
        let mut index = ProjectIndex::new();
        index.insert_file(record("src/a.ts", vec![symbol("src/a.ts", 1, "format")]));
        index.insert_file(record(
            "src/b.ts",
            vec![symbol("src/b.ts", 3, "format"), symbol("src/b.ts", 9, "parse")],
        ));

        assert_eq!(index.file_count(), 2);
        assert_eq!(index.symbol_count(), 3);
        assert_eq!(index.lookup("format").len(), 2);
        assert_eq!(index.lookup("parse")[0].line, 9);
        assert!(index.lookup("missing").is_empty());
        assert!(index.is_consistent());
    }

    #[test]
    fn test_reinsert_replaces_record() {
        let mut index = ProjectIndex::new();
        index.insert_file(record("src/a.ts", vec![symbol("src/a.ts", 1, "old")]));
        index.insert_file(record("src/a.ts", vec![symbol("src/a.ts", 2, "new")]));

        assert_eq!(index.file_count(), 1);
        assert_eq!(index.symbol_count(), 1);
        assert!(index.lookup("old").is_empty());
        assert_eq!(index.lookup("new").len(), 1);
        assert!(index.is_consistent());
    }

    #[test]
    fn test_inconsistent_index_detected() {
        let mut index = ProjectIndex::new();
        index.insert_file(record("src/a.ts", vec![symbol("src/a.ts", 1, "format")]));
        index
            .symbols_by_name
            .entry("ghost".to_string())
            .or_default()
            .push(symbol("src/z.ts", 4, "ghost"));
        assert!(!index.is_consistent());
    }

    #[test]
    fn test_serialized_field_names() {
        let mut index = ProjectIndex::new();
        let mut trigger = symbol("functions/src/users.ts", 5, "onUserCreate");
        trigger.kind = SymbolKind::EventTrigger;
        trigger.trigger_metadata = Some(TriggerMetadata {
            trigger_type: "onDocumentCreated".to_string(),
            path: Some("users/{id}".to_string()),
            schedule: None,
        });
        index.insert_file(record("functions/src/users.ts", vec![trigger]));

        let json = serde_json::to_value(&index).unwrap();
        assert_eq!(json["fileCount"], 1);
        assert_eq!(json["symbolCount"], 1);
        let stored = &json["files"]["functions/src/users.ts"]["symbols"][0];
        assert_eq!(stored["kind"], "event-trigger");
        assert_eq!(stored["isExported"], true);
        assert_eq!(stored["triggerMetadata"]["path"], "users/{id}");
        assert!(stored.get("returnType").is_none());
        assert_eq!(json["symbolsByName"]["onUserCreate"][0]["line"], 5);

        let back: ProjectIndex = serde_json::from_value(json).unwrap();
        assert!(back.is_consistent());
    }
}
