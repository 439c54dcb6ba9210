// TypeScript / JavaScript declaration extraction

use std::collections::HashSet;
use std::sync::Arc;

use tree_sitter::{Node, Parser as TreeParser, Tree};

use super::compiler::{CompilerContext, Grammar};
use super::syntax::{
    collapse_whitespace, node_text, CallExpr, ExportStmt, FunctionLike, ImportStmt, Imported,
    Initializer, TopLevel, TypeDecl, TypeDeclKind, VarDecl,
};
use super::triggers::{BindingTable, TriggerDetector};
use crate::config::TriggersConfig;
use crate::error::{Error, Result};
use crate::index::{Classify, FileRecord, ImportRecord, Symbol, SymbolKind};

/// Longest initializer or alias text kept in a signature
const MAX_SIGNATURE_VALUE: usize = 80;

/// Call wrappers whose first argument is the real component body
const COMPONENT_WRAPPERS: &[&str] = &["memo", "forwardRef", "React.memo", "React.forwardRef", "observer"];

/// Turns one source file into a [`FileRecord`]
pub trait Extractor: Send + Sync {
    fn can_parse(&self, path: &str) -> bool;
    fn extract(&self, path: &str, content: &str) -> Result<FileRecord>;
}

/// Extractor for .ts/.tsx/.js/.jsx using the tree-sitter TypeScript grammars
pub struct TypeScriptExtractor {
    compiler: CompilerContext,
    triggers: TriggerDetector,
    classifier: Arc<dyn Classify>,
}

/// Per-file extraction state
struct FileContext<'s> {
    path: &'s str,
    source: &'s str,
    bindings: BindingTable,
    symbols: Vec<Symbol>,
    imports: Vec<ImportRecord>,
    exports: Vec<String>,
    /// Locals exported through `export { a }` or `export default a`
    exported_locals: HashSet<String>,
}

impl<'s> FileContext<'s> {
    fn add_export(&mut self, name: &str) {
        if !self.exports.iter().any(|e| e == name) {
            self.exports.push(name.to_string());
        }
    }
}

impl TypeScriptExtractor {
    pub fn new(
        compiler: CompilerContext,
        triggers: &TriggersConfig,
        classifier: Arc<dyn Classify>,
    ) -> Result<Self> {
        Ok(Self {
            compiler,
            triggers: TriggerDetector::new(triggers)?,
            classifier,
        })
    }

    fn parse_tree(&self, content: &str, grammar: Grammar) -> anyhow::Result<Tree> {
        let mut parser = TreeParser::new();
        let language = match grammar {
            Grammar::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT,
            Grammar::Tsx => tree_sitter_typescript::LANGUAGE_TSX,
        };
        parser.set_language(&language.into())?;

        let tree = parser
            .parse(content, None)
            .ok_or_else(|| anyhow::anyhow!("Failed to parse TypeScript code"))?;

        Ok(tree)
    }

    fn extract_imports(&self, import: ImportStmt, ctx: &mut FileContext) {
        let Some(module) = import.source(ctx.source) else {
            return;
        };

        let bindings = import.bindings(ctx.source);
        let specifiers = bindings
            .iter()
            .map(|b| match &b.imported {
                Imported::Named(name) => name.clone(),
                Imported::Default => "default".to_string(),
                Imported::Namespace => format!("* as {}", b.local),
            })
            .collect();

        for binding in bindings {
            ctx.bindings.insert(&module, binding);
        }

        ctx.imports.push(ImportRecord {
            source: module,
            specifiers,
            is_type_only: import.is_type_only(),
        });
    }

    fn extract_declaration(&self, node: Node, exported: bool, ctx: &mut FileContext) -> Vec<String> {
        match TopLevel::classify(node) {
            Some(TopLevel::Function(function)) => self
                .extract_function(function, exported, ctx)
                .into_iter()
                .collect(),
            Some(TopLevel::Variables(vars)) => self.extract_variables(vars, exported, ctx),
            Some(TopLevel::Type(decl)) => self.extract_type(decl, exported, ctx).into_iter().collect(),
            _ => Vec::new(),
        }
    }

    fn extract_function(&self, function: FunctionLike, exported: bool, ctx: &mut FileContext) -> Option<String> {
        let name = function.name(ctx.source)?.to_string();
        let return_type = function.return_type(ctx.source);

        let signature = format!(
            "{}function{} {}{}{}{}",
            if function.is_async() { "async " } else { "" },
            if function.is_generator() { "*" } else { "" },
            name,
            function.type_parameters(ctx.source).unwrap_or(""),
            function.params_text(ctx.source),
            return_type.as_deref().map(|t| format!(": {}", t)).unwrap_or_default(),
        );

        ctx.symbols.push(Symbol {
            kind: infer_kind(&name, true),
            file: ctx.path.to_string(),
            line: line_of(function.node()),
            signature,
            is_exported: exported,
            params: Some(function.params(ctx.source)),
            return_type,
            definition: None,
            trigger_metadata: None,
            name: name.clone(),
        });
        Some(name)
    }

    fn extract_variables(&self, vars: VarDecl, exported: bool, ctx: &mut FileContext) -> Vec<String> {
        let keyword = vars.keyword(ctx.source);
        let mut names = Vec::new();

        for declarator in vars.declarators() {
            // destructuring declarations bind no single name
            let Some(name) = declarator.identifier(ctx.source) else {
                continue;
            };
            let name = name.to_string();
            let line = line_of(declarator.node);

            let symbol = match declarator.value.map(Initializer::classify) {
                Some(Initializer::FunctionLiteral(function)) => {
                    let (head, return_type) = function_literal_head(function, ctx.source);
                    Symbol {
                        kind: infer_kind(&name, true),
                        signature: format!("{} {} = {}", keyword, name, head),
                        params: Some(function.params(ctx.source)),
                        return_type,
                        ..self.bare_symbol(&name, line, exported, ctx)
                    }
                }
                Some(Initializer::Call(call)) => self.call_symbol(call, keyword, &name, line, exported, ctx),
                _ => {
                    let annotation = declarator
                        .type_annotation
                        .map(|t| collapse_whitespace(node_text(t, ctx.source)))
                        .unwrap_or_default();
                    let value = declarator
                        .value
                        .map(|v| format!(" = {}", truncate(&collapse_whitespace(node_text(v, ctx.source)), MAX_SIGNATURE_VALUE)))
                        .unwrap_or_default();
                    Symbol {
                        kind: infer_kind(&name, false),
                        signature: format!("{} {}{}{}", keyword, name, annotation, value),
                        ..self.bare_symbol(&name, line, exported, ctx)
                    }
                }
            };

            ctx.symbols.push(symbol);
            names.push(name);
        }

        names
    }

    /// Symbol for a call initializer: a trigger registration, a wrapped
    /// component, or a plain constant
    fn call_symbol(
        &self,
        call: CallExpr,
        keyword: &str,
        name: &str,
        line: u32,
        exported: bool,
        ctx: &FileContext,
    ) -> Symbol {
        let callee = collapse_whitespace(call.callee_text(ctx.source));

        if let Some(trigger) = self.triggers.detect(&call, ctx.source, &ctx.bindings) {
            return Symbol {
                kind: SymbolKind::EventTrigger,
                signature: format!("{} {} = {}(...)", keyword, name, callee),
                trigger_metadata: Some(trigger.metadata(&call, ctx.source)),
                ..self.bare_symbol(name, line, exported, ctx)
            };
        }

        if COMPONENT_WRAPPERS.contains(&callee.as_str()) {
            if let Some(function) = call.wrapped_function() {
                let (head, return_type) = function_literal_head(function, ctx.source);
                return Symbol {
                    kind: infer_kind(name, true),
                    signature: format!("{} {} = {}({})", keyword, name, callee, head),
                    params: Some(function.params(ctx.source)),
                    return_type,
                    ..self.bare_symbol(name, line, exported, ctx)
                };
            }
        }

        Symbol {
            kind: infer_kind(name, false),
            signature: format!("{} {} = {}(...)", keyword, name, callee),
            ..self.bare_symbol(name, line, exported, ctx)
        }
    }

    fn extract_type(&self, decl: TypeDecl, exported: bool, ctx: &mut FileContext) -> Option<String> {
        let name = decl.name(ctx.source)?.to_string();
        let type_params = decl.type_parameters(ctx.source).unwrap_or("");
        let heritage = decl
            .heritage(ctx.source)
            .map(|h| format!(" {}", h))
            .unwrap_or_default();
        let text = decl.text(ctx.source);

        let (kind, signature) = match decl.kind() {
            TypeDeclKind::Interface => (
                SymbolKind::Interface,
                format!("interface {}{}{}", name, type_params, heritage),
            ),
            TypeDeclKind::Alias => (
                SymbolKind::Type,
                format!(
                    "type {}{} = {}",
                    name,
                    type_params,
                    truncate(&decl.alias_value(ctx.source).unwrap_or_default(), MAX_SIGNATURE_VALUE)
                ),
            ),
            TypeDeclKind::Enum => {
                let prefix = if decl.is_const() { "const " } else { "" };
                (SymbolKind::Enum, format!("{}enum {}", prefix, name))
            }
            TypeDeclKind::Class => {
                let prefix = if decl.is_abstract() { "abstract " } else { "" };
                (
                    SymbolKind::Type,
                    format!("{}class {}{}{}", prefix, name, type_params, heritage),
                )
            }
        };

        let definition = (decl.kind() != TypeDeclKind::Class).then(|| text.to_string());

        ctx.symbols.push(Symbol {
            kind,
            signature,
            definition,
            ..self.bare_symbol(&name, line_of(decl.node()), exported, ctx)
        });
        Some(name)
    }

    fn extract_export(&self, export: ExportStmt, ctx: &mut FileContext) {
        if let Some(declaration) = export.declaration() {
            let names = self.extract_declaration(declaration, true, ctx);
            if export.is_default() {
                ctx.add_export("default");
            } else {
                for name in names {
                    ctx.add_export(&name);
                }
            }
            return;
        }

        if export.is_default() {
            if let Some(local) = export.default_identifier(ctx.source) {
                ctx.exported_locals.insert(local);
            }
            ctx.add_export("default");
            return;
        }

        let clause = export.clause(ctx.source);
        match export.source(ctx.source) {
            Some(module) => {
                let mut specifiers: Vec<String> = clause.iter().map(|(local, _)| local.clone()).collect();
                if clause.is_empty() {
                    specifiers.push(match export.namespace_name(ctx.source) {
                        Some(ns) => format!("* as {}", ns),
                        None => "*".to_string(),
                    });
                }
                ctx.imports.push(ImportRecord {
                    source: module,
                    specifiers,
                    is_type_only: export.is_type_only(),
                });
                if let Some(ns) = export.namespace_name(ctx.source) {
                    ctx.add_export(&ns);
                }
                for (_, exported) in &clause {
                    ctx.add_export(exported);
                }
            }
            None => {
                for (local, exported) in clause {
                    ctx.exported_locals.insert(local);
                    ctx.add_export(&exported);
                }
            }
        }
    }

    /// `require("x")` and `import("x")` calls anywhere in the file
    fn extract_module_requests(&self, root: Node, ctx: &mut FileContext) {
        let mut seen: HashSet<String> = ctx.imports.iter().map(|i| i.source.clone()).collect();
        let mut cursor = root.walk();

        loop {
            let node = cursor.node();
            if let Some(module) = CallExpr::new(node).and_then(|call| call.module_request(ctx.source)) {
                if seen.insert(module.clone()) {
                    ctx.imports.push(ImportRecord {
                        source: module,
                        specifiers: Vec::new(),
                        is_type_only: false,
                    });
                }
            }

            if cursor.goto_first_child() {
                continue;
            }
            loop {
                if cursor.goto_next_sibling() {
                    break;
                }
                if !cursor.goto_parent() {
                    return;
                }
            }
        }
    }

    fn bare_symbol(&self, name: &str, line: u32, exported: bool, ctx: &FileContext) -> Symbol {
        Symbol {
            name: name.to_string(),
            file: ctx.path.to_string(),
            line,
            kind: SymbolKind::Constant,
            signature: String::new(),
            is_exported: exported,
            params: None,
            return_type: None,
            definition: None,
            trigger_metadata: None,
        }
    }
}

impl Extractor for TypeScriptExtractor {
    fn can_parse(&self, path: &str) -> bool {
        self.compiler.grammar_for(path).is_some()
    }

    fn extract(&self, path: &str, content: &str) -> Result<FileRecord> {
        let skipped = |reason: String| Error::ParseSkipped {
            path: path.to_string(),
            reason,
        };

        let grammar = self
            .compiler
            .grammar_for(path)
            .ok_or_else(|| skipped("unsupported file type".to_string()))?;
        let tree = self
            .parse_tree(content, grammar)
            .map_err(|e| skipped(e.to_string()))?;
        let root = tree.root_node();
        if root.has_error() {
            let line = first_error(root).map(line_of).unwrap_or(1);
            return Err(skipped(format!("syntax error near line {}", line)));
        }

        let mut ctx = FileContext {
            path,
            source: content,
            bindings: BindingTable::default(),
            symbols: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
            exported_locals: HashSet::new(),
        };

        let statements: Vec<Node> = {
            let mut cursor = root.walk();
            root.named_children(&mut cursor).collect()
        };

        // imports are hoisted, so bindings must be known before any declaration
        for node in &statements {
            if let Some(TopLevel::Import(import)) = TopLevel::classify(*node) {
                self.extract_imports(import, &mut ctx);
            }
        }

        for node in &statements {
            match TopLevel::classify(*node) {
                Some(TopLevel::Export(export)) => self.extract_export(export, &mut ctx),
                Some(TopLevel::Import(_)) | None => {}
                Some(_) => {
                    self.extract_declaration(*node, false, &mut ctx);
                }
            }
        }

        for symbol in &mut ctx.symbols {
            if ctx.exported_locals.contains(&symbol.name) {
                symbol.is_exported = true;
            }
        }

        self.extract_module_requests(root, &mut ctx);

        Ok(FileRecord {
            path: path.to_string(),
            category: self.classifier.category_of(path),
            symbols: ctx.symbols,
            imports: ctx.imports,
            exports: ctx.exports,
        })
    }
}

/// Hook names are `use` followed by an uppercase letter
pub fn is_hook_name(name: &str) -> bool {
    name.strip_prefix("use")
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_ascii_uppercase())
}

/// Component names are capitalized and contain no underscore
pub fn is_component_name(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase()) && !name.contains('_')
}

/// Kind precedence: hook naming, then capitalized callables, then initializer shape
pub fn infer_kind(name: &str, callable: bool) -> SymbolKind {
    if is_hook_name(name) {
        SymbolKind::Hook
    } else if callable && is_component_name(name) {
        SymbolKind::Component
    } else if callable {
        SymbolKind::Function
    } else {
        SymbolKind::Constant
    }
}

/// Rendered head of an arrow function or function expression, plus its return type
fn function_literal_head(function: FunctionLike, source: &str) -> (String, Option<String>) {
    let return_type = function.return_type(source);
    let ret = return_type
        .as_deref()
        .map(|t| format!(": {}", t))
        .unwrap_or_default();
    let prefix = if function.is_async() { "async " } else { "" };
    let type_params = function.type_parameters(source).unwrap_or("");
    let params = function.params_text(source);

    let head = if function.is_arrow() {
        format!("{}{}{}{} => {{...}}", prefix, type_params, params, ret)
    } else {
        format!(
            "{}function{}{}{}{}",
            prefix,
            if function.is_generator() { "*" } else { "" },
            type_params,
            params,
            ret
        )
    };
    (head, return_type)
}

fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|child| child.has_error())
        .find_map(first_error)
}

fn line_of(node: Node) -> u32 {
    node.start_position().row as u32 + 1
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Category, PathClassifier};

    fn extractor() -> TypeScriptExtractor {
        TypeScriptExtractor::new(
            CompilerContext::default(),
            &TriggersConfig::default(),
            Arc::new(PathClassifier),
        )
        .unwrap()
    }

    fn symbol<'a>(record: &'a FileRecord, name: &str) -> &'a Symbol {
        record
            .symbols
            .iter()
            .find(|s| s.name == name)
            .unwrap_or_else(|| panic!("missing symbol {}", name))
    }

    #[test]
    fn test_function_declarations() {
        let source = r#"
export async function fetchUser(id: string, opts?: Options): Promise<User> {
  return api.get(id);
}

function helper(a, b) {}
"#;
        let record = extractor().extract("src/services/users.ts", source).unwrap();

        assert_eq!(record.category, Category::Service);
        let fetch = symbol(&record, "fetchUser");
        assert_eq!(fetch.kind, SymbolKind::Function);
        assert_eq!(fetch.line, 2);
        assert!(fetch.is_exported);
        assert_eq!(fetch.params.as_deref(), Some(&["id".to_string(), "opts".to_string()][..]));
        assert_eq!(fetch.return_type.as_deref(), Some("Promise<User>"));
        insta::assert_snapshot!(fetch.signature, @"async function fetchUser(id: string, opts?: Options): Promise<User>");

        let helper = symbol(&record, "helper");
        assert!(!helper.is_exported);
        assert_eq!(helper.return_type, None);
        assert_eq!(record.exports, vec!["fetchUser".to_string()]);
    }

    #[test]
    fn test_kind_inference() {
        let source = r#"
export const useCart = () => {};
export const CartView = (props: Props) => null;
export const Cart_Row = () => null;
export function formatPrice(n: number): string { return ""; }
export const TAX_RATE = 0.2;
export const useStore = create(() => ({}));
"#;
        let record = extractor().extract("src/cart.tsx", source).unwrap();

        assert_eq!(symbol(&record, "useCart").kind, SymbolKind::Hook);
        assert_eq!(symbol(&record, "CartView").kind, SymbolKind::Component);
        assert_eq!(symbol(&record, "Cart_Row").kind, SymbolKind::Function);
        assert_eq!(symbol(&record, "formatPrice").kind, SymbolKind::Function);
        assert_eq!(symbol(&record, "TAX_RATE").kind, SymbolKind::Constant);
        assert_eq!(symbol(&record, "useStore").kind, SymbolKind::Hook);

        insta::assert_snapshot!(symbol(&record, "CartView").signature, @"const CartView = (props: Props) => {...}");
        insta::assert_snapshot!(symbol(&record, "TAX_RATE").signature, @"const TAX_RATE = 0.2");
    }

    #[test]
    fn test_wrapped_component() {
        let source = r#"
import { memo } from "react";
export const Avatar = memo(({ url }: AvatarProps) => <img src={url} />);
"#;
        let record = extractor().extract("src/components/Avatar.tsx", source).unwrap();
        let avatar = symbol(&record, "Avatar");
        assert_eq!(avatar.kind, SymbolKind::Component);
        assert_eq!(avatar.params.as_deref(), Some(&["{ url }".to_string()][..]));
    }

    #[test]
    fn test_aggregate_types() {
        let source = r#"
export interface User extends Base {
  id: string;
}
type Status = "active" | "banned";
export enum Role { Admin, Member }
export class Store<T> {}
"#;
        let record = extractor().extract("src/types.ts", source).unwrap();

        let user = symbol(&record, "User");
        assert_eq!(user.kind, SymbolKind::Interface);
        assert_eq!(user.signature, "interface User extends Base");
        assert!(user.definition.as_deref().unwrap().contains("id: string;"));

        let status = symbol(&record, "Status");
        assert_eq!(status.kind, SymbolKind::Type);
        assert!(!status.is_exported);
        assert_eq!(status.signature, r#"type Status = "active" | "banned""#);

        assert_eq!(symbol(&record, "Role").kind, SymbolKind::Enum);
        let store = symbol(&record, "Store");
        assert_eq!(store.kind, SymbolKind::Type);
        assert_eq!(store.definition, None);
    }

    #[test]
    fn test_imports_and_exports() {
        let source = r#"
import React, { useState } from "react";
import * as api from "./api";
import type { User } from "./types";
import "./styles.css";

const local = 1;
function Panel() {}
export { local as renamed };
export default Panel;
export { helper } from "./helpers";
export * from "./shared";
const lazy = () => import("./lazy");
"#;
        let record = extractor().extract("src/Panel.tsx", source).unwrap();

        assert_eq!(record.imports[0].source, "react");
        assert_eq!(record.imports[0].specifiers, vec!["default", "useState"]);
        assert_eq!(record.imports[1].specifiers, vec!["* as api"]);
        assert!(record.imports[2].is_type_only);
        assert!(record.imports[3].specifiers.is_empty());

        let sources: Vec<&str> = record.imports.iter().map(|i| i.source.as_str()).collect();
        assert!(sources.contains(&"./helpers"));
        assert!(sources.contains(&"./shared"));
        assert!(sources.contains(&"./lazy"));

        assert_eq!(record.exports, vec!["renamed", "default", "helper"]);
        assert!(symbol(&record, "local").is_exported);
        assert!(symbol(&record, "Panel").is_exported);
    }

    #[test]
    fn test_trigger_extraction() {
        let source = r#"
import { onDocumentCreated } from "firebase-functions/v2/firestore";
import { onSchedule } from "firebase-functions/v2/scheduler";

export const onUserCreate = onDocumentCreated("users/{id}", async (event) => {});
export const nightly = onSchedule("every day 02:00", async () => {});
"#;
        let record = extractor().extract("functions/src/index.ts", source).unwrap();

        let created = symbol(&record, "onUserCreate");
        assert_eq!(created.kind, SymbolKind::EventTrigger);
        let meta = created.trigger_metadata.as_ref().unwrap();
        assert_eq!(meta.trigger_type, "onDocumentCreated");
        assert_eq!(meta.path.as_deref(), Some("users/{id}"));
        assert_eq!(created.signature, "const onUserCreate = onDocumentCreated(...)");

        let nightly = symbol(&record, "nightly");
        let meta = nightly.trigger_metadata.as_ref().unwrap();
        assert_eq!(meta.schedule.as_deref(), Some("every day 02:00"));
        assert_eq!(meta.path, None);
    }

    #[test]
    fn test_trigger_options_object() {
        let source = r#"
import { onDocumentWritten } from "firebase-functions/v2/firestore";

export const onOrderWrite = onDocumentWritten({ document: "orders/{orderId}" }, async (event) => {
  console.log("order changed");
});
"#;
        let record = extractor().extract("functions/src/orders.ts", source).unwrap();

        let meta = symbol(&record, "onOrderWrite").trigger_metadata.as_ref().unwrap();
        assert_eq!(meta.trigger_type, "onDocumentWritten");
        assert_eq!(meta.path.as_deref(), Some("orders/{orderId}"));
    }

    #[test]
    fn test_syntax_error_is_skipped() {
        let err = extractor()
            .extract("src/broken.ts", "export function broken( {\n  return 1;\n")
            .unwrap_err();
        assert!(matches!(err, Error::ParseSkipped { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_name_predicates() {
        assert!(is_hook_name("useAuth"));
        assert!(!is_hook_name("user"));
        assert!(!is_hook_name("use"));
        assert!(is_component_name("Header"));
        assert!(!is_component_name("MAX_SIZE"));
        assert!(!is_component_name("header"));
    }
}
