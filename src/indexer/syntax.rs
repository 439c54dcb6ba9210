// Typed views over tree-sitter nodes
//
// Each view wraps one concrete node kind of the TypeScript/TSX grammars and
// exposes only the accessors the extractor needs.

use tree_sitter::Node;

/// Source text of a node
pub fn node_text<'s>(node: Node, source: &'s str) -> &'s str {
    &source[node.byte_range()]
}

/// Collapse every run of whitespace into a single space
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip matching quotes from a string literal
pub fn unquote(text: &str) -> String {
    text.trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string()
}

fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|n| n.kind() != "comment")
        .collect()
}

fn has_token(node: Node, token: &str) -> bool {
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .any(|n| !n.is_named() && n.kind() == token);
    found
}

/// A top-level statement the extractor understands
#[derive(Debug, Clone, Copy)]
pub enum TopLevel<'t> {
    Function(FunctionLike<'t>),
    Variables(VarDecl<'t>),
    Type(TypeDecl<'t>),
    Import(ImportStmt<'t>),
    Export(ExportStmt<'t>),
}

impl<'t> TopLevel<'t> {
    pub fn classify(node: Node<'t>) -> Option<Self> {
        FunctionLike::new(node)
            .map(TopLevel::Function)
            .or_else(|| VarDecl::new(node).map(TopLevel::Variables))
            .or_else(|| TypeDecl::new(node).map(TopLevel::Type))
            .or_else(|| ImportStmt::new(node).map(TopLevel::Import))
            .or_else(|| ExportStmt::new(node).map(TopLevel::Export))
    }
}

/// Function declarations, arrow functions and function expressions
#[derive(Debug, Clone, Copy)]
pub struct FunctionLike<'t> {
    node: Node<'t>,
}

impl<'t> FunctionLike<'t> {
    pub fn new(node: Node<'t>) -> Option<Self> {
        match node.kind() {
            "function_declaration"
            | "generator_function_declaration"
            | "arrow_function"
            | "function_expression"
            | "function"
            | "generator_function" => Some(Self { node }),
            _ => None,
        }
    }

    pub fn node(&self) -> Node<'t> {
        self.node
    }

    pub fn is_declaration(&self) -> bool {
        self.node.kind().ends_with("_declaration")
    }

    pub fn is_arrow(&self) -> bool {
        self.node.kind() == "arrow_function"
    }

    pub fn is_async(&self) -> bool {
        has_token(self.node, "async")
    }

    pub fn is_generator(&self) -> bool {
        self.node.kind().starts_with("generator") || has_token(self.node, "*")
    }

    pub fn name<'s>(&self, source: &'s str) -> Option<&'s str> {
        self.node
            .child_by_field_name("name")
            .map(|n| node_text(n, source))
    }

    /// Parameter list as written, including parentheses, on one line
    pub fn params_text(&self, source: &str) -> String {
        if let Some(params) = self.node.child_by_field_name("parameters") {
            return collapse_whitespace(node_text(params, source));
        }
        match self.node.child_by_field_name("parameter") {
            Some(single) => format!("({})", node_text(single, source)),
            None => "()".to_string(),
        }
    }

    /// Parameter names in declaration order. Destructuring patterns are kept
    /// as their collapsed source text.
    pub fn params(&self, source: &str) -> Vec<String> {
        if let Some(single) = self.node.child_by_field_name("parameter") {
            return vec![node_text(single, source).to_string()];
        }
        let Some(params) = self.node.child_by_field_name("parameters") else {
            return Vec::new();
        };

        named_children(params)
            .into_iter()
            .map(|param| match param.kind() {
                "required_parameter" | "optional_parameter" => param
                    .child_by_field_name("pattern")
                    .map(|p| collapse_whitespace(node_text(p, source)))
                    .unwrap_or_else(|| collapse_whitespace(node_text(param, source))),
                _ => collapse_whitespace(node_text(param, source)),
            })
            .collect()
    }

    /// Declared return type without the leading colon
    pub fn return_type(&self, source: &str) -> Option<String> {
        let annotation = self.node.child_by_field_name("return_type")?;
        let text = node_text(annotation, source).trim_start();
        let text = text.strip_prefix(':').unwrap_or(text);
        let text = collapse_whitespace(text);
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    pub fn type_parameters<'s>(&self, source: &'s str) -> Option<&'s str> {
        self.node
            .child_by_field_name("type_parameters")
            .map(|n| node_text(n, source))
    }
}

/// `const` / `let` / `var` declarations
#[derive(Debug, Clone, Copy)]
pub struct VarDecl<'t> {
    node: Node<'t>,
}

/// One `name = value` inside a variable declaration
#[derive(Debug, Clone, Copy)]
pub struct Declarator<'t> {
    pub node: Node<'t>,
    pub name: Node<'t>,
    pub type_annotation: Option<Node<'t>>,
    pub value: Option<Node<'t>>,
}

impl<'t> Declarator<'t> {
    /// Bound name, unless the declarator destructures
    pub fn identifier<'s>(&self, source: &'s str) -> Option<&'s str> {
        (self.name.kind() == "identifier").then(|| node_text(self.name, source))
    }
}

impl<'t> VarDecl<'t> {
    pub fn new(node: Node<'t>) -> Option<Self> {
        match node.kind() {
            "lexical_declaration" | "variable_declaration" => Some(Self { node }),
            _ => None,
        }
    }

    /// `const`, `let` or `var`
    pub fn keyword<'s>(&self, source: &'s str) -> &'s str {
        self.node
            .child(0)
            .map(|n| node_text(n, source))
            .unwrap_or("var")
    }

    pub fn declarators(&self) -> Vec<Declarator<'t>> {
        named_children(self.node)
            .into_iter()
            .filter(|n| n.kind() == "variable_declarator")
            .filter_map(|n| {
                Some(Declarator {
                    node: n,
                    name: n.child_by_field_name("name")?,
                    type_annotation: n.child_by_field_name("type"),
                    value: n.child_by_field_name("value"),
                })
            })
            .collect()
    }
}

/// The shape of a declarator's initializer
#[derive(Debug, Clone, Copy)]
pub enum Initializer<'t> {
    FunctionLiteral(FunctionLike<'t>),
    Call(CallExpr<'t>),
    Other(Node<'t>),
}

impl<'t> Initializer<'t> {
    pub fn classify(node: Node<'t>) -> Self {
        let inner = unwrap_expression(node);
        if let Some(function) = FunctionLike::new(inner) {
            return Initializer::FunctionLiteral(function);
        }
        if let Some(call) = CallExpr::new(inner) {
            return Initializer::Call(call);
        }
        Initializer::Other(node)
    }
}

/// Look through parentheses, `as` casts, `satisfies` and non-null assertions
fn unwrap_expression(node: Node) -> Node {
    let mut current = node;
    loop {
        match current.kind() {
            "parenthesized_expression"
            | "as_expression"
            | "satisfies_expression"
            | "non_null_expression" => match named_children(current).into_iter().next() {
                Some(inner) => current = inner,
                None => return current,
            },
            _ => return current,
        }
    }
}

/// First argument of a call when it carries trigger options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeadingArgument<'s> {
    /// A string or substitution-free template literal, unquoted
    Literal(String),
    /// An object literal, as source text
    Object(&'s str),
}

/// A call expression such as `onDocumentCreated("users/{id}", handler)`
#[derive(Debug, Clone, Copy)]
pub struct CallExpr<'t> {
    node: Node<'t>,
}

impl<'t> CallExpr<'t> {
    pub fn new(node: Node<'t>) -> Option<Self> {
        (node.kind() == "call_expression").then_some(Self { node })
    }

    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        node_text(self.node, source)
    }

    pub fn callee(&self) -> Option<Node<'t>> {
        self.node.child_by_field_name("function")
    }

    pub fn callee_text<'s>(&self, source: &'s str) -> &'s str {
        self.callee().map(|n| node_text(n, source)).unwrap_or("")
    }

    /// Identifier at the root of the callee chain:
    /// `functions` in `functions.firestore.document("x").onCreate(...)`
    pub fn root_identifier<'s>(&self, source: &'s str) -> Option<&'s str> {
        let mut node = self.callee()?;
        loop {
            match node.kind() {
                "identifier" => return Some(node_text(node, source)),
                "member_expression" => node = node.child_by_field_name("object")?,
                "call_expression" => node = node.child_by_field_name("function")?,
                "non_null_expression" | "parenthesized_expression" => {
                    node = named_children(node).into_iter().next()?
                }
                _ => return None,
            }
        }
    }

    /// Property names along the callee chain, root first, excluding the root identifier
    pub fn member_path<'s>(&self, source: &'s str) -> Vec<&'s str> {
        let mut path = Vec::new();
        let mut current = self.callee();
        while let Some(node) = current {
            current = match node.kind() {
                "member_expression" => {
                    if let Some(property) = node.child_by_field_name("property") {
                        path.push(node_text(property, source));
                    }
                    node.child_by_field_name("object")
                }
                "call_expression" => node.child_by_field_name("function"),
                "non_null_expression" | "parenthesized_expression" => {
                    named_children(node).into_iter().next()
                }
                _ => None,
            };
        }
        path.reverse();
        path
    }

    /// Identifier or property name the call invokes:
    /// `document` in `functions.firestore.document("x")`
    pub fn method_name<'s>(&self, source: &'s str) -> Option<&'s str> {
        let callee = self.callee()?;
        match callee.kind() {
            "identifier" => Some(node_text(callee, source)),
            "member_expression" => callee
                .child_by_field_name("property")
                .map(|p| node_text(p, source)),
            _ => None,
        }
    }

    /// This call followed by every call nested in its callee chain, outermost first
    pub fn call_chain(&self) -> Vec<CallExpr<'t>> {
        let mut chain = vec![*self];
        let mut current = self.callee();
        while let Some(node) = current {
            current = match node.kind() {
                "call_expression" => {
                    chain.push(CallExpr { node });
                    node.child_by_field_name("function")
                }
                "member_expression" => node.child_by_field_name("object"),
                "non_null_expression" | "parenthesized_expression" => {
                    named_children(node).into_iter().next()
                }
                _ => None,
            };
        }
        chain
    }

    pub fn leading_argument<'s>(&self, source: &'s str) -> Option<LeadingArgument<'s>> {
        let argument = unwrap_expression(self.arguments().into_iter().next()?);
        match argument.kind() {
            "string" => Some(LeadingArgument::Literal(unquote(node_text(argument, source)))),
            "template_string" if named_children(argument)
                .iter()
                .all(|n| n.kind() != "template_substitution") =>
            {
                Some(LeadingArgument::Literal(unquote(node_text(argument, source))))
            }
            "object" => Some(LeadingArgument::Object(node_text(argument, source))),
            _ => None,
        }
    }

    pub fn arguments(&self) -> Vec<Node<'t>> {
        self.node
            .child_by_field_name("arguments")
            .map(named_children)
            .unwrap_or_default()
    }

    /// Module named by `require("x")` or a dynamic `import("x")`
    pub fn module_request(&self, source: &str) -> Option<String> {
        let callee = self.callee()?;
        let is_loader = match callee.kind() {
            "import" => true,
            "identifier" => node_text(callee, source) == "require",
            _ => false,
        };
        if !is_loader {
            return None;
        }
        let argument = self.arguments().into_iter().next()?;
        (argument.kind() == "string").then(|| unquote(node_text(argument, source)))
    }

    /// First argument when it is a function literal, as in `memo(() => ...)`
    pub fn wrapped_function(&self) -> Option<FunctionLike<'t>> {
        self.arguments()
            .into_iter()
            .next()
            .and_then(|arg| FunctionLike::new(unwrap_expression(arg)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeDeclKind {
    Interface,
    Alias,
    Enum,
    Class,
}

/// Interface, type alias, enum and class declarations
#[derive(Debug, Clone, Copy)]
pub struct TypeDecl<'t> {
    node: Node<'t>,
    kind: TypeDeclKind,
}

impl<'t> TypeDecl<'t> {
    pub fn new(node: Node<'t>) -> Option<Self> {
        let kind = match node.kind() {
            "interface_declaration" => TypeDeclKind::Interface,
            "type_alias_declaration" => TypeDeclKind::Alias,
            "enum_declaration" => TypeDeclKind::Enum,
            "class_declaration" | "abstract_class_declaration" => TypeDeclKind::Class,
            _ => return None,
        };
        Some(Self { node, kind })
    }

    pub fn node(&self) -> Node<'t> {
        self.node
    }

    pub fn kind(&self) -> TypeDeclKind {
        self.kind
    }

    pub fn is_abstract(&self) -> bool {
        self.node.kind() == "abstract_class_declaration"
    }

    /// `const enum`
    pub fn is_const(&self) -> bool {
        has_token(self.node, "const")
    }

    pub fn name<'s>(&self, source: &'s str) -> Option<&'s str> {
        self.node
            .child_by_field_name("name")
            .map(|n| node_text(n, source))
    }

    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        node_text(self.node, source)
    }

    pub fn type_parameters<'s>(&self, source: &'s str) -> Option<&'s str> {
        self.node
            .child_by_field_name("type_parameters")
            .map(|n| node_text(n, source))
    }

    /// `extends ...` / `implements ...` clause text
    pub fn heritage(&self, source: &str) -> Option<String> {
        let mut cursor = self.node.walk();
        let clause = self
            .node
            .named_children(&mut cursor)
            .find(|n| matches!(n.kind(), "extends_type_clause" | "class_heritage"))?;
        Some(collapse_whitespace(node_text(clause, source)))
    }

    /// Right-hand side of a type alias
    pub fn alias_value(&self, source: &str) -> Option<String> {
        self.node
            .child_by_field_name("value")
            .map(|n| collapse_whitespace(node_text(n, source)))
    }
}

/// How a local import binding maps to the exporting module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Imported {
    Named(String),
    Default,
    Namespace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    pub local: String,
    pub imported: Imported,
}

/// `import ... from "source"`
#[derive(Debug, Clone, Copy)]
pub struct ImportStmt<'t> {
    node: Node<'t>,
}

impl<'t> ImportStmt<'t> {
    pub fn new(node: Node<'t>) -> Option<Self> {
        (node.kind() == "import_statement").then_some(Self { node })
    }

    pub fn source(&self, source: &str) -> Option<String> {
        self.node
            .child_by_field_name("source")
            .map(|n| unquote(node_text(n, source)))
    }

    pub fn is_type_only(&self) -> bool {
        has_token(self.node, "type") || has_token(self.node, "typeof")
    }

    pub fn bindings(&self, source: &str) -> Vec<ImportBinding> {
        let mut bindings = Vec::new();
        let Some(clause) = named_children(self.node)
            .into_iter()
            .find(|n| n.kind() == "import_clause")
        else {
            return bindings;
        };

        for part in named_children(clause) {
            match part.kind() {
                "identifier" => bindings.push(ImportBinding {
                    local: node_text(part, source).to_string(),
                    imported: Imported::Default,
                }),
                "namespace_import" => {
                    if let Some(local) = named_children(part).into_iter().find(|n| n.kind() == "identifier") {
                        bindings.push(ImportBinding {
                            local: node_text(local, source).to_string(),
                            imported: Imported::Namespace,
                        });
                    }
                }
                "named_imports" => {
                    for spec in named_children(part).into_iter().filter(|n| n.kind() == "import_specifier") {
                        let Some(name) = spec.child_by_field_name("name") else {
                            continue;
                        };
                        let imported = unquote(node_text(name, source));
                        let local = spec
                            .child_by_field_name("alias")
                            .map(|a| node_text(a, source).to_string())
                            .unwrap_or_else(|| imported.clone());
                        bindings.push(ImportBinding {
                            local,
                            imported: Imported::Named(imported),
                        });
                    }
                }
                _ => {}
            }
        }

        bindings
    }
}

/// `export ...` in all its forms
#[derive(Debug, Clone, Copy)]
pub struct ExportStmt<'t> {
    node: Node<'t>,
}

impl<'t> ExportStmt<'t> {
    pub fn new(node: Node<'t>) -> Option<Self> {
        (node.kind() == "export_statement").then_some(Self { node })
    }

    /// The exported declaration in `export const ...` / `export function ...`
    pub fn declaration(&self) -> Option<Node<'t>> {
        self.node.child_by_field_name("declaration")
    }

    pub fn is_default(&self) -> bool {
        has_token(self.node, "default")
    }

    /// Expression in `export default <value>`
    pub fn value(&self) -> Option<Node<'t>> {
        self.node.child_by_field_name("value")
    }

    /// Local name in `export default name;`
    pub fn default_identifier(&self, source: &str) -> Option<String> {
        self.value()
            .filter(|v| v.kind() == "identifier")
            .map(|v| node_text(v, source).to_string())
    }

    /// Module of a re-export (`export { a } from "./a"`)
    pub fn source(&self, source: &str) -> Option<String> {
        self.node
            .child_by_field_name("source")
            .map(|n| unquote(node_text(n, source)))
    }

    pub fn is_type_only(&self) -> bool {
        has_token(self.node, "type")
    }

    /// `(local, exported)` pairs of an export clause
    pub fn clause(&self, source: &str) -> Vec<(String, String)> {
        let Some(clause) = named_children(self.node)
            .into_iter()
            .find(|n| n.kind() == "export_clause")
        else {
            return Vec::new();
        };

        named_children(clause)
            .into_iter()
            .filter(|n| n.kind() == "export_specifier")
            .filter_map(|spec| {
                let local = unquote(node_text(spec.child_by_field_name("name")?, source));
                let exported = spec
                    .child_by_field_name("alias")
                    .map(|a| unquote(node_text(a, source)))
                    .unwrap_or_else(|| local.clone());
                Some((local, exported))
            })
            .collect()
    }

    /// Name bound by `export * as ns from "..."`
    pub fn namespace_name(&self, source: &str) -> Option<String> {
        let ns = named_children(self.node)
            .into_iter()
            .find(|n| n.kind() == "namespace_export")?;
        named_children(ns)
            .into_iter()
            .next()
            .map(|n| unquote(node_text(n, source)))
    }
}
