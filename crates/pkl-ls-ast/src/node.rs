use crate::imports::{ImportKind, ImportResolution};
use pkl_ls_core::{Document, DocumentUri, SourceRange};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared handle to an AST node.
pub type NodeRef = Arc<AstNode>;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique node identity.
///
/// Two nodes are equal only if they are the same node; structurally identical nodes built by
/// different parses have different ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// A typed AST node.
///
/// Nodes are immutable once built. Everything kind-specific lives in [`NodeKind`]; the fields
/// here are shared by every kind.
#[derive(Debug)]
pub struct AstNode {
    pub(crate) id: NodeId,
    pub(crate) range: SourceRange,
    pub(crate) import_depth: usize,
    pub(crate) document: Arc<Document>,
    pub(crate) kind: NodeKind,
    pub(crate) recovered: Vec<NodeRef>,
}

impl AstNode {
    /// Node identity.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Source range in the owning document.
    pub fn range(&self) -> &SourceRange {
        &self.range
    }

    /// Number of import hops between the entry document and this node's document.
    pub fn import_depth(&self) -> usize {
        self.import_depth
    }

    /// The document this node was built from.
    pub fn document(&self) -> &Arc<Document> {
        &self.document
    }

    /// URI of the owning document.
    pub fn uri(&self) -> &DocumentUri {
        self.document.uri()
    }

    /// Kind-specific payload.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Source text covered by this node.
    pub fn text(&self) -> &str {
        self.document.text_in_bytes(self.range.bytes.clone())
    }

    /// Error nodes found inside this construct that do not fit any of its slots.
    pub fn recovered(&self) -> &[NodeRef] {
        &self.recovered
    }

    /// Direct children in source order.
    ///
    /// The module behind a resolved import is not a child: it belongs to another document.
    pub fn children(&self) -> Vec<&NodeRef> {
        let mut out: Vec<&NodeRef> = Vec::new();
        match &self.kind {
            NodeKind::Module { header, members } => {
                out.extend(header);
                out.extend(members);
            }
            NodeKind::ModuleHeader { clauses } => out.extend(clauses),
            NodeKind::ModuleClause { name } => out.extend(name),
            NodeKind::Import(import) => out.extend(&import.path),
            NodeKind::ClassDeclaration(class) => {
                out.extend(&class.name);
                out.extend(&class.extends);
                out.extend(&class.body);
            }
            NodeKind::ClassBody(body) | NodeKind::ObjectBody(body) => out.extend(&body.members),
            NodeKind::ClassProperty(property) | NodeKind::ObjectProperty(property) => {
                out.extend(&property.name);
                out.extend(&property.type_annotation);
                out.extend(&property.value);
                out.extend(&property.bodies);
            }
            NodeKind::FunctionDeclaration { header, body } => {
                out.extend(header);
                out.extend(body);
            }
            NodeKind::FunctionHeader(header) => {
                out.extend(&header.name);
                out.extend(&header.parameters);
                out.extend(&header.return_type);
            }
            NodeKind::ParameterList { parameters, .. } => out.extend(parameters),
            NodeKind::Parameter {
                name,
                type_annotation,
            } => {
                out.extend(name);
                out.extend(type_annotation);
            }
            NodeKind::ObjectEntry(entry) => {
                out.extend(&entry.key);
                out.extend(&entry.value);
                out.extend(&entry.bodies);
            }
            NodeKind::TypeAnnotation { ty, .. } => out.extend(ty),
            NodeKind::Type {
                identifier,
                arguments,
            } => {
                out.extend(identifier);
                out.extend(arguments);
            }
            NodeKind::Variable { identifier } => out.extend(identifier),
            NodeKind::MethodCall { name, arguments } => {
                out.extend(name);
                out.extend(arguments);
            }
            NodeKind::BinaryExpression {
                left,
                operator,
                right,
            } => {
                out.extend(left);
                out.extend(operator);
                out.extend(right);
            }
            NodeKind::Opaque { children, .. } => out.extend(children),
            NodeKind::Identifier { .. }
            | NodeKind::StringLiteral { .. }
            | NodeKind::NumberLiteral { .. }
            | NodeKind::BooleanLiteral { .. }
            | NodeKind::NullLiteral
            | NodeKind::BinaryOperator { .. }
            | NodeKind::Unidentified { .. } => {}
        }
        out.extend(&self.recovered);
        out.sort_by_key(|node| (node.range.bytes.start, node.range.bytes.end));
        out
    }

    /// Short kind name, e.g. `"ClassProperty"`.
    pub fn kind_name(&self) -> &str {
        match &self.kind {
            NodeKind::Module { .. } => "Module",
            NodeKind::ModuleHeader { .. } => "ModuleHeader",
            NodeKind::ModuleClause { .. } => "ModuleClause",
            NodeKind::Import(_) => "Import",
            NodeKind::ClassDeclaration(_) => "ClassDeclaration",
            NodeKind::ClassBody(_) => "ClassBody",
            NodeKind::ClassProperty(_) => "ClassProperty",
            NodeKind::FunctionDeclaration { .. } => "FunctionDeclaration",
            NodeKind::FunctionHeader(_) => "FunctionHeader",
            NodeKind::ParameterList { .. } => "ParameterList",
            NodeKind::Parameter { .. } => "Parameter",
            NodeKind::ObjectBody(_) => "ObjectBody",
            NodeKind::ObjectProperty(_) => "ObjectProperty",
            NodeKind::ObjectEntry(_) => "ObjectEntry",
            NodeKind::TypeAnnotation { .. } => "TypeAnnotation",
            NodeKind::Type { .. } => "Type",
            NodeKind::Identifier { .. } => "Identifier",
            NodeKind::StringLiteral { .. } => "StringLiteral",
            NodeKind::NumberLiteral { .. } => "NumberLiteral",
            NodeKind::BooleanLiteral { .. } => "BooleanLiteral",
            NodeKind::NullLiteral => "NullLiteral",
            NodeKind::Variable { .. } => "Variable",
            NodeKind::MethodCall { .. } => "MethodCall",
            NodeKind::BinaryExpression { .. } => "BinaryExpression",
            NodeKind::BinaryOperator { .. } => "BinaryOperator",
            NodeKind::Unidentified { .. } => "Unidentified",
            NodeKind::Opaque { kind, .. } => kind.as_str(),
        }
    }

    /// The name a declaration introduces (`Identifier` value), if this node declares one.
    pub fn declared_name(&self) -> Option<&str> {
        let name = match &self.kind {
            NodeKind::ClassDeclaration(class) => class.name.as_ref(),
            NodeKind::ClassProperty(property) | NodeKind::ObjectProperty(property) => {
                property.name.as_ref()
            }
            NodeKind::FunctionHeader(header) => header.name.as_ref(),
            NodeKind::Parameter { name, .. } => name.as_ref(),
            _ => None,
        }?;
        name.identifier_value()
    }

    /// The value of an `Identifier` node.
    pub fn identifier_value(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Identifier { value } => Some(value),
            _ => None,
        }
    }
}

impl PartialEq for AstNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for AstNode {}

impl Hash for AstNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Kind-specific node payloads.
///
/// Optional slots are `None` when the construct is incomplete; such nodes still exist so that
/// their diagnostics can say what is missing.
#[derive(Debug)]
pub enum NodeKind {
    /// A whole module (one document).
    Module {
        /// `module`/`amends`/`extends` header.
        header: Option<NodeRef>,
        /// Top-level members in source order.
        members: Vec<NodeRef>,
    },
    /// Module header.
    ModuleHeader {
        /// Module clause and amends/extends clause.
        clauses: Vec<NodeRef>,
    },
    /// `module a.b.c`.
    ModuleClause {
        /// Qualified module name.
        name: Option<NodeRef>,
    },
    /// `import`, `import(...)`, `amends` or `extends`.
    Import(ImportNode),
    /// `class Name extends Base { ... }`.
    ClassDeclaration(ClassNode),
    /// Body of a class.
    ClassBody(BodyNode),
    /// A class or module-level property.
    ClassProperty(PropertyNode),
    /// `function f(...): T = expr`.
    FunctionDeclaration {
        /// Signature.
        header: Option<NodeRef>,
        /// Body expression.
        body: Option<NodeRef>,
    },
    /// Function signature.
    FunctionHeader(FunctionHeaderNode),
    /// `(a: A, b: B)`.
    ParameterList {
        /// Whether `(` is present.
        has_open_paren: bool,
        /// Whether `)` is present.
        has_close_paren: bool,
        /// Parameters in order.
        parameters: Vec<NodeRef>,
    },
    /// One function parameter.
    Parameter {
        /// Parameter name.
        name: Option<NodeRef>,
        /// Declared type.
        type_annotation: Option<NodeRef>,
    },
    /// Body of an object (`{ ... }`).
    ObjectBody(BodyNode),
    /// A property inside an object body.
    ObjectProperty(PropertyNode),
    /// `["key"] = value` inside an object body.
    ObjectEntry(EntryNode),
    /// `: Type`.
    TypeAnnotation {
        /// Whether `:` is present.
        has_colon: bool,
        /// The annotated type.
        ty: Option<NodeRef>,
    },
    /// A type reference.
    Type {
        /// Type name.
        identifier: Option<NodeRef>,
        /// Type arguments and other nested parts.
        arguments: Vec<NodeRef>,
    },
    /// A plain or qualified identifier.
    Identifier {
        /// Identifier text.
        value: String,
    },
    /// A string literal.
    StringLiteral {
        /// Literal contents without delimiters.
        value: String,
    },
    /// Integer or float literal.
    NumberLiteral {
        /// Literal text.
        value: String,
    },
    /// `true` or `false`.
    BooleanLiteral {
        /// Literal value.
        value: bool,
    },
    /// `null`.
    NullLiteral,
    /// A variable reference.
    Variable {
        /// Referenced name.
        identifier: Option<NodeRef>,
    },
    /// `name(args)`.
    MethodCall {
        /// Called name.
        name: Option<NodeRef>,
        /// Argument expressions.
        arguments: Vec<NodeRef>,
    },
    /// `left op right`.
    BinaryExpression {
        /// Left operand.
        left: Option<NodeRef>,
        /// Operator.
        operator: Option<NodeRef>,
        /// Right operand.
        right: Option<NodeRef>,
    },
    /// A binary operator token.
    BinaryOperator {
        /// Operator text, e.g. `"+"`.
        operator: String,
    },
    /// Input the parser could not make sense of.
    Unidentified {
        /// Covered source text.
        text: String,
    },
    /// A named construct without a dedicated kind; its children are still built.
    Opaque {
        /// Grammar kind.
        kind: String,
        /// Built children.
        children: Vec<NodeRef>,
    },
}

/// Payload of [`NodeKind::Import`].
#[derive(Debug)]
pub struct ImportNode {
    /// Import flavour.
    pub kind: ImportKind,
    /// Path literal.
    pub path: Option<NodeRef>,
    /// Path literal contents.
    pub path_value: Option<String>,
    /// Set when an amends/extends clause names both keywords or neither.
    pub keyword_conflict: bool,
    /// Outcome of following the import; `None` when it was not attempted.
    pub resolution: Option<ImportResolution>,
}

/// Payload of [`NodeKind::ClassDeclaration`].
#[derive(Debug)]
pub struct ClassNode {
    /// Modifiers such as `open` or `abstract`.
    pub modifiers: Vec<String>,
    /// Whether the `class` keyword is present.
    pub has_class_keyword: bool,
    /// Class name.
    pub name: Option<NodeRef>,
    /// Supertype of an `extends` clause.
    pub extends: Option<NodeRef>,
    /// Class body; optional in the language.
    pub body: Option<NodeRef>,
}

/// Payload of [`NodeKind::ClassBody`] and [`NodeKind::ObjectBody`].
#[derive(Debug)]
pub struct BodyNode {
    /// Whether `{` is present.
    pub has_open_brace: bool,
    /// Whether `}` is present.
    pub has_close_brace: bool,
    /// Members in source order.
    pub members: Vec<NodeRef>,
}

/// Payload of [`NodeKind::ClassProperty`] and [`NodeKind::ObjectProperty`].
#[derive(Debug)]
pub struct PropertyNode {
    /// Modifiers such as `local` or `hidden`.
    pub modifiers: Vec<String>,
    /// Property name.
    pub name: Option<NodeRef>,
    /// Declared type.
    pub type_annotation: Option<NodeRef>,
    /// Whether `=` is present.
    pub has_equals: bool,
    /// Assigned expression.
    pub value: Option<NodeRef>,
    /// Amending object bodies (`name { ... }`).
    pub bodies: Vec<NodeRef>,
}

/// Payload of [`NodeKind::FunctionHeader`].
#[derive(Debug)]
pub struct FunctionHeaderNode {
    /// Modifiers such as `local`.
    pub modifiers: Vec<String>,
    /// Whether the `function` keyword is present.
    pub has_function_keyword: bool,
    /// Function name.
    pub name: Option<NodeRef>,
    /// Parameter list.
    pub parameters: Option<NodeRef>,
    /// Declared return type.
    pub return_type: Option<NodeRef>,
}

/// Payload of [`NodeKind::ObjectEntry`].
#[derive(Debug)]
pub struct EntryNode {
    /// Whether `[` is present.
    pub has_open_bracket: bool,
    /// Whether `]` is present.
    pub has_close_bracket: bool,
    /// Key expression.
    pub key: Option<NodeRef>,
    /// Whether `=` is present.
    pub has_equals: bool,
    /// Assigned expression.
    pub value: Option<NodeRef>,
    /// Amending object bodies.
    pub bodies: Vec<NodeRef>,
}
