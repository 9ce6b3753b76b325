//! Concrete tree → typed AST.
//!
//! The walk is total: every concrete node either maps to a dedicated [`NodeKind`], becomes an
//! [`NodeKind::Opaque`] node that keeps its children, or (for anonymous tokens, comments and
//! zero-width missing nodes) contributes only to its parent's presence flags.

use crate::imports::{ImportHook, ImportKind, ImportRequest, import_parts, is_string_kind, scan_imports, unquote};
use crate::node::{
    AstNode, BodyNode, ClassNode, EntryNode, FunctionHeaderNode, ImportNode, NodeId, NodeKind,
    NodeRef, PropertyNode,
};
use crate::query::describe_ast;
use pkl_ls_core::{Document, SourceRange};
use pkl_ls_treesitter::SyntaxNode;
use std::ops::Range;
use std::sync::Arc;
use tracing::{Level, debug, trace};

const COMMENT_KINDS: &[&str] = &["lineComment", "blockComment", "docComment"];
const MODIFIER_TOKENS: &[&str] = &[
    "abstract", "open", "external", "local", "hidden", "fixed", "const",
];
const BINARY_OPERATORS: &[&str] = &[
    "+", "-", "*", "/", "~/", "%", "**", "==", "!=", "<", "<=", ">", ">=", "&&", "||", "is", "as",
    "??", "|>",
];

/// Build the AST of `document` from its concrete tree.
///
/// Nodes are stamped with `depth`. Every import is first announced to `hook` through
/// [`ImportHook::prefetch`], then resolved one at a time while the walk reaches it.
pub fn build_module<N: SyntaxNode>(
    root: &N,
    document: &Arc<Document>,
    depth: usize,
    hook: &dyn ImportHook,
) -> NodeRef {
    let imports = scan_imports(root, document.text());
    if !imports.is_empty() {
        debug!(uri = %document.uri(), depth, imports = imports.len(), "prefetching imports");
        hook.prefetch(&imports, document, depth);
    }

    let builder = Builder {
        document,
        depth,
        hook,
    };
    let module = builder.module(root);

    if tracing::enabled!(Level::TRACE) {
        trace!(uri = %document.uri(), depth, "ast:\n{}", describe_ast(&module));
    }
    module
}

struct Builder<'a> {
    document: &'a Arc<Document>,
    depth: usize,
    hook: &'a dyn ImportHook,
}

/// Children of one concrete node, sorted into what the builder cares about.
struct Parts<N> {
    tokens: Vec<String>,
    named: Vec<N>,
    recovered: Vec<NodeRef>,
}

impl<N: SyntaxNode> Parts<N> {
    fn has(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }

    fn take(&mut self, kinds: &[&str]) -> Option<N> {
        let idx = self.named.iter().position(|n| kinds.contains(&n.kind()))?;
        Some(self.named.remove(idx))
    }

    fn take_all(&mut self, kinds: &[&str]) -> Vec<N> {
        let (taken, rest): (Vec<N>, Vec<N>) = std::mem::take(&mut self.named)
            .into_iter()
            .partition(|n| kinds.contains(&n.kind()));
        self.named = rest;
        taken
    }
}

impl Builder<'_> {
    fn module<N: SyntaxNode>(&self, root: &N) -> NodeRef {
        if root.kind() != "module" {
            // A root the parser could not make sense of still yields a module node.
            let mut parts = self.parts(root);
            if root.is_error() {
                parts.recovered.push(self.unidentified(root));
            }
            let members = self.build_all(&parts.named);
            return self.finish(
                root.byte_range(),
                NodeKind::Module {
                    header: None,
                    members,
                },
                parts.recovered,
            );
        }

        let mut parts = self.parts(root);
        let header = parts.take(&["moduleHeader"]).map(|h| self.build(&h));
        let members = self.build_all(&parts.named);
        self.finish(
            root.byte_range(),
            NodeKind::Module { header, members },
            parts.recovered,
        )
    }

    fn parts<N: SyntaxNode>(&self, node: &N) -> Parts<N> {
        let mut parts = Parts {
            tokens: Vec::new(),
            named: Vec::new(),
            recovered: Vec::new(),
        };
        for child in node.child_nodes() {
            if child.is_missing() || COMMENT_KINDS.contains(&child.kind()) {
                continue;
            }
            if child.is_error() {
                parts.recovered.push(self.unidentified(&child));
            } else if child.is_named() {
                parts.named.push(child);
            } else {
                parts.tokens.push(child.kind().to_string());
            }
        }
        parts
    }

    fn build_all<N: SyntaxNode>(&self, nodes: &[N]) -> Vec<NodeRef> {
        nodes.iter().map(|n| self.build(n)).collect()
    }

    fn build<N: SyntaxNode>(&self, node: &N) -> NodeRef {
        if node.is_error() {
            return self.unidentified(node);
        }

        let range = node.byte_range();
        match node.kind() {
            "module" => self.module(node),
            "moduleHeader" => {
                let parts = self.parts(node);
                let clauses = self.build_all(&parts.named);
                self.finish(range, NodeKind::ModuleHeader { clauses }, parts.recovered)
            }
            "moduleClause" => {
                let mut parts = self.parts(node);
                let name = self.build_opt(parts.take(&["qualifiedIdentifier", "identifier"]));
                self.finish(range, NodeKind::ModuleClause { name }, parts.recovered)
            }
            "importClause" | "importExpr" | "extendsOrAmendsClause" => self.import(node),
            "clazz" => self.class(node),
            "classBody" => {
                let (body, recovered) = self.body(node, "{", "}");
                self.finish(range, NodeKind::ClassBody(body), recovered)
            }
            "objectBody" => {
                let (body, recovered) = self.body(node, "{", "}");
                self.finish(range, NodeKind::ObjectBody(body), recovered)
            }
            "classProperty" => {
                let (property, recovered) = self.property(node);
                self.finish(range, NodeKind::ClassProperty(property), recovered)
            }
            "objectProperty" => {
                let (property, recovered) = self.property(node);
                self.finish(range, NodeKind::ObjectProperty(property), recovered)
            }
            "objectEntry" => self.entry(node),
            "classMethod" | "objectMethod" => {
                let mut parts = self.parts(node);
                let header = self.build_opt(parts.take(&["methodHeader"]));
                let body = self.build_opt(first_expression(&mut parts));
                self.finish(range, NodeKind::FunctionDeclaration { header, body }, parts.recovered)
            }
            "methodHeader" => self.function_header(node),
            "parameterList" => {
                let parts = self.parts(node);
                let parameters = self.build_all(&parts.named);
                let kind = NodeKind::ParameterList {
                    has_open_paren: parts.has("("),
                    has_close_paren: parts.has(")"),
                    parameters,
                };
                self.finish(range, kind, parts.recovered)
            }
            "typedIdentifier" => {
                let mut parts = self.parts(node);
                let name = self.build_opt(parts.take(&["identifier"]));
                let type_annotation = self.build_opt(parts.take(&["typeAnnotation"]));
                let kind = NodeKind::Parameter {
                    name,
                    type_annotation,
                };
                self.finish(range, kind, parts.recovered)
            }
            "typeAnnotation" => {
                let mut parts = self.parts(node);
                let ty = self.build_opt(parts.take(&["type"]));
                let kind = NodeKind::TypeAnnotation {
                    has_colon: parts.has(":"),
                    ty,
                };
                self.finish(range, kind, parts.recovered)
            }
            "type" => {
                let mut parts = self.parts(node);
                let identifier = self.build_opt(parts.take(&["qualifiedIdentifier", "identifier"]));
                let arguments = self.build_all(&parts.named);
                let kind = NodeKind::Type {
                    identifier,
                    arguments,
                };
                self.finish(range, kind, parts.recovered)
            }
            "identifier" | "qualifiedIdentifier" => {
                let value = self.text(&range).to_string();
                self.leaf(range, NodeKind::Identifier { value })
            }
            kind if is_string_kind(kind) => {
                let value = unquote(self.text(&range)).to_string();
                self.leaf(range, NodeKind::StringLiteral { value })
            }
            "intLiteral" | "floatLiteral" => {
                let value = self.text(&range).to_string();
                self.leaf(range, NodeKind::NumberLiteral { value })
            }
            "trueLiteral" => self.leaf(range, NodeKind::BooleanLiteral { value: true }),
            "falseLiteral" => self.leaf(range, NodeKind::BooleanLiteral { value: false }),
            "nullLiteral" => self.leaf(range, NodeKind::NullLiteral),
            "variableExpr" => {
                let mut parts = self.parts(node);
                let identifier = self.build_opt(parts.take(&["identifier"]));
                self.finish(range, NodeKind::Variable { identifier }, parts.recovered)
            }
            "methodCallExpr" => {
                let mut parts = self.parts(node);
                let name = self.build_opt(parts.take(&["identifier"]));
                let mut arguments = Vec::new();
                for child in &parts.named {
                    if child.kind() == "argumentList" {
                        let arg_parts = self.parts(child);
                        arguments.extend(self.build_all(&arg_parts.named));
                    } else {
                        arguments.push(self.build(child));
                    }
                }
                self.finish(range, NodeKind::MethodCall { name, arguments }, parts.recovered)
            }
            "binaryExpr" | "binaryExprRightAssoc" | "isExpr" | "asExpr" => self.binary(node),
            other => {
                let parts = self.parts(node);
                let children = self.build_all(&parts.named);
                let kind = NodeKind::Opaque {
                    kind: other.to_string(),
                    children,
                };
                self.finish(range, kind, parts.recovered)
            }
        }
    }

    fn build_opt<N: SyntaxNode>(&self, node: Option<N>) -> Option<NodeRef> {
        node.map(|n| self.build(&n))
    }

    fn import<N: SyntaxNode>(&self, node: &N) -> NodeRef {
        let range = node.byte_range();
        let text = self.document.text();
        let (edge, path_value) = import_parts(node, text).unwrap_or((None, None));
        let keyword_conflict = edge.is_none();
        let kind = edge.unwrap_or(ImportKind::Amends);

        let mut parts = self.parts(node);
        let path_node = parts.named.iter().position(|n| is_string_kind(n.kind()));
        let path = path_node.map(|idx| self.build(&parts.named.remove(idx)));

        let resolution = match (&path_value, keyword_conflict) {
            (Some(path), false) => Some(self.hook.resolve(&ImportRequest {
                importing: self.document,
                path,
                kind,
                depth: self.depth,
            })),
            _ => None,
        };

        let import = ImportNode {
            kind,
            path,
            path_value,
            keyword_conflict,
            resolution,
        };
        self.finish(range, NodeKind::Import(import), parts.recovered)
    }

    fn class<N: SyntaxNode>(&self, node: &N) -> NodeRef {
        let mut parts = self.parts(node);
        let modifiers = self.modifiers(&mut parts);
        let name = self.build_opt(parts.take(&["identifier"]));
        let extends = parts.take(&["classExtendsClause"]).and_then(|clause| {
            let mut clause_parts = self.parts(&clause);
            self.build_opt(clause_parts.take(&["type"]))
        });
        let body = self.build_opt(parts.take(&["classBody"]));
        let class = ClassNode {
            modifiers,
            has_class_keyword: parts.has("class"),
            name,
            extends,
            body,
        };
        self.finish(node.byte_range(), NodeKind::ClassDeclaration(class), parts.recovered)
    }

    fn body<N: SyntaxNode>(&self, node: &N, open: &str, close: &str) -> (BodyNode, Vec<NodeRef>) {
        let parts = self.parts(node);
        let members = self.build_all(&parts.named);
        let body = BodyNode {
            has_open_brace: parts.has(open),
            has_close_brace: parts.has(close),
            members,
        };
        (body, parts.recovered)
    }

    fn property<N: SyntaxNode>(&self, node: &N) -> (PropertyNode, Vec<NodeRef>) {
        let mut parts = self.parts(node);
        let modifiers = self.modifiers(&mut parts);
        parts.take_all(&["annotation"]);
        let name = self.build_opt(parts.take(&["identifier"]));
        let type_annotation = self.build_opt(parts.take(&["typeAnnotation"]));
        let bodies = self.build_all(&parts.take_all(&["objectBody"]));
        let value = self.build_opt(first_expression(&mut parts));
        let property = PropertyNode {
            modifiers,
            name,
            type_annotation,
            has_equals: parts.has("="),
            value,
            bodies,
        };
        (property, parts.recovered)
    }

    fn entry<N: SyntaxNode>(&self, node: &N) -> NodeRef {
        let mut parts = self.parts(node);
        let bodies = self.build_all(&parts.take_all(&["objectBody"]));
        let key = self.build_opt(first_expression(&mut parts));
        let value = self.build_opt(first_expression(&mut parts));
        let entry = EntryNode {
            has_open_bracket: parts.has("["),
            has_close_bracket: parts.has("]"),
            key,
            has_equals: parts.has("="),
            value,
            bodies,
        };
        self.finish(node.byte_range(), NodeKind::ObjectEntry(entry), parts.recovered)
    }

    fn function_header<N: SyntaxNode>(&self, node: &N) -> NodeRef {
        let mut parts = self.parts(node);
        let modifiers = self.modifiers(&mut parts);
        let name = self.build_opt(parts.take(&["identifier"]));
        let parameters = self.build_opt(parts.take(&["parameterList"]));
        let return_type = self.build_opt(parts.take(&["typeAnnotation"]));
        let header = FunctionHeaderNode {
            modifiers,
            has_function_keyword: parts.has("function"),
            name,
            parameters,
            return_type,
        };
        self.finish(node.byte_range(), NodeKind::FunctionHeader(header), parts.recovered)
    }

    fn binary<N: SyntaxNode>(&self, node: &N) -> NodeRef {
        let mut left = None;
        let mut operator = None;
        let mut right = None;
        let mut recovered = Vec::new();

        for child in node.child_nodes() {
            if child.is_missing() || COMMENT_KINDS.contains(&child.kind()) {
                continue;
            }
            if child.is_error() {
                recovered.push(self.unidentified(&child));
            } else if !child.is_named() {
                if operator.is_none() && BINARY_OPERATORS.contains(&child.kind()) {
                    let op = child.kind().to_string();
                    operator = Some(self.leaf(child.byte_range(), NodeKind::BinaryOperator { operator: op }));
                }
            } else if left.is_none() {
                left = Some(self.build(&child));
            } else if right.is_none() {
                right = Some(self.build(&child));
            } else {
                recovered.push(self.build(&child));
            }
        }

        let kind = NodeKind::BinaryExpression {
            left,
            operator,
            right,
        };
        self.finish(node.byte_range(), kind, recovered)
    }

    /// Modifiers appear either as anonymous keyword tokens or wrapped in `modifier` nodes.
    fn modifiers<N: SyntaxNode>(&self, parts: &mut Parts<N>) -> Vec<String> {
        let mut modifiers: Vec<String> = parts
            .tokens
            .iter()
            .filter(|t| MODIFIER_TOKENS.contains(&t.as_str()))
            .cloned()
            .collect();
        for node in parts.take_all(&["modifier"]) {
            modifiers.push(self.text(&node.byte_range()).to_string());
        }
        modifiers
    }

    fn unidentified<N: SyntaxNode>(&self, node: &N) -> NodeRef {
        let range = node.byte_range();
        let text = self.text(&range).to_string();
        self.leaf(range, NodeKind::Unidentified { text })
    }

    fn text(&self, range: &Range<usize>) -> &str {
        self.document.text_in_bytes(range.clone())
    }

    fn leaf(&self, range: Range<usize>, kind: NodeKind) -> NodeRef {
        self.finish(range, kind, Vec::new())
    }

    fn finish(&self, range: Range<usize>, kind: NodeKind, recovered: Vec<NodeRef>) -> NodeRef {
        Arc::new(AstNode {
            id: NodeId::next(),
            range: SourceRange::from_bytes(self.document.line_index(), range),
            import_depth: self.depth,
            document: Arc::clone(self.document),
            kind,
            recovered,
        })
    }
}

/// Remove and return the first remaining named child that can be an expression.
fn first_expression<N: SyntaxNode>(parts: &mut Parts<N>) -> Option<N> {
    let idx = parts
        .named
        .iter()
        .position(|n| !matches!(n.kind(), "identifier" | "annotation" | "modifier" | "typeAnnotation"))?;
    Some(parts.named.remove(idx))
}
