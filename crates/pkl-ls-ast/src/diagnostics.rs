//! Per-node validation.
//!
//! Every node kind checks only its own slots; [`AstNode::diagnostics`] concatenates those local
//! results depth-first over the whole subtree. Imports additionally report resolution failures
//! and carry the errors of the module they resolved to, re-homed onto the import clause.

use crate::imports::ImportResolution;
use crate::node::{AstNode, ImportNode, NodeKind, PropertyNode};
use pkl_ls_core::Diagnostic;

const INCLUDED_FILE_PREFIX: &str = "Error in included file";

impl AstNode {
    /// Diagnostics of this node and everything below it, in depth-first order.
    ///
    /// Returns `None` instead of an empty list when there is nothing to report.
    pub fn diagnostics(&self) -> Option<Vec<Diagnostic>> {
        let mut out = Vec::new();
        self.collect_diagnostics(&mut out);
        (!out.is_empty()).then_some(out)
    }

    fn collect_diagnostics(&self, out: &mut Vec<Diagnostic>) {
        self.local_diagnostics(out);
        for child in self.children() {
            child.collect_diagnostics(out);
        }
    }

    /// Diagnostics produced by this node's own checks, appended to `out`.
    pub fn local_diagnostics(&self, out: &mut Vec<Diagnostic>) {
        if let NodeKind::Import(import) = &self.kind {
            self.import_diagnostics(import, out);
            return;
        }

        let mut error = |message: &str| out.push(Diagnostic::error(self.range.clone(), message));

        match &self.kind {
            NodeKind::Unidentified { .. } => error("Unexpected identifier"),
            NodeKind::Type { identifier, .. } => {
                if identifier.is_none() {
                    error("Provide type identifier");
                }
            }
            NodeKind::TypeAnnotation { has_colon, ty } => {
                if !has_colon {
                    error("Missing colon before type identifier");
                }
                if ty.is_none() {
                    error("Provide type identifier");
                }
            }
            NodeKind::BinaryExpression {
                left,
                operator,
                right,
            } => {
                if operator.is_none() {
                    error("Provide binary operator");
                }
                if left.is_none() || right.is_none() {
                    error("Incorrect binary expression");
                }
            }
            NodeKind::ClassProperty(property) => property_checks(property, &mut error),
            NodeKind::ObjectProperty(property) => {
                property_checks(property, &mut error);
                if property.type_annotation.is_some()
                    && (property.has_equals || property.value.is_some())
                {
                    error("Object property cannot declare a type");
                }
            }
            NodeKind::ClassDeclaration(class) => {
                if !class.has_class_keyword {
                    error("Missing class keyword");
                }
                if class.name.is_none() {
                    error("Provide class identifier");
                }
            }
            NodeKind::ClassBody(body) | NodeKind::ObjectBody(body) => {
                if !body.has_open_brace {
                    error("Missing opening brace");
                }
                if !body.has_close_brace {
                    error("Missing closing brace");
                }
            }
            NodeKind::FunctionDeclaration { header, .. } => {
                if header.is_none() {
                    error("Provide function header");
                }
            }
            NodeKind::FunctionHeader(header) => {
                if !header.has_function_keyword {
                    error("Missing function keyword");
                }
                if header.name.is_none() {
                    error("Provide function identifier");
                }
            }
            NodeKind::ParameterList {
                has_open_paren,
                has_close_paren,
                ..
            } => {
                if !has_open_paren {
                    error("Missing opening parenthesis");
                }
                if !has_close_paren {
                    error("Missing closing parenthesis");
                }
            }
            NodeKind::ObjectEntry(entry) => {
                if !entry.has_open_bracket {
                    error("Missing opening bracket");
                }
                if !entry.has_close_bracket {
                    error("Missing closing bracket");
                }
                if entry.key.is_none() {
                    error("Provide entry key");
                }
                if entry.value.is_none() && entry.bodies.is_empty() {
                    error("Provide value");
                } else if entry.value.is_some() && !entry.has_equals {
                    error("Missing '=' before value");
                }
            }
            NodeKind::Import(_)
            | NodeKind::Module { .. }
            | NodeKind::ModuleHeader { .. }
            | NodeKind::ModuleClause { .. }
            | NodeKind::Parameter { .. }
            | NodeKind::Identifier { .. }
            | NodeKind::StringLiteral { .. }
            | NodeKind::NumberLiteral { .. }
            | NodeKind::BooleanLiteral { .. }
            | NodeKind::NullLiteral
            | NodeKind::Variable { .. }
            | NodeKind::MethodCall { .. }
            | NodeKind::BinaryOperator { .. }
            | NodeKind::Opaque { .. } => {}
        }
    }

    fn import_diagnostics(&self, import: &ImportNode, out: &mut Vec<Diagnostic>) {
        let mut error = |message: String| out.push(Diagnostic::error(self.range.clone(), message));

        if import.keyword_conflict {
            error("Use either 'amends' or 'extends'".to_string());
        }
        let Some(path) = import.path_value.as_deref() else {
            error("Provide module path".to_string());
            return;
        };

        match &import.resolution {
            None => {}
            Some(ImportResolution::NotFound) => error(format!("Module not found: {path}")),
            Some(ImportResolution::DepthExceeded { max_depth }) => error(format!(
                "Module not found: {path} (import depth limit {max_depth} reached)"
            )),
            Some(ImportResolution::TimedOut) => error(format!(
                "Module not found: {path} (timed out waiting for the module)"
            )),
            Some(ImportResolution::Resolved(module)) => {
                for diagnostic in module.diagnostics().into_iter().flatten() {
                    if !diagnostic.is_error() {
                        continue;
                    }
                    error(rehome_message(path, &diagnostic));
                }
            }
        }
    }
}

fn property_checks(property: &PropertyNode, error: &mut impl FnMut(&str)) {
    let has_value = property.value.is_some() || !property.bodies.is_empty();
    if property.type_annotation.is_none() && !has_value && !property.has_equals {
        error("Provide property type or value.");
        return;
    }
    if property.has_equals && !has_value {
        error("Provide value");
    }
    if property.value.is_some() && !property.has_equals {
        error("Missing '=' before value");
    }
}

/// Message of a diagnostic from an imported module as reported on the import clause.
///
/// Messages already re-homed by a nested import keep their original prefix.
fn rehome_message(path: &str, diagnostic: &Diagnostic) -> String {
    if diagnostic.message.starts_with(INCLUDED_FILE_PREFIX) {
        return diagnostic.message.clone();
    }
    let start = diagnostic.range.positions.start;
    format!(
        "{INCLUDED_FILE_PREFIX} {path}:{}:{}: {}",
        start.line + 1,
        start.character + 1,
        diagnostic.message
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_module;
    use crate::fixture::{Piece, error, leaf, missing, module, node, parse_outline, render, token};
    use crate::imports::{ImportHook, ImportRequest, NoImports};
    use crate::node::NodeRef;
    use pkl_ls_core::{Document, DocumentUri};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn document(uri: &str, text: &str) -> Arc<Document> {
        Arc::new(Document::new(DocumentUri::parse(uri).unwrap(), Some(1), text))
    }

    fn build_piece(piece: &Piece) -> NodeRef {
        let (text, root) = render(piece);
        build_module(&root, &document("file:///main.pkl", &text), 0, &NoImports)
    }

    fn messages(module: &NodeRef) -> Vec<String> {
        module
            .diagnostics()
            .unwrap_or_default()
            .into_iter()
            .map(|d| d.message)
            .collect()
    }

    #[test]
    fn test_bare_property_needs_type_or_value() {
        let module = build_piece(&module(vec![node(
            "classProperty",
            vec![leaf("identifier", "name")],
        )]));
        let diagnostics = module.diagnostics().unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].message, "Provide property type or value.");
        assert_eq!(diagnostics[0].range.bytes, 0..4);
    }

    #[test]
    fn test_clean_module_has_no_diagnostics() {
        let text = "name = \"pigeon\"\nage: Int = 3\n";
        let root = parse_outline(text);
        let module = build_module(&root, &document("file:///main.pkl", text), 0, &NoImports);
        assert!(module.diagnostics().is_none());
    }

    #[test]
    fn test_property_assignment_checks() {
        let module = build_piece(&module(vec![
            node("classProperty", vec![leaf("identifier", "a"), token("=")]),
            node(
                "classProperty",
                vec![leaf("identifier", "b"), leaf("intLiteral", "1")],
            ),
        ]));
        assert_eq!(messages(&module), ["Provide value", "Missing '=' before value"]);
    }

    #[test]
    fn test_object_property_cannot_declare_type() {
        let module = build_piece(&module(vec![node(
            "classProperty",
            vec![
                leaf("identifier", "config"),
                node(
                    "objectBody",
                    vec![
                        token("{"),
                        node(
                            "objectProperty",
                            vec![
                                leaf("identifier", "x"),
                                node(
                                    "typeAnnotation",
                                    vec![token(":"), node("type", vec![leaf("identifier", "Int")])],
                                ),
                                token("="),
                                leaf("intLiteral", "1"),
                            ],
                        ),
                        missing("}"),
                    ],
                ),
            ],
        )]));
        assert_eq!(
            messages(&module),
            ["Missing closing brace", "Object property cannot declare a type"]
        );
    }

    #[test]
    fn test_binary_expression_checks() {
        let text = "a = x y\nb = 1 + 2\n";
        let root = parse_outline(text);
        let module = build_module(&root, &document("file:///main.pkl", text), 0, &NoImports);
        assert_eq!(messages(&module), ["Provide binary operator"]);

        let module = build_piece(&module_with_value(node(
            "binaryExpr",
            vec![leaf("intLiteral", "1"), token("+")],
        )));
        assert_eq!(messages(&module), ["Incorrect binary expression"]);
    }

    fn module_with_value(value: Piece) -> Piece {
        module(vec![node(
            "classProperty",
            vec![leaf("identifier", "v"), token("="), value],
        )])
    }

    #[test]
    fn test_type_annotation_checks() {
        let module = build_piece(&module(vec![node(
            "classProperty",
            vec![
                leaf("identifier", "a"),
                node("typeAnnotation", vec![missing(":"), node("type", vec![])]),
            ],
        )]));
        assert_eq!(
            messages(&module),
            ["Missing colon before type identifier", "Provide type identifier"]
        );
    }

    #[test]
    fn test_class_and_function_checks() {
        let module = build_piece(&module(vec![
            node(
                "clazz",
                vec![
                    token("class"),
                    missing("identifier"),
                    node("classBody", vec![token("{"), missing("}")]),
                ],
            ),
            node(
                "classMethod",
                vec![
                    node(
                        "methodHeader",
                        vec![
                            token("function"),
                            leaf("identifier", "f"),
                            node("parameterList", vec![token("("), missing(")")]),
                        ],
                    ),
                    token("="),
                    leaf("intLiteral", "1"),
                ],
            ),
        ]));
        assert_eq!(
            messages(&module),
            [
                "Provide class identifier",
                "Missing closing brace",
                "Missing closing parenthesis"
            ]
        );
    }

    #[test]
    fn test_object_entry_checks() {
        let module = build_piece(&module_with_value(node(
            "objectBody",
            vec![
                token("{"),
                node(
                    "objectEntry",
                    vec![token("["), leaf("slStringLiteral", "\"k\""), missing("]"), leaf("intLiteral", "1")],
                ),
                token("}"),
            ],
        )));
        assert_eq!(
            messages(&module),
            ["Missing closing bracket", "Missing '=' before value"]
        );
    }

    #[test]
    fn test_error_nodes_are_unexpected() {
        let module = build_piece(&module(vec![
            error(vec![token("}")]),
            node(
                "classProperty",
                vec![leaf("identifier", "a"), token("="), error(vec![token("=")]), leaf("intLiteral", "1")],
            ),
        ]));
        assert_eq!(
            messages(&module),
            ["Unexpected identifier", "Unexpected identifier"]
        );
    }

    #[test]
    fn test_diagnostics_are_idempotent() {
        let text = "name\nx = = 1\nimport \"missing.pkl\"\n";
        let root = parse_outline(text);
        let doc = document("file:///main.pkl", text);
        let first = build_module(&root, &doc, 0, &NoImports).diagnostics();
        let second = build_module(&root, &doc, 0, &NoImports).diagnostics();
        assert_eq!(first, second);
        assert_eq!(first.map(|d| d.len()), Some(3));
    }

    #[test]
    fn test_import_clause_checks() {
        let module = build_piece(&module(vec![
            node("importClause", vec![token("import")]),
            node(
                "moduleHeader",
                vec![node(
                    "extendsOrAmendsClause",
                    vec![leaf("stringConstant", "\"base.pkl\"")],
                )],
            ),
        ]));
        assert_eq!(
            messages(&module),
            ["Provide module path", "Use either 'amends' or 'extends'"]
        );
    }

    /// Resolves every import to a pre-built module.
    struct Fixed(NodeRef);

    impl ImportHook for Fixed {
        fn resolve(&self, _request: &ImportRequest<'_>) -> ImportResolution {
            ImportResolution::Resolved(Arc::clone(&self.0))
        }
    }

    #[test]
    fn test_imported_errors_are_rehomed_onto_the_clause() {
        let dep_text = "ok = 1\nbroken\n";
        let dep_root = parse_outline(dep_text);
        let dep = build_module(&dep_root, &document("file:///dep.pkl", dep_text), 1, &NoImports);

        let text = "name = 1\nimport \"dep.pkl\"\n";
        let root = parse_outline(text);
        let module = build_module(&root, &document("file:///main.pkl", text), 0, &Fixed(dep));

        let diagnostics = module.diagnostics().unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].message,
            "Error in included file dep.pkl:2:1: Provide property type or value."
        );
        assert_eq!(diagnostics[0].range.positions.start.line, 1);
        assert_eq!(diagnostics[0].range.bytes, 9..25);
    }

    #[test]
    fn test_nested_rehoming_is_not_prefixed_twice() {
        let leaf_text = "broken\n";
        let leaf_module = build_module(
            &parse_outline(leaf_text),
            &document("file:///leaf.pkl", leaf_text),
            2,
            &NoImports,
        );

        let mid_text = "import \"leaf.pkl\"\n";
        let mid = build_module(
            &parse_outline(mid_text),
            &document("file:///mid.pkl", mid_text),
            1,
            &Fixed(leaf_module),
        );

        let top_text = "import \"mid.pkl\"\n";
        let top = build_module(
            &parse_outline(top_text),
            &document("file:///top.pkl", top_text),
            0,
            &Fixed(mid),
        );

        assert_eq!(
            messages(&top),
            ["Error in included file leaf.pkl:1:1: Provide property type or value."]
        );
    }
}
