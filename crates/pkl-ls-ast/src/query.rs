//! Read-only queries over built modules.

use crate::node::{NodeKind, NodeRef};
use pkl_ls_core::LspPosition;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

/// The innermost node of `module`'s document whose range contains `position`.
///
/// Range ends are inclusive so a cursor placed right after a token still finds it. When two
/// siblings touch at `position`, the earlier one wins.
pub fn position_to_node(module: &NodeRef, position: LspPosition) -> Option<NodeRef> {
    if !module.range().contains(position) {
        return None;
    }

    let mut current = Arc::clone(module);
    loop {
        let next = current
            .children()
            .into_iter()
            .find(|child| child.uri() == module.uri() && child.range().contains(position))
            .cloned();
        match next {
            Some(child) => current = child,
            None => return Some(current),
        }
    }
}

/// Every node below `node` in depth-first pre-order, not including `node` itself.
pub fn descendants(node: &NodeRef) -> Vec<NodeRef> {
    let mut out = Vec::new();
    let mut stack: Vec<NodeRef> = node.children().into_iter().rev().cloned().collect();
    while let Some(next) = stack.pop() {
        stack.extend(next.children().into_iter().rev().cloned());
        out.push(next);
    }
    out
}

/// All identifier nodes of a module, in source order.
pub fn identifiers(module: &NodeRef) -> Vec<NodeRef> {
    descendants(module)
        .into_iter()
        .filter(|n| matches!(n.kind(), NodeKind::Identifier { .. }))
        .collect()
}

/// All class declarations of a module, in source order.
pub fn classes(module: &NodeRef) -> Vec<NodeRef> {
    descendants(module)
        .into_iter()
        .filter(|n| matches!(n.kind(), NodeKind::ClassDeclaration(_)))
        .collect()
}

/// All import-like nodes of a module, in source order.
pub fn imports(module: &NodeRef) -> Vec<NodeRef> {
    descendants(module)
        .into_iter()
        .filter(|n| matches!(n.kind(), NodeKind::Import(_)))
        .collect()
}

/// The declaration a variable reference points at.
///
/// `reference` may be a `Variable` node or the identifier inside one. The module itself is
/// searched first, then the modules its imports resolved to, breadth-first.
pub fn definition_of(module: &NodeRef, reference: &NodeRef) -> Option<NodeRef> {
    let name = referenced_name(module, reference)?;

    let mut seen = HashSet::new();
    let mut queue = vec![Arc::clone(module)];
    while !queue.is_empty() {
        let mut next = Vec::new();
        for candidate in queue {
            if !seen.insert(candidate.id()) {
                continue;
            }
            let nodes = descendants(&candidate);
            if let Some(found) = nodes
                .iter()
                .find(|n| n.declared_name() == Some(name.as_str()) && !is_parameter(n))
            {
                return Some(Arc::clone(found));
            }
            next.extend(
                nodes
                    .iter()
                    .filter_map(|n| match n.kind() {
                        NodeKind::Import(import) => import.resolution.as_ref()?.module().cloned(),
                        _ => None,
                    }),
            );
        }
        queue = next;
    }
    None
}

fn referenced_name(module: &NodeRef, reference: &NodeRef) -> Option<String> {
    match reference.kind() {
        NodeKind::Variable { identifier } => {
            identifier.as_ref()?.identifier_value().map(str::to_string)
        }
        NodeKind::Identifier { value } => {
            // Only identifiers used as references; a declaration's own name is not a reference.
            let parent = parent_of(module, reference)?;
            matches!(parent.kind(), NodeKind::Variable { .. }).then(|| value.clone())
        }
        _ => None,
    }
}

fn is_parameter(node: &NodeRef) -> bool {
    matches!(node.kind(), NodeKind::Parameter { .. })
}

/// The parent of `node` within `module`.
pub fn parent_of(module: &NodeRef, node: &NodeRef) -> Option<NodeRef> {
    let mut stack = vec![Arc::clone(module)];
    while let Some(current) = stack.pop() {
        let children = current.children();
        if children.iter().any(|c| c.id() == node.id()) {
            return Some(current);
        }
        stack.extend(children.into_iter().cloned());
    }
    None
}

/// An indented outline of the AST, one node per line.
pub fn describe_ast(node: &NodeRef) -> String {
    let mut out = String::new();
    describe(node, 0, &mut out);
    out
}

fn describe(node: &NodeRef, depth: usize, out: &mut String) {
    let range = &node.range().positions;
    let _ = write!(
        out,
        "{}{} {}:{}-{}:{}",
        "  ".repeat(depth),
        node.kind_name(),
        range.start.line,
        range.start.character,
        range.end.line,
        range.end.character
    );
    match node.kind() {
        NodeKind::Identifier { value }
        | NodeKind::StringLiteral { value }
        | NodeKind::NumberLiteral { value } => {
            let _ = write!(out, " {value:?}");
        }
        NodeKind::Import(import) => {
            let _ = write!(out, " {}", import.kind);
            if let Some(path) = &import.path_value {
                let _ = write!(out, " {path:?}");
            }
        }
        _ => {}
    }
    out.push('\n');
    for child in node.children() {
        describe(child, depth + 1, out);
    }
}
