//! Owned syntax trees for exercising the AST layer without a Pkl grammar.
//!
//! [`FixtureNode`] implements [`SyntaxNode`], so anything that builds from concrete trees can be
//! driven by hand-made input. Two ways to get one:
//!
//! - [`render`] lays out a [`Piece`] outline, producing the source text and a tree whose byte
//!   ranges match it;
//! - [`parse_outline`] reads a small line-oriented subset of Pkl (imports, amends/extends,
//!   properties with optional types and simple values). Lines it does not understand become
//!   error nodes, which is how a real parser reports them too.

use pkl_ls_treesitter::SyntaxNode;
use std::ops::Range;

/// An owned concrete syntax node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureNode {
    kind: String,
    named: bool,
    error: bool,
    missing: bool,
    range: Range<usize>,
    children: Vec<FixtureNode>,
}

impl SyntaxNode for FixtureNode {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn is_named(&self) -> bool {
        self.named
    }

    fn is_error(&self) -> bool {
        self.error
    }

    fn is_missing(&self) -> bool {
        self.missing
    }

    fn byte_range(&self) -> Range<usize> {
        self.range.clone()
    }

    fn child_nodes(&self) -> Vec<Self> {
        self.children.clone()
    }
}

/// Layout description consumed by [`render`].
#[derive(Debug, Clone)]
pub enum Piece {
    /// A node with children separated by `separator`.
    Node {
        /// Grammar kind.
        kind: String,
        /// Whether this is an error node.
        error: bool,
        /// Text placed between consecutive children.
        separator: &'static str,
        /// Child pieces.
        children: Vec<Piece>,
    },
    /// A leaf with text. Named leaves have a grammar kind; anonymous ones use their text.
    Leaf {
        /// Grammar kind.
        kind: String,
        /// Whether the leaf is a named rule.
        named: bool,
        /// Source text.
        text: String,
    },
    /// A zero-width node inserted by error recovery.
    Missing {
        /// Grammar kind of the absent node.
        kind: String,
    },
}

/// A named node whose children are separated by single spaces.
pub fn node(kind: &str, children: Vec<Piece>) -> Piece {
    Piece::Node {
        kind: kind.to_string(),
        error: false,
        separator: " ",
        children,
    }
}

/// A named node whose children are placed on separate lines.
pub fn block(kind: &str, children: Vec<Piece>) -> Piece {
    Piece::Node {
        kind: kind.to_string(),
        error: false,
        separator: "\n",
        children,
    }
}

/// A `module` root with one member per line.
pub fn module(members: Vec<Piece>) -> Piece {
    block("module", members)
}

/// A named leaf such as an identifier or literal.
pub fn leaf(kind: &str, text: &str) -> Piece {
    Piece::Leaf {
        kind: kind.to_string(),
        named: true,
        text: text.to_string(),
    }
}

/// An anonymous token such as `=` or `class`.
pub fn token(text: &str) -> Piece {
    Piece::Leaf {
        kind: text.to_string(),
        named: false,
        text: text.to_string(),
    }
}

/// A zero-width missing node.
pub fn missing(kind: &str) -> Piece {
    Piece::Missing {
        kind: kind.to_string(),
    }
}

/// An error node wrapping `children`.
pub fn error(children: Vec<Piece>) -> Piece {
    Piece::Node {
        kind: "ERROR".to_string(),
        error: true,
        separator: " ",
        children,
    }
}

/// Lay out `piece`, returning the source text and the matching tree.
pub fn render(piece: &Piece) -> (String, FixtureNode) {
    let mut text = String::new();
    let root = render_piece(piece, &mut text);
    (text, root)
}

fn render_piece(piece: &Piece, text: &mut String) -> FixtureNode {
    match piece {
        Piece::Node {
            kind,
            error,
            separator,
            children,
        } => {
            let start = text.len();
            let mut nodes = Vec::with_capacity(children.len());
            let mut emitted = false;
            for child in children {
                let zero_width = matches!(child, Piece::Missing { .. });
                if emitted && !zero_width {
                    text.push_str(separator);
                }
                nodes.push(render_piece(child, text));
                emitted |= !zero_width;
            }
            FixtureNode {
                kind: kind.clone(),
                named: true,
                error: *error,
                missing: false,
                range: start..text.len(),
                children: nodes,
            }
        }
        Piece::Leaf { kind, named, text: leaf } => {
            let start = text.len();
            text.push_str(leaf);
            FixtureNode {
                kind: kind.clone(),
                named: *named,
                error: false,
                missing: false,
                range: start..text.len(),
                children: Vec::new(),
            }
        }
        Piece::Missing { kind } => FixtureNode {
            kind: kind.clone(),
            named: !is_token(kind),
            error: false,
            missing: true,
            range: text.len()..text.len(),
            children: Vec::new(),
        },
    }
}

fn is_token(kind: &str) -> bool {
    !kind.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
}

/// Read a line-oriented outline into a `module` tree whose ranges index into `text`.
///
/// Understood lines (surrounding whitespace is ignored, blank lines are skipped):
///
/// ```text
/// import "path"
/// amends "path"
/// extends "path"
/// name
/// name: Type
/// name = value
/// name: Type = value
/// ```
///
/// A value is one word (integer, float, `"string"`, `true`/`false`, `null`, or a variable
/// reference) or `left op right`; two words without an operator become an operator-less binary
/// expression. Anything else is wrapped in an error node.
pub fn parse_outline(text: &str) -> FixtureNode {
    let mut members = Vec::new();
    let mut line_start = 0;
    for line in text.split_inclusive('\n') {
        let content = line.trim_end_matches('\n');
        let trimmed = content.trim();
        if !trimmed.is_empty() {
            let offset = line_start + (content.len() - content.trim_start().len());
            members.push(outline_line(trimmed, offset));
        }
        line_start += line.len();
    }

    FixtureNode {
        kind: "module".to_string(),
        named: true,
        error: false,
        missing: false,
        range: 0..text.len(),
        children: members,
    }
}

fn outline_line(line: &str, offset: usize) -> FixtureNode {
    let words = words(line, offset);
    let span = offset..offset + line.len();

    match words.as_slice() {
        [(keyword_range, "import"), (path_range, path)] if is_string(path) => named(
            "importClause",
            span,
            vec![
                anonymous("import", keyword_range.clone()),
                named_leaf("stringConstant", path_range.clone()),
            ],
        ),
        [(keyword_range, keyword @ ("amends" | "extends")), (path_range, path)]
            if is_string(path) =>
        {
            let clause = named(
                "extendsOrAmendsClause",
                span.clone(),
                vec![
                    anonymous(keyword, keyword_range.clone()),
                    named_leaf("stringConstant", path_range.clone()),
                ],
            );
            named("moduleHeader", span, vec![clause])
        }
        _ => outline_property(line, offset).unwrap_or_else(|| FixtureNode {
            kind: "ERROR".to_string(),
            named: true,
            error: true,
            missing: false,
            range: span,
            children: Vec::new(),
        }),
    }
}

fn outline_property(line: &str, offset: usize) -> Option<FixtureNode> {
    let (lhs, rhs) = match line.split_once('=') {
        Some((lhs, rhs)) => (lhs, Some(rhs)),
        None => (line, None),
    };

    let mut children = Vec::new();
    let (name, ty) = match lhs.split_once(':') {
        Some((name, ty)) => (name, Some(ty)),
        None => (lhs, None),
    };

    let name_words = words(name, offset);
    let [(name_range, name_word)] = name_words.as_slice() else {
        return None;
    };
    if !is_identifier(name_word) {
        return None;
    }
    children.push(named_leaf("identifier", name_range.clone()));

    if let Some(ty) = ty {
        let colon = offset + name.len();
        let ty_offset = colon + 1;
        let mut annotation = vec![anonymous(":", colon..colon + 1)];
        match words(ty, ty_offset).as_slice() {
            [] => {}
            [(ty_range, ty_word)] if is_identifier(ty_word) => annotation.push(named(
                "type",
                ty_range.clone(),
                vec![named_leaf("qualifiedIdentifier", ty_range.clone())],
            )),
            _ => return None,
        }
        let end = annotation
            .last()
            .map(|n| n.range.end)
            .unwrap_or(colon + 1);
        children.push(named("typeAnnotation", colon..end, annotation));
    }

    if let Some(rhs) = rhs {
        let equals = offset + lhs.len();
        children.push(anonymous("=", equals..equals + 1));
        let value_words = words(rhs, equals + 1);
        if !value_words.is_empty() {
            children.push(outline_expression(&value_words)?);
        }
    }

    let end = children.last().map(|n| n.range.end).unwrap_or(offset);
    Some(named("classProperty", offset..end, children))
}

fn outline_expression(words: &[(Range<usize>, &str)]) -> Option<FixtureNode> {
    match words {
        [(range, word)] => outline_atom(range.clone(), word),
        [(left_range, left), (op_range, op), (right_range, right)] if is_operator(op) => {
            let left = outline_atom(left_range.clone(), left)?;
            let right = outline_atom(right_range.clone(), right)?;
            Some(named(
                "binaryExpr",
                left_range.start..right_range.end,
                vec![left, anonymous(op, op_range.clone()), right],
            ))
        }
        [(left_range, left), (right_range, right)] => {
            let left = outline_atom(left_range.clone(), left)?;
            let right = outline_atom(right_range.clone(), right)?;
            Some(named(
                "binaryExpr",
                left_range.start..right_range.end,
                vec![left, right],
            ))
        }
        _ => None,
    }
}

fn outline_atom(range: Range<usize>, word: &str) -> Option<FixtureNode> {
    let node = match word {
        "true" => named_leaf("trueLiteral", range),
        "false" => named_leaf("falseLiteral", range),
        "null" => named_leaf("nullLiteral", range),
        _ if is_string(word) => named_leaf("slStringLiteral", range),
        _ if is_identifier(word) => named(
            "variableExpr",
            range.clone(),
            vec![named_leaf("identifier", range)],
        ),
        _ if word.parse::<i64>().is_ok() => named_leaf("intLiteral", range),
        _ if word.parse::<f64>().is_ok() => named_leaf("floatLiteral", range),
        _ => return None,
    };
    Some(node)
}

fn named(kind: &str, range: Range<usize>, children: Vec<FixtureNode>) -> FixtureNode {
    FixtureNode {
        kind: kind.to_string(),
        named: true,
        error: false,
        missing: false,
        range,
        children,
    }
}

fn named_leaf(kind: &str, range: Range<usize>) -> FixtureNode {
    named(kind, range, Vec::new())
}

fn anonymous(kind: &str, range: Range<usize>) -> FixtureNode {
    FixtureNode {
        kind: kind.to_string(),
        named: false,
        error: false,
        missing: false,
        range,
        children: Vec::new(),
    }
}

/// Whitespace-separated words of `s` with absolute byte ranges (`s` starts at `offset`).
fn words(s: &str, offset: usize) -> Vec<(Range<usize>, &str)> {
    let mut out = Vec::new();
    let mut start = None;
    for (idx, c) in s.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(begin)) => {
                out.push((offset + begin..offset + idx, &s[begin..idx]));
                start = None;
            }
            (false, None) => start = Some(idx),
            _ => {}
        }
    }
    if let Some(begin) = start {
        out.push((offset + begin..offset + s.len(), &s[begin..]));
    }
    out
}

fn is_identifier(word: &str) -> bool {
    let mut chars = word.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

fn is_string(word: &str) -> bool {
    word.len() >= 2 && word.starts_with('"') && word.ends_with('"')
}

fn is_operator(word: &str) -> bool {
    matches!(
        word,
        "+" | "-"
            | "*"
            | "/"
            | "~/"
            | "%"
            | "**"
            | "=="
            | "!="
            | "<"
            | "<="
            | ">"
            | ">="
            | "&&"
            | "||"
            | "??"
            | "|>"
    )
}
