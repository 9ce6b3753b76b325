//! Edit descriptors between two text snapshots.
//!
//! Protocol change records describe *what* was typed, but a tree only needs to know which byte
//! span moved. [`compute_edit`] finds the single contiguous region where two texts differ and
//! expresses it as a [`tree_sitter::InputEdit`].

use tree_sitter::{InputEdit, Point};

/// Compute the edit turning `old` into `new`.
///
/// The changed region starts at the first diverging character and ends at the last diverging
/// character counted from the end; prefix and suffix never overlap. Returns `None` when the
/// texts are identical. Disjoint changes collapse into one region spanning all of them.
pub fn compute_edit(old: &str, new: &str) -> Option<InputEdit> {
    if old == new {
        return None;
    }

    let mut start_byte = 0;
    for ((idx, a), b) in old.char_indices().zip(new.chars()) {
        if a != b {
            break;
        }
        start_byte = idx + a.len_utf8();
    }

    let suffix: usize = old[start_byte..]
        .chars()
        .rev()
        .zip(new[start_byte..].chars().rev())
        .take_while(|(a, b)| a == b)
        .map(|(a, _)| a.len_utf8())
        .sum();

    let old_end_byte = old.len() - suffix;
    let new_end_byte = new.len() - suffix;

    let start_position = point_at(old, start_byte);
    let old_end_position = advance_point(start_position, &old[start_byte..old_end_byte]);
    let new_end_position = advance_point(start_position, &new[start_byte..new_end_byte]);

    Some(InputEdit {
        start_byte,
        old_end_byte,
        new_end_byte,
        start_position,
        old_end_position,
        new_end_position,
    })
}

/// Row/column (byte) point of a byte offset.
pub fn point_at(text: &str, byte: usize) -> Point {
    let byte = byte.min(text.len());
    let head = &text.as_bytes()[..byte];
    let row = head.iter().filter(|&&b| b == b'\n').count();
    let column = match head.iter().rposition(|&b| b == b'\n') {
        Some(newline) => byte - newline - 1,
        None => byte,
    };
    Point { row, column }
}

fn advance_point(mut point: Point, text: &str) -> Point {
    let mut parts = text.split('\n');
    let Some(first) = parts.next() else {
        return point;
    };

    point.column = point.column.saturating_add(first.len());
    for part in parts {
        point.row = point.row.saturating_add(1);
        point.column = part.len();
    }

    point
}
