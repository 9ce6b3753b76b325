use pkl_ls_core::{
    Document, DocumentError, DocumentUri, LspPosition, LspRange, PositionError, TextChange,
};

fn sample() -> Document {
    Document::new(
        DocumentUri::parse("file:///workspace/sample.pkl").unwrap(),
        Some(3),
        "let a = 1\nlet b = 2\nlet c = 3",
    )
}

#[test]
fn test_find_position_offsets() {
    let document = sample();
    let index = document.line_index();

    assert_eq!(index.to_offset(LspPosition::new(2, 4)), Ok(24));
    assert!(matches!(
        index.to_offset(LspPosition::new(4, 5)),
        Err(PositionError::LineOutOfRange { .. })
    ));
}

#[test]
fn test_edit_scenarios() {
    let document = sample();

    let edited = document
        .apply_edits(
            &[
                TextChange::replace(
                    LspRange::new(LspPosition::new(0, 4), LspPosition::new(0, 5)),
                    "b",
                ),
                TextChange::replace(
                    LspRange::new(LspPosition::new(1, 4), LspPosition::new(2, 5)),
                    "",
                ),
            ],
            Some(4),
        )
        .unwrap();
    assert_eq!(edited.text(), "let b = 1\nlet  = 3");

    let replaced = edited
        .apply_edits(&[TextChange::full("let b = 2")], Some(5))
        .unwrap();
    assert_eq!(replaced.text(), "let b = 2");

    let invalid = LspRange::new(LspPosition::new(5, 4), LspPosition::new(3, 3));
    assert_eq!(
        document
            .apply_edits(&[TextChange::replace(invalid, "x")], Some(4))
            .unwrap_err(),
        DocumentError::InvalidChangeRange {
            range: Some(invalid)
        }
    );
}

#[test]
fn test_positions_survive_edits() {
    let document = sample()
        .apply_edits(
            &[TextChange::replace(
                LspRange::new(LspPosition::new(1, 0), LspPosition::new(1, 0)),
                "// 🐦 pigeon\n",
            )],
            Some(4),
        )
        .unwrap();
    let index = document.line_index();

    assert_eq!(index.line_count(), 4);
    assert_eq!(index.line_text(1).as_deref(), Some("// 🐦 pigeon"));
    let offset = index.to_offset(LspPosition::new(1, 5)).unwrap();
    assert_eq!(&document.text()[offset..offset + 1], " ");
    assert_eq!(index.to_position(offset), Ok(LspPosition::new(1, 5)));
}
