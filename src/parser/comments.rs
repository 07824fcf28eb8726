//! Comment collection.
//!
//! Gathers the comment nodes of one parsed file in source order, keeps the
//! documentation comments (or every comment under `-fparse-all-comments`)
//! and merges runs of adjacent comments into blocks.

use tree_sitter::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentKind {
    Ordinary,
    /// `///`, `//!`, `/** */`, `/*! */`
    Doc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawComment {
    /// Byte range in the file.
    pub begin: usize,
    pub end: usize,
    /// 1-based lines of the first and last character.
    pub begin_line: usize,
    pub end_line: usize,
    pub column: usize,
    pub kind: CommentKind,
    /// `///<` style comments that document the preceding declaration.
    pub trailing: bool,
    pub text: String,
}

/// Classify a comment by its opening characters.
pub fn classify(text: &str) -> (CommentKind, bool) {
    let bytes = text.as_bytes();
    let kind = match bytes {
        [b'/', b'/', b'/', b'/', ..] => CommentKind::Ordinary,
        [b'/', b'/', b'/' | b'!', ..] => CommentKind::Doc,
        [b'/', b'*', b'*', b'/', ..] => CommentKind::Ordinary,
        [b'/', b'*', b'*', b'*', ..] => CommentKind::Ordinary,
        [b'/', b'*', b'*' | b'!', _, ..] => CommentKind::Doc,
        _ => CommentKind::Ordinary,
    };
    let trailing = kind == CommentKind::Doc && bytes.get(3) == Some(&b'<');
    (kind, trailing)
}

/// Collect the comments of a parsed file.
pub fn collect(root: Node, source: &str, parse_all_comments: bool) -> Vec<RawComment> {
    let mut comments: Vec<RawComment> = Vec::new();
    let mut cursor = root.walk();

    'walk: loop {
        let node = cursor.node();
        if node.kind() == "comment" {
            if let Some(comment) = raw_comment(node, source) {
                if comment.kind == CommentKind::Doc || parse_all_comments {
                    push_merged(&mut comments, comment, source);
                }
            }
        }
        if cursor.goto_first_child() {
            continue;
        }
        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                break 'walk;
            }
        }
    }

    comments
}

fn raw_comment(node: Node, source: &str) -> Option<RawComment> {
    let text = node.utf8_text(source.as_bytes()).ok()?;
    let (kind, trailing) = classify(text);
    Some(RawComment {
        begin: node.start_byte(),
        end: node.end_byte(),
        begin_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
        column: node.start_position().column + 1,
        kind,
        trailing,
        text: text.to_string(),
    })
}

/// Append `next`, merging it into the previous comment when the two form one
/// block: only whitespace between them, at most one line break apart, and
/// the same trailing-ness (a trailing comment may continue into an ordinary
/// one aligned in the same column).
fn push_merged(comments: &mut Vec<RawComment>, next: RawComment, source: &str) {
    if let Some(prev) = comments.last_mut() {
        let between = &source[prev.end..next.begin];
        let adjacent = between.chars().all(char::is_whitespace)
            && next.begin_line.saturating_sub(prev.end_line) <= 1;
        let compatible = prev.trailing == next.trailing
            || (prev.trailing
                && !next.trailing
                && next.kind == CommentKind::Ordinary
                && prev.column == next.column);
        if adjacent && compatible {
            prev.end = next.end;
            prev.end_line = next.end_line;
            if next.kind == CommentKind::Doc {
                prev.kind = CommentKind::Doc;
            }
            prev.text = source[prev.begin..prev.end].to_string();
            return;
        }
    }
    comments.push(next);
}
