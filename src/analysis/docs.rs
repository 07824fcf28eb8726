//! Documentation comments attached to declarations.
//!
//! A comment documents the declaration that follows it when nothing but
//! whitespace, qualifiers and other declarators sit between the two. The
//! text is returned with comment markers and `*` decoration removed; tags
//! such as `@param` are left as written.

use crate::parser::ast::SourceLoc;
use crate::parser::TranslationUnit;
use regex::Regex;
use std::sync::LazyLock;

/// `//`, `///`, `//!`, `///<`
static RE_LINE_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*//[/!]?<?").unwrap());

/// `/*`, `/**`, `/*!`, `/**<`
static RE_BLOCK_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*/\*[*!]?<?").unwrap());

static RE_BLOCK_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*\*+/\s*$").unwrap());

/// Leading ` * ` of a block comment's continuation lines.
static RE_DECORATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\*(?:[ \t]|$)").unwrap());

/// Characters that end the region a comment can reach across.
const BARRIERS: &[char] = &[';', '{', '}', '#', '@'];

pub struct DocExtractor {
    enabled: bool,
}

impl DocExtractor {
    pub fn new(enabled: bool) -> Self {
        DocExtractor { enabled }
    }

    /// The formatted comment attached to a declaration starting at `loc`.
    pub fn raw_doc(&self, tu: &TranslationUnit, loc: Option<&SourceLoc>) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let loc = loc?;
        let comment = tu
            .comments(loc.file)
            .iter()
            .rev()
            .find(|c| c.end <= loc.begin)?;
        if comment.trailing {
            return None;
        }
        let between = tu.file(loc.file).text.get(comment.end..loc.begin)?;
        if between.contains(BARRIERS) {
            return None;
        }
        let text = format_comment(&comment.text);
        (!text.is_empty()).then_some(text)
    }
}

/// Strip markers and decoration, then remove the common indentation and
/// blank edge lines.
pub fn format_comment(raw: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut in_block = false;

    for line in raw.lines() {
        let mut text = line.to_string();
        if !in_block && text.trim_start().starts_with("//") {
            text = RE_LINE_MARKER.replace(&text, "").into_owned();
        } else {
            let opening = !in_block && text.trim_start().starts_with("/*");
            if opening {
                text = RE_BLOCK_OPEN.replace(&text, "").into_owned();
                in_block = true;
            }
            if RE_BLOCK_CLOSE.is_match(&text) {
                text = RE_BLOCK_CLOSE.replace(&text, "").into_owned();
                in_block = false;
            }
            if !opening {
                text = RE_DECORATION.replace(&text, "").into_owned();
            }
        }
        lines.push(text.trim_end().to_string());
    }

    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    let lines: Vec<&str> = lines
        .iter()
        .map(|l| l.get(indent..).unwrap_or(""))
        .collect();
    let first = lines.iter().position(|l| !l.is_empty()).unwrap_or(lines.len());
    let last = lines.iter().rposition(|l| !l.is_empty()).map_or(first, |i| i + 1);
    lines[first..last].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::CompilerArgs;
    use crate::parser::ast::{Decl, Item};
    use crate::parser::parse_translation_unit;
    use std::path::Path;

    #[test]
    fn format_line_comments() {
        assert_eq!(format_comment("/// Adds two numbers.\n/// Returns the sum."), "Adds two numbers.\nReturns the sum.");
        assert_eq!(format_comment("//! Module docs"), "Module docs");
    }

    #[test]
    fn format_block_comments() {
        let raw = "/**\n * Parse a header.\n *\n *   @param buf input\n */";
        assert_eq!(format_comment(raw), "Parse a header.\n\n  @param buf input");
        assert_eq!(format_comment("/** One line. */"), "One line.");
        assert_eq!(format_comment("/*! Qt style */"), "Qt style");
    }

    fn docs_for(source: &str) -> Vec<Option<String>> {
        let args = CompilerArgs::default();
        let tu = parse_translation_unit(Path::new("doc.c"), source, &args).unwrap();
        let extractor = DocExtractor::new(true);
        tu.items
            .iter()
            .filter_map(|item| match item {
                Item::Decl(Decl::Function(func)) => Some(extractor.raw_doc(&tu, func.loc.as_ref())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn attaches_to_following_declaration() {
        let src = "/// Start the engine.\nstatic int start(void) { return 0; }\n\n/// Stop it.\nint stop(void);\n";
        assert_eq!(
            docs_for(src),
            vec![Some("Start the engine.".to_string()), Some("Stop it.".to_string())]
        );
    }

    #[test]
    fn barrier_between_comment_and_declaration() {
        let src = "/// Orphaned.\nint x;\nint f(void);\n";
        assert_eq!(docs_for(src), vec![None]);
    }

    #[test]
    fn plain_and_trailing_comments_do_not_attach() {
        let src = "// not documentation\nint a(void);\nint b(void); ///< trailing\nint c(void);\n";
        assert_eq!(docs_for(src), vec![None, None, None]);
    }

    #[test]
    fn disabled_extractor() {
        let args = CompilerArgs::default();
        let tu = parse_translation_unit(Path::new("doc.c"), "/// Doc.\nint f(void);\n", &args).unwrap();
        let Some(Item::Decl(Decl::Function(func))) = tu.items.first() else {
            panic!("expected a function");
        };
        assert_eq!(DocExtractor::new(false).raw_doc(&tu, func.loc.as_ref()), None);
    }
}
