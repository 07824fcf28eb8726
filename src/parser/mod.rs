//! Front-end: turn a C/C++ file into a [`TranslationUnit`].
//!
//! tree-sitter provides the syntax trees; this module adds what a compiler
//! front-end would otherwise supply: include expansion, conditional
//! compilation, a type table with layouts, and comment collection.

pub mod ast;
pub mod comments;
pub mod consteval;
pub mod lower;
pub mod preproc;
pub mod types;

use crate::options::{CompilerArgs, LanguageFlag};
use anyhow::Result;
use ast::{FileId, Item, SourceFile};
use comments::RawComment;
use std::io;
use std::path::{Component, Path, PathBuf};
use types::TypeTable;

/// Source language of a translation unit. Included files are read with the
/// language of the file that includes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    C,
    Cpp,
}

/// Extensions read as C++ when no `-x`/`-std=` flag says otherwise.
const CPP_EXTENSIONS: &[&str] = &["cc", "cpp", "cxx", "c++", "hh", "hpp", "hxx", "ipp", "tpp"];

impl Language {
    pub fn detect(path: &Path, flag: Option<LanguageFlag>) -> Language {
        match flag {
            Some(LanguageFlag::C) => Language::C,
            Some(LanguageFlag::Cpp) => Language::Cpp,
            None => match path.extension().and_then(|e| e.to_str()) {
                Some(ext) if CPP_EXTENSIONS.contains(&ext) => Language::Cpp,
                _ => Language::C,
            },
        }
    }

    fn grammar(self) -> tree_sitter::Language {
        match self {
            Language::C => tree_sitter_c::LANGUAGE.into(),
            Language::Cpp => tree_sitter_cpp::LANGUAGE.into(),
        }
    }
}

/// A fully parsed source file together with everything it includes.
#[derive(Debug)]
pub struct TranslationUnit {
    pub files: Vec<SourceFile>,
    /// Top-level items in document order.
    pub items: Vec<Item>,
    pub types: TypeTable,
    /// Documentation comments per file, indexed by [`FileId`].
    pub comments: Vec<Vec<RawComment>>,
}

impl TranslationUnit {
    pub fn file(&self, id: FileId) -> &SourceFile {
        &self.files[id.0]
    }

    pub fn comments(&self, id: FileId) -> &[RawComment] {
        self.comments.get(id.0).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Parse `source` (the contents of `path`) into a translation unit.
///
/// Fails only when the main file yields no syntax tree; problems in
/// included files are reported as warnings and the include is skipped.
pub fn parse_translation_unit(path: &Path, source: &str, args: &CompilerArgs) -> Result<TranslationUnit> {
    let language = Language::detect(path, args.language);
    let lowerer = lower::Lowerer::new(args, language)?;
    lowerer.run(canonical_path(path), source.to_string())
}

/// Read a source file. Bytes that are not UTF-8 (Latin-1 comments and
/// string literals) are replaced, so byte offsets into the returned text
/// stay consistent with the tree built from it.
pub fn read_source(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Absolute, symlink-resolved path. Falls back to lexical normalization for
/// paths that do not exist.
pub fn canonical_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_from_extension() {
        assert_eq!(Language::detect(Path::new("a.c"), None), Language::C);
        assert_eq!(Language::detect(Path::new("a.h"), None), Language::C);
        assert_eq!(Language::detect(Path::new("a.cpp"), None), Language::Cpp);
        assert_eq!(Language::detect(Path::new("a.hpp"), None), Language::Cpp);
    }

    #[test]
    fn language_flag_wins() {
        assert_eq!(Language::detect(Path::new("a.h"), Some(LanguageFlag::Cpp)), Language::Cpp);
        assert_eq!(Language::detect(Path::new("a.cc"), Some(LanguageFlag::C)), Language::C);
    }

    #[test]
    fn read_source_accepts_latin1() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("latin1.c");
        std::fs::write(&file, b"/* caf\xe9 */\nint x;\n").unwrap();
        let text = read_source(&file).unwrap();
        assert!(text.starts_with("/* caf\u{fffd} */"));
        assert!(text.ends_with("int x;\n"));
    }

    #[test]
    fn canonical_path_normalizes_missing_files() {
        let path = canonical_path(Path::new("/nonexistent/dir/../file.c"));
        assert_eq!(path, PathBuf::from("/nonexistent/file.c"));
    }

    #[test]
    fn canonical_path_resolves_existing_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("x.c");
        std::fs::write(&file, "").unwrap();
        let dotted = dir.path().join(".").join("x.c");
        assert_eq!(canonical_path(&dotted), std::fs::canonicalize(&file).unwrap());
    }
}
