//! Compiler-argument handling.
//!
//! The options file is a whitespace-delimited list of compiler arguments,
//! typically lifted from a build system. Only the arguments that change how
//! the front-end reads the source matter here: include directories, macro
//! definitions, language selection and comment parsing.

use anyhow::{Context, Result};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Warnings-as-errors would turn harmless front-end diagnostics fatal.
const DROPPED_FLAG: &str = "-Werror";

static RE_STD_CXX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-std=(?:c|gnu)\+\+").unwrap());

static RE_STD_C: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-std=(?:c|gnu|iso9899:)[0-9x]").unwrap());

/// Source language requested by `-x` or `-std=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageFlag {
    C,
    Cpp,
}

/// Front-end settings derived from the compiler arguments.
#[derive(Debug, Default, Clone)]
pub struct CompilerArgs {
    /// `-I`
    pub include_dirs: Vec<PathBuf>,
    /// `-iquote`
    pub quote_dirs: Vec<PathBuf>,
    /// `-isystem`
    pub system_dirs: Vec<PathBuf>,
    /// `-D NAME[=VALUE]`, in order.
    pub defines: Vec<(String, String)>,
    /// `-U NAME`
    pub undefines: Vec<String>,
    pub language: Option<LanguageFlag>,
    /// `-fparse-all-comments`
    pub parse_all_comments: bool,
}

/// Read and tokenize an options file.
pub fn load(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("couldn't open options file {}", path.display()))?;
    Ok(tokenize(&content))
}

/// Split on whitespace, unescape `\"` and drop `-Werror`.
pub fn tokenize(content: &str) -> Vec<String> {
    content
        .split_whitespace()
        .map(|token| token.replace("\\\"", "\""))
        .filter(|token| !token.is_empty() && token != DROPPED_FLAG)
        .collect()
}

impl CompilerArgs {
    pub fn from_tokens(tokens: &[String]) -> Self {
        let mut args = CompilerArgs::default();
        let mut iter = tokens.iter();

        while let Some(token) = iter.next() {
            let token = token.as_str();
            if let Some(value) = joined_or_next(token, "-isystem", &mut iter) {
                args.system_dirs.push(PathBuf::from(value));
            } else if let Some(value) = joined_or_next(token, "-iquote", &mut iter) {
                args.quote_dirs.push(PathBuf::from(value));
            } else if let Some(value) = joined_or_next(token, "-I", &mut iter) {
                args.include_dirs.push(PathBuf::from(value));
            } else if let Some(value) = joined_or_next(token, "-D", &mut iter) {
                let (name, body) = match value.split_once('=') {
                    Some((name, body)) => (name.to_string(), body.to_string()),
                    None => (value.to_string(), "1".to_string()),
                };
                args.defines.push((name, body));
            } else if let Some(value) = joined_or_next(token, "-U", &mut iter) {
                args.undefines.push(value.to_string());
            } else if let Some(value) = joined_or_next(token, "-x", &mut iter) {
                args.language = match value {
                    "c" | "c-header" => Some(LanguageFlag::C),
                    "c++" | "c++-header" => Some(LanguageFlag::Cpp),
                    _ => args.language,
                };
            } else if RE_STD_CXX.is_match(token) {
                args.language = Some(LanguageFlag::Cpp);
            } else if RE_STD_C.is_match(token) {
                args.language = Some(LanguageFlag::C);
            } else if token == "-fparse-all-comments" {
                args.parse_all_comments = true;
            }
        }

        args
    }
}

/// Value of a flag written either joined (`-Idir`) or separate (`-I dir`).
fn joined_or_next<'a>(
    token: &'a str,
    flag: &str,
    rest: &mut std::slice::Iter<'a, String>,
) -> Option<&'a str> {
    let value = token.strip_prefix(flag)?;
    if value.is_empty() {
        rest.next().map(String::as_str)
    } else {
        Some(value)
    }
}
