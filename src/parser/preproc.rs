//! Preprocessor state: macro table, conditional evaluation and include
//! resolution.
//!
//! tree-sitter keeps directives in the syntax tree instead of expanding
//! them, so the lowering pass consults this table whenever it meets a
//! `#define`, a conditional block, or an `#include`.
//!
//! ## Include search order
//!
//! | Form | Directories |
//! |------|-------------|
//! | `#include "x.h"` | including file's directory, `-iquote`, `-I`, `-isystem` |
//! | `#include <x.h>` | `-I`, `-isystem` |
//!
//! Files found through `-isystem` are system headers.

use super::consteval::{self, Mode, Symbols};
use super::Language;
use crate::options::CompilerArgs;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Macro {
    Object(String),
    Function(FunctionMacro),
}

/// `#define NAME(params) body`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionMacro {
    /// Parameter names; a trailing `...` is named `__VA_ARGS__` unless the
    /// GNU `args...` form gives it a name.
    pub params: Vec<String>,
    /// The last parameter collects any remaining arguments.
    pub variadic: bool,
    pub body: String,
}

/// Identifiers that may precede `(` without naming a function.
const NOT_CALLABLE: &[&str] = &[
    "if", "while", "for", "switch", "return", "do", "sizeof", "_Alignof", "alignof", "__alignof__",
    "defined", "typeof", "__typeof__", "decltype", "__attribute__", "_Static_assert", "static_assert",
    "_Generic", "void", "char", "short", "int", "long", "float", "double", "signed", "unsigned",
    "const", "volatile", "_Bool", "bool",
];

/// Names a macro replacement calls: identifiers followed by `(`, excluding
/// the macro's own parameters, keywords and member calls.
pub fn invoked_names(body: &str, params: &[String]) -> Vec<String> {
    let bytes = body.as_bytes();
    let mut names = Vec::new();
    let mut member = false;
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() || c == b'\\' {
            i += 1;
            continue;
        }
        if body[i..].starts_with("/*") {
            i = body[i + 2..].find("*/").map_or(bytes.len(), |end| i + end + 4);
            continue;
        }
        if body[i..].starts_with("//") {
            break;
        }
        if c == b'"' || c == b'\'' {
            i = skip_literal(bytes, i);
            member = false;
            continue;
        }
        if c.is_ascii_alphanumeric() || c == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let name = &body[start..i];
            let called = body[i..].trim_start().starts_with('(');
            if called
                && !member
                && !c.is_ascii_digit()
                && !params.iter().any(|p| p == name)
                && !NOT_CALLABLE.contains(&name)
            {
                names.push(name.to_string());
            }
            member = false;
            continue;
        }
        member = c == b'.' || (c == b'>' && i > 0 && bytes[i - 1] == b'-');
        i += 1;
    }
    names
}

/// Index just past the string or character literal starting at `start`.
fn skip_literal(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() && bytes[i] != quote {
        if bytes[i] == b'\\' {
            i += 1;
        }
        i += 1;
    }
    i + 1
}

/// The operand of an `#include`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncludeSpec {
    Quoted(String),
    Angled(String),
}

impl IncludeSpec {
    /// Parse the path text of an include directive (`"x.h"` or `<x.h>`).
    pub fn parse(text: &str) -> Option<IncludeSpec> {
        let text = text.trim();
        if let Some(inner) = text.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
            return Some(IncludeSpec::Quoted(inner.to_string()));
        }
        if let Some(inner) = text.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
            return Some(IncludeSpec::Angled(inner.to_string()));
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInclude {
    pub path: PathBuf,
    pub is_system: bool,
}

pub struct Preprocessor {
    macros: HashMap<String, Macro>,
    quote_dirs: Vec<PathBuf>,
    include_dirs: Vec<PathBuf>,
    system_dirs: Vec<PathBuf>,
}

/// Macros a clang targeting x86_64 Linux defines before reading the source.
const PREDEFINED: &[(&str, &str)] = &[
    ("__STDC__", "1"),
    ("__STDC_HOSTED__", "1"),
    ("__x86_64__", "1"),
    ("__x86_64", "1"),
    ("__LP64__", "1"),
    ("_LP64", "1"),
    ("__linux__", "1"),
    ("__linux", "1"),
    ("__unix__", "1"),
    ("__unix", "1"),
    ("__GNUC__", "4"),
    ("__GNUC_MINOR__", "2"),
    ("__clang__", "1"),
    ("__CHAR_BIT__", "8"),
    ("__SIZEOF_INT__", "4"),
    ("__SIZEOF_LONG__", "8"),
    ("__SIZEOF_POINTER__", "8"),
    ("__INT_MAX__", "2147483647"),
];

impl Preprocessor {
    pub fn new(args: &CompilerArgs, language: Language) -> Self {
        let mut pp = Preprocessor {
            macros: HashMap::new(),
            quote_dirs: args.quote_dirs.clone(),
            include_dirs: args.include_dirs.clone(),
            system_dirs: args.system_dirs.clone(),
        };
        for (name, body) in PREDEFINED {
            pp.define(name, Macro::Object(body.to_string()));
        }
        match language {
            Language::C => pp.define("__STDC_VERSION__", Macro::Object("201710L".to_string())),
            Language::Cpp => pp.define("__cplusplus", Macro::Object("201703L".to_string())),
        }
        for (name, body) in &args.defines {
            pp.define(name, Macro::Object(body.clone()));
        }
        for name in &args.undefines {
            pp.undef(name);
        }
        pp
    }

    pub fn define(&mut self, name: &str, value: Macro) {
        self.macros.insert(name.to_string(), value);
    }

    pub fn undef(&mut self, name: &str) {
        self.macros.remove(name);
    }

    pub fn function_macro(&self, name: &str) -> Option<&FunctionMacro> {
        match self.macros.get(name)? {
            Macro::Function(def) => Some(def),
            Macro::Object(_) => None,
        }
    }

    /// Evaluate an `#if`/`#elif` condition. Conditions the evaluator cannot
    /// handle are false.
    pub fn condition(&self, text: &str) -> bool {
        consteval::evaluate(text, self, Mode::Directive).is_some_and(|v| v != 0)
    }

    /// Find the file an `#include` refers to.
    pub fn resolve_include(&self, spec: &IncludeSpec, current_dir: &Path) -> Option<ResolvedInclude> {
        let (name, local): (&str, Vec<&Path>) = match spec {
            IncludeSpec::Quoted(name) => (
                name.as_str(),
                std::iter::once(current_dir)
                    .chain(self.quote_dirs.iter().map(PathBuf::as_path))
                    .chain(self.include_dirs.iter().map(PathBuf::as_path))
                    .collect(),
            ),
            IncludeSpec::Angled(name) => (name.as_str(), self.include_dirs.iter().map(PathBuf::as_path).collect()),
        };

        let found = |dir: &Path| {
            let candidate = dir.join(name);
            candidate.is_file().then_some(candidate)
        };

        if let Some(path) = local.into_iter().find_map(&found) {
            return Some(ResolvedInclude {
                path,
                is_system: false,
            });
        }
        self.system_dirs
            .iter()
            .find_map(|dir| found(dir))
            .map(|path| ResolvedInclude {
                path,
                is_system: true,
            })
    }
}

impl Symbols for Preprocessor {
    fn macro_body(&self, name: &str) -> Option<&str> {
        match self.macros.get(name)? {
            Macro::Object(body) => Some(body),
            Macro::Function(_) => None,
        }
    }

    fn function_macro(&self, name: &str) -> Option<&FunctionMacro> {
        Preprocessor::function_macro(self, name)
    }

    fn is_defined(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }
}
