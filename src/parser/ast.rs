//! Declaration tree handed from the front-end to the walker.
//!
//! Only what symbol extraction needs survives lowering: declarations of the
//! three interesting kinds, scopes that contain more declarations, and call
//! sites inside function bodies and initializers. Everything is kept in
//! document order, with included files spliced in where they were included.

use super::types::QualType;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(pub usize);

/// A file that contributed declarations to the translation unit.
#[derive(Debug)]
pub struct SourceFile {
    /// Canonical absolute path.
    pub path: PathBuf,
    /// Reached through a system include directory.
    pub is_system: bool,
    pub text: String,
}

/// Where a declaration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLoc {
    pub file: FileId,
    /// 1-based line and column of the declared name.
    pub line: usize,
    pub column: usize,
    /// Byte offset where the whole declaration begins (specifiers,
    /// `template <...>` header). Comments are searched for before it.
    pub begin: usize,
}

/// Declared storage-class specifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StorageSpec {
    #[default]
    None,
    Static,
    Extern,
}

/// Semantic context a variable is declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclContext {
    TranslationUnit,
    Namespace,
    Record,
    Function,
}

#[derive(Debug, Clone)]
pub enum Item {
    Decl(Decl),
    Call(CallSite),
}

#[derive(Debug, Clone)]
pub enum Decl {
    Function(FunctionDecl),
    Variable(VarDecl),
    TypeAlias(TypedefDecl),
    /// Namespaces, linkage blocks, record bodies: only their members matter.
    Other(Vec<Item>),
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub loc: Option<SourceLoc>,
    pub storage: StorageSpec,
    pub return_type: QualType,
    pub params: Vec<ParamDecl>,
    /// `None` for declarations without a body.
    pub body: Option<Vec<Item>>,
}

#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub name: String,
    pub ty: QualType,
}

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub name: String,
    pub loc: Option<SourceLoc>,
    pub storage: StorageSpec,
    pub ty: QualType,
    /// Static or thread storage duration: namespace-scope variables, static
    /// and extern locals, static data members.
    pub global_storage: bool,
    pub context: DeclContext,
    /// Declarations and calls found in the initializer.
    pub init: Vec<Item>,
}

#[derive(Debug, Clone)]
pub struct TypedefDecl {
    pub name: String,
    pub loc: Option<SourceLoc>,
    pub underlying: QualType,
}

/// A call expression. `callee` is `None` for calls that do not name a
/// function directly (function pointers, computed callees).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub callee: Option<String>,
}

impl CallSite {
    pub fn direct(name: impl Into<String>) -> Self {
        Self {
            callee: Some(name.into()),
        }
    }

    pub fn indirect() -> Self {
        Self { callee: None }
    }
}
