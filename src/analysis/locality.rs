//! Decides whether a declaration belongs to the target module.

use crate::parser::ast::SourceFile;
use crate::parser::canonical_path;
use std::path::{Path, PathBuf};

pub struct LocalityFilter {
    target: PathBuf,
    all_files: bool,
}

impl LocalityFilter {
    pub fn new(target: &Path, all_files: bool) -> Self {
        LocalityFilter {
            target: canonical_path(target),
            all_files,
        }
    }

    /// `file` is `None` for declarations without a valid location. System
    /// headers never count; otherwise the file must be the target unless
    /// every file is in scope.
    pub fn included(&self, file: Option<&SourceFile>) -> bool {
        match file {
            None => false,
            Some(file) if file.is_system => false,
            Some(file) => self.all_files || file.path == self.target,
        }
    }
}
