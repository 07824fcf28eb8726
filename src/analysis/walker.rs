//! Declaration walker.
//!
//! Visits the lowered items of a translation unit once, in document order,
//! and records the functions, global variables and typedefs that pass the
//! locality filter. Call sites are attributed to the innermost accepted
//! function whose body is being visited.

use super::calls::CallCollector;
use super::docs::DocExtractor;
use super::locality::LocalityFilter;
use crate::model::{
    ArgRecord, Docs, FieldRecord, FunctionClass, FunctionRecord, SymbolModel, TypeKind, TypeRecord,
    VariableClass, VariableRecord,
};
use crate::parser::ast::{
    Decl, DeclContext, FunctionDecl, Item, ParamDecl, SourceLoc, StorageSpec, TypedefDecl, VarDecl,
};
use crate::parser::types::{RecordKind, Type};
use crate::parser::TranslationUnit;

#[derive(Debug, Clone, Copy, Default)]
pub struct WalkOptions {
    /// Attribute call sites to functions.
    pub calls: bool,
    /// Attach documentation comments.
    pub docs: bool,
    /// Keep function declarations without a body.
    pub header: bool,
}

/// Walk `tu`, adding what passes `filter` to `model`.
pub fn walk(tu: &TranslationUnit, filter: &LocalityFilter, options: &WalkOptions, model: SymbolModel) -> SymbolModel {
    let mut walker = Walker {
        tu,
        filter,
        header: options.header,
        calls: CallCollector::new(options.calls),
        docs: DocExtractor::new(options.docs),
        model,
    };
    walker.visit_items(&tu.items);
    walker.model
}

struct Walker<'a> {
    tu: &'a TranslationUnit,
    filter: &'a LocalityFilter,
    header: bool,
    calls: CallCollector,
    docs: DocExtractor,
    model: SymbolModel,
}

impl Walker<'_> {
    fn visit_items(&mut self, items: &[Item]) {
        for item in items {
            match item {
                Item::Call(call) => self.calls.record(call, &mut self.model),
                Item::Decl(Decl::Function(func)) => self.visit_function(func),
                Item::Decl(Decl::Variable(var)) => self.visit_variable(var),
                Item::Decl(Decl::TypeAlias(alias)) => self.visit_typedef(alias),
                Item::Decl(Decl::Other(inner)) => self.visit_items(inner),
            }
        }
    }

    fn is_local(&self, loc: Option<&SourceLoc>) -> bool {
        self.filter.included(loc.map(|loc| self.tu.file(loc.file)))
    }

    fn visit_function(&mut self, func: &FunctionDecl) {
        let accepted = self.is_local(func.loc.as_ref()) && (func.body.is_some() || self.header);
        if accepted {
            let record = self.function_record(func);
            self.model.upsert_function(&func.name, record);
        }

        let previous = self.calls.enter(accepted.then_some(func.name.as_str()));
        if let Some(body) = &func.body {
            self.visit_items(body);
        }
        self.calls.leave(previous);
    }

    fn function_record(&self, func: &FunctionDecl) -> FunctionRecord {
        let class = match func.storage {
            StorageSpec::None => FunctionClass::Normal,
            StorageSpec::Static => FunctionClass::Static,
            StorageSpec::Extern => FunctionClass::Extern,
        };
        FunctionRecord {
            class,
            returns: self.tu.types.spell(&func.return_type),
            args: func.params.iter().map(|p| self.arg_record(p)).collect(),
            calls: Vec::new(),
            docs: Docs {
                raw: self.docs.raw_doc(self.tu, func.loc.as_ref()),
            },
        }
    }

    fn arg_record(&self, param: &ParamDecl) -> ArgRecord {
        let types = &self.tu.types;
        let size = if types.is_incomplete(&param.ty) || types.is_dependent(&param.ty) {
            -1
        } else {
            types
                .size_of(&param.ty)
                .and_then(|size| i64::try_from(size).ok())
                .unwrap_or(-1)
        };
        ArgRecord {
            name: param.name.clone(),
            ty: types.spell(&param.ty),
            size,
        }
    }

    fn visit_variable(&mut self, var: &VarDecl) {
        if var.global_storage && self.is_local(var.loc.as_ref()) {
            let class = match (var.context, var.storage) {
                (DeclContext::TranslationUnit, StorageSpec::None) => Some(VariableClass::Global),
                (DeclContext::TranslationUnit, StorageSpec::Static) => Some(VariableClass::Static),
                (DeclContext::TranslationUnit, StorageSpec::Extern) => Some(VariableClass::Extern),
                _ => None,
            };
            self.model.upsert_variable(
                &var.name,
                VariableRecord {
                    class,
                    ty: self.tu.types.spell(&var.ty),
                },
            );
        }
        self.visit_items(&var.init);
    }

    fn visit_typedef(&mut self, alias: &TypedefDecl) {
        if !self.is_local(alias.loc.as_ref()) {
            return;
        }
        let types = &self.tu.types;
        let kind = match types.desugar(&alias.underlying) {
            Type::Record { id, .. } if types.record(*id).kind == RecordKind::Struct => {
                let fields = types.record(*id).fields.as_deref().unwrap_or_default();
                TypeKind::Struct(
                    fields
                        .iter()
                        .map(|field| FieldRecord {
                            name: field.name.clone(),
                            ty: types.spell(&field.ty),
                        })
                        .collect(),
                )
            }
            Type::Enum { id, .. } => TypeKind::Enum(
                types
                    .enum_def(*id)
                    .enumerators
                    .iter()
                    .flatten()
                    .cloned()
                    .collect(),
            ),
            _ => TypeKind::Alias(types.spell(&alias.underlying)),
        };
        let record = TypeRecord {
            kind,
            docs: self.docs.raw_doc(self.tu, alias.loc.as_ref()),
        };
        self.model.upsert_type(&alias.name, record);
    }
}
