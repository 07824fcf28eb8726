//! Lowering from tree-sitter syntax trees to the declaration tree.
//!
//! One pass per file, in document order. Directives are applied as they are
//! met: `#define`/`#undef` update the macro table, conditional blocks
//! contribute only their active branch, and `#include` lowers the included
//! file in place. Declarators are applied inside-out to build full types,
//! and every record/enum/typedef lands in the [`TypeTable`] so later
//! declarations can refer to it.

use super::ast::{
    CallSite, Decl, DeclContext, FileId, FunctionDecl, Item, ParamDecl, SourceFile, SourceLoc,
    StorageSpec, TypedefDecl, VarDecl,
};
use super::comments::{self, RawComment};
use super::consteval::{self, Mode, Symbols};
use super::preproc::{self, FunctionMacro, IncludeSpec, Macro, Preprocessor};
use super::types::{
    Builtin, EnumDef, EnumId, Field, FunctionType, Param, QualType, Qualifiers, RecordDef, RecordId,
    RecordKind, Type, TypeTable, TypedefDef, TypedefId,
};
use super::{canonical_path, read_source, Language, TranslationUnit};
use crate::options::CompilerArgs;
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tree_sitter::{Node, Parser};

/// Maximum include nesting.
const MAX_INCLUDE_DEPTH: usize = 64;

/// Maximum nesting of macros followed when naming a callee.
const MAX_MACRO_DEPTH: usize = 32;

/// A tag name's binding: `struct`/`union`/`class` or `enum`.
#[derive(Debug, Clone, Copy)]
enum Tag {
    Record(RecordId),
    Enum(EnumId),
}

/// How a call expression names its target.
#[derive(Debug, PartialEq, Eq)]
enum Callee {
    Direct(String),
    Indirect,
    /// A function-like macro invocation: the calls its replacement makes.
    Expanded(Vec<CallSite>),
    /// Functional casts.
    NotACall,
}

/// Storage and type information shared by all declarators of a declaration.
struct Specifiers {
    storage: StorageSpec,
    thread_local: bool,
    base: QualType,
}

/// The file currently being lowered.
struct FileCtx<'s> {
    id: FileId,
    source: &'s str,
    dir: PathBuf,
    display: String,
}

impl<'s> FileCtx<'s> {
    fn text(&self, node: Node) -> &'s str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }
}

pub struct Lowerer {
    language: Language,
    parse_all_comments: bool,
    parser: Parser,
    pp: Preprocessor,
    files: Vec<SourceFile>,
    comments: Vec<Vec<RawComment>>,
    types: TypeTable,
    entered: HashSet<PathBuf>,
    depth: usize,
    typedef_names: HashMap<String, TypedefId>,
    tags: HashMap<String, Tag>,
    enumerators: HashMap<String, i64>,
    /// Variable names visible at the current point; the first scope holds
    /// file-scope variables.
    scopes: Vec<HashSet<String>>,
    /// Template type parameters of enclosing `template <...>` headers.
    template_params: Vec<Vec<String>>,
}

impl Lowerer {
    pub fn new(args: &CompilerArgs, language: Language) -> Result<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&language.grammar())
            .context("failed to load the tree-sitter grammar")?;
        Ok(Lowerer {
            language,
            parse_all_comments: args.parse_all_comments,
            parser,
            pp: Preprocessor::new(args, language),
            files: Vec::new(),
            comments: Vec::new(),
            types: TypeTable::default(),
            entered: HashSet::new(),
            depth: 0,
            typedef_names: HashMap::new(),
            tags: HashMap::new(),
            enumerators: HashMap::new(),
            scopes: vec![HashSet::new()],
            template_params: Vec::new(),
        })
    }

    /// Lower the main file and everything it includes.
    pub fn run(mut self, path: PathBuf, source: String) -> Result<TranslationUnit> {
        self.entered.insert(path.clone());
        let items = self.lower_file(path, source, false)?;
        Ok(TranslationUnit {
            files: self.files,
            items,
            types: self.types,
            comments: self.comments,
        })
    }

    fn lower_file(&mut self, path: PathBuf, source: String, is_system: bool) -> Result<Vec<Item>> {
        let tree = self
            .parser
            .parse(&source, None)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        let root = tree.root_node();
        if root.has_error() && !is_system {
            eprintln!(
                "warning: {}: syntax errors, some declarations may be missing",
                path.display()
            );
        }

        let id = FileId(self.files.len());
        self.comments
            .push(comments::collect(root, &source, self.parse_all_comments));
        let file = FileCtx {
            id,
            source: &source,
            dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            display: path.display().to_string(),
        };
        self.files.push(SourceFile {
            path: path.clone(),
            is_system,
            text: source.clone(),
        });

        let mut items = Vec::new();
        self.lower_children(root, &file, DeclContext::TranslationUnit, &mut items);
        Ok(items)
    }

    // -- Top-level items ---------------------------------------------------------

    fn lower_children(&mut self, parent: Node, f: &FileCtx, ctx: DeclContext, out: &mut Vec<Item>) {
        for child in named_children(parent) {
            self.lower_item(child, child.start_byte(), f, ctx, out);
        }
    }

    /// Lower one declaration-level node. `begin` is where the declaration
    /// starts for comment attachment (the `template` keyword for templates).
    fn lower_item(&mut self, node: Node, begin: usize, f: &FileCtx, ctx: DeclContext, out: &mut Vec<Item>) {
        match node.kind() {
            "function_definition" => self.lower_function(node, begin, f, out),
            "declaration" | "field_declaration" => self.lower_declaration(node, begin, f, ctx, out),
            "type_definition" => self.lower_typedef(node, begin, f, out),
            "struct_specifier" | "union_specifier" | "class_specifier" | "enum_specifier" => {
                self.lower_type_specifier(node, f, out);
            }
            "template_declaration" => self.lower_template(node, f, ctx, out),
            "namespace_definition" => {
                if let Some(body) = node.child_by_field_name("body") {
                    let mut inner = Vec::new();
                    self.lower_children(body, f, DeclContext::Namespace, &mut inner);
                    out.push(Item::Decl(Decl::Other(inner)));
                }
            }
            "linkage_specification" => {
                if let Some(body) = node.child_by_field_name("body") {
                    if body.kind() == "declaration_list" {
                        let mut inner = Vec::new();
                        self.lower_children(body, f, ctx, &mut inner);
                        out.push(Item::Decl(Decl::Other(inner)));
                    } else {
                        self.lower_item(body, body.start_byte(), f, ctx, out);
                    }
                }
            }
            "declaration_list" => self.lower_children(node, f, ctx, out),
            "preproc_if" | "preproc_ifdef" => {
                for child in self.active_branch(node, f) {
                    self.lower_item(child, child.start_byte(), f, ctx, out);
                }
            }
            "preproc_include" | "preproc_def" | "preproc_function_def" | "preproc_call" => {
                self.lower_directive(node, f, out)
            }
            _ => {}
        }
    }

    fn lower_template(&mut self, node: Node, f: &FileCtx, ctx: DeclContext, out: &mut Vec<Item>) {
        let params = node.child_by_field_name("parameters");
        let names = params.map(|p| template_param_names(p, f)).unwrap_or_default();
        let params_id = params.map(|p| p.id());

        self.template_params.push(names);
        for child in named_children(node) {
            if Some(child.id()) != params_id {
                self.lower_item(child, node.start_byte(), f, ctx, out);
            }
        }
        self.template_params.pop();
    }

    // -- Directives --------------------------------------------------------------

    fn lower_directive(&mut self, node: Node, f: &FileCtx, out: &mut Vec<Item>) {
        match node.kind() {
            "preproc_include" => self.lower_include(node, f, out),
            "preproc_def" => {
                if let Some(name) = node.child_by_field_name("name") {
                    let body = node
                        .child_by_field_name("value")
                        .map(|v| f.text(v).trim().to_string())
                        .unwrap_or_default();
                    self.pp.define(f.text(name), Macro::Object(body));
                }
            }
            "preproc_function_def" => {
                if let Some(name) = node.child_by_field_name("name") {
                    let mut def = FunctionMacro {
                        body: node
                            .child_by_field_name("value")
                            .map(|v| f.text(v).trim().to_string())
                            .unwrap_or_default(),
                        ..FunctionMacro::default()
                    };
                    if let Some(params) = node.child_by_field_name("parameters") {
                        let mut named_variadic = false;
                        for param in all_children(params) {
                            match param.kind() {
                                "identifier" => {
                                    def.params.push(f.text(param).to_string());
                                    named_variadic = param
                                        .next_sibling()
                                        .is_some_and(|next| next.kind() == "...");
                                }
                                "..." => {
                                    def.variadic = true;
                                    if !named_variadic {
                                        def.params.push("__VA_ARGS__".to_string());
                                    }
                                }
                                _ => {}
                            }
                        }
                    }
                    self.pp.define(f.text(name), Macro::Function(def));
                }
            }
            "preproc_call" => {
                let directive = node.child_by_field_name("directive").map(|d| f.text(d));
                if directive == Some("#undef") {
                    if let Some(arg) = node.child_by_field_name("argument") {
                        self.pp.undef(f.text(arg).trim());
                    }
                }
            }
            _ => {}
        }
    }

    fn lower_include(&mut self, node: Node, f: &FileCtx, out: &mut Vec<Item>) {
        let Some(spec) = node
            .child_by_field_name("path")
            .and_then(|p| IncludeSpec::parse(f.text(p)))
        else {
            return;
        };

        let Some(resolved) = self.pp.resolve_include(&spec, &f.dir) else {
            if let IncludeSpec::Quoted(name) = &spec {
                eprintln!(
                    "warning: {}:{}: include not found: {}",
                    f.display,
                    node.start_position().row + 1,
                    name
                );
            }
            return;
        };

        let canonical = canonical_path(&resolved.path);
        if self.depth >= MAX_INCLUDE_DEPTH || !self.entered.insert(canonical.clone()) {
            return;
        }
        let source = match read_source(&resolved.path) {
            Ok(source) => source,
            Err(e) => {
                eprintln!("warning: failed to read {}: {}", resolved.path.display(), e);
                return;
            }
        };

        self.depth += 1;
        let result = self.lower_file(canonical, source, resolved.is_system);
        self.depth -= 1;
        match result {
            Ok(items) => out.extend(items),
            Err(e) => eprintln!("warning: {:#}", e),
        }
    }

    /// The items of the branch of a conditional block that is compiled in.
    fn active_branch<'t>(&self, node: Node<'t>, f: &FileCtx) -> Vec<Node<'t>> {
        let mut current = Some(node);
        while let Some(branch) = current {
            let taken = match branch.kind() {
                "preproc_if" | "preproc_elif" => branch
                    .child_by_field_name("condition")
                    .is_some_and(|c| self.pp.condition(f.text(c))),
                "preproc_ifdef" | "preproc_elifdef" => {
                    let defined = branch
                        .child_by_field_name("name")
                        .is_some_and(|n| self.pp.is_defined(f.text(n)));
                    let negated = branch.child(0).is_some_and(|c| c.kind().ends_with("ndef"));
                    defined != negated
                }
                "preproc_else" => true,
                _ => false,
            };
            if taken {
                return branch_items(branch);
            }
            current = branch.child_by_field_name("alternative");
        }
        Vec::new()
    }

    // -- Declarations ------------------------------------------------------------

    fn lower_specifiers(&mut self, node: Node, f: &FileCtx, out: &mut Vec<Item>) -> Specifiers {
        let mut storage = StorageSpec::None;
        let mut thread_local = false;
        let mut quals = Qualifiers::default();

        for child in named_children(node) {
            match child.kind() {
                "storage_class_specifier" => match f.text(child) {
                    "static" => storage = StorageSpec::Static,
                    "extern" => storage = StorageSpec::Extern,
                    "thread_local" | "_Thread_local" | "__thread" => thread_local = true,
                    _ => {}
                },
                "type_qualifier" => {
                    quals.add_keyword(f.text(child));
                }
                _ => {}
            }
        }

        let base = match node.child_by_field_name("type") {
            Some(ty) => self.lower_type_specifier(ty, f, out),
            // Constructors and destructors in C++, implicit int in C
            None => match self.language {
                Language::Cpp => QualType::void().ty,
                Language::C => Builtin::lookup("int").map(Type::Builtin).unwrap_or_else(|| self.named("int")),
            },
        };

        Specifiers {
            storage,
            thread_local,
            base: QualType::with_quals(base, quals),
        }
    }

    fn lower_function(&mut self, node: Node, begin: usize, f: &FileCtx, out: &mut Vec<Item>) {
        let specs = self.lower_specifiers(node, f, out);
        let Some(declarator) = node.child_by_field_name("declarator") else {
            return;
        };
        let (name_node, ty) = self.apply_declarator(declarator, specs.base, f);
        let Type::Function(func) = ty.ty else {
            return;
        };
        let name = unqualified_name(name_node, f);
        if name.is_empty() {
            return;
        }
        let loc = self.loc(name_node.unwrap_or(declarator), begin, f);

        let mut body = None;
        if let Some(block) = node.child_by_field_name("body") {
            let params: HashSet<String> = func
                .params
                .iter()
                .map(|p| p.name.clone())
                .filter(|n| !n.is_empty())
                .collect();
            self.scopes.push(params);
            let mut items = Vec::new();
            for child in named_children(node) {
                if child.kind() == "field_initializer_list" {
                    self.lower_statement(child, f, &mut items);
                }
            }
            self.lower_statement(block, f, &mut items);
            self.scopes.pop();
            body = Some(items);
        }

        out.push(function_item(name, Some(loc), specs.storage, *func, body));
    }

    fn lower_declaration(&mut self, node: Node, begin: usize, f: &FileCtx, ctx: DeclContext, out: &mut Vec<Item>) {
        let specs = self.lower_specifiers(node, f, out);

        for decl in field_children(node, "declarator") {
            let (target, value) = if decl.kind() == "init_declarator" {
                (decl.child_by_field_name("declarator"), decl.child_by_field_name("value"))
            } else {
                (Some(decl), None)
            };
            let Some(target) = target else { continue };
            let (name_node, ty) = self.apply_declarator(target, specs.base.clone(), f);
            let name = unqualified_name(name_node, f);
            if name.is_empty() {
                continue;
            }
            let loc = Some(self.loc(name_node.unwrap_or(target), begin, f));

            if let Type::Function(func) = ty.ty {
                out.push(function_item(name, loc, specs.storage, *func, None));
                continue;
            }

            // `int Widget::count = 0;` defines a static data member
            let qualified = name_node.is_some_and(|n| n.kind() == "qualified_identifier");
            let context = if qualified { DeclContext::Record } else { ctx };
            let global_storage = match context {
                DeclContext::TranslationUnit | DeclContext::Namespace => true,
                DeclContext::Function => specs.storage != StorageSpec::None || specs.thread_local,
                DeclContext::Record => specs.storage == StorageSpec::Static || qualified,
            };
            if context != DeclContext::Record {
                self.declare_variable(&name);
            }

            let mut init = Vec::new();
            if let Some(value) = value {
                self.lower_statement(value, f, &mut init);
            }
            out.push(Item::Decl(Decl::Variable(VarDecl {
                name,
                loc,
                storage: specs.storage,
                ty,
                global_storage,
                context,
                init,
            })));
        }
    }

    fn lower_typedef(&mut self, node: Node, begin: usize, f: &FileCtx, out: &mut Vec<Item>) {
        let specs = self.lower_specifiers(node, f, out);

        for decl in field_children(node, "declarator") {
            let (name_node, ty) = self.apply_declarator(decl, specs.base.clone(), f);
            let name = unqualified_name(name_node, f);
            if name.is_empty() {
                continue;
            }
            if ty == specs.base {
                self.name_anonymous_tag(&ty, &name);
            }
            let id = self.types.add_typedef(TypedefDef {
                name: name.clone(),
                underlying: ty.clone(),
            });
            self.typedef_names.insert(name.clone(), id);
            let loc = Some(self.loc(name_node.unwrap_or(decl), begin, f));
            out.push(Item::Decl(Decl::TypeAlias(TypedefDecl {
                name,
                loc,
                underlying: ty,
            })));
        }
    }

    /// `typedef struct { ... } Name;` gives the anonymous record its name.
    fn name_anonymous_tag(&mut self, ty: &QualType, name: &str) {
        match ty.ty {
            Type::Record { id, .. } => {
                let def = self.types.record_mut(id);
                if def.anonymous && !def.named_by_typedef {
                    def.name = name.to_string();
                    def.named_by_typedef = true;
                }
            }
            Type::Enum { id, .. } => {
                let def = self.types.enum_mut(id);
                if def.anonymous && !def.named_by_typedef {
                    def.name = name.to_string();
                    def.named_by_typedef = true;
                }
            }
            _ => {}
        }
    }

    fn declare_variable(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }

    fn is_variable(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|scope| scope.contains(name))
    }

    fn loc(&self, name: Node, begin: usize, f: &FileCtx) -> SourceLoc {
        let pos = name.start_position();
        SourceLoc {
            file: f.id,
            line: pos.row + 1,
            column: pos.column + 1,
            begin,
        }
    }

    // -- Types -------------------------------------------------------------------

    fn lower_type_specifier(&mut self, node: Node, f: &FileCtx, out: &mut Vec<Item>) -> Type {
        match node.kind() {
            "primitive_type" => {
                let text = f.text(node);
                Builtin::lookup(text)
                    .map(Type::Builtin)
                    .unwrap_or_else(|| self.named(text))
            }
            "sized_type_specifier" => {
                let modifiers: Vec<&str> = all_children(node)
                    .into_iter()
                    .map(|c| c.kind())
                    .filter(|k| matches!(*k, "signed" | "unsigned" | "long" | "short"))
                    .collect();
                let base = node.child_by_field_name("type").map(|t| f.text(t));
                Builtin::from_modifiers(&modifiers, base)
                    .map(Type::Builtin)
                    .unwrap_or_else(|| self.named(f.text(node)))
            }
            "type_identifier" => self.resolve_type_name(f.text(node)),
            "struct_specifier" | "union_specifier" | "class_specifier" => self.lower_record(node, f, out),
            "enum_specifier" => self.lower_enum(node, f, out),
            "placeholder_type_specifier" | "auto" => self.named("auto"),
            _ => {
                let spelling = normalize_spelling(f.text(node));
                self.named(&spelling)
            }
        }
    }

    fn named(&self, spelling: &str) -> Type {
        Type::Named {
            spelling: spelling.to_string(),
            dependent: self.mentions_template_param(spelling),
        }
    }

    fn resolve_type_name(&self, name: &str) -> Type {
        if self.is_template_param(name) {
            return Type::Named {
                spelling: name.to_string(),
                dependent: true,
            };
        }
        if let Some(id) = self.typedef_names.get(name) {
            return Type::Typedef(*id);
        }
        if self.language == Language::Cpp {
            match self.tags.get(name) {
                Some(Tag::Record(id)) => {
                    return Type::Record {
                        id: *id,
                        elaborated: false,
                    }
                }
                Some(Tag::Enum(id)) => {
                    return Type::Enum {
                        id: *id,
                        elaborated: false,
                    }
                }
                None => {}
            }
        }
        Builtin::lookup(name)
            .map(Type::Builtin)
            .unwrap_or_else(|| self.named(name))
    }

    fn is_template_param(&self, name: &str) -> bool {
        self.template_params
            .iter()
            .any(|params| params.iter().any(|p| p == name))
    }

    fn mentions_template_param(&self, spelling: &str) -> bool {
        !self.template_params.is_empty()
            && spelling
                .split(|c: char| !(c.is_alphanumeric() || c == '_'))
                .any(|word| self.is_template_param(word))
    }

    fn is_type_name(&self, name: &str) -> bool {
        self.typedef_names.contains_key(name)
            || self.is_template_param(name)
            || (self.language == Language::Cpp && self.tags.contains_key(name))
    }

    fn anonymous_label(&self, keyword: &str, node: Node, f: &FileCtx) -> String {
        let pos = node.start_position();
        format!(
            "(unnamed {} at {}:{}:{})",
            keyword,
            f.display,
            pos.row + 1,
            pos.column + 1
        )
    }

    fn lower_record(&mut self, node: Node, f: &FileCtx, out: &mut Vec<Item>) -> Type {
        let kind = match node.kind() {
            "union_specifier" => RecordKind::Union,
            "class_specifier" => RecordKind::Class,
            _ => RecordKind::Struct,
        };
        let name = node.child_by_field_name("name").map(|n| normalize_spelling(f.text(n)));
        let body = node.child_by_field_name("body");

        let id = match (name, body) {
            (Some(name), None) => match self.tags.get(&name) {
                Some(Tag::Record(id)) => *id,
                _ => self.bind_record(name, kind),
            },
            (Some(name), Some(_)) => match self.tags.get(&name) {
                Some(Tag::Record(id)) if self.types.record(*id).fields.is_none() => *id,
                _ => self.bind_record(name, kind),
            },
            (None, _) => {
                let label = self.anonymous_label(kind.keyword(), node, f);
                self.types.add_record(RecordDef {
                    kind,
                    name: label,
                    anonymous: true,
                    named_by_typedef: false,
                    fields: None,
                    cplusplus: self.language == Language::Cpp,
                })
            }
        };

        if let Some(body) = body {
            let mut members = Vec::new();
            let mut fields = Vec::new();
            for child in named_children(body) {
                self.lower_member(child, f, &mut fields, &mut members);
            }
            self.types.record_mut(id).fields = Some(fields);
            if !members.is_empty() {
                out.push(Item::Decl(Decl::Other(members)));
            }
        }

        Type::Record {
            id,
            elaborated: true,
        }
    }

    fn bind_record(&mut self, name: String, kind: RecordKind) -> RecordId {
        let id = self.types.add_record(RecordDef {
            kind,
            name: name.clone(),
            anonymous: false,
            named_by_typedef: false,
            fields: None,
            cplusplus: self.language == Language::Cpp,
        });
        self.tags.insert(name, Tag::Record(id));
        id
    }

    /// One item of a record body: data members become fields, methods and
    /// static data members become declarations.
    fn lower_member(&mut self, node: Node, f: &FileCtx, fields: &mut Vec<Field>, members: &mut Vec<Item>) {
        match node.kind() {
            "field_declaration" => self.lower_field_declaration(node, f, fields, members),
            "function_definition" | "declaration" | "template_declaration" | "type_definition" => {
                self.lower_item(node, node.start_byte(), f, DeclContext::Record, members)
            }
            "preproc_if" | "preproc_ifdef" => {
                for child in self.active_branch(node, f) {
                    self.lower_member(child, f, fields, members);
                }
            }
            "preproc_def" | "preproc_function_def" | "preproc_call" | "preproc_include" => {
                self.lower_directive(node, f, members)
            }
            _ => {}
        }
    }

    fn lower_field_declaration(&mut self, node: Node, f: &FileCtx, fields: &mut Vec<Field>, members: &mut Vec<Item>) {
        let specs = self.lower_specifiers(node, f, members);

        // Pair each declarator with the bit-field clause that follows it
        let mut declarators: Vec<(Option<Node>, Option<u64>)> = Vec::new();
        let mut cursor = node.walk();
        if cursor.goto_first_child() {
            loop {
                let child = cursor.node();
                if cursor.field_name() == Some("declarator") {
                    declarators.push((Some(child), None));
                } else if child.kind() == "bitfield_clause" {
                    let width = named_children(child)
                        .first()
                        .and_then(|e| self.eval_constant(f.text(*e)))
                        .and_then(|w| u64::try_from(w).ok());
                    match declarators.last_mut() {
                        Some(last) if last.1.is_none() => last.1 = width,
                        _ => declarators.push((None, width)),
                    }
                }
                if !cursor.goto_next_sibling() {
                    break;
                }
            }
        }

        if declarators.is_empty() {
            // Anonymous struct/union member
            if matches!(specs.base.ty, Type::Record { .. }) {
                fields.push(Field {
                    name: String::new(),
                    ty: specs.base,
                    bit_width: None,
                });
            }
            return;
        }

        for (decl, bit_width) in declarators {
            let Some(decl) = decl else {
                // Unnamed bit-field used as padding
                fields.push(Field {
                    name: String::new(),
                    ty: specs.base.clone(),
                    bit_width,
                });
                continue;
            };
            let (name_node, ty) = self.apply_declarator(decl, specs.base.clone(), f);
            let name = unqualified_name(name_node, f);
            let loc = Some(self.loc(name_node.unwrap_or(decl), node.start_byte(), f));

            if let Type::Function(func) = ty.ty {
                members.push(function_item(name, loc, specs.storage, *func, None));
            } else if specs.storage == StorageSpec::Static {
                members.push(Item::Decl(Decl::Variable(VarDecl {
                    name,
                    loc,
                    storage: specs.storage,
                    ty,
                    global_storage: true,
                    context: DeclContext::Record,
                    init: Vec::new(),
                })));
            } else {
                fields.push(Field { name, ty, bit_width });
            }
        }
    }

    fn lower_enum(&mut self, node: Node, f: &FileCtx, out: &mut Vec<Item>) -> Type {
        let name = node.child_by_field_name("name").map(|n| normalize_spelling(f.text(n)));
        let body = node.child_by_field_name("body");
        let underlying = node
            .child_by_field_name("underlying_type")
            .or_else(|| node.child_by_field_name("base"))
            .map(|t| QualType::new(self.lower_type_specifier(t, f, out)));

        let id = match name {
            Some(name) => match self.tags.get(&name) {
                Some(Tag::Enum(id)) if body.is_none() || self.types.enum_def(*id).enumerators.is_none() => *id,
                _ => {
                    let id = self.types.add_enum(EnumDef {
                        name: name.clone(),
                        anonymous: false,
                        named_by_typedef: false,
                        underlying: None,
                        enumerators: None,
                    });
                    self.tags.insert(name, Tag::Enum(id));
                    id
                }
            },
            None => {
                let label = self.anonymous_label("enum", node, f);
                self.types.add_enum(EnumDef {
                    name: label,
                    anonymous: true,
                    named_by_typedef: false,
                    underlying: None,
                    enumerators: None,
                })
            }
        };

        if underlying.is_some() {
            self.types.enum_mut(id).underlying = underlying;
        }
        if let Some(body) = body {
            let mut values = Vec::new();
            let mut next = Some(0i64);
            for child in named_children(body) {
                self.lower_enumerator(child, f, &mut values, &mut next);
            }
            self.types.enum_mut(id).enumerators = Some(values);
        }

        Type::Enum {
            id,
            elaborated: true,
        }
    }

    /// `next` is the implicit value of the following enumerator, `None`
    /// once an earlier value could not be evaluated.
    fn lower_enumerator(&mut self, node: Node, f: &FileCtx, values: &mut Vec<(String, i64)>, next: &mut Option<i64>) {
        match node.kind() {
            "enumerator" => {
                let Some(name) = node.child_by_field_name("name").map(|n| f.text(n).to_string()) else {
                    return;
                };
                let value = match node.child_by_field_name("value") {
                    Some(expr) => self.eval_constant(f.text(expr)),
                    None => *next,
                };
                match value {
                    Some(value) => {
                        self.enumerators.insert(name.clone(), value);
                        values.push((name, value));
                    }
                    None => eprintln!(
                        "warning: {}:{}: cannot evaluate enumerator {}, value omitted",
                        f.display,
                        node.start_position().row + 1,
                        name
                    ),
                }
                *next = value.map(|v| v.wrapping_add(1));
            }
            "preproc_if" | "preproc_ifdef" => {
                for child in self.active_branch(node, f) {
                    self.lower_enumerator(child, f, values, next);
                }
            }
            _ => {}
        }
    }

    fn eval_constant(&self, text: &str) -> Option<i64> {
        consteval::evaluate(text, self, Mode::Constant)
    }

    /// Resolve a type name written as words (`unsigned long`,
    /// `struct point *`) for `sizeof` in constant expressions.
    fn type_from_words(&self, type_name: &str) -> Option<QualType> {
        let mut words: Vec<&str> = type_name
            .split_whitespace()
            .filter(|w| !matches!(*w, "const" | "volatile"))
            .collect();
        let mut pointers = 0;
        while words.last() == Some(&"*") {
            words.pop();
            pointers += 1;
        }

        let is_modifier = |w: &str| matches!(w, "signed" | "unsigned" | "short" | "long");
        let ty = match words.as_slice() {
            [] => return None,
            [keyword @ ("struct" | "union" | "class" | "enum"), tag] => match (self.tags.get(*tag)?, *keyword) {
                (Tag::Enum(id), "enum") => Type::Enum {
                    id: *id,
                    elaborated: true,
                },
                (Tag::Record(id), keyword) if keyword != "enum" => Type::Record {
                    id: *id,
                    elaborated: true,
                },
                _ => return None,
            },
            [name] if !is_modifier(*name) => self.resolve_type_name(*name),
            words => {
                let (modifiers, base): (Vec<&str>, Vec<&str>) = words.iter().copied().partition(|w| is_modifier(*w));
                let base = match base.as_slice() {
                    [] => None,
                    [base] => Some(*base),
                    _ => return None,
                };
                Type::Builtin(Builtin::from_modifiers(&modifiers, base)?)
            }
        };

        let mut qt = QualType::new(ty);
        for _ in 0..pointers {
            qt = QualType::new(Type::Pointer(Box::new(qt)));
        }
        Some(qt)
    }

    // -- Declarators -------------------------------------------------------------

    /// Apply a declarator to `base`, innermost last. Returns the node naming
    /// the declared entity (if any) and the complete type.
    fn apply_declarator<'t>(&mut self, decl: Node<'t>, base: QualType, f: &FileCtx) -> (Option<Node<'t>>, QualType) {
        let kind = decl.kind();
        let inner = decl.child_by_field_name("declarator");

        let ty = if kind.contains("pointer_") && kind.ends_with("declarator") {
            let mut quals = Qualifiers::default();
            for child in named_children(decl) {
                if child.kind() == "type_qualifier" {
                    quals.add_keyword(f.text(child));
                }
            }
            QualType::with_quals(Type::Pointer(Box::new(base)), quals)
        } else if kind.contains("reference_declarator") {
            let rvalue = decl.child(0).is_some_and(|c| c.kind() == "&&");
            let ty = QualType::new(Type::Reference {
                referee: Box::new(base),
                rvalue,
            });
            return match named_children(decl).into_iter().next() {
                Some(inner) => self.apply_declarator(inner, ty, f),
                None => (None, ty),
            };
        } else if kind.contains("array_") && kind.ends_with("declarator") {
            let len = decl
                .child_by_field_name("size")
                .and_then(|s| self.eval_constant(f.text(s)))
                .and_then(|n| u64::try_from(n).ok());
            QualType::new(Type::Array {
                element: Box::new(base),
                len,
            })
        } else if kind.contains("function_") && kind.ends_with("declarator") {
            let (params, variadic, void_params) = match decl.child_by_field_name("parameters") {
                Some(list) => self.lower_parameters(list, f),
                None => (Vec::new(), false, false),
            };
            let ret = match named_children(decl)
                .into_iter()
                .find(|c| c.kind() == "trailing_return_type")
                .and_then(|t| named_children(t).into_iter().next())
            {
                Some(descriptor) => self.lower_type_descriptor(descriptor, f),
                None => base,
            };
            QualType::new(Type::Function(Box::new(FunctionType {
                ret,
                params,
                variadic,
                void_params,
            })))
        } else if kind.starts_with("parenthesized_") || kind == "attributed_declarator" || kind == "variadic_declarator" {
            return match named_children(decl)
                .into_iter()
                .find(|c| !c.kind().starts_with("attribute"))
            {
                Some(inner) => self.apply_declarator(inner, base, f),
                None => (None, base),
            };
        } else {
            // identifier, field_identifier, type_identifier, qualified names
            return (Some(decl), base);
        };

        match inner {
            Some(inner) => self.apply_declarator(inner, ty, f),
            None => (None, ty),
        }
    }

    fn lower_parameters(&mut self, list: Node, f: &FileCtx) -> (Vec<Param>, bool, bool) {
        let mut params = Vec::new();
        let mut variadic = false;

        for child in all_children(list) {
            match child.kind() {
                "variadic_parameter" | "..." => variadic = true,
                "parameter_declaration" | "optional_parameter_declaration" | "variadic_parameter_declaration" => {
                    let mut scratch = Vec::new();
                    let specs = self.lower_specifiers(child, f, &mut scratch);
                    let (name_node, ty) = match child.child_by_field_name("declarator") {
                        Some(decl) => self.apply_declarator(decl, specs.base, f),
                        None => (None, specs.base),
                    };
                    params.push(Param {
                        name: unqualified_name(name_node, f),
                        ty: adjust_parameter_type(ty),
                    });
                }
                _ => {}
            }
        }

        let void_params = !variadic
            && params.len() == 1
            && params[0].name.is_empty()
            && params[0].ty == QualType::void();
        if void_params {
            params.clear();
        }
        (params, variadic, void_params)
    }

    /// `type_descriptor`: specifiers plus an abstract declarator.
    fn lower_type_descriptor(&mut self, node: Node, f: &FileCtx) -> QualType {
        let mut scratch = Vec::new();
        let specs = self.lower_specifiers(node, f, &mut scratch);
        match node.child_by_field_name("declarator") {
            Some(decl) => self.apply_declarator(decl, specs.base, f).1,
            None => specs.base,
        }
    }

    // -- Function bodies ---------------------------------------------------------

    /// Lower a statement or expression, collecting local declarations and
    /// call sites in evaluation order (a call before its arguments).
    fn lower_statement(&mut self, node: Node, f: &FileCtx, out: &mut Vec<Item>) {
        match node.kind() {
            "declaration" => self.lower_declaration(node, node.start_byte(), f, DeclContext::Function, out),
            "type_definition" => self.lower_typedef(node, node.start_byte(), f, out),
            "struct_specifier" | "union_specifier" | "class_specifier" | "enum_specifier" => {
                self.lower_type_specifier(node, f, out);
            }
            "function_definition" => self.lower_function(node, node.start_byte(), f, out),
            "call_expression" => {
                if let Some(callee) = node.child_by_field_name("function") {
                    match self.classify_callee(callee, f) {
                        Callee::Direct(name) => out.push(Item::Call(CallSite::direct(name))),
                        Callee::Indirect => out.push(Item::Call(CallSite::indirect())),
                        Callee::Expanded(calls) => out.extend(calls.into_iter().map(Item::Call)),
                        Callee::NotACall => {}
                    }
                }
                self.lower_statements(node, f, out);
            }
            "lambda_expression" => {
                let mut scope = HashSet::new();
                if let Some(list) = node
                    .child_by_field_name("declarator")
                    .and_then(|d| d.child_by_field_name("parameters"))
                {
                    let (params, _, _) = self.lower_parameters(list, f);
                    scope.extend(params.into_iter().map(|p| p.name));
                }
                self.scopes.push(scope);
                if let Some(body) = node.child_by_field_name("body") {
                    self.lower_statement(body, f, out);
                }
                self.scopes.pop();
            }
            "compound_statement" | "for_statement" | "for_range_loop" | "if_statement" | "while_statement"
            | "switch_statement" => {
                self.scopes.push(HashSet::new());
                self.lower_statements(node, f, out);
                self.scopes.pop();
            }
            "preproc_if" | "preproc_ifdef" => {
                for child in self.active_branch(node, f) {
                    self.lower_statement(child, f, out);
                }
            }
            "preproc_include" | "preproc_def" | "preproc_function_def" | "preproc_call" => {
                self.lower_directive(node, f, out)
            }
            "comment" | "string_literal" | "number_literal" | "char_literal" | "identifier" => {}
            _ => self.lower_statements(node, f, out),
        }
    }

    fn lower_statements(&mut self, node: Node, f: &FileCtx, out: &mut Vec<Item>) {
        for child in named_children(node) {
            self.lower_statement(child, f, out);
        }
    }

    fn classify_callee(&self, node: Node, f: &FileCtx) -> Callee {
        match node.kind() {
            "identifier" => self.classify_name(f.text(node), 0),
            "qualified_identifier" => match node.child_by_field_name("name") {
                Some(inner) => match inner.kind() {
                    "identifier" | "destructor_name" | "operator_name" => {
                        Callee::Direct(unqualified_name(Some(inner), f))
                    }
                    "template_function" | "qualified_identifier" => self.classify_callee(inner, f),
                    _ => Callee::NotACall,
                },
                None => Callee::Indirect,
            },
            "template_function" => match node.child_by_field_name("name") {
                Some(name) => Callee::Direct(f.text(name).to_string()),
                None => Callee::Indirect,
            },
            // Member calls name a method in C++; in C they go through a
            // function-pointer field
            "field_expression" if self.language == Language::Cpp => match node.child_by_field_name("field") {
                Some(field) => Callee::Direct(unqualified_name(Some(field), f)),
                None => Callee::Indirect,
            },
            "parenthesized_expression" => match named_children(node).into_iter().next() {
                Some(inner) => self.classify_callee(inner, f),
                None => Callee::Indirect,
            },
            "pointer_expression" => match node.child_by_field_name("argument") {
                Some(arg) if arg.kind() == "identifier" && !self.is_variable(f.text(arg)) => {
                    Callee::Direct(f.text(arg).to_string())
                }
                _ => Callee::Indirect,
            },
            "primitive_type" | "type_identifier" | "template_type" | "sized_type_specifier" => Callee::NotACall,
            _ => Callee::Indirect,
        }
    }

    /// Classify a plain identifier callee, looking through macros: an alias
    /// such as `#define my_alloc malloc` names its target, and a
    /// function-like macro contributes the calls in its replacement.
    fn classify_name(&self, name: &str, depth: usize) -> Callee {
        let name = self.resolve_alias(name);
        if let Some(def) = self.pp.function_macro(name) {
            let mut calls = Vec::new();
            if depth < MAX_MACRO_DEPTH {
                for callee in preproc::invoked_names(&def.body, &def.params) {
                    match self.classify_name(&callee, depth + 1) {
                        Callee::Direct(name) => calls.push(CallSite::direct(name)),
                        Callee::Indirect => calls.push(CallSite::indirect()),
                        Callee::Expanded(inner) => calls.extend(inner),
                        Callee::NotACall => {}
                    }
                }
            }
            Callee::Expanded(calls)
        } else if self.is_type_name(name) {
            Callee::NotACall
        } else if self.is_variable(name) {
            Callee::Indirect
        } else {
            Callee::Direct(name.to_string())
        }
    }

    /// Follow object-like macros whose replacement is a single identifier.
    fn resolve_alias<'a>(&'a self, name: &'a str) -> &'a str {
        let mut current = name;
        for _ in 0..MAX_MACRO_DEPTH {
            match self.pp.macro_body(current) {
                Some(body) if is_identifier(body) && body != current => current = body,
                _ => break,
            }
        }
        current
    }
}

impl Symbols for Lowerer {
    fn enumerator(&self, name: &str) -> Option<i64> {
        self.enumerators.get(name).copied()
    }

    fn macro_body(&self, name: &str) -> Option<&str> {
        self.pp.macro_body(name)
    }

    fn function_macro(&self, name: &str) -> Option<&FunctionMacro> {
        self.pp.function_macro(name)
    }

    fn is_defined(&self, name: &str) -> bool {
        self.pp.is_defined(name)
    }

    fn size_of(&self, type_name: &str) -> Option<i64> {
        let qt = self.type_from_words(type_name)?;
        i64::try_from(self.types.size_of(&qt)?).ok()
    }

    fn align_of(&self, type_name: &str) -> Option<i64> {
        let qt = self.type_from_words(type_name)?;
        i64::try_from(self.types.align_of(&qt)?).ok()
    }
}

// -- Helpers ---------------------------------------------------------------------

fn function_item(
    name: String,
    loc: Option<SourceLoc>,
    storage: StorageSpec,
    func: FunctionType,
    body: Option<Vec<Item>>,
) -> Item {
    Item::Decl(Decl::Function(FunctionDecl {
        name,
        loc,
        storage,
        return_type: func.ret,
        params: func
            .params
            .into_iter()
            .map(|p| ParamDecl {
                name: p.name,
                ty: p.ty,
            })
            .collect(),
        body,
    }))
}

/// Arrays and functions passed as parameters decay to pointers.
fn adjust_parameter_type(qt: QualType) -> QualType {
    match qt.ty {
        Type::Array { element, .. } => QualType::new(Type::Pointer(element)),
        Type::Function(_) => QualType::new(Type::Pointer(Box::new(qt))),
        _ => qt,
    }
}

fn named_children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn all_children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

fn field_children<'t>(node: Node<'t>, field: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children_by_field_name(field, &mut cursor).collect()
}

/// Items of a conditional branch, without its condition, name, nested
/// `#else`/`#elif`, or comments.
fn branch_items(branch: Node) -> Vec<Node> {
    let skip: Vec<usize> = ["condition", "name", "alternative"]
        .iter()
        .filter_map(|field| branch.child_by_field_name(field))
        .map(|n| n.id())
        .collect();
    named_children(branch)
        .into_iter()
        .filter(|c| !skip.contains(&c.id()) && c.kind() != "comment")
        .collect()
}

/// Names declared by a `template <...>` parameter list.
fn template_param_names(list: Node, f: &FileCtx) -> Vec<String> {
    let mut names = Vec::new();
    for param in named_children(list) {
        let name = match param.kind() {
            "type_parameter_declaration" | "variadic_type_parameter_declaration" => named_children(param)
                .into_iter()
                .find(|c| c.kind() == "type_identifier"),
            "optional_type_parameter_declaration" => param.child_by_field_name("name"),
            "template_template_parameter_declaration" => named_children(param)
                .into_iter()
                .rev()
                .find(|c| c.kind() == "type_parameter_declaration")
                .and_then(|p| named_children(p).into_iter().find(|c| c.kind() == "type_identifier")),
            _ => None,
        };
        if let Some(name) = name {
            names.push(f.text(name).to_string());
        }
    }
    names
}

/// The unqualified name a declarator node declares.
fn unqualified_name(node: Option<Node>, f: &FileCtx) -> String {
    let Some(node) = node else {
        return String::new();
    };
    match node.kind() {
        "qualified_identifier" | "template_function" | "template_type" | "template_method" => {
            unqualified_name(node.child_by_field_name("name"), f)
        }
        "operator_name" => normalize_operator(f.text(node)),
        _ => f.text(node).trim().to_string(),
    }
}

/// `operator ==` → `operator==`; word operators keep their space.
fn is_identifier(text: &str) -> bool {
    text.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
        && text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn normalize_operator(text: &str) -> String {
    let rest = text.trim_start_matches("operator").trim();
    if rest.starts_with(|c: char| c.is_alphabetic()) {
        format!("operator {}", rest.split_whitespace().collect::<Vec<_>>().join(" "))
    } else {
        format!("operator{}", rest.split_whitespace().collect::<String>())
    }
}

/// Collapse whitespace in a type spelled from source text.
fn normalize_spelling(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace(" ::", "::")
        .replace(":: ", "::")
        .replace("< ", "<")
        .replace(" >", ">")
        .replace(" ,", ",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_translation_unit;

    fn parse(source: &str, file: &str) -> TranslationUnit {
        parse_translation_unit(Path::new(file), source, &CompilerArgs::default()).unwrap()
    }

    fn decls(items: &[Item]) -> Vec<&Decl> {
        let mut out = Vec::new();
        for item in items {
            if let Item::Decl(decl) = item {
                out.push(decl);
                match decl {
                    Decl::Other(inner) => out.extend(decls(inner)),
                    Decl::Function(FunctionDecl { body: Some(body), .. }) => out.extend(decls(body)),
                    _ => {}
                }
            }
        }
        out
    }

    fn function<'a>(tu: &'a TranslationUnit, name: &str) -> &'a FunctionDecl {
        decls(&tu.items)
            .into_iter()
            .find_map(|d| match d {
                Decl::Function(func) if func.name == name => Some(func),
                _ => None,
            })
            .unwrap_or_else(|| panic!("no function {name}"))
    }

    fn calls(items: &[Item]) -> Vec<Option<String>> {
        let mut out = Vec::new();
        for item in items {
            match item {
                Item::Call(call) => out.push(call.callee.clone()),
                Item::Decl(Decl::Variable(var)) => out.extend(calls(&var.init)),
                _ => {}
            }
        }
        out
    }

    #[test]
    fn function_signature() {
        let tu = parse("static const char *name(int id, char buf[16], void (*cb)(int)) { return 0; }", "a.c");
        let func = function(&tu, "name");
        assert_eq!(func.storage, StorageSpec::Static);
        assert_eq!(tu.types.spell(&func.return_type), "const char *");
        let params: Vec<String> = func.params.iter().map(|p| tu.types.spell(&p.ty)).collect();
        assert_eq!(params, vec!["int", "char *", "void (*)(int)"]);
        assert_eq!(func.params[2].name, "cb");
        assert!(func.body.is_some());
    }

    #[test]
    fn void_parameter_list_is_empty() {
        let tu = parse("int get(void);", "a.c");
        let func = function(&tu, "get");
        assert!(func.params.is_empty());
        assert!(func.body.is_none());
    }

    #[test]
    fn calls_in_body_order() {
        let src = "int helper(int x);\nint run(int (*fp)(int)) {\n  helper(helper(1));\n  fp(2);\n  (*fp)(3);\n  return helper(4);\n}\n";
        let tu = parse(src, "a.c");
        let body = function(&tu, "run").body.as_ref().unwrap();
        assert_eq!(
            calls(body),
            vec![
                Some("helper".to_string()),
                Some("helper".to_string()),
                None,
                None,
                Some("helper".to_string()),
            ]
        );
    }

    #[test]
    fn function_like_macros_are_not_calls() {
        let src = "#define MAX(a, b) ((a) > (b) ? (a) : (b))\nint f(int a) { return MAX(a, g()); }\n";
        let tu = parse(src, "a.c");
        assert_eq!(calls(function(&tu, "f").body.as_ref().unwrap()), vec![Some("g".to_string())]);
    }

    #[test]
    fn static_local_has_global_storage() {
        let src = "int counter(void) { static int n = 0; int local = 1; return ++n + local; }";
        let tu = parse(src, "a.c");
        let vars: Vec<&VarDecl> = decls(&tu.items)
            .into_iter()
            .filter_map(|d| match d {
                Decl::Variable(var) => Some(var),
                _ => None,
            })
            .collect();
        assert_eq!(vars.len(), 2);
        assert!(vars[0].global_storage);
        assert_eq!(vars[0].context, DeclContext::Function);
        assert!(!vars[1].global_storage);
    }

    #[test]
    fn enum_values_and_typedef() {
        let src = "#define BASE 10\ntypedef enum { A, B = BASE, C, D = -1, E } Letters;";
        let tu = parse(src, "a.c");
        let alias = decls(&tu.items)
            .into_iter()
            .find_map(|d| match d {
                Decl::TypeAlias(alias) => Some(alias),
                _ => None,
            })
            .unwrap();
        assert_eq!(alias.name, "Letters");
        let Type::Enum { id, .. } = tu.types.desugar(&alias.underlying) else {
            panic!("not an enum");
        };
        let values = tu.types.enum_def(*id).enumerators.clone().unwrap();
        assert_eq!(
            values,
            vec![
                ("A".to_string(), 0),
                ("B".to_string(), 10),
                ("C".to_string(), 11),
                ("D".to_string(), -1),
                ("E".to_string(), 0),
            ]
        );
    }

    fn enum_values(tu: &TranslationUnit, alias: &str) -> Vec<(String, i64)> {
        let underlying = decls(&tu.items)
            .into_iter()
            .find_map(|d| match d {
                Decl::TypeAlias(decl) if decl.name == alias => Some(&decl.underlying),
                _ => None,
            })
            .unwrap_or_else(|| panic!("no typedef {alias}"));
        let Type::Enum { id, .. } = tu.types.desugar(underlying) else {
            panic!("not an enum");
        };
        tu.types.enum_def(*id).enumerators.clone().unwrap()
    }

    #[test]
    fn enum_values_through_function_macros_and_sizeof() {
        let src = "#define BIT(n) (1u << (n))\nstruct pair { int a; int b; };\n\
                   typedef enum { A = BIT(3), B = sizeof(int), C, D = sizeof(struct pair *), E = _Alignof(long) } Flags;";
        let tu = parse(src, "a.c");
        assert_eq!(
            enum_values(&tu, "Flags"),
            vec![
                ("A".to_string(), 8),
                ("B".to_string(), 4),
                ("C".to_string(), 5),
                ("D".to_string(), 8),
                ("E".to_string(), 8),
            ]
        );
    }

    #[test]
    fn unevaluable_enumerators_are_omitted() {
        let src = "int lookup(int);\ntypedef enum { A = 1, B = lookup(2), C, D = A + 4, E } Fields;";
        let tu = parse(src, "a.c");
        assert_eq!(
            enum_values(&tu, "Fields"),
            vec![("A".to_string(), 1), ("D".to_string(), 5), ("E".to_string(), 6)]
        );
    }

    #[test]
    fn calls_through_macros_name_the_function() {
        let src = "#define LOG(x) log_write(x)\n#define my_alloc malloc\n#define TRACE(x) LOG(x)\n\
                   void log_write(int);\nvoid *malloc(unsigned long);\n\
                   void f(void) { LOG(1); my_alloc(4); TRACE(compute()); }\n";
        let tu = parse(src, "a.c");
        assert_eq!(
            calls(function(&tu, "f").body.as_ref().unwrap()),
            vec![
                Some("log_write".to_string()),
                Some("malloc".to_string()),
                Some("log_write".to_string()),
                Some("compute".to_string()),
            ]
        );
    }

    #[test]
    fn record_completed_after_use() {
        let src = "struct node;\nvoid visit(struct node n);\nstruct node { int value; struct node *next; };\n";
        let tu = parse(src, "a.c");
        let param = &function(&tu, "visit").params[0];
        assert_eq!(tu.types.spell(&param.ty), "struct node");
        assert!(!tu.types.is_incomplete(&param.ty));
        assert_eq!(tu.types.size_of(&param.ty), Some(16));
    }

    #[test]
    fn conditional_compilation_picks_one_branch() {
        let src = "#ifdef MISSING\nint wrong(void) { return 0; }\n#else\nint right(void) { return 1; }\n#endif\n#if 0\nint dead;\n#endif\n";
        let tu = parse(src, "a.c");
        let names: Vec<String> = decls(&tu.items)
            .into_iter()
            .filter_map(|d| match d {
                Decl::Function(func) => Some(func.name.clone()),
                Decl::Variable(var) => Some(var.name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["right".to_string()]);
    }

    #[test]
    fn cpp_methods_and_templates() {
        let src = "namespace geo {\nclass Shape {\npublic:\n  static int count;\n  double area() const { return compute(); }\n  double compute() const;\n};\n}\ntemplate <typename T>\nT twice(const T &value) { return value + value; }\n";
        let tu = parse(src, "shapes.cpp");
        let area = function(&tu, "area");
        assert!(area.body.is_some());
        assert_eq!(calls(area.body.as_ref().unwrap()), vec![Some("compute".to_string())]);
        assert!(function(&tu, "compute").body.is_none());

        let twice = function(&tu, "twice");
        assert!(tu.types.is_dependent(&twice.params[0].ty));
        assert_eq!(tu.types.spell(&twice.params[0].ty), "const T &");

        let count = decls(&tu.items)
            .into_iter()
            .find_map(|d| match d {
                Decl::Variable(var) if var.name == "count" => Some(var),
                _ => None,
            })
            .unwrap();
        assert!(count.global_storage);
        assert_eq!(count.context, DeclContext::Record);
    }

    #[test]
    fn anonymous_struct_named_by_typedef() {
        let tu = parse("typedef struct { int x; } Point, *PointRef;", "a.c");
        let aliases: Vec<String> = decls(&tu.items)
            .into_iter()
            .filter_map(|d| match d {
                Decl::TypeAlias(alias) => Some(tu.types.spell(&alias.underlying)),
                _ => None,
            })
            .collect();
        assert_eq!(aliases, vec!["Point".to_string(), "Point *".to_string()]);
    }

    #[test]
    fn operator_names() {
        assert_eq!(normalize_operator("operator =="), "operator==");
        assert_eq!(normalize_operator("operator new"), "operator new");
        assert_eq!(normalize_operator("operator()"), "operator()");
    }
}
