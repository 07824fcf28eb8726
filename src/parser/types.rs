//! Type representation, spelling and LP64 layout.
//!
//! Types are kept as written (typedef sugar, elaborated `struct` keywords)
//! so they print the way a compiler diagnostic would, and are desugared on
//! demand for sizing and classification. Completeness is decided against the
//! finished table, so a record defined after its first use still has a size.

use std::fmt::Write;

/// `const` / `volatile` / `restrict` on one level of a type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Qualifiers {
    pub is_const: bool,
    pub is_volatile: bool,
    pub is_restrict: bool,
}

impl Qualifiers {
    /// Apply a qualifier keyword; returns false for keywords that are not
    /// type qualifiers (`_Noreturn`, `_Atomic`, ...).
    pub fn add_keyword(&mut self, keyword: &str) -> bool {
        match keyword {
            "const" | "constexpr" | "constinit" => self.is_const = true,
            "volatile" => self.is_volatile = true,
            "restrict" | "__restrict" | "__restrict__" => self.is_restrict = true,
            _ => return false,
        }
        true
    }

    fn words(&self) -> Vec<&'static str> {
        let mut words = Vec::new();
        if self.is_const {
            words.push("const");
        }
        if self.is_volatile {
            words.push("volatile");
        }
        if self.is_restrict {
            words.push("restrict");
        }
        words
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualType {
    pub ty: Type,
    pub quals: Qualifiers,
}

impl QualType {
    pub fn new(ty: Type) -> Self {
        Self {
            ty,
            quals: Qualifiers::default(),
        }
    }

    pub fn with_quals(ty: Type, quals: Qualifiers) -> Self {
        Self { ty, quals }
    }

    pub fn void() -> Self {
        Self::new(Type::Builtin(Builtin::VOID))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypedefId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Builtin(Builtin),
    /// A name the front-end could not resolve. `dependent` is set when the
    /// spelling mentions a template parameter in scope.
    Named { spelling: String, dependent: bool },
    Record { id: RecordId, elaborated: bool },
    Enum { id: EnumId, elaborated: bool },
    Typedef(TypedefId),
    Pointer(Box<QualType>),
    Reference { referee: Box<QualType>, rvalue: bool },
    Array { element: Box<QualType>, len: Option<u64> },
    Function(Box<FunctionType>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionType {
    pub ret: QualType,
    pub params: Vec<Param>,
    pub variadic: bool,
    /// Written as `(void)`.
    pub void_params: bool,
}

/// One parameter of a function type. Names ride along so the declaration
/// that owns the outermost function type can report them.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: QualType,
}

/// A builtin arithmetic type or a well-known system typedef.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Builtin {
    pub name: &'static str,
    /// `None` for `void`.
    pub size: Option<u64>,
}

/// Builtin spellings and their LP64 sizes. Names past `wchar_t` are typedefs
/// supplied by system headers, which the front-end does not parse.
const BUILTINS: &[(&str, u64)] = &[
    ("_Bool", 1),
    ("bool", 1),
    ("char", 1),
    ("signed char", 1),
    ("unsigned char", 1),
    ("short", 2),
    ("unsigned short", 2),
    ("int", 4),
    ("unsigned int", 4),
    ("long", 8),
    ("unsigned long", 8),
    ("long long", 8),
    ("unsigned long long", 8),
    ("__int128", 16),
    ("unsigned __int128", 16),
    ("float", 4),
    ("double", 8),
    ("long double", 16),
    ("wchar_t", 4),
    ("char8_t", 1),
    ("char16_t", 2),
    ("char32_t", 4),
    ("nullptr_t", 8),
    ("size_t", 8),
    ("ssize_t", 8),
    ("ptrdiff_t", 8),
    ("intptr_t", 8),
    ("uintptr_t", 8),
    ("intmax_t", 8),
    ("uintmax_t", 8),
    ("max_align_t", 16),
    ("int8_t", 1),
    ("int16_t", 2),
    ("int32_t", 4),
    ("int64_t", 8),
    ("uint8_t", 1),
    ("uint16_t", 2),
    ("uint32_t", 4),
    ("uint64_t", 8),
    ("int_least8_t", 1),
    ("int_least16_t", 2),
    ("int_least32_t", 4),
    ("int_least64_t", 8),
    ("uint_least8_t", 1),
    ("uint_least16_t", 2),
    ("uint_least32_t", 4),
    ("uint_least64_t", 8),
    ("int_fast8_t", 1),
    ("int_fast16_t", 8),
    ("int_fast32_t", 8),
    ("int_fast64_t", 8),
    ("uint_fast8_t", 1),
    ("uint_fast16_t", 8),
    ("uint_fast32_t", 8),
    ("uint_fast64_t", 8),
    ("off_t", 8),
    ("time_t", 8),
    ("clock_t", 8),
    ("pid_t", 4),
    ("uid_t", 4),
    ("gid_t", 4),
    ("mode_t", 4),
    ("sig_atomic_t", 4),
    ("socklen_t", 4),
    ("va_list", 24),
    ("__builtin_va_list", 24),
    ("FILE", 216),
];

impl Builtin {
    pub const VOID: Builtin = Builtin {
        name: "void",
        size: None,
    };

    pub fn lookup(name: &str) -> Option<Builtin> {
        if name == "void" {
            return Some(Self::VOID);
        }
        BUILTINS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|&(name, size)| Builtin {
                name,
                size: Some(size),
            })
    }

    /// Canonical spelling for a run of `signed`/`unsigned`/`short`/`long`
    /// modifiers with an optional base type, e.g. `long unsigned int` →
    /// `unsigned long`.
    pub fn from_modifiers(modifiers: &[&str], base: Option<&str>) -> Option<Builtin> {
        let unsigned = modifiers.contains(&"unsigned");
        let signed = modifiers.contains(&"signed");
        let longs = modifiers.iter().filter(|m| **m == "long").count();
        let short = modifiers.contains(&"short");
        let prefix = if unsigned { "unsigned " } else { "" };

        let name = match base {
            Some("char") if unsigned => "unsigned char".to_string(),
            Some("char") if signed => "signed char".to_string(),
            Some("char") => "char".to_string(),
            Some("double") if longs > 0 => "long double".to_string(),
            Some("double") => "double".to_string(),
            Some("__int128") => format!("{}__int128", prefix),
            Some("int") | None => {
                if short {
                    format!("{}short", prefix)
                } else if longs >= 2 {
                    format!("{}long long", prefix)
                } else if longs == 1 {
                    format!("{}long", prefix)
                } else {
                    format!("{}int", prefix)
                }
            }
            Some(other) => other.to_string(),
        };
        Self::lookup(&name)
    }
}

// -- Declared entities ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Struct,
    Union,
    Class,
}

impl RecordKind {
    pub fn keyword(self) -> &'static str {
        match self {
            RecordKind::Struct => "struct",
            RecordKind::Union => "union",
            RecordKind::Class => "class",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: QualType,
    pub bit_width: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RecordDef {
    pub kind: RecordKind,
    /// Tag name, or the `(unnamed struct at FILE:L:C)` label.
    pub name: String,
    pub anonymous: bool,
    /// An anonymous record that took its name from a typedef prints as that
    /// name, without the keyword.
    pub named_by_typedef: bool,
    /// `None` until a definition has been seen.
    pub fields: Option<Vec<Field>>,
    pub cplusplus: bool,
}

#[derive(Debug, Clone)]
pub struct EnumDef {
    pub name: String,
    pub anonymous: bool,
    pub named_by_typedef: bool,
    pub underlying: Option<QualType>,
    /// `None` until a definition has been seen.
    pub enumerators: Option<Vec<(String, i64)>>,
}

#[derive(Debug, Clone)]
pub struct TypedefDef {
    pub name: String,
    pub underlying: QualType,
}

/// Everything needed to print, size and classify types of one translation
/// unit.
#[derive(Debug, Default)]
pub struct TypeTable {
    records: Vec<RecordDef>,
    enums: Vec<EnumDef>,
    typedefs: Vec<TypedefDef>,
}

/// Pointers, references and `va_list` slots.
const POINTER_SIZE: u64 = 8;
const ENUM_SIZE: u64 = 4;

impl TypeTable {
    pub fn add_record(&mut self, def: RecordDef) -> RecordId {
        self.records.push(def);
        RecordId(self.records.len() - 1)
    }

    pub fn add_enum(&mut self, def: EnumDef) -> EnumId {
        self.enums.push(def);
        EnumId(self.enums.len() - 1)
    }

    pub fn add_typedef(&mut self, def: TypedefDef) -> TypedefId {
        self.typedefs.push(def);
        TypedefId(self.typedefs.len() - 1)
    }

    pub fn record(&self, id: RecordId) -> &RecordDef {
        &self.records[id.0]
    }

    pub fn record_mut(&mut self, id: RecordId) -> &mut RecordDef {
        &mut self.records[id.0]
    }

    pub fn enum_def(&self, id: EnumId) -> &EnumDef {
        &self.enums[id.0]
    }

    pub fn enum_mut(&mut self, id: EnumId) -> &mut EnumDef {
        &mut self.enums[id.0]
    }

    pub fn typedef(&self, id: TypedefId) -> &TypedefDef {
        &self.typedefs[id.0]
    }

    /// Strip typedef sugar (and the qualifiers along the way).
    pub fn desugar<'a>(&'a self, qt: &'a QualType) -> &'a Type {
        let mut ty = &qt.ty;
        while let Type::Typedef(id) = ty {
            ty = &self.typedef(*id).underlying.ty;
        }
        ty
    }

    // -- Spelling --------------------------------------------------------------

    /// Spell a type the way clang's `QualType::getAsString` does.
    pub fn spell(&self, qt: &QualType) -> String {
        self.spell_with(qt, String::new())
    }

    fn spell_with(&self, qt: &QualType, inner: String) -> String {
        match &qt.ty {
            Type::Pointer(pointee) => {
                let mut decl = String::from("*");
                let quals = qt.quals.words().join(" ");
                decl.push_str(&quals);
                if !inner.is_empty() {
                    if !quals.is_empty() {
                        decl.push(' ');
                    }
                    decl.push_str(&inner);
                }
                self.spell_with(pointee, self.wrap_declarator(&pointee.ty, decl))
            }
            Type::Reference { referee, rvalue } => {
                let mut decl = String::from(if *rvalue { "&&" } else { "&" });
                decl.push_str(&inner);
                self.spell_with(referee, self.wrap_declarator(&referee.ty, decl))
            }
            Type::Array { element, len } => {
                let mut decl = inner;
                match len {
                    Some(n) => {
                        let _ = write!(decl, "[{}]", n);
                    }
                    None => decl.push_str("[]"),
                }
                self.spell_with(element, decl)
            }
            Type::Function(func) => {
                let mut decl = inner;
                decl.push('(');
                let params: Vec<String> = func.params.iter().map(|p| self.spell(&p.ty)).collect();
                decl.push_str(&params.join(", "));
                if func.variadic {
                    decl.push_str(if params.is_empty() { "..." } else { ", ..." });
                } else if func.void_params && params.is_empty() {
                    decl.push_str("void");
                }
                decl.push(')');
                self.spell_with(&func.ret, decl)
            }
            _ => {
                let mut out = qt.quals.words().join(" ");
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(&self.base_name(&qt.ty));
                if !inner.is_empty() {
                    if !inner.starts_with('[') {
                        out.push(' ');
                    }
                    out.push_str(&inner);
                }
                out
            }
        }
    }

    /// Parenthesize a pointer/reference declarator applied to an array or
    /// function, e.g. `int (*)[4]`.
    fn wrap_declarator(&self, target: &Type, decl: String) -> String {
        match target {
            Type::Array { .. } | Type::Function(_) => format!("({})", decl),
            _ => decl,
        }
    }

    fn base_name(&self, ty: &Type) -> String {
        match ty {
            Type::Builtin(b) => b.name.to_string(),
            Type::Named { spelling, .. } => spelling.clone(),
            Type::Typedef(id) => self.typedef(*id).name.clone(),
            Type::Record { id, elaborated } => {
                let def = self.record(*id);
                if def.named_by_typedef {
                    def.name.clone()
                } else if *elaborated || def.anonymous || !def.cplusplus {
                    format!("{} {}", def.kind.keyword(), def.name)
                } else {
                    def.name.clone()
                }
            }
            Type::Enum { id, elaborated } => {
                let def = self.enum_def(*id);
                if def.named_by_typedef {
                    def.name.clone()
                } else if *elaborated || def.anonymous {
                    format!("enum {}", def.name)
                } else {
                    def.name.clone()
                }
            }
            Type::Pointer(_) | Type::Reference { .. } | Type::Array { .. } | Type::Function(_) => {
                self.spell(&QualType::new(ty.clone()))
            }
        }
    }

    // -- Classification ----------------------------------------------------------

    /// Whether the type's layout is unknown: `void`, undefined records and
    /// enums, arrays of unknown bound, unresolved names.
    pub fn is_incomplete(&self, qt: &QualType) -> bool {
        match self.desugar(qt) {
            Type::Builtin(b) => b.size.is_none(),
            Type::Named { .. } => true,
            Type::Record { id, .. } => self.record(*id).fields.is_none(),
            Type::Enum { id, .. } => {
                let def = self.enum_def(*id);
                def.enumerators.is_none() && def.underlying.is_none()
            }
            Type::Array { element, len } => len.is_none() || self.is_incomplete(element),
            Type::Pointer(_) | Type::Reference { .. } | Type::Function(_) => false,
            Type::Typedef(_) => unreachable!("desugared"),
        }
    }

    /// Whether the type mentions a template parameter anywhere.
    pub fn is_dependent(&self, qt: &QualType) -> bool {
        match &qt.ty {
            Type::Named { dependent, .. } => *dependent,
            Type::Typedef(id) => self.is_dependent(&self.typedef(*id).underlying),
            Type::Pointer(inner) => self.is_dependent(inner),
            Type::Reference { referee, .. } => self.is_dependent(referee),
            Type::Array { element, .. } => self.is_dependent(element),
            Type::Function(func) => {
                self.is_dependent(&func.ret) || func.params.iter().any(|p| self.is_dependent(&p.ty))
            }
            Type::Builtin(_) | Type::Record { .. } | Type::Enum { .. } => false,
        }
    }

    /// Storage size in bytes; `None` when the type cannot be sized.
    pub fn size_of(&self, qt: &QualType) -> Option<u64> {
        self.layout(qt).map(|(size, _)| size)
    }

    pub fn align_of(&self, qt: &QualType) -> Option<u64> {
        self.layout(qt).map(|(_, align)| align)
    }

    /// `(size, alignment)` in bytes.
    fn layout(&self, qt: &QualType) -> Option<(u64, u64)> {
        match self.desugar(qt) {
            Type::Builtin(b) => {
                let size = b.size?;
                let align = match b.name {
                    "long double" | "__int128" | "unsigned __int128" | "max_align_t" => 16,
                    _ => size.clamp(1, 8),
                };
                Some((size, align))
            }
            Type::Named { .. } => None,
            Type::Pointer(_) | Type::Reference { .. } => Some((POINTER_SIZE, POINTER_SIZE)),
            Type::Array { element, len } => {
                let (size, align) = self.layout(element)?;
                Some((size.checked_mul((*len)?)?, align))
            }
            Type::Enum { id, .. } => match &self.enum_def(*id).underlying {
                Some(underlying) => self.layout(underlying),
                None => self.enum_def(*id).enumerators.as_ref().map(|_| (ENUM_SIZE, ENUM_SIZE)),
            },
            Type::Record { id, .. } => self.record_layout(self.record(*id)),
            Type::Function(_) => None,
            Type::Typedef(_) => unreachable!("desugared"),
        }
    }

    /// SysV record layout: natural alignment, bit-fields packed into units
    /// of their declared type, unions sized by their largest member.
    fn record_layout(&self, def: &RecordDef) -> Option<(u64, u64)> {
        let fields = def.fields.as_ref()?;
        let mut max_align = 1u64;
        let mut bits = 0u64;
        let mut union_size = 0u64;

        for field in fields {
            let (size, align) = self.layout(&field.ty)?;
            max_align = max_align.max(align);
            if def.kind == RecordKind::Union {
                let field_bytes = match field.bit_width {
                    Some(width) => width.div_ceil(8),
                    None => size,
                };
                union_size = union_size.max(field_bytes);
                continue;
            }
            match field.bit_width {
                Some(0) => bits = align_up(bits, size * 8),
                Some(width) => {
                    let unit = size * 8;
                    if unit == 0 {
                        return None;
                    }
                    if bits % unit + width > unit {
                        bits = align_up(bits, unit);
                    }
                    bits += width;
                }
                None => {
                    bits = align_up(bits, align * 8);
                    bits += size * 8;
                }
            }
        }

        let raw = if def.kind == RecordKind::Union {
            union_size
        } else {
            bits.div_ceil(8)
        };
        let size = if raw == 0 && def.cplusplus {
            1
        } else {
            align_up(raw, max_align)
        };
        Some((size, max_align))
    }
}

fn align_up(value: u64, align: u64) -> u64 {
    if align == 0 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin(name: &str) -> QualType {
        QualType::new(Type::Builtin(Builtin::lookup(name).unwrap()))
    }

    fn ptr(qt: QualType) -> QualType {
        QualType::new(Type::Pointer(Box::new(qt)))
    }

    fn struct_def(table: &mut TypeTable, name: &str, fields: Option<Vec<Field>>) -> QualType {
        let id = table.add_record(RecordDef {
            kind: RecordKind::Struct,
            name: name.to_string(),
            anonymous: false,
            named_by_typedef: false,
            fields,
            cplusplus: false,
        });
        QualType::new(Type::Record {
            id,
            elaborated: true,
        })
    }

    fn field(name: &str, ty: QualType) -> Field {
        Field {
            name: name.to_string(),
            ty,
            bit_width: None,
        }
    }

    #[test]
    fn canonical_builtin_spellings() {
        assert_eq!(Builtin::from_modifiers(&["unsigned"], None).unwrap().name, "unsigned int");
        assert_eq!(Builtin::from_modifiers(&["long", "unsigned"], Some("int")).unwrap().name, "unsigned long");
        assert_eq!(Builtin::from_modifiers(&["long", "long"], None).unwrap().name, "long long");
        assert_eq!(Builtin::from_modifiers(&["short"], Some("int")).unwrap().name, "short");
        assert_eq!(Builtin::from_modifiers(&["signed"], Some("char")).unwrap().name, "signed char");
        assert_eq!(Builtin::from_modifiers(&["long"], Some("double")).unwrap().name, "long double");
    }

    #[test]
    fn spells_pointers_and_qualifiers() {
        let table = TypeTable::default();
        let mut c = builtin("char");
        c.quals.is_const = true;
        assert_eq!(table.spell(&ptr(c.clone())), "const char *");

        let mut const_ptr = ptr(builtin("char"));
        const_ptr.quals.is_const = true;
        assert_eq!(table.spell(&const_ptr), "char *const");
        assert_eq!(table.spell(&ptr(ptr(builtin("int")))), "int **");
    }

    #[test]
    fn spells_arrays_and_function_pointers() {
        let table = TypeTable::default();
        let array = QualType::new(Type::Array {
            element: Box::new(builtin("int")),
            len: Some(4),
        });
        assert_eq!(table.spell(&array), "int[4]");
        assert_eq!(table.spell(&ptr(array)), "int (*)[4]");

        let func = QualType::new(Type::Function(Box::new(FunctionType {
            ret: builtin("int"),
            params: vec![
                Param {
                    name: String::new(),
                    ty: builtin("int"),
                },
                Param {
                    name: String::new(),
                    ty: ptr(builtin("char")),
                },
            ],
            variadic: false,
            void_params: false,
        })));
        assert_eq!(table.spell(&ptr(func)), "int (*)(int, char *)");
    }

    #[test]
    fn struct_layout_with_padding() {
        let mut table = TypeTable::default();
        let s = struct_def(
            &mut table,
            "mixed",
            Some(vec![
                field("c", builtin("char")),
                field("i", builtin("int")),
                field("d", builtin("double")),
            ]),
        );
        assert_eq!(table.size_of(&s), Some(16));
        assert_eq!(table.spell(&s), "struct mixed");
    }

    #[test]
    fn bit_fields_share_a_unit() {
        let mut table = TypeTable::default();
        let mut a = field("a", builtin("unsigned int"));
        a.bit_width = Some(3);
        let mut b = field("b", builtin("unsigned int"));
        b.bit_width = Some(5);
        let s = struct_def(&mut table, "flags", Some(vec![a, b]));
        assert_eq!(table.size_of(&s), Some(4));
    }

    #[test]
    fn incomplete_types() {
        let mut table = TypeTable::default();
        let fwd = struct_def(&mut table, "opaque", None);
        assert!(table.is_incomplete(&fwd));
        assert!(!table.is_incomplete(&ptr(fwd.clone())));
        assert_eq!(table.size_of(&ptr(fwd)), Some(8));
        assert!(table.is_incomplete(&QualType::void()));
        let unbounded = QualType::new(Type::Array {
            element: Box::new(builtin("int")),
            len: None,
        });
        assert!(table.is_incomplete(&unbounded));
    }

    #[test]
    fn dependent_types() {
        let table = TypeTable::default();
        let t = QualType::new(Type::Named {
            spelling: "T".to_string(),
            dependent: true,
        });
        assert!(table.is_dependent(&ptr(t)));
        assert!(!table.is_dependent(&builtin("int")));
    }

    #[test]
    fn typedef_sugar_is_kept_for_spelling() {
        let mut table = TypeTable::default();
        let id = table.add_typedef(TypedefDef {
            name: "u32".to_string(),
            underlying: builtin("unsigned int"),
        });
        let qt = QualType::new(Type::Typedef(id));
        assert_eq!(table.spell(&qt), "u32");
        assert_eq!(table.size_of(&qt), Some(4));
    }
}
