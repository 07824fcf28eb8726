//! Symbol model: the three keyed tables and the output document.
//!
//! Tables are insertion-ordered; overwriting a key keeps its position.

use indexmap::IndexMap;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionClass {
    Normal,
    Static,
    Extern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableClass {
    Global,
    Static,
    Extern,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionRecord {
    pub class: FunctionClass,
    pub returns: String,
    pub args: Vec<ArgRecord>,
    /// Callee names in encounter order, duplicates kept.
    pub calls: Vec<String>,
    pub docs: Docs,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArgRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    /// Bytes, or -1 for incomplete and dependent types.
    pub size: i64,
}

/// Documentation attached to a function; serializes as `{}` when empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Docs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableRecord {
    /// Only known for declarations at translation-unit scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<VariableClass>,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    /// Spelling of the aliased type.
    Alias(String),
    Struct(Vec<FieldRecord>),
    Enum(IndexMap<String, i64>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeRecord {
    pub kind: TypeKind,
    pub docs: Option<String>,
}

/// Reserved per-type field; always serialized as `{}`.
#[derive(Debug, Default, Serialize)]
struct Invariants {}

impl Serialize for TypeRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        let spelling = match &self.kind {
            TypeKind::Alias(spelling) => spelling.as_str(),
            TypeKind::Struct(_) => "struct",
            TypeKind::Enum(_) => "enum",
        };
        map.serialize_entry("type", spelling)?;
        map.serialize_entry("invariants", &Invariants::default())?;
        match &self.kind {
            TypeKind::Alias(_) => {}
            TypeKind::Struct(members) => {
                if !members.is_empty() {
                    map.serialize_entry("members", members)?;
                }
            }
            TypeKind::Enum(values) => {
                if !values.is_empty() {
                    map.serialize_entry("values", values)?;
                }
            }
        }
        if let Some(raw) = &self.docs {
            map.serialize_entry(
                "docs",
                &Docs {
                    raw: Some(raw.clone()),
                },
            )?;
        }
        map.end()
    }
}

/// The tables filled in by one walk over a translation unit.
#[derive(Debug, Default)]
pub struct SymbolModel {
    pub functions: IndexMap<String, FunctionRecord>,
    pub variables: IndexMap<String, VariableRecord>,
    pub types: IndexMap<String, TypeRecord>,
}

impl SymbolModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any previous record for `name`, calls included.
    pub fn upsert_function(&mut self, name: &str, record: FunctionRecord) {
        self.functions.insert(name.to_string(), record);
    }

    /// Replace the record for `name`, except that a record without a storage
    /// class inherits the one already stored.
    pub fn upsert_variable(&mut self, name: &str, mut record: VariableRecord) {
        if record.class.is_none() {
            record.class = self.variables.get(name).and_then(|prev| prev.class);
        }
        self.variables.insert(name.to_string(), record);
    }

    pub fn upsert_type(&mut self, name: &str, record: TypeRecord) {
        self.types.insert(name.to_string(), record);
    }

    pub fn push_call(&mut self, function: &str, callee: &str) {
        if let Some(record) = self.functions.get_mut(function) {
            record.calls.push(callee.to_string());
        }
    }

    pub fn into_document(self, name: &str) -> Document {
        Document {
            name: name.to_string(),
            functions: self.functions,
            variables: self.variables,
            types: self.types,
            headers: Vec::new(),
        }
    }
}

/// Serialized output for one target file.
#[derive(Debug, Serialize)]
pub struct Document {
    /// Basename of the target file.
    pub name: String,
    pub functions: IndexMap<String, FunctionRecord>,
    pub variables: IndexMap<String, VariableRecord>,
    pub types: IndexMap<String, TypeRecord>,
    /// Reserved; always empty.
    pub headers: Vec<String>,
}
