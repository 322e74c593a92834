//! Schema model: records, enums and the field specifications that drive decoding.

use crate::error::SchemaError;
use crate::expr::Expr;
use crate::text::Encoding;
use std::collections::HashMap;

/// Root schema definition: records and enums. The first record is the root.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub records: Vec<RecordDef>,
    pub enums: Vec<EnumDef>,
}

#[derive(Debug, Clone)]
pub struct RecordDef {
    pub name: String,
    pub fields: Vec<FieldSpec>,
}

impl RecordDef {
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        RecordDef {
            name: name.into(),
            fields,
        }
    }
}

/// Enumerated type. A decoded index past the last variant clamps to it.
#[derive(Debug, Clone)]
pub struct EnumDef {
    pub name: String,
    pub variants: Vec<String>,
}

/// A fixed or computed count (bytes or elements).
#[derive(Debug, Clone)]
pub enum Count {
    Fixed(u64),
    Dynamic(Expr),
}

impl From<u64> for Count {
    fn from(n: u64) -> Self {
        Count::Fixed(n)
    }
}

impl From<Expr> for Count {
    fn from(e: Expr) -> Self {
        match e.as_constant_u64() {
            Some(n) => Count::Fixed(n),
            None => Count::Dynamic(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Bool,
    Char,
}

impl ScalarType {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "u8" => ScalarType::U8,
            "u16" => ScalarType::U16,
            "u32" => ScalarType::U32,
            "u64" => ScalarType::U64,
            "i8" => ScalarType::I8,
            "i16" => ScalarType::I16,
            "i32" => ScalarType::I32,
            "i64" => ScalarType::I64,
            "f32" | "float" => ScalarType::F32,
            "f64" | "double" => ScalarType::F64,
            "bool" => ScalarType::Bool,
            "char" => ScalarType::Char,
            _ => return None,
        })
    }

    /// Natural width in bytes.
    pub fn width(&self) -> u64 {
        match self {
            ScalarType::U8 | ScalarType::I8 | ScalarType::Bool => 1,
            ScalarType::U16 | ScalarType::I16 | ScalarType::Char => 2,
            ScalarType::U32 | ScalarType::I32 | ScalarType::F32 => 4,
            ScalarType::U64 | ScalarType::I64 | ScalarType::F64 => 8,
        }
    }
}

/// Field type specification.
#[derive(Debug, Clone)]
pub enum FieldType {
    Scalar(ScalarType),
    String,
    Bytes,
    /// Consumes its byte count and produces no value.
    Skip,
    /// Reference to a record or enum by name.
    Named(String),
    List(Box<FieldSpec>),
    /// Like a list, but keyed by the field's key expression.
    Map(Box<FieldSpec>),
    Switch(Vec<SwitchCase>),
}

impl FieldType {
    pub fn named(name: impl Into<String>) -> Self {
        FieldType::Named(name.into())
    }

    /// Label used for a switch case and in diagnostics.
    pub fn label(&self) -> String {
        match self {
            FieldType::Scalar(s) => format!("{:?}", s).to_lowercase(),
            FieldType::String => "string".to_string(),
            FieldType::Bytes => "bytes".to_string(),
            FieldType::Skip => "skip".to_string(),
            FieldType::Named(n) => n.clone(),
            FieldType::List(e) => format!("list<{}>", e.ty.label()),
            FieldType::Map(e) => format!("map<{}>", e.ty.label()),
            FieldType::Switch(_) => "switch".to_string(),
        }
    }
}

/// One arm of a type switch; the first arm whose test is true is decoded.
#[derive(Debug, Clone)]
pub struct SwitchCase {
    pub test: Expr,
    pub ty: FieldType,
}

/// A field of a record (or the element of a list/map).
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub ty: FieldType,
    /// Bytes the value occupies; decoded inside a range of this size.
    pub byte_count: Option<Count>,
    /// Element count for lists and maps.
    pub size: Option<Count>,
    pub read_if: Option<Expr>,
    pub stop_if: Option<Expr>,
    pub matches: Option<Expr>,
    pub key: Option<Expr>,
    pub encoding: Encoding,
    pub debug: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        FieldSpec {
            name: name.into(),
            ty,
            byte_count: None,
            size: None,
            read_if: None,
            stop_if: None,
            matches: None,
            key: None,
            encoding: Encoding::default(),
            debug: false,
        }
    }

    pub fn scalar(name: impl Into<String>, ty: ScalarType) -> Self {
        Self::new(name, FieldType::Scalar(ty))
    }

    pub fn bytes(mut self, count: impl Into<Count>) -> Self {
        self.byte_count = Some(count.into());
        self
    }

    pub fn size(mut self, count: impl Into<Count>) -> Self {
        self.size = Some(count.into());
        self
    }

    pub fn read_if(mut self, e: Expr) -> Self {
        self.read_if = Some(e);
        self
    }

    pub fn stop_if(mut self, e: Expr) -> Self {
        self.stop_if = Some(e);
        self
    }

    pub fn matches(mut self, e: Expr) -> Self {
        self.matches = Some(e);
        self
    }

    pub fn key(mut self, e: Expr) -> Self {
        self.key = Some(e);
        self
    }

    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn debug(mut self) -> Self {
        self.debug = true;
        self
    }
}

/// Resolved schema: records and enums by name, references checked.
#[derive(Debug, Clone)]
pub struct ResolvedSchema {
    pub schema: Schema,
    pub records_by_name: HashMap<String, usize>,
    pub enums_by_name: HashMap<String, usize>,
}

impl ResolvedSchema {
    pub fn resolve(schema: Schema) -> Result<Self, SchemaError> {
        if schema.records.is_empty() {
            return Err(SchemaError::NoRecords);
        }
        let mut records_by_name = HashMap::new();
        let mut enums_by_name = HashMap::new();
        for (i, r) in schema.records.iter().enumerate() {
            if records_by_name.insert(r.name.clone(), i).is_some() {
                return Err(SchemaError::DuplicateName(r.name.clone()));
            }
        }
        for (i, e) in schema.enums.iter().enumerate() {
            if e.variants.is_empty() {
                return Err(SchemaError::EmptyEnum(e.name.clone()));
            }
            if records_by_name.contains_key(&e.name) || enums_by_name.insert(e.name.clone(), i).is_some() {
                return Err(SchemaError::DuplicateName(e.name.clone()));
            }
        }
        let resolved = ResolvedSchema {
            schema,
            records_by_name,
            enums_by_name,
        };
        for r in &resolved.schema.records {
            for f in &r.fields {
                resolved.check_type(&r.name, &f.name, &f.ty)?;
            }
        }
        Ok(resolved)
    }

    fn check_type(&self, record: &str, field: &str, ty: &FieldType) -> Result<(), SchemaError> {
        match ty {
            FieldType::Named(name) => {
                if self.records_by_name.contains_key(name) || self.enums_by_name.contains_key(name) {
                    Ok(())
                } else {
                    Err(SchemaError::UnknownType {
                        record: record.to_string(),
                        field: field.to_string(),
                        name: name.clone(),
                    })
                }
            }
            FieldType::List(e) | FieldType::Map(e) => self.check_type(record, field, &e.ty),
            FieldType::Switch(cases) => cases
                .iter()
                .try_for_each(|c| self.check_type(record, field, &c.ty)),
            _ => Ok(()),
        }
    }

    /// The record decoded by default: the first one declared.
    pub fn root(&self) -> &RecordDef {
        &self.schema.records[0]
    }

    pub fn get_record(&self, name: &str) -> Option<&RecordDef> {
        self.records_by_name
            .get(name)
            .map(|&i| &self.schema.records[i])
    }

    pub fn get_enum(&self, name: &str) -> Option<&EnumDef> {
        self.enums_by_name.get(name).map(|&i| &self.schema.enums[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_rejects_unknown_and_duplicate_types() {
        let bad = Schema {
            records: vec![RecordDef::new(
                "Root",
                vec![FieldSpec::new("items", FieldType::List(Box::new(FieldSpec::new("", FieldType::named("Missing")))))],
            )],
            enums: vec![],
        };
        assert!(matches!(
            ResolvedSchema::resolve(bad),
            Err(SchemaError::UnknownType { name, .. }) if name == "Missing"
        ));

        let dup = Schema {
            records: vec![RecordDef::new("A", vec![])],
            enums: vec![EnumDef {
                name: "A".into(),
                variants: vec!["X".into()],
            }],
        };
        assert_eq!(ResolvedSchema::resolve(dup).unwrap_err(), SchemaError::DuplicateName("A".into()));
        assert_eq!(ResolvedSchema::resolve(Schema::default()).unwrap_err(), SchemaError::NoRecords);
    }

    #[test]
    fn constant_expression_becomes_fixed_count() {
        assert!(matches!(Count::from(Expr::int(4)), Count::Fixed(4)));
        assert!(matches!(Count::from(Expr::path("n")), Count::Dynamic(_)));
    }
}
