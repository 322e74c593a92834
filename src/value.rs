//! Decoded values.

use std::collections::HashMap;
use std::fmt;

/// A single decoded value (field, element or record).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Bool(bool),
    Char(char),
    Float(f32),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    /// Enum index clamped into the declared variants.
    Enum { ty: String, name: String, index: u32 },
    Record(Record),
    List(Vec<Value>),
    Map(Entries),
    /// Payload of a type switch, tagged with the case that matched.
    Variant { case: String, value: Box<Value> },
}

impl Value {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U8(x) => Some(*x as u64),
            Value::U16(x) => Some(*x as u64),
            Value::U32(x) => Some(*x as u64),
            Value::U64(x) => Some(*x),
            Value::I8(_) | Value::I16(_) | Value::I32(_) | Value::I64(_) => {
                self.as_i64().and_then(|v| u64::try_from(v).ok())
            }
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I8(x) => Some(*x as i64),
            Value::I16(x) => Some(*x as i64),
            Value::I32(x) => Some(*x as i64),
            Value::I64(x) => Some(*x),
            Value::U8(x) => Some(*x as i64),
            Value::U16(x) => Some(*x as i64),
            Value::U32(x) => Some(*x as i64),
            Value::U64(x) => i64::try_from(*x).ok(),
            _ => None,
        }
    }

    /// Any integer (or char / enum index) widened to 128 bits.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::U64(x) => Some(*x as i128),
            Value::Char(c) => Some(*c as u32 as i128),
            Value::Enum { index, .. } => Some(*index as i128),
            other => other.as_i64().map(|v| v as i128),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x as f64),
            Value::Double(x) => Some(*x),
            other => other.as_i128().map(|v| v as f64),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::Enum { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            Value::Variant { value, .. } => value.as_record(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Entries> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Value::U8(_)
                | Value::U16(_)
                | Value::U32(_)
                | Value::U64(_)
                | Value::I8(_)
                | Value::I16(_)
                | Value::I32(_)
                | Value::I64(_)
        )
    }

    fn is_float(&self) -> bool {
        matches!(self, Value::Float(_) | Value::Double(_))
    }

    /// Named member of a record, map entry or switch payload.
    pub fn member(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Record(r) => r.get(name),
            Value::Map(m) => m.get(name),
            Value::Variant { value, .. } => value.member(name),
            _ => None,
        }
    }

    /// Equality as used by match constraints and `==` in expressions: numbers
    /// compare by value across widths, byte arrays compare with the bytes of a
    /// string, enums with their variant name or index.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_integer() && b.is_integer() => a.as_i128() == b.as_i128(),
            (a, b) if (a.is_float() || b.is_float()) && a.as_f64().is_some() && b.as_f64().is_some() => {
                a.as_f64() == b.as_f64()
            }
            (Value::Bytes(b), Value::String(s)) | (Value::String(s), Value::Bytes(b)) => {
                string_bytes(s).as_deref() == Some(b.as_slice())
            }
            (Value::Enum { name, .. }, Value::String(s)) | (Value::String(s), Value::Enum { name, .. }) => {
                name == s
            }
            (Value::Enum { index, .. }, n) | (n, Value::Enum { index, .. }) if n.is_integer() => {
                n.as_i128() == Some(*index as i128)
            }
            (Value::Char(c), Value::String(s)) | (Value::String(s), Value::Char(c)) => {
                let mut it = s.chars();
                it.next() == Some(*c) && it.next().is_none()
            }
            (Value::Char(c), n) | (n, Value::Char(c)) if n.is_integer() => n.as_i128() == Some(*c as u32 as i128),
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loosely_equals(y))
            }
            (Value::Bytes(a), Value::List(b)) | (Value::List(b), Value::Bytes(a)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| y.as_i128() == Some(*x as i128))
            }
            (Value::Variant { value, .. }, other) | (other, Value::Variant { value, .. }) => {
                value.loosely_equals(other)
            }
            (a, b) => a == b,
        }
    }
}

/// Latin-1 bytes of `s`, if every character fits in one byte.
fn string_bytes(s: &str) -> Option<Vec<u8>> {
    s.chars().map(|c| u8::try_from(c as u32).ok()).collect()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::U8(x) => write!(f, "{}", x),
            Value::U16(x) => write!(f, "{}", x),
            Value::U32(x) => write!(f, "{}", x),
            Value::U64(x) => write!(f, "{}", x),
            Value::I8(x) => write!(f, "{}", x),
            Value::I16(x) => write!(f, "{}", x),
            Value::I32(x) => write!(f, "{}", x),
            Value::I64(x) => write!(f, "{}", x),
            Value::Bool(x) => write!(f, "{}", x),
            Value::Char(x) => write!(f, "{}", x),
            Value::Float(x) => write!(f, "{}", x),
            Value::Double(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{}", s),
            Value::Bytes(b) => {
                write!(f, "0x")?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            Value::Enum { name, .. } => write!(f, "{}", name),
            Value::Record(r) => write!(f, "{}", r),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Variant { case, value } => write!(f, "{}({})", case, value),
        }
    }
}

/// String-keyed entries that iterate in insertion order and look up by key.
/// Inserting an existing key replaces its value in place.
#[derive(Debug, Clone, Default)]
pub struct Entries {
    items: Vec<(String, Value)>,
    index: HashMap<String, usize>,
}

impl Entries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, value: Value) {
        match self.index.get(&key) {
            Some(&i) => self.items[i].1 = value,
            None => {
                self.index.insert(key.clone(), self.items.len());
                self.items.push((key, value));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.index.get(key).map(|&i| &self.items[i].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl PartialEq for Entries {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl FromIterator<(String, Value)> for Entries {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut out = Entries::new();
        for (k, v) in iter {
            out.insert(k, v);
        }
        out
    }
}

/// A decoded record: its schema name and fields in declaration order.
/// Fields skipped by a read guard, or never reached after a stop predicate, are absent.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub name: String,
    pub fields: Entries,
}

impl Record {
    pub fn new(name: impl Into<String>) -> Self {
        Record {
            name: name.into(),
            fields: Entries::new(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.name)?;
        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, " {}: {}", k, v)?;
        }
        write!(f, " }}")
    }
}
