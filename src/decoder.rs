//! Decode records from a byte stream by walking a resolved schema field by field.
//!
//! Every field with a byte count is decoded inside its own range on the
//! [`RangedReader`], so a field always advances the stream by exactly its
//! declared size: short content is skipped when the range closes and reads past
//! the end of the range fail.

use crate::ast::{Count, EnumDef, FieldSpec, FieldType, RecordDef, ResolvedSchema, ScalarType, SwitchCase};
use crate::error::{DecodeError, PathSegment};
use crate::expr::{Expr, Scope};
use crate::ranged::{ByteSource, RangedReader};
use crate::value::{Entries, Record, Value};
use std::collections::HashMap;

/// Elements that consume no bytes allowed in one sized list or map. A count
/// read from the input cannot otherwise be bounded by the bytes left.
pub const MAX_EMPTY_ELEMENTS: u64 = 4096;

/// Caller-side knobs for a decode.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// External parameters, visible to expressions as `$name`.
    pub params: HashMap<String, Value>,
    /// Maximum record nesting.
    pub max_depth: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            params: HashMap::new(),
            max_depth: 64,
        }
    }
}

/// Decode the schema's root record from `source`.
pub fn decode<R: ByteSource>(source: R, schema: &ResolvedSchema) -> Result<Record, DecodeError> {
    ChunkDecoder::new(schema).decode(source)
}

#[derive(Debug, Clone)]
pub struct ChunkDecoder<'s> {
    schema: &'s ResolvedSchema,
    options: DecodeOptions,
}

impl<'s> ChunkDecoder<'s> {
    pub fn new(schema: &'s ResolvedSchema) -> Self {
        ChunkDecoder {
            schema,
            options: DecodeOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DecodeOptions) -> Self {
        self.options = options;
        self
    }

    /// Set one external parameter.
    pub fn param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.options.params.insert(name.into(), value);
        self
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    /// Decode the root record (the first one declared).
    pub fn decode<R: ByteSource>(&self, source: R) -> Result<Record, DecodeError> {
        self.decode_record(&self.schema.root().name, source)
    }

    /// Decode the record named `name` from a fresh reader over `source`.
    pub fn decode_record<R: ByteSource>(&self, name: &str, source: R) -> Result<Record, DecodeError> {
        let mut reader = RangedReader::new(source);
        self.decode_from(name, &mut reader)
    }

    /// Decode one record from an existing reader, leaving it positioned right
    /// after the record. After an error the reader's position is unspecified.
    pub fn decode_from<R: ByteSource>(
        &self,
        name: &str,
        reader: &mut RangedReader<R>,
    ) -> Result<Record, DecodeError> {
        let schema = self.schema;
        let def = schema
            .get_record(name)
            .ok_or_else(|| DecodeError::contract(format!("unknown record {}", name)))?;
        let start = reader.position();
        let mut session = Session {
            schema,
            params: &self.options.params,
            max_depth: self.options.max_depth,
            reader,
            frames: Vec::new(),
        };
        session
            .record(def)
            .map_err(|e| e.within(PathSegment::Record(def.name.clone()), start))
    }
}

/// State of one decode call: the reader plus the records being built,
/// outermost first.
struct Session<'a, R> {
    schema: &'a ResolvedSchema,
    params: &'a HashMap<String, Value>,
    max_depth: usize,
    reader: &'a mut RangedReader<R>,
    frames: Vec<Record>,
}

impl<'a, R: ByteSource> Session<'a, R> {
    fn record(&mut self, def: &RecordDef) -> Result<Record, DecodeError> {
        if self.frames.len() >= self.max_depth {
            return Err(DecodeError::contract(format!(
                "record nesting deeper than {} at {}",
                self.max_depth, def.name
            )));
        }
        self.frames.push(Record::new(def.name.clone()));
        let result = self.fields(def);
        let record = self
            .frames
            .pop()
            .ok_or_else(|| DecodeError::contract("record stack underflow"))?;
        result.map(|()| record)
    }

    fn fields(&mut self, def: &RecordDef) -> Result<(), DecodeError> {
        for field in &def.fields {
            let start = self.reader.position();
            let keep_going = self
                .field(field)
                .map_err(|e| e.within(PathSegment::Field(field.name.clone()), start))?;
            if !keep_going {
                break;
            }
        }
        Ok(())
    }

    /// Decode one record field; returns false when its stop predicate fired.
    fn field(&mut self, field: &FieldSpec) -> Result<bool, DecodeError> {
        if let Some(guard) = &field.read_if {
            if !self.predicate(guard)? {
                return Ok(true);
            }
        }
        if let Some(value) = self.field_value(field)? {
            let record = self.current()?;
            if field.debug {
                eprintln!("{}.{} = {}", record.name, field.name, value);
            }
            record.insert(field.name.clone(), value);
        }
        match &field.stop_if {
            Some(stop) => Ok(!self.predicate(stop)?),
            None => Ok(true),
        }
    }

    /// Range-scope, decode and validate a field or collection element.
    fn field_value(&mut self, field: &FieldSpec) -> Result<Option<Value>, DecodeError> {
        let byte_count = match &field.byte_count {
            Some(c) => Some(self.count(c)?),
            None => None,
        };
        let value = match byte_count {
            Some(n) => {
                self.reader.push_range(n)?;
                let value = self.value(field, &field.ty, Some(n))?;
                self.reader.pop_range()?;
                value
            }
            None => self.value(field, &field.ty, None)?,
        };
        if let (Some(expected), Some(actual)) = (&field.matches, &value) {
            let expected = self.eval(expected, None)?;
            if !actual.loosely_equals(&expected) {
                let record = self.frames.last().map(|r| r.name.as_str()).unwrap_or("");
                return Err(DecodeError::Validation {
                    field: format!("{}.{}", record, field.name),
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
        }
        Ok(value)
    }

    fn value(&mut self, field: &FieldSpec, ty: &FieldType, n: Option<u64>) -> Result<Option<Value>, DecodeError> {
        match ty {
            FieldType::Scalar(s) => self.scalar(*s, n).map(Some),
            FieldType::String => {
                let n = n.ok_or_else(|| {
                    DecodeError::contract(format!("string field {} has no byte count", field.name))
                })?;
                let s = self.reader.read_string(n, field.encoding)?;
                Ok(Some(Value::String(s)))
            }
            FieldType::Bytes => {
                let bytes = match n {
                    Some(n) => self.reader.read_vec(n)?,
                    None => self.reader.read_remaining()?,
                };
                Ok(Some(Value::Bytes(bytes)))
            }
            FieldType::Skip => match n {
                // closing the range consumes the bytes
                Some(_) => Ok(None),
                None => Err(DecodeError::contract(format!(
                    "skip field {} has no byte count",
                    field.name
                ))),
            },
            FieldType::Named(name) => self.named(name, n).map(Some),
            FieldType::List(element) => self.list(field, element).map(Some),
            FieldType::Map(element) => self.map(field, element).map(Some),
            FieldType::Switch(cases) => self.switch(field, cases, n),
        }
    }

    fn scalar(&mut self, ty: ScalarType, n: Option<u64>) -> Result<Value, DecodeError> {
        match n {
            Some(0) => Err(DecodeError::contract("scalar with a byte count of 0")),
            Some(n) if n < ty.width() => self.narrow_scalar(ty, n),
            // a full 2, 4 or 8 byte flag is true when any byte is set
            Some(n @ (2 | 4 | 8)) if ty == ScalarType::Bool => Ok(Value::Bool(self.reader.read_uint(n as usize)? != 0)),
            // wider than natural: the range skips the rest
            _ => self.natural_scalar(ty),
        }
    }

    fn natural_scalar(&mut self, ty: ScalarType) -> Result<Value, DecodeError> {
        let r = &mut *self.reader;
        Ok(match ty {
            ScalarType::U8 => Value::U8(r.read_u8()?),
            ScalarType::U16 => Value::U16(r.read_u16()?),
            ScalarType::U32 => Value::U32(r.read_u32()?),
            ScalarType::U64 => Value::U64(r.read_u64()?),
            ScalarType::I8 => Value::I8(r.read_i8()?),
            ScalarType::I16 => Value::I16(r.read_i16()?),
            ScalarType::I32 => Value::I32(r.read_i32()?),
            ScalarType::I64 => Value::I64(r.read_i64()?),
            ScalarType::F32 => Value::Float(r.read_f32()?),
            ScalarType::F64 => Value::Double(r.read_f64()?),
            ScalarType::Bool => Value::Bool(r.read_bool()?),
            ScalarType::Char => Value::Char(r.read_char()?),
        })
    }

    /// `n` bytes read unsigned and widened to `ty`.
    fn narrow_scalar(&mut self, ty: ScalarType, n: u64) -> Result<Value, DecodeError> {
        if ty == ScalarType::F64 && n == 4 {
            return Ok(Value::Double(self.reader.read_f32()? as f64));
        }
        if matches!(ty, ScalarType::F32 | ScalarType::F64) {
            return Err(DecodeError::contract(format!("{}-byte floating point value", n)));
        }
        let raw = self.reader.read_uint(n as usize)?;
        Ok(match ty {
            ScalarType::U16 => Value::U16(raw as u16),
            ScalarType::U32 => Value::U32(raw as u32),
            ScalarType::U64 => Value::U64(raw),
            ScalarType::I16 => Value::I16(raw as i16),
            ScalarType::I32 => Value::I32(raw as i32),
            ScalarType::I64 => Value::I64(raw as i64),
            ScalarType::Char => Value::Char(char::from(raw as u8)),
            other => {
                return Err(DecodeError::contract(format!(
                    "{:?} cannot be narrowed to {} bytes",
                    other, n
                )))
            }
        })
    }

    fn named(&mut self, name: &str, n: Option<u64>) -> Result<Value, DecodeError> {
        let schema = self.schema;
        if let Some(def) = schema.get_record(name) {
            return self.record(def).map(Value::Record);
        }
        if let Some(def) = schema.get_enum(name) {
            return self.enumeration(def, n);
        }
        Err(DecodeError::contract(format!("unknown type {}", name)))
    }

    /// Index width follows the byte count; out-of-range indices clamp.
    fn enumeration(&mut self, def: &EnumDef, n: Option<u64>) -> Result<Value, DecodeError> {
        let raw: i64 = match n {
            Some(0) => return Err(DecodeError::contract(format!("enum {} with a byte count of 0", def.name))),
            Some(1) => self.reader.read_u8()? as i64,
            Some(2) => self.reader.read_u16()? as i64,
            Some(3) => self.reader.read_uint(3)? as i64,
            _ => self.reader.read_i32()? as i64,
        };
        let last = def.variants.len().saturating_sub(1);
        let index = raw.clamp(0, last as i64) as usize;
        let name = def
            .variants
            .get(index)
            .cloned()
            .ok_or_else(|| DecodeError::contract(format!("enum {} has no variants", def.name)))?;
        Ok(Value::Enum {
            ty: def.name.clone(),
            name,
            index: index as u32,
        })
    }

    fn list(&mut self, field: &FieldSpec, element: &FieldSpec) -> Result<Value, DecodeError> {
        let mut items = Vec::new();
        self.each_element(field, element, |_, v| {
            items.push(v);
            Ok(())
        })?;
        Ok(Value::List(items))
    }

    fn map(&mut self, field: &FieldSpec, element: &FieldSpec) -> Result<Value, DecodeError> {
        let key = field
            .key
            .as_ref()
            .or(element.key.as_ref())
            .ok_or_else(|| DecodeError::contract(format!("map field {} has no key expression", field.name)))?;
        let mut entries = Entries::new();
        self.each_element(field, element, |session, v| {
            let k = session.eval(key, Some(&v))?;
            entries.insert(k.to_string(), v);
            Ok(())
        })?;
        Ok(Value::Map(entries))
    }

    /// Decode `field.size` elements, or while the current range has bytes left.
    /// An unsized collection may not hold an element that consumes no bytes; a
    /// sized one may hold at most [`MAX_EMPTY_ELEMENTS`] of them.
    fn each_element<F>(&mut self, field: &FieldSpec, element: &FieldSpec, mut sink: F) -> Result<(), DecodeError>
    where
        F: FnMut(&mut Self, Value) -> Result<(), DecodeError>,
    {
        let size = match &field.size {
            Some(c) => Some(self.count(c)?),
            None => None,
        };
        let mut index = 0u64;
        let mut empty = 0u64;
        loop {
            match size {
                Some(n) if index >= n => break,
                None if self.reader.available() == 0 => break,
                _ => {}
            }
            let start = self.reader.position();
            let at = |e: DecodeError| e.within(PathSegment::Index(index), start);
            let value = self.field_value(element).map_err(at)?;
            if self.reader.position() == start {
                empty += 1;
                if size.is_none() || empty > MAX_EMPTY_ELEMENTS {
                    return Err(at(DecodeError::contract(format!(
                        "{} element(s) of {} consumed no bytes",
                        empty, field.name
                    ))));
                }
            }
            if let Some(v) = value {
                sink(&mut *self, v).map_err(at)?;
            }
            index += 1;
        }
        Ok(())
    }

    /// First case whose test holds; without one, nothing is stored.
    fn switch(&mut self, field: &FieldSpec, cases: &[SwitchCase], n: Option<u64>) -> Result<Option<Value>, DecodeError> {
        for case in cases {
            if self.predicate(&case.test)? {
                let value = self.value(field, &case.ty, n)?;
                return Ok(value.map(|v| Value::Variant {
                    case: case.ty.label(),
                    value: Box::new(v),
                }));
            }
        }
        Ok(None)
    }

    fn current(&mut self) -> Result<&mut Record, DecodeError> {
        self.frames
            .last_mut()
            .ok_or_else(|| DecodeError::contract("field decoded outside of a record"))
    }

    fn count(&self, count: &Count) -> Result<u64, DecodeError> {
        match count {
            Count::Fixed(n) => Ok(*n),
            Count::Dynamic(e) => {
                let v = self.eval(e, None)?;
                v.as_u64().ok_or_else(|| DecodeError::Expression {
                    expr: e.to_string(),
                    reason: format!("expected a non-negative integer, got {}", v),
                })
            }
        }
    }

    fn predicate(&self, e: &Expr) -> Result<bool, DecodeError> {
        let v = self.eval(e, None)?;
        v.as_bool().ok_or_else(|| DecodeError::Expression {
            expr: e.to_string(),
            reason: format!("expected a boolean, got {}", v),
        })
    }

    fn eval(&self, e: &Expr, element: Option<&Value>) -> Result<Value, DecodeError> {
        let scope = Scope::new(&self.frames, self.params);
        let scope = match element {
            Some(v) => scope.with_element(v),
            None => scope,
        };
        e.eval(&scope).map_err(|reason| DecodeError::Expression {
            expr: e.to_string(),
            reason,
        })
    }
}
