//! # chunkio: declarative chunk-based binary decoding
//!
//! A schema DSL describing binary record layouts (fields with fixed or computed
//! byte lengths, conditional fields, lists, keyed maps, type switches and
//! match constraints) parsed with a PEST grammar, plus a decoder that reads
//! values of that shape from a byte stream through a range-limited reader.
//!
//! ## DSL structure
//!
//! - **Records**: named, ordered field lists. The first record is the root.
//! - **Enums**: named variant lists, decoded from an index.
//!
//! ## Field types
//!
//! - Scalars: `u8`, `u16`, `u32`, `u64`, `i8`, `i16`, `i32`, `i64`, `f32`, `f64`, `bool`, `char`
//! - `string` (needs `@bytes`), `bytes`, `skip`
//! - Record and enum references, `list<T>`, `map<T>`, `switch { test => T, ... }`
//!
//! ## Attributes
//!
//! `@bytes(expr)`, `@size(expr)`, `@if(expr)`, `@stop_if(expr)`, `@match(expr)`,
//! `@key(expr)`, `@encoding("UTF-8")`, `@debug`
//!
//! ## Example DSL
//!
//! ```text
//! record File {
//!   signature: string @bytes(4) @match("ABCD");
//!   version: u32;
//!   count: u32;
//!   items: list<u32> @size(count);
//! }
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! let schema = chunkio::parse_schema("record R { n: u16; }").unwrap();
//! let record = chunkio::decode(&b"\x00\x2a"[..], &schema).unwrap();
//! assert_eq!(record.get("n"), Some(&chunkio::Value::U16(42)));
//! ```

pub mod ast;
pub mod decoder;
pub mod dump;
pub mod error;
pub mod expr;
pub mod parser;
pub mod ranged;
pub mod text;
pub mod value;

pub use ast::{FieldSpec, FieldType, ResolvedSchema, Schema};
pub use decoder::{decode, ChunkDecoder, DecodeOptions};
pub use error::{DecodeError, ErrorCategory, FieldPath, PathSegment, SchemaError};
pub use expr::Expr;
pub use parser::{parse, parse_schema};
pub use ranged::{ByteSource, RangedReader};
pub use text::Encoding;
pub use value::{Entries, Record, Value};
