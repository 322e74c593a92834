//! Integration tests: parse a schema, decode byte streams, check values and errors.

use chunkio::text::encode_modified_utf8;
use chunkio::{
    decode, parse_schema, ChunkDecoder, DecodeError, DecodeOptions, ErrorCategory, RangedReader, ResolvedSchema,
    Value,
};
use std::io::Write;

fn schema(src: &str) -> ResolvedSchema {
    parse_schema(src).expect("schema")
}

const FILE_SCHEMA: &str = r#"
record File {
  signature: string @bytes(4);
  version: u32;
  count: u32;
  items: list<u32> @size(count);
}
"#;

fn file_bytes() -> Vec<u8> {
    let mut b = b"ABCD".to_vec();
    b.extend_from_slice(&[0, 0, 0, 1]);
    b.extend_from_slice(&[0, 0, 0, 2]);
    b.extend_from_slice(&[0x11, 0x11, 0x11, 0x11]);
    b.extend_from_slice(&[0x22, 0x22, 0x22, 0x22]);
    b
}

#[test]
fn test_end_to_end_header_and_list() {
    let s = schema(FILE_SCHEMA);
    let bytes = file_bytes();
    let record = decode(&bytes[..], &s).expect("decode");
    assert_eq!(record.name, "File");
    assert_eq!(record.get("signature"), Some(&Value::String("ABCD".into())));
    assert_eq!(record.get("version"), Some(&Value::U32(1)));
    assert_eq!(record.get("count"), Some(&Value::U32(2)));
    assert_eq!(
        record.get("items"),
        Some(&Value::List(vec![Value::U32(0x11111111), Value::U32(0x22222222)]))
    );
    let names: Vec<&str> = record.fields.keys().collect();
    assert_eq!(names, ["signature", "version", "count", "items"]);
}

#[test]
fn test_truncated_list_reports_path_and_offset() {
    let s = schema(FILE_SCHEMA);
    let bytes = file_bytes();
    let err = decode(&bytes[..bytes.len() - 2], &s).unwrap_err();
    assert!(matches!(err.root_cause(), DecodeError::UnexpectedEndOfStream));
    assert_eq!(err.category(), ErrorCategory::Data);
    assert_eq!(err.path().expect("path").to_string(), "File.items[1]");
    assert_eq!(err.offset(), Some(16));
}

#[test]
fn test_stop_predicate_short_circuits() {
    let s = schema("record S { a: u8; b: u8 @stop_if(true); c: u32; }");
    let record = decode(&[1u8, 2][..], &s).expect("decode");
    assert_eq!(record.get("a"), Some(&Value::U8(1)));
    assert_eq!(record.get("b"), Some(&Value::U8(2)));
    assert!(!record.contains("c"));
}

#[test]
fn test_stop_predicate_sees_its_own_field() {
    let s = schema("record S { n: u8 @stop_if(n == 0); rest: u16; }");
    let stopped = decode(&[0u8][..], &s).expect("decode");
    assert_eq!(stopped.len(), 1);
    let full = decode(&[1u8, 0, 7][..], &s).expect("decode");
    assert_eq!(full.get("rest"), Some(&Value::U16(7)));
}

#[test]
fn test_read_guard_skips_field_without_consuming() {
    let s = schema("record G { a: u8; b: u32 @if(false); c: u8; }");
    let record = decode(&[1u8, 3][..], &s).expect("decode");
    assert_eq!(record.get("a"), Some(&Value::U8(1)));
    assert!(!record.contains("b"));
    assert_eq!(record.get("c"), Some(&Value::U8(3)));
}

#[test]
fn test_guarded_field_does_not_evaluate_stop() {
    let s = schema("record G { b: u8 @if(false) @stop_if(true); c: u8; }");
    let record = decode(&[9u8][..], &s).expect("decode");
    assert_eq!(record.get("c"), Some(&Value::U8(9)));
}

const UNION_SCHEMA: &str = r#"
record U {
  tag: u8;
  body: switch { tag == 1 => u16, tag == 2 => Pair } @bytes(4);
  after: u8;
}
record Pair { a: u8; b: u8; }
"#;

#[test]
fn test_union_without_match_consumes_declared_width() {
    let s = schema(UNION_SCHEMA);
    let record = decode(&[9u8, 0xAA, 0xBB, 0xCC, 0xDD, 0x7F][..], &s).expect("decode");
    assert!(!record.contains("body"));
    assert_eq!(record.get("after"), Some(&Value::U8(0x7F)));
}

#[test]
fn test_union_picks_first_matching_case() {
    let s = schema(UNION_SCHEMA);
    let record = decode(&[1u8, 0xAA, 0xBB, 0xCC, 0xDD, 0x7F][..], &s).expect("decode");
    assert_eq!(
        record.get("body"),
        Some(&Value::Variant {
            case: "u16".into(),
            value: Box::new(Value::U16(0xAABB)),
        })
    );
    assert_eq!(record.get("after"), Some(&Value::U8(0x7F)));

    let record = decode(&[2u8, 0x01, 0x02, 0, 0, 0x7F][..], &s).expect("decode");
    let body = record.get("body").expect("body");
    assert!(matches!(body, Value::Variant { case, .. } if case == "Pair"));
    assert_eq!(body.member("b"), Some(&Value::U8(2)));
}

#[test]
fn test_match_constraint() {
    let s = schema("record M { v: u8 @match(4); }");
    assert!(decode(&[4u8][..], &s).is_ok());
    let err = decode(&[5u8][..], &s).unwrap_err();
    match err.root_cause() {
        DecodeError::Validation { field, expected, actual } => {
            assert_eq!(field, "M.v");
            assert_eq!(expected, "4");
            assert_eq!(actual, "5");
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    assert_eq!(err.category(), ErrorCategory::Data);
    assert_eq!(err.path().expect("path").to_string(), "M.v");
}

#[test]
fn test_match_string_signature() {
    let s = schema(r#"record H { signature: string @bytes(4) @match("8BPS"); version: u16 @match(1); }"#);
    assert!(decode(&b"8BPS\x00\x01"[..], &s).is_ok());
    let err = decode(&b"8BPX\x00\x01"[..], &s).unwrap_err();
    assert!(matches!(err.root_cause(), DecodeError::Validation { .. }));
}

#[test]
fn test_match_bytes_against_string() {
    let s = schema(r#"record H { magic: bytes @bytes(4) @match("8BPS"); }"#);
    let record = decode(&b"8BPS"[..], &s).expect("decode");
    assert_eq!(record.get("magic"), Some(&Value::Bytes(b"8BPS".to_vec())));
    let err = decode(&b"8BPZ"[..], &s).unwrap_err();
    match err.root_cause() {
        DecodeError::Validation { field, .. } => assert_eq!(field, "H.magic"),
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn test_match_lists_element_wise() {
    let s = schema(
        "record D { magic: bytes @bytes(2); copy: list<u8> @size(2) @match(magic); wide: list<u16> @size(2) @match(copy); }",
    );
    assert!(decode(&[1u8, 2, 1, 2, 0, 1, 0, 2][..], &s).is_ok());

    let err = decode(&[1u8, 2, 1, 3, 0, 1, 0, 3][..], &s).unwrap_err();
    assert_eq!(err.path().expect("path").to_string(), "D.copy");

    let err = decode(&[1u8, 2, 1, 2, 0, 1, 1, 2][..], &s).unwrap_err();
    assert!(matches!(err.root_cause(), DecodeError::Validation { .. }));
    assert_eq!(err.path().expect("path").to_string(), "D.wide");
}

#[test]
fn test_under_read_field_is_skipped_to_declared_size() {
    let s = schema("record A { head: u16 @bytes(4); tail: u8; }");
    let record = decode(&[1u8, 2, 3, 4, 5][..], &s).expect("decode");
    assert_eq!(record.get("head"), Some(&Value::U16(0x0102)));
    assert_eq!(record.get("tail"), Some(&Value::U8(5)));
}

#[test]
fn test_over_read_inside_range_fails() {
    let s = schema("record O { inner: Pair @bytes(3); } record Pair { a: u16; b: u16; }");
    let err = decode(&[0u8; 8][..], &s).unwrap_err();
    assert!(matches!(err.root_cause(), DecodeError::UnexpectedEndOfStream));
    assert_eq!(err.path().expect("path").to_string(), "O.inner.b");
    assert_eq!(err.offset(), Some(2));
}

#[test]
fn test_nested_range_larger_than_parent() {
    let s = schema("record R { outer: Inner @bytes(2); } record Inner { big: bytes @bytes(4); }");
    let err = decode(&[0u8; 8][..], &s).unwrap_err();
    assert!(matches!(
        err.root_cause(),
        DecodeError::RangeExceedsEnclosing { requested: 4, available: 2 }
    ));
}

#[test]
fn test_scalar_width_adaptation() {
    let s = schema(
        r#"record W {
          channels: u32 @bytes(2);
          signed: i32 @bytes(1);
          padded: u8 @bytes(3);
          ratio: f64 @bytes(4);
          flag: bool;
          initial: char @bytes(1);
        }"#,
    );
    let mut bytes = vec![0x00, 0x03, 0xFF, 0x2A, 0xEE, 0xEE];
    bytes.extend_from_slice(&1.5f32.to_be_bytes());
    bytes.extend_from_slice(&[0x01, b'Z']);
    let record = decode(&bytes[..], &s).expect("decode");
    assert_eq!(record.get("channels"), Some(&Value::U32(3)));
    assert_eq!(record.get("signed"), Some(&Value::I32(255)));
    assert_eq!(record.get("padded"), Some(&Value::U8(0x2A)));
    assert_eq!(record.get("ratio"), Some(&Value::Double(1.5)));
    assert_eq!(record.get("flag"), Some(&Value::Bool(true)));
    assert_eq!(record.get("initial"), Some(&Value::Char('Z')));
}

#[test]
fn test_wide_bool_tests_the_whole_value() {
    let s = schema(
        "record B { flag: bool @bytes(4); short: bool @bytes(2); odd: bool @bytes(3); long: bool @bytes(8); tail: u8; }",
    );
    let mut bytes = vec![0u8, 0, 0, 1, 1, 0, 0, 0, 7];
    bytes.extend_from_slice(&[0u8; 8]);
    bytes.push(9);
    let record = decode(&bytes[..], &s).expect("decode");
    assert_eq!(record.get("flag"), Some(&Value::Bool(true)));
    assert_eq!(record.get("short"), Some(&Value::Bool(true)));
    // other widths look at the first byte only
    assert_eq!(record.get("odd"), Some(&Value::Bool(false)));
    assert_eq!(record.get("long"), Some(&Value::Bool(false)));
    assert_eq!(record.get("tail"), Some(&Value::U8(9)));
}

#[test]
fn test_enum_index_is_clamped() {
    let s = schema(
        r#"enum Mode { Bitmap, Gray, Rgb }
        record E { mode: Mode @bytes(2) @match("Gray"); big: Mode @bytes(1); wide: Mode; }"#,
    );
    let record = decode(&[0x00u8, 0x01, 0x09, 0xFF, 0xFF, 0xFF, 0xFF][..], &s).expect("decode");
    assert_eq!(
        record.get("mode"),
        Some(&Value::Enum {
            ty: "Mode".into(),
            name: "Gray".into(),
            index: 1,
        })
    );
    assert!(matches!(record.get("big"), Some(Value::Enum { index: 2, .. })));
    // -1 as a 32-bit index clamps to the first variant
    assert!(matches!(record.get("wide"), Some(Value::Enum { index: 0, .. })));
}

#[test]
fn test_map_keys_and_replacement() {
    let s = schema(
        r#"record Res { count: u8; blocks: map<Block> @size(count) @key(id); }
        record Block { id: u16; len: u8; data: bytes @bytes(len); }"#,
    );
    let bytes = [3u8, 0, 1, 1, 0xAA, 0, 2, 0, 0, 1, 2, 0xBB, 0xCC];
    let record = decode(&bytes[..], &s).expect("decode");
    let map = record.get("blocks").and_then(Value::as_map).expect("map");
    assert_eq!(map.len(), 2);
    assert_eq!(map.keys().collect::<Vec<_>>(), ["1", "2"]);
    let first = map.get("1").and_then(Value::as_record).expect("block 1");
    assert_eq!(first.get("data"), Some(&Value::Bytes(vec![0xBB, 0xCC])));
}

#[test]
fn test_unsized_list_fills_its_range() {
    let s = schema("record L { items: list<u16> @bytes(6); tail: u8; rest: list<u8>; }");
    let record = decode(&[0u8, 1, 0, 2, 0, 3, 9, 7, 7][..], &s).expect("decode");
    assert_eq!(
        record.get("items"),
        Some(&Value::List(vec![Value::U16(1), Value::U16(2), Value::U16(3)]))
    );
    assert_eq!(record.get("tail"), Some(&Value::U8(9)));
    assert_eq!(record.get("rest").and_then(Value::as_list).map(|l| l.len()), Some(2));
}

#[test]
fn test_list_of_sized_strings() {
    let s = schema("record N { names: list<string @bytes(3)> @size(2); }");
    let record = decode(&b"abcxyz"[..], &s).expect("decode");
    assert_eq!(
        record.get("names"),
        Some(&Value::List(vec![Value::String("abc".into()), Value::String("xyz".into())]))
    );
}

#[test]
fn test_list_with_element_count_and_byte_count() {
    let s = schema("record C { items: list<u8> @size(2) @bytes(4); tail: u8; }");
    let record = decode(&[1u8, 2, 3, 4, 5][..], &s).expect("decode");
    assert_eq!(record.get("items"), Some(&Value::List(vec![Value::U8(1), Value::U8(2)])));
    assert_eq!(record.get("tail"), Some(&Value::U8(5)));

    let s = schema("record C { items: list<u16> @size(3) @bytes(4); }");
    let err = decode(&[0u8; 8][..], &s).unwrap_err();
    assert!(matches!(err.root_cause(), DecodeError::UnexpectedEndOfStream));
    assert_eq!(err.path().expect("path").to_string(), "C.items[2]");
}

#[test]
fn test_sized_list_of_empty_elements_is_bounded() {
    let s = schema("record L { count: u32; items: list<Empty> @size(count); tail: u8; } record Empty { }");
    let record = decode(&[0u8, 0, 0, 3, 7][..], &s).expect("decode");
    assert_eq!(record.get("items").and_then(Value::as_list).map(|l| l.len()), Some(3));
    assert_eq!(record.get("tail"), Some(&Value::U8(7)));

    let err = decode(&[0xFFu8, 0xFF, 0xFF, 0xFF, 7][..], &s).unwrap_err();
    assert!(err.is_schema_error());
    assert_eq!(
        err.path().expect("path").to_string(),
        format!("L.items[{}]", chunkio::decoder::MAX_EMPTY_ELEMENTS)
    );
}

#[test]
fn test_bytes_without_count_reads_rest_of_range() {
    let s = schema("record B { chunk: Blob @bytes(3); last: u8; } record Blob { first: u8; data: bytes; }");
    let record = decode(&[1u8, 2, 3, 4][..], &s).expect("decode");
    let blob = record.get("chunk").and_then(Value::as_record).expect("blob");
    assert_eq!(blob.get("data"), Some(&Value::Bytes(vec![2, 3])));
    assert_eq!(record.get("last"), Some(&Value::U8(4)));
}

#[test]
fn test_skip_field() {
    let s = schema("record K { reserved: skip @bytes(6); v: u8; }");
    let record = decode(&[0u8, 0, 0, 0, 0, 0, 42][..], &s).expect("decode");
    assert_eq!(record.len(), 1);
    assert_eq!(record.get("v"), Some(&Value::U8(42)));
}

#[test]
fn test_computed_byte_count_and_params() {
    let s = schema("record P { len: u8; data: bytes @bytes(len * 2); extra: bytes @bytes($extra); }");
    let decoder = ChunkDecoder::new(&s).param("extra", Value::I64(1));
    let record = decoder.decode(&[2u8, 1, 2, 3, 4, 5][..]).expect("decode");
    assert_eq!(record.get("data"), Some(&Value::Bytes(vec![1, 2, 3, 4])));
    assert_eq!(record.get("extra"), Some(&Value::Bytes(vec![5])));

    let err = decode(&[2u8, 1, 2, 3, 4, 5][..], &s).unwrap_err();
    assert!(matches!(err.root_cause(), DecodeError::Expression { .. }));
    assert!(err.is_schema_error());
}

#[test]
fn test_nested_record_sees_enclosing_fields() {
    let s = schema(
        r#"record Outer { version: u8; inner: Inner; }
        record Inner { extra: u8 @if(version > 1); tail: u8 @match(Outer.version); }"#,
    );
    let v2 = decode(&[2u8, 5, 2][..], &s).expect("decode");
    let inner = v2.get("inner").and_then(Value::as_record).expect("inner");
    assert_eq!(inner.get("extra"), Some(&Value::U8(5)));
    let v1 = decode(&[1u8, 1][..], &s).expect("decode");
    let inner = v1.get("inner").and_then(Value::as_record).expect("inner");
    assert!(!inner.contains("extra"));
}

#[test]
fn test_string_encodings() {
    let mut bytes = encode_modified_utf8("a\0\u{e9}");
    assert_eq!(bytes.len(), 5);
    bytes.extend_from_slice("h\u{e9}".as_bytes());
    bytes.extend_from_slice(&[0x41, 0xE9]);
    let s = schema(
        r#"record T {
          m: string @bytes(5) @encoding("MUTF-8");
          u: string @bytes(3) @encoding("UTF-8");
          l: string @bytes(2);
        }"#,
    );
    let record = decode(&bytes[..], &s).expect("decode");
    assert_eq!(record.get("m"), Some(&Value::String("a\0\u{e9}".into())));
    assert_eq!(record.get("u"), Some(&Value::String("h\u{e9}".into())));
    assert_eq!(record.get("l"), Some(&Value::String("A\u{e9}".into())));
}

#[test]
fn test_malformed_string_is_data_error() {
    let s = schema(r#"record T { name: string @bytes(2) @encoding("UTF-8"); }"#);
    let err = decode(&[0xC3u8, 0x28][..], &s).unwrap_err();
    assert!(matches!(err.root_cause(), DecodeError::MalformedEncoding { .. }));
    assert_eq!(err.category(), ErrorCategory::Data);
}

#[test]
fn test_schema_contract_errors() {
    let s = schema("record T { name: string; }");
    let err = decode(&b"abc"[..], &s).unwrap_err();
    assert!(matches!(err.root_cause(), DecodeError::SchemaContract(_)));
    assert_eq!(err.category(), ErrorCategory::Schema);

    let s = schema("record T { gap: skip; }");
    assert!(decode(&b"abc"[..], &s).unwrap_err().is_schema_error());

    let s = schema("record T { items: list<Empty> @bytes(4); } record Empty { }");
    let err = decode(&[0u8; 4][..], &s).unwrap_err();
    assert!(err.is_schema_error());
    assert_eq!(err.path().expect("path").to_string(), "T.items[0]");
}

#[test]
fn test_recursion_depth_is_bounded() {
    let s = schema("record Node { next: Node; }");
    let options = DecodeOptions {
        max_depth: 4,
        ..DecodeOptions::default()
    };
    let err = ChunkDecoder::new(&s).with_options(options).decode(&[0u8; 0][..]).unwrap_err();
    assert!(err.is_schema_error());
    assert_eq!(err.path().expect("path").to_string(), "Node.next.next.next.next");
}

#[test]
fn test_decode_named_record_and_unknown_record() {
    let s = schema("record A { a: u8; } record B { b: u16; }");
    let decoder = ChunkDecoder::new(&s);
    let b = decoder.decode_record("B", &[0u8, 7][..]).expect("decode");
    assert_eq!(b.get("b"), Some(&Value::U16(7)));
    assert!(decoder.decode_record("C", &[0u8][..]).unwrap_err().is_schema_error());
}

#[test]
fn test_several_records_from_one_reader() {
    let s = schema("record Chunk { len: u8; body: bytes @bytes(len); }");
    let decoder = ChunkDecoder::new(&s);
    let bytes = [2u8, b'a', b'b', 1, b'c'];
    let mut reader = RangedReader::new(&bytes[..]);
    let first = decoder.decode_from("Chunk", &mut reader).expect("first");
    let second = decoder.decode_from("Chunk", &mut reader).expect("second");
    assert_eq!(first.get("body"), Some(&Value::Bytes(b"ab".to_vec())));
    assert_eq!(second.get("body"), Some(&Value::Bytes(b"c".to_vec())));
    assert_eq!(reader.position(), 5);
    assert_eq!(reader.depth(), 0);
}

#[test]
fn test_decode_from_file() {
    let s = schema("record F { magic: u16 @match(0xCAFE); values: list<u16>; }");
    let mut tmp = tempfile::NamedTempFile::new().expect("tempfile");
    tmp.write_all(&[0xCA, 0xFE, 0, 1, 0, 2, 0, 3]).expect("write");
    tmp.flush().expect("flush");
    let file = std::fs::File::open(tmp.path()).expect("open");
    let record = decode(std::io::BufReader::new(file), &s).expect("decode");
    assert_eq!(
        record.get("values"),
        Some(&Value::List(vec![Value::U16(1), Value::U16(2), Value::U16(3)]))
    );
}
