//! Decode fuzz target: arbitrary bytes decoded against a fixed schema that
//! exercises nested ranges, unsized lists, maps, switches and guards.
//! Decoding must return Ok or Err, never panic or loop.
//! Build with: cargo fuzz run decode_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
const SCHEMA: &str = r#"
enum Kind { A, B, C }
record Root {
    magic: u8 @match(0x7F);
    flags: u8;
    kind: Kind @bytes(1);
    len: u16;
    extra: u32 @if((flags & 1) != 0);
    chunks: list<Chunk> @bytes(len);
    table: map<Entry> @bytes(flags >> 4) @key(tag);
    tail: bytes;
}
record Chunk {
    tag: u8;
    size: u8;
    body: switch { tag == 1 => u16, tag == 2 => Chunk, tag == 3 => string } @bytes(size);
}
record Entry {
    tag: u8;
    value: u8 @stop_if(value == 0);
    more: u8;
}
"#;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let schema = match chunkio::parse_schema(SCHEMA) {
        Ok(s) => s,
        Err(_) => return,
    };
    let _ = chunkio::decode(data, &schema);
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run decode_fuzz");
}
