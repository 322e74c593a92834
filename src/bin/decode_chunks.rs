//! Decode a binary file against a schema and print the decoded record tree.
//!
//! Usage:
//!   decode_chunks SCHEMA INPUT [--root NAME] [--param NAME=VALUE]... [--quiet]
//!
//! Options:
//!   --root, -r NAME       Record to decode (default: first record in the schema)
//!   --param, -p NAME=VAL  External parameter for `$NAME` in expressions (repeatable)
//!   --quiet, -q           Only report success or failure

use anyhow::{bail, Context};
use chunkio::dump::format_record;
use chunkio::{parse_schema, ChunkDecoder, ErrorCategory, Value};
use std::fs::File;
use std::io::BufReader;

/// Integers, floats and booleans are typed; anything else is a string.
fn parse_param_value(s: &str) -> Value {
    if let Ok(i) = s.parse::<i64>() {
        return Value::I64(i);
    }
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if let Ok(u) = u64::from_str_radix(hex, 16) {
            return Value::U64(u);
        }
    }
    if let Ok(u) = s.parse::<u64>() {
        return Value::U64(u);
    }
    if let Ok(f) = s.parse::<f64>() {
        return Value::Double(f);
    }
    match s {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(s.to_string()),
    }
}

fn main() -> anyhow::Result<()> {
    let mut positional = Vec::new();
    let mut root = None;
    let mut params = Vec::new();
    let mut quiet = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--root" | "-r" => root = Some(args.next().context("--root needs a record name")?),
            "--param" | "-p" => {
                let spec = args.next().context("--param needs NAME=VALUE")?;
                let (name, value) = spec
                    .split_once('=')
                    .with_context(|| format!("--param {}: expected NAME=VALUE", spec))?;
                params.push((name.to_string(), parse_param_value(value)));
            }
            "--quiet" | "-q" => quiet = true,
            other if other.starts_with('-') => bail!("unknown option {}", other),
            _ => positional.push(arg),
        }
    }
    let (schema_path, input_path) = match positional.as_slice() {
        [s, i] => (s.clone(), i.clone()),
        _ => bail!("usage: decode_chunks SCHEMA INPUT [--root NAME] [--param NAME=VALUE]... [--quiet]"),
    };

    let source = std::fs::read_to_string(&schema_path).with_context(|| format!("reading {}", schema_path))?;
    let schema = parse_schema(&source).with_context(|| format!("schema {}", schema_path))?;
    let mut decoder = ChunkDecoder::new(&schema);
    for (name, value) in params {
        decoder = decoder.param(name, value);
    }

    let file = File::open(&input_path).with_context(|| format!("opening {}", input_path))?;
    let reader = BufReader::new(file);
    let root = root.unwrap_or_else(|| schema.root().name.clone());
    let record = match decoder.decode_record(&root, reader) {
        Ok(r) => r,
        Err(e) => {
            let kind = match e.category() {
                ErrorCategory::Data => "malformed input",
                ErrorCategory::Schema => "schema error",
                ErrorCategory::Io => "I/O error",
            };
            return Err(anyhow::Error::new(e).context(format!("{}: {} decoding {}", input_path, kind, root)));
        }
    };

    if quiet {
        eprintln!("{}: decoded {} ({} fields)", input_path, record.name, record.len());
    } else {
        println!("{}", format_record(&record));
    }
    Ok(())
}
