//! Format decoded records for display: one field per line, nested values indented.

use crate::value::{Record, Value};

/// Bytes longer than this are shown truncated.
const MAX_HEX_BYTES: usize = 32;

/// Multi-line dump of a decoded record.
pub fn format_record(record: &Record) -> String {
    let mut lines = vec![format!("{} {{", record.name)];
    push_fields(&mut lines, record, 1);
    lines.push("}".to_string());
    lines.join("\n")
}

fn push_fields(lines: &mut Vec<String>, record: &Record, indent: usize) {
    for (name, v) in record.iter() {
        push_entry(lines, name, v, indent);
    }
}

fn push_entry(lines: &mut Vec<String>, label: &str, v: &Value, indent: usize) {
    let pad = "  ".repeat(indent);
    match v {
        Value::Record(r) => {
            lines.push(format!("{}{}: {} {{", pad, label, r.name));
            push_fields(lines, r, indent + 1);
            lines.push(format!("{}}}", pad));
        }
        Value::List(items) if items.iter().any(is_compound) => {
            lines.push(format!("{}{}: [", pad, label));
            for (i, item) in items.iter().enumerate() {
                push_entry(lines, &format!("[{}]", i), item, indent + 1);
            }
            lines.push(format!("{}]", pad));
        }
        Value::Map(m) => {
            lines.push(format!("{}{}: {{", pad, label));
            for (k, item) in m.iter() {
                push_entry(lines, &format!("{:?}", k), item, indent + 1);
            }
            lines.push(format!("{}}}", pad));
        }
        Value::Variant { case, value } if is_compound(value) => {
            push_entry(lines, &format!("{} <{}>", label, case), value, indent);
        }
        _ => lines.push(format!("{}{}: {}", pad, label, format_scalar(v))),
    }
}

fn is_compound(v: &Value) -> bool {
    match v {
        Value::Record(_) | Value::Map(_) => true,
        Value::List(items) => items.iter().any(is_compound),
        Value::Variant { value, .. } => is_compound(value),
        _ => false,
    }
}

/// One-line rendering of a leaf value.
pub fn format_scalar(v: &Value) -> String {
    match v {
        Value::String(s) => format!("{:?}", s),
        Value::Char(c) => format!("{:?}", c),
        Value::Bytes(b) => hex_string(b),
        Value::Enum { name, index, .. } => format!("{} ({})", name, index),
        Value::List(items) => {
            let parts: Vec<String> = items.iter().map(format_scalar).collect();
            format!("[{}]", parts.join(", "))
        }
        Value::Variant { case, value } => format!("{} <{}>", format_scalar(value), case),
        other => other.to_string(),
    }
}

fn hex_string(b: &[u8]) -> String {
    let shown: Vec<String> = b.iter().take(MAX_HEX_BYTES).map(|x| format!("{:02x}", x)).collect();
    if b.len() > MAX_HEX_BYTES {
        format!("hex({} ... {} bytes)", shown.join(" "), b.len())
    } else {
        format!("hex({})", shown.join(" "))
    }
}
