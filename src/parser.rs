//! Parse schema DSL source into AST using PEST.

use crate::ast::*;
use crate::error::SchemaError;
use crate::expr::{BinaryOp, Builtin, Expr, UnaryOp};
use crate::text::Encoding;
use crate::value::Value;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser as PestParser;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct SchemaParser;

fn syntax(msg: impl Into<String>) -> SchemaError {
    SchemaError::Parse(msg.into())
}

/// Parse schema source into AST.
pub fn parse(source: &str) -> Result<Schema, SchemaError> {
    let pairs = SchemaParser::parse(Rule::schema, source).map_err(|e| syntax(e.to_string()))?;
    let pair = pairs.into_iter().next().ok_or_else(|| syntax("empty parse"))?;
    build_schema(pair)
}

/// Parse and resolve in one step.
pub fn parse_schema(source: &str) -> Result<ResolvedSchema, SchemaError> {
    ResolvedSchema::resolve(parse(source)?)
}

/// Parse a standalone expression.
pub fn parse_expr(source: &str) -> Result<Expr, SchemaError> {
    let pairs = SchemaParser::parse(Rule::expression, source).map_err(|e| syntax(e.to_string()))?;
    let expression = pairs.into_iter().next().ok_or_else(|| syntax("empty expression"))?;
    let inner = expression
        .into_inner()
        .next()
        .ok_or_else(|| syntax("empty expression"))?;
    build_expr(inner)
}

fn build_schema(pair: Pair<Rule>) -> Result<Schema, SchemaError> {
    let mut schema = Schema::default();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::record_section => schema.records.push(build_record(inner)?),
            Rule::enum_section => schema.enums.push(build_enum(inner)?),
            _ => {}
        }
    }
    Ok(schema)
}

fn build_enum(pair: Pair<Rule>) -> Result<EnumDef, SchemaError> {
    let mut name = None;
    let mut variants = Vec::new();
    for inner in pair.into_inner() {
        if inner.as_rule() == Rule::ident {
            if name.is_none() {
                name = Some(inner.as_str().to_string());
            } else {
                variants.push(inner.as_str().to_string());
            }
        }
    }
    Ok(EnumDef {
        name: name.ok_or_else(|| syntax("enum: missing name"))?,
        variants,
    })
}

fn build_record(pair: Pair<Rule>) -> Result<RecordDef, SchemaError> {
    let mut name = None;
    let mut fields = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => name = Some(inner.as_str().to_string()),
            Rule::field => fields.push(build_field(inner)?),
            _ => {}
        }
    }
    Ok(RecordDef {
        name: name.ok_or_else(|| syntax("record: missing name"))?,
        fields,
    })
}

fn build_field(pair: Pair<Rule>) -> Result<FieldSpec, SchemaError> {
    let mut it = pair.into_inner();
    let name = it.next().ok_or_else(|| syntax("field: missing name"))?.as_str().to_string();
    let ty_pair = it.next().ok_or_else(|| syntax("field: missing type"))?;
    let ty = build_type_spec(ty_pair, &name)?;
    let mut spec = FieldSpec::new(name, ty);
    for attr in it {
        apply_attribute(&mut spec, attr)?;
    }
    Ok(spec)
}

/// Element of a list or map. It takes the enclosing field's name so debug
/// output and error paths read naturally.
fn build_element(pair: Pair<Rule>, field: &str) -> Result<FieldSpec, SchemaError> {
    let mut it = pair.into_inner();
    let ty_pair = it.next().ok_or_else(|| syntax("element: missing type"))?;
    let mut spec = FieldSpec::new(field, build_type_spec(ty_pair, field)?);
    for attr in it {
        apply_attribute(&mut spec, attr)?;
    }
    Ok(spec)
}

fn build_type_spec(pair: Pair<Rule>, field: &str) -> Result<FieldType, SchemaError> {
    let inner = pair.into_inner().next().ok_or_else(|| syntax("empty type"))?;
    match inner.as_rule() {
        Rule::scalar_type => ScalarType::from_name(inner.as_str())
            .map(FieldType::Scalar)
            .ok_or_else(|| syntax(format!("unknown scalar type {}", inner.as_str()))),
        Rule::string_type => Ok(FieldType::String),
        Rule::bytes_type => Ok(FieldType::Bytes),
        Rule::skip_type => Ok(FieldType::Skip),
        Rule::ident => Ok(FieldType::Named(inner.as_str().to_string())),
        Rule::list_type | Rule::map_type => {
            let is_map = inner.as_rule() == Rule::map_type;
            let element = inner
                .into_inner()
                .next()
                .ok_or_else(|| syntax("list<T>: missing element type"))?;
            let element = Box::new(build_element(element, field)?);
            Ok(if is_map {
                FieldType::Map(element)
            } else {
                FieldType::List(element)
            })
        }
        Rule::switch_type => {
            let mut cases = Vec::new();
            for case in inner.into_inner() {
                let mut it = case.into_inner();
                let test = build_expr(it.next().ok_or_else(|| syntax("switch case: missing test"))?)?;
                let ty = build_type_spec(it.next().ok_or_else(|| syntax("switch case: missing type"))?, field)?;
                cases.push(SwitchCase { test, ty });
            }
            Ok(FieldType::Switch(cases))
        }
        other => Err(syntax(format!("unhandled type rule: {:?}", other))),
    }
}

fn apply_attribute(spec: &mut FieldSpec, pair: Pair<Rule>) -> Result<(), SchemaError> {
    let attr = pair.into_inner().next().ok_or_else(|| syntax("empty attribute"))?;
    let rule = attr.as_rule();
    if rule == Rule::attr_debug {
        spec.debug = true;
        return Ok(());
    }
    let arg = attr
        .into_inner()
        .next()
        .ok_or_else(|| syntax(format!("{:?}: missing argument", rule)))?;
    match rule {
        Rule::attr_encoding => {
            let name = unescape(string_body(arg)?)?;
            spec.encoding = Encoding::from_name(&name).ok_or(SchemaError::UnknownEncoding(name))?;
        }
        Rule::attr_bytes => spec.byte_count = Some(Count::from(build_expr(arg)?)),
        Rule::attr_size => spec.size = Some(Count::from(build_expr(arg)?)),
        Rule::attr_if => spec.read_if = Some(build_expr(arg)?),
        Rule::attr_stop_if => spec.stop_if = Some(build_expr(arg)?),
        Rule::attr_match => spec.matches = Some(build_expr(arg)?),
        Rule::attr_key => spec.key = Some(build_expr(arg)?),
        other => return Err(syntax(format!("unhandled attribute: {:?}", other))),
    }
    Ok(())
}

// ==================== Expressions ====================

fn build_expr(pair: Pair<Rule>) -> Result<Expr, SchemaError> {
    match pair.as_rule() {
        Rule::expr | Rule::primary => {
            let inner = pair.into_inner().next().ok_or_else(|| syntax("empty expression"))?;
            build_expr(inner)
        }
        Rule::logic_or
        | Rule::logic_and
        | Rule::bit_or
        | Rule::bit_xor
        | Rule::bit_and
        | Rule::equality
        | Rule::relational
        | Rule::shift
        | Rule::additive
        | Rule::term => {
            let mut it = pair.into_inner();
            let mut lhs = build_expr(it.next().ok_or_else(|| syntax("missing operand"))?)?;
            while let Some(op) = it.next() {
                let op = binary_op(op.as_rule())?;
                let rhs = build_expr(it.next().ok_or_else(|| syntax("missing right operand"))?)?;
                lhs = Expr::binary(op, lhs, rhs);
            }
            Ok(lhs)
        }
        Rule::unary => {
            let mut ops = Vec::new();
            let mut operand = None;
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::op_neg => ops.push(UnaryOp::Neg),
                    Rule::op_not => ops.push(UnaryOp::Not),
                    Rule::op_bit_not => ops.push(UnaryOp::BitNot),
                    _ => operand = Some(build_expr(inner)?),
                }
            }
            let mut e = operand.ok_or_else(|| syntax("unary: missing operand"))?;
            for op in ops.into_iter().rev() {
                e = fold_unary(op, e);
            }
            Ok(e)
        }
        Rule::call => {
            let mut it = pair.into_inner();
            let name = it.next().ok_or_else(|| syntax("call: missing name"))?.as_str();
            let builtin =
                Builtin::from_name(name).ok_or_else(|| syntax(format!("unknown function {}()", name)))?;
            let args = it.map(build_expr).collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::Call(builtin, args))
        }
        Rule::param => {
            let ident = pair.into_inner().next().ok_or_else(|| syntax("$: missing name"))?;
            Ok(Expr::Param(ident.as_str().to_string()))
        }
        Rule::path => Ok(Expr::Path(
            pair.into_inner().map(|p| p.as_str().to_string()).collect(),
        )),
        Rule::literal => {
            let inner = pair.into_inner().next().ok_or_else(|| syntax("empty literal"))?;
            build_literal(inner).map(Expr::Literal)
        }
        other => Err(syntax(format!("unhandled expression rule: {:?}", other))),
    }
}

/// Negative literals are folded so `@match(-1)` stays a constant.
fn fold_unary(op: UnaryOp, operand: Expr) -> Expr {
    match (op, &operand) {
        (UnaryOp::Neg, Expr::Literal(Value::I64(n))) if *n != i64::MIN => Expr::Literal(Value::I64(-n)),
        (UnaryOp::Neg, Expr::Literal(Value::Double(x))) => Expr::Literal(Value::Double(-x)),
        _ => Expr::Unary(op, Box::new(operand)),
    }
}

fn binary_op(rule: Rule) -> Result<BinaryOp, SchemaError> {
    Ok(match rule {
        Rule::op_or => BinaryOp::Or,
        Rule::op_and => BinaryOp::And,
        Rule::op_bit_or => BinaryOp::BitOr,
        Rule::op_bit_xor => BinaryOp::BitXor,
        Rule::op_bit_and => BinaryOp::BitAnd,
        Rule::op_eq => BinaryOp::Eq,
        Rule::op_ne => BinaryOp::Ne,
        Rule::op_le => BinaryOp::Le,
        Rule::op_ge => BinaryOp::Ge,
        Rule::op_lt => BinaryOp::Lt,
        Rule::op_gt => BinaryOp::Gt,
        Rule::op_shl => BinaryOp::Shl,
        Rule::op_shr => BinaryOp::Shr,
        Rule::op_add => BinaryOp::Add,
        Rule::op_sub => BinaryOp::Sub,
        Rule::op_mul => BinaryOp::Mul,
        Rule::op_div => BinaryOp::Div,
        Rule::op_rem => BinaryOp::Rem,
        other => return Err(syntax(format!("not an operator: {:?}", other))),
    })
}

fn build_literal(pair: Pair<Rule>) -> Result<Value, SchemaError> {
    let s = pair.as_str();
    match pair.as_rule() {
        Rule::int_lit => parse_integer(s, 10),
        Rule::hex_lit => parse_integer(&s[2..], 16),
        Rule::float_lit => s
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|e| syntax(format!("bad float {}: {}", s, e))),
        Rule::bool_lit => Ok(Value::Bool(s == "true")),
        Rule::string_lit => Ok(Value::String(unescape(string_body(pair)?)?)),
        other => Err(syntax(format!("unhandled literal: {:?}", other))),
    }
}

fn parse_integer(digits: &str, radix: u32) -> Result<Value, SchemaError> {
    if let Ok(i) = i64::from_str_radix(digits, radix) {
        return Ok(Value::I64(i));
    }
    u64::from_str_radix(digits, radix)
        .map(Value::U64)
        .map_err(|e| syntax(format!("bad integer {}: {}", digits, e)))
}

fn string_body(pair: Pair<Rule>) -> Result<&str, SchemaError> {
    pair.into_inner()
        .next()
        .map(|p| p.as_str())
        .ok_or_else(|| syntax("string literal: missing body"))
}

fn unescape(raw: &str) -> Result<String, SchemaError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                let b = u8::from_str_radix(&hex, 16).map_err(|_| syntax(format!("bad escape \\x{}", hex)))?;
                out.push(char::from(b));
            }
            other => return Err(syntax(format!("bad escape \\{}", other.unwrap_or(' ')))),
        }
    }
    Ok(out)
}
