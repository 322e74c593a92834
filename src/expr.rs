//! Expressions evaluated while decoding: byte counts, element counts, read
//! guards, stop predicates, match constraints and map keys.
//!
//! An expression sees the records currently being decoded (innermost first),
//! the element being keyed (for map keys) and the caller's parameters.

use crate::error::SchemaError;
use crate::value::{Record, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitXor => "^",
            BinaryOp::BitOr => "|",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Len,
    Abs,
    Min,
    Max,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "len" => Some(Builtin::Len),
            "abs" => Some(Builtin::Abs),
            "min" => Some(Builtin::Min),
            "max" => Some(Builtin::Max),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Len => "len",
            Builtin::Abs => "abs",
            Builtin::Min => "min",
            Builtin::Max => "max",
        }
    }

    fn arity(&self) -> usize {
        match self {
            Builtin::Len | Builtin::Abs => 1,
            Builtin::Min | Builtin::Max => 2,
        }
    }
}

type NativeFn = dyn Fn(&Scope<'_>) -> Result<Value, String> + Send + Sync;

/// An expression supplied as a Rust closure when a schema is built in code.
#[derive(Clone)]
pub struct NativeExpr {
    label: String,
    func: Arc<NativeFn>,
}

impl fmt::Debug for NativeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeExpr").field("label", &self.label).finish()
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    /// Dotted path such as `header.length`.
    Path(Vec<String>),
    /// Caller parameter, written `$name`.
    Param(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(Builtin, Vec<Expr>),
    Native(NativeExpr),
}

impl Expr {
    /// Parse expression source, e.g. `"(flags & 0x10) != 0"`.
    pub fn parse(source: &str) -> Result<Expr, SchemaError> {
        crate::parser::parse_expr(source)
    }

    pub fn int(v: i64) -> Expr {
        Expr::Literal(Value::I64(v))
    }

    pub fn bool(v: bool) -> Expr {
        Expr::Literal(Value::Bool(v))
    }

    pub fn string(v: impl Into<String>) -> Expr {
        Expr::Literal(Value::String(v.into()))
    }

    /// Path from a dotted string: `Expr::path("header.length")`.
    pub fn path(dotted: &str) -> Expr {
        Expr::Path(dotted.split('.').map(str::to_string).collect())
    }

    pub fn param(name: impl Into<String>) -> Expr {
        Expr::Param(name.into())
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn native<F>(label: impl Into<String>, func: F) -> Expr
    where
        F: Fn(&Scope<'_>) -> Result<Value, String> + Send + Sync + 'static,
    {
        Expr::Native(NativeExpr {
            label: label.into(),
            func: Arc::new(func),
        })
    }

    /// A non-negative integer literal, if this expression is one.
    pub fn as_constant_u64(&self) -> Option<u64> {
        match self {
            Expr::Literal(v) if v.is_integer() => v.as_u64(),
            _ => None,
        }
    }

    pub fn eval(&self, scope: &Scope<'_>) -> Result<Value, String> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Path(segments) => scope
                .resolve(segments)
                .ok_or_else(|| format!("`{}` is not defined", segments.join("."))),
            Expr::Param(name) => scope
                .param(name)
                .cloned()
                .ok_or_else(|| format!("parameter ${} was not supplied", name)),
            Expr::Unary(op, operand) => unary(*op, operand.eval(scope)?),
            Expr::Binary(BinaryOp::And, lhs, rhs) => {
                if !expect_bool(&lhs.eval(scope)?, "&&")? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(expect_bool(&rhs.eval(scope)?, "&&")?))
            }
            Expr::Binary(BinaryOp::Or, lhs, rhs) => {
                if expect_bool(&lhs.eval(scope)?, "||")? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(expect_bool(&rhs.eval(scope)?, "||")?))
            }
            Expr::Binary(op, lhs, rhs) => binary(*op, lhs.eval(scope)?, rhs.eval(scope)?),
            Expr::Call(builtin, args) => {
                if args.len() != builtin.arity() {
                    return Err(format!(
                        "{}() takes {} argument(s), got {}",
                        builtin.name(),
                        builtin.arity(),
                        args.len()
                    ));
                }
                let values = args.iter().map(|a| a.eval(scope)).collect::<Result<Vec<_>, _>>()?;
                call(*builtin, &values)
            }
            Expr::Native(native) => (native.func)(scope),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(Value::String(s)) => write!(f, "{:?}", s),
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Path(segments) => write!(f, "{}", segments.join(".")),
            Expr::Param(name) => write!(f, "${}", name),
            Expr::Unary(op, operand) => {
                let sym = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Not => "!",
                    UnaryOp::BitNot => "~",
                };
                write!(f, "{}{}", sym, operand)
            }
            Expr::Binary(op, lhs, rhs) => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            Expr::Call(builtin, args) => {
                write!(f, "{}(", builtin.name())?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
            Expr::Native(native) => write!(f, "<{}>", native.label),
        }
    }
}

/// What an expression can see.
pub struct Scope<'a> {
    frames: &'a [Record],
    element: Option<&'a Value>,
    params: &'a HashMap<String, Value>,
}

impl<'a> Scope<'a> {
    /// `frames` are the in-progress records, outermost first.
    pub fn new(frames: &'a [Record], params: &'a HashMap<String, Value>) -> Self {
        Scope {
            frames,
            element: None,
            params,
        }
    }

    pub fn with_element(mut self, element: &'a Value) -> Self {
        self.element = Some(element);
        self
    }

    pub fn param(&self, name: &str) -> Option<&'a Value> {
        self.params.get(name)
    }

    /// Field of the element or of the nearest in-progress record that has it.
    pub fn field(&self, name: &str) -> Option<&'a Value> {
        if let Some(v) = self.element.and_then(|e| e.member(name)) {
            return Some(v);
        }
        self.frames.iter().rev().find_map(|r| r.get(name))
    }

    pub fn resolve(&self, segments: &[String]) -> Option<Value> {
        let (first, rest) = segments.split_first()?;
        let mut target = self.root(first)?;
        for seg in rest {
            target = match target {
                Target::Record(r) => Target::Value(r.get(seg)?),
                Target::Value(v) => Target::Value(v.member(seg)?),
            };
        }
        Some(match target {
            Target::Record(r) => Value::Record(r.clone()),
            Target::Value(v) => v.clone(),
        })
    }

    fn root(&self, name: &str) -> Option<Target<'a>> {
        match (name, self.element, self.frames.last()) {
            ("it", Some(e), _) => return Some(Target::Value(e)),
            ("self", _, Some(r)) => return Some(Target::Record(r)),
            _ => {}
        }
        if let Some(v) = self.field(name) {
            return Some(Target::Value(v));
        }
        self.frames
            .iter()
            .rev()
            .find(|r| r.name == name)
            .map(Target::Record)
    }
}

enum Target<'a> {
    Record(&'a Record),
    Value(&'a Value),
}

fn expect_bool(v: &Value, op: &str) -> Result<bool, String> {
    v.as_bool()
        .ok_or_else(|| format!("`{}` needs boolean operands, got {}", op, v))
}

fn expect_int(v: &Value, op: &str) -> Result<i128, String> {
    if v.is_integer() {
        if let Some(i) = v.as_i128() {
            return Ok(i);
        }
    }
    Err(format!("`{}` needs integer operands, got {}", op, v))
}

/// Narrow a 128-bit intermediate back to `I64`, or `U64` when it only fits there.
fn int_value(v: i128) -> Result<Value, String> {
    if let Ok(i) = i64::try_from(v) {
        Ok(Value::I64(i))
    } else if let Ok(u) = u64::try_from(v) {
        Ok(Value::U64(u))
    } else {
        Err(format!("integer overflow ({})", v))
    }
}

fn unary(op: UnaryOp, v: Value) -> Result<Value, String> {
    match op {
        UnaryOp::Neg => {
            if v.is_integer() {
                int_value(-expect_int(&v, "-")?)
            } else if let Value::Float(x) = v {
                Ok(Value::Float(-x))
            } else if let Value::Double(x) = v {
                Ok(Value::Double(-x))
            } else {
                Err(format!("cannot negate {}", v))
            }
        }
        UnaryOp::Not => Ok(Value::Bool(!expect_bool(&v, "!")?)),
        UnaryOp::BitNot => int_value(!expect_int(&v, "~")?),
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, String> {
    let sym = op.symbol();
    match op {
        BinaryOp::Eq => Ok(Value::Bool(lhs.loosely_equals(&rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!lhs.loosely_equals(&rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ord = compare(&lhs, &rhs).ok_or_else(|| format!("cannot compare {} {} {}", lhs, sym, rhs))?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ord.is_lt(),
                BinaryOp::Le => ord.is_le(),
                BinaryOp::Gt => ord.is_gt(),
                _ => ord.is_ge(),
            }))
        }
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor
            if lhs.as_bool().is_some() && rhs.as_bool().is_some() =>
        {
            let (a, b) = (expect_bool(&lhs, sym)?, expect_bool(&rhs, sym)?);
            Ok(Value::Bool(match op {
                BinaryOp::BitAnd => a & b,
                BinaryOp::BitOr => a | b,
                _ => a ^ b,
            }))
        }
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr => {
            let (a, b) = (expect_int(&lhs, sym)?, expect_int(&rhs, sym)?);
            let shift = || u32::try_from(b).ok().filter(|s| *s < 64).ok_or_else(|| format!("bad shift amount {}", b));
            int_value(match op {
                BinaryOp::BitAnd => a & b,
                BinaryOp::BitOr => a | b,
                BinaryOp::BitXor => a ^ b,
                BinaryOp::Shl => a.checked_shl(shift()?).ok_or("shift overflow")?,
                _ => a >> shift()?,
            })
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            if lhs.is_integer() && rhs.is_integer() {
                let (a, b) = (expect_int(&lhs, sym)?, expect_int(&rhs, sym)?);
                let out = match op {
                    BinaryOp::Add => a.checked_add(b),
                    BinaryOp::Sub => a.checked_sub(b),
                    BinaryOp::Mul => a.checked_mul(b),
                    BinaryOp::Div => a.checked_div(b),
                    _ => a.checked_rem(b),
                };
                return match out {
                    Some(v) => int_value(v),
                    None if b == 0 && matches!(op, BinaryOp::Div | BinaryOp::Rem) => {
                        Err("division by zero".to_string())
                    }
                    None => Err(format!("integer overflow in {} {} {}", a, sym, b)),
                };
            }
            match (lhs.as_f64(), rhs.as_f64()) {
                (Some(a), Some(b)) => Ok(Value::Double(match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    _ => a % b,
                })),
                _ => Err(format!("cannot apply `{}` to {} and {}", sym, lhs, rhs)),
            }
        }
        BinaryOp::And | BinaryOp::Or => {
            let (a, b) = (expect_bool(&lhs, sym)?, expect_bool(&rhs, sym)?);
            Ok(Value::Bool(if op == BinaryOp::And { a && b } else { a || b }))
        }
    }
}

fn compare(lhs: &Value, rhs: &Value) -> Option<std::cmp::Ordering> {
    if lhs.is_integer() && rhs.is_integer() {
        return Some(lhs.as_i128()?.cmp(&rhs.as_i128()?));
    }
    if let (Some(a), Some(b)) = (lhs.as_str(), rhs.as_str()) {
        return Some(a.cmp(b));
    }
    lhs.as_f64()?.partial_cmp(&rhs.as_f64()?)
}

fn call(builtin: Builtin, args: &[Value]) -> Result<Value, String> {
    match builtin {
        Builtin::Len => {
            let n = match &args[0] {
                Value::String(s) => s.chars().count(),
                Value::Bytes(b) => b.len(),
                Value::List(l) => l.len(),
                Value::Map(m) => m.len(),
                Value::Record(r) => r.len(),
                other => return Err(format!("len() of {}", other)),
            };
            int_value(n as i128)
        }
        Builtin::Abs => {
            let v = &args[0];
            if v.is_integer() {
                int_value(expect_int(v, "abs")?.abs())
            } else {
                v.as_f64()
                    .map(|x| Value::Double(x.abs()))
                    .ok_or_else(|| format!("abs() of {}", v))
            }
        }
        Builtin::Min | Builtin::Max => {
            let (a, b) = (&args[0], &args[1]);
            let ord = compare(a, b).ok_or_else(|| format!("{}() of {} and {}", builtin.name(), a, b))?;
            let pick_a = if builtin == Builtin::Min { ord.is_le() } else { ord.is_ge() };
            Ok(if pick_a { a.clone() } else { b.clone() })
        }
    }
}
