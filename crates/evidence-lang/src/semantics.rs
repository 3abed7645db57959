use std::rc::Rc;

use crate::{
    ast::{BinOp, CmpOp, Int, UnOp},
    value::Value,
};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("an arithmetic operation overflowed")]
    ArithmeticOverflow,
    #[error("name '{name}' is not defined")]
    NameNotFound { name: String },
    #[error("unsupported operand type(s) for {op}: '{lhs}' and '{rhs}'")]
    UnsupportedOperands {
        op: String,
        lhs: &'static str,
        rhs: &'static str,
    },
    #[error("{message}")]
    TypeError { message: String },
    #[error("{message}")]
    ValueError { message: String },
    #[error("index {index} is out of range for length {len}")]
    IndexOutOfBounds { index: Int, len: usize },
    #[error("key {key} not found")]
    KeyNotFound { key: String },
    #[error("'{ty}' object has no attribute '{attr}'")]
    NoAttribute { ty: &'static str, attr: String },
    #[error("'{ty}' object is not callable")]
    NotCallable { ty: &'static str },
    #[error("{function}() {message}")]
    Arity { function: String, message: String },
    #[error("maximum call depth of {depth} exceeded")]
    RecursionLimit { depth: usize },
    #[error("execution ran out of fuel after {steps} steps")]
    FuelExhausted { steps: u64 },
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("{what} is not supported")]
    Unsupported { what: String },
    #[error("{message}")]
    Raised { message: String },
}

impl RuntimeError {
    pub fn expected(ty: &str, got: &Value) -> RuntimeError {
        RuntimeError::TypeError {
            message: format!("expected {ty}, got '{}'", got.type_name()),
        }
    }
    pub fn raised(message: impl std::fmt::Display) -> RuntimeError {
        RuntimeError::Raised {
            message: message.to_string(),
        }
    }
    /// Resource exhaustion rather than a fault of the program itself.
    pub fn is_exhaustion(&self) -> bool {
        matches!(
            self,
            RuntimeError::FuelExhausted { .. } | RuntimeError::DeadlineExceeded
        )
    }
}

fn unsupported(op: impl std::fmt::Display, l: &Value, r: &Value) -> RuntimeError {
    RuntimeError::UnsupportedOperands {
        op: op.to_string(),
        lhs: l.type_name(),
        rhs: r.type_name(),
    }
}

enum Num {
    Int(Int),
    Float(f64),
}

fn num(v: &Value) -> Option<Num> {
    match v {
        Value::Int(n) => Some(Num::Int(*n)),
        Value::Bool(b) => Some(Num::Int(*b as Int)),
        Value::Float(f) => Some(Num::Float(*f)),
        _ => None,
    }
}

pub fn floor_div(l: Int, r: Int) -> Result<Int, RuntimeError> {
    if r == 0 {
        return Err(RuntimeError::DivisionByZero);
    }
    let q = l.checked_div(r).ok_or(RuntimeError::ArithmeticOverflow)?;
    if l % r != 0 && ((l < 0) != (r < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

pub fn modulo(l: Int, r: Int) -> Result<Int, RuntimeError> {
    if r == 0 {
        return Err(RuntimeError::DivisionByZero);
    }
    let m = l.checked_rem(r).ok_or(RuntimeError::ArithmeticOverflow)?;
    if m != 0 && ((m < 0) != (r < 0)) {
        Ok(m + r)
    } else {
        Ok(m)
    }
}

fn float_mod(l: f64, r: f64) -> Result<f64, RuntimeError> {
    if r == 0.0 {
        return Err(RuntimeError::DivisionByZero);
    }
    let m = l % r;
    if m != 0.0 && ((m < 0.0) != (r < 0.0)) {
        Ok(m + r)
    } else {
        Ok(m)
    }
}

/// Upper bound on the length of sequences built by repetition.
const MAX_REPEAT: usize = 1 << 24;

fn repeat_len(len: usize, n: Int) -> Result<usize, RuntimeError> {
    let total = len.saturating_mul(n.max(0) as usize);
    if total > MAX_REPEAT {
        return Err(RuntimeError::ArithmeticOverflow);
    }
    Ok(total)
}

fn repeat(items: &[Value], n: Int) -> Result<Vec<Value>, RuntimeError> {
    let total = repeat_len(items.len(), n)?;
    Ok(items.iter().cloned().cycle().take(total).collect())
}

impl BinOp {
    pub fn semantic(&self, l: &Value, r: &Value) -> Result<Value, RuntimeError> {
        if let (Some(a), Some(b)) = (num(l), num(r)) {
            return self.numeric(a, b, l, r);
        }
        Ok(match (self, l, r) {
            (BinOp::Add, Value::Str(a), Value::Str(b)) => Value::Str(format!("{a}{b}")),
            (BinOp::Add, Value::Bytes(a), Value::Bytes(b)) => {
                Value::Bytes(a.iter().chain(b).copied().collect())
            }
            (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
                Value::Tuple(a.iter().chain(b).cloned().collect())
            }
            (BinOp::Add, Value::List(a), Value::List(b)) => {
                let items: Vec<Value> = a.borrow().iter().chain(b.borrow().iter()).cloned().collect();
                Value::list(items)
            }
            (BinOp::Mul, Value::Str(s), Value::Int(n)) | (BinOp::Mul, Value::Int(n), Value::Str(s)) => {
                repeat_len(s.len(), *n)?;
                Value::Str(s.repeat((*n).max(0) as usize))
            }
            (BinOp::Mul, Value::List(items), Value::Int(n))
            | (BinOp::Mul, Value::Int(n), Value::List(items)) => {
                Value::list(repeat(&items.borrow(), *n)?)
            }
            (BinOp::Mul, Value::Tuple(items), Value::Int(n)) => Value::Tuple(repeat(items, *n)?),
            (BinOp::Sub, Value::Set(a), Value::Set(b)) => {
                Value::set(a.borrow().difference(&b.borrow()).cloned().collect::<Vec<_>>())
            }
            (BinOp::BitAnd, Value::Set(a), Value::Set(b)) => {
                Value::set(a.borrow().intersection(&b.borrow()).cloned().collect::<Vec<_>>())
            }
            (BinOp::BitOr, Value::Set(a), Value::Set(b)) => {
                Value::set(a.borrow().union(&b.borrow()).cloned().collect::<Vec<_>>())
            }
            (BinOp::BitXor, Value::Set(a), Value::Set(b)) => Value::set(
                a.borrow()
                    .symmetric_difference(&b.borrow())
                    .cloned()
                    .collect::<Vec<_>>(),
            ),
            _ => return Err(unsupported(self, l, r)),
        })
    }

    fn numeric(&self, a: Num, b: Num, l: &Value, r: &Value) -> Result<Value, RuntimeError> {
        let overflow = RuntimeError::ArithmeticOverflow;
        let bools = matches!((l, r), (Value::Bool(_), Value::Bool(_)));
        Ok(match (a, b) {
            (Num::Int(a), Num::Int(b)) => match self {
                BinOp::Add => Value::Int(a.checked_add(b).ok_or(overflow)?),
                BinOp::Sub => Value::Int(a.checked_sub(b).ok_or(overflow)?),
                BinOp::Mul => Value::Int(a.checked_mul(b).ok_or(overflow)?),
                BinOp::Div => {
                    if b == 0 {
                        return Err(RuntimeError::DivisionByZero);
                    }
                    Value::Float(a as f64 / b as f64)
                }
                BinOp::FloorDiv => Value::Int(floor_div(a, b)?),
                BinOp::Mod => Value::Int(modulo(a, b)?),
                BinOp::Pow if b >= 0 => Value::Int(
                    u32::try_from(b)
                        .ok()
                        .and_then(|b| a.checked_pow(b))
                        .ok_or(overflow)?,
                ),
                BinOp::Pow => Value::Float((a as f64).powf(b as f64)),
                BinOp::BitAnd if bools => Value::Bool(a & b != 0),
                BinOp::BitOr if bools => Value::Bool(a | b != 0),
                BinOp::BitXor if bools => Value::Bool(a ^ b != 0),
                BinOp::BitAnd => Value::Int(a & b),
                BinOp::BitOr => Value::Int(a | b),
                BinOp::BitXor => Value::Int(a ^ b),
                BinOp::Shl | BinOp::Shr if b < 0 => {
                    return Err(RuntimeError::ValueError {
                        message: "negative shift count".to_string(),
                    })
                }
                BinOp::Shl => Value::Int(
                    u32::try_from(b)
                        .ok()
                        .and_then(|b| a.checked_shl(b))
                        .filter(|v| v >> b == a)
                        .ok_or(overflow)?,
                ),
                BinOp::Shr => Value::Int(a >> b.min(63)),
            },
            (a, b) => {
                let (a, b) = (to_f64(a), to_f64(b));
                match self {
                    BinOp::Add => Value::Float(a + b),
                    BinOp::Sub => Value::Float(a - b),
                    BinOp::Mul => Value::Float(a * b),
                    BinOp::Div if b == 0.0 => return Err(RuntimeError::DivisionByZero),
                    BinOp::Div => Value::Float(a / b),
                    BinOp::FloorDiv if b == 0.0 => return Err(RuntimeError::DivisionByZero),
                    BinOp::FloorDiv => Value::Float((a / b).floor()),
                    BinOp::Mod => Value::Float(float_mod(a, b)?),
                    BinOp::Pow => Value::Float(a.powf(b)),
                    _ => return Err(unsupported(self, l, r)),
                }
            }
        })
    }
}

fn to_f64(n: Num) -> f64 {
    match n {
        Num::Int(n) => n as f64,
        Num::Float(f) => f,
    }
}

impl UnOp {
    pub fn semantic(&self, v: &Value) -> Result<Value, RuntimeError> {
        Ok(match (self, v) {
            (UnOp::Not, v) => Value::Bool(!v.truthy()),
            (UnOp::Neg, Value::Int(n)) => {
                Value::Int(n.checked_neg().ok_or(RuntimeError::ArithmeticOverflow)?)
            }
            (UnOp::Neg, Value::Bool(b)) => Value::Int(-(*b as Int)),
            (UnOp::Neg, Value::Float(f)) => Value::Float(-f),
            (UnOp::Neg, v) => {
                return Err(RuntimeError::TypeError {
                    message: format!("bad operand type for unary -: '{}'", v.type_name()),
                })
            }
        })
    }
}

fn comparable(l: &Value, r: &Value) -> bool {
    matches!(
        (l, r),
        (
            Value::Int(_) | Value::Float(_) | Value::Bool(_),
            Value::Int(_) | Value::Float(_) | Value::Bool(_)
        ) | (Value::Str(_), Value::Str(_))
            | (Value::Bytes(_), Value::Bytes(_))
            | (Value::List(_), Value::List(_))
            | (Value::Tuple(_), Value::Tuple(_))
    )
}

fn as_number(v: &Value) -> Value {
    match v {
        Value::Bool(b) => Value::Int(*b as Int),
        v => v.clone(),
    }
}

pub fn contains(container: &Value, item: &Value) -> Result<bool, RuntimeError> {
    Ok(match container {
        Value::List(items) => items.borrow().contains(item),
        Value::Tuple(items) => items.contains(item),
        Value::Set(items) => items.borrow().contains(item),
        Value::Map(entries) => entries.borrow().contains_key(item),
        Value::Str(s) => s.contains(item.as_str()?),
        Value::Bytes(b) => {
            let needle = u8::try_from(item.as_int()?).map_err(|_| RuntimeError::ValueError {
                message: "byte must be in range(0, 256)".to_string(),
            })?;
            b.contains(&needle)
        }
        v => {
            return Err(RuntimeError::TypeError {
                message: format!("argument of type '{}' is not iterable", v.type_name()),
            })
        }
    })
}

impl CmpOp {
    pub fn semantic(&self, l: &Value, r: &Value) -> Result<bool, RuntimeError> {
        Ok(match self {
            CmpOp::Eq => l == r,
            CmpOp::Ne => l != r,
            CmpOp::Is => l.is_same(r),
            CmpOp::IsNot => !l.is_same(r),
            CmpOp::In => contains(r, l)?,
            CmpOp::NotIn => !contains(r, l)?,
            CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
                if !comparable(l, r) {
                    return Err(RuntimeError::TypeError {
                        message: format!(
                            "'{self}' not supported between instances of '{}' and '{}'",
                            l.type_name(),
                            r.type_name()
                        ),
                    });
                }
                let ord = as_number(l).cmp(&as_number(r));
                match self {
                    CmpOp::Lt => ord.is_lt(),
                    CmpOp::Le => ord.is_le(),
                    CmpOp::Gt => ord.is_gt(),
                    _ => ord.is_ge(),
                }
            }
        })
    }
}

/// Normalizes a possibly negative index against `len`.
pub fn resolve_index(index: Int, len: usize) -> Result<usize, RuntimeError> {
    let resolved = if index < 0 { index + len as Int } else { index };
    if 0 <= resolved && (resolved as usize) < len {
        Ok(resolved as usize)
    } else {
        Err(RuntimeError::IndexOutOfBounds { index, len })
    }
}

pub fn subscript(container: &Value, index: &Value) -> Result<Value, RuntimeError> {
    Ok(match container {
        Value::List(items) => {
            let items = items.borrow();
            items[resolve_index(index.as_int()?, items.len())?].clone()
        }
        Value::Tuple(items) => items[resolve_index(index.as_int()?, items.len())?].clone(),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            Value::Str(chars[resolve_index(index.as_int()?, chars.len())?].to_string())
        }
        Value::Bytes(b) => Value::Int(b[resolve_index(index.as_int()?, b.len())?] as Int),
        Value::Map(entries) => entries
            .borrow()
            .get(index)
            .cloned()
            .ok_or_else(|| RuntimeError::KeyNotFound {
                key: index.to_string(),
            })?,
        v => {
            return Err(RuntimeError::TypeError {
                message: format!("'{}' object is not subscriptable", v.type_name()),
            })
        }
    })
}

pub fn attribute(value: &Value, attr: &str) -> Result<Value, RuntimeError> {
    match value {
        Value::Record(r) => r
            .borrow()
            .fields
            .get(attr)
            .cloned()
            .ok_or_else(|| RuntimeError::NoAttribute {
                ty: value.type_name(),
                attr: attr.to_string(),
            }),
        Value::Function(f) if attr == "__name__" => Ok(Value::Str(f.name.0.clone())),
        v => Err(RuntimeError::NoAttribute {
            ty: v.type_name(),
            attr: attr.to_string(),
        }),
    }
}

pub fn set_attribute(target: &Value, attr: &str, value: Value) -> Result<(), RuntimeError> {
    match target {
        Value::Record(r) => {
            r.borrow_mut().fields.insert(attr.to_string(), value);
            Ok(())
        }
        v => Err(RuntimeError::NoAttribute {
            ty: v.type_name(),
            attr: attr.to_string(),
        }),
    }
}

pub fn set_item(container: &Value, index: &Value, value: Value) -> Result<(), RuntimeError> {
    match container {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let idx = resolve_index(index.as_int()?, items.len())?;
            items[idx] = value;
            Ok(())
        }
        Value::Map(entries) => {
            require_hashable(index)?;
            let mut map = entries.take();
            map.insert(index.clone(), value);
            *entries.borrow_mut() = map;
            Ok(())
        }
        v => Err(RuntimeError::TypeError {
            message: format!(
                "'{}' object does not support item assignment",
                v.type_name()
            ),
        }),
    }
}

/// Mutable containers cannot be set elements or map keys.
pub fn require_hashable(value: &Value) -> Result<(), RuntimeError> {
    match value {
        Value::List(_) | Value::Set(_) | Value::Map(_) => Err(RuntimeError::TypeError {
            message: format!("unhashable type: '{}'", value.type_name()),
        }),
        Value::Tuple(items) => items.iter().try_for_each(require_hashable),
        _ => Ok(()),
    }
}

pub fn same_function(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
        _ => false,
    }
}
