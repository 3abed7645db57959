use std::cmp::Ordering;

use indexmap::IndexMap;
use itertools::Itertools;
use rand::{seq::SliceRandom, Rng};

use crate::{
    ast::{BinOp, CmpOp, Int},
    host::{Host, Stream},
    semantics::{require_hashable, resolve_index, RuntimeError},
    value::{Shared, Value},
};

macro_rules! builtins {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// Functions available to interpreted code without being defined in
        /// its module.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum Builtin {
            $($variant),*
        }

        impl Builtin {
            pub const ALL: &'static [Builtin] = &[$(Builtin::$variant),*];

            pub fn name(&self) -> &'static str {
                match self {
                    $(Builtin::$variant => $name),*
                }
            }
        }
    };
}

builtins! {
    Len => "len",
    Range => "range",
    Sorted => "sorted",
    Sum => "sum",
    Min => "min",
    Max => "max",
    Abs => "abs",
    List => "list",
    Tuple => "tuple",
    Set => "set",
    Dict => "dict",
    Str => "str",
    Int => "int",
    Float => "float",
    Bool => "bool",
    Enumerate => "enumerate",
    Zip => "zip",
    Reversed => "reversed",
    Any => "any",
    All => "all",
    Ord => "ord",
    Chr => "chr",
    Sqrt => "math.sqrt",
    Floor => "math.floor",
    IsClose => "math.isclose",
    Print => "print",
    Input => "input",
    Open => "open",
    StdoutWrite => "sys.stdout.write",
    StderrWrite => "sys.stderr.write",
    Random => "random.random",
    RandInt => "random.randint",
    Choice => "random.choice",
    Shuffle => "random.shuffle",
    Seed => "random.seed",
    Time => "time.time",
    Now => "datetime.now",
    Uuid4 => "uuid.uuid4",
    Uuid1 => "uuid.uuid1",
    Id => "id",
    Hash => "hash",
    SetAttr => "setattr",
    DelAttr => "delattr",
    Globals => "globals",
    Exec => "exec",
    Eval => "eval",
}

/// What a builtin may reach besides its arguments.
pub struct BuiltinCtx<'a> {
    pub host: &'a Host,
    pub globals: &'a Shared<IndexMap<String, Value>>,
}

fn arity(b: Builtin, args: &[Value], min: usize, max: usize) -> Result<(), RuntimeError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{min}")
        } else {
            format!("from {min} to {max}")
        };
        return Err(RuntimeError::Arity {
            function: b.name().to_string(),
            message: format!("takes {expected} arguments ({} given)", args.len()),
        });
    }
    Ok(())
}

fn sort_values(items: &mut [Value]) -> Result<(), RuntimeError> {
    for (a, b) in items.iter().tuple_windows() {
        CmpOp::Lt.semantic(a, b)?;
    }
    items.sort();
    Ok(())
}

fn extremum(b: Builtin, args: &[Value], pick: Ordering) -> Result<Value, RuntimeError> {
    let items = match args {
        [single] => single.elements()?,
        many => many.to_vec(),
    };
    let mut best: Option<Value> = None;
    for item in items {
        best = Some(match best {
            Some(cur) => {
                let better = match pick {
                    Ordering::Greater => CmpOp::Lt.semantic(&cur, &item)?,
                    _ => CmpOp::Lt.semantic(&item, &cur)?,
                };
                if better {
                    item
                } else {
                    cur
                }
            }
            None => item,
        });
    }
    best.ok_or_else(|| RuntimeError::ValueError {
        message: format!("{}() arg is an empty sequence", b.name()),
    })
}

impl Builtin {
    /// Resolves a plain or dotted name such as `len` or `sys.stdout.write`.
    pub fn lookup(name: &str) -> Option<Builtin> {
        match name {
            "datetime.datetime.now" => Some(Builtin::Now),
            "math.fabs" => Some(Builtin::Abs),
            _ => Builtin::ALL.iter().copied().find(|b| b.name() == name),
        }
    }

    /// Module prefixes that only exist to qualify builtins.
    pub fn is_module(name: &str) -> bool {
        Builtin::ALL
            .iter()
            .any(|b| b.name().starts_with(name) && b.name()[name.len()..].starts_with('.'))
    }

    pub fn call(&self, ctx: &BuiltinCtx<'_>, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let b = *self;
        Ok(match b {
            Builtin::Len => {
                arity(b, &args, 1, 1)?;
                Value::Int(args[0].len()? as Int)
            }
            Builtin::Range => {
                arity(b, &args, 1, 3)?;
                let (start, stop, step) = match args.as_slice() {
                    [stop] => (0, stop.as_int()?, 1),
                    [start, stop] => (start.as_int()?, stop.as_int()?, 1),
                    [start, stop, step] => (start.as_int()?, stop.as_int()?, step.as_int()?),
                    _ => unreachable!(),
                };
                if step == 0 {
                    return Err(RuntimeError::ValueError {
                        message: "range() arg 3 must not be zero".to_string(),
                    });
                }
                let len = if step > 0 {
                    (stop.saturating_sub(start).max(0) as u64).div_ceil(step as u64)
                } else {
                    (start.saturating_sub(stop).max(0) as u64).div_ceil(step.unsigned_abs())
                };
                let max_steps = ctx.host.limits().max_steps;
                if len > max_steps {
                    return Err(RuntimeError::FuelExhausted { steps: max_steps });
                }
                Value::ints((0..len as Int).map(|i| start + i * step))
            }
            Builtin::Sorted => {
                arity(b, &args, 1, 1)?;
                let mut items = args[0].elements()?;
                sort_values(&mut items)?;
                Value::list(items)
            }
            Builtin::Sum => {
                arity(b, &args, 1, 2)?;
                let start = args.get(1).cloned().unwrap_or(Value::Int(0));
                args[0]
                    .elements()?
                    .iter()
                    .try_fold(start, |acc, v| BinOp::Add.semantic(&acc, v))?
            }
            Builtin::Min => extremum(b, &args, Ordering::Less)?,
            Builtin::Max => extremum(b, &args, Ordering::Greater)?,
            Builtin::Abs => {
                arity(b, &args, 1, 1)?;
                match &args[0] {
                    Value::Float(f) => Value::Float(f.abs()),
                    v => Value::Int(
                        v.as_int()?
                            .checked_abs()
                            .ok_or(RuntimeError::ArithmeticOverflow)?,
                    ),
                }
            }
            Builtin::List => {
                arity(b, &args, 0, 1)?;
                match args.first() {
                    Some(v) => Value::list(v.elements()?),
                    None => Value::list([]),
                }
            }
            Builtin::Tuple => {
                arity(b, &args, 0, 1)?;
                match args.first() {
                    Some(v) => Value::tuple(v.elements()?),
                    None => Value::tuple([]),
                }
            }
            Builtin::Set => {
                arity(b, &args, 0, 1)?;
                match args.first() {
                    Some(v) => {
                        let items = v.elements()?;
                        items.iter().try_for_each(require_hashable)?;
                        Value::set(items)
                    }
                    None => Value::set([]),
                }
            }
            Builtin::Dict => {
                arity(b, &args, 0, 1)?;
                match args.first() {
                    Some(Value::Map(entries)) => Value::map(entries.borrow().clone()),
                    Some(v) => Value::map(
                        v.elements()?
                            .into_iter()
                            .map(|pair| match pair.elements()?.as_slice() {
                                [k, v] => require_hashable(k).map(|()| (k.clone(), v.clone())),
                                _ => Err(RuntimeError::ValueError {
                                    message: "dictionary update sequence element has wrong length"
                                        .to_string(),
                                }),
                            })
                            .collect::<Result<Vec<_>, _>>()?,
                    ),
                    None => Value::map([]),
                }
            }
            Builtin::Str => {
                arity(b, &args, 0, 1)?;
                match args.first() {
                    Some(Value::Str(s)) => Value::Str(s.clone()),
                    Some(v) => Value::Str(v.to_string()),
                    None => Value::str(""),
                }
            }
            Builtin::Int => {
                arity(b, &args, 0, 1)?;
                match args.first() {
                    None => Value::Int(0),
                    Some(Value::Float(f)) if f.is_finite() && f.abs() < 9.2e18 => {
                        Value::Int(f.trunc() as Int)
                    }
                    Some(Value::Float(_)) => return Err(RuntimeError::ArithmeticOverflow),
                    Some(Value::Str(s)) => Value::Int(s.trim().parse().map_err(|_| {
                        RuntimeError::ValueError {
                            message: format!("invalid literal for int(): {s:?}"),
                        }
                    })?),
                    Some(v) => Value::Int(v.as_int()?),
                }
            }
            Builtin::Float => {
                arity(b, &args, 0, 1)?;
                match args.first() {
                    None => Value::Float(0.0),
                    Some(Value::Str(s)) => Value::Float(s.trim().parse().map_err(|_| {
                        RuntimeError::ValueError {
                            message: format!("could not convert string to float: {s:?}"),
                        }
                    })?),
                    Some(v) => Value::Float(v.as_float()?),
                }
            }
            Builtin::Bool => {
                arity(b, &args, 0, 1)?;
                Value::Bool(args.first().is_some_and(Value::truthy))
            }
            Builtin::Enumerate => {
                arity(b, &args, 1, 2)?;
                let start = args.get(1).map(Value::as_int).transpose()?.unwrap_or(0);
                Value::list(
                    args[0]
                        .elements()?
                        .into_iter()
                        .enumerate()
                        .map(|(i, v)| Value::tuple([Value::Int(start + i as Int), v])),
                )
            }
            Builtin::Zip => {
                let columns = args
                    .iter()
                    .map(Value::elements)
                    .collect::<Result<Vec<_>, _>>()?;
                let len = columns.iter().map(Vec::len).min().unwrap_or(0);
                Value::list(
                    (0..len).map(|i| Value::tuple(columns.iter().map(|c| c[i].clone()))),
                )
            }
            Builtin::Reversed => {
                arity(b, &args, 1, 1)?;
                let mut items = args[0].elements()?;
                items.reverse();
                Value::list(items)
            }
            Builtin::Any => {
                arity(b, &args, 1, 1)?;
                Value::Bool(args[0].elements()?.iter().any(Value::truthy))
            }
            Builtin::All => {
                arity(b, &args, 1, 1)?;
                Value::Bool(args[0].elements()?.iter().all(Value::truthy))
            }
            Builtin::Ord => {
                arity(b, &args, 1, 1)?;
                let s = args[0].as_str()?;
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Value::Int(c as Int),
                    _ => {
                        return Err(RuntimeError::TypeError {
                            message: format!(
                                "ord() expected a character, but string of length {} found",
                                s.chars().count()
                            ),
                        })
                    }
                }
            }
            Builtin::Chr => {
                arity(b, &args, 1, 1)?;
                let n = args[0].as_int()?;
                let c = u32::try_from(n)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| RuntimeError::ValueError {
                        message: format!("chr() arg not in range: {n}"),
                    })?;
                Value::Str(c.to_string())
            }
            Builtin::Sqrt => {
                arity(b, &args, 1, 1)?;
                let x = args[0].as_float()?;
                if x < 0.0 {
                    return Err(RuntimeError::ValueError {
                        message: "math domain error".to_string(),
                    });
                }
                Value::Float(x.sqrt())
            }
            Builtin::Floor => {
                arity(b, &args, 1, 1)?;
                match &args[0] {
                    Value::Float(f) if f.is_finite() && f.abs() < 9.2e18 => {
                        Value::Int(f.floor() as Int)
                    }
                    Value::Float(_) => return Err(RuntimeError::ArithmeticOverflow),
                    v => Value::Int(v.as_int()?),
                }
            }
            Builtin::IsClose => {
                arity(b, &args, 2, 4)?;
                let (a, c) = (args[0].as_float()?, args[1].as_float()?);
                let rel = args.get(2).map(Value::as_float).transpose()?.unwrap_or(1e-9);
                let abs = args.get(3).map(Value::as_float).transpose()?.unwrap_or(0.0);
                Value::Bool(is_close(a, c, rel, abs))
            }
            Builtin::Print => {
                let line = args
                    .iter()
                    .map(|v| match v {
                        Value::Str(s) => s.clone(),
                        v => v.to_string(),
                    })
                    .join(" ");
                ctx.host.write(Stream::Stdout, &format!("{line}\n"));
                Value::None
            }
            Builtin::StdoutWrite | Builtin::StderrWrite => {
                arity(b, &args, 1, 1)?;
                let text = args[0].as_str()?;
                let stream = if b == Builtin::StdoutWrite {
                    Stream::Stdout
                } else {
                    Stream::Stderr
                };
                ctx.host.write(stream, text);
                Value::Int(text.chars().count() as Int)
            }
            Builtin::Input => {
                return Err(RuntimeError::Unsupported {
                    what: "reading from stdin".to_string(),
                })
            }
            Builtin::Open => {
                return Err(RuntimeError::Unsupported {
                    what: "file access".to_string(),
                })
            }
            Builtin::Exec | Builtin::Eval => {
                return Err(RuntimeError::Unsupported {
                    what: format!("{}()", b.name()),
                })
            }
            Builtin::Random => {
                arity(b, &args, 0, 0)?;
                Value::Float(ctx.host.with_rng(|rng| rng.gen::<f64>()))
            }
            Builtin::RandInt => {
                arity(b, &args, 2, 2)?;
                let (lo, hi) = (args[0].as_int()?, args[1].as_int()?);
                if lo > hi {
                    return Err(RuntimeError::ValueError {
                        message: format!("empty range for randint({lo}, {hi})"),
                    });
                }
                Value::Int(ctx.host.with_rng(|rng| rng.gen_range(lo..=hi)))
            }
            Builtin::Choice => {
                arity(b, &args, 1, 1)?;
                let items = args[0].elements()?;
                ctx.host
                    .with_rng(|rng| items.choose(rng).cloned())
                    .ok_or_else(|| RuntimeError::raised("Cannot choose from an empty sequence"))?
            }
            Builtin::Shuffle => {
                arity(b, &args, 1, 1)?;
                match &args[0] {
                    Value::List(items) => {
                        ctx.host.with_rng(|rng| items.borrow_mut().shuffle(rng));
                        Value::None
                    }
                    v => return Err(RuntimeError::expected("list", v)),
                }
            }
            Builtin::Seed => {
                arity(b, &args, 0, 1)?;
                let seed = match args.first() {
                    Some(v) => v.as_int()? as u64,
                    None => ctx.host.with_rng(|rng| rng.gen()),
                };
                ctx.host.reseed(seed);
                Value::None
            }
            Builtin::Time | Builtin::Now => {
                arity(b, &args, 0, 0)?;
                Value::Float(ctx.host.now())
            }
            Builtin::Uuid4 => {
                arity(b, &args, 0, 0)?;
                Value::Str(ctx.host.uuid4())
            }
            Builtin::Uuid1 => {
                arity(b, &args, 0, 0)?;
                Value::Str(ctx.host.uuid1())
            }
            Builtin::Id => {
                arity(b, &args, 1, 1)?;
                Value::Int(args[0].identity())
            }
            Builtin::Hash => {
                arity(b, &args, 1, 1)?;
                use std::hash::{Hash, Hasher};
                match &args[0] {
                    v @ (Value::List(_) | Value::Set(_) | Value::Map(_)) => {
                        return Err(RuntimeError::TypeError {
                            message: format!("unhashable type: '{}'", v.type_name()),
                        })
                    }
                    v => {
                        let mut hasher = std::collections::hash_map::DefaultHasher::new();
                        v.hash(&mut hasher);
                        Value::Int(hasher.finish() as Int)
                    }
                }
            }
            Builtin::SetAttr => {
                arity(b, &args, 3, 3)?;
                crate::semantics::set_attribute(&args[0], args[1].as_str()?, args[2].clone())?;
                Value::None
            }
            Builtin::DelAttr => {
                arity(b, &args, 2, 2)?;
                let attr = args[1].as_str()?;
                match &args[0] {
                    Value::Record(r) if r.borrow().fields.contains_key(attr) => {
                        r.borrow_mut().fields.shift_remove(attr);
                    }
                    v => {
                        return Err(RuntimeError::NoAttribute {
                            ty: v.type_name(),
                            attr: attr.to_string(),
                        })
                    }
                }
                Value::None
            }
            Builtin::Globals => {
                arity(b, &args, 0, 0)?;
                Value::map(
                    ctx.globals
                        .borrow()
                        .iter()
                        .map(|(k, v)| (Value::str(k), v.clone())),
                )
            }
        })
    }
}

pub fn is_close(a: f64, b: f64, rel_tol: f64, abs_tol: f64) -> bool {
    if a == b {
        return true;
    }
    if a.is_infinite() || b.is_infinite() {
        return false;
    }
    (a - b).abs() <= (rel_tol * b.abs().max(a.abs())).max(abs_tol)
}

fn no_method(v: &Value, method: &str) -> RuntimeError {
    RuntimeError::NoAttribute {
        ty: v.type_name(),
        attr: method.to_string(),
    }
}

fn method_arity(method: &str, args: &[Value], min: usize, max: usize) -> Result<(), RuntimeError> {
    if args.len() < min || args.len() > max {
        return Err(RuntimeError::Arity {
            function: method.to_string(),
            message: format!("takes from {min} to {max} arguments ({} given)", args.len()),
        });
    }
    Ok(())
}

/// Calls `receiver.method(*args)` for the methods of builtin containers.
pub fn call_method(receiver: &Value, method: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    match receiver {
        Value::List(items) => list_method(receiver, items, method, args),
        Value::Set(items) => match method {
            "add" | "discard" => {
                method_arity(method, &args, 1, 1)?;
                require_hashable(&args[0])?;
                // Elements may refer back to the set, so it is not borrowed while comparing.
                let mut set = items.take();
                if method == "add" {
                    set.insert(args[0].clone());
                } else {
                    set.remove(&args[0]);
                }
                *items.borrow_mut() = set;
                Ok(Value::None)
            }
            "copy" => Ok(Value::set(items.borrow().iter().cloned())),
            _ => Err(no_method(receiver, method)),
        },
        Value::Map(entries) => match method {
            "get" => {
                method_arity(method, &args, 1, 2)?;
                Ok(entries
                    .borrow()
                    .get(&args[0])
                    .cloned()
                    .unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
            }
            "keys" => Ok(Value::list(entries.borrow().keys().cloned())),
            "values" => Ok(Value::list(entries.borrow().values().cloned())),
            "items" => Ok(Value::list(
                entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| Value::tuple([k.clone(), v.clone()])),
            )),
            "copy" => Ok(Value::map(entries.borrow().clone())),
            _ => Err(no_method(receiver, method)),
        },
        Value::Str(s) => str_method(receiver, s, method, args),
        v => Err(no_method(v, method)),
    }
}

fn list_method(
    receiver: &Value,
    items: &Shared<Vec<Value>>,
    method: &str,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    Ok(match method {
        "append" => {
            method_arity(method, &args, 1, 1)?;
            items.borrow_mut().push(args[0].clone());
            Value::None
        }
        "extend" => {
            method_arity(method, &args, 1, 1)?;
            let extra = args[0].elements()?;
            items.borrow_mut().extend(extra);
            Value::None
        }
        "insert" => {
            method_arity(method, &args, 2, 2)?;
            let mut items = items.borrow_mut();
            let len = items.len() as Int;
            let idx = args[0].as_int()?;
            let idx = if idx < 0 { (idx + len).max(0) } else { idx.min(len) };
            items.insert(idx as usize, args[1].clone());
            Value::None
        }
        "pop" => {
            method_arity(method, &args, 0, 1)?;
            let mut items = items.borrow_mut();
            if items.is_empty() {
                return Err(RuntimeError::raised("pop from empty list"));
            }
            let idx = match args.first() {
                Some(i) => resolve_index(i.as_int()?, items.len())?,
                None => items.len() - 1,
            };
            items.remove(idx)
        }
        "index" => {
            method_arity(method, &args, 1, 1)?;
            let pos = items.borrow().iter().position(|v| v == &args[0]);
            Value::Int(pos.ok_or_else(|| RuntimeError::ValueError {
                message: format!("{} is not in list", args[0]),
            })? as Int)
        }
        "count" => {
            method_arity(method, &args, 1, 1)?;
            Value::Int(items.borrow().iter().filter(|v| *v == &args[0]).count() as Int)
        }
        "copy" => Value::list(items.borrow().iter().cloned()),
        "sort" => {
            method_arity(method, &args, 0, 0)?;
            let mut sorted = items.take();
            let res = sort_values(&mut sorted);
            *items.borrow_mut() = sorted;
            res?;
            Value::None
        }
        "reverse" => {
            method_arity(method, &args, 0, 0)?;
            items.borrow_mut().reverse();
            Value::None
        }
        _ => return Err(no_method(receiver, method)),
    })
}

fn str_method(receiver: &Value, s: &str, method: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    Ok(match method {
        "join" => {
            method_arity(method, &args, 1, 1)?;
            let parts = args[0]
                .elements()?
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Result<Vec<_>, _>>()?;
            Value::Str(parts.join(s))
        }
        "upper" => Value::Str(s.to_uppercase()),
        "lower" => Value::Str(s.to_lowercase()),
        "isalpha" => Value::Bool(!s.is_empty() && s.chars().all(char::is_alphabetic)),
        "islower" => Value::Bool(
            s.chars().any(char::is_lowercase) && !s.chars().any(char::is_uppercase),
        ),
        "startswith" => {
            method_arity(method, &args, 1, 1)?;
            Value::Bool(s.starts_with(args[0].as_str()?))
        }
        "split" => {
            method_arity(method, &args, 0, 1)?;
            match args.first() {
                Some(sep) => {
                    let sep = sep.as_str()?;
                    if sep.is_empty() {
                        return Err(RuntimeError::ValueError {
                            message: "empty separator".to_string(),
                        });
                    }
                    Value::list(s.split(sep).map(Value::str))
                }
                None => Value::list(s.split_whitespace().map(Value::str)),
            }
        }
        _ => return Err(no_method(receiver, method)),
    })
}
