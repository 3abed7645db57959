use std::{
    cell::RefCell,
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt::{self, Debug, Display},
    hash::{Hash, Hasher},
    rc::Rc,
    thread::LocalKey,
};

use indexmap::IndexMap;
use itertools::Itertools;
use serde::{ser::SerializeMap, Serialize};

use crate::{
    ast::{Function, Int, Literal},
    builtins::Builtin,
    semantics::RuntimeError,
};

pub type Shared<T> = Rc<RefCell<T>>;

fn addr<T>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc) as *const () as usize
}

thread_local! {
    static COMPARING: RefCell<Vec<(usize, usize)>> = const { RefCell::new(Vec::new()) };
    static HASHING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
    static DISPLAYING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
    static SERIALIZING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Marks a container as being traversed until dropped.
struct Visit<K: 'static> {
    stack: Option<&'static LocalKey<RefCell<Vec<K>>>>,
}

/// `None` if `key` is already being traversed, i.e. the value contains itself.
fn visit<K: PartialEq + 'static>(
    stack: &'static LocalKey<RefCell<Vec<K>>>,
    key: K,
) -> Option<Visit<K>> {
    stack.with(|s| {
        let mut s = s.borrow_mut();
        if s.contains(&key) {
            return None;
        }
        s.push(key);
        Some(Visit { stack: Some(stack) })
    })
}

impl<K: 'static> Drop for Visit<K> {
    fn drop(&mut self) {
        if let Some(stack) = self.stack {
            stack.with(|s| {
                s.borrow_mut().pop();
            });
        }
    }
}

/// Named arguments of a call, in parameter order.
pub type Kwargs = IndexMap<String, Value>;

/// A runtime value.
///
/// Lists, sets, maps and records are shared references: cloning a [`Value`]
/// aliases them. Use [`Value::deep_copy`] for an independent copy.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(Int),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<Value>),
    List(Shared<Vec<Value>>),
    Set(Shared<BTreeSet<Value>>),
    Map(Shared<BTreeMap<Value, Value>>),
    Record(Shared<Record>),
    Function(Rc<Function>),
    Builtin(Builtin),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub name: String,
    pub fields: IndexMap<String, Value>,
}

impl Value {
    pub fn str(s: impl Into<String>) -> Value {
        Value::Str(s.into())
    }
    pub fn list(items: impl IntoIterator<Item = Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items.into_iter().collect())))
    }
    pub fn tuple(items: impl IntoIterator<Item = Value>) -> Value {
        Value::Tuple(items.into_iter().collect())
    }
    pub fn set(items: impl IntoIterator<Item = Value>) -> Value {
        Value::Set(Rc::new(RefCell::new(items.into_iter().collect())))
    }
    pub fn map(entries: impl IntoIterator<Item = (Value, Value)>) -> Value {
        Value::Map(Rc::new(RefCell::new(entries.into_iter().collect())))
    }
    pub fn record(name: impl Into<String>, fields: impl IntoIterator<Item = (String, Value)>) -> Value {
        Value::Record(Rc::new(RefCell::new(Record {
            name: name.into(),
            fields: fields.into_iter().collect(),
        })))
    }
    pub fn ints(items: impl IntoIterator<Item = Int>) -> Value {
        Value::list(items.into_iter().map(Value::Int))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Tuple(_) => "tuple",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "dict",
            Value::Record(_) => "record",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin_function",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::Tuple(t) => !t.is_empty(),
            Value::List(l) => !l.borrow().is_empty(),
            Value::Set(s) => !s.borrow().is_empty(),
            Value::Map(m) => !m.borrow().is_empty(),
            Value::Record(_) | Value::Function(_) | Value::Builtin(_) => true,
        }
    }

    /// A structurally equal value sharing no mutable state with `self`.
    ///
    /// Aliasing inside the value is preserved, including containers that
    /// contain themselves.
    pub fn deep_copy(&self) -> Value {
        self.copy_with(&mut HashMap::new())
    }

    fn copy_with(&self, copies: &mut HashMap<usize, Value>) -> Value {
        if let Some(copy) = self.address().and_then(|a| copies.get(&a)) {
            return copy.clone();
        }
        match self {
            Value::Tuple(items) => {
                Value::Tuple(items.iter().map(|v| v.copy_with(copies)).collect())
            }
            Value::List(items) => {
                let copy = Rc::new(RefCell::new(Vec::new()));
                copies.insert(addr(items), Value::List(copy.clone()));
                let elements: Vec<_> = items.borrow().iter().map(|v| v.copy_with(copies)).collect();
                *copy.borrow_mut() = elements;
                Value::List(copy)
            }
            Value::Set(items) => {
                let copy = Rc::new(RefCell::new(BTreeSet::new()));
                copies.insert(addr(items), Value::Set(copy.clone()));
                let elements: BTreeSet<_> =
                    items.borrow().iter().map(|v| v.copy_with(copies)).collect();
                *copy.borrow_mut() = elements;
                Value::Set(copy)
            }
            Value::Map(entries) => {
                let copy = Rc::new(RefCell::new(BTreeMap::new()));
                copies.insert(addr(entries), Value::Map(copy.clone()));
                let entries: BTreeMap<_, _> = entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.copy_with(copies), v.copy_with(copies)))
                    .collect();
                *copy.borrow_mut() = entries;
                Value::Map(copy)
            }
            Value::Record(r) => {
                let name = r.borrow().name.clone();
                let copy = Rc::new(RefCell::new(Record {
                    name,
                    fields: IndexMap::new(),
                }));
                copies.insert(addr(r), Value::Record(copy.clone()));
                let fields: IndexMap<_, _> = r
                    .borrow()
                    .fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.copy_with(copies)))
                    .collect();
                copy.borrow_mut().fields = fields;
                Value::Record(copy)
            }
            v => v.clone(),
        }
    }

    /// `None` if this is a container that is already being traversed.
    fn enter(&self, stack: &'static LocalKey<RefCell<Vec<usize>>>) -> Option<Visit<usize>> {
        match self.address() {
            Some(a) => visit(stack, a),
            None => Some(Visit { stack: None }),
        }
    }

    /// The allocation behind a mutable container.
    fn address(&self) -> Option<usize> {
        match self {
            Value::List(a) => Some(addr(a)),
            Value::Set(a) => Some(addr(a)),
            Value::Map(a) => Some(addr(a)),
            Value::Record(a) => Some(addr(a)),
            _ => None,
        }
    }

    /// Identity in the sense of `is`: shared values must be the same object,
    /// immutable values compare by value.
    pub fn is_same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Set(a), Value::Set(b)) => Rc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            (Value::Record(a), Value::Record(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::None, Value::None) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            _ => false,
        }
    }

    /// An address-like identity used by the `id` builtin.
    pub fn identity(&self) -> Int {
        match self {
            Value::List(a) => Rc::as_ptr(a) as usize as Int,
            Value::Set(a) => Rc::as_ptr(a) as usize as Int,
            Value::Map(a) => Rc::as_ptr(a) as usize as Int,
            Value::Record(a) => Rc::as_ptr(a) as usize as Int,
            Value::Function(a) => Rc::as_ptr(a) as usize as Int,
            v => v as *const Value as usize as Int,
        }
    }

    pub fn as_int(&self) -> Result<Int, RuntimeError> {
        match self {
            Value::Int(n) => Ok(*n),
            Value::Bool(b) => Ok(*b as Int),
            v => Err(RuntimeError::expected("int", v)),
        }
    }
    pub fn as_float(&self) -> Result<f64, RuntimeError> {
        match self {
            Value::Float(f) => Ok(*f),
            Value::Int(n) => Ok(*n as f64),
            Value::Bool(b) => Ok(*b as Int as f64),
            v => Err(RuntimeError::expected("float", v)),
        }
    }
    pub fn as_str(&self) -> Result<&str, RuntimeError> {
        match self {
            Value::Str(s) => Ok(s),
            v => Err(RuntimeError::expected("str", v)),
        }
    }
    /// The elements of any finite sequence-like value, in iteration order.
    pub fn elements(&self) -> Result<Vec<Value>, RuntimeError> {
        Ok(match self {
            Value::Tuple(items) => items.clone(),
            Value::List(items) => items.borrow().clone(),
            Value::Set(items) => items.borrow().iter().cloned().collect(),
            Value::Map(entries) => entries.borrow().keys().cloned().collect(),
            Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
            Value::Bytes(b) => b.iter().map(|&b| Value::Int(b as Int)).collect(),
            v => {
                return Err(RuntimeError::TypeError {
                    message: format!("'{}' object is not iterable", v.type_name()),
                })
            }
        })
    }
    pub fn len(&self) -> Result<usize, RuntimeError> {
        Ok(match self {
            Value::Str(s) => s.chars().count(),
            Value::Bytes(b) => b.len(),
            Value::Tuple(t) => t.len(),
            Value::List(l) => l.borrow().len(),
            Value::Set(s) => s.borrow().len(),
            Value::Map(m) => m.borrow().len(),
            v => {
                return Err(RuntimeError::TypeError {
                    message: format!("object of type '{}' has no len()", v.type_name()),
                })
            }
        })
    }

    /// Serializable snapshot of this value for reports.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::String(self.to_string()))
    }

    fn rank(&self) -> u8 {
        match self {
            Value::None => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Str(_) => 3,
            Value::Bytes(_) => 4,
            Value::Tuple(_) => 5,
            Value::List(_) => 6,
            Value::Set(_) => 7,
            Value::Map(_) => 8,
            Value::Record(_) => 9,
            Value::Function(_) => 10,
            Value::Builtin(_) => 11,
        }
    }
}

impl From<&Literal> for Value {
    fn from(lit: &Literal) -> Self {
        match lit {
            Literal::None => Value::None,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(n) => Value::Int(*n),
            Literal::Float(f) => Value::Float(*f),
            Literal::Str(s) => Value::Str(s.clone()),
            Literal::Bytes(b) => Value::Bytes(b.clone()),
        }
    }
}
impl From<Int> for Value {
    fn from(n: Int) -> Self {
        Value::Int(n)
    }
}
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}
impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::list(items)
    }
}

fn cmp_floats(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or_else(|| a.total_cmp(&b))
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        // A pair of containers met again while comparing them compares equal.
        let _visit = match (self.address(), other.address()) {
            (Some(a), Some(b)) if a != b => match visit(&COMPARING, (a, b)) {
                Some(v) => v,
                None => return Ordering::Equal,
            },
            _ => Visit { stack: None },
        };
        match (self, other) {
            (Value::None, Value::None) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Int(a), Value::Float(b)) => cmp_floats(*a as f64, *b),
            (Value::Float(a), Value::Int(b)) => cmp_floats(*a, *b as f64),
            (Value::Float(a), Value::Float(b)) => cmp_floats(*a, *b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (Value::Tuple(a), Value::Tuple(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ordering::Equal;
                }
                a.borrow().cmp(&*b.borrow())
            }
            (Value::Set(a), Value::Set(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ordering::Equal;
                }
                a.borrow().cmp(&*b.borrow())
            }
            (Value::Map(a), Value::Map(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ordering::Equal;
                }
                a.borrow().cmp(&*b.borrow())
            }
            (Value::Record(a), Value::Record(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ordering::Equal;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.name.cmp(&b.name).then_with(|| {
                    for ((ka, va), (kb, vb)) in a.fields.iter().zip(&b.fields) {
                        match ka.cmp(kb).then_with(|| va.cmp(vb)) {
                            Ordering::Equal => continue,
                            ord => return ord,
                        }
                    }
                    a.fields.len().cmp(&b.fields.len())
                })
            }
            (Value::Function(a), Value::Function(b)) => Rc::as_ptr(a).cmp(&Rc::as_ptr(b)),
            (Value::Builtin(a), Value::Builtin(b)) => a.name().cmp(b.name()),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        let Some(_visit) = self.enter(&HASHING) else {
            return;
        };
        match self {
            Value::None => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(n) => n.hash(state),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => (*f as Int).hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Str(s) => s.hash(state),
            Value::Bytes(b) => b.hash(state),
            Value::Tuple(items) => items.hash(state),
            Value::List(items) => items.borrow().hash(state),
            Value::Set(items) => items.borrow().iter().for_each(|v| v.hash(state)),
            Value::Map(entries) => entries.borrow().iter().for_each(|kv| kv.hash(state)),
            Value::Record(r) => {
                let r = r.borrow();
                r.name.hash(state);
                r.fields.iter().for_each(|kv| kv.hash(state));
            }
            Value::Function(f) => Rc::as_ptr(f).hash(state),
            Value::Builtin(b) => b.name().hash(state),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(_visit) = self.enter(&DISPLAYING) else {
            return match self {
                Value::Set(_) | Value::Map(_) => write!(f, "{{...}}"),
                Value::Record(r) => write!(f, "{}(...)", r.borrow().name),
                _ => write!(f, "[...]"),
            };
        };
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) if x.fract() == 0.0 && x.is_finite() => write!(f, "{x:.1}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "b{:?}", String::from_utf8_lossy(b)),
            Value::Tuple(items) if items.len() == 1 => write!(f, "({},)", items[0]),
            Value::Tuple(items) => write!(f, "({})", items.iter().format(", ")),
            Value::List(items) => write!(f, "[{}]", items.borrow().iter().format(", ")),
            Value::Set(items) if items.borrow().is_empty() => write!(f, "set()"),
            Value::Set(items) => write!(f, "{{{}}}", items.borrow().iter().format(", ")),
            Value::Map(entries) => write!(
                f,
                "{{{}}}",
                entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .format(", ")
            ),
            Value::Record(r) => {
                let r = r.borrow();
                write!(
                    f,
                    "{}({})",
                    r.name,
                    r.fields
                        .iter()
                        .map(|(k, v)| format!("{k}={v}"))
                        .format(", ")
                )
            }
            Value::Function(func) => write!(f, "<function {}>", func.name),
            Value::Builtin(b) => write!(f, "<built-in function {}>", b.name()),
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Some(_visit) = self.enter(&SERIALIZING) else {
            return serializer.serialize_str(&self.to_string());
        };
        match self {
            Value::None => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Bytes(b) => b.serialize(serializer),
            Value::Tuple(items) => items.serialize(serializer),
            Value::List(items) => items.borrow().serialize(serializer),
            Value::Set(items) => serializer.collect_seq(items.borrow().iter()),
            Value::Map(entries) => {
                let entries = entries.borrow();
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries.iter() {
                    match k {
                        Value::Str(s) => map.serialize_entry(s, v)?,
                        k => map.serialize_entry(&k.to_string(), v)?,
                    }
                }
                map.end()
            }
            Value::Record(r) => {
                let r = r.borrow();
                let mut map = serializer.serialize_map(Some(r.fields.len() + 1))?;
                map.serialize_entry("__record__", &r.name)?;
                for (k, v) in &r.fields {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            v => serializer.serialize_str(&v.to_string()),
        }
    }
}
