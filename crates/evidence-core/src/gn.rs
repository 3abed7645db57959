//! Input generators derived from declared parameter types.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    rc::Rc,
};

use evidence_lang::{
    ast::{Param, RecordType, Type},
    Kwargs, Value,
};
use proptest::{
    collection,
    prelude::*,
    strategy::{LazyJust, Union},
};

use crate::{
    config::UnknownTypePolicy,
    error::{Error, Result},
};

pub type ValueStrategy = BoxedStrategy<Value>;
pub type KwargsStrategy = BoxedStrategy<Kwargs>;

/// Nesting depth past which every type generates `None`.
pub const MAX_DEPTH: usize = 5;

/// Type constructors a factory can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeConstructor {
    Optional,
    Union,
    Tuple,
    List,
    Set,
    Map,
}

/// Limits in effect where a factory is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub max_size: usize,
    pub depth: usize,
}

/// Builds a strategy for a constructed type from the strategies of its
/// arguments, e.g. `[element]` for lists or `[key, value]` for maps.
pub type Factory = Rc<dyn Fn(&[ValueStrategy], Bounds) -> ValueStrategy>;

/// Generator overrides consulted before structural derivation.
#[derive(Clone, Default)]
pub struct GeneratorRegistry {
    overrides: HashMap<Type, ValueStrategy>,
    factories: HashMap<TypeConstructor, Factory>,
    records: HashMap<String, RecordType>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        ty: Type,
        strategy: impl Strategy<Value = Value> + 'static,
    ) -> &mut Self {
        self.overrides.insert(ty, strategy.boxed());
        self
    }
    pub fn register_factory(
        &mut self,
        ctor: TypeConstructor,
        factory: impl Fn(&[ValueStrategy], Bounds) -> ValueStrategy + 'static,
    ) -> &mut Self {
        self.factories.insert(ctor, Rc::new(factory));
        self
    }
    /// Makes `Type::Named(record.name)` resolvable.
    pub fn define_record(&mut self, record: RecordType) -> &mut Self {
        self.records.insert(record.name.clone(), record);
        self
    }
    pub fn record(&self, name: &str) -> Option<&RecordType> {
        self.records.get(name)
    }
}

impl fmt::Debug for GeneratorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorRegistry")
            .field("overrides", &self.overrides.keys().collect::<Vec<_>>())
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .field("records", &self.records.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Derives strategies for one function's parameters.
pub struct Synthesis<'r> {
    registry: &'r GeneratorRegistry,
    max_size: usize,
    policy: UnknownTypePolicy,
    degraded: BTreeSet<String>,
}

impl<'r> Synthesis<'r> {
    pub fn new(registry: &'r GeneratorRegistry, max_size: usize, policy: UnknownTypePolicy) -> Self {
        Self {
            registry,
            max_size,
            policy,
            degraded: BTreeSet::new(),
        }
    }

    /// Named types that fell back to `None`.
    pub fn degraded(&self) -> &BTreeSet<String> {
        &self.degraded
    }

    pub fn strategy(&mut self, ty: &Type) -> Result<ValueStrategy> {
        self.at_depth(ty, 0)
    }

    /// A strategy for complete argument maps. Parameters with a default
    /// sometimes take it as is.
    pub fn kwargs(&mut self, params: &[Param]) -> Result<KwargsStrategy> {
        let mut names = Vec::with_capacity(params.len());
        let mut strategies = Vec::with_capacity(params.len());
        for p in params {
            let s = self.strategy(&p.ty)?;
            let s = match &p.default {
                Some(default) => {
                    let default = default.clone();
                    prop_oneof![LazyJust::new(move || default.deep_copy()), s].boxed()
                }
                None => s,
            };
            names.push(p.name.0.clone());
            strategies.push(s);
        }
        Ok(strategies
            .prop_map(move |values| names.iter().cloned().zip(values).collect::<Kwargs>())
            .boxed())
    }

    fn at_depth(&mut self, ty: &Type, depth: usize) -> Result<ValueStrategy> {
        let registry = self.registry;
        if let Some(s) = registry.overrides.get(ty) {
            return Ok(s.clone());
        }
        if depth > MAX_DEPTH {
            return Ok(Just(Value::None).boxed());
        }
        let max = self.max_size;
        let bounds = Bounds {
            max_size: max,
            depth,
        };

        Ok(match ty {
            Type::Int => integers(),
            Type::Float => floats(),
            Type::Bool => any::<bool>().prop_map(Value::Bool).boxed(),
            Type::Str => text(max),
            Type::Bytes => collection::vec(any::<u8>(), 0..=max)
                .prop_map(Value::Bytes)
                .boxed(),
            Type::NoneType => Just(Value::None).boxed(),
            Type::Any => prop_oneof![
                Just(Value::None),
                any::<bool>().prop_map(Value::Bool),
                integers(),
                floats(),
                text(max),
            ]
            .boxed(),
            Type::Optional(inner) => {
                let inner = self.at_depth(inner, depth + 1)?;
                self.construct(TypeConstructor::Optional, vec![inner], bounds, |ch, _| {
                    prop_oneof![Just(Value::None), ch[0].clone()].boxed()
                })
            }
            Type::Union(members) => {
                let members = self.all_at_depth(members, depth + 1)?;
                self.construct(TypeConstructor::Union, members, bounds, |ch, _| {
                    if ch.is_empty() {
                        Just(Value::None).boxed()
                    } else {
                        Union::new(ch.to_vec()).boxed()
                    }
                })
            }
            Type::Tuple(items) => {
                let items = self.all_at_depth(items, depth + 1)?;
                self.construct(TypeConstructor::Tuple, items, bounds, |ch, _| {
                    ch.to_vec().prop_map(Value::Tuple).boxed()
                })
            }
            Type::List(elem) => {
                let elem = self.at_depth(elem, depth + 1)?;
                self.construct(TypeConstructor::List, vec![elem], bounds, |ch, b| {
                    let elem = ch[0].clone();
                    short_biased(b.max_size, move |n| {
                        collection::vec(elem.clone(), 0..=n)
                            .prop_map(|items| Value::list(items))
                            .boxed()
                    })
                })
            }
            Type::Set(elem) => {
                let elem = self.at_depth(elem, depth + 1)?;
                self.construct(TypeConstructor::Set, vec![elem], bounds, |ch, b| {
                    let elem = ch[0].clone();
                    short_biased(b.max_size, move |n| {
                        collection::btree_set(elem.clone(), 0..=n)
                            .prop_map(|items| Value::set(items))
                            .boxed()
                    })
                })
            }
            Type::Map(key, value) => {
                let key = self.at_depth(key, depth + 1)?;
                let value = self.at_depth(value, depth + 1)?;
                self.construct(TypeConstructor::Map, vec![key, value], bounds, |ch, b| {
                    let (key, value) = (ch[0].clone(), ch[1].clone());
                    short_biased(b.max_size, move |n| {
                        collection::btree_map(key.clone(), value.clone(), 0..=n)
                            .prop_map(|entries| Value::map(entries))
                            .boxed()
                    })
                })
            }
            Type::Record(record) => self.record(record, depth)?,
            Type::Named(name) => match registry.record(name) {
                Some(record) => self.record(record, depth)?,
                None => self.unknown(name)?,
            },
        })
    }

    fn all_at_depth(&mut self, types: &[Type], depth: usize) -> Result<Vec<ValueStrategy>> {
        types.iter().map(|t| self.at_depth(t, depth)).collect()
    }

    fn construct(
        &self,
        ctor: TypeConstructor,
        children: Vec<ValueStrategy>,
        bounds: Bounds,
        fallback: impl FnOnce(&[ValueStrategy], Bounds) -> ValueStrategy,
    ) -> ValueStrategy {
        match self.registry.factories.get(&ctor) {
            Some(factory) => factory(&children, bounds),
            None => fallback(&children, bounds),
        }
    }

    fn record(&mut self, record: &RecordType, depth: usize) -> Result<ValueStrategy> {
        let fields = record
            .fields
            .iter()
            .map(|(_, ty)| self.at_depth(ty, depth + 1))
            .collect::<Result<Vec<_>>>()?;
        let names = record
            .fields
            .iter()
            .map(|(name, _)| name.clone())
            .collect::<Vec<_>>();
        let name = record.name.clone();
        Ok(fields
            .prop_map(move |values| Value::record(name.clone(), names.iter().cloned().zip(values)))
            .boxed())
    }

    fn unknown(&mut self, name: &str) -> Result<ValueStrategy> {
        match self.policy {
            UnknownTypePolicy::Reject => Err(Error::Synthesis {
                ty: name.to_string(),
            }),
            UnknownTypePolicy::Degrade => {
                tracing::warn!(ty = name, "no generator for type, generating None");
                self.degraded.insert(name.to_string());
                Ok(Just(Value::None).boxed())
            }
        }
    }
}

/// Integers biased toward small magnitudes. The widest arm covers a quarter
/// of the 64-bit range, so doubling a generated integer cannot overflow.
fn integers() -> ValueStrategy {
    prop_oneof![
        8 => -10i64..=10,
        4 => -1_000i64..=1_000,
        2 => i64::from(i32::MIN)..=i64::from(i32::MAX),
        1 => (i64::MIN / 4)..=(i64::MAX / 4),
    ]
    .prop_map(Value::Int)
    .boxed()
}

fn floats() -> ValueStrategy {
    prop_oneof![3 => -100.0f64..100.0, 1 => -1e9f64..1e9]
        .prop_map(Value::Float)
        .boxed()
}

fn text(max: usize) -> ValueStrategy {
    prop_oneof![
        3 => collection::vec(proptest::char::range('a', 'z'), 0..=max),
        1 => collection::vec(any::<char>(), 0..=max),
    ]
    .prop_map(|chars| Value::Str(chars.into_iter().collect()))
    .boxed()
}

/// Prefers collections of at most three elements.
fn short_biased(max: usize, sized: impl Fn(usize) -> ValueStrategy) -> ValueStrategy {
    prop_oneof![3 => sized(max.min(3)), 1 => sized(max)].boxed()
}
