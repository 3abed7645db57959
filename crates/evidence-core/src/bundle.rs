//! Contracts attached to a subject function.

use std::{collections::BTreeSet, fmt, rc::Rc, str::FromStr, time::Duration};

use evidence_lang::{
    ast::Expr,
    builtins::is_close,
    Kwargs, Module, RuntimeError, Value,
};
use serde::{Deserialize, Serialize};

use crate::subject::{Callable, SubjectFunction};

pub type NativePredicate = Rc<dyn Fn(&Kwargs, Option<&Value>) -> Result<bool, RuntimeError>>;

/// A boolean check over the arguments of a call, and for postconditions also
/// over its `result`.
#[derive(Clone)]
pub enum Predicate {
    Native { name: String, f: NativePredicate },
    /// Evaluated in the subject's module with the arguments bound as locals.
    Expr(Expr),
}

impl Predicate {
    pub fn native(
        name: impl Into<String>,
        f: impl Fn(&Kwargs, Option<&Value>) -> Result<bool, RuntimeError> + 'static,
    ) -> Predicate {
        Predicate::Native {
            name: name.into(),
            f: Rc::new(f),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Predicate::Native { name, .. } => name.clone(),
            Predicate::Expr(e) => e.to_string(),
        }
    }

    /// Returns the failure message when the predicate does not hold.
    pub(crate) fn check(
        &self,
        module: &Module,
        args: &Kwargs,
        result: Option<&Value>,
    ) -> Result<(), String> {
        let outcome = match self {
            Predicate::Native { f, .. } => f(args, result),
            Predicate::Expr(e) => {
                let mut locals = args.clone();
                if let Some(result) = result {
                    locals.insert("result".to_string(), result.clone());
                }
                module.eval(e, &locals).map(|v| v.truthy())
            }
        };
        match outcome {
            Ok(true) => Ok(()),
            Ok(false) => Err(format!("{} returned False", self.label())),
            Err(e) => Err(format!("{} raised: {e}", self.label())),
        }
    }
}

impl From<Expr> for Predicate {
    fn from(e: Expr) -> Self {
        Predicate::Expr(e)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Native { name, .. } => f.debug_tuple("Native").field(name).finish(),
            Predicate::Expr(e) => f.debug_tuple("Expr").field(&e.to_string()).finish(),
        }
    }
}

/// How two results are judged equal.
#[derive(Clone, Default)]
pub enum Comparator {
    #[default]
    Structural,
    /// Floats compared with a relative and absolute tolerance, sequences
    /// element-wise, everything else structurally.
    Approx { rel_tol: f64, abs_tol: f64 },
    Custom(Rc<dyn Fn(&Value, &Value) -> bool>),
}

impl Comparator {
    pub fn approx() -> Comparator {
        Comparator::Approx {
            rel_tol: 1e-5,
            abs_tol: 1e-8,
        }
    }
    pub fn custom(f: impl Fn(&Value, &Value) -> bool + 'static) -> Comparator {
        Comparator::Custom(Rc::new(f))
    }

    pub fn equal(&self, a: &Value, b: &Value) -> bool {
        match self {
            Comparator::Structural => a == b,
            Comparator::Approx { rel_tol, abs_tol } => {
                approx_equal(a, b, *rel_tol, *abs_tol, &mut Vec::new())
            }
            Comparator::Custom(f) => f(a, b),
        }
    }
}

/// `pending` holds the list pairs being compared further up, which are
/// assumed equal when met again.
fn approx_equal(
    a: &Value,
    b: &Value,
    rel_tol: f64,
    abs_tol: f64,
    pending: &mut Vec<(i64, i64)>,
) -> bool {
    match (a, b) {
        (Value::Float(_), Value::Float(_) | Value::Int(_)) | (Value::Int(_), Value::Float(_)) => {
            match (a.as_float(), b.as_float()) {
                (Ok(x), Ok(y)) => is_close(x, y, rel_tol, abs_tol),
                _ => false,
            }
        }
        (Value::List(_) | Value::Tuple(_), Value::List(_) | Value::Tuple(_)) => {
            let pair = (a.identity(), b.identity());
            if a.is_same(b) || pending.contains(&pair) {
                return true;
            }
            match (a.elements(), b.elements()) {
                (Ok(xs), Ok(ys)) => {
                    pending.push(pair);
                    let equal = xs.len() == ys.len()
                        && xs
                            .iter()
                            .zip(&ys)
                            .all(|(x, y)| approx_equal(x, y, rel_tol, abs_tol, pending));
                    pending.pop();
                    equal
                }
                _ => false,
            }
        }
        _ => a == b,
    }
}

impl FromStr for Comparator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "structural" | "eq" => Ok(Comparator::Structural),
            "approx" => Ok(Comparator::approx()),
            _ => Err(format!("unknown comparator `{s}`")),
        }
    }
}

impl fmt::Debug for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparator::Structural => write!(f, "Structural"),
            Comparator::Approx { rel_tol, abs_tol } => f
                .debug_struct("Approx")
                .field("rel_tol", rel_tol)
                .field("abs_tol", abs_tol)
                .finish(),
            Comparator::Custom(_) => write!(f, "Custom"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthCheck {
    TooSlow,
    FilterTooMuch,
}

impl fmt::Display for HealthCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthCheck::TooSlow => write!(f, "too_slow"),
            HealthCheck::FilterTooMuch => write!(f, "filter_too_much"),
        }
    }
}

/// A trusted implementation the subject is checked against.
#[derive(Debug, Clone)]
pub struct ReferenceSpec {
    pub name: String,
    pub callable: Callable,
    pub comparator: Comparator,
    pub max_examples: u32,
    /// Per-example time budget during randomized confirmation; examples that
    /// exceed it are inconclusive.
    pub deadline: Option<Duration>,
    pub suppress: BTreeSet<HealthCheck>,
}

impl ReferenceSpec {
    pub fn new(name: impl Into<String>, callable: Callable) -> ReferenceSpec {
        ReferenceSpec {
            name: name.into(),
            callable,
            comparator: Comparator::default(),
            max_examples: 200,
            deadline: None,
            suppress: [HealthCheck::TooSlow, HealthCheck::FilterTooMuch].into(),
        }
    }
    /// Uses another subject function, typically one marked reference-only.
    pub fn of(subject: &SubjectFunction) -> ReferenceSpec {
        ReferenceSpec::new(subject.name().to_string(), subject.callable().clone())
    }

    pub fn comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = comparator;
        self
    }
    pub fn max_examples(mut self, n: u32) -> Self {
        self.max_examples = n;
        self
    }
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
    pub fn suppress(mut self, checks: impl IntoIterator<Item = HealthCheck>) -> Self {
        self.suppress = checks.into_iter().collect();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PurityMode {
    Strict,
    SeedDeterministic,
}

impl fmt::Display for PurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PurityMode::Strict => write!(f, "strict"),
            PurityMode::SeedDeterministic => write!(f, "seed-deterministic"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PurityConfig {
    /// Setting a seed selects seed-deterministic mode.
    pub seed: Option<u64>,
    pub comparator: Comparator,
}

impl PurityConfig {
    pub fn strict() -> PurityConfig {
        PurityConfig::default()
    }
    pub fn seeded(seed: u64) -> PurityConfig {
        PurityConfig {
            seed: Some(seed),
            ..PurityConfig::default()
        }
    }
    pub fn comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = comparator;
        self
    }
    pub fn mode(&self) -> PurityMode {
        match self.seed {
            Some(_) => PurityMode::SeedDeterministic,
            None => PurityMode::Strict,
        }
    }
}

/// Every obligation attached to one function.
#[derive(Debug, Clone, Default)]
pub struct ObligationBundle {
    pub requires: Vec<Predicate>,
    pub ensures: Vec<Predicate>,
    pub spec: Option<ReferenceSpec>,
    pub purity: Option<PurityConfig>,
    pub reference_only: bool,
}
