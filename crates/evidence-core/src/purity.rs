//! Static and dynamic purity analysis.

use std::{fmt, ops::ControlFlow};

use evidence_lang::{
    ast::{Expr, Function, StmtKind},
    ast_ext::Node,
    Kwargs, RuntimeError,
};
use itertools::Itertools;
use serde::Serialize;

use crate::{
    bundle::{PurityConfig, PurityMode},
    subject::{copy_args, Callable},
};

const IO_NAMES: &[&str] = &["print", "open", "input"];
const IO_SUFFIXES: &[&str] = &[
    "sys.stdout",
    "sys.stderr",
    "sys.stdin",
    "stdout.write",
    "stderr.write",
];
const NONDETERMINISM_NAMES: &[&str] = &["random", "time.time", "datetime.now", "uuid4", "uuid1"];
const NONDETERMINISM_MODULES: &[&str] = &["random"];
const HASH_ADDR_NAMES: &[&str] = &["id", "hash"];
const GLOBAL_MUTATION_NAMES: &[&str] = &[
    "setattr",
    "delattr",
    "exec",
    "eval",
    "globals",
    "__import__",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Io,
    Nondeterminism,
    HashAddr,
    GlobalMutation,
    Unknown,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::Io => "io",
            Category::Nondeterminism => "nondeterminism",
            Category::HashAddr => "hash_addr",
            Category::GlobalMutation => "global_mutation",
            Category::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// A detected impure operation. An empty list of warnings does not prove a
/// function pure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImpurityWarning {
    pub category: Category,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl fmt::Display for ImpurityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.description)?;
        if let Some(line) = self.line {
            write!(f, " (line {line})")?;
        }
        Ok(())
    }
}

/// Inspects the body of `callable` for impure operations. Nondeterminism is
/// not reported in seed-deterministic mode.
pub fn static_check(callable: &Callable, mode: PurityMode) -> Vec<ImpurityWarning> {
    match callable.function() {
        Some(function) => inspect(function, mode),
        None => vec![ImpurityWarning {
            category: Category::Unknown,
            description: "could not retrieve source".to_string(),
            line: None,
        }],
    }
}

pub fn inspect(function: &Function, mode: PurityMode) -> Vec<ImpurityWarning> {
    let mut warnings = vec![];
    let _ = function.walk(&mut |node| {
        match node {
            Node::Expr(Expr::Call(callee, _), line) => {
                if let Some(name) = callee.dotted_name() {
                    for category in classify(&name, mode) {
                        warnings.push(ImpurityWarning {
                            category,
                            description: format!("call to {name}"),
                            line: Some(line),
                        });
                    }
                }
            }
            Node::Stmt(stmt) => {
                if let StmtKind::Global(names) = &stmt.kind {
                    warnings.push(ImpurityWarning {
                        category: Category::GlobalMutation,
                        description: format!("global statement: {}", names.iter().format(", ")),
                        line: Some(stmt.line),
                    });
                }
            }
            _ => {}
        }
        ControlFlow::Continue(())
    });
    warnings
}

fn classify(name: &str, mode: PurityMode) -> Vec<Category> {
    let mut categories = vec![];
    if IO_NAMES.contains(&name) || IO_SUFFIXES.iter().any(|s| name.ends_with(s)) {
        categories.push(Category::Io);
    }
    if mode == PurityMode::Strict {
        let root = name.split('.').next().unwrap_or(name);
        let by_name = NONDETERMINISM_NAMES
            .iter()
            .any(|n| name == *n || name.ends_with(&format!(".{n}")));
        if by_name || NONDETERMINISM_MODULES.contains(&root) {
            categories.push(Category::Nondeterminism);
        }
    }
    if HASH_ADDR_NAMES.contains(&name) {
        categories.push(Category::HashAddr);
    }
    if GLOBAL_MUTATION_NAMES.contains(&name) {
        categories.push(Category::GlobalMutation);
    }
    categories
}

/// Outcome of invoking a function twice on identical inputs.
#[derive(Debug, Clone, PartialEq)]
pub enum DynamicOutcome {
    Pure,
    Impure(String),
}

/// Calls `callable` twice on independent copies of `args` with console
/// output captured. In seed-deterministic mode the host PRNG is re-seeded
/// before each call.
pub fn dynamic_check(
    callable: &Callable,
    args: &Kwargs,
    config: &PurityConfig,
) -> Result<DynamicOutcome, RuntimeError> {
    let run = || {
        let args = copy_args(args);
        match callable.module() {
            Some(module) => {
                let host = module.host();
                if let Some(seed) = config.seed {
                    host.reseed(seed);
                }
                let (result, output) = host.capture(|| callable.invoke(&args));
                result.map(|r| (r, output))
            }
            None => callable.invoke(&args).map(|r| (r, Default::default())),
        }
    };
    let (first, first_out) = run()?;
    let (second, second_out) = run()?;

    let mut errors = vec![];
    if !config.comparator.equal(&first, &second) {
        errors.push(format!("results differ: {first} vs {second}"));
    }
    if !first_out.stdout.is_empty() || !second_out.stdout.is_empty() {
        errors.push("function produced stdout output".to_string());
    }
    if !first_out.stderr.is_empty() || !second_out.stderr.is_empty() {
        errors.push("function produced stderr output".to_string());
    }
    if errors.is_empty() {
        Ok(DynamicOutcome::Pure)
    } else {
        Ok(DynamicOutcome::Impure(errors.join("; ")))
    }
}
