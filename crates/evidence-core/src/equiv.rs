//! Checking an implementation against its reference spec.
//!
//! The check runs in two phases. A targeted search first looks for any
//! input that satisfies the preconditions and breaks a postcondition, makes
//! the implementation and the spec disagree, or makes either raise. If none
//! is found the spec is confirmed on `max_examples` randomized inputs. Either
//! phase reports the smallest failing input it could shrink to.

use std::{cell::Cell, time::Duration};

use evidence_lang::{Kwargs, RuntimeError, Value};
use serde_json::json;

use crate::{
    bundle::{HealthCheck, ReferenceSpec},
    gn::KwargsStrategy,
    report::Status,
    search::{Outcome, Search, Verdict},
    subject::{args_json, copy_args, SubjectFunction},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Implementation,
    Spec,
}

/// Why an input counts against the implementation.
#[derive(Debug, Clone)]
pub enum Violation {
    Postcondition {
        args: Kwargs,
        result: Value,
        message: String,
    },
    Mismatch {
        args: Kwargs,
        actual: Value,
        expected: Value,
    },
    Raised {
        args: Kwargs,
        side: Side,
        error: RuntimeError,
    },
}

impl Violation {
    pub fn summary(&self) -> String {
        match self {
            Violation::Postcondition { message, .. } => format!("ensures failed: {message}"),
            Violation::Mismatch { .. } => "implementation disagrees with spec".to_string(),
            Violation::Raised {
                side: Side::Implementation,
                error,
                ..
            } => format!("implementation raised: {error}"),
            Violation::Raised {
                side: Side::Spec,
                error,
                ..
            } => format!("spec raised: {error}"),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Violation::Postcondition {
                args,
                result,
                message,
            } => json!({
                "kwargs": args_json(args),
                "impl_result": result.to_json(),
                "spec_result": null,
                "note": format!("ensures failed: {message}"),
            }),
            Violation::Mismatch {
                args,
                actual,
                expected,
            } => json!({
                "kwargs": args_json(args),
                "impl_result": actual.to_json(),
                "spec_result": expected.to_json(),
            }),
            Violation::Raised { args, error, .. } => json!({
                "kwargs": args_json(args),
                "error": self.summary(),
                "kind": if error.is_exhaustion() { "exhaustion" } else { "exception" },
            }),
        }
    }
}

/// The result of running one input through the implementation and
/// optionally its spec.
#[derive(Debug, Clone)]
pub enum Examination {
    Holds,
    /// The input does not satisfy the preconditions.
    Rejected,
    /// An invocation ran past the per-example deadline.
    Inconclusive,
    Violated(Violation),
}

/// Runs `subject` on independent copies of `args` and checks its
/// postconditions, then compares against `spec` when one is given.
///
/// Invocations running past `deadline` make the examination inconclusive.
pub fn examine(
    subject: &SubjectFunction,
    spec: Option<&ReferenceSpec>,
    args: &Kwargs,
    deadline: Option<Duration>,
) -> Examination {
    if subject.check_requires(args).is_err() {
        return Examination::Rejected;
    }
    let raised = |side, error| {
        Examination::Violated(Violation::Raised {
            args: args.clone(),
            side,
            error,
        })
    };

    let impl_args = copy_args(args);
    let actual = match subject.callable().invoke_within(&impl_args, deadline) {
        Ok(v) => v,
        Err(RuntimeError::DeadlineExceeded) => return Examination::Inconclusive,
        Err(e) => return raised(Side::Implementation, e),
    };
    if let Err(v) = subject.check_ensures(&impl_args, &actual) {
        return Examination::Violated(Violation::Postcondition {
            args: args.clone(),
            result: actual,
            message: v.message().to_string(),
        });
    }
    let Some(spec) = spec else {
        return Examination::Holds;
    };
    let expected = match spec.callable.invoke_within(&copy_args(args), deadline) {
        Ok(v) => v,
        Err(RuntimeError::DeadlineExceeded) => return Examination::Inconclusive,
        Err(e) => return raised(Side::Spec, e),
    };
    if spec.comparator.equal(&actual, &expected) {
        Examination::Holds
    } else {
        Examination::Violated(Violation::Mismatch {
            args: args.clone(),
            actual,
            expected,
        })
    }
}

pub struct Equivalence<'a> {
    pub subject: &'a SubjectFunction,
    pub spec: &'a ReferenceSpec,
    pub search: Search,
    pub attempts: u32,
}

impl Equivalence<'_> {
    pub fn check(&self, strategy: &KwargsStrategy) -> (Status, serde_json::Value) {
        // The deadline only governs the randomized confirmation.
        let try_input =
            |args: &Kwargs, deadline| examine(self.subject, Some(self.spec), args, deadline);
        let spec_name = &self.spec.name;

        tracing::debug!(function = %self.subject.name(), spec = %spec_name, "targeted search");
        match self.search.find(strategy, self.attempts, |args| {
            matches!(try_input(args, None), Examination::Violated(_))
        }) {
            Ok(Some(minimal)) => {
                let counterexample = match try_input(&minimal, None) {
                    Examination::Violated(v) => v.to_json(),
                    _ => json!({ "kwargs": args_json(&minimal), "note": "did not reproduce" }),
                };
                return (
                    Status::Fail,
                    json!({
                        "spec": spec_name,
                        "error": "counterexample found by targeted search",
                        "counterexample": counterexample,
                    }),
                );
            }
            Ok(None) => {}
            Err(e) => return (Status::Error, json!({ "spec": spec_name, "error": e.to_string() })),
        }

        tracing::debug!(function = %self.subject.name(), examples = self.spec.max_examples, "randomized confirmation");
        let accepted = Cell::new(0u32);
        let inconclusive = Cell::new(0u32);
        let outcome = self.search.run(strategy, self.spec.max_examples, |args| {
            match try_input(args, self.spec.deadline) {
                Examination::Holds => {
                    accepted.set(accepted.get() + 1);
                    Verdict::Pass
                }
                Examination::Inconclusive => {
                    accepted.set(accepted.get() + 1);
                    inconclusive.set(inconclusive.get() + 1);
                    Verdict::Pass
                }
                Examination::Rejected => Verdict::Reject,
                Examination::Violated(v) => Verdict::Fail(v.summary()),
            }
        });

        let (accepted, inconclusive) = (accepted.get(), inconclusive.get());
        let health = match outcome {
            Outcome::Failed { minimal, reason } => {
                let (error, counterexample) = match try_input(&minimal, self.spec.deadline) {
                    Examination::Violated(v) => (v.summary(), v.to_json()),
                    _ => (reason, json!({ "kwargs": args_json(&minimal) })),
                };
                return (
                    Status::Fail,
                    json!({
                        "spec": spec_name,
                        "error": error,
                        "counterexample": counterexample,
                    }),
                );
            }
            Outcome::Aborted { .. } if accepted == 0 => {
                return (
                    Status::Skip,
                    json!({ "spec": spec_name, "reason": "preconditions unsatisfiable" }),
                );
            }
            Outcome::Aborted { reason } => Some((HealthCheck::FilterTooMuch, reason)),
            Outcome::Passed if inconclusive * 2 > accepted => Some((
                HealthCheck::TooSlow,
                format!("{inconclusive} of {accepted} examples exceeded the deadline"),
            )),
            Outcome::Passed => None,
        };

        let mut details = json!({
            "spec": spec_name,
            "max_examples": self.spec.max_examples,
            "examples": accepted,
            "requires": self.subject.bundle().requires.len(),
            "ensures": self.subject.bundle().ensures.len(),
        });
        if inconclusive > 0 {
            details["inconclusive"] = json!(inconclusive);
        }
        match health {
            None => (Status::Pass, details),
            Some((check, reason)) if self.spec.suppress.contains(&check) => {
                tracing::warn!(function = %self.subject.name(), %check, "suppressed health check");
                details["warnings"] = json!([format!("{check}: {reason}")]);
                (Status::Pass, details)
            }
            Some((check, reason)) => (
                Status::Error,
                json!({
                    "spec": spec_name,
                    "error": format!("health check failed: {check}: {reason}"),
                }),
            ),
        }
    }
}
