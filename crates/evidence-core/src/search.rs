//! Example search and shrinking, delegated to `proptest`'s test runner.

use std::fmt::Debug;

use proptest::{
    strategy::Strategy,
    test_runner::{
        Config as ProptestConfig, RngAlgorithm, TestCaseError, TestError, TestRng, TestRunner,
    },
};

use crate::error::{Error, Result};

/// How a single generated input fared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    /// The input is not valid for this search and does not count as a case.
    Reject,
    Fail(String),
}

#[derive(Debug)]
pub enum Outcome<T> {
    Passed,
    /// The smallest failing input the runner could shrink to.
    Failed { minimal: T, reason: String },
    /// The runner gave up, usually after rejecting too many inputs.
    Aborted { reason: String },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Search {
    seed: Option<u64>,
}

impl Search {
    pub fn new(seed: Option<u64>) -> Self {
        Self { seed }
    }

    fn runner(&self, cases: u32) -> TestRunner {
        let config = ProptestConfig {
            cases,
            max_global_rejects: cases.saturating_mul(10).max(1024),
            max_shrink_iters: 4096,
            failure_persistence: None,
            ..ProptestConfig::default()
        };
        match self.seed {
            Some(seed) => TestRunner::new_with_rng(config, seeded_rng(seed)),
            None => TestRunner::new(config),
        }
    }

    /// Runs `test` on up to `cases` accepted inputs, shrinking the first
    /// failure.
    pub fn run<S>(&self, strategy: &S, cases: u32, test: impl Fn(&S::Value) -> Verdict) -> Outcome<S::Value>
    where
        S: Strategy,
        S::Value: Debug,
    {
        let mut runner = self.runner(cases);
        let res = runner.run(strategy, |value| match test(&value) {
            Verdict::Pass => Ok(()),
            Verdict::Reject => Err(TestCaseError::reject("input rejected")),
            Verdict::Fail(reason) => Err(TestCaseError::fail(reason)),
        });
        match res {
            Ok(()) => Outcome::Passed,
            Err(TestError::Fail(reason, minimal)) => Outcome::Failed {
                minimal,
                reason: reason.message().to_string(),
            },
            Err(TestError::Abort(reason)) => Outcome::Aborted {
                reason: reason.message().to_string(),
            },
        }
    }

    /// Looks for an input satisfying `pred` among `attempts` candidates and
    /// returns a minimal one.
    pub fn find<S>(&self, strategy: &S, attempts: u32, pred: impl Fn(&S::Value) -> bool) -> Result<Option<S::Value>>
    where
        S: Strategy,
        S::Value: Debug,
    {
        let outcome = self.run(strategy, attempts, |value| {
            if pred(value) {
                Verdict::Fail("found".to_string())
            } else {
                Verdict::Pass
            }
        });
        match outcome {
            Outcome::Passed => Ok(None),
            Outcome::Failed { minimal, .. } => Ok(Some(minimal)),
            Outcome::Aborted { reason } => Err(Error::Search { reason }),
        }
    }
}

fn seeded_rng(seed: u64) -> TestRng {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&seed.to_le_bytes());
    TestRng::from_seed(RngAlgorithm::ChaCha, &bytes)
}
