use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::{error::Result, subject::QualifiedName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pass,
    Fail,
    Error,
    Skip,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Pass => "pass",
            Status::Fail => "fail",
            Status::Error => "error",
            Status::Skip => "skip",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObligationKind {
    ContractsSmoke,
    EnsuresHoldsOnSmoke,
    RequiresSatisfiable,
    PureStatic,
    PureDynamic,
    EquivToSpec,
    MutationScore,
    Coverage,
    SymbolicProof,
    InferredProperties,
    SpecSuggestions,
}

impl fmt::Display for ObligationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObligationKind::ContractsSmoke => "contracts_smoke",
            ObligationKind::EnsuresHoldsOnSmoke => "ensures_holds_on_smoke",
            ObligationKind::RequiresSatisfiable => "requires_satisfiable",
            ObligationKind::PureStatic => "pure_static",
            ObligationKind::PureDynamic => "pure_dynamic",
            ObligationKind::EquivToSpec => "equiv_to_spec",
            ObligationKind::MutationScore => "mutation_score",
            ObligationKind::Coverage => "coverage",
            ObligationKind::SymbolicProof => "symbolic_proof",
            ObligationKind::InferredProperties => "inferred_properties",
            ObligationKind::SpecSuggestions => "spec_suggestions",
        };
        write!(f, "{s}")
    }
}

/// The verdict on one obligation of one function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObligationResult {
    pub function: QualifiedName,
    pub obligation: ObligationKind,
    pub status: Status,
    pub details: serde_json::Value,
    #[serde(rename = "duration_s", serialize_with = "seconds")]
    pub duration: Duration,
}

fn seconds<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64((d.as_secs_f64() * 1000.0).round() / 1000.0)
}

impl fmt::Display for ObligationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}",
            self.status, self.function, self.obligation
        )?;
        let note = ["error", "reason", "message"]
            .iter()
            .find_map(|k| self.details.get(*k).and_then(|v| v.as_str()));
        if let Some(note) = note {
            write!(f, ": {note}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrustedFunction {
    pub function: QualifiedName,
}

/// The functions of a module that went through verification. How each
/// obligation fared is in the obligation records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrustSummary {
    pub module: String,
    #[serde(serialize_with = "rfc3339")]
    pub timestamp: DateTime<Utc>,
    pub functions: Vec<TrustedFunction>,
}

fn rfc3339<S: Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub pass: usize,
    pub fail: usize,
    pub error: usize,
    pub skip: usize,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.pass + self.fail + self.error + self.skip
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} passed, {} failed, {} errors, {} skipped",
            self.pass, self.fail, self.error, self.skip
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleReport {
    pub results: Vec<ObligationResult>,
    pub trust: TrustSummary,
}

impl ModuleReport {
    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for r in &self.results {
            match r.status {
                Status::Pass => summary.pass += 1,
                Status::Fail => summary.fail += 1,
                Status::Error => summary.error += 1,
                Status::Skip => summary.skip += 1,
            }
        }
        summary
    }

    pub fn is_failure(&self) -> bool {
        self.results
            .iter()
            .any(|r| matches!(r.status, Status::Fail | Status::Error))
    }

    /// The result of `obligation` for the function with the unqualified
    /// name `function`.
    pub fn result(&self, function: &str, obligation: ObligationKind) -> Option<&ObligationResult> {
        self.results
            .iter()
            .find(|r| r.function.name == function && r.obligation == obligation)
    }

    /// Writes `<module>.obligations.json` and `<module>.trust.json` into
    /// `dir`, creating it if needed.
    pub fn persist(&self, dir: &Path) -> Result<(PathBuf, PathBuf)> {
        std::fs::create_dir_all(dir)?;
        let obligations = dir.join(format!("{}.obligations.json", self.trust.module));
        let trust = dir.join(format!("{}.trust.json", self.trust.module));
        std::fs::write(&obligations, serde_json::to_string_pretty(&self.results)?)?;
        std::fs::write(&trust, serde_json::to_string_pretty(&self.trust)?)?;
        tracing::debug!(obligations = %obligations.display(), trust = %trust.display(), "persisted report");
        Ok((obligations, trust))
    }
}
