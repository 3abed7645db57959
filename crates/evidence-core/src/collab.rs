//! Optional collaborators the orchestrator can delegate to.
//!
//! None of these are implemented here. When a pass is enabled but no
//! collaborator is installed the obligation is skipped.

use evidence_lang::Kwargs;

use crate::subject::SubjectFunction;

pub trait CoverageService {
    /// Measures which parts of the subject the given inputs exercise.
    fn measure(
        &self,
        subject: &SubjectFunction,
        examples: &[Kwargs],
    ) -> Result<serde_json::Value, String>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProofOutcome {
    Verified { detail: serde_json::Value },
    Disproved { counterexample: serde_json::Value },
    Inconclusive { reason: String },
    Unavailable { reason: String },
}

pub trait SymbolicBackend {
    fn prove(&self, subject: &SubjectFunction) -> ProofOutcome;
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct InferredProperty {
    pub name: String,
    pub holds: bool,
}

pub trait PropertyInference {
    /// Candidate properties of the subject, each tested against it.
    fn infer(&self, subject: &SubjectFunction) -> Vec<InferredProperty>;
}

pub trait SuggestionService {
    /// Suggested contracts, as human readable text.
    fn suggest(&self, subject: &SubjectFunction) -> Vec<String>;
}

/// The collaborators installed on a verifier.
#[derive(Default)]
pub struct Collaborators {
    pub coverage: Option<Box<dyn CoverageService>>,
    pub symbolic: Option<Box<dyn SymbolicBackend>>,
    pub inference: Option<Box<dyn PropertyInference>>,
    pub suggestions: Option<Box<dyn SuggestionService>>,
}
