#[cfg(test)]
mod tests;

pub mod bundle;
pub mod collab;
pub mod config;
pub mod engine;
pub mod equiv;
pub mod error;
pub mod gn;
pub mod mutate;
pub mod purity;
pub mod report;
pub mod search;
pub mod subject;

pub use bundle::{Comparator, HealthCheck, ObligationBundle, Predicate, PurityConfig, ReferenceSpec};
pub use config::VerifyConfig;
pub use engine::Verifier;
pub use error::{CallError, ContractViolation, Error, Result};
pub use report::{ModuleReport, ObligationKind, ObligationResult, Status};
pub use subject::{Callable, QualifiedName, SubjectFunction, SubjectModule};
