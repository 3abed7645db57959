//! Knobs for a verification run, loadable from TOML.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Cardinality bound for generated collections.
    pub max_list_size: usize,
    /// Cardinality bound used when a single small example is wanted.
    pub smoke_max_list_size: usize,
    /// Inputs tried by each targeted search.
    pub search_attempts: u32,
    pub max_mutants: usize,
    pub mutation_threshold: f64,
    /// Statements an interpreted call may execute before it is stopped.
    pub fuel: u64,
    /// Fixes the example search so runs are reproducible.
    pub seed: Option<u64>,
    pub unknown_types: UnknownTypePolicy,
    pub features: Features,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            max_list_size: 20,
            smoke_max_list_size: 5,
            search_attempts: 1000,
            max_mutants: 50,
            mutation_threshold: 80.0,
            fuel: 200_000,
            seed: None,
            unknown_types: UnknownTypePolicy::default(),
            features: Features::default(),
        }
    }
}

impl VerifyConfig {
    pub fn from_toml(src: &str) -> Result<VerifyConfig> {
        Ok(toml::from_str(src)?)
    }
    pub fn load(path: &Path) -> Result<VerifyConfig> {
        let src = std::fs::read_to_string(path)?;
        Self::from_toml(&src)
    }
}

/// Optional passes. All are off unless requested.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    pub mutation: bool,
    pub coverage: bool,
    pub prove: bool,
    pub infer: bool,
    pub suggest: bool,
}

/// What to do with a parameter type no generator is known for.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownTypePolicy {
    /// Generate `None` and record the type in the obligation details.
    #[default]
    Degrade,
    /// Fail generator synthesis.
    Reject,
}
