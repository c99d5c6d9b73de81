//! Target Declarations
//!
//! A [`Benchmark`] is what a benchmark binary declares: one function, the
//! ordered list of [`Target`]s it is run against, and the source text that
//! is stored with every result.

use crate::recorder::Recorder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use thiserror::Error;

/// Function measured for every sample of every target
pub type BenchFn = fn(&Recorder, &Parameters) -> anyhow::Result<()>;

/// Errors reading a target parameter
#[derive(Debug, Error)]
pub enum ParameterError {
    #[error("missing parameter `{0}`")]
    Missing(String),

    #[error("parameter `{key}` has the wrong type: {source}")]
    Type {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("parameters are not a JSON object: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Named arguments passed to the bench function
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(Map<String, Value>);

impl Parameters {
    /// Empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter, replacing any previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Typed lookup
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, ParameterError> {
        let value = self
            .0
            .get(key)
            .ok_or_else(|| ParameterError::Missing(key.to_string()))?;
        T::deserialize(value).map_err(|source| ParameterError::Type {
            key: key.to_string(),
            source,
        })
    }

    /// Typed lookup with a fallback for absent keys
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, ParameterError> {
        match self.get(key) {
            Err(ParameterError::Missing(_)) => Ok(default),
            other => other,
        }
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no parameters
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encode for the worker channel
    pub fn to_json(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }

    /// Decode from the worker channel
    pub fn from_json(json: &str) -> Result<Self, ParameterError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut parameters = Parameters::new();
        for (key, value) in iter {
            parameters.insert(key, value);
        }
        parameters
    }
}

/// One tracked benchmark unit.
///
/// `id` is the key results are merged under across runs and must stay
/// stable; `name` and `parameters` may change freely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Stable unique key
    pub id: String,
    /// Display name
    pub name: String,
    /// Arguments for the bench function
    #[serde(default)]
    pub parameters: Parameters,
    /// Per-target sample count
    #[serde(default)]
    pub samples: Option<u32>,
}

impl Target {
    /// Target with no parameters
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parameters: Parameters::new(),
            samples: None,
        }
    }

    /// Add a parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key, value);
        self
    }

    /// Override the sample count for this target
    pub fn samples(mut self, samples: u32) -> Self {
        self.samples = Some(samples);
        self
    }
}

/// Invalid benchmark declaration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BenchmarkError {
    #[error("target #{0} has an empty id")]
    EmptyId(usize),

    #[error("target id `{0}` is declared more than once")]
    DuplicateId(String),

    #[error("target `{0}` requests zero samples")]
    ZeroSamples(String),

    #[error("suite-level sample count must be at least 1")]
    ZeroSuiteSamples,
}

/// A bench function with the targets it is tracked against
#[derive(Debug, Clone)]
pub struct Benchmark {
    bench: BenchFn,
    targets: Vec<Target>,
    code: String,
    samples: Option<u32>,
}

impl Benchmark {
    /// Declare a benchmark around `bench`
    pub fn new(bench: BenchFn) -> Self {
        Self {
            bench,
            targets: Vec::new(),
            code: String::new(),
            samples: None,
        }
    }

    /// Append a target
    pub fn target(mut self, target: Target) -> Self {
        self.targets.push(target);
        self
    }

    /// Append several targets
    pub fn targets(mut self, targets: impl IntoIterator<Item = Target>) -> Self {
        self.targets.extend(targets);
        self
    }

    /// Source text stored with every result, usually `include_str!` of the
    /// benchmark file itself
    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    /// Sample count for every target without its own override. Takes
    /// precedence over configuration.
    pub fn samples(mut self, samples: u32) -> Self {
        self.samples = Some(samples);
        self
    }

    /// The bench function
    pub fn bench_fn(&self) -> BenchFn {
        self.bench
    }

    /// Declared targets, in run order
    pub fn target_list(&self) -> &[Target] {
        &self.targets
    }

    /// Source text
    pub fn source(&self) -> &str {
        &self.code
    }

    /// Suite-level sample override
    pub fn sample_override(&self) -> Option<u32> {
        self.samples
    }

    /// Check ids are non-empty and unique and no sample count is zero
    pub fn validate(&self) -> Result<(), BenchmarkError> {
        if self.samples == Some(0) {
            return Err(BenchmarkError::ZeroSuiteSamples);
        }

        let mut seen = HashSet::new();
        for (index, target) in self.targets.iter().enumerate() {
            if target.id.is_empty() {
                return Err(BenchmarkError::EmptyId(index));
            }
            if !seen.insert(target.id.as_str()) {
                return Err(BenchmarkError::DuplicateId(target.id.clone()));
            }
            if target.samples == Some(0) {
                return Err(BenchmarkError::ZeroSamples(target.id.clone()));
            }
        }
        Ok(())
    }
}
