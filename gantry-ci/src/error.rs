//! Error types for CI configuration parsing

use thiserror::Error;

/// Errors that can occur while parsing a CI configuration document
///
/// Any of these aborts the whole parse: the worker never receives a
/// partial plan.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document is not valid YAML
    #[error("configuration is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// No top-level `jobs` section exists
    #[error("configuration has no top-level `jobs` section")]
    MissingJobs,

    /// The `jobs` section is not a mapping of job name to job body
    #[error("`jobs` section is not a mapping")]
    MalformedJobs,

    /// A job name is not a plain string
    #[error("job name is not a string")]
    InvalidJobName,

    /// A job's `steps` entry is not a sequence
    #[error("`steps` of job `{0}` is not a sequence")]
    MalformedSteps(String),

    /// A step could not be decoded
    #[error("invalid step in job `{job}`: {source}")]
    InvalidStep {
        job: String,
        source: serde_yaml::Error,
    },
}
