//! CI configuration parser
//!
//! Parses the `ci.yaml` a repository carries into an ordered list of jobs.
//!
//! Steps must run in file order, and YAML mappings carry that order only
//! at the node level: deserializing the document into a keyed map type
//! (`HashMap`, `BTreeMap`, or a struct field of either) silently reorders
//! jobs and steps. The parser therefore walks `serde_yaml::Value` nodes —
//! whose `Mapping` iterates in insertion order — and takes job names and
//! step lists from their positional occurrence.

use gantry_core::domain::plan::{Job, Step};
use serde_yaml::Value;

use crate::error::ConfigError;

/// Parse a CI configuration document into an ordered execution plan
///
/// The document must contain a top-level `jobs` mapping. Each entry's key
/// is the job name; its value optionally carries a `steps` sequence where
/// each step decodes a `name` and a `run` shell line. Unknown fields on a
/// step are ignored; a step that fails to decode aborts the whole parse.
///
/// # Example
/// ```
/// let doc = br#"
/// jobs:
///   build:
///     steps:
///       - name: compile
///         run: make all
///   test:
///     steps:
///       - name: unit
///         run: make test
/// "#;
///
/// let jobs = gantry_ci::parse_jobs(doc)?;
/// assert_eq!(jobs[0].name, "build");
/// assert_eq!(jobs[1].steps[0].run, "make test");
/// # Ok::<(), gantry_ci::ConfigError>(())
/// ```
pub fn parse_jobs(data: &[u8]) -> Result<Vec<Job>, ConfigError> {
    let root: Value = serde_yaml::from_slice(data)?;

    let jobs_node = root.get("jobs").ok_or(ConfigError::MissingJobs)?;
    let jobs = jobs_node.as_mapping().ok_or(ConfigError::MalformedJobs)?;

    let mut plan = Vec::with_capacity(jobs.len());
    for (key, body) in jobs {
        let name = key.as_str().ok_or(ConfigError::InvalidJobName)?;

        let steps = match body.get("steps") {
            Some(node) => parse_steps(name, node)?,
            None => Vec::new(),
        };

        plan.push(Job {
            name: name.to_string(),
            steps,
        });
    }

    Ok(plan)
}

/// Parse the `steps` sequence of a single job, preserving order
fn parse_steps(job: &str, node: &Value) -> Result<Vec<Step>, ConfigError> {
    let sequence = node
        .as_sequence()
        .ok_or_else(|| ConfigError::MalformedSteps(job.to_string()))?;

    sequence
        .iter()
        .map(|raw| {
            serde_yaml::from_value(raw.clone()).map_err(|source| ConfigError::InvalidStep {
                job: job.to_string(),
                source,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(jobs: &[Job]) -> Vec<&str> {
        jobs.iter().map(|j| j.name.as_str()).collect()
    }

    #[test]
    fn parses_jobs_and_steps() {
        let doc = br#"
jobs:
  build:
    steps:
      - name: compile
        run: make all
      - name: lint
        run: make lint
  test:
    steps:
      - name: unit
        run: make test
"#;

        let jobs = parse_jobs(doc).unwrap();
        assert_eq!(names(&jobs), ["build", "test"]);
        assert_eq!(jobs[0].steps.len(), 2);
        assert_eq!(jobs[0].steps[0].name, "compile");
        assert_eq!(jobs[0].steps[1].run, "make lint");
        assert_eq!(jobs[1].steps[0].run, "make test");
    }

    #[test]
    fn preserves_declaration_order_over_sort_order() {
        // "zeta" sorts after "alpha" both alphabetically and by hash-map
        // iteration luck; declaration order must win.
        let doc = br#"
jobs:
  zeta:
    steps:
      - name: second-letter
        run: echo z
  alpha:
    steps:
      - name: first-letter
        run: echo a
"#;

        let jobs = parse_jobs(doc).unwrap();
        assert_eq!(names(&jobs), ["zeta", "alpha"]);
    }

    #[test]
    fn preserves_step_order_within_a_job() {
        let doc = br#"
jobs:
  build:
    steps:
      - name: zz
        run: echo 1
      - name: aa
        run: echo 2
      - name: mm
        run: echo 3
"#;

        let jobs = parse_jobs(doc).unwrap();
        let step_names: Vec<&str> = jobs[0].steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(step_names, ["zz", "aa", "mm"]);
    }

    #[test]
    fn missing_jobs_section_is_rejected() {
        let doc = b"steps:\n  - name: orphan\n    run: echo hi\n";
        assert!(matches!(parse_jobs(doc), Err(ConfigError::MissingJobs)));
    }

    #[test]
    fn jobs_must_be_a_mapping() {
        let doc = b"jobs: 42\n";
        assert!(matches!(parse_jobs(doc), Err(ConfigError::MalformedJobs)));
    }

    #[test]
    fn job_without_steps_yields_empty_job() {
        let doc = br#"
jobs:
  placeholder:
    image: alpine
"#;

        let jobs = parse_jobs(doc).unwrap();
        assert_eq!(jobs[0].name, "placeholder");
        assert!(jobs[0].steps.is_empty());
    }

    #[test]
    fn steps_must_be_a_sequence() {
        let doc = br#"
jobs:
  build:
    steps: make all
"#;

        assert!(matches!(
            parse_jobs(doc),
            Err(ConfigError::MalformedSteps(job)) if job == "build"
        ));
    }

    #[test]
    fn step_missing_run_aborts_whole_parse() {
        let doc = br#"
jobs:
  build:
    steps:
      - name: ok
        run: echo fine
  test:
    steps:
      - name: broken
"#;

        assert!(matches!(
            parse_jobs(doc),
            Err(ConfigError::InvalidStep { job, .. }) if job == "test"
        ));
    }

    #[test]
    fn unknown_step_fields_are_ignored() {
        let doc = br#"
jobs:
  build:
    steps:
      - name: compile
        run: make all
        timeout: 90
        retries: 3
"#;

        let jobs = parse_jobs(doc).unwrap();
        assert_eq!(jobs[0].steps[0].run, "make all");
    }

    #[test]
    fn invalid_yaml_is_rejected() {
        let doc = b"jobs: [unclosed\n";
        assert!(matches!(parse_jobs(doc), Err(ConfigError::Yaml(_))));
    }
}
