//! Scripted sandbox runtime
//!
//! In-memory test double for [`SandboxRuntime`]. Serves canned results
//! keyed by the command being executed, records every lifecycle call,
//! and tracks how many executions were in flight at once so tests can
//! assert the worker-pool ceiling.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::sandbox::{ExecOutput, SandboxHandle, SandboxRuntime, SandboxSpec};

#[derive(Default)]
pub struct ScriptedRuntime {
    fail_create: bool,
    fail_start: bool,
    git_exit_code: i64,
    /// Contents served for the CI config read; `None` makes the read fail
    config: Option<String>,
    /// Canned `(output, exit_code)` per shell line; unknown lines succeed
    step_results: HashMap<String, (String, i64)>,
    /// Applied to every step execution, to let runs overlap in tests
    step_delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: &str) -> Self {
        self.config = Some(config.to_string());
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn with_git_exit(mut self, exit_code: i64) -> Self {
        self.git_exit_code = exit_code;
        self
    }

    pub fn with_step_result(mut self, command: &str, output: &str, exit_code: i64) -> Self {
        self.step_results
            .insert(command.to_string(), (output.to_string(), exit_code));
        self
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = Some(delay);
        self
    }

    /// Every lifecycle call in the order it happened
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Shell lines executed as steps, in execution order
    pub fn executed_steps(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|call| call.strip_prefix("exec /bin/sh -c ").map(str::to_string))
            .collect()
    }

    /// Highest number of executions that were ever in flight at once
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl SandboxRuntime for ScriptedRuntime {
    async fn create(&self, spec: &SandboxSpec) -> Result<SandboxHandle> {
        self.record(format!("create {}", spec.name));

        if self.fail_create {
            anyhow::bail!("scripted create failure");
        }

        Ok(SandboxHandle {
            id: "scripted".to_string(),
            name: spec.name.clone(),
        })
    }

    async fn start(&self, sandbox: &SandboxHandle) -> Result<()> {
        self.record(format!("start {}", sandbox.name));

        if self.fail_start {
            anyhow::bail!("scripted start failure");
        }

        Ok(())
    }

    async fn exec(&self, _sandbox: &SandboxHandle, argv: &[String]) -> Result<ExecOutput> {
        self.record(format!("exec {}", argv.join(" ")));

        match argv[0].as_str() {
            "git" => Ok(ExecOutput {
                output: String::new(),
                exit_code: self.git_exit_code,
            }),
            "cat" => match &self.config {
                Some(config) => Ok(ExecOutput {
                    output: config.clone(),
                    exit_code: 0,
                }),
                None => Ok(ExecOutput {
                    output: format!("cat: {}: No such file or directory\n", argv[1]),
                    exit_code: 1,
                }),
            },
            _ => {
                let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_active.fetch_max(active, Ordering::SeqCst);

                if let Some(delay) = self.step_delay {
                    tokio::time::sleep(delay).await;
                }

                self.active.fetch_sub(1, Ordering::SeqCst);

                let command = argv.last().map(String::as_str).unwrap_or_default();
                let (output, exit_code) = self
                    .step_results
                    .get(command)
                    .cloned()
                    .unwrap_or((String::new(), 0));

                Ok(ExecOutput { output, exit_code })
            }
        }
    }

    async fn stop(&self, sandbox: &SandboxHandle) -> Result<()> {
        self.record(format!("stop {}", sandbox.name));
        Ok(())
    }

    async fn remove(
        &self,
        sandbox: &SandboxHandle,
        force: bool,
        with_volumes: bool,
    ) -> Result<()> {
        self.record(format!(
            "remove {} force={force} volumes={with_volumes}",
            sandbox.name
        ));
        Ok(())
    }
}
