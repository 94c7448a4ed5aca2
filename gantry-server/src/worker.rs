//! Pipeline worker
//!
//! Owns one pipeline's full execution: claim, sandbox lifecycle,
//! repository checkout, config parsing, sequential step execution, log
//! persistence, terminal status assignment, guaranteed cleanup.
//!
//! Every failure mode maps onto a status transition: infrastructure and
//! tooling failures (sandbox, clone, config) end in `aborted`, a step's
//! non-zero exit ends in `failed`, and nothing here ever reaches the
//! scheduler as an error.

use std::sync::Arc;

use gantry_ci::Job;
use gantry_core::domain::log::{NewStepLog, StepStatus};
use gantry_core::domain::pipeline::{PipelineInfo, PipelineStatus};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::sandbox::{SandboxHandle, SandboxRuntime, SandboxSpec};
use crate::store::PipelineStore;

/// Where the cloned repository lands inside the sandbox
const WORKSPACE_DIR: &str = "/workspace";

/// Fixed path of the CI configuration inside the workspace
pub const CI_CONFIG_PATH: &str = "/workspace/ci.yaml";

pub struct Worker {
    store: Arc<dyn PipelineStore>,
    runtime: Arc<dyn SandboxRuntime>,
    config: Config,
    pipeline_id: i64,
}

impl Worker {
    pub fn new(
        store: Arc<dyn PipelineStore>,
        runtime: Arc<dyn SandboxRuntime>,
        config: Config,
        pipeline_id: i64,
    ) -> Self {
        Self {
            store,
            runtime,
            config,
            pipeline_id,
        }
    }

    /// Runs the pipeline to a terminal status.
    ///
    /// Never returns an error: failures resolve into a status transition
    /// and a log line, and the sandbox is cleaned up on every path that
    /// created one.
    pub async fn run(self) {
        debug!(pipeline_id = self.pipeline_id, "running pipeline");

        // The conditional claim is the only thing standing between two
        // concurrent dispatches of one id; losing it means another
        // worker owns the run and this one must not touch the row.
        match self.store.claim(self.pipeline_id).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    pipeline_id = self.pipeline_id,
                    "pipeline vanished or was already claimed, abandoning run"
                );
                return;
            }
            Err(e) => {
                error!(pipeline_id = self.pipeline_id, "failed to claim pipeline: {e}");
                return;
            }
        }

        let sandbox = match self.runtime.create(&self.sandbox_spec()).await {
            Ok(sandbox) => sandbox,
            Err(e) => {
                error!(pipeline_id = self.pipeline_id, "failed to create sandbox: {e:#}");
                self.finish(PipelineStatus::Aborted).await;
                return;
            }
        };

        if let Err(e) = self.runtime.start(&sandbox).await {
            error!(pipeline_id = self.pipeline_id, "failed to start sandbox: {e:#}");
            self.finish(PipelineStatus::Aborted).await;
            self.cleanup(&sandbox).await;
            return;
        }

        let outcome =
            match tokio::time::timeout(self.config.run_timeout, self.execute(&sandbox)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(
                        pipeline_id = self.pipeline_id,
                        "run exceeded deadline of {:?}", self.config.run_timeout
                    );
                    Some(PipelineStatus::Aborted)
                }
            };

        // `None` means a store write already failed mid-run; leaving the
        // row as-is (possibly `running`) is the accepted degraded state.
        if let Some(status) = outcome {
            self.finish(status).await;
        }

        self.cleanup(&sandbox).await;
    }

    /// Checkout, plan, and step execution; returns the terminal status
    /// to record, or `None` when a store write failed mid-run.
    async fn execute(&self, sandbox: &SandboxHandle) -> Option<PipelineStatus> {
        let info = match self.store.get_pipeline_info(self.pipeline_id).await {
            Ok(info) => info,
            Err(e) => {
                error!(
                    pipeline_id = self.pipeline_id,
                    "failed to read pipeline info: {e}"
                );
                return Some(PipelineStatus::Aborted);
            }
        };

        if let Err(e) = self.checkout(sandbox, &info).await {
            error!(pipeline_id = self.pipeline_id, "checkout failed: {e:#}");
            return Some(PipelineStatus::Aborted);
        }

        let jobs = match self.read_plan(sandbox).await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(
                    pipeline_id = self.pipeline_id,
                    "failed to read CI config: {e:#}"
                );
                return Some(PipelineStatus::Aborted);
            }
        };

        self.run_steps(sandbox, &jobs).await
    }

    /// Shallow-clones the repository at the requested branch into the
    /// workspace and checks out the exact commit
    async fn checkout(&self, sandbox: &SandboxHandle, info: &PipelineInfo) -> anyhow::Result<()> {
        let clone = [
            "git",
            "clone",
            "--depth",
            "1",
            "--branch",
            info.branch.as_str(),
            "--single-branch",
            info.repository.as_str(),
            WORKSPACE_DIR,
        ]
        .map(String::from);

        let result = self.runtime.exec(sandbox, &clone).await?;
        if !result.succeeded() {
            anyhow::bail!(
                "git clone exited with {}: {}",
                result.exit_code,
                result.output.trim()
            );
        }

        let checkout =
            ["git", "-C", WORKSPACE_DIR, "checkout", info.commit.as_str()].map(String::from);

        let result = self.runtime.exec(sandbox, &checkout).await?;
        if !result.succeeded() {
            anyhow::bail!(
                "git checkout exited with {}: {}",
                result.exit_code,
                result.output.trim()
            );
        }

        Ok(())
    }

    /// Reads and parses the CI configuration from inside the sandbox
    async fn read_plan(&self, sandbox: &SandboxHandle) -> anyhow::Result<Vec<Job>> {
        let cat = ["cat", CI_CONFIG_PATH].map(String::from);

        let result = self.runtime.exec(sandbox, &cat).await?;
        if !result.succeeded() {
            anyhow::bail!(
                "reading {CI_CONFIG_PATH} exited with {}: {}",
                result.exit_code,
                result.output.trim()
            );
        }

        let jobs = gantry_ci::parse_jobs(result.output.as_bytes())?;
        debug!(pipeline_id = self.pipeline_id, jobs = jobs.len(), "parsed execution plan");

        Ok(jobs)
    }

    /// Executes every step of every job strictly in parsed order, one at
    /// a time, recording a log entry per executed step and halting at
    /// the first non-zero exit
    async fn run_steps(&self, sandbox: &SandboxHandle, jobs: &[Job]) -> Option<PipelineStatus> {
        let mut sequence = 1;

        for job in jobs {
            for step in &job.steps {
                info!(
                    pipeline_id = self.pipeline_id,
                    sequence,
                    command = %step.run,
                    "executing step {}:{}",
                    job.name,
                    step.name
                );

                let argv = ["/bin/sh", "-c", step.run.as_str()].map(String::from);
                let result = match self.runtime.exec(sandbox, &argv).await {
                    Ok(result) => result,
                    Err(e) => {
                        error!(
                            pipeline_id = self.pipeline_id,
                            "failed to execute step {}:{}: {e:#}", job.name, step.name
                        );
                        return Some(PipelineStatus::Aborted);
                    }
                };

                let status = if result.succeeded() {
                    StepStatus::Succeeded
                } else {
                    StepStatus::Failed {
                        exit_code: result.exit_code,
                    }
                };

                let entry = NewStepLog {
                    pipeline_id: self.pipeline_id,
                    sequence,
                    command_name: format!("{}:{}", job.name, step.name),
                    command: step.run.clone(),
                    output: result.output,
                    status,
                };

                if let Err(e) = self.store.append_log(entry).await {
                    error!(pipeline_id = self.pipeline_id, "failed to append step log: {e}");
                    return None;
                }

                if !status.succeeded() {
                    info!(
                        pipeline_id = self.pipeline_id,
                        "step {}:{} exited with {}, halting", job.name, step.name, result.exit_code
                    );
                    return Some(PipelineStatus::Failed);
                }

                sequence += 1;
            }
        }

        Some(PipelineStatus::Completed)
    }

    /// Records the terminal status; a failed write is logged and the
    /// pipeline stays where it is, never retried
    async fn finish(&self, status: PipelineStatus) {
        info!(pipeline_id = self.pipeline_id, status = %status, "pipeline finished");

        if let Err(e) = self.store.update_status(self.pipeline_id, status).await {
            error!(
                pipeline_id = self.pipeline_id,
                "failed to record terminal status {status}: {e}"
            );
        }
    }

    /// Stops and removes the sandbox with its volumes. Failures are
    /// warnings only; the terminal status is already decided.
    async fn cleanup(&self, sandbox: &SandboxHandle) {
        if let Err(e) = self.runtime.stop(sandbox).await {
            warn!(pipeline_id = self.pipeline_id, "failed to stop sandbox: {e:#}");
        }

        if let Err(e) = self.runtime.remove(sandbox, true, true).await {
            warn!(pipeline_id = self.pipeline_id, "failed to remove sandbox: {e:#}");
        }
    }

    fn sandbox_spec(&self) -> SandboxSpec {
        SandboxSpec {
            image: self.config.sandbox_image.clone(),
            workdir: WORKSPACE_DIR.to_string(),
            // Keep the sandbox alive between execs; the entrypoint
            // override sidesteps images whose entrypoint is a tool
            entrypoint: Some("/bin/sh".to_string()),
            cmd: vec!["-c".to_string(), "sleep infinity".to_string()],
            // Expose the runtime's control socket so repository tooling
            // can launch nested executions
            binds: vec![format!(
                "{0}:{0}",
                self.config.runtime_socket
            )],
            name: format!("pipeline-{}", self.pipeline_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::sandbox::ScriptedRuntime;
    use crate::store::MemoryStore;

    const THREE_STEP_CONFIG: &str = r#"
jobs:
  build:
    steps:
      - name: deps
        run: make deps
      - name: compile
        run: make all
  test:
    steps:
      - name: unit
        run: make test
"#;

    fn test_config() -> Config {
        Config {
            poll_interval: Duration::from_millis(5),
            run_timeout: Duration::from_secs(5),
            ..Config::default()
        }
    }

    async fn seeded_store() -> (Arc<MemoryStore>, i64) {
        let store = Arc::new(MemoryStore::new());
        let (id, _) = store
            .create_if_absent("https://example.com/repo.git", "main", "abc123")
            .await
            .unwrap();
        (store, id)
    }

    fn worker(
        store: &Arc<MemoryStore>,
        runtime: &Arc<ScriptedRuntime>,
        pipeline_id: i64,
    ) -> Worker {
        Worker::new(
            store.clone(),
            runtime.clone(),
            test_config(),
            pipeline_id,
        )
    }

    #[tokio::test]
    async fn all_steps_succeeding_completes_the_pipeline() {
        let (store, id) = seeded_store().await;
        let runtime = Arc::new(ScriptedRuntime::new().with_config(THREE_STEP_CONFIG));

        worker(&store, &runtime, id).run().await;

        assert_eq!(
            store.get_status(id).await.unwrap(),
            PipelineStatus::Completed
        );

        let logs = store.get_logs(id).await.unwrap();
        assert_eq!(logs.len(), 3);
        let sequences: Vec<i32> = logs.iter().map(|l| l.sequence).collect();
        assert_eq!(sequences, [1, 2, 3]);
        assert!(logs.iter().all(|l| l.status == StepStatus::Succeeded));
        assert_eq!(logs[0].command_name, "build:deps");
        assert_eq!(logs[2].command_name, "test:unit");
    }

    #[tokio::test]
    async fn failing_step_halts_execution() {
        let (store, id) = seeded_store().await;
        let runtime = Arc::new(
            ScriptedRuntime::new()
                .with_config(THREE_STEP_CONFIG)
                .with_step_result("make all", "missing header\n", 2),
        );

        worker(&store, &runtime, id).run().await;

        assert_eq!(store.get_status(id).await.unwrap(), PipelineStatus::Failed);

        let logs = store.get_logs(id).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].status, StepStatus::Succeeded);
        assert_eq!(logs[1].status, StepStatus::Failed { exit_code: 2 });
        assert_eq!(logs[1].output, "missing header\n");

        // The step after the failure never executed
        assert!(!runtime.executed_steps().contains(&"make test".to_string()));
    }

    #[tokio::test]
    async fn steps_run_in_declaration_order_not_name_order() {
        let (store, id) = seeded_store().await;
        let config = r#"
jobs:
  zulu:
    steps:
      - name: first
        run: echo zulu
  alpha:
    steps:
      - name: second
        run: echo alpha
"#;
        let runtime = Arc::new(ScriptedRuntime::new().with_config(config));

        worker(&store, &runtime, id).run().await;

        assert_eq!(runtime.executed_steps(), ["echo zulu", "echo alpha"]);
    }

    #[tokio::test]
    async fn sandbox_create_failure_aborts_without_logs() {
        let (store, id) = seeded_store().await;
        let runtime = Arc::new(ScriptedRuntime::new().failing_create());

        worker(&store, &runtime, id).run().await;

        assert_eq!(store.get_status(id).await.unwrap(), PipelineStatus::Aborted);
        assert!(store.get_logs(id).await.unwrap().is_empty());
        assert!(runtime.executed_steps().is_empty());
    }

    #[tokio::test]
    async fn sandbox_start_failure_aborts_and_still_cleans_up() {
        let (store, id) = seeded_store().await;
        let runtime = Arc::new(ScriptedRuntime::new().failing_start());

        worker(&store, &runtime, id).run().await;

        assert_eq!(store.get_status(id).await.unwrap(), PipelineStatus::Aborted);

        let calls = runtime.calls();
        assert!(calls.iter().any(|c| c.starts_with("stop")));
        assert!(calls.iter().any(|c| c.starts_with("remove")));
    }

    #[tokio::test]
    async fn clone_failure_aborts() {
        let (store, id) = seeded_store().await;
        let runtime = Arc::new(
            ScriptedRuntime::new()
                .with_config(THREE_STEP_CONFIG)
                .with_git_exit(128),
        );

        worker(&store, &runtime, id).run().await;

        assert_eq!(store.get_status(id).await.unwrap(), PipelineStatus::Aborted);
        assert!(runtime.executed_steps().is_empty());
    }

    #[tokio::test]
    async fn missing_config_file_aborts() {
        let (store, id) = seeded_store().await;
        let runtime = Arc::new(ScriptedRuntime::new());

        worker(&store, &runtime, id).run().await;

        assert_eq!(store.get_status(id).await.unwrap(), PipelineStatus::Aborted);
    }

    #[tokio::test]
    async fn malformed_config_aborts() {
        let (store, id) = seeded_store().await;
        let runtime = Arc::new(ScriptedRuntime::new().with_config("steps:\n  - nope\n"));

        worker(&store, &runtime, id).run().await;

        assert_eq!(store.get_status(id).await.unwrap(), PipelineStatus::Aborted);
        assert!(runtime.executed_steps().is_empty());
    }

    #[tokio::test]
    async fn cleanup_runs_after_every_outcome() {
        for runtime in [
            ScriptedRuntime::new().with_config(THREE_STEP_CONFIG),
            ScriptedRuntime::new()
                .with_config(THREE_STEP_CONFIG)
                .with_step_result("make deps", "", 1),
            ScriptedRuntime::new().with_git_exit(1),
        ] {
            let (store, id) = seeded_store().await;
            let runtime = Arc::new(runtime);

            worker(&store, &runtime, id).run().await;

            let calls = runtime.calls();
            assert!(calls.iter().any(|c| c == &format!("stop pipeline-{id}")));
            assert!(
                calls
                    .iter()
                    .any(|c| c == &format!("remove pipeline-{id} force=true volumes=true"))
            );
        }
    }

    #[tokio::test]
    async fn concurrent_claims_admit_a_single_worker() {
        let (store, id) = seeded_store().await;
        let runtime = Arc::new(ScriptedRuntime::new().with_config(THREE_STEP_CONFIG));

        let first = worker(&store, &runtime, id);
        let second = worker(&store, &runtime, id);

        let (a, b) = tokio::join!(
            tokio::spawn(first.run()),
            tokio::spawn(second.run())
        );
        a.unwrap();
        b.unwrap();

        // Exactly one worker got past the claim and provisioned a sandbox
        let creates = runtime
            .calls()
            .iter()
            .filter(|c| c.starts_with("create"))
            .count();
        assert_eq!(creates, 1);
        assert_eq!(store.get_logs(id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn exceeding_the_run_deadline_aborts_and_cleans_up() {
        let (store, id) = seeded_store().await;
        let runtime = Arc::new(
            ScriptedRuntime::new()
                .with_config(THREE_STEP_CONFIG)
                .with_step_delay(Duration::from_millis(200)),
        );

        let config = Config {
            run_timeout: Duration::from_millis(50),
            ..test_config()
        };
        Worker::new(store.clone(), runtime.clone(), config, id)
            .run()
            .await;

        assert_eq!(store.get_status(id).await.unwrap(), PipelineStatus::Aborted);
        assert!(runtime.calls().iter().any(|c| c.starts_with("remove")));
    }

    #[tokio::test]
    async fn claiming_an_unknown_pipeline_abandons_the_run() {
        let store = Arc::new(MemoryStore::new());
        let runtime = Arc::new(ScriptedRuntime::new().with_config(THREE_STEP_CONFIG));

        worker(&store, &runtime, 42).run().await;

        // No sandbox was ever provisioned
        assert!(runtime.calls().is_empty());
    }
}
