//! CLI-driven sandbox runtime
//!
//! Drives a container runtime binary (podman or docker; both speak the
//! same subcommands for the lifecycle used here) through its CLI rather
//! than its API socket. Commands run via `tokio::process` and block the
//! calling worker only.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::sandbox::{ExecOutput, SandboxHandle, SandboxRuntime, SandboxSpec};

pub struct CliRuntime {
    binary: String,
}

impl CliRuntime {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Checks that the runtime binary is installed and answers
    pub async fn check_available(&self) -> Result<()> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .with_context(|| {
                format!(
                    "failed to execute '{} --version', is it installed?",
                    self.binary
                )
            })?;

        if !output.status.success() {
            anyhow::bail!("container runtime `{}` is not working", self.binary);
        }

        let version = String::from_utf8_lossy(&output.stdout);
        debug!("container runtime available: {}", version.trim());

        Ok(())
    }

    async fn run(&self, args: &[String]) -> Result<std::process::Output> {
        debug!("running {} {}", self.binary, args.join(" "));

        Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .with_context(|| format!("failed to execute `{} {}`", self.binary, args[0]))
    }

    /// Runs a lifecycle command where a non-zero exit is a failure
    async fn run_checked(&self, args: &[String]) -> Result<std::process::Output> {
        let output = self.run(args).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "`{} {}` exited with {}: {}",
                self.binary,
                args[0],
                output.status.code().unwrap_or(-1),
                stderr.trim()
            );
        }

        Ok(output)
    }
}

#[async_trait]
impl SandboxRuntime for CliRuntime {
    async fn create(&self, spec: &SandboxSpec) -> Result<SandboxHandle> {
        let mut args = vec![
            "create".to_string(),
            "--name".to_string(),
            spec.name.clone(),
            "--workdir".to_string(),
            spec.workdir.clone(),
        ];

        if let Some(entrypoint) = &spec.entrypoint {
            args.push("--entrypoint".to_string());
            args.push(entrypoint.clone());
        }

        for bind in &spec.binds {
            args.push("-v".to_string());
            args.push(bind.clone());
        }

        args.push(spec.image.clone());
        args.extend(spec.cmd.iter().cloned());

        let output = self.run_checked(&args).await?;

        // `create` prints the container id
        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();

        Ok(SandboxHandle {
            id,
            name: spec.name.clone(),
        })
    }

    async fn start(&self, sandbox: &SandboxHandle) -> Result<()> {
        self.run_checked(&["start".to_string(), sandbox.id.clone()])
            .await?;
        Ok(())
    }

    async fn exec(&self, sandbox: &SandboxHandle, argv: &[String]) -> Result<ExecOutput> {
        let mut args = vec!["exec".to_string(), sandbox.id.clone()];
        args.extend(argv.iter().cloned());

        let output = self.run(&args).await?;

        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(ExecOutput {
            output: combined,
            exit_code: output.status.code().unwrap_or(-1) as i64,
        })
    }

    async fn stop(&self, sandbox: &SandboxHandle) -> Result<()> {
        self.run_checked(&["stop".to_string(), sandbox.id.clone()])
            .await?;
        Ok(())
    }

    async fn remove(
        &self,
        sandbox: &SandboxHandle,
        force: bool,
        with_volumes: bool,
    ) -> Result<()> {
        let mut args = vec!["rm".to_string()];
        if force {
            args.push("-f".to_string());
        }
        if with_volumes {
            args.push("-v".to_string());
        }
        args.push(sandbox.id.clone());

        self.run_checked(&args).await?;
        Ok(())
    }
}
