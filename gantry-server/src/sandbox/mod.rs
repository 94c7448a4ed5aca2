//! Sandbox runtime
//!
//! Thin capability wrapper over a container runtime: create, start,
//! execute-and-capture, stop, remove. No business logic lives here; the
//! worker decides what to run and what the results mean.

mod cli;
mod scripted;

pub use cli::CliRuntime;
pub use scripted::ScriptedRuntime;

use anyhow::Result;
use async_trait::async_trait;

/// Everything needed to create a sandbox
#[derive(Debug, Clone)]
pub struct SandboxSpec {
    pub image: String,
    pub workdir: String,
    /// Entrypoint override; images like alpine/git hijack the command
    /// with their own entrypoint otherwise
    pub entrypoint: Option<String>,
    pub cmd: Vec<String>,
    /// `host-path:container-path` bind mounts
    pub binds: Vec<String>,
    pub name: String,
}

/// A created sandbox, as referenced by later lifecycle calls
#[derive(Debug, Clone)]
pub struct SandboxHandle {
    pub id: String,
    pub name: String,
}

/// Captured result of one command executed inside a sandbox
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Combined stdout-then-stderr capture
    pub output: String,
    pub exit_code: i64,
}

impl ExecOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Container runtime operations the worker requires
///
/// Implementations must be safe for concurrent use from multiple workers.
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    async fn create(&self, spec: &SandboxSpec) -> Result<SandboxHandle>;

    async fn start(&self, sandbox: &SandboxHandle) -> Result<()>;

    /// Runs `argv` inside the sandbox and blocks until its exit code is
    /// known. A non-zero exit is a normal result, not an error; errors
    /// mean the runtime itself could not execute the command.
    async fn exec(&self, sandbox: &SandboxHandle, argv: &[String]) -> Result<ExecOutput>;

    async fn stop(&self, sandbox: &SandboxHandle) -> Result<()>;

    async fn remove(&self, sandbox: &SandboxHandle, force: bool, with_volumes: bool)
    -> Result<()>;
}
