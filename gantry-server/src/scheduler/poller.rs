//! Pipeline poller
//!
//! The top-level control loop: periodically asks the store for the
//! oldest waiting pipeline and spawns a worker for it. A semaphore owned
//! by the poller caps how many workers run at once; each dispatched task
//! carries its permit until it finishes, so the cap is a hard bound even
//! when a worker panics.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tokio::time;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::sandbox::SandboxRuntime;
use crate::store::PipelineStore;
use crate::worker::Worker;

pub struct Poller {
    config: Config,
    store: Arc<dyn PipelineStore>,
    runtime: Arc<dyn SandboxRuntime>,
    semaphore: Arc<Semaphore>,
}

impl Poller {
    pub fn new(
        config: Config,
        store: Arc<dyn PipelineStore>,
        runtime: Arc<dyn SandboxRuntime>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_workers));
        Self {
            config,
            store,
            runtime,
            semaphore,
        }
    }

    /// Runs the polling loop forever.
    ///
    /// One pipeline's failure never surfaces here; per-cycle store
    /// errors are logged and the next cycle proceeds.
    pub async fn run(&self) -> Result<()> {
        info!(
            "starting scheduler (interval: {:?}, pool: {})",
            self.config.poll_interval, self.config.max_workers
        );

        let mut interval = time::interval(self.config.poll_interval);

        loop {
            interval.tick().await;
            self.poll_once().await?;
        }
    }

    /// Performs a single poll cycle: at most one claim decision
    async fn poll_once(&self) -> Result<()> {
        let pipeline_id = match self.store.get_oldest_waiting().await {
            Ok(Some(id)) => id,
            Ok(None) => {
                debug!("no pipelines waiting");
                return Ok(());
            }
            Err(e) => {
                error!("failed to poll for waiting pipelines: {e}");
                return Ok(());
            }
        };

        // Blocks only while the pool is saturated; execution itself runs
        // as an independent task so the loop keeps polling.
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .context("scheduler semaphore closed")?;

        debug!(pipeline_id, "dispatching worker");

        let worker = Worker::new(
            self.store.clone(),
            self.runtime.clone(),
            self.config.clone(),
            pipeline_id,
        );

        tokio::spawn(async move {
            worker.run().await;
            drop(permit);
        });

        Ok(())
    }
}
