//! Runtime server process lifecycle: spawn, readiness polling, shutdown.
//!
//! The supervisor only ever terminates a process it spawned itself. A server
//! that was already running externally is used as-is and left alone.

use std::path::PathBuf;
use std::time::Duration;

use tokio::process::{Child, Command};

use crate::install::RuntimePaths;
use crate::llm::OllamaClient;

/// Bounded fixed-interval readiness polling.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 30,
            interval: Duration::from_secs(1),
        }
    }
}

/// Handle to a spawned runtime process. `owned` records that this supervisor
/// started it, which is the precondition for stopping it.
struct RuntimeProcess {
    child: Child,
    owned: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("runtime binary not installed at {0}")]
    BinaryMissing(PathBuf),
    #[error("failed to start runtime: {0}")]
    Io(#[from] std::io::Error),
    #[error("runtime did not respond after {0} readiness checks")]
    Unconfirmed(u32),
}

pub struct ServerSupervisor {
    paths: RuntimePaths,
    client: OllamaClient,
    retry: RetryPolicy,
    process: Option<RuntimeProcess>,
}

impl ServerSupervisor {
    pub fn new(paths: RuntimePaths, client: OllamaClient) -> Self {
        Self {
            paths,
            client,
            retry: RetryPolicy::default(),
            process: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Whether this supervisor spawned (and therefore may stop) the runtime.
    pub fn owns_process(&self) -> bool {
        matches!(&self.process, Some(p) if p.owned)
    }

    /// Start the runtime server and wait for it to answer the liveness probe.
    ///
    /// If a server is already reachable this succeeds immediately without
    /// taking ownership. On [`StartError::Unconfirmed`] the spawned process
    /// is left running (and owned), just never confirmed ready.
    pub async fn start_server(&mut self) -> Result<(), StartError> {
        if self.client.is_running().await {
            log::info!("runtime already running externally");
            return Ok(());
        }

        if !self.paths.is_installed() {
            return Err(StartError::BinaryMissing(self.paths.binary_path.clone()));
        }

        // Model storage is redirected into our private data dir.
        tokio::fs::create_dir_all(&self.paths.models_dir).await?;

        let child = Command::new(&self.paths.binary_path)
            .arg("serve")
            .env("OLLAMA_MODELS", &self.paths.models_dir)
            .spawn()?;
        log::info!(
            "spawned runtime server from {}",
            self.paths.binary_path.display()
        );
        self.process = Some(RuntimeProcess { child, owned: true });

        for _ in 0..self.retry.attempts {
            tokio::time::sleep(self.retry.interval).await;
            if self.client.is_running().await {
                log::info!("runtime server is up");
                return Ok(());
            }
        }
        log::warn!(
            "runtime server did not respond within {} attempts",
            self.retry.attempts
        );
        Err(StartError::Unconfirmed(self.retry.attempts))
    }

    /// Terminate the runtime if and only if this supervisor started it.
    pub fn stop_server(&mut self) {
        let Some(mut process) = self.process.take() else {
            return;
        };
        if !process.owned {
            return;
        }
        match process.child.start_kill() {
            Ok(()) => log::info!("runtime server stopped"),
            Err(e) => log::warn!("failed to stop runtime server: {}", e),
        }
    }
}

impl Drop for ServerSupervisor {
    fn drop(&mut self) {
        // Engine shutdown calls stop_server explicitly; this covers early exits.
        self.stop_server();
    }
}
