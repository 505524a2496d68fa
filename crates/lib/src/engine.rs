//! Engine context: one owned object composing the runtime client, installer
//! paths, process supervisor, and chat sessions.
//!
//! Everything the engine touches hangs off this struct, so independent
//! engines can coexist and tests can build one against a throwaway data dir
//! and a mock server.

use crate::chat::ChatSessionManager;
use crate::config::{self, Config};
use crate::install::{InstallError, Installer, RuntimePaths};
use crate::llm::{OllamaClient, OllamaError};
use crate::models;
use crate::platform::{self, DownloadSpec, Platform, PlatformError};
use crate::supervisor::{RetryPolicy, ServerSupervisor, StartError};

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error("install failed: {0}")]
    Install(#[from] InstallError),
    #[error("server start failed: {0}")]
    Start(#[from] StartError),
    #[error("model setup failed: {0}")]
    Model(#[from] OllamaError),
}

pub struct Engine {
    spec: DownloadSpec,
    paths: RuntimePaths,
    client: OllamaClient,
    supervisor: ServerSupervisor,
    pub sessions: ChatSessionManager,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self, PlatformError> {
        let spec = platform::resolve(Platform::current()?);
        let paths = RuntimePaths::new(config::resolve_data_dir(&config), spec.binary_name);
        let client = OllamaClient::new(config.runtime.base_url.clone());
        let supervisor = ServerSupervisor::new(paths.clone(), client.clone());
        let sessions =
            ChatSessionManager::new(config.chat.default_model.clone(), config.chat.context_budget);
        Ok(Self {
            spec,
            paths,
            client,
            supervisor,
            sessions,
        })
    }

    /// Override the readiness polling policy (tests shrink the interval).
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.supervisor = self.supervisor.with_retry(retry);
        self
    }

    pub fn client(&self) -> &OllamaClient {
        &self.client
    }

    pub fn paths(&self) -> &RuntimePaths {
        &self.paths
    }

    pub fn owns_runtime(&self) -> bool {
        self.supervisor.owns_process()
    }

    /// Bring the runtime to a ready state: reachable, with the default model
    /// available. Steps run in order with no internal retry; every failed
    /// step is reported through `on_progress` with percent -1 and ends the
    /// call. A runtime that is already reachable skips install and start
    /// entirely.
    pub async fn initialize(
        &mut self,
        on_progress: &mut (dyn FnMut(&str, i32) + Send),
    ) -> Result<(), InitError> {
        on_progress("Checking for runtime...", 0);
        if self.client.is_running().await {
            log::info!("runtime already running");
            return self.finish_with_model(on_progress).await;
        }

        if !self.paths.is_installed() {
            on_progress("Installing runtime...", 0);
            let installer = Installer::new(self.spec.clone(), self.paths.clone());
            if let Err(e) = installer.install(on_progress).await {
                on_progress("Failed to install runtime", -1);
                return Err(e.into());
            }
        }

        on_progress("Starting runtime server...", 0);
        if let Err(e) = self.supervisor.start_server().await {
            on_progress("Failed to start runtime server", -1);
            return Err(e.into());
        }

        self.finish_with_model(on_progress).await
    }

    async fn finish_with_model(
        &self,
        on_progress: &mut (dyn FnMut(&str, i32) + Send),
    ) -> Result<(), InitError> {
        let model = self.sessions.get_model().to_string();
        if let Err(e) = models::ensure_model(&self.client, &model, on_progress).await {
            on_progress("Failed to download model", -1);
            return Err(e.into());
        }
        on_progress("Ready!", 100);
        Ok(())
    }

    /// Run one chat turn in the active session (see
    /// [`ChatSessionManager::send_message`]).
    pub async fn send_message(
        &mut self,
        text: &str,
        on_token: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String, crate::chat::ChatError> {
        self.sessions.send_message(&self.client, text, on_token).await
    }

    /// Cancel the in-flight generation, if any. Process-wide: this stops
    /// whichever chat call is running regardless of the active session.
    pub fn abort_generation(&self) {
        self.client.abort();
    }

    /// Full reset: stop the runtime if we own it and drop every session.
    pub fn shutdown(&mut self) {
        self.supervisor.stop_server();
        self.sessions.clear_chat();
    }
}
