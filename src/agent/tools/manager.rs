//! ToolManager - coordinates installs and running tools for the API.
//!
//! Owns the installer, the supervisor, the in-memory config mirror and the
//! per-tool install progress. Every mutating operation returns an
//! [`OpResult`]; internal errors never cross this boundary.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::RwLock;

use super::download::Downloader;
use super::installer::{Installer, ToolInstallation};
use super::logs::LogStore;
use super::supervisor::{ProcessInfo, Supervisor};
use super::types::{InstallRequest, OpResult, ToolState};
use crate::catalog::Catalog;
use crate::config::{ConfigStore, PersistentConfig, ProxySettings};
use crate::paths::Paths;

/// How long shutdown waits for supervised processes to exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Tool names and versions become path components under `bin/` and `Log/`,
/// so anything that could escape those directories is rejected.
fn check_component(kind: &str, value: &str) -> Result<(), String> {
    let escapes = value.is_empty()
        || value == "."
        || value == ".."
        || value
            .chars()
            .any(|c| matches!(c, '/' | '\\' | ':' | '\0') || c == std::path::MAIN_SEPARATOR);
    if escapes {
        Err(format!("Invalid tool {}: {:?}", kind, value))
    } else {
        Ok(())
    }
}

pub struct ToolManager {
    installer: Installer,
    supervisor: Supervisor,
    store: ConfigStore,
    config: RwLock<PersistentConfig>,
    progress: Mutex<HashMap<String, u8>>,
    known_tools: RwLock<BTreeSet<String>>,
}

impl ToolManager {
    /// Build the manager and load the persisted config.
    pub async fn new(paths: Paths, client: Client) -> Self {
        let store = ConfigStore::new(paths.config_file());
        let config = store.load().await;
        tracing::info!(
            "Loaded config from {} ({} installed tools)",
            store.path().display(),
            config.installed_tools.len()
        );

        Self {
            installer: Installer::new(paths.clone(), Downloader::new(client)),
            supervisor: Supervisor::new(paths.bin_dir(), LogStore::new(paths.log_dir())),
            store,
            config: RwLock::new(config),
            progress: Mutex::new(HashMap::new()),
            known_tools: RwLock::new(BTreeSet::new()),
        }
    }

    fn set_progress(&self, tool: &str, pct: u8) {
        if let Ok(mut progress) = self.progress.lock() {
            progress.insert(tool.to_string(), pct);
        }
    }

    /// Last reported install progress, 0 if the tool was never installed here.
    pub fn get_install_progress(&self, tool: &str) -> u8 {
        self.progress
            .lock()
            .ok()
            .and_then(|p| p.get(tool).copied())
            .unwrap_or(0)
    }

    /// Download, verify and extract a tool, then record it as installed.
    ///
    /// Progress is forced to 100 once the request settles, whatever the outcome.
    /// Two installs of the same tool at once share one progress slot.
    pub async fn install_tool(&self, req: &InstallRequest) -> OpResult {
        if let Err(e) = check_component("name", &req.name)
            .and_then(|()| check_component("version", &req.version))
        {
            tracing::warn!("Rejected install: {}", e);
            return OpResult::failed(e);
        }

        self.set_progress(&req.name, 0);
        let report = |pct: u8| self.set_progress(&req.name, pct);

        let result = self
            .installer
            .install(
                &req.name,
                &req.version,
                &req.download_url,
                req.checksum.as_deref(),
                Some(&report),
            )
            .await;

        self.set_progress(&req.name, 100);

        match result {
            Ok(installed) => {
                self.mark_installed(&installed).await;
                tracing::info!(
                    "Installed {} {} (checksum {})",
                    installed.name,
                    installed.version,
                    if installed.checksum_verified {
                        "verified"
                    } else {
                        "not supplied"
                    }
                );
                OpResult::with_path(installed.artifact.display().to_string())
            }
            Err(e) => {
                tracing::error!("Install of {} {} failed: {}", req.name, req.version, e);
                OpResult::failed(e)
            }
        }
    }

    async fn mark_installed(&self, installed: &ToolInstallation) {
        let mut config = self.config.write().await;
        config
            .installed_tools
            .insert(installed.name.clone(), installed.version.clone());
        self.store.save(&config).await;
    }

    /// Remove every installed version of a tool. Refused while it runs or
    /// when the tool was never recorded as installed.
    pub async fn uninstall_tool(&self, tool: &str) -> OpResult {
        if let Err(e) = check_component("name", tool) {
            tracing::warn!("Rejected uninstall: {}", e);
            return OpResult::failed(e);
        }
        if !self.config.read().await.installed_tools.contains_key(tool) {
            return OpResult::failed(format!("Not installed: {}", tool));
        }
        if self.supervisor.is_running(tool).await {
            return OpResult::failed(format!("Cannot uninstall {} while it is running", tool));
        }

        if let Err(e) = self.installer.uninstall(tool, None).await {
            tracing::error!("Uninstall of {} failed: {}", tool, e);
            return OpResult::failed(e);
        }

        let mut config = self.config.write().await;
        config.installed_tools.remove(tool);
        self.store.save(&config).await;
        drop(config);

        if let Ok(mut progress) = self.progress.lock() {
            progress.remove(tool);
        }
        tracing::info!("Uninstalled {}", tool);
        OpResult::ok()
    }

    pub async fn start_tool(&self, tool: &str) -> OpResult {
        if let Err(e) = check_component("name", tool) {
            return OpResult::failed(e);
        }
        let version = self.config.read().await.installed_tools.get(tool).cloned();
        let Some(version) = version else {
            return OpResult::failed(format!("Not installed: {}", tool));
        };

        let exec = ToolInstallation::default_executable(tool, &version);
        match self.supervisor.start(tool, &exec, &[]).await {
            Ok(()) => OpResult::ok(),
            Err(e) => {
                tracing::warn!("Start of {} failed: {}", tool, e);
                OpResult::failed(e)
            }
        }
    }

    /// Request termination; the process exits asynchronously.
    pub async fn stop_tool(&self, tool: &str) -> OpResult {
        if let Err(e) = check_component("name", tool) {
            return OpResult::failed(e);
        }
        match self.supervisor.stop(tool).await {
            Ok(()) => OpResult::ok(),
            Err(e) => OpResult::failed(e),
        }
    }

    /// State of every catalog-known, installed or running tool.
    pub async fn get_status(&self) -> BTreeMap<String, ToolState> {
        let installed = self.config.read().await.installed_tools.clone();
        let running: BTreeSet<String> = self
            .supervisor
            .running()
            .await
            .into_iter()
            .map(|p| p.name)
            .collect();

        let mut names = self.known_tools.read().await.clone();
        names.extend(installed.keys().cloned());
        names.extend(running.iter().cloned());

        names
            .into_iter()
            .map(|name| {
                let state = if running.contains(&name) {
                    ToolState::Running
                } else if installed.contains_key(&name) {
                    ToolState::Stopped
                } else {
                    ToolState::NotInstalled
                };
                (name, state)
            })
            .collect()
    }

    /// Empty for names that cannot be a tool.
    pub async fn get_logs(&self, tool: &str) -> Vec<String> {
        if check_component("name", tool).is_err() {
            return Vec::new();
        }
        self.supervisor.get_logs(tool).await
    }

    pub async fn running(&self) -> Vec<ProcessInfo> {
        self.supervisor.running().await
    }

    pub async fn installed_tools(&self) -> BTreeMap<String, String> {
        self.config.read().await.installed_tools.clone()
    }

    pub async fn config(&self) -> PersistentConfig {
        self.config.read().await.clone()
    }

    pub async fn proxy(&self) -> ProxySettings {
        self.config.read().await.proxy.clone()
    }

    pub async fn set_proxy(&self, proxy: ProxySettings) -> OpResult {
        let mut config = self.config.write().await;
        config.proxy = proxy;
        self.store.save(&config).await;
        OpResult::ok()
    }

    /// Record catalog tool names so status covers tools not yet installed.
    pub async fn remember_catalog(&self, catalog: &Catalog) {
        let mut known = self.known_tools.write().await;
        known.extend(catalog.tool_names().map(str::to_string));
    }

    /// Stop every supervised tool and wait a bounded time for them to exit.
    pub async fn shutdown(&self) {
        let stopping = self.supervisor.stop_all().await;
        if stopping.is_empty() {
            return;
        }
        tracing::info!("Stopping {} tool(s): {}", stopping.len(), stopping.join(", "));

        let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
        while tokio::time::Instant::now() < deadline {
            if self.supervisor.running().await.is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let left: Vec<String> = self
            .supervisor
            .running()
            .await
            .into_iter()
            .map(|p| p.name)
            .collect();
        if !left.is_empty() {
            tracing::warn!("Still running at shutdown: {}", left.join(", "));
        }
    }
}
