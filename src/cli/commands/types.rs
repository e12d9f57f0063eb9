//! Agent response types
//!
//! Structs for deserializing agent HTTP API responses.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct OpResult {
    pub ok: bool,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CatalogListing {
    #[serde(default)]
    pub tools: Vec<CatalogTool>,
    #[serde(default)]
    pub services: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogTool {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub versions: Vec<CatalogVersion>,
}

#[derive(Debug, Deserialize)]
pub struct CatalogVersion {
    pub version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedArtifact {
    pub version: String,
    pub download_url: String,
    #[serde(default)]
    pub checksum: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallRequest {
    pub name: String,
    pub version: String,
    pub download_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

pub type StatusMap = BTreeMap<String, String>;

#[derive(Debug, Deserialize)]
pub struct RunningProcess {
    pub name: String,
    pub pid: Option<u32>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
pub struct LogsResponse {
    pub lines: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProgressResponse {
    pub progress: u8,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxySettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_root: Option<String>,
    #[serde(default)]
    pub folders: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    #[serde(default)]
    pub installed_tools: BTreeMap<String, String>,
    #[serde(default)]
    pub base_project_path: Option<String>,
    #[serde(default)]
    pub tld: Option<String>,
    #[serde(default)]
    pub ports: BTreeMap<String, u16>,
    #[serde(default)]
    pub proxy: ProxySettings,
}
