//! Types exchanged across the agent API.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a tool as reported by `GET /tools/status`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolState {
    NotInstalled,
    Stopped,
    Running,
}

/// Uniform result of a mutating operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpResult {
    pub ok: bool,
    /// Downloaded artifact, set by a successful install
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OpResult {
    pub fn ok() -> Self {
        Self {
            ok: true,
            path: None,
            error: None,
        }
    }

    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::ok()
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            ok: false,
            path: None,
            error: Some(error.to_string()),
        }
    }
}

/// Body of `POST /tools/install`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallRequest {
    pub name: String,
    pub version: String,
    pub download_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_state_wire_names() {
        assert_eq!(
            serde_json::to_value(ToolState::NotInstalled).unwrap(),
            "not_installed"
        );
        assert_eq!(serde_json::to_value(ToolState::Running).unwrap(), "running");
    }

    #[test]
    fn test_op_result_shape() {
        assert_eq!(
            serde_json::to_value(OpResult::ok()).unwrap(),
            serde_json::json!({"ok": true})
        );
        assert_eq!(
            serde_json::to_value(OpResult::failed("Not running: redis")).unwrap(),
            serde_json::json!({"ok": false, "error": "Not running: redis"})
        );
    }

    #[test]
    fn test_install_request_camel_case() {
        let req: InstallRequest = serde_json::from_str(
            r#"{"name":"redis","version":"7.2","downloadUrl":"https://host/redis.zip"}"#,
        )
        .unwrap();
        assert_eq!(req.download_url, "https://host/redis.zip");
        assert!(req.checksum.is_none());
    }
}
