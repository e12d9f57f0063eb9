//! HTTP client for the local devsetup-agent.

use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{DevsetupError, Result};

pub const TOKEN_HEADER: &str = "X-Devsetup-Token";

#[derive(Debug, Clone)]
pub struct AgentClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl AgentClient {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        tracing::debug!("GET {}", endpoint);
        self.send(self.client.get(self.url(endpoint))).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T> {
        tracing::debug!("POST {}", endpoint);
        self.send(self.client.post(self.url(endpoint)).json(body))
            .await
    }

    /// POST without a body.
    pub async fn post_empty<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        tracing::debug!("POST {}", endpoint);
        self.send(self.client.post(self.url(endpoint))).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let request = match &self.token {
            Some(token) => request.header(TOKEN_HEADER, token),
            None => request,
        };

        let response = request.send().await.map_err(|source| {
            if source.is_connect() {
                DevsetupError::Unreachable {
                    url: self.base_url.clone(),
                    source,
                }
            } else {
                DevsetupError::Api(source)
            }
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(DevsetupError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DevsetupError::Agent(error_message(status, &body)));
        }

        Ok(response.json().await?)
    }
}

/// Agent path from raw segments and query pairs, percent-encoded.
pub fn endpoint(segments: &[&str], query: &[(&str, &str)]) -> Result<String> {
    let mut url = Url::parse("http://agent/").map_err(anyhow::Error::from)?;
    url.path_segments_mut()
        .map_err(|()| anyhow::anyhow!("agent URL cannot carry a path"))?
        .clear()
        .extend(segments);
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }

    Ok(match url.query() {
        Some(q) => format!("{}?{}", url.path(), q),
        None => url.path().to_string(),
    })
}

/// The agent's `{"error": ...}` body, or the raw status.
fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"].as_str().map(str::to_string))
        .unwrap_or_else(|| format!("Agent returned HTTP {}", status.as_u16()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_sends_token_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tools/status"))
            .and(header(TOKEN_HEADER, "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "redis": "running"
            })))
            .mount(&server)
            .await;

        let client = AgentClient::new(&format!("{}/", server.uri()), Some("secret".into()));
        let status: serde_json::Value = client.get("/tools/status").await.unwrap();
        assert_eq!(status["redis"], "running");
    }

    #[tokio::test]
    async fn test_post_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/config/proxy"))
            .and(body_json(serde_json::json!({"folders": ["/srv"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let client = AgentClient::new(&server.uri(), None);
        let result: serde_json::Value = client
            .post("/config/proxy", &serde_json::json!({"folders": ["/srv"]}))
            .await
            .unwrap();
        assert_eq!(result["ok"], true);
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = AgentClient::new(&server.uri(), None);
        let err = client.get::<serde_json::Value>("/tools/status").await.unwrap_err();
        assert!(matches!(err, DevsetupError::Unauthorized));
    }

    #[tokio::test]
    async fn test_error_body_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({"error": "No redis artifact"})),
            )
            .mount(&server)
            .await;

        let client = AgentClient::new(&server.uri(), None);
        let err = client
            .get::<serde_json::Value>("/catalog/redis/resolve")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No redis artifact");
    }

    #[tokio::test]
    async fn test_unreachable_agent() {
        let client = AgentClient::new("http://127.0.0.1:9", None);
        let err = client.get::<serde_json::Value>("/health").await.unwrap_err();
        assert!(matches!(err, DevsetupError::Unreachable { .. }));
    }

    #[test]
    fn test_endpoint_encodes_segments_and_query() {
        assert_eq!(
            endpoint(&["tools", "redis", "start"], &[]).unwrap(),
            "/tools/redis/start"
        );
        assert_eq!(
            endpoint(&["tools", "../a b", "uninstall"], &[]).unwrap(),
            "/tools/..%2Fa%20b/uninstall"
        );
        assert_eq!(
            endpoint(&["catalog", "php", "resolve"], &[("version", "8.3 rc&x=1")]).unwrap(),
            "/catalog/php/resolve?version=8.3+rc%26x%3D1"
        );
    }

    #[test]
    fn test_error_message_fallback() {
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, "<html>"),
            "Agent returned HTTP 502"
        );
    }
}
