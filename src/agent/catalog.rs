//! Tools catalog - the remote list of installable tools and services.
//!
//! The catalog is hand-edited JSON, so parsing is lenient: comments and
//! trailing commas are tolerated. When the remote copy cannot be used, the
//! last good copy saved under `config/tools.json` is served instead.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex_lite::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CATALOG_URL: &str =
    "https://gist.githubusercontent.com/ClausMunch/04bfece83f9d534aa87691dcd17abbcb/raw/tools.json";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to fetch catalog: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Failed to fetch catalog: HTTP {status}")]
    Http { status: u16 },

    #[error("Invalid catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub tools: Vec<CatalogTool>,
    /// Service definitions are passed through untouched.
    #[serde(default)]
    pub services: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogTool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub versions: Vec<CatalogVersion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogVersion {
    pub version: String,
    /// `os -> arch -> artifact`
    #[serde(default)]
    pub platforms: BTreeMap<String, BTreeMap<String, PlatformArtifact>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformArtifact {
    pub download_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// What the installer needs for one tool on this machine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedArtifact {
    pub name: String,
    pub version: String,
    pub download_url: String,
    pub checksum: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogDocument {
    Full(Catalog),
    ToolsOnly(Vec<CatalogTool>),
}

impl From<CatalogDocument> for Catalog {
    fn from(doc: CatalogDocument) -> Self {
        match doc {
            CatalogDocument::Full(catalog) => catalog,
            CatalogDocument::ToolsOnly(tools) => Catalog {
                tools,
                services: Vec::new(),
            },
        }
    }
}

impl Catalog {
    pub fn tool_names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|t| t.name.as_str())
    }

    /// Pick `version` (or the first listed one) of `name` for `os`/`arch`.
    ///
    /// `os` and `arch` use Rust's `std::env::consts` names; common catalog
    /// spellings (`win32`, `darwin`, `x64`, ...) are accepted.
    pub fn resolve(
        &self,
        name: &str,
        version: Option<&str>,
        os: &str,
        arch: &str,
    ) -> Option<ResolvedArtifact> {
        let tool = self.tools.iter().find(|t| t.name == name)?;
        let entry = match version {
            Some(v) => tool.versions.iter().find(|e| e.version == v)?,
            None => tool.versions.first()?,
        };

        let arches = os_aliases(os)
            .iter()
            .find_map(|alias| entry.platforms.get(*alias))?;
        let artifact = arch_aliases(arch)
            .iter()
            .find_map(|alias| arches.get(*alias))?;

        Some(ResolvedArtifact {
            name: tool.name.clone(),
            version: entry.version.clone(),
            download_url: artifact.download_url.clone(),
            checksum: artifact.checksum.clone(),
        })
    }
}

fn os_aliases(os: &str) -> Vec<&str> {
    match os {
        "windows" => vec!["windows", "win32", "win"],
        "macos" => vec!["macos", "darwin", "mac"],
        other => vec![other],
    }
}

fn arch_aliases(arch: &str) -> Vec<&str> {
    match arch {
        "x86_64" => vec!["x86_64", "x64", "amd64"],
        "aarch64" => vec!["aarch64", "arm64"],
        "x86" => vec!["x86", "ia32", "386"],
        other => vec![other],
    }
}

pub struct CatalogClient {
    client: Client,
    url: String,
    fallback: PathBuf,
}

impl CatalogClient {
    pub fn new(client: Client, url: impl Into<String>, fallback: impl Into<PathBuf>) -> Self {
        Self {
            client,
            url: url.into(),
            fallback: fallback.into(),
        }
    }

    /// Fetch the remote catalog, falling back to the last saved copy.
    pub async fn fetch(&self) -> Result<Catalog, CatalogError> {
        match self.fetch_remote().await {
            Ok((catalog, raw)) => {
                if let Err(e) = save_fallback(&self.fallback, &raw).await {
                    tracing::warn!("Failed to cache catalog at {}: {}", self.fallback.display(), e);
                }
                Ok(catalog)
            }
            Err(remote_err) => {
                tracing::warn!("{}; trying local copy", remote_err);
                match tokio::fs::read_to_string(&self.fallback).await {
                    Ok(raw) => Ok(parse_tolerant(&raw)?),
                    Err(e) => {
                        tracing::error!("Local catalog fallback failed: {}", e);
                        Err(remote_err)
                    }
                }
            }
        }
    }

    async fn fetch_remote(&self) -> Result<(Catalog, String), CatalogError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status().as_u16();
        if status >= 400 {
            return Err(CatalogError::Http { status });
        }
        let raw = response.text().await?;
        let catalog = parse_tolerant(&raw)?;
        Ok((catalog, raw))
    }
}

async fn save_fallback(path: &Path, raw: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, raw).await
}

/// Parse strictly first, then retry on a sanitized copy.
pub fn parse_tolerant(raw: &str) -> Result<Catalog, serde_json::Error> {
    match serde_json::from_str::<CatalogDocument>(raw) {
        Ok(doc) => Ok(doc.into()),
        Err(e) => {
            tracing::warn!("Catalog parse failed ({}), attempting tolerant parse", e);
            let cleaned = sanitize(raw);
            serde_json::from_str::<CatalogDocument>(&cleaned)
                .map(Catalog::from)
                .inspect_err(|_| {
                    let preview: String = raw.chars().take(5000).collect();
                    tracing::debug!("Raw catalog response: {}", preview);
                })
        }
    }
}

struct Cleaners {
    block_comments: Regex,
    line_comments: Regex,
    trailing_commas: Regex,
}

fn cleaners() -> &'static Cleaners {
    static CLEANERS: OnceLock<Cleaners> = OnceLock::new();
    CLEANERS.get_or_init(|| Cleaners {
        block_comments: Regex::new(r"(?s)/\*.*?\*/").expect("valid regex"),
        // Not preceded by ':' so URLs survive.
        line_comments: Regex::new(r"(?m)(^|[^:])//.*$").expect("valid regex"),
        trailing_commas: Regex::new(r",\s*([}\]])").expect("valid regex"),
    })
}

fn sanitize(raw: &str) -> String {
    let c = cleaners();
    let text = c.block_comments.replace_all(raw, "");
    let text = c.line_comments.replace_all(&text, "${1}");

    let start = [text.find('{'), text.find('[')].into_iter().flatten().min();
    let end = [text.rfind('}'), text.rfind(']')].into_iter().flatten().max();
    let sliced = match (start, end) {
        (Some(s), Some(e)) if e > s => &text[s..=e],
        _ => &text[..],
    };

    c.trailing_commas.replace_all(sliced, "${1}").into_owned()
}
