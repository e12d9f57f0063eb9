//! Tool lifecycle commands: install, uninstall, start, stop, status.

use std::collections::HashMap;
use std::time::Duration;

use console::style;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};

use crate::error::{DevsetupError, Result};
use crate::utils::format_elapsed;

use super::http::{endpoint, AgentClient};
use super::types::{
    InstallRequest, OpResult, ProgressResponse, ResolvedArtifact, RunningProcess, StatusMap,
};

const PROGRESS_POLL_INTERVAL: Duration = Duration::from_millis(300);

pub async fn install(
    agent: &AgentClient,
    name: String,
    version: Option<String>,
    url: Option<String>,
    checksum: Option<String>,
) -> Result<()> {
    let request = match url {
        Some(download_url) => {
            let version = version.ok_or_else(|| {
                DevsetupError::Agent("--version is required together with --url".to_string())
            })?;
            InstallRequest {
                name,
                version,
                download_url,
                checksum,
            }
        }
        None => {
            let query: Vec<(&str, &str)> =
                version.iter().map(|v| ("version", v.as_str())).collect();
            let resolved: ResolvedArtifact = agent
                .get(&endpoint(&["catalog", &name, "resolve"], &query)?)
                .await?;
            InstallRequest {
                name,
                version: resolved.version,
                download_url: resolved.download_url,
                checksum: checksum.or(resolved.checksum),
            }
        }
    };

    println!(
        "{} Installing {} {}",
        style("→").cyan().bold(),
        style(&request.name).white().bold(),
        style(&request.version).yellow()
    );
    println!("  {}", style(&request.download_url).dim());

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {spinner:.green} [{bar:30.cyan/blue}] {pos:>3}%")
            .map_err(anyhow::Error::from)?
            .progress_chars("█▓░"),
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    let progress_endpoint = endpoint(&["tools", &request.name, "progress"], &[])?;
    let install = agent.post::<_, OpResult>("/tools/install", &request);
    tokio::pin!(install);
    let mut ticker = tokio::time::interval(PROGRESS_POLL_INTERVAL);

    let result = loop {
        tokio::select! {
            result = &mut install => break result,
            _ = ticker.tick() => {
                if let Ok(p) = agent.get::<ProgressResponse>(&progress_endpoint).await {
                    pb.set_position(p.progress.into());
                }
            }
        }
    };

    let result = match result {
        Ok(result) => result,
        Err(e) => {
            pb.abandon();
            return Err(e);
        }
    };

    if result.ok {
        pb.set_position(100);
        pb.finish_and_clear();
        println!(
            "{} Installed {} {}",
            style("✓").green().bold(),
            style(&request.name).cyan(),
            style(&request.version).yellow()
        );
        if let Some(path) = result.path {
            println!("  {}", style(path).dim());
        }
        Ok(())
    } else {
        pb.abandon();
        Err(operation_failed(result))
    }
}

pub async fn uninstall(agent: &AgentClient, name: String, yes: bool) -> Result<()> {
    if !yes {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "  {} Remove {} and all its installed versions?",
                style("?").cyan().bold(),
                style(&name).white().bold()
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            println!("  {}", style("Cancelled.").dim());
            return Ok(());
        }
    }

    let result: OpResult = agent
        .post_empty(&endpoint(&["tools", &name, "uninstall"], &[])?)
        .await?;
    report(result, &format!("Uninstalled {}", name))
}

pub async fn start(agent: &AgentClient, name: String) -> Result<()> {
    let result: OpResult = agent
        .post_empty(&endpoint(&["tools", &name, "start"], &[])?)
        .await?;
    report(result, &format!("Started {}", name))
}

pub async fn stop(agent: &AgentClient, name: String) -> Result<()> {
    let result: OpResult = agent
        .post_empty(&endpoint(&["tools", &name, "stop"], &[])?)
        .await?;
    report(result, &format!("Stop requested for {}", name))
}

pub async fn status(agent: &AgentClient) -> Result<()> {
    let status: StatusMap = agent.get("/tools/status").await?;
    let running: Vec<RunningProcess> = agent.get("/tools/running").await?;
    let running: HashMap<&str, &RunningProcess> =
        running.iter().map(|p| (p.name.as_str(), p)).collect();

    if status.is_empty() {
        println!("{}", style("No tools known yet.").dim());
        println!("Run {} to browse the catalog.", style("devsetup catalog").cyan());
        return Ok(());
    }

    println!("{}", style("Tools").bold().cyan());
    println!();
    for (name, state) in &status {
        let detail = running
            .get(name.as_str())
            .map(|p| {
                let pid = p.pid.map(|pid| format!("pid {}, ", pid)).unwrap_or_default();
                format!("{}up {}", pid, format_elapsed(p.started_at))
            })
            .unwrap_or_default();
        println!(
            "  {} {:<16} {:<14} {}",
            state_marker(state),
            style(name).white(),
            format_state(state),
            style(detail).dim()
        );
    }

    Ok(())
}

fn state_marker(state: &str) -> console::StyledObject<&'static str> {
    match state {
        "running" => style("●").green().bold(),
        "stopped" => style("●").yellow(),
        _ => style("○").dim(),
    }
}

fn format_state(state: &str) -> console::StyledObject<&str> {
    match state {
        "running" => style(state).green(),
        "stopped" => style(state).yellow(),
        "not_installed" => style("not installed").dim(),
        _ => style(state).white(),
    }
}

fn report(result: OpResult, success: &str) -> Result<()> {
    if result.ok {
        println!("{} {}", style("✓").green().bold(), success);
        Ok(())
    } else {
        Err(operation_failed(result))
    }
}

fn operation_failed(result: OpResult) -> DevsetupError {
    DevsetupError::Agent(
        result
            .error
            .unwrap_or_else(|| "Operation failed without an error message".to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_install_resolves_from_catalog() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/catalog/redis/resolve"))
            .and(query_param("version", "7.2&latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "redis",
                "version": "7.2",
                "downloadUrl": "https://host/redis-7.2.zip",
                "checksum": "sha256:abc"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tools/redis/progress"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"progress": 35})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/tools/install"))
            .and(body_partial_json(serde_json::json!({
                "name": "redis",
                "version": "7.2",
                "downloadUrl": "https://host/redis-7.2.zip",
                "checksum": "sha256:abc"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "path": "/base/bin/redis/7.2/redis-7.2.zip"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let agent = AgentClient::new(&server.uri(), None);
        install(&agent, "redis".into(), Some("7.2&latest".into()), None, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_install_with_url_requires_version() {
        let agent = AgentClient::new("http://127.0.0.1:9", None);
        let err = install(
            &agent,
            "redis".into(),
            None,
            Some("https://host/redis.zip".into()),
            None,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("--version"));
    }

    #[tokio::test]
    async fn test_failed_operation_becomes_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tools/redis/stop"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": false,
                "error": "Not running: redis"
            })))
            .mount(&server)
            .await;

        let agent = AgentClient::new(&server.uri(), None);
        let err = stop(&agent, "redis".into()).await.unwrap_err();
        assert_eq!(err.to_string(), "Not running: redis");
    }

    #[tokio::test]
    async fn test_uninstall_skips_prompt_with_yes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tools/php/uninstall"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let agent = AgentClient::new(&server.uri(), None);
        uninstall(&agent, "php".into(), true).await.unwrap();
    }
}
