use console::style;

use crate::error::{DevsetupError, Result};

use super::http::AgentClient;
use super::types::{AgentConfig, OpResult, ProxySettings};

pub async fn show(agent: &AgentClient) -> Result<()> {
    let config: AgentConfig = agent.get("/config").await?;

    println!("{}", style("Current Configuration").bold().cyan());
    println!();
    print_optional("Projects:", config.base_project_path.as_deref());
    print_optional("TLD:     ", config.tld.as_deref());
    print_optional("Web root:", config.proxy.web_root.as_deref());

    println!();
    println!("  {}", style("Installed tools").bold());
    if config.installed_tools.is_empty() {
        println!("    {}", style("(none)").dim());
    }
    for (name, version) in &config.installed_tools {
        println!("    {:<16} {}", style(name).white(), style(version).yellow());
    }

    if !config.ports.is_empty() {
        println!();
        println!("  {}", style("Ports").bold());
        for (service, port) in &config.ports {
            println!("    {:<16} {}", style(service).white(), port);
        }
    }

    println!();
    print_folders(&config.proxy);

    Ok(())
}

/// Show or edit the proxy settings. With no flags the settings are printed.
pub async fn proxy(
    agent: &AgentClient,
    web_root: Option<String>,
    add: Vec<String>,
    remove: Vec<String>,
) -> Result<()> {
    let mut settings: ProxySettings = agent.get("/config/proxy").await?;

    if web_root.is_none() && add.is_empty() && remove.is_empty() {
        print_optional("Web root:", settings.web_root.as_deref());
        print_folders(&settings);
        return Ok(());
    }

    apply_changes(&mut settings, web_root, add, remove);

    let result: OpResult = agent.post("/config/proxy", &settings).await?;
    if !result.ok {
        return Err(DevsetupError::Agent(
            result.error.unwrap_or_else(|| "Failed to save proxy settings".to_string()),
        ));
    }

    println!("{} Proxy settings saved", style("✓").green().bold());
    print_folders(&settings);
    Ok(())
}

fn apply_changes(
    settings: &mut ProxySettings,
    web_root: Option<String>,
    add: Vec<String>,
    remove: Vec<String>,
) {
    if let Some(root) = web_root {
        settings.web_root = Some(root);
    }
    for folder in add {
        let folder = shellexpand::tilde(&folder).to_string();
        if !settings.folders.contains(&folder) {
            settings.folders.push(folder);
        }
    }
    for folder in remove {
        let folder = shellexpand::tilde(&folder).to_string();
        settings.folders.retain(|f| *f != folder);
    }
}

fn print_optional(label: &str, value: Option<&str>) {
    print!("  {} ", style(label).dim());
    match value {
        Some(v) => println!("{}", style(v).white()),
        None => println!("{}", style("(not set)").dim()),
    }
}

fn print_folders(proxy: &ProxySettings) {
    println!("  {}", style("Proxy folders").bold());
    if proxy.folders.is_empty() {
        println!("    {}", style("(none)").dim());
    }
    for folder in &proxy.folders {
        println!("    {}", folder);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_changes_dedupes_and_removes() {
        let mut settings = ProxySettings {
            web_root: None,
            folders: vec!["/srv/a".into(), "/srv/b".into()],
        };
        apply_changes(
            &mut settings,
            Some("/srv".into()),
            vec!["/srv/b".into(), "/srv/c".into()],
            vec!["/srv/a".into()],
        );

        assert_eq!(settings.web_root.as_deref(), Some("/srv"));
        assert_eq!(settings.folders, vec!["/srv/b", "/srv/c"]);
    }
}
