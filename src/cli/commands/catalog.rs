use console::style;

use crate::error::Result;

use super::http::AgentClient;
use super::types::CatalogListing;

pub async fn list(agent: &AgentClient) -> Result<()> {
    let catalog: CatalogListing = agent.get("/catalog").await?;

    if catalog.tools.is_empty() {
        println!("{}", style("Catalog is empty.").dim());
        return Ok(());
    }

    println!("{}", style("Available Tools").bold().cyan());
    println!();
    for tool in &catalog.tools {
        let versions: Vec<&str> = tool.versions.iter().map(|v| v.version.as_str()).collect();
        let label = tool.display_name.as_deref().unwrap_or(&tool.name);
        println!(
            "  {:<14} {:<20} {}",
            style(&tool.name).white().bold(),
            style(label).dim(),
            if versions.is_empty() {
                style("(no versions)".to_string()).dim()
            } else {
                style(versions.join(", ")).yellow()
            }
        );
    }

    if !catalog.services.is_empty() {
        println!();
        println!(
            "  {} {} service definition(s)",
            style("+").dim(),
            catalog.services.len()
        );
    }

    Ok(())
}
