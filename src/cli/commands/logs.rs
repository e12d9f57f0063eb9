//! Logs command
//!
//! Prints the tail of a tool's process log as kept by the agent.

use console::style;

use crate::error::Result;

use super::http::{endpoint, AgentClient};
use super::types::LogsResponse;

pub async fn execute(agent: &AgentClient, name: String, lines: usize) -> Result<()> {
    let response: LogsResponse = agent
        .get(&endpoint(&["tools", &name, "logs"], &[])?)
        .await?;

    if response.lines.is_empty() {
        println!("{}", style(format!("No logs for {} yet.", name)).dim());
        return Ok(());
    }

    for line in tail(&response.lines, lines) {
        println!("{}", format_line(line));
    }

    Ok(())
}

fn tail(lines: &[String], n: usize) -> &[String] {
    &lines[lines.len().saturating_sub(n)..]
}

fn format_line(line: &str) -> String {
    if let Some(rest) = line.strip_prefix("[ERR]") {
        format!("{}{}", style("[ERR]").red(), rest)
    } else if let Some(rest) = line.strip_prefix("[OUT]") {
        format!("{}{}", style("[OUT]").dim(), rest)
    } else {
        style(line).cyan().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail() {
        let lines: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        assert_eq!(tail(&lines, 3), &["7", "8", "9"]);
        assert_eq!(tail(&lines, 50).len(), 10);
        assert!(tail(&lines, 0).is_empty());
    }

    #[test]
    fn test_format_line_keeps_text() {
        console::set_colors_enabled(false);
        assert_eq!(format_line("[ERR] boom"), "[ERR] boom");
        assert_eq!(format_line("[OUT] ready"), "[OUT] ready");
        assert_eq!(format_line("Started redis at x"), "Started redis at x");
    }
}
