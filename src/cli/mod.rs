pub mod commands;

use clap::{Parser, Subcommand};

use crate::error::Result;
use commands::http::AgentClient;

#[derive(Parser)]
#[command(name = "devsetup")]
#[command(version)]
#[command(about = "Install and run local developer tools")]
#[command(long_about = "Download, install, start and stop developer tools (web servers, databases, ...) on this machine.\n\nTalks to the local devsetup-agent, which owns the running processes.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Agent base URL
    #[arg(long, global = true, env = "DEVSETUP_AGENT_URL", default_value = "http://127.0.0.1:7474")]
    pub agent_url: String,

    /// Agent authentication token
    #[arg(long, global = true, env = "DEVSETUP_AGENT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List tools available in the catalog
    Catalog,

    /// Download and install a tool
    Install {
        /// Tool name (e.g., redis, nginx)
        name: String,

        /// Version to install (default: first listed in the catalog)
        #[arg(short, long)]
        version: Option<String>,

        /// Download URL, skipping the catalog lookup (requires --version)
        #[arg(long)]
        url: Option<String>,

        /// Expected digest, e.g. sha256:<hex>
        #[arg(long)]
        checksum: Option<String>,
    },

    /// Remove a tool and all its installed versions
    Uninstall {
        name: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Start an installed tool
    Start { name: String },

    /// Stop a running tool
    Stop { name: String },

    /// Show the state of every known tool
    Status,

    /// Show a tool's process log
    Logs {
        name: String,

        /// Number of lines to show
        #[arg(short = 'n', long, default_value = "100")]
        lines: usize,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Show or edit reverse-proxy settings
    Proxy {
        /// Web root directory
        #[arg(long)]
        web_root: Option<String>,

        /// Add a project folder (repeatable)
        #[arg(long)]
        add: Vec<String>,

        /// Remove a project folder (repeatable)
        #[arg(long)]
        remove: Vec<String>,
    },
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let agent = AgentClient::new(&self.agent_url, self.token);

        match self.command {
            Commands::Catalog => commands::catalog::list(&agent).await,
            Commands::Install {
                name,
                version,
                url,
                checksum,
            } => commands::tools::install(&agent, name, version, url, checksum).await,
            Commands::Uninstall { name, yes } => commands::tools::uninstall(&agent, name, yes).await,
            Commands::Start { name } => commands::tools::start(&agent, name).await,
            Commands::Stop { name } => commands::tools::stop(&agent, name).await,
            Commands::Status => commands::tools::status(&agent).await,
            Commands::Logs { name, lines } => commands::logs::execute(&agent, name, lines).await,
            Commands::Config { command } => match command {
                ConfigCommands::Show => commands::config::show(&agent).await,
                ConfigCommands::Proxy {
                    web_root,
                    add,
                    remove,
                } => commands::config::proxy(&agent, web_root, add, remove).await,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_install() {
        let cli = Cli::try_parse_from([
            "devsetup", "install", "redis", "--version", "7.2", "--agent-url", "http://127.0.0.1:9000",
        ])
        .unwrap();
        assert_eq!(cli.agent_url, "http://127.0.0.1:9000");
        match cli.command {
            Commands::Install { name, version, url, .. } => {
                assert_eq!(name, "redis");
                assert_eq!(version.as_deref(), Some("7.2"));
                assert!(url.is_none());
            }
            _ => panic!("expected install"),
        }
    }

    #[test]
    fn test_parse_proxy_repeatable() {
        let cli = Cli::try_parse_from([
            "devsetup", "config", "proxy", "--add", "/a", "--add", "/b", "--remove", "/c",
        ])
        .unwrap();
        match cli.command {
            Commands::Config {
                command: ConfigCommands::Proxy { add, remove, web_root },
            } => {
                assert_eq!(add, vec!["/a", "/b"]);
                assert_eq!(remove, vec!["/c"]);
                assert!(web_root.is_none());
            }
            _ => panic!("expected config proxy"),
        }
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
