//! On-disk layout of a devsetup installation.
//!
//! ```text
//! <base>/bin/<tool>/<version>/...        installed tools
//! <base>/Log/<tool>.log                  per-tool process logs
//! <base>/config/devsetup-config.json     persisted settings
//! <base>/config/{nginx,php}/             per-service config dirs
//! ```

use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "devsetup-manager";
const CONFIG_FILE_NAME: &str = "devsetup-config.json";
const CATALOG_FALLBACK_NAME: &str = "tools.json";

/// Resolved directory layout rooted at a base directory.
#[derive(Debug, Clone)]
pub struct Paths {
    base: PathBuf,
}

impl Paths {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Default base directory for the current platform.
    ///
    /// `DEVSETUP_HOME` wins when set. On Windows the base lives under
    /// `%USERPROFILE%\.config`, elsewhere under the platform config dir.
    pub fn from_env() -> Self {
        if let Ok(home) = std::env::var("DEVSETUP_HOME") {
            if !home.trim().is_empty() {
                return Self::new(shellexpand::tilde(home.trim()).to_string());
            }
        }

        let root = if cfg!(windows) {
            std::env::var("USERPROFILE")
                .map(PathBuf::from)
                .ok()
                .or_else(dirs::home_dir)
                .map(|home| home.join(".config"))
        } else {
            dirs::config_dir()
        };

        let root = root.unwrap_or_else(std::env::temp_dir);
        Self::new(root.join(APP_DIR_NAME))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.base.join("bin")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.base.join("Log")
    }

    pub fn config_dir(&self) -> PathBuf {
        self.base.join("config")
    }

    pub fn nginx_config_dir(&self) -> PathBuf {
        self.config_dir().join("nginx")
    }

    pub fn php_config_dir(&self) -> PathBuf {
        self.config_dir().join("php")
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir().join(CONFIG_FILE_NAME)
    }

    /// Local copy of the last catalog fetched successfully.
    pub fn catalog_fallback(&self) -> PathBuf {
        self.config_dir().join(CATALOG_FALLBACK_NAME)
    }

    /// Install directory for a tool, or for one version of it.
    pub fn tool_dir(&self, tool: &str, version: Option<&str>) -> PathBuf {
        let dir = self.bin_dir().join(tool);
        match version {
            Some(v) => dir.join(v),
            None => dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_matches_upgrade_format() {
        let paths = Paths::new("/data/devsetup");
        assert_eq!(paths.bin_dir(), PathBuf::from("/data/devsetup/bin"));
        assert_eq!(paths.log_dir(), PathBuf::from("/data/devsetup/Log"));
        assert_eq!(
            paths.config_file(),
            PathBuf::from("/data/devsetup/config/devsetup-config.json")
        );
        assert_eq!(
            paths.tool_dir("redis", Some("7.2")),
            PathBuf::from("/data/devsetup/bin/redis/7.2")
        );
        assert_eq!(paths.tool_dir("redis", None), PathBuf::from("/data/devsetup/bin/redis"));
    }

    #[test]
    fn test_service_config_dirs() {
        let paths = Paths::new("/x");
        assert_eq!(paths.nginx_config_dir(), PathBuf::from("/x/config/nginx"));
        assert_eq!(paths.php_config_dir(), PathBuf::from("/x/config/php"));
    }
}
