//! Tool installation and process lifecycle for devsetup-agent.
//!
//! ## Module structure
//! - `download` - streams an artifact to disk with progress
//! - `checksum` - SHA-256 verification of downloaded artifacts
//! - `extract` - staged, retried extraction into an install directory
//! - `installer` - download, verify, extract pipeline
//! - `supervisor` - one child process per tool, log capture
//! - `logs` - per-tool log files and in-memory tails
//! - `manager` - ToolManager coordinating the above for the API
//! - `types` - API-facing types

mod checksum;
mod download;
pub mod error;
mod extract;
mod installer;
mod logs;
mod manager;
mod supervisor;
mod types;

pub use manager::ToolManager;
pub use types::InstallRequest;
