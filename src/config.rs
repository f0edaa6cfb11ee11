//! Runtime configuration
//!
//! Every setting is a global command-line flag with an environment fallback.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::api::client::DEFAULT_TIMEOUT;

/// Default API base URL
pub const DEFAULT_API_URL: &str = "http://localhost:3000/api";

/// Default public site origin, used to build share links
pub const DEFAULT_ORIGIN: &str = "http://localhost:3000";

#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Base URL of the sharing API
    #[arg(long, env = "SHAREBOX_API_URL", default_value = DEFAULT_API_URL, global = true)]
    pub api_url: String,

    /// Public origin of the sharing site, used for download links
    #[arg(long, env = "SHAREBOX_ORIGIN", default_value = DEFAULT_ORIGIN, global = true)]
    pub origin: String,

    /// Directory holding the local registry and remembered passwords
    #[arg(long, env = "SHAREBOX_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// HTTP timeout in seconds
    #[arg(long, env = "SHAREBOX_TIMEOUT", default_value_t = DEFAULT_TIMEOUT.as_secs(), global = true)]
    pub timeout: u64,
}

impl Config {
    /// Configured data directory, or the platform data directory
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// Platform data directory (e.g. `~/.local/share/sharebox`), `/tmp/sharebox` if unknown
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("sharebox")
}
