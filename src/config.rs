//! Layered application configuration.
//!
//! Precedence, lowest first: built-in defaults, the TOML config file,
//! `NULLBAK_*` environment variables, then command-line arguments.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/nullbak/config.toml";
pub const DEFAULT_SETTINGS_PATH: &str = "/var/lib/nullbak/settings.toml";
pub const DEFAULT_RPC_BIND: &str = "127.0.0.1:7878";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address the transport RPC server listens on.
    pub rpc_bind: SocketAddr,
    /// State file of the local settings service.
    pub settings_path: PathBuf,
    pub verbose: bool,
    pub json_logs: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rpc_bind: DEFAULT_RPC_BIND
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 7878))),
            settings_path: PathBuf::from(DEFAULT_SETTINGS_PATH),
            verbose: false,
            json_logs: false,
        }
    }
}

impl AppConfig {
    /// Load from the default config file location.
    pub fn new<T: Serialize>(cli_args: Option<&T>) -> Result<Self> {
        Self::load(Path::new(DEFAULT_CONFIG_PATH), cli_args)
    }

    /// Load using `path` as the config file. A missing file is not an error.
    pub fn load<T: Serialize>(path: &Path, cli_args: Option<&T>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("NULLBAK_"));

        if let Some(args) = cli_args {
            figment = figment.merge(Serialized::defaults(args));
        }

        figment
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", path.display()))
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}
