//! `tooldock.toml`: what to serve, how to behave as a client, and which
//! remote servers to connect to. Every section and field is optional.

use anyhow::Context;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tooldock_builtins::BundleOptions;
use tooldock_client::{ClientConfig, ServerConfig};
use tooldock_server::{ServeMode, DEFAULT_RPC_PATH};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolDockConfig {
    #[serde(default)]
    pub server: ServeConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Stdio,
    Http,
}

/// The `[server]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServeConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub transport: TransportKind,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// HTTP endpoint path.
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub mode: ServeMode,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default = "default_bundles")]
    pub bundles: Vec<String>,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_documents_root")]
    pub documents_root: PathBuf,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            transport: TransportKind::default(),
            host: default_host(),
            port: default_port(),
            path: default_path(),
            mode: ServeMode::default(),
            max_in_flight: default_max_in_flight(),
            bundles: default_bundles(),
            data_dir: default_data_dir(),
            documents_root: default_documents_root(),
        }
    }
}

impl ServeConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn bundle_options(&self) -> BundleOptions {
        BundleOptions {
            data_dir: self.data_dir.clone(),
            documents_root: self.documents_root.clone(),
        }
    }
}

fn default_name() -> String {
    "tooldock".to_string()
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_path() -> String {
    DEFAULT_RPC_PATH.to_string()
}
fn default_max_in_flight() -> usize {
    64
}
fn default_bundles() -> Vec<String> {
    vec!["basics".to_string()]
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_documents_root() -> PathBuf {
    PathBuf::from("./documents")
}

/// Read the config file, or fall back to defaults when none was given.
pub fn load(path: Option<&Path>) -> anyhow::Result<ToolDockConfig> {
    let Some(path) = path else {
        return Ok(ToolDockConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    let config: ToolDockConfig = toml::from_str(&raw)
        .with_context(|| format!("Invalid config file '{}'", path.display()))?;
    config
        .client
        .validate()
        .with_context(|| format!("Invalid config file '{}'", path.display()))?;
    Ok(config)
}
