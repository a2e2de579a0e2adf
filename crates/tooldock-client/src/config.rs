use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tooldock_core::{ToolDockError, ToolDockResult};

/// One remote server the proxy connects to.
///
/// Exactly one of `command` (spawn and speak over stdio) or `url`
/// (POST to an HTTP endpoint) must be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Identifier used as the namespace prefix (`name.tool`).
    pub name: String,
    /// Program to spawn for a stdio server.
    #[serde(default)]
    pub command: Option<String>,
    /// Arguments for `command`.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment for `command`.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// RPC endpoint of an HTTP server.
    #[serde(default)]
    pub url: Option<String>,
}

/// Where a [`ServerConfig`] points.
#[derive(Debug, Clone, PartialEq)]
pub enum Endpoint<'a> {
    /// Spawn a child process and speak over its stdio.
    Stdio {
        /// Program to spawn.
        command: &'a str,
        /// Its arguments.
        args: &'a [String],
        /// Extra environment.
        env: &'a HashMap<String, String>,
    },
    /// POST requests to an HTTP endpoint.
    Http {
        /// The RPC URL.
        url: &'a str,
    },
}

impl ServerConfig {
    /// A server reached by spawning `command`.
    pub fn stdio(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command: Some(command.into()),
            args,
            ..Self::default()
        }
    }

    /// A server reached over HTTP at `url`.
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Check the name and resolve the endpoint.
    pub fn endpoint(&self) -> ToolDockResult<Endpoint<'_>> {
        validate_server_name(&self.name)?;
        match (&self.command, &self.url) {
            (Some(command), None) => Ok(Endpoint::Stdio {
                command,
                args: &self.args,
                env: &self.env,
            }),
            (None, Some(url)) => Ok(Endpoint::Http { url }),
            (Some(_), Some(_)) => Err(ToolDockError::Config(format!(
                "server '{}' sets both command and url",
                self.name
            ))),
            (None, None) => Err(ToolDockError::Config(format!(
                "server '{}' needs a command or a url",
                self.name
            ))),
        }
    }
}

/// Server names become tool-name prefixes, so they may not be empty or
/// contain the separator.
pub fn validate_server_name(name: &str) -> ToolDockResult<()> {
    if name.is_empty() {
        return Err(ToolDockError::Config("server name must not be empty".into()));
    }
    if name.contains('.') {
        return Err(ToolDockError::Config(format!(
            "server name '{name}' must not contain '.'"
        )));
    }
    Ok(())
}

/// Client-side behaviour shared by all connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Seconds to wait for any single response.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Respawn a torn-down server and rediscover before the next request.
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
    /// Oldest call log entries are dropped beyond this.
    #[serde(default = "default_max_log_entries")]
    pub max_log_entries: usize,
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_max_log_entries() -> usize {
    10_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            auto_reconnect: true,
            max_log_entries: default_max_log_entries(),
        }
    }
}

impl ClientConfig {
    /// `timeout_secs` as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// A zero timeout would fail every request before it is sent.
    pub fn validate(&self) -> ToolDockResult<()> {
        if self.timeout_secs == 0 {
            return Err(ToolDockError::Config(
                "client timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
