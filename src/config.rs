use crate::error::{AppError, Result};
use crate::server::ServerConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: DeviceServerConfig,
    pub api: ApiConfig,
}

/// Device-facing TCP listener. Every field is required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceServerConfig {
    pub listen_addr: String,
    pub login_deadline_ms: u64,
    pub message_deadline_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub listen_addr: String,
    /// Caller-side bound on a live reading query.
    pub query_timeout_ms: u64,
}

impl Config {
    /// Load configuration from a YAML file with environment variable substitution
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content)?;
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            listen_addr: self.server.listen_addr.clone(),
            login_deadline: Duration::from_millis(self.server.login_deadline_ms),
            message_deadline: Duration::from_millis(self.server.message_deadline_ms),
        }
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.api.query_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        for (name, addr) in [
            ("server.listen_addr", &self.server.listen_addr),
            ("api.listen_addr", &self.api.listen_addr),
        ] {
            if addr.parse::<SocketAddr>().is_err() {
                return Err(AppError::Config(format!(
                    "{name} must be a socket address, got {addr:?}"
                )));
            }
        }

        for (name, value) in [
            ("server.login_deadline_ms", self.server.login_deadline_ms),
            ("server.message_deadline_ms", self.server.message_deadline_ms),
            ("api.query_timeout_ms", self.api.query_timeout_ms),
        ] {
            if value == 0 {
                return Err(AppError::Config(format!("{name} cannot be 0")));
            }
        }

        Ok(())
    }
}

/// Expand environment variables in the format $(VAR_NAME).
/// Unknown variables are left untouched.
fn expand_env_vars(content: &str) -> Result<String> {
    let re = regex::Regex::new(r"\$\(([A-Z_][A-Z0-9_]*)\)")
        .map_err(|e| AppError::Internal(format!("env placeholder pattern: {e}")))?;

    let expanded = re.replace_all(content, |cap: &regex::Captures| {
        std::env::var(&cap[1]).unwrap_or_else(|_| cap[0].to_string())
    });
    Ok(expanded.into_owned())
}
