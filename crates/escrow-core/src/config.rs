use crate::error::{EscrowError, EscrowResult};
use crate::record::ServerEndpoint;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/crypt-escrow.toml";
pub const DEFAULT_CHECKIN_URI: &str = "/checkin/";

/// Crypt Server connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ServerCfg {
    /// Base URL, e.g. `https://crypt.example.com`.
    pub url: String,

    /// Path appended to `url` verbatim.
    #[serde(default = "default_uri")]
    pub uri: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Deadline for the whole exchange. Unset keeps the client default.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_uri() -> String {
    DEFAULT_CHECKIN_URI.to_string()
}

/// Defaults for fields of the escrowed record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RecordCfg {
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EscrowConfig {
    pub server: ServerCfg,

    #[serde(default)]
    pub record: RecordCfg,

    #[serde(skip)]
    pub path: PathBuf,
}

impl EscrowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> EscrowResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let mut cfg = if is_toml(path) {
            toml::from_str::<Self>(&contents)?
        } else {
            serde_yaml::from_str::<Self>(&contents)?
        };

        cfg.path = path.to_path_buf();

        if cfg.server.url.trim().is_empty() {
            return Err(EscrowError::InvalidConfig(
                "server.url must not be empty".to_string(),
            ));
        }

        Ok(cfg)
    }

    /// Problems that would make escrow fail or behave surprisingly.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let server = &self.server;

        let url = server.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            issues.push(format!(
                "server.url `{}` must start with http:// or https://",
                server.url
            ));
        }
        if !server.uri.starts_with('/') {
            issues.push(format!("server.uri `{}` must start with `/`", server.uri));
        }
        if issues.is_empty() {
            match self.endpoint().target_url() {
                Ok(target) if !target.username().is_empty() || target.password().is_some() => {
                    issues.push(
                        "server.url embeds credentials; they are sent as basic auth, use server.username/server.password instead"
                            .to_string(),
                    )
                }
                Ok(_) => {}
                Err(err) => issues.push(err.to_string()),
            }
        }

        match (non_empty(&server.username), non_empty(&server.password)) {
            (true, false) => issues.push(
                "server.username is set without server.password; basic auth will be skipped"
                    .to_string(),
            ),
            (false, true) => issues.push(
                "server.password is set without server.username; basic auth will be skipped"
                    .to_string(),
            ),
            _ => {}
        }

        if server.timeout_secs == Some(0) {
            issues.push("server.timeout_secs must be greater than zero".to_string());
        }

        issues
    }

    pub fn endpoint(&self) -> ServerEndpoint {
        let server = &self.server;
        ServerEndpoint {
            base_url: server.url.clone(),
            uri_path: server.uri.clone(),
            auth_username: server.username.clone(),
            auth_password: server.password.clone(),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.server.timeout_secs.map(Duration::from_secs)
    }
}

fn is_toml(path: &Path) -> bool {
    matches!(path.extension().and_then(|ext| ext.to_str()), Some(ext) if ext.eq_ignore_ascii_case("toml"))
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}
