use thiserror::Error;

/// Result alias for core operations.
pub type EscrowResult<T> = Result<T, EscrowError>;

#[derive(Error, Debug)]
pub enum EscrowError {
    #[error("[ES1000] io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("[ES1001] toml config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("[ES1002] yaml config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("[ES1100] configuration error: {0}")]
    InvalidConfig(String),

    #[error("[ES2000] invalid escrow endpoint `{target}`: {reason}")]
    InvalidEndpoint { target: String, reason: String },

    #[error("[ES3000] transport error posting to {target}: {source}")]
    Transport {
        target: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("[ES3001] failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
}

impl EscrowError {
    pub fn code(&self) -> &'static str {
        match self {
            EscrowError::Io(_) => "ES1000",
            EscrowError::Toml(_) => "ES1001",
            EscrowError::Yaml(_) => "ES1002",
            EscrowError::InvalidConfig(_) => "ES1100",
            EscrowError::InvalidEndpoint { .. } => "ES2000",
            EscrowError::Transport { .. } => "ES3000",
            EscrowError::Client(_) => "ES3001",
        }
    }

    /// True when the failure happened on the wire rather than before it.
    pub fn is_transport(&self) -> bool {
        matches!(self, EscrowError::Transport { .. })
    }
}
