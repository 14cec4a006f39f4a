//! Escrow of disk-encryption recovery passwords to a Crypt Server.

pub mod config;
pub mod error;
pub mod logging;
pub mod poster;
pub mod record;

pub use config::{EscrowConfig, RecordCfg, ServerCfg};
pub use error::{EscrowError, EscrowResult};
pub use poster::{submit, EscrowPoster};
pub use record::{EscrowRecord, EscrowResponse, ServerEndpoint};
pub use reqwest::{header::HeaderMap, StatusCode};
