//! Logger bootstrap for the escrow binaries.
//!
//! Output is one JSON object per line unless `ESCROW_LOG_FORMAT=plain`.

use env_logger::{fmt::Formatter, Builder, Env};
use log::Record;
use serde_json::json;
use std::env;
use std::io::{self, Write};
use std::sync::OnceLock;

static INIT: OnceLock<()> = OnceLock::new();

const FORMAT_ENV: &str = "ESCROW_LOG_FORMAT";
const LEVEL_ENV: &str = "ESCROW_LOG_LEVEL";

/// Line format written by the logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

impl LogFormat {
    /// Anything other than `plain` (case-insensitive) selects JSON.
    pub fn from_setting(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "plain" => LogFormat::Plain,
            _ => LogFormat::Json,
        }
    }
}

/// Install the global logger. Only the first call has any effect.
///
/// `RUST_LOG` wins when set; otherwise `ESCROW_LOG_LEVEL`, then
/// `default_level`.
pub fn init(default_level: &str) {
    let _ = INIT.get_or_init(|| install(default_level));
}

fn install(default_level: &str) {
    if env::var_os("RUST_LOG").is_none() {
        let level = env::var(LEVEL_ENV).unwrap_or_else(|_| default_level.to_string());
        env::set_var("RUST_LOG", level);
    }

    let format = LogFormat::from_setting(env::var(FORMAT_ENV).ok().as_deref());
    let mut builder = Builder::from_env(Env::default());
    match format {
        LogFormat::Json => builder.format(write_json),
        LogFormat::Plain => builder.format(write_plain),
    };

    if let Err(err) = builder.try_init() {
        eprintln!("failed to initialize logger: {err}");
    }
}

fn write_json(buf: &mut Formatter, record: &Record<'_>) -> io::Result<()> {
    let line = json!({
        "timestamp": buf.timestamp().to_string(),
        "level": record.level().as_str().to_lowercase(),
        "target": record.target(),
        "message": record.args().to_string(),
    });
    writeln!(buf, "{line}")
}

fn write_plain(buf: &mut Formatter, record: &Record<'_>) -> io::Result<()> {
    writeln!(
        buf,
        "{} {:<5} {} - {}",
        buf.timestamp(),
        record.level().as_str().to_lowercase(),
        record.target(),
        record.args()
    )
}
