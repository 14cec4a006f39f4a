//! Escrow command-line interface: send a recovery password to a Crypt Server.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use escrow_core::{
    config::DEFAULT_CONFIG_PATH, logging, EscrowConfig, EscrowPoster, EscrowRecord,
    EscrowResponse,
};
use log::warn;
use rpassword::prompt_password;
use schemars::schema_for;
use serde_json::to_string_pretty;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

const HOSTNAME_PATH: &str = "/proc/sys/kernel/hostname";

/// Top-level command-line options shared by every subcommand.
#[derive(Parser, Debug)]
#[command(
    name = "escrow",
    version,
    about = "Escrow disk-encryption recovery passwords to a Crypt Server."
)]
struct Cli {
    /// Path to the escrow configuration file.
    #[arg(short, long, env = "ESCROW_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Post a recovery password to the configured Crypt Server.
    Send {
        /// Hardware serial number the server files the key under.
        #[arg(long)]
        serial: String,

        /// Machine name; defaults to the kernel hostname.
        #[arg(long)]
        hostname: Option<String>,

        /// Username to record; defaults to record.username, then $USER.
        #[arg(long)]
        username: Option<String>,

        /// Read the recovery password from this file.
        #[arg(long, conflicts_with = "password")]
        password_file: Option<PathBuf>,

        /// Provide the recovery password directly (visible in process lists).
        #[arg(long)]
        password: Option<String>,

        /// Exit non-zero when the server answers with a non-2xx status.
        #[arg(long)]
        require_success: bool,
    },

    /// Validate a configuration file or emit the config schema.
    Validate {
        /// Path to the configuration file to validate.
        #[arg(short = 'f', long, default_value = DEFAULT_CONFIG_PATH)]
        file: PathBuf,

        /// Output the JSON schema instead of validating a file.
        #[arg(long)]
        schema: bool,
    },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    logging::init("info");
    let cli = Cli::parse();

    match cli.command {
        Commands::Send {
            serial,
            hostname,
            username,
            password_file,
            password,
            require_success,
        } => {
            let config = load_config(&cli.config)?;
            for issue in config.validate() {
                warn!("config {}: {issue}", config.path.display());
            }

            let hostname = resolve_hostname(hostname, Path::new(HOSTNAME_PATH))?;
            let username = resolve_username(
                username,
                config.record.username.as_deref(),
                env::var("USER").ok(),
            )?;
            let recovery_password = read_recovery_password(password_file.as_deref(), password)?;

            let record =
                EscrowRecord::new(recovery_password.as_str(), serial, hostname, username);
            drop(recovery_password);
            let endpoint = config.endpoint();
            let poster = match config.timeout() {
                Some(timeout) => EscrowPoster::with_timeout(timeout)?,
                None => EscrowPoster::new()?,
            };

            let response = poster
                .submit(&record, &endpoint)
                .with_context(|| format!("escrow to {} failed", endpoint.target()))?;

            println!(
                "Crypt Server {} answered {} for serial {}.",
                endpoint.target(),
                response.status,
                record.serial_number
            );
            enforce_status(&response, require_success)?;
        }
        Commands::Validate { file, schema } => {
            if schema {
                let schema = schema_for!(EscrowConfig);
                println!("{}", to_string_pretty(&schema)?);
                return Ok(());
            }

            let cfg = load_config(&file)?;
            let issues = cfg.validate();
            if issues.is_empty() {
                println!("Configuration valid (target {}).", cfg.endpoint().target());
            } else {
                eprintln!("Configuration validation failed:");
                for issue in issues {
                    eprintln!("  - {issue}");
                }
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<EscrowConfig> {
    EscrowConfig::load(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

/// `--hostname` if given, else the name the kernel reports in `source`.
fn resolve_hostname(flag: Option<String>, source: &Path) -> Result<String> {
    if let Some(name) = flag {
        return Ok(name);
    }
    let raw = fs::read_to_string(source)
        .with_context(|| format!("read {}; pass --hostname instead", source.display()))?;
    let name = raw.trim();
    if name.is_empty() {
        bail!("{} is empty; pass --hostname instead", source.display());
    }
    Ok(name.to_string())
}

/// `--username`, then `record.username` from config, then `$USER`.
fn resolve_username(
    flag: Option<String>,
    configured: Option<&str>,
    login: Option<String>,
) -> Result<String> {
    flag.or_else(|| configured.map(str::to_string))
        .or(login)
        .context("no username given and neither record.username nor $USER is set")
}

/// Non-2xx is only a failure when the operator asked for it.
fn enforce_status(response: &EscrowResponse, require_success: bool) -> Result<()> {
    if require_success && !response.is_success() {
        let body = response.body_text();
        bail!(
            "server rejected escrow with status {}: {}",
            response.status,
            body.trim()
        );
    }
    Ok(())
}

/// File wins over flag; with neither, prompt on the terminal.
fn read_recovery_password(
    file: Option<&Path>,
    flag: Option<String>,
) -> Result<Zeroizing<String>> {
    if let Some(path) = file {
        let raw = Zeroizing::new(
            fs::read_to_string(path)
                .with_context(|| format!("read recovery password from {}", path.display()))?,
        );
        return Ok(Zeroizing::new(trim_line_ending(&raw).to_string()));
    }

    if let Some(value) = flag {
        return Ok(Zeroizing::new(value));
    }

    let value = prompt_password("Recovery password: ")?;
    Ok(Zeroizing::new(value))
}

/// Strips the trailing newline editors add, leaving interior whitespace alone.
fn trim_line_ending(raw: &str) -> &str {
    raw.trim_end_matches(['\n', '\r'])
}
