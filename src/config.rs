// src/config.rs
// Process configuration from environment variables plus the optional
// accounts allow-list file.

use std::collections::HashSet;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::core::AccountId;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_addr: SocketAddr,
    pub metrics_addr: SocketAddr,
    pub log_level: String,
    /// Bearer token required on long-lived endpoints. None disables auth.
    pub api_token: Option<String>,
    /// Accounts the node watches. Empty means everything.
    pub accounts: HashSet<AccountId>,
    pub accounts_file: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let api_addr = env_or("API_ADDR", "0.0.0.0:8081")
            .parse()
            .context("API_ADDR has invalid format (expected IP:PORT)")?;
        let metrics_addr = env_or("METRICS_ADDR", "0.0.0.0:9010")
            .parse()
            .context("METRICS_ADDR has invalid format (expected IP:PORT)")?;
        let log_level = env_or("LOG_LEVEL", "info");
        let api_token = std::env::var("API_TOKEN").ok().filter(|t| !t.is_empty());
        let accounts_file = env_or("ACCOUNTS_FILE", "accounts.txt");

        // The file wins over the env var when present and readable; the env
        // list stays as the fallback.
        let mut accounts = parse_accounts_env()?;
        match load_accounts_file(&accounts_file) {
            Ok(list) if !list.is_empty() => accounts = list,
            Ok(_) => {}
            Err(err) => {
                warn!(
                    "failed to load accounts from '{}': {} - falling back to ACCOUNTS env",
                    accounts_file, err
                );
            }
        }

        Ok(Config {
            api_addr,
            metrics_addr,
            log_level,
            api_token,
            accounts,
            accounts_file,
        })
    }
}

/// ACCOUNTS env var: comma-separated raw addresses. Unlike the file loader,
/// a malformed entry here is a hard startup error.
fn parse_accounts_env() -> Result<HashSet<AccountId>> {
    let raw = match std::env::var("ACCOUNTS") {
        Ok(raw) => raw,
        Err(_) => return Ok(HashSet::new()),
    };
    let mut accounts = HashSet::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let account: AccountId = part
            .parse()
            .with_context(|| format!("ACCOUNTS contains invalid address '{}'", part))?;
        accounts.insert(account);
    }
    Ok(accounts)
}

/// Loads the allow-list file: one address per line, anything after a comma
/// ignored, `#` lines and blanks skipped. Invalid lines are logged and
/// skipped rather than failing the whole load.
pub fn load_accounts_file(path: &str) -> Result<HashSet<AccountId>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("error opening accounts file '{}'", path))?;

    let mut accounts = HashSet::new();
    for line in data.lines() {
        let entry = line.split(',').next().unwrap_or("").trim();
        if entry.is_empty() || entry.starts_with('#') {
            continue;
        }
        match entry.parse::<AccountId>() {
            Ok(account) => {
                accounts.insert(account);
            }
            Err(err) => warn!("skipping invalid account in '{}': {}", path, err),
        }
    }
    info!("loaded {} accounts from '{}'", accounts.len(), path);
    Ok(accounts)
}
