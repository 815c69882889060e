// src/config.rs

use std::env;
use std::str::FromStr;
use dotenvy::dotenv;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub rust_log: String,
    pub bind_addr: String,
    /// Directory holding one JSON snapshot per live session.
    pub snapshot_dir: String,
    pub remote_write_timeout_secs: u64,
    pub warning_window_secs: u64,
    /// Hosts without a focus concept turn the anti-cheat monitor off.
    pub anti_cheat_enabled: bool,
    pub submitted_retention_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let snapshot_dir = env::var("SNAPSHOT_DIR")
            .unwrap_or_else(|_| "snapshots".to_string());

        Self {
            database_url,
            jwt_secret,
            rust_log,
            bind_addr,
            snapshot_dir,
            remote_write_timeout_secs: parse_or("REMOTE_WRITE_TIMEOUT_SECS", 15),
            warning_window_secs: parse_or("WARNING_WINDOW_SECS", 10),
            anti_cheat_enabled: parse_or("ANTI_CHEAT_ENABLED", true),
            submitted_retention_secs: parse_or("SUBMITTED_RETENTION_SECS", 300),
        }
    }
}

fn parse_or<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={:?}", name, raw);
            default
        }),
        Err(_) => default,
    }
}
