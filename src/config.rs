use std::env;
use std::path::PathBuf;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    /// Messaging-gateway credential, read once and handed to the transport.
    pub gateway_token: Option<String>,
    /// Operator identity on the messaging platform.
    pub admin_id: Option<i64>,
    pub data_file: PathBuf,
    pub locks_dir: PathBuf,
    /// Vestigial log-rotation threshold; read once and logged for parity with
    /// older deployments.
    pub log_rotate_bytes: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            gateway_token: env::var("GATEWAY_TOKEN").ok(),
            admin_id: env::var("ADMIN_ID").ok().and_then(|raw| parse_admin_id(&raw)),
            data_file: env::var("DATA_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data.json")),
            locks_dir: env::var("LOCKS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("locks")),
            log_rotate_bytes: parse_or_default("LOG_ROTATE_BYTES", 5 * 1024 * 1024)?,
        })
    }
}

/// Accepts plain numbers or decorated values like `$env:12345` by keeping
/// only the digits.
fn parse_admin_id(raw: &str) -> Option<i64> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
