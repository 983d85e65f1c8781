use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

/// Upper bound for `KITABYA_RECENT_SEARCH_RETENTION_DAYS` (ten years).
const MAX_RETENTION_DAYS: u32 = 3650;

#[derive(Debug, Clone)]
pub struct PushConfig {
    pub endpoint: String,
    pub key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub storage_dir: PathBuf,
    pub public_url: String,
    pub push: Option<PushConfig>,
    pub admin_emails: Vec<String>,
    pub retention_days: u32,
    pub cleanup_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = var("KITABYA_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("KITABYA_JWT_SECRET is unset or still a placeholder");
        }

        let push = match (var("KITABYA_PUSH_ENDPOINT"), var("KITABYA_PUSH_KEY")) {
            (Some(endpoint), Some(key)) => Some(PushConfig { endpoint, key }),
            (None, None) => None,
            _ => bail!("KITABYA_PUSH_ENDPOINT and KITABYA_PUSH_KEY must be set together"),
        };

        let admin_emails = var("KITABYA_ADMIN_EMAILS")
            .map(|list| {
                list.split(',')
                    .map(|e| e.trim().to_lowercase())
                    .filter(|e| !e.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let retention_days: u32 = parse_or(&var, "KITABYA_RECENT_SEARCH_RETENTION_DAYS", 30)?;
        if !(1..=MAX_RETENTION_DAYS).contains(&retention_days) {
            bail!(
                "KITABYA_RECENT_SEARCH_RETENTION_DAYS must be between 1 and {}, got {}",
                MAX_RETENTION_DAYS,
                retention_days
            );
        }

        Ok(Self {
            host: var("KITABYA_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&var, "KITABYA_PORT", 3000)?,
            db_path: var("KITABYA_DB_PATH").unwrap_or_else(|| "kitabya.db".into()).into(),
            jwt_secret,
            storage_dir: var("KITABYA_STORAGE_DIR").unwrap_or_else(|| "./uploads".into()).into(),
            public_url: var("KITABYA_PUBLIC_URL")
                .unwrap_or_else(|| "http://localhost:3000".into())
                .trim_end_matches('/')
                .to_string(),
            push,
            admin_emails,
            retention_days,
            cleanup_interval_secs: parse_or(&var, "KITABYA_CLEANUP_INTERVAL_SECS", 3600)?,
        })
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{} is not a valid number: {:?}", key, raw)),
        None => Ok(default),
    }
}
