//! Process settings read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::stats::DEFAULT_OPENDOTA_BASE_URL;

/// Apology sent when a conversation fails.
pub const DEFAULT_APOLOGY: &str = "Что-то пошло не так, попробуй позже";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("{key} must be a positive integer, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },
    #[error("{key} must not be empty")]
    Empty { key: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// JSON file holding per-user caches.
    pub cache_path: PathBuf,
    /// How long a handler waits for a follow-up message.
    pub reply_timeout: Duration,
    /// How many times the last-match handler asks for a profile link.
    pub reply_attempts: u32,
    pub apology: String,
    pub opendota_base_url: String,
    pub opendota_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_path: PathBuf::from("cache.json"),
            reply_timeout: Duration::from_secs(60),
            reply_attempts: 2,
            apology: DEFAULT_APOLOGY.to_string(),
            opendota_base_url: DEFAULT_OPENDOTA_BASE_URL.to_string(),
            opendota_timeout: Duration::from_secs(10),
        }
    }
}

impl Settings {
    /// Load `.env` (if present), then read settings from the process
    /// environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let mut settings = Settings::default();

        if let Some(path) = lookup("BOTISLAV_CACHE_PATH") {
            settings.cache_path = PathBuf::from(non_empty("BOTISLAV_CACHE_PATH", path)?);
        }
        if let Some(secs) = lookup("BOTISLAV_REPLY_TIMEOUT_SECS") {
            settings.reply_timeout = Duration::from_secs(positive("BOTISLAV_REPLY_TIMEOUT_SECS", &secs)?);
        }
        if let Some(attempts) = lookup("BOTISLAV_REPLY_ATTEMPTS") {
            let attempts = positive("BOTISLAV_REPLY_ATTEMPTS", &attempts)?;
            settings.reply_attempts = u32::try_from(attempts)
                .map_err(|_| SettingsError::InvalidNumber { key: "BOTISLAV_REPLY_ATTEMPTS", value: attempts.to_string() })?;
        }
        if let Some(apology) = lookup("BOTISLAV_APOLOGY") {
            settings.apology = non_empty("BOTISLAV_APOLOGY", apology)?;
        }
        if let Some(url) = lookup("OPENDOTA_BASE_URL") {
            settings.opendota_base_url = non_empty("OPENDOTA_BASE_URL", url)?;
        }
        if let Some(secs) = lookup("OPENDOTA_TIMEOUT_SECS") {
            settings.opendota_timeout = Duration::from_secs(positive("OPENDOTA_TIMEOUT_SECS", &secs)?);
        }

        Ok(settings)
    }
}

fn positive(key: &'static str, value: &str) -> Result<u64, SettingsError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(SettingsError::InvalidNumber { key, value: value.to_string() }),
    }
}

fn non_empty(key: &'static str, value: String) -> Result<String, SettingsError> {
    let trimmed = value.trim();
    if trimmed.is_empty() { Err(SettingsError::Empty { key }) } else { Ok(trimmed.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn unset_keys_keep_defaults() {
        assert_eq!(Settings::from_lookup(lookup(&[])).unwrap(), Settings::default());
    }

    #[test]
    fn reads_every_key() {
        let settings = Settings::from_lookup(lookup(&[
            ("BOTISLAV_CACHE_PATH", "/tmp/users.json"),
            ("BOTISLAV_REPLY_TIMEOUT_SECS", "15"),
            ("BOTISLAV_REPLY_ATTEMPTS", "3"),
            ("BOTISLAV_APOLOGY", " Упс "),
            ("OPENDOTA_BASE_URL", "http://localhost:8080"),
            ("OPENDOTA_TIMEOUT_SECS", "2"),
        ]))
        .unwrap();

        assert_eq!(settings.cache_path, PathBuf::from("/tmp/users.json"));
        assert_eq!(settings.reply_timeout, Duration::from_secs(15));
        assert_eq!(settings.reply_attempts, 3);
        assert_eq!(settings.apology, "Упс");
        assert_eq!(settings.opendota_base_url, "http://localhost:8080");
        assert_eq!(settings.opendota_timeout, Duration::from_secs(2));
    }

    #[test]
    fn rejects_bad_values() {
        assert_eq!(
            Settings::from_lookup(lookup(&[("BOTISLAV_REPLY_TIMEOUT_SECS", "soon")])).unwrap_err(),
            SettingsError::InvalidNumber { key: "BOTISLAV_REPLY_TIMEOUT_SECS", value: "soon".into() }
        );
        assert_eq!(
            Settings::from_lookup(lookup(&[("BOTISLAV_REPLY_ATTEMPTS", "0")])).unwrap_err(),
            SettingsError::InvalidNumber { key: "BOTISLAV_REPLY_ATTEMPTS", value: "0".into() }
        );
        assert_eq!(
            Settings::from_lookup(lookup(&[("BOTISLAV_APOLOGY", "  ")])).unwrap_err(),
            SettingsError::Empty { key: "BOTISLAV_APOLOGY" }
        );
    }
}
