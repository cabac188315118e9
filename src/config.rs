use std::{env, path::PathBuf};

use actix_web::cookie::Key;

use crate::errors::AppError;

const DEFAULT_DATABASE_URL: &str = "sqlite://worktrack.db";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub port: u16,
    pub session_key: Vec<u8>,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub secure_cookies: bool,
}

impl Config {
    /// Reads the configuration from the process environment. Call
    /// `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let session_key = lookup("SESSION_KEY")
            .ok_or_else(|| AppError::ConfigError("SESSION_KEY is not set".into()))?;
        // cookie::Key::from panics below 64 bytes
        if session_key.len() < 64 {
            return Err(AppError::ConfigError(
                "SESSION_KEY must be at least 64 bytes long".into(),
            ));
        }

        let port = match lookup("PORT") {
            Some(p) => p
                .parse::<u16>()
                .map_err(|e| AppError::ConfigError(format!("invalid PORT {p:?}: {e}")))?,
            None => 8080,
        };

        let max_upload_bytes = match lookup("MAX_UPLOAD_BYTES") {
            Some(v) => v.parse::<usize>().map_err(|e| {
                AppError::ConfigError(format!("invalid MAX_UPLOAD_BYTES {v:?}: {e}"))
            })?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let secure_cookies = match lookup("SECURE_COOKIES").as_deref() {
            None | Some("") | Some("0") | Some("false") => false,
            Some("1") | Some("true") => true,
            Some(other) => {
                return Err(AppError::ConfigError(format!(
                    "invalid SECURE_COOKIES {other:?}, expected true or false"
                )))
            }
        };

        Ok(Config {
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_owned()),
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_owned()),
            port,
            session_key: session_key.into_bytes(),
            upload_dir: PathBuf::from(lookup("UPLOAD_DIR").unwrap_or_else(|| "uploads".to_owned())),
            max_upload_bytes,
            secure_cookies,
        })
    }

    pub fn cookie_key(&self) -> Key {
        Key::from(&self.session_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn key() -> String {
        "k".repeat(64)
    }

    #[test]
    fn defaults_apply() {
        let key = key();
        let config = Config::from_lookup(lookup_from(&[("SESSION_KEY", key.as_str())])).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.port, 8080);
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert!(!config.secure_cookies);
    }

    #[test]
    fn missing_or_short_session_key_is_rejected() {
        assert!(Config::from_lookup(lookup_from(&[])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("SESSION_KEY", "short")])).is_err());
    }

    #[test]
    fn overrides_are_parsed() {
        let key = key();
        let config = Config::from_lookup(lookup_from(&[
            ("SESSION_KEY", key.as_str()),
            ("PORT", "9000"),
            ("SECURE_COOKIES", "true"),
            ("MAX_UPLOAD_BYTES", "1024"),
            ("DATABASE_URL", "sqlite::memory:"),
        ]))
        .unwrap();
        assert_eq!(config.port, 9000);
        assert!(config.secure_cookies);
        assert_eq!(config.max_upload_bytes, 1024);
        assert_eq!(config.database_url, "sqlite::memory:");
    }

    #[test]
    fn bad_port_is_rejected() {
        let key = key();
        let err = Config::from_lookup(lookup_from(&[("SESSION_KEY", key.as_str()), ("PORT", "http")]))
            .unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }
}
