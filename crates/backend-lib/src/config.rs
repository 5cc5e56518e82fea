// ============================
// crates/backend-lib/src/config.rs
// ============================
//! Configuration management.
use anyhow::Result;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Application settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Data directory path
    pub data_dir: PathBuf,
    /// Log level
    pub log_level: String,
    /// Digits in a generated room code
    pub room_code_len: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".parse().unwrap(),
            data_dir: PathBuf::from("data"),
            log_level: "info".to_string(),
            room_code_len: 6,
        }
    }
}

impl Settings {
    /// Load settings from `config/default.toml` and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from("config/default.toml")
    }

    /// Load settings from a specific TOML file, overridden by
    /// `SMARTDOOR_`-prefixed environment variables.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = Figment::from(figment::providers::Serialized::defaults(
            serde_json::json!({
                "bind_addr": "127.0.0.1:3000",
                "data_dir": "data",
                "log_level": "info",
                "room_code_len": 6,
            }),
        ))
        .merge(Toml::file(path.as_ref()))
        .merge(Env::prefixed("SMARTDOOR_"))
        .extract()?;

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = Settings::default();
        assert_eq!(settings.bind_addr.port(), 3000);
        assert_eq!(settings.room_code_len, 6);
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn load_falls_back_to_defaults_without_file() {
        let settings = Settings::load_from("does/not/exist.toml").unwrap();
        assert_eq!(settings.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "room_code_len = 8\nlog_level = \"debug\"\n").unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.room_code_len, 8);
        assert_eq!(settings.log_level, "debug");
        // untouched keys keep their defaults
        assert_eq!(settings.bind_addr.port(), 3000);
    }
}
