use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const CONFIG_FILE: &str = "pronostico";

/// Who receives decryption rights on the final tallies when a prediction is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GrantPolicy {
    #[default]
    Closer,
    CloserAndCreator,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// SQLite connection string. Predictions are kept in memory when unset.
    #[serde(default)]
    pub db: Option<String>,
    /// Skips the session signature check for authenticated routes.
    pub test: bool,
    pub log_level: String,
    pub service_id: String,
    pub grant_policy: GrantPolicy,
    pub max_permit_days: u32,
    pub decrypt_timeout_secs: u64,
    /// Base URL of an external ciphertext engine. The development engine is used when unset.
    #[serde(default)]
    pub relayer_url: Option<String>,
    pub relayer_timeout_secs: u64,
}
impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8081,
            db: None,
            test: false,
            log_level: "debug".into(),
            service_id: "pronostico".into(),
            grant_policy: GrantPolicy::Closer,
            max_permit_days: 365,
            decrypt_timeout_secs: 30,
            relayer_url: None,
            relayer_timeout_secs: 10,
        }
    }
}
impl Settings {
    /// Defaults, then the config file (`pronostico.toml` unless `path` is given), then
    /// `PRONOSTICO_*` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let defaults = Settings::default();
        let settings = Config::builder()
            .set_default("host", defaults.host)?
            .set_default("port", i64::from(defaults.port))?
            .set_default("test", defaults.test)?
            .set_default("log_level", defaults.log_level)?
            .set_default("service_id", defaults.service_id)?
            .set_default("grant_policy", "closer")?
            .set_default("max_permit_days", i64::from(defaults.max_permit_days))?
            .set_default("decrypt_timeout_secs", defaults.decrypt_timeout_secs as i64)?
            .set_default("relayer_timeout_secs", defaults.relayer_timeout_secs as i64)?
            .add_source(File::with_name(path.unwrap_or(CONFIG_FILE)).required(path.is_some()))
            .add_source(Environment::with_prefix("PRONOSTICO").try_parsing(true))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
    pub fn decrypt_timeout(&self) -> Duration {
        Duration::from_secs(self.decrypt_timeout_secs)
    }
    pub fn relayer_timeout(&self) -> Duration {
        Duration::from_secs(self.relayer_timeout_secs)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.service_id, "pronostico");
        assert_eq!(settings.grant_policy, GrantPolicy::Closer);
        assert_eq!(settings.db, None);
        assert_eq!(settings.max_permit_days, 365);
    }

    #[test]
    fn file_overrides_defaults() {
        let path = std::env::temp_dir().join("pronostico-settings-test.toml");
        std::fs::write(
            &path,
            "port = 9000\n\
             grant_policy = \"closer_and_creator\"\n\
             db = \"sqlite::memory:\"\n\
             max_permit_days = 30\n",
        )
        .unwrap();
        let settings = Settings::load(path.to_str()).unwrap();
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.grant_policy, GrantPolicy::CloserAndCreator);
        assert_eq!(settings.db.as_deref(), Some("sqlite::memory:"));
        assert_eq!(settings.max_permit_days, 30);
        assert_eq!(settings.decrypt_timeout(), Duration::from_secs(30));
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        Settings::load(Some("/nonexistent/pronostico-config")).unwrap_err();
    }
}
