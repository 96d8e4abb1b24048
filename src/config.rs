use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "menti.toml";
pub const ENV_PREFIX: &str = "MENTI_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// When false the manager runs memory-only and every durable operation
    /// is a no-op.
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl StoreConfig {
    pub fn resolved_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        let data_dir = match std::env::var("XDG_DATA_HOME") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => match std::env::var("HOME") {
                Ok(home) => PathBuf::from(home).join(".local/share"),
                Err(_) => bail!("Neither XDG_DATA_HOME nor HOME is set"),
            },
        };
        Ok(data_dir.join("menti").join("menti.db"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    pub classify_timeout_secs: u64,
    pub reply_timeout_secs: u64,
    pub title_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            model: "gpt-3.5-turbo".to_string(),
            classify_timeout_secs: 10,
            reply_timeout_secs: 30,
            title_timeout_secs: 10,
        }
    }
}

impl LlmConfig {
    pub fn timeouts(&self) -> CallTimeouts {
        CallTimeouts {
            classify: Duration::from_secs(self.classify_timeout_secs),
            reply: Duration::from_secs(self.reply_timeout_secs),
            title: Duration::from_secs(self.title_timeout_secs),
        }
    }

    /// Configured key, or the conventional `OPENAI_API_KEY`.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    pub max_turns: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_turns: 20 }
    }
}

/// Upper bounds on each capability call. Expiry counts as a failure and takes
/// the same fallback path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallTimeouts {
    pub classify: Duration,
    pub reply: Duration,
    pub title: Duration,
}

impl Default for CallTimeouts {
    fn default() -> Self {
        LlmConfig::default().timeouts()
    }
}

impl AppConfig {
    /// Load configuration.
    ///
    /// Later sources win: built-in defaults, `menti.toml` in the working
    /// directory, the file named by `MENTI_CONFIG_PATH`, then `MENTI_*`
    /// environment variables (`MENTI_LLM__MODEL`, `MENTI_STORE__ENABLED`, ...).
    pub fn load() -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(CONFIG_FILE));

        if let Ok(path) = std::env::var("MENTI_CONFIG_PATH") {
            figment = figment.merge(Toml::file(path));
        }

        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: AppConfig = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.history.max_turns == 0 {
            bail!("history.max_turns must be at least 1");
        }
        if self.llm.classify_timeout_secs == 0
            || self.llm.reply_timeout_secs == 0
            || self.llm.title_timeout_secs == 0
        {
            bail!("llm timeouts must be non-zero");
        }
        if self.llm.model.trim().is_empty() {
            bail!("llm.model must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert!(config.store.enabled);
        assert_eq!(config.history.max_turns, 20);
        assert_eq!(config.llm.timeouts().reply, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let figment = Figment::from(Serialized::defaults(AppConfig::default())).merge(
            Toml::string(
                r#"
                [store]
                enabled = false

                [llm]
                model = "local-model"
                reply_timeout_secs = 5
                "#,
            ),
        );
        let config = AppConfig::from_figment(figment).unwrap();
        assert!(!config.store.enabled);
        assert_eq!(config.llm.model, "local-model");
        assert_eq!(config.llm.reply_timeout_secs, 5);
        assert_eq!(config.llm.classify_timeout_secs, 10);
    }

    #[test]
    fn test_zero_history_rejected() {
        let figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::string("[history]\nmax_turns = 0"));
        assert!(AppConfig::from_figment(figment).is_err());
    }

    #[test]
    fn test_explicit_store_path_wins() {
        let store = StoreConfig {
            enabled: true,
            path: Some(PathBuf::from("/tmp/menti-test.db")),
        };
        assert_eq!(
            store.resolved_path().unwrap(),
            PathBuf::from("/tmp/menti-test.db")
        );
    }
}
