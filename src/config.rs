use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::labels::Locale;
use crate::traits::DEFAULT_LEAD_TIMES;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Fallback tracing filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Language of the menu buttons.
    #[serde(default)]
    pub locale: Locale,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            telegram: TelegramConfig::default(),
            state: StateConfig::default(),
            scheduler: SchedulerConfig::default(),
            log_level: default_log_level(),
            locale: Locale::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    /// JSON file holding every schedule.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "./data/schedules.json".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Minutes before each occurrence at which a reminder fires.
    #[serde(default = "default_lead_times")]
    pub lead_times: Vec<u32>,
    /// Extra attempts when recording a sent reminder fails.
    #[serde(default = "default_persist_retries")]
    pub persist_retries: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            lead_times: default_lead_times(),
            persist_retries: default_persist_retries(),
        }
    }
}

fn default_tick_interval_secs() -> u64 {
    20
}

fn default_lead_times() -> Vec<u32> {
    DEFAULT_LEAD_TIMES.to_vec()
}

fn default_persist_retries() -> u32 {
    3
}

impl AppConfig {
    /// Load `path` if it exists, apply environment overrides, validate.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = if path.exists() {
            Some(std::fs::read_to_string(path).map_err(|e| {
                anyhow::anyhow!("Failed to read config {}: {}", path.display(), e)
            })?)
        } else {
            None
        };
        Self::from_sources(content.as_deref(), |key| std::env::var(key).ok())
    }

    fn from_sources(
        toml_text: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let mut config: AppConfig = match toml_text {
            Some(text) => toml::from_str(text)
                .map_err(|e| anyhow::anyhow!("Invalid config file: {}", e))?,
            None => AppConfig::default(),
        };
        config.apply_env_overrides(env);
        config.validate()?;
        Ok(config)
    }

    /// Environment variables of the legacy deployment win over the file.
    fn apply_env_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        if let Some(token) = non_empty("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(path) = non_empty("DB_PATH") {
            self.state.db_path = path;
        }
        if let Some(level) = non_empty("LOG_LEVEL") {
            self.log_level = level.to_lowercase();
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            anyhow::bail!("Telegram bot token is required (set TELEGRAM_BOT_TOKEN or [telegram] bot_token)");
        }
        if self.state.db_path.trim().is_empty() {
            anyhow::bail!("[state] db_path must not be empty");
        }
        if self.scheduler.tick_interval_secs == 0 {
            anyhow::bail!("[scheduler] tick_interval_secs must be greater than 0");
        }
        let lead_times = &self.scheduler.lead_times;
        if lead_times.is_empty() {
            anyhow::bail!("[scheduler] lead_times must not be empty");
        }
        if lead_times.contains(&0) {
            anyhow::bail!("[scheduler] lead_times must be positive");
        }
        let unique: HashSet<u32> = lead_times.iter().copied().collect();
        if unique.len() != lead_times.len() {
            anyhow::bail!("[scheduler] lead_times must not contain duplicates");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_to_minimal_file() {
        let config =
            AppConfig::from_sources(Some("[telegram]\nbot_token = \"abc\"\n"), env(&[])).unwrap();
        assert_eq!(config.state.db_path, "./data/schedules.json");
        assert_eq!(config.scheduler.tick_interval_secs, 20);
        assert_eq!(config.scheduler.lead_times, vec![60, 30, 5]);
        assert_eq!(config.scheduler.persist_retries, 3);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.locale, Locale::En);
    }

    #[test]
    fn environment_alone_is_enough() {
        let config = AppConfig::from_sources(
            None,
            env(&[
                ("TELEGRAM_BOT_TOKEN", "123:xyz"),
                ("DB_PATH", "/var/lib/bot/schedules.json"),
                ("LOG_LEVEL", "DEBUG"),
            ]),
        )
        .unwrap();
        assert_eq!(config.telegram.bot_token, "123:xyz");
        assert_eq!(config.state.db_path, "/var/lib/bot/schedules.json");
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn environment_overrides_file() {
        let text = r#"
            log_level = "warn"
            locale = "id"

            [telegram]
            bot_token = "from-file"

            [scheduler]
            lead_times = [15]
        "#;
        let config =
            AppConfig::from_sources(Some(text), env(&[("TELEGRAM_BOT_TOKEN", "from-env")])).unwrap();
        assert_eq!(config.telegram.bot_token, "from-env");
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.locale, Locale::Id);
        assert_eq!(config.scheduler.lead_times, vec![15]);
    }

    #[test]
    fn missing_token_is_rejected() {
        let err = AppConfig::from_sources(None, env(&[("TELEGRAM_BOT_TOKEN", "  ")])).unwrap_err();
        assert!(err.to_string().contains("token"));
    }

    #[test]
    fn bad_scheduler_settings_are_rejected() {
        for scheduler in [
            "tick_interval_secs = 0",
            "lead_times = []",
            "lead_times = [30, 0]",
            "lead_times = [30, 30]",
        ] {
            let text = format!("[telegram]\nbot_token = \"t\"\n[scheduler]\n{}\n", scheduler);
            assert!(
                AppConfig::from_sources(Some(&text), env(&[])).is_err(),
                "{scheduler} should be rejected"
            );
        }
    }

    #[test]
    fn unknown_locale_is_a_parse_error() {
        let text = "locale = \"fr\"\n[telegram]\nbot_token = \"t\"\n";
        assert!(AppConfig::from_sources(Some(text), env(&[])).is_err());
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[telegram]\nbot_token = \"disk\"\n[state]\ndb_path = \"x.json\"\n").unwrap();
        let config = AppConfig::load(&path).unwrap();
        // The process environment may override either value.
        assert!(!config.telegram.bot_token.is_empty());
        assert!(!config.state.db_path.is_empty());
    }
}
