use crate::api::{self, AssistantConfig, Model, Tool};
use crate::conversation::BackoffPolicy;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Keys accepted by `convo config get/set`.
pub const KEYS: &[&str] = &[
    "api_key",
    "organization",
    "base_url",
    "assistant_id",
    "model",
    "assistant_name",
    "instructions",
    "tools",
    "polling.base_delay_ms",
    "polling.max_delay_ms",
    "polling.max_retries",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Overridden by `OPENAI_API_KEY`.
    pub api_key: Option<String>,
    /// Overridden by `OPENAI_ORGANIZATION`.
    pub organization: Option<String>,
    /// Overridden by `OPENAI_BASE_URL`.
    pub base_url: Option<String>,
    /// Assistant to attach to instead of creating one.
    pub assistant_id: Option<String>,
    pub model: Option<String>,
    pub assistant_name: Option<String>,
    pub instructions: Option<String>,
    /// Built-in tool names (`code_interpreter`, `file_search`).
    pub tools: Vec<String>,
    pub polling: PollingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_retries: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        let policy = BackoffPolicy::default();
        Self {
            base_delay_ms: policy.base_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            max_retries: policy.max_retries,
        }
    }
}

impl From<PollingConfig> for BackoffPolicy {
    fn from(polling: PollingConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(polling.base_delay_ms),
            max_delay: Duration::from_millis(polling.max_delay_ms),
            max_retries: polling.max_retries,
        }
    }
}

/// Directory holding `config.toml`.
pub fn convo_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("convo"))
        .unwrap_or_else(|| PathBuf::from(".convo"))
}

pub fn config_path() -> PathBuf {
    convo_config_dir().join("config.toml")
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn api_key(&self) -> Option<String> {
        prefer_env(api::API_KEY_ENV, self.api_key.as_deref())
    }

    pub fn organization(&self) -> Option<String> {
        prefer_env(api::ORGANIZATION_ENV, self.organization.as_deref())
    }

    pub fn base_url(&self) -> String {
        prefer_env(api::BASE_URL_ENV, self.base_url.as_deref())
            .unwrap_or_else(|| api::DEFAULT_BASE_URL.to_string())
    }

    pub fn backoff(&self) -> BackoffPolicy {
        self.polling.into()
    }

    /// Assistant creation request from config defaults.
    pub fn assistant_config(&self) -> Result<AssistantConfig> {
        let tools = self
            .tools
            .iter()
            .map(|name| {
                Tool::builtin(name).ok_or_else(|| Error::Config(format!("Unknown tool: {name}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(AssistantConfig {
            name: self.assistant_name.clone(),
            model: self
                .model
                .clone()
                .unwrap_or_else(|| Model::default().id().to_string()),
            instructions: self.instructions.clone(),
            tools,
        })
    }

    /// Display value for `key`; the API key is masked.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = match key {
            "api_key" => self.api_key.as_deref().map(mask_secret),
            "organization" => self.organization.clone(),
            "base_url" => self.base_url.clone(),
            "assistant_id" => self.assistant_id.clone(),
            "model" => self.model.clone(),
            "assistant_name" => self.assistant_name.clone(),
            "instructions" => self.instructions.clone(),
            "tools" => (!self.tools.is_empty()).then(|| self.tools.join(",")),
            "polling.base_delay_ms" => Some(self.polling.base_delay_ms.to_string()),
            "polling.max_delay_ms" => Some(self.polling.max_delay_ms.to_string()),
            "polling.max_retries" => Some(self.polling.max_retries.to_string()),
            _ => return Err(unknown_key(key)),
        };
        Ok(value)
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let text = || Some(value.to_string());
        match key {
            "api_key" => self.api_key = text(),
            "organization" => self.organization = text(),
            "base_url" => self.base_url = text(),
            "assistant_id" => self.assistant_id = text(),
            "model" => {
                value.parse::<Model>().map_err(Error::Config)?;
                self.model = text();
            }
            "assistant_name" => self.assistant_name = text(),
            "instructions" => self.instructions = text(),
            "tools" => {
                let tools: Vec<String> = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
                if let Some(bad) = tools.iter().find(|t| Tool::builtin(t).is_none()) {
                    return Err(Error::Config(format!("Unknown tool: {bad}")));
                }
                self.tools = tools;
            }
            "polling.base_delay_ms" => self.polling.base_delay_ms = parse_number(key, value)?,
            "polling.max_delay_ms" => self.polling.max_delay_ms = parse_number(key, value)?,
            "polling.max_retries" => self.polling.max_retries = parse_number(key, value)?,
            _ => return Err(unknown_key(key)),
        }
        Ok(())
    }
}

fn prefer_env(var: &str, configured: Option<&str>) -> Option<String> {
    resolve(std::env::var(var).ok(), configured)
}

fn resolve(from_env: Option<String>, configured: Option<&str>) -> Option<String> {
    from_env
        .filter(|v| !v.is_empty())
        .or_else(|| configured.filter(|v| !v.is_empty()).map(String::from))
}

fn mask_secret(secret: &str) -> String {
    let tail: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("****{tail}")
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key} expects a number, got {value:?}")))
}

fn unknown_key(key: &str) -> Error {
    Error::Config(format!(
        "Unknown key: {key}. Valid keys: {}",
        KEYS.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_backoff_constants() {
        let config = Config::default();
        assert_eq!(config.backoff(), BackoffPolicy::default());
        assert_eq!(config.polling.base_delay_ms, 500);
        assert_eq!(config.polling.max_delay_ms, 5000);
        assert_eq!(config.polling.max_retries, 14);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            assistant_id = "asst_123"

            [polling]
            max_retries = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.assistant_id.as_deref(), Some("asst_123"));
        assert_eq!(config.polling.max_retries, 3);
        assert_eq!(config.polling.base_delay_ms, 500);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.set("model", "gpt-3.5-turbo").unwrap();
        config.set("tools", "code_interpreter, file_search").unwrap();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.tools, vec!["code_interpreter", "file_search"]);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, Config::default());
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "polling = 3").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(Error::ConfigParse(_))
        ));
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let mut config = Config::default();
        assert!(config.set("model", "gpt-9").is_err());
        assert!(config.set("tools", "browser").is_err());
        assert!(config.set("tools", "code_interpreter,retrieval").is_err());
        assert!(config.set("polling.max_retries", "many").is_err());
        assert!(config.set("colour", "blue").is_err());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_get_masks_api_key() {
        let mut config = Config::default();
        config.set("api_key", "sk-abcdef123456").unwrap();
        assert_eq!(config.get("api_key").unwrap().as_deref(), Some("****3456"));
        assert_eq!(config.get("model").unwrap(), None);
        assert!(config.get("nope").is_err());
    }

    #[test]
    fn test_env_value_wins() {
        assert_eq!(
            resolve(Some("from-env".into()), Some("from-file")),
            Some("from-env".into())
        );
        assert_eq!(
            resolve(Some(String::new()), Some("from-file")),
            Some("from-file".into())
        );
        assert_eq!(resolve(None, Some("")), None);
    }

    #[test]
    fn test_assistant_config_from_defaults() {
        let mut config = Config::default();
        config.set("assistant_name", "Helper").unwrap();
        config.set("tools", "code_interpreter").unwrap();

        let request = config.assistant_config().unwrap();
        assert_eq!(request.name.as_deref(), Some("Helper"));
        assert_eq!(request.model, "gpt-4-1106-preview");
        assert_eq!(request.tools, vec![Tool::CodeInterpreter]);
    }
}
