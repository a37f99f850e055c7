//! Configuration management

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::application::errors::ConfigError;
use crate::infrastructure::plugins::PluginDiscovery;

/// Host configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub bot: BotConfig,
    pub api: ApiConfig,
    pub plugins: PluginsConfig,
    pub behavior: BehaviorConfig,
    pub throttle: ThrottleConfig,
    pub exit_codes: ExitCodes,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BotConfig {
    pub name: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "nocto".to_string(),
        }
    }
}

/// Bot API client settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ApiConfig {
    pub token: Option<String>,
    /// Run offline against the console instead of the Bot API
    pub disable: bool,
    /// Abort startup when `getMe` fails
    pub mandatory_handshake: bool,
    /// Long-poll timeout in seconds
    pub poll_timeout: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            token: None,
            disable: false,
            mandatory_handshake: true,
            poll_timeout: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PluginsConfig {
    pub base_path: PathBuf,
    pub register: Vec<String>,
    /// Register every subdirectory of `base-path` instead of `register`
    pub load_all: bool,
    pub auto_enabled: Vec<String>,
    /// Per-plugin overrides deep-merged over each plugin's `config.yaml`
    pub config: HashMap<String, Value>,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("./plugins"),
            register: vec!["echo".to_string(), "trace".to_string()],
            load_all: false,
            auto_enabled: vec!["echo".to_string()],
            config: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BehaviorConfig {
    pub command_prefix: String,
    /// Accept messages from private chats
    pub allow_private: bool,
    /// User IDs or `@usernames` allowed to run admin commands
    pub admins: Vec<String>,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            command_prefix: "/".to_string(),
            allow_private: true,
            admins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ThrottleConfig {
    pub enabled: bool,
    pub max_requests: u32,
    pub window_seconds: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 20,
            window_seconds: 60,
        }
    }
}

/// Process exit codes
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ExitCodes {
    pub bot_start_failed: i32,
    pub unexpected_exit: i32,
    pub clean_interrupt: i32,
    pub dirty_interrupt: i32,
    pub forced_interrupt: i32,
}

impl Default for ExitCodes {
    fn default() -> Self {
        Self {
            bot_start_failed: 1,
            unexpected_exit: 2,
            clean_interrupt: 0,
            dirty_interrupt: 3,
            forced_interrupt: 4,
        }
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_env() -> Self {
        let mut config = Config::default();
        config.apply_env();
        config
    }

    /// Apply `BOT_TOKEN` and `BOT_PREFIX` from the environment
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("BOT_TOKEN") {
            self.api.token = Some(token);
        }

        if let Ok(prefix) = std::env::var("BOT_PREFIX") {
            self.behavior.command_prefix = prefix;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.behavior.command_prefix.is_empty() {
            return Err(ConfigError::InvalidValue(
                "behavior.command-prefix must not be empty".to_string(),
            ));
        }
        if self.throttle.enabled && self.throttle.window_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "throttle.window-seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Token to use for the Bot API, unless running offline
    pub fn token(&self) -> Result<Option<&str>, ConfigError> {
        if self.api.disable {
            return Ok(None);
        }
        match self.api.token.as_deref() {
            Some(token) if !token.is_empty() => Ok(Some(token)),
            _ => Err(ConfigError::MissingField("api.token".to_string())),
        }
    }

    pub fn discovery(&self) -> PluginDiscovery {
        if self.plugins.load_all {
            PluginDiscovery::Scan(self.plugins.base_path.clone())
        } else {
            PluginDiscovery::Registered(self.plugins.register.clone())
        }
    }

    pub fn plugin_overrides(&self) -> HashMap<String, Value> {
        self.plugins.config.clone()
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self)
            .map_err(|e| ConfigError::Parse(format!("Failed to serialize config: {}", e)))
    }
}
