use std::env;
use std::fs;
use std::path::Path;
use serde::{Deserialize, Serialize};
use anyhow::{Result, Context};
use log::warn;

/// Main configuration structure for terminus
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider settings
    pub provider: ProviderConfig,

    /// HTTP service settings
    pub server: ServerConfig,

    /// Terminal display settings
    pub ui: UIConfig,

    /// Session behaviour
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// OpenAI-compatible API base URL
    pub base_url: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Model used by `tb run` when none is given
    pub analysis_model: String,

    /// Model used to synthesize new tasks
    pub generation_model: String,

    pub analysis_temperature: f32,

    pub generation_temperature: f32,

    /// Answer with labelled placeholder payloads when no API key is set
    pub mock_without_key: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UIConfig {
    /// Enable colorful output
    pub colorful: bool,

    /// Prefix rendered lines with their time
    pub timestamps: bool,

    /// Characters of the reasoning trace shown by the inspector
    pub inspector_preview_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Start with the built-in sample tasks
    pub seed_tasks: bool,

    /// Topic for `tb task create` without arguments
    pub default_topic: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            analysis_model: crate::command::DEFAULT_MODEL.to_string(),
            generation_model: "gpt-4o-mini".to_string(),
            analysis_temperature: 0.7,
            generation_temperature: 1.0,
            mock_without_key: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            colorful: true,
            timestamps: false,
            inspector_preview_chars: 150,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            seed_tasks: true,
            default_topic: crate::command::DEFAULT_TOPIC.to_string(),
        }
    }
}

impl ProviderConfig {
    /// API key from the configured environment variable, if set and non-empty.
    pub fn api_key(&self) -> Option<String> {
        env::var(&self.api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load configuration from command line argument or default locations
    pub fn load(config_path: &Option<String>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => Self::from_file(shellexpand::tilde(path).as_ref())?,
            None => Self::load_default_locations(),
        };
        config.apply_env();
        Ok(config)
    }

    fn load_default_locations() -> Self {
        let default_paths = [
            "terminus.toml",
            ".terminus.toml",
            "~/.config/terminus/config.toml",
        ];

        for path in default_paths {
            let expanded_path = shellexpand::tilde(path);
            if Path::new(expanded_path.as_ref()).exists() {
                match Self::from_file(expanded_path.as_ref()) {
                    Ok(config) => return config,
                    Err(e) => warn!("Failed to load config from {}: {:#}", path, e),
                }
            }
        }

        Self::default()
    }

    /// `OPENAI_BASE_URL` overrides the configured base URL.
    pub fn apply_env(&mut self) {
        if let Ok(base_url) = env::var("OPENAI_BASE_URL") {
            let base_url = base_url.trim();
            if !base_url.is_empty() {
                self.provider.base_url = base_url.to_string();
            }
        }
    }

    /// Merge with command-line arguments (CLI args take precedence)
    pub fn merge_with_args(&mut self, headless: bool, host: Option<String>, port: Option<u16>) {
        if headless {
            self.ui.colorful = false;
        }
        if let Some(host) = host {
            self.server.host = host;
        }
        if let Some(port) = port {
            self.server.port = port;
        }
    }
}
