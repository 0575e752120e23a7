use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::mail::client::DEFAULT_OUTLOOK_SEPARATOR_COLORS;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Generation service settings
    #[serde(default)]
    pub ai: AiConfig,
    /// How much of the model window the thread may use
    #[serde(default)]
    pub context: ContextConfig,
    /// Email client fingerprints
    #[serde(default)]
    pub detection: DetectionConfig,
}

/// OpenAI-compatible chat completions endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// API key; the keyring or `DRAFTWISE_API_KEY` take precedence
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model to use (default: gpt-4o)
    #[serde(default = "default_ai_model")]
    pub model: String,
    /// Maximum tokens for the generated reply
    #[serde(default = "default_max_response_tokens")]
    pub max_response_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_ai_model(),
            max_response_tokens: default_max_response_tokens(),
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Tokens held back from the model limit for the reply itself
    #[serde(default = "default_response_reserve_tokens")]
    pub response_reserve_tokens: usize,
    /// Lower bound on the thread budget, even for small models
    #[serde(default = "default_min_context_tokens")]
    pub min_context_tokens: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            response_reserve_tokens: default_response_reserve_tokens(),
            min_context_tokens: default_min_context_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Hex colors (without `#`) of the border Outlook draws above quoted replies
    #[serde(default = "default_outlook_separator_colors")]
    pub outlook_separator_colors: Vec<String>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            outlook_separator_colors: default_outlook_separator_colors(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_ai_model() -> String {
    "gpt-4o".to_string()
}

fn default_max_response_tokens() -> u32 {
    1000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_response_reserve_tokens() -> usize {
    1000
}

fn default_min_context_tokens() -> usize {
    256
}

fn default_outlook_separator_colors() -> Vec<String> {
    DEFAULT_OUTLOOK_SEPARATOR_COLORS
        .iter()
        .map(|c| c.to_string())
        .collect()
}

impl Config {
    pub fn config_dir() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("draftwise");
        Ok(dir)
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load the user config, or defaults when there is none yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| {
                format!("Failed to create config directory: {}", dir.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn ensure_dirs() -> Result<()> {
        fs::create_dir_all(Self::config_dir()?)?;
        Ok(())
    }
}
