//! Configuration file loader with multi-source merging

use std::path::{Path, PathBuf};
use std::time::Duration;

use dilemma_logic::{AiSettings, ConfigError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::LabError;

const PROJECT_FILES: [&str; 2] = ["dilemma.toml", ".dilemma.toml"];

/// `[ai]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub model: String,
    /// Falls back to `ANTHROPIC_API_KEY`
    pub api_key: Option<String>,
    pub base_url: String,
    pub max_tokens: u32,
    pub token_budget: u32,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub safety_margin: u32,
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        let settings = AiSettings::default();
        Self {
            model: "claude-3-haiku-20240307".to_string(),
            api_key: None,
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: settings.max_tokens,
            token_budget: settings.token_budget,
            max_retries: settings.max_retries,
            retry_delay_ms: settings.retry_delay.as_millis() as u64,
            safety_margin: settings.safety_margin,
            timeout_secs: 30,
        }
    }
}

impl AiConfig {
    pub fn settings(&self) -> AiSettings {
        AiSettings {
            token_budget: self.token_budget,
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            safety_margin: self.safety_margin,
            max_tokens: self.max_tokens,
        }
    }

    /// Non-empty API key, required once an AI strategy is actually built
    pub fn api_key(&self) -> Result<&str, ConfigError> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(ConfigError::MissingApiKey),
        }
    }
}

/// `[experiment]` section: defaults for CLI runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentDefaults {
    pub num_games: u32,
    pub num_rounds: u32,
    pub seed: u64,
    pub max_concurrent_games: usize,
}

impl Default for ExperimentDefaults {
    fn default() -> Self {
        Self {
            num_games: 100,
            num_rounds: 10,
            seed: dilemma_logic::strategy::factory::DEFAULT_SEED,
            max_concurrent_games: 1,
        }
    }
}

/// `[storage]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl StorageConfig {
    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("game_history.json")
    }
}

/// Fully merged configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    pub ai: AiConfig,
    pub experiment: ExperimentDefaults,
    pub storage: StorageConfig,
}

impl LabConfig {
    /// Fill a missing or blank `ai.api_key` from the conventional variable
    pub fn with_env_api_key(mut self, env_key: Option<String>) -> Self {
        let missing = self
            .ai
            .api_key
            .as_deref()
            .map_or(true, |k| k.trim().is_empty());
        if missing {
            if let Some(key) = env_key.filter(|k| !k.trim().is_empty()) {
                self.ai.api_key = Some(key);
            }
        }
        self
    }

    /// Copy safe to print: the API key is masked
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if let Some(key) = copy.ai.api_key.as_mut() {
            let tail = key
                .char_indices()
                .rev()
                .nth(3)
                .map_or(key.as_str(), |(i, _)| &key[i..]);
            let masked = format!("****{}", tail);
            *key = masked;
        }
        copy
    }
}

/// Configuration loader that handles file discovery and merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from all sources with proper priority
    ///
    /// Priority (highest to lowest):
    /// 1. `DILEMMA_` environment variables (`DILEMMA_AI__MODEL`, ...)
    /// 2. Explicit config path (if provided)
    /// 3. Project root: `./dilemma.toml` or `./.dilemma.toml`
    /// 4. Global: `~/.config/dilemma-lab/config.toml`
    /// 5. Default values
    ///
    /// `ANTHROPIC_API_KEY` fills `ai.api_key` when nothing else set it.
    pub fn load(config_path: Option<&Path>) -> Result<LabConfig, LabError> {
        let config: LabConfig = Self::figment(config_path).extract().map_err(Box::new)?;
        Ok(config.with_env_api_key(std::env::var("ANTHROPIC_API_KEY").ok()))
    }

    pub fn figment(config_path: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(LabConfig::default()));

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(&global_path));
            }
        }

        if let Some(path) = Self::project_config_path() {
            figment = figment.merge(Toml::file(path));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment.merge(Env::prefixed("DILEMMA_").split("__"))
    }

    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("dilemma-lab").join("config.toml"))
    }

    /// Get the project-level config file path (if it exists)
    pub fn project_config_path() -> Option<PathBuf> {
        PROJECT_FILES
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }

    /// Print the config file locations being used
    pub fn print_config_sources(config_path: Option<&Path>) {
        println!("Configuration sources (in priority order):");
        println!("  [ENV  ] DILEMMA_* variables, ANTHROPIC_API_KEY");

        if let Some(path) = config_path {
            let mark = if path.exists() { "FOUND" } else { "MISSING" };
            println!("  [{}] Explicit: {}", mark, path.display());
        }

        match Self::project_config_path() {
            Some(path) => println!("  [FOUND] Project: {}", path.display()),
            None => println!("  [     ] Project: ./dilemma.toml or ./.dilemma.toml"),
        }

        if let Some(path) = Self::global_config_path() {
            let mark = if path.exists() { "FOUND" } else { "     " };
            println!("  [{}] Global:  {}", mark, path.display());
        }

        println!("  [     ] Default: built-in defaults");
    }
}
