use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::{Context, Result, anyhow};

use crate::ai::{gemini, ollama, ClaudeClient, GeminiClient, OllamaClient, OpenAIClient};
use crate::gateway::ChatGateway;
use crate::provider::Provider;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub provider: Option<String>,
    pub default_model: Option<String>,
    pub gemini_api_key: Option<String>,
    pub claude_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub ollama_url: Option<String>,
    pub system_instruction: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            provider: Some(Provider::Gemini.as_str().to_string()),
            default_model: None,
            gemini_api_key: None,
            claude_api_key: None,
            openai_api_key: None,
            ollama_url: None,
            system_instruction: Some(gemini::DEFAULT_SYSTEM_INSTRUCTION.to_string()),
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let config: Config = serde_json::from_str(&config_content)
            .with_context(|| format!("Invalid config {:?}", path))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn provider(&self) -> Provider {
        self.provider
            .as_deref()
            .and_then(Provider::from_str)
            .unwrap_or(Provider::Gemini)
    }

    pub fn model(&self) -> String {
        self.default_model
            .clone()
            .unwrap_or_else(|| self.provider().default_model().to_string())
    }

    /// Environment first, then the config file
    pub fn api_key(&self, provider: Provider) -> Option<String> {
        self.api_key_with(provider, |name| std::env::var(name).ok())
    }

    fn api_key_with(&self, provider: Provider, env: impl Fn(&str) -> Option<String>) -> Option<String> {
        let from_env = provider
            .key_env_var()
            .and_then(|name| env(name))
            .filter(|key| !key.trim().is_empty());

        from_env.or_else(|| match provider {
            Provider::Gemini => self.gemini_api_key.clone(),
            Provider::Claude => self.claude_api_key.clone(),
            Provider::OpenAI => self.openai_api_key.clone(),
            Provider::Ollama => None,
        })
    }

    /// Build the gateway for the configured provider and model
    pub fn build_gateway(&self) -> Result<Arc<dyn ChatGateway>> {
        let provider = self.provider();
        let model = self.model();
        let system = self.system_instruction.clone();

        let missing_key = || {
            anyhow!(
                "{} API key not configured. Set {} or add it to {:?}",
                provider.display_name(),
                provider.key_env_var().unwrap_or_default(),
                Self::get_config_path().unwrap_or_default()
            )
        };

        let gateway: Arc<dyn ChatGateway> = match provider {
            Provider::Gemini => {
                let key = self.api_key(provider).ok_or_else(missing_key)?;
                Arc::new(GeminiClient::new(&key).with_model(&model).with_system_instruction(system))
            }
            Provider::Claude => {
                let key = self.api_key(provider).ok_or_else(missing_key)?;
                Arc::new(ClaudeClient::new(&key).with_model(&model).with_system_instruction(system))
            }
            Provider::OpenAI => {
                let key = self.api_key(provider).ok_or_else(missing_key)?;
                Arc::new(OpenAIClient::new(&key).with_model(&model).with_system_instruction(system))
            }
            Provider::Ollama => {
                let url = self.ollama_url.as_deref().unwrap_or(ollama::DEFAULT_URL);
                Arc::new(OllamaClient::new(url).with_model(&model).with_system_instruction(system))
            }
        };

        tracing::info!(provider = provider.as_str(), %model, "chat gateway ready");
        Ok(gateway)
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("chatline").join("config.json"))
    }
}
