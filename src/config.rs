use serde::Deserialize;
use std::{fs, path::Path};
use tracing::info;

#[derive(Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: String,
    #[serde(default)]
    pub openai: OpenAiSection,
    #[serde(default)]
    pub workflow: WorkflowSection,
}

fn default_db_path() -> String {
    "data/invoices.db".to_string()
}

fn default_uploads_dir() -> String {
    "uploads".to_string()
}

#[derive(Deserialize)]
pub struct OpenAiSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f64 {
    0.3
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl Default for OpenAiSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            api_key_env: default_api_key_env(),
        }
    }
}

#[derive(Deserialize)]
pub struct WorkflowSection {
    /// Status stamped on every freshly ingested invoice.
    #[serde(default = "default_initial_status")]
    pub initial_status: String,
}

fn default_initial_status() -> String {
    "On Payment Term".to_string()
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            initial_status: default_initial_status(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load the config file, or fall back to built-in defaults when it
    /// does not exist yet.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            info!(path = %path.as_ref().display(), "No config file, using defaults");
            Ok(toml::from_str("")?)
        }
    }

    /// Resolve the OpenAI API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String, Box<dyn std::error::Error>> {
        std::env::var(&self.openai.api_key_env).map_err(|_| {
            format!("{} env var required for extraction", self.openai.api_key_env).into()
        })
    }
}
