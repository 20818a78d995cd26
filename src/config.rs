use color_eyre::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// OpenAI-compatible completion endpoint (Groq by default)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

/// Ollama embedding model used for recipe lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    pub ollama_url: String,
    pub model: String,
}

/// Google Custom Search and YouTube Data API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub google_api_key: String,
    pub google_cse_id: String,
    pub youtube_api_key: String,
    pub max_results: usize,
    pub timeout_secs: u64,
    pub scrape_timeout_secs: u64,
}

/// Google Calendar settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    pub api_base: String,
    pub token_url: String,
    pub timezone: String,
    pub client_id: String,
    pub client_secret: String,
    pub timeout_secs: u64,
}

/// Tunables for the dialogue session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Stored user and assistant messages, each counted on its own
    pub max_memory_turns: usize,
    /// Exchanges (user + assistant pairs) shown to the classifier
    pub context_turns: usize,
    pub kb_threshold: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_select_distance: Option<f32>,
    pub retrieval_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            api_key: String::new(),
            model: "meta-llama/llama-4-maverick-17b-128e-instruct".to_string(),
            temperature: 0.7,
            timeout_secs: 60,
        }
    }
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            model: "bge-m3".to_string(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            google_api_key: String::new(),
            google_cse_id: String::new(),
            youtube_api_key: String::new(),
            max_results: 3,
            timeout_secs: 10,
            scrape_timeout_secs: 8,
        }
    }
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            api_base: "https://www.googleapis.com/calendar/v3".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            timezone: "Africa/Cairo".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            timeout_secs: 15,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_memory_turns: 12,
            context_turns: 3,
            kb_threshold: 0.35,
            auto_select_distance: None,
            retrieval_timeout_secs: 20,
        }
    }
}

impl Config {
    /// Loads configuration from disk or creates default if not found
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            let contents = fs::read_to_string(&config_path)?;
            toml::from_str(&contents)?
        } else {
            let config = Config::default();
            config.save()?;
            config
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Saves configuration to disk
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&config_path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Returns the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("", "", "sufra")
            .ok_or_else(|| color_eyre::eyre::eyre!("Could not determine config directory"))?;
        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    // Secrets usually live in the environment rather than the config file
    fn apply_env_overrides(&mut self) {
        let llm_key = env_value("SUFRA_LLM_API_KEY").or_else(|| env_value("GROQ_API_KEY"));
        if let Some(key) = llm_key {
            self.llm.api_key = key;
        }
        if let Some(key) = env_value("GOOGLE_API_KEY") {
            self.search.google_api_key = key;
        }
        if let Some(id) = env_value("GOOGLE_CSE_ID") {
            self.search.google_cse_id = id;
        }
        if let Some(key) = env_value("YOUTUBE_API_KEY") {
            self.search.youtube_api_key = key;
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_session_settings() {
        let config = Config::default();
        assert_eq!(config.session.max_memory_turns, 12);
        assert_eq!(config.session.context_turns, 3);
        assert!((config.session.kb_threshold - 0.35).abs() < f32::EPSILON);
        assert_eq!(config.session.auto_select_distance, None);
        assert_eq!(config.calendar.timezone, "Africa/Cairo");
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config: Config = toml::from_str(
            r#"
            [llm]
            base_url = "http://localhost:9999/v1"
            api_key = "k"
            model = "m"
            temperature = 0.2
            timeout_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.llm.model, "m");
        assert_eq!(config.search.scrape_timeout_secs, 8);
        assert_eq!(config.session.max_memory_turns, 12);
    }

    #[test]
    fn test_scrape_timeout_is_tightest() {
        let config = Config::default();
        assert!(config.search.scrape_timeout_secs < config.search.timeout_secs);
        assert!(config.search.scrape_timeout_secs < config.llm.timeout_secs);
        assert!(config.search.scrape_timeout_secs < config.calendar.timeout_secs);
    }
}
