use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Default, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub research: ResearchConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_max_search_results")]
    pub max_results: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResearchConfig {
    #[serde(default = "default_max_sites")]
    pub max_sites: usize,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_search_delay_ms")]
    pub search_delay_ms: u64,
    #[serde(default = "default_fetch_delay_ms")]
    pub fetch_delay_ms: u64,
    #[serde(default = "default_content_char_cap")]
    pub content_char_cap: usize,
    #[serde(default = "default_min_content_chars")]
    pub min_content_chars: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlannerConfig {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Optional bound on the accumulated step context passed to later
    /// steps. Absent means the context grows without bound.
    pub context_char_cap: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_max_search_results() -> usize {
    5
}
fn default_max_sites() -> usize {
    5
}
fn default_fetch_timeout_secs() -> u64 {
    10
}
fn default_search_delay_ms() -> u64 {
    1000
}
fn default_fetch_delay_ms() -> u64 {
    2000
}
fn default_content_char_cap() -> usize {
    3000
}
fn default_min_content_chars() -> usize {
    100
}
fn default_max_steps() -> usize {
    5
}
fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            max_results: default_max_search_results(),
        }
    }
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_sites: default_max_sites(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            search_delay_ms: default_search_delay_ms(),
            fetch_delay_ms: default_fetch_delay_ms(),
            content_char_cap: default_content_char_cap(),
            min_content_chars: default_min_content_chars(),
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            context_char_cap: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl AppConfig {
    pub fn load(explicit: Option<&Path>) -> Self {
        let mut paths: Vec<PathBuf> = Vec::new();
        if let Some(p) = explicit {
            paths.push(p.to_path_buf());
        }
        paths.push(PathBuf::from("config.toml"));
        paths.push(
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("toolpilot/config.toml"),
        );
        paths.push(
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".toolpilot/config.toml"),
        );

        for path in paths {
            if path.exists() {
                match fs::read_to_string(&path) {
                    Ok(content) => match toml::from_str(&content) {
                        Ok(config) => {
                            tracing::info!("Loaded config from {}", path.display());
                            return config;
                        }
                        Err(e) => {
                            tracing::warn!("Failed to parse config at {}: {}", path.display(), e);
                        }
                    },
                    Err(e) => {
                        tracing::warn!("Failed to read config at {}: {}", path.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Self::default()
    }

    /// Gemini API key: environment wins over the config file.
    pub fn llm_api_key(&self) -> Option<String> {
        std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.llm.api_key.clone())
    }

    /// Tavily API key: environment wins over the config file.
    pub fn search_api_key(&self) -> Option<String> {
        std::env::var("TAVILY_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.search.api_key.clone())
    }
}
