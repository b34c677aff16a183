//! Configuration management

use anyhow::Result;
use std::time::Duration;

/// Gateway configuration, loaded once at startup
#[derive(Debug, Clone)]
pub struct Config {
    /// OpenAI API key (optional - gates provider availability)
    pub openai_api_key: Option<String>,

    /// Google Generative AI API key (optional)
    pub google_api_key: Option<String>,

    /// Anthropic API key (optional)
    pub anthropic_api_key: Option<String>,

    /// Bind address for the HTTP server
    pub bind_addr: String,

    /// Enable the response/classification caches
    pub cache_enabled: bool,

    /// Full-response cache TTL
    pub response_cache_ttl: Duration,

    /// Full-response cache capacity (entries)
    pub response_cache_capacity: u64,

    /// Classification cache TTL
    pub classify_cache_ttl: Duration,

    /// Classification cache capacity (entries)
    pub classify_cache_capacity: u64,

    /// Per-provider attempt timeout
    pub provider_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();

        // Google key accepted under several historical names
        let google_api_key = std::env::var("GOOGLE_GENERATIVE_AI_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_GEMINI_API_KEY"))
            .or_else(|_| std::env::var("GOOGLE_API_KEY"))
            .ok();

        let anthropic_api_key = std::env::var("ANTHROPIC_API_KEY").ok();

        let bind_addr =
            std::env::var("EDUROUTE_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let cache_enabled = std::env::var("EDUROUTE_CACHE_ENABLED")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true);

        let response_cache_ttl = env_secs("EDUROUTE_RESPONSE_CACHE_TTL", 300);
        let classify_cache_ttl = env_secs("EDUROUTE_CLASSIFY_CACHE_TTL", 1800);

        let response_cache_capacity = env_u64("EDUROUTE_RESPONSE_CACHE_CAPACITY", 100);
        let classify_cache_capacity = env_u64("EDUROUTE_CLASSIFY_CACHE_CAPACITY", 200);

        let provider_timeout = env_secs("EDUROUTE_PROVIDER_TIMEOUT", 30);

        Ok(Self {
            openai_api_key,
            google_api_key,
            anthropic_api_key,
            bind_addr,
            cache_enabled,
            response_cache_ttl,
            response_cache_capacity,
            classify_cache_ttl,
            classify_cache_capacity,
            provider_timeout,
        })
    }
}

fn env_secs(name: &str, default_secs: u64) -> Duration {
    Duration::from_secs(env_u64(name, default_secs))
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
