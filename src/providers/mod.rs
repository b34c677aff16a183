//! Provider Registry and Streaming Clients
//!
//! Each supported LLM vendor is a variant of the closed `ProviderKind`
//! enum and implements the `ChatProvider` trait, so every provider is
//! guaranteed at compile time to expose the same streaming contract.
//! The registry maps (tier, provider) to concrete model ids and tracks
//! per-deployment availability derived from credential presence.

mod anthropic;
mod google;
mod openai;
mod sse;

pub use anthropic::AnthropicProvider;
pub use google::GoogleProvider;
pub use openai::OpenAiProvider;

use async_trait::async_trait;
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use crate::classifier::ComplexityTier;
use crate::config::Config;
use crate::error::ProviderError;

/// Supported LLM vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Google,
    Anthropic,
}

impl ProviderKind {
    pub const ALL: &'static [ProviderKind] = &[
        ProviderKind::OpenAi,
        ProviderKind::Google,
        ProviderKind::Anthropic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Google => "google",
            ProviderKind::Anthropic => "anthropic",
        }
    }

    pub fn parse(s: &str) -> Option<ProviderKind> {
        match s.to_lowercase().as_str() {
            "openai" => Some(ProviderKind::OpenAi),
            "google" => Some(ProviderKind::Google),
            "anthropic" => Some(ProviderKind::Anthropic),
            _ => None,
        }
    }
}

/// One turn in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Generation knobs forwarded to the provider
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationParams {
    /// Defaults per tier: complex requests get more room and a warmer
    /// temperature than trivial/simple ones.
    pub fn for_tier(tier: ComplexityTier) -> Self {
        match tier {
            ComplexityTier::Complex => Self {
                temperature: 0.7,
                max_tokens: 1000,
            },
            _ => Self {
                temperature: 0.5,
                max_tokens: 400,
            },
        }
    }
}

/// Lazy, finite, non-restartable sequence of text chunks from a provider
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// Common contract all vendors implement
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Open a token stream. Errors before the first byte are retryable by
    /// the fallback controller; errors inside the returned stream are not.
    async fn stream_chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<TokenStream, ProviderError>;
}

/// Static (tier, provider) -> model table with availability flags.
/// Built once from configuration; read-only afterwards.
#[derive(Clone)]
pub struct ProviderRegistry {
    available: HashMap<ProviderKind, bool>,
}

impl ProviderRegistry {
    pub fn from_config(config: &Config) -> Self {
        let mut available = HashMap::new();
        available.insert(ProviderKind::OpenAi, config.openai_api_key.is_some());
        available.insert(ProviderKind::Google, config.google_api_key.is_some());
        available.insert(ProviderKind::Anthropic, config.anthropic_api_key.is_some());
        Self { available }
    }

    /// Build a registry with an explicit availability set (tests).
    pub fn with_available(kinds: &[ProviderKind]) -> Self {
        let available = ProviderKind::ALL
            .iter()
            .map(|k| (*k, kinds.contains(k)))
            .collect();
        Self { available }
    }

    pub fn is_available(&self, kind: ProviderKind) -> bool {
        self.available.get(&kind).copied().unwrap_or(false)
    }

    /// Concrete model id for a (tier, provider) pair. Total over both
    /// enums: every tier resolves to a model for every provider.
    pub fn model_for(&self, tier: ComplexityTier, kind: ProviderKind) -> &'static str {
        match (kind, tier) {
            (ProviderKind::OpenAi, ComplexityTier::Complex) => "gpt-5-chat-latest",
            (ProviderKind::OpenAi, _) => "gpt-4o-mini",
            (ProviderKind::Google, _) => "gemini-2.0-flash-exp",
            (ProviderKind::Anthropic, ComplexityTier::Complex) => "claude-3-5-sonnet-20241022",
            (ProviderKind::Anthropic, _) => "claude-3-5-haiku-20241022",
        }
    }

    /// Auto-selection priority per tier. Trivial and simple traffic goes
    /// to the fastest/cheapest vendor first; complex traffic to the most
    /// capable one.
    pub fn priority_for(&self, tier: ComplexityTier) -> &'static [ProviderKind] {
        match tier {
            ComplexityTier::Trivial | ComplexityTier::Simple => &[
                ProviderKind::Google,
                ProviderKind::OpenAi,
                ProviderKind::Anthropic,
            ],
            ComplexityTier::Complex => &[
                ProviderKind::OpenAi,
                ProviderKind::Anthropic,
                ProviderKind::Google,
            ],
        }
    }

    /// Providers that are configured in this deployment
    pub fn available_kinds(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .iter()
            .copied()
            .filter(|k| self.is_available(*k))
            .collect()
    }
}

/// Construct the concrete clients for every configured vendor.
pub fn build_providers(config: &Config) -> HashMap<ProviderKind, Arc<dyn ChatProvider>> {
    let mut providers: HashMap<ProviderKind, Arc<dyn ChatProvider>> = HashMap::new();

    providers.insert(
        ProviderKind::OpenAi,
        Arc::new(OpenAiProvider::new(config.openai_api_key.as_deref())),
    );
    providers.insert(
        ProviderKind::Google,
        Arc::new(GoogleProvider::new(config.google_api_key.as_deref())),
    );
    providers.insert(
        ProviderKind::Anthropic,
        Arc::new(AnthropicProvider::new(config.anthropic_api_key.as_deref())),
    );

    providers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_is_total() {
        let registry = ProviderRegistry::with_available(ProviderKind::ALL);
        for tier in [
            ComplexityTier::Trivial,
            ComplexityTier::Simple,
            ComplexityTier::Complex,
        ] {
            assert!(!registry.priority_for(tier).is_empty());
            for kind in ProviderKind::ALL {
                assert!(!registry.model_for(tier, *kind).is_empty());
            }
        }
    }

    #[test]
    fn test_priority_ordering() {
        let registry = ProviderRegistry::with_available(ProviderKind::ALL);
        assert_eq!(
            registry.priority_for(ComplexityTier::Trivial)[0],
            ProviderKind::Google
        );
        assert_eq!(
            registry.priority_for(ComplexityTier::Complex)[0],
            ProviderKind::OpenAi
        );
    }

    #[test]
    fn test_availability_from_config() {
        let registry = ProviderRegistry::with_available(&[ProviderKind::OpenAi]);
        assert!(registry.is_available(ProviderKind::OpenAi));
        assert!(!registry.is_available(ProviderKind::Google));
        assert_eq!(registry.available_kinds(), vec![ProviderKind::OpenAi]);
    }

    #[test]
    fn test_kind_parse_round_trip() {
        for kind in ProviderKind::ALL {
            assert_eq!(ProviderKind::parse(kind.as_str()), Some(*kind));
        }
        assert_eq!(ProviderKind::parse("auto"), None);
    }

    #[test]
    fn test_params_per_tier() {
        let complex = GenerationParams::for_tier(ComplexityTier::Complex);
        let simple = GenerationParams::for_tier(ComplexityTier::Simple);
        assert!(complex.max_tokens > simple.max_tokens);
    }
}
