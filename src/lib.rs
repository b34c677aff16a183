//! eduroute - Multi-Provider AI Chat Gateway
//!
//! HTTP gateway that fronts multiple LLM providers for an educational
//! chat platform.
//!
//! # Features
//!
//! - **Local Classification**: keyword/length heuristics assign each
//!   message a complexity tier and a topic module, with no external calls
//! - **Model Routing**: tier-driven provider priority with deterministic
//!   model selection and explicit caller overrides
//! - **Cascading Fallback**: pre-stream provider failures hop to the next
//!   provider; only the aggregate failure reaches the caller
//! - **Response Caching**: bounded TTL caches (Moka) for classifications
//!   and full responses, keyed on SHA256 fingerprints
//! - **Stream Relay**: token-by-token relay with provenance headers and
//!   no whole-response buffering
//!
//! # Architecture
//!
//! ```text
//! Client ──► POST /api/chat ──► Cache ──► Classifier ──► Selector
//!                                 │                         │
//!                                 ▼                         ▼
//!                          cached reply        Fallback Controller
//!                                                  │        │
//!                                              Relay ◄── Providers
//!                                                      (OpenAI / Google / Anthropic)
//! ```

pub mod cache;
pub mod classifier;
pub mod config;
pub mod error;
pub mod fallback;
pub mod providers;
pub mod relay;
pub mod selector;
pub mod server;

pub use cache::{CachedReply, GatewayCaches, TtlCache};
pub use classifier::{
    classify, ClassificationResult, ClassificationSource, ComplexityTier, ModuleTag,
};
pub use config::Config;
pub use error::{GatewayError, ProviderError, ProviderFailure};
pub use fallback::{ActiveStream, FallbackController};
pub use providers::{
    ChatMessage, ChatProvider, GenerationParams, ProviderKind, ProviderRegistry, TokenStream,
};
pub use relay::{SessionState, StreamSession};
pub use selector::{ModelSelector, SelectionDecision, SelectionReason};
pub use server::{router, AppState};
