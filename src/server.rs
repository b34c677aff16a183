//! Gateway HTTP API
//!
//! Two endpoints: `POST /api/chat` streams tokens back with provenance
//! headers, and `GET /api/providers` reports the static routing table.
//! The handler pipeline is: validate, response-cache lookup, classify,
//! select, invoke with fallback, relay.

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::{fingerprint, GatewayCaches};
use crate::classifier::{
    classify, classify_tier, ClassificationResult, ClassificationSource, ComplexityTier, ModuleTag,
};
use crate::config::Config;
use crate::error::GatewayError;
use crate::fallback::FallbackController;
use crate::providers::{
    build_providers, ChatMessage, ChatProvider, GenerationParams, ProviderKind, ProviderRegistry,
};
use crate::relay::{relay, CacheWriteback, StreamSession};
use crate::selector::ModelSelector;

/// Shared per-process state, constructed once at startup
#[derive(Clone)]
pub struct AppState {
    pub caches: GatewayCaches,
    pub cache_enabled: bool,
    pub fallback: Arc<FallbackController>,
    pub idle_timeout: Duration,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        let registry = ProviderRegistry::from_config(config);
        let providers = build_providers(config);
        Self::with_providers(config, registry, providers)
    }

    /// Assemble state with explicit registry and clients (tests inject
    /// fakes here).
    pub fn with_providers(
        config: &Config,
        registry: ProviderRegistry,
        providers: HashMap<ProviderKind, Arc<dyn ChatProvider>>,
    ) -> Self {
        let selector = ModelSelector::new(registry);
        let fallback = FallbackController::new(selector, providers, config.provider_timeout);

        Self {
            caches: GatewayCaches::new(
                config.response_cache_capacity,
                config.response_cache_ttl,
                config.classify_cache_capacity,
                config.classify_cache_ttl,
            ),
            cache_enabled: config.cache_enabled,
            fallback: Arc::new(fallback),
            idle_timeout: config.provider_timeout,
        }
    }
}

/// Build the axum router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/providers", get(providers_info))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default = "default_auto")]
    pub module: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    #[serde(default = "default_true")]
    pub use_cache: bool,
    #[serde(default = "default_auto")]
    pub force_provider: String,
}

fn default_auto() -> String {
    "auto".to_string()
}

fn default_true() -> bool {
    true
}

/// POST /api/chat - classify, route and stream one message
async fn chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Response {
    let started = Instant::now();
    let request_id = Uuid::new_v4();

    let message = req.message.trim().to_string();
    if message.is_empty() {
        return error_response(GatewayError::InvalidInput, started);
    }

    debug!(
        request_id = %request_id,
        module = %req.module,
        history_len = req.history.len(),
        conversation = ?req.conversation_id,
        "chat request"
    );

    // `useCache: false` opts the request out of both caches
    let use_cache = req.use_cache && state.cache_enabled;

    // 1. Classification: honor a client module override, otherwise use the
    // classification cache and local heuristics. Complexity is always local.
    let classification = resolve_classification(&state, &message, &req, use_cache).await;
    let module_str = classification.module.as_str();

    // 2. Response cache short-circuits all provider work
    let cache_key = fingerprint(&message, module_str, req.history.len());
    if use_cache {
        if let Some(reply) = state.caches.responses.get(&cache_key).await {
            info!(request_id = %request_id, module = module_str, "serving cached response");
            return cached_response(
                reply.text,
                &reply.provider,
                &reply.model,
                &classification,
                request_id,
                started,
            );
        }
    }

    // 3. Initial selection
    let force = ProviderKind::parse(&req.force_provider);
    let decision = match state.fallback.selector().select(&classification, force) {
        Ok(d) => d,
        Err(e) => return error_response(e, started),
    };

    // 4. Prompt assembly: module system prompt, last 3 turns, the message
    let messages = build_messages(classification.module, &req.history, &message);
    let params = GenerationParams::for_tier(classification.tier);

    // 5. Invoke with cascading fallback
    let active = match state.fallback.invoke(decision, &messages, &params).await {
        Ok(a) => a,
        Err(e) => return error_response(e, started),
    };

    let provider_reason = match active.fallback_from {
        Some(from) => format!(
            "{}; fallback from {}",
            active.decision.reason.as_str(),
            from.as_str()
        ),
        None => active.decision.reason.as_str().to_string(),
    };

    // 6. Relay the token stream, writing back to the cache on completion
    let session = StreamSession::new(active.decision.provider, active.decision.model);
    let writeback = use_cache.then(|| CacheWriteback {
        cache: state.caches.responses.clone(),
        key: cache_key,
    });
    let body = Body::from_stream(relay(active.tokens, session, state.idle_timeout, writeback));

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header("X-Provider", active.decision.provider.as_str())
        .header("X-Model", active.decision.model)
        .header("X-Module", module_str)
        .header("X-Complexity", classification.tier.as_str())
        .header("X-Classification-Method", classification.source.as_str())
        .header("X-Cached", "false")
        .header("X-Latency", started.elapsed().as_millis().to_string())
        .header("X-Provider-Reason", provider_reason)
        .header("X-Request-Id", request_id.to_string());

    response
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// GET /api/providers - static routing table derived from the registry
async fn providers_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    let registry = state.fallback.selector().registry();

    let tiers = [
        ComplexityTier::Trivial,
        ComplexityTier::Simple,
        ComplexityTier::Complex,
    ];

    let providers: Vec<_> = ProviderKind::ALL
        .iter()
        .map(|kind| {
            let models: serde_json::Map<String, serde_json::Value> = tiers
                .iter()
                .map(|t| {
                    (
                        t.as_str().to_string(),
                        json!(registry.model_for(*t, *kind)),
                    )
                })
                .collect();
            json!({
                "name": kind.as_str(),
                "available": registry.is_available(*kind),
                "models": models,
            })
        })
        .collect();

    let auto_selection: serde_json::Map<String, serde_json::Value> = tiers
        .iter()
        .map(|t| {
            (
                t.as_str().to_string(),
                json!(registry
                    .priority_for(*t)
                    .iter()
                    .map(|p| p.as_str())
                    .collect::<Vec<_>>()),
            )
        })
        .collect();

    Json(json!({
        "providers": providers,
        "auto_selection": auto_selection,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn resolve_classification(
    state: &AppState,
    message: &str,
    req: &ChatRequest,
    use_cache: bool,
) -> ClassificationResult {
    if req.module != "auto" {
        if let Some(module) = ModuleTag::parse(&req.module) {
            return ClassificationResult {
                tier: classify_tier(message),
                module,
                source: ClassificationSource::ClientOverride,
            };
        }
        // Unknown module names fall through to the heuristic
    }

    let key = fingerprint(message, "auto", req.history.len());
    if use_cache {
        if let Some(cached) = state.caches.classifications.get(&key).await {
            return cached;
        }
    }

    let result = classify(message);
    if use_cache {
        state.caches.classifications.insert(key, result).await;
    }
    result
}

fn build_messages(module: ModuleTag, history: &[ChatMessage], message: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len().min(3) + 2);
    messages.push(ChatMessage::system(system_prompt(module)));

    // Only the last 3 turns are forwarded; older context is dropped
    let tail = history.len().saturating_sub(3);
    for turn in &history[tail..] {
        messages.push(turn.clone());
    }

    messages.push(ChatMessage::user(message));
    messages
}

fn system_prompt(module: ModuleTag) -> &'static str {
    match module {
        ModuleTag::ExamPrep => {
            "Você é um assistente educacional especializado em preparação para o ENEM e vestibulares. \
             Responda em português brasileiro, de forma clara e objetiva."
        }
        ModuleTag::LessonContent => {
            "Você é um professor que explica conteúdos didáticos passo a passo. \
             Responda em português brasileiro, com exemplos práticos."
        }
        ModuleTag::EssayWriting => {
            "Você é um corretor de redações dissertativo-argumentativas. \
             Responda em português brasileiro, apontando pontos fortes e melhorias."
        }
        ModuleTag::General => {
            "Você é um assistente educacional brasileiro. \
             Responda em português brasileiro, de forma acolhedora e didática."
        }
    }
}

fn cached_response(
    text: String,
    provider: &str,
    model: &str,
    classification: &ClassificationResult,
    request_id: Uuid,
    started: Instant,
) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header("X-Provider", provider)
        .header("X-Model", model)
        .header("X-Module", classification.module.as_str())
        .header("X-Complexity", classification.tier.as_str())
        .header("X-Classification-Method", classification.source.as_str())
        .header("X-Cached", "true")
        .header("X-Latency", started.elapsed().as_millis().to_string())
        .header("X-Provider-Reason", "cache")
        .header("X-Request-Id", request_id.to_string())
        .body(Body::from(text))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn error_response(error: GatewayError, started: Instant) -> Response {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let (summary, details) = match &error {
        GatewayError::NoProviderAvailable { .. } => {
            ("No AI provider available".to_string(), error.to_string())
        }
        GatewayError::AllProvidersExhausted(_) => {
            ("All AI providers failed".to_string(), error.to_string())
        }
        GatewayError::InvalidInput => ("Message is required".to_string(), error.to_string()),
        GatewayError::Internal(_) => ("Internal server error".to_string(), error.to_string()),
    };

    (
        status,
        Json(json!({
            "error": summary,
            "details": details,
            "latency": started.elapsed().as_millis() as u64,
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::providers::TokenStream;
    use async_trait::async_trait;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    struct EchoProvider {
        kind: ProviderKind,
        reply: &'static str,
    }

    #[async_trait]
    impl ChatProvider for EchoProvider {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        async fn stream_chat(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _params: &GenerationParams,
        ) -> Result<TokenStream, ProviderError> {
            let chunks: Vec<Result<String, ProviderError>> = self
                .reply
                .split_inclusive(' ')
                .map(|c| Ok(c.to_string()))
                .collect();
            Ok(Box::pin(futures_util::stream::iter(chunks)))
        }
    }

    struct BrokenProvider {
        kind: ProviderKind,
    }

    #[async_trait]
    impl ChatProvider for BrokenProvider {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        async fn stream_chat(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _params: &GenerationParams,
        ) -> Result<TokenStream, ProviderError> {
            Err(ProviderError::Construction(format!(
                "{} key invalid",
                self.kind.as_str()
            )))
        }
    }

    fn test_config() -> Config {
        Config {
            openai_api_key: None,
            google_api_key: None,
            anthropic_api_key: None,
            bind_addr: "127.0.0.1:0".to_string(),
            cache_enabled: true,
            response_cache_ttl: Duration::from_secs(300),
            response_cache_capacity: 100,
            classify_cache_ttl: Duration::from_secs(1800),
            classify_cache_capacity: 200,
            provider_timeout: Duration::from_secs(5),
        }
    }

    fn echo_state() -> AppState {
        let mut providers: HashMap<ProviderKind, Arc<dyn ChatProvider>> = HashMap::new();
        for kind in ProviderKind::ALL {
            providers.insert(
                *kind,
                Arc::new(EchoProvider {
                    kind: *kind,
                    reply: "Olá! Como posso ajudar?",
                }),
            );
        }
        AppState::with_providers(
            &test_config(),
            ProviderRegistry::with_available(ProviderKind::ALL),
            providers,
        )
    }

    fn post_chat(body: serde_json::Value) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn header<'a>(response: &'a Response, name: &str) -> &'a str {
        response
            .headers()
            .get(name)
            .map(|v| v.to_str().unwrap())
            .unwrap_or("")
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let app = router(echo_state());
        let response = app
            .oneshot(post_chat(json!({ "message": "   " })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["error"], "Message is required");
        // Same body shape as every other error path
        assert!(parsed["details"].is_string());
        assert!(parsed["latency"].is_number());
    }

    #[tokio::test]
    async fn test_trivial_message_routed_to_fast_provider() {
        let app = router(echo_state());
        let response = app
            .oneshot(post_chat(json!({ "message": "oi", "module": "auto" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "X-Complexity"), "trivial");
        assert_eq!(header(&response, "X-Module"), "professor");
        assert_eq!(header(&response, "X-Provider"), "google");
        assert_eq!(header(&response, "X-Cached"), "false");
        assert_eq!(header(&response, "X-Provider-Reason"), "auto");
    }

    #[tokio::test]
    async fn test_complex_message_routed_to_capable_provider() {
        let app = router(echo_state());
        let msg =
            "Explique detalhadamente como resolver uma equação de segundo grau usando a fórmula de Bhaskara";
        let response = app
            .oneshot(post_chat(json!({ "message": msg, "module": "auto" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "X-Complexity"), "complex");
        assert_eq!(header(&response, "X-Module"), "aula_interativa");
        assert_eq!(header(&response, "X-Provider"), "openai");
        assert_eq!(header(&response, "X-Model"), "gpt-5-chat-latest");
    }

    #[tokio::test]
    async fn test_second_identical_request_is_cached() {
        let state = echo_state();
        let body = json!({ "message": "qual a capital do Brasil, por favor?", "module": "professor" });

        let first = router(state.clone())
            .oneshot(post_chat(body.clone()))
            .await
            .unwrap();
        assert_eq!(header(&first, "X-Cached"), "false");
        // Drain the stream so the writeback completes
        let _ = first.into_body().collect().await.unwrap();

        let second = router(state).oneshot(post_chat(body)).await.unwrap();
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(header(&second, "X-Cached"), "true");
        assert_eq!(header(&second, "X-Provider-Reason"), "cache");

        let text = second.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(text, "Olá! Como posso ajudar?");
    }

    #[tokio::test]
    async fn test_fallback_surfaces_in_headers() {
        let mut providers: HashMap<ProviderKind, Arc<dyn ChatProvider>> = HashMap::new();
        providers.insert(
            ProviderKind::Google,
            Arc::new(BrokenProvider {
                kind: ProviderKind::Google,
            }),
        );
        providers.insert(
            ProviderKind::OpenAi,
            Arc::new(EchoProvider {
                kind: ProviderKind::OpenAi,
                reply: "resposta de emergência",
            }),
        );
        providers.insert(
            ProviderKind::Anthropic,
            Arc::new(BrokenProvider {
                kind: ProviderKind::Anthropic,
            }),
        );
        let state = AppState::with_providers(
            &test_config(),
            ProviderRegistry::with_available(ProviderKind::ALL),
            providers,
        );

        let response = router(state)
            .oneshot(post_chat(json!({ "message": "oi", "module": "auto" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "X-Provider"), "openai");
        assert!(header(&response, "X-Provider-Reason").contains("fallback from google"));
    }

    #[tokio::test]
    async fn test_all_exhausted_returns_503_with_details() {
        let mut providers: HashMap<ProviderKind, Arc<dyn ChatProvider>> = HashMap::new();
        for kind in ProviderKind::ALL {
            providers.insert(*kind, Arc::new(BrokenProvider { kind: *kind }));
        }
        let state = AppState::with_providers(
            &test_config(),
            ProviderRegistry::with_available(ProviderKind::ALL),
            providers,
        );

        let response = router(state)
            .oneshot(post_chat(json!({ "message": "oi" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["error"], "All AI providers failed");
        let details = parsed["details"].as_str().unwrap();
        for kind in ProviderKind::ALL {
            assert!(details.contains(kind.as_str()));
        }
        assert!(parsed["latency"].is_number());
    }

    #[tokio::test]
    async fn test_no_provider_available_returns_503() {
        let state = AppState::with_providers(
            &test_config(),
            ProviderRegistry::with_available(&[]),
            HashMap::new(),
        );

        let response = router(state)
            .oneshot(post_chat(json!({ "message": "oi" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["error"], "No AI provider available");
    }

    #[tokio::test]
    async fn test_forced_provider_honored() {
        let app = router(echo_state());
        let response = app
            .oneshot(post_chat(json!({
                "message": "oi",
                "forceProvider": "anthropic"
            })))
            .await
            .unwrap();

        assert_eq!(header(&response, "X-Provider"), "anthropic");
        assert_eq!(header(&response, "X-Provider-Reason"), "forced");
    }

    #[tokio::test]
    async fn test_providers_info_endpoint() {
        let app = router(echo_state());
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method("GET")
                    .uri("/api/providers")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["providers"].as_array().unwrap().len(), 3);
        assert_eq!(parsed["auto_selection"]["trivial"][0], "google");
        assert_eq!(parsed["auto_selection"]["complex"][0], "openai");
    }
}
