//! Fallback Controller
//!
//! Wraps provider invocation in a cascading retry protocol. Each distinct
//! provider in the tier's priority list is attempted at most once; a
//! pre-stream failure moves to the next untried provider, and only after
//! every candidate has failed does the aggregated error surface. Once
//! bytes are flowing, mid-stream failures are terminal and never retried.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::error::{GatewayError, ProviderError, ProviderFailure};
use crate::providers::{ChatMessage, ChatProvider, GenerationParams, ProviderKind, TokenStream};
use crate::selector::{ModelSelector, SelectionDecision};

/// A successfully opened provider stream plus its provenance
pub struct ActiveStream {
    pub tokens: TokenStream,
    pub decision: SelectionDecision,
    /// Provider of the first failed attempt, when a fallback hop occurred
    pub fallback_from: Option<ProviderKind>,
    /// Failures accumulated before this stream opened
    pub failures: Vec<ProviderFailure>,
}

pub struct FallbackController {
    selector: ModelSelector,
    providers: HashMap<ProviderKind, Arc<dyn ChatProvider>>,
    attempt_timeout: Duration,
}

impl FallbackController {
    pub fn new(
        selector: ModelSelector,
        providers: HashMap<ProviderKind, Arc<dyn ChatProvider>>,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            selector,
            providers,
            attempt_timeout,
        }
    }

    pub fn selector(&self) -> &ModelSelector {
        &self.selector
    }

    /// Open a token stream, cascading through the tier's priority list on
    /// pre-stream failure. The initial decision comes from the selector;
    /// every hop is a fresh decision excluding already-tried providers.
    pub async fn invoke(
        &self,
        initial: SelectionDecision,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<ActiveStream, GatewayError> {
        let mut current = initial;
        let mut tried: Vec<ProviderKind> = Vec::new();
        let mut failures: Vec<ProviderFailure> = Vec::new();

        loop {
            match self.attempt(&current, messages, params).await {
                Ok(tokens) => {
                    if !failures.is_empty() {
                        info!(
                            "fallback succeeded: provider={} after {} failed attempt(s)",
                            current.provider.as_str(),
                            failures.len()
                        );
                    }
                    return Ok(ActiveStream {
                        tokens,
                        decision: current,
                        fallback_from: tried.first().copied(),
                        failures,
                    });
                }
                Err(e) => {
                    warn!(
                        provider = current.provider.as_str(),
                        tier = current.tier.as_str(),
                        "provider attempt failed: {e}"
                    );
                    let retryable = e.is_retryable();
                    failures.push(ProviderFailure {
                        provider: current.provider,
                        reason: e.to_string(),
                    });
                    tried.push(current.provider);
                    if !retryable {
                        return Err(GatewayError::AllProvidersExhausted(failures));
                    }
                }
            }

            match self.selector.next_after(current.tier, &tried) {
                Some(next) => current = next,
                None => return Err(GatewayError::AllProvidersExhausted(failures)),
            }
        }
    }

    /// One bounded attempt against a single provider.
    async fn attempt(
        &self,
        decision: &SelectionDecision,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<TokenStream, ProviderError> {
        let client = self.providers.get(&decision.provider).ok_or_else(|| {
            ProviderError::Construction(format!(
                "no client registered for {}",
                decision.provider.as_str()
            ))
        })?;

        match timeout(
            self.attempt_timeout,
            client.stream_chat(decision.model, messages, params),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(
                self.attempt_timeout.as_millis() as u64
            )),
        }
    }
}
