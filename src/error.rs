//! Gateway error taxonomy
//!
//! Typed errors for the request pipeline. Provider-level failures are
//! recovered by the fallback controller; only the aggregate (all providers
//! exhausted) reaches the caller. Error bodies never carry secrets or
//! backtraces.

use crate::providers::ProviderKind;
use thiserror::Error;

/// One provider's failure during a fallback sequence
#[derive(Debug, Clone)]
pub struct ProviderFailure {
    pub provider: ProviderKind,
    pub reason: String,
}

impl std::fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.provider.as_str(), self.reason)
    }
}

/// Errors from a single provider attempt
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Credentials missing or client could not be built
    #[error("provider construction failed: {0}")]
    Construction(String),

    /// Network/API error before any bytes were streamed
    #[error("provider call failed: {0}")]
    Call(String),

    /// Attempt exceeded the configured timeout before streaming began
    #[error("provider timed out after {0}ms")]
    Timeout(u64),

    /// Failure after streaming started; never retried
    #[error("stream failed mid-flight: {0}")]
    MidStream(String),
}

impl ProviderError {
    /// Pre-stream failures are eligible for a fallback hop.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProviderError::MidStream(_))
    }
}

/// Request-level errors surfaced to the HTTP caller
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Message is required")]
    InvalidInput,

    #[error("no provider available for tier {tier}; tried: {tried}")]
    NoProviderAvailable { tier: String, tried: String },

    #[error("all providers exhausted: {}", format_failures(.0))]
    AllProvidersExhausted(Vec<ProviderFailure>),

    #[error("internal error: {0}")]
    Internal(String),
}

fn format_failures(failures: &[ProviderFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl GatewayError {
    /// HTTP status this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::InvalidInput => 400,
            GatewayError::NoProviderAvailable { .. } => 503,
            GatewayError::AllProvidersExhausted(_) => 503,
            GatewayError::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_error_names_every_provider() {
        let err = GatewayError::AllProvidersExhausted(vec![
            ProviderFailure {
                provider: ProviderKind::Google,
                reason: "timeout".to_string(),
            },
            ProviderFailure {
                provider: ProviderKind::OpenAi,
                reason: "401 unauthorized".to_string(),
            },
        ]);

        let msg = err.to_string();
        assert!(msg.contains("google"));
        assert!(msg.contains("openai"));
        assert!(msg.contains("timeout"));
        assert_eq!(err.status_code(), 503);
    }

    #[test]
    fn test_retryability() {
        assert!(ProviderError::Construction("no key".into()).is_retryable());
        assert!(ProviderError::Call("503".into()).is_retryable());
        assert!(ProviderError::Timeout(30000).is_retryable());
        assert!(!ProviderError::MidStream("reset".into()).is_retryable());
    }
}
