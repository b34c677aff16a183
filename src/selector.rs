//! Model Selector
//!
//! Deterministically picks a (provider, model) pair from the registry
//! given a classification and an optional caller override. The selector
//! produces the *initial* decision only; fallback hops are new decisions
//! made by the fallback controller through the same priority table.

use serde::Serialize;
use tracing::debug;

use crate::classifier::{ClassificationResult, ComplexityTier};
use crate::error::GatewayError;
use crate::providers::{ProviderKind, ProviderRegistry};

/// Why a provider was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionReason {
    /// Caller supplied an explicit provider override
    Forced,
    /// Tier-driven priority table
    Auto,
}

impl SelectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionReason::Forced => "forced",
            SelectionReason::Auto => "auto",
        }
    }
}

/// One provider/model choice. Immutable; a fallback produces a new
/// decision rather than mutating this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionDecision {
    pub provider: ProviderKind,
    pub model: &'static str,
    pub tier: ComplexityTier,
    pub reason: SelectionReason,
}

#[derive(Clone)]
pub struct ModelSelector {
    registry: ProviderRegistry,
}

impl ModelSelector {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Pick the initial (provider, model) for a request.
    ///
    /// A forced provider is honored unconditionally for provider choice;
    /// the tier still drives which of its models is used. Auto selection
    /// walks the tier's priority list and takes the first available
    /// provider, erroring if none is configured.
    pub fn select(
        &self,
        classification: &ClassificationResult,
        force: Option<ProviderKind>,
    ) -> Result<SelectionDecision, GatewayError> {
        let tier = classification.tier;

        if let Some(provider) = force {
            let decision = SelectionDecision {
                provider,
                model: self.registry.model_for(tier, provider),
                tier,
                reason: SelectionReason::Forced,
            };
            debug!(
                "selection: forced provider={} model={}",
                provider.as_str(),
                decision.model
            );
            return Ok(decision);
        }

        let priority = self.registry.priority_for(tier);
        for provider in priority {
            if self.registry.is_available(*provider) {
                let decision = SelectionDecision {
                    provider: *provider,
                    model: self.registry.model_for(tier, *provider),
                    tier,
                    reason: SelectionReason::Auto,
                };
                debug!(
                    "selection: auto tier={} provider={} model={}",
                    tier.as_str(),
                    provider.as_str(),
                    decision.model
                );
                return Ok(decision);
            }
        }

        Err(GatewayError::NoProviderAvailable {
            tier: tier.as_str().to_string(),
            tried: priority
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    /// Next-priority decision for a fallback hop, excluding providers
    /// already attempted. Returns None once the tier's list is exhausted.
    pub fn next_after(
        &self,
        tier: ComplexityTier,
        tried: &[ProviderKind],
    ) -> Option<SelectionDecision> {
        self.registry
            .priority_for(tier)
            .iter()
            .find(|p| !tried.contains(*p) && self.registry.is_available(**p))
            .map(|provider| SelectionDecision {
                provider: *provider,
                model: self.registry.model_for(tier, *provider),
                tier,
                reason: SelectionReason::Auto,
            })
    }
}
