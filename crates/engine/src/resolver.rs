//! Model resolution: which (provider, model) serves a call.
//!
//! Precedence: explicit request, then the thread's pin, then automatic
//! selection, then the configured fallback. Restrictions always apply; an
//! explicit or pinned model is never silently substituted.

use continuum_core::error::ContextError;
use continuum_core::policy::RestrictionPolicy;
use continuum_core::provider::ModelCatalog;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// How a model was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionSource {
    Explicit,
    Pinned,
    Auto,
    Fallback,
}

impl std::fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Explicit => write!(f, "explicit"),
            Self::Pinned => write!(f, "pinned"),
            Self::Auto => write!(f, "auto"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// The resolved (provider, model) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub provider: String,
    pub model: String,
    pub source: ResolutionSource,
}

/// Stateless resolver; all inputs are passed per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelResolver;

impl ModelResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve the effective model.
    ///
    /// `requested` of `None` means auto; callers normalize `"auto"` and blank
    /// strings away before calling.
    pub fn resolve(
        &self,
        requested: Option<&str>,
        pinned: Option<(&str, &str)>,
        policy: &RestrictionPolicy,
        catalog: &ModelCatalog,
    ) -> Result<Resolution, ContextError> {
        let resolution = match (requested, pinned) {
            (Some(model), _) => self.resolve_explicit(model, policy, catalog)?,
            (None, Some((provider, model))) => {
                self.resolve_pinned(provider, model, policy, catalog)?
            }
            (None, None) => self.resolve_auto(policy, catalog)?,
        };
        info!(
            provider = %resolution.provider,
            model = %resolution.model,
            source = %resolution.source,
            "Model resolved"
        );
        Ok(resolution)
    }

    fn resolve_explicit(
        &self,
        model: &str,
        policy: &RestrictionPolicy,
        catalog: &ModelCatalog,
    ) -> Result<Resolution, ContextError> {
        let model = model.trim().to_lowercase();
        let offering: Vec<&str> = ordered_providers(policy, catalog)
            .into_iter()
            .filter(|p| catalog.get(*p).is_some_and(|models| models.contains(&model)))
            .collect();

        if offering.is_empty() {
            // Global rules apply regardless of provider.
            if let Err(rule) = policy.check("", &model) {
                return Err(ContextError::ModelRestricted {
                    model,
                    provider: None,
                    rule,
                });
            }
            return Err(ContextError::ModelUnavailable { model });
        }

        let mut first_rejection = None;
        for provider in &offering {
            match policy.check(provider, &model) {
                Ok(()) => {
                    return Ok(Resolution {
                        provider: provider.to_string(),
                        model,
                        source: ResolutionSource::Explicit,
                    })
                }
                Err(rule) => {
                    debug!(provider, model = %model, %rule, "Provider rejected by policy");
                    first_rejection.get_or_insert((provider.to_string(), rule));
                }
            }
        }

        let (provider, rule) = first_rejection.ok_or_else(|| ContextError::ModelUnavailable {
            model: model.clone(),
        })?;
        Err(ContextError::ModelRestricted {
            model,
            provider: Some(provider),
            rule,
        })
    }

    fn resolve_pinned(
        &self,
        provider: &str,
        model: &str,
        policy: &RestrictionPolicy,
        catalog: &ModelCatalog,
    ) -> Result<Resolution, ContextError> {
        policy
            .check(provider, model)
            .map_err(|rule| ContextError::ModelRestricted {
                model: model.to_string(),
                provider: Some(provider.to_string()),
                rule,
            })?;

        let offered = catalog
            .get(&provider.to_lowercase())
            .is_some_and(|models| models.contains(&model.to_lowercase()));
        if !offered {
            return Err(ContextError::ModelUnavailable {
                model: model.to_string(),
            });
        }

        Ok(Resolution {
            provider: provider.to_string(),
            model: model.to_string(),
            source: ResolutionSource::Pinned,
        })
    }

    fn resolve_auto(
        &self,
        policy: &RestrictionPolicy,
        catalog: &ModelCatalog,
    ) -> Result<Resolution, ContextError> {
        if let Some((provider, model)) = eligible_models(policy, catalog).into_iter().next() {
            return Ok(Resolution {
                provider,
                model,
                source: ResolutionSource::Auto,
            });
        }

        let fallback = policy.fallback_model();
        if let Some(model) = fallback {
            debug!(model, "Auto selection found nothing, trying fallback");
            if let Ok(mut resolution) = self.resolve_explicit(model, policy, catalog) {
                resolution.source = ResolutionSource::Fallback;
                return Ok(resolution);
            }
        }

        Err(ContextError::NoEligibleModel {
            requested: None,
            fallback: fallback.map(str::to_string),
        })
    }
}

/// Providers in resolution order: configured order first, then the rest by name.
fn ordered_providers<'a>(policy: &'a RestrictionPolicy, catalog: &'a ModelCatalog) -> Vec<&'a str> {
    let mut order: Vec<&str> = policy
        .provider_order()
        .iter()
        .map(String::as_str)
        .filter(|p| catalog.contains_key(*p))
        .collect();
    for provider in catalog.keys() {
        if !order.contains(&provider.as_str()) {
            order.push(provider);
        }
    }
    order
}

/// Every (provider, model) pair the policy permits, in priority order.
pub fn eligible_models(policy: &RestrictionPolicy, catalog: &ModelCatalog) -> Vec<(String, String)> {
    let mut eligible = Vec::new();
    for provider in ordered_providers(policy, catalog) {
        let Some(models) = catalog.get(provider) else {
            continue;
        };
        let priority = policy.priority_for(provider);
        let prioritized = priority.iter().filter(|m| models.contains(*m));
        let rest = models.iter().filter(|m| !priority.contains(m));

        for model in prioritized.chain(rest) {
            if policy.check(provider, model).is_ok() {
                eligible.push((provider.to_string(), model.clone()));
            }
        }
    }
    eligible
}
