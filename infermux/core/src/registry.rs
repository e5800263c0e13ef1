//! Provider Registry
//!
//! Maps model identifiers to the single provider that owns them.
//!
//! The registry is built once at startup with [`Registry::register`] and then
//! shared behind an `Arc`. Every read afterwards goes through `&self`, so
//! concurrent resolution needs no locking.
//!
//! # Selection policy for `"auto"`
//!
//! The first registered provider wins, serving its first declared model.
//! Given a fixed registration order the choice never changes.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::provider::{Provider, ProviderSummary};

/// Reserved model identifier meaning "let the router choose"
pub const AUTO_MODEL: &str = "auto";

/// Registration and lookup errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A model identifier is already owned by another provider
    #[error("model {model:?} already registered by provider {existing:?} (rejected {provider:?})")]
    Conflict {
        /// Contested model identifier
        model: String,
        /// Provider that already owns it
        existing: String,
        /// Provider whose registration was rejected
        provider: String,
    },

    /// A provider with the same name is already registered
    #[error("provider {0:?} is already registered")]
    DuplicateName(String),

    /// The provider's declaration is unusable
    #[error("invalid provider {provider:?}: {reason}")]
    InvalidProvider {
        /// Provider name as declared (may be empty)
        provider: String,
        /// What is wrong with it
        reason: String,
    },

    /// No provider declares the requested model
    #[error("model {0:?} not found")]
    ModelNotFound(String),
}

/// Outcome of a successful lookup
#[derive(Clone)]
pub struct Resolution {
    /// Provider that will serve the call
    pub provider: Arc<dyn Provider>,
    /// Concrete model the provider will run
    pub model: String,
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolution")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .finish()
    }
}

/// Set of registered providers
#[derive(Default)]
pub struct Registry {
    /// Providers in registration order
    providers: Vec<Arc<dyn Provider>>,
    /// Model identifier -> index into `providers`
    by_model: HashMap<String, usize>,
    /// Provider name -> index into `providers`
    by_name: HashMap<String, usize>,
}

impl Registry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider
    ///
    /// Either every declared model is claimed or nothing changes.
    pub fn register(&mut self, provider: Arc<dyn Provider>) -> Result<(), RegistryError> {
        self.validate(provider.as_ref())?;

        let index = self.providers.len();
        let name = provider.name().to_string();
        for model in provider.supported_models() {
            self.by_model.insert(model.clone(), index);
        }
        self.by_name.insert(name.clone(), index);

        info!(
            provider = %name,
            models = ?provider.supported_models(),
            "Registered provider"
        );
        self.providers.push(provider);
        Ok(())
    }

    fn validate(&self, provider: &dyn Provider) -> Result<(), RegistryError> {
        let name = provider.name();
        let invalid = |reason: &str| RegistryError::InvalidProvider {
            provider: name.to_string(),
            reason: reason.to_string(),
        };

        if name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        let models = provider.supported_models();
        if models.is_empty() {
            return Err(invalid("declares no models"));
        }
        if self.by_name.contains_key(name) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }

        for (i, model) in models.iter().enumerate() {
            if model.trim().is_empty() {
                return Err(invalid("declares an empty model identifier"));
            }
            if model == AUTO_MODEL {
                return Err(invalid("\"auto\" is reserved"));
            }
            if models[..i].contains(model) {
                return Err(invalid(&format!("declares model {model:?} twice")));
            }
            if let Some(&owner) = self.by_model.get(model) {
                return Err(RegistryError::Conflict {
                    model: model.clone(),
                    existing: self.providers[owner].name().to_string(),
                    provider: name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Resolve a requested model (concrete or `"auto"`) to its provider
    pub fn resolve(&self, model: &str) -> Result<Resolution, RegistryError> {
        if model == AUTO_MODEL {
            // Registration guarantees every provider declares at least one model
            return self
                .providers
                .iter()
                .find_map(|provider| {
                    provider.supported_models().first().map(|first| Resolution {
                        provider: Arc::clone(provider),
                        model: first.clone(),
                    })
                })
                .ok_or_else(|| RegistryError::ModelNotFound(model.to_string()));
        }

        self.by_model
            .get(model)
            .map(|&index| Resolution {
                provider: Arc::clone(&self.providers[index]),
                model: model.to_string(),
            })
            .ok_or_else(|| RegistryError::ModelNotFound(model.to_string()))
    }

    /// Look up a provider by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.by_name
            .get(name)
            .map(|&index| Arc::clone(&self.providers[index]))
    }

    /// Summaries of every provider, in registration order
    #[must_use]
    pub fn list(&self) -> Vec<ProviderSummary> {
        self.providers
            .iter()
            .map(|provider| ProviderSummary::of(provider.as_ref()))
            .collect()
    }

    /// Number of registered providers
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.list()).finish()
    }
}
