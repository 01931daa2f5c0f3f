use std::sync::Arc;

use anyhow::{Context, Result, bail};
use futures::future::join_all;
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::service::ExternalServiceProvider;

use super::{
    cache::RequestCache,
    discovery::{DiscoveryOptions, discover_choices},
    metadata::entity_sets,
    types::{EntitySetData, ExternalService, ExternalServiceReference, ValueHelpChoice},
};

pub const DEFAULT_VALUE_HELP_TOP: usize = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct ValueHelpOptions {
    /// Rows requested per value help entity set.
    #[serde(default = "default_top")]
    pub top: usize,
    #[serde(flatten)]
    pub discovery: DiscoveryOptions,
}

fn default_top() -> usize {
    DEFAULT_VALUE_HELP_TOP
}

impl Default for ValueHelpOptions {
    fn default() -> Self {
        Self {
            top: DEFAULT_VALUE_HELP_TOP,
            discovery: DiscoveryOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Idle,
    Discovering,
    FetchingMetadata,
    FetchingEntityData,
    Done,
}

/// One value help discovery pass over a main service.
///
/// Selected services accumulate across repeated [`select`](Self::select)
/// calls; entity set requests are deduplicated through the shared cache.
pub struct ValueHelpSession {
    provider: Arc<dyn ExternalServiceProvider>,
    cache: RequestCache,
    options: ValueHelpOptions,
    state: PassState,
    choices: Vec<ValueHelpChoice>,
    services: Vec<ExternalService>,
}

impl ValueHelpSession {
    pub fn new(
        provider: Arc<dyn ExternalServiceProvider>,
        cache: RequestCache,
        options: ValueHelpOptions,
    ) -> Self {
        Self {
            provider,
            cache,
            options,
            state: PassState::Idle,
            choices: Vec::new(),
            services: Vec::new(),
        }
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    pub fn choices(&self) -> &[ValueHelpChoice] {
        &self.choices
    }

    pub fn services(&self) -> &[ExternalService] {
        &self.services
    }

    pub fn into_services(self) -> Vec<ExternalService> {
        self.services
    }

    pub fn cache(&self) -> &RequestCache {
        &self.cache
    }

    /// Parse the main service metadata into selectable choices.
    pub fn discover(&mut self, service_path: &str, metadata: &str) -> Result<&[ValueHelpChoice]> {
        self.state = PassState::Discovering;
        self.choices = discover_choices(service_path, metadata, &self.options.discovery)?;
        Ok(&self.choices)
    }

    /// Fetch metadata for the selected choices, merging into earlier results.
    ///
    /// Services already fetched in this pass are not requested again.
    pub async fn select(&mut self, selected: &[ValueHelpChoice]) -> Result<&[ExternalService]> {
        self.state = PassState::FetchingMetadata;

        let missing: Vec<ExternalServiceReference> = selected
            .iter()
            .flat_map(|choice| choice.references.iter())
            .filter(|reference| !self.services.iter().any(|s| s.matches(reference)))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(&self.services);
        }

        let fetched = self
            .provider
            .fetch_external_services(&missing)
            .await
            .context("failed to fetch value help metadata")?;
        for service in fetched {
            if !self
                .services
                .iter()
                .any(|known| known.identity() == service.identity())
            {
                self.services.push(service);
            }
        }

        info!(services = self.services.len(), "value help metadata fetched");
        Ok(&self.services)
    }

    /// Fetch rows for every entity set of every selected service.
    pub async fn fetch_entity_data(&mut self) -> Result<&[ExternalService]> {
        if self.state == PassState::Idle {
            bail!("no value help services selected");
        }
        self.state = PassState::FetchingEntityData;

        fetch_entity_data(
            self.provider.as_ref(),
            &self.cache,
            &mut self.services,
            self.options.top,
        )
        .await;

        self.state = PassState::Done;
        Ok(&self.services)
    }

    pub async fn reset_cache(&self) {
        self.cache.reset().await;
    }

    pub async fn reset_cache_for(&self, service_path: &str) {
        self.cache.reset_scoped(service_path).await;
    }

    /// Start a new pass, keeping the shared cache.
    pub fn restart(&mut self) {
        self.state = PassState::Idle;
        self.choices.clear();
        self.services.clear();
    }
}

/// Fetch the entity sets of all `services` concurrently.
///
/// Entity sets already claimed in `cache` for a service path are skipped.
/// A failed request only loses that entity set; its claim is released.
pub async fn fetch_entity_data(
    provider: &dyn ExternalServiceProvider,
    cache: &RequestCache,
    services: &mut [ExternalService],
    top: usize,
) {
    let results = join_all(
        services
            .iter()
            .map(|service| fetch_service_data(provider, cache, service, top)),
    )
    .await;

    for (service, data) in services.iter_mut().zip(results) {
        service.entity_data.extend(data);
    }
}

async fn fetch_service_data(
    provider: &dyn ExternalServiceProvider,
    cache: &RequestCache,
    service: &ExternalService,
    top: usize,
) -> Vec<EntitySetData> {
    let names = match entity_sets(&service.metadata) {
        Ok(names) => names,
        Err(err) => {
            error!(error = %err, service_path = %service.path, "failed to read value help metadata");
            return Vec::new();
        }
    };

    let claimed = cache.claim_all(&service.path, &names).await;
    let outcomes: Vec<(String, Result<Vec<Value>>)> =
        join_all(claimed.into_iter().map(|entity_set| async move {
            let rows = provider
                .fetch_entity_set(&service.path, &entity_set, top)
                .await
                .and_then(|response| response.rows());
            (entity_set, rows)
        }))
        .await;

    let mut data = Vec::new();
    for (entity_set_name, outcome) in outcomes {
        match outcome {
            Ok(items) => {
                info!(
                    service_path = %service.path,
                    entity_set = %entity_set_name,
                    rows = items.len(),
                    "fetched value help data"
                );
                data.push(EntitySetData {
                    entity_set_name,
                    items,
                });
            }
            Err(err) => {
                warn!(
                    error = %err,
                    service_path = %service.path,
                    entity_set = %entity_set_name,
                    "failed to fetch value help data"
                );
                cache.release(&service.path, &entity_set_name).await;
            }
        }
    }
    data
}
