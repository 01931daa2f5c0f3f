use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use super::{
    metadata::value_help_references,
    types::{ExternalServiceReference, ValueHelpChoice},
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscoveryOptions {
    /// Target entity names (or full annotation targets) never offered.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl DiscoveryOptions {
    fn excludes(&self, reference: &ExternalServiceReference) -> bool {
        self.excluded_targets
            .iter()
            .any(|name| name == reference.target_entity() || *name == reference.target)
    }
}

/// Group references by service path, then by target entity.
pub fn group_references(
    references: Vec<ExternalServiceReference>,
    options: &DiscoveryOptions,
) -> Vec<ValueHelpChoice> {
    let mut grouped: BTreeMap<String, BTreeMap<String, Vec<ExternalServiceReference>>> =
        BTreeMap::new();

    for reference in references {
        if options.excludes(&reference) {
            continue;
        }
        let group = grouped
            .entry(reference.path.clone())
            .or_default()
            .entry(reference.target_entity().to_string())
            .or_default();
        if !group.contains(&reference) {
            group.push(reference);
        }
    }

    grouped
        .into_iter()
        .flat_map(|(service_path, targets)| {
            targets
                .into_iter()
                .map(move |(target, references)| ValueHelpChoice {
                    service_path: service_path.clone(),
                    target,
                    references,
                })
        })
        .collect()
}

/// Parse the main service metadata into selectable value help choices.
pub fn discover_choices(
    service_path: &str,
    metadata: &str,
    options: &DiscoveryOptions,
) -> Result<Vec<ValueHelpChoice>> {
    let references = value_help_references(service_path, metadata)
        .with_context(|| format!("failed to read value help references of {service_path}"))?;
    let choices = group_references(references, options);
    info!(
        service_path,
        choices = choices.len(),
        "discovered value help choices"
    );
    Ok(choices)
}
