//! EDMX `$metadata` inspection: entity sets and value help annotations.

use anyhow::{Context, Result, anyhow};
use reqwest::Url;
use roxmltree::{Document, Node};
use tracing::{debug, warn};

use super::types::{ExternalServiceReference, ReferenceKind};

const VALUE_LIST_REFERENCES: &str = "ValueListReferences";
const CODE_LIST_VOCABULARY: &str = "CodeList";
const METADATA_SEGMENT: &str = "$metadata";

fn parse(metadata: &str) -> Result<Document<'_>> {
    Document::parse(metadata).map_err(|e| anyhow!("Failed to parse metadata XML: {e}"))
}

/// Names of all entity sets, in document order.
pub fn entity_sets(metadata: &str) -> Result<Vec<String>> {
    let doc = parse(metadata)?;
    Ok(doc
        .descendants()
        .filter(|node| node.has_tag_name("EntitySet"))
        .filter_map(|node| node.attribute("Name").map(str::to_string))
        .collect())
}

/// Resolve a reference URL against the service path and drop `$metadata`.
pub fn resolve_service_path(service_path: &str, reference_url: &str) -> Result<String> {
    let root = if service_path.ends_with('/') {
        service_path.to_string()
    } else {
        format!("{service_path}/")
    };
    let base = Url::parse("http://localhost")
        .and_then(|origin| origin.join(&root))
        .with_context(|| format!("invalid service path {service_path}"))?;
    let resolved = base
        .join(reference_url)
        .with_context(|| format!("invalid reference url {reference_url}"))?;

    let path = resolved.path();
    let path = path.strip_suffix(METADATA_SEGMENT).unwrap_or(path);
    if path.ends_with('/') {
        Ok(path.to_string())
    } else {
        Ok(format!("{path}/"))
    }
}

fn reference_kind(annotation: &Node<'_, '_>) -> Option<ReferenceKind> {
    let term = annotation.attribute("Term")?;
    let (vocabulary, name) = term.rsplit_once('.')?;
    if name == VALUE_LIST_REFERENCES {
        Some(ReferenceKind::ValueList)
    } else if vocabulary.contains(CODE_LIST_VOCABULARY) {
        Some(ReferenceKind::CodeList)
    } else {
        None
    }
}

fn property_value<'a>(record: &Node<'a, '_>, property: &str) -> Option<&'a str> {
    record
        .children()
        .filter(|child| child.has_tag_name("PropertyValue"))
        .find(|child| child.attribute("Property") == Some(property))
        .and_then(|child| {
            child
                .attribute("String")
                .or_else(|| child.children().find(|c| c.has_tag_name("String"))?.text())
        })
}

/// Every value-list and code-list reference annotated in `metadata`.
///
/// References whose URL cannot be resolved are skipped with a warning.
pub fn value_help_references(
    service_path: &str,
    metadata: &str,
) -> Result<Vec<ExternalServiceReference>> {
    let doc = parse(metadata)?;
    let mut references = Vec::new();

    for annotations in doc
        .descendants()
        .filter(|node| node.has_tag_name("Annotations"))
    {
        let Some(target) = annotations.attribute("Target") else {
            continue;
        };

        for annotation in annotations
            .children()
            .filter(|node| node.has_tag_name("Annotation"))
        {
            let Some(kind) = reference_kind(&annotation) else {
                continue;
            };

            let candidates: Vec<(String, String)> = match kind {
                ReferenceKind::ValueList => annotation
                    .descendants()
                    .filter(|node| node.has_tag_name("String"))
                    .filter_map(|node| node.text())
                    .map(|url| (target.to_string(), url.trim().to_string()))
                    .collect(),
                ReferenceKind::CodeList => annotation
                    .descendants()
                    .filter(|node| node.has_tag_name("Record"))
                    .filter_map(|record| {
                        let url = property_value(&record, "Url")?;
                        let collection = property_value(&record, "CollectionPath")?;
                        Some((collection.to_string(), url.trim().to_string()))
                    })
                    .collect(),
            };

            for (target, value) in candidates {
                match resolve_service_path(service_path, &value) {
                    Ok(path) => references.push(ExternalServiceReference {
                        kind,
                        target,
                        value,
                        path,
                    }),
                    Err(err) => warn!(error = %err, reference = %value, "skipping value help reference"),
                }
            }
        }
    }

    debug!(
        service_path,
        references = references.len(),
        "parsed value help references"
    );
    Ok(references)
}
