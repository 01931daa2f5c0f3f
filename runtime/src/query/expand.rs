//! Nested `$expand` tree built from the entity tree.
//!
//! `a -> a.1`, `b` becomes `{ a: { expand: { a.1: {} } }, b: {} }` and is
//! serialized as `a($expand=a.1),b`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{Entity, EntitySetsFlat, SelectedEntityAnswer};

/// Entity path -> nested expand node, ordered so the emitted query is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpandSpec(BTreeMap<String, ExpandNode>);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expand: Option<ExpandSpec>,
}

impl ExpandNode {
    pub fn leaf() -> Self {
        Self { expand: None }
    }

    pub fn with_children(children: ExpandSpec) -> Self {
        Self {
            expand: Some(children),
        }
    }

    pub fn children(&self) -> Option<&ExpandSpec> {
        self.expand.as_ref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpandResult {
    pub expand: ExpandSpec,
    pub entity_sets_flat: EntitySetsFlat,
}

impl ExpandSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity_path: impl Into<String>, node: ExpandNode) {
        self.0.insert(entity_path.into(), node);
    }

    pub fn get(&self, entity_path: &str) -> Option<&ExpandNode> {
        self.0.get(entity_path)
    }

    pub fn contains(&self, entity_path: &str) -> bool {
        self.0.contains_key(entity_path)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Number of nested levels, 0 for an empty spec.
    pub fn depth(&self) -> usize {
        self.0
            .values()
            .map(|node| 1 + node.children().map(ExpandSpec::depth).unwrap_or(0))
            .max()
            .unwrap_or(0)
    }

    /// Every entity path in the tree, at any level.
    pub fn all_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        for (path, node) in &self.0 {
            paths.push(path.clone());
            if let Some(children) = node.children() {
                paths.extend(children.all_paths());
            }
        }
        paths
    }

    /// Render the value of the `$expand` query option.
    pub fn to_clause(&self) -> String {
        self.0
            .iter()
            .map(|(path, node)| match node.children() {
                Some(children) if !children.is_empty() => {
                    format!("{path}($expand={})", children.to_clause())
                }
                _ => path.clone(),
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    fn descend_mut(&mut self, segments: &[&str]) -> Option<&mut ExpandNode> {
        let (first, rest) = segments.split_first()?;
        let node = self.0.get_mut(*first)?;
        if rest.is_empty() {
            return Some(node);
        }
        node.expand.as_mut()?.descend_mut(rest)
    }
}

/// Build the expand spec and flat path index for `entities`, children first.
pub fn build_expand(entities: &[Entity]) -> ExpandResult {
    let mut expand = ExpandSpec::new();
    let mut entity_sets_flat = EntitySetsFlat::new();

    for entity in entities {
        let node = if entity.nav_prop_entities.is_empty() {
            ExpandNode::leaf()
        } else {
            let nested = build_expand(&entity.nav_prop_entities);
            entity_sets_flat.extend(nested.entity_sets_flat);
            ExpandNode::with_children(nested.expand)
        };
        expand.insert(entity.entity_path.clone(), node);
        entity_sets_flat.insert(entity.entity_path.clone(), entity.entity_set_name.clone());
    }

    ExpandResult {
        expand,
        entity_sets_flat,
    }
}

/// Add hand picked entities below their parent path.
///
/// Selections whose parent is not part of `expand` are dropped.
pub fn add_manual_selections(expand: &mut ExpandSpec, selections: &[SelectedEntityAnswer]) {
    for selection in selections {
        let segments = selection.parent_segments();
        let Some(parent) = expand.descend_mut(&segments) else {
            debug!(
                full_path = %selection.full_path,
                "parent of selected entity is not expanded, skipping"
            );
            continue;
        };
        parent
            .expand
            .get_or_insert_with(ExpandSpec::new)
            .0
            .entry(selection.entity.entity_path.clone())
            .or_default();
    }
}
