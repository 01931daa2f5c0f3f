//! Split one nested query result into flat per entity set records.
//!
//! Every nested navigation value is lifted into its own entity set and left
//! out of the parent record, so each row ends up in exactly one output array.
//! The raw result is only read; output records are fresh copies.

use serde_json::Value;

use crate::model::{
    Entity, EntityFileData, EntitySetsFlat, ListEntity, RawRecord, SelectedEntityAnswer,
};

const V2_RESULTS: &str = "results";
const V2_DEFERRED: &str = "__deferred";

#[derive(Debug)]
struct NavNode<'a> {
    path: &'a str,
    entity_set: &'a str,
    children: Vec<NavNode<'a>>,
}

impl<'a> NavNode<'a> {
    fn from_entity(entity: &'a Entity, entity_sets_flat: &'a EntitySetsFlat) -> Self {
        let entity_set = entity_sets_flat
            .get(&entity.entity_path)
            .map(String::as_str)
            .unwrap_or(&entity.entity_set_name);
        Self {
            path: &entity.entity_path,
            entity_set,
            children: entity
                .nav_prop_entities
                .iter()
                .map(|child| NavNode::from_entity(child, entity_sets_flat))
                .collect(),
        }
    }

    fn find_mut<'n>(
        nodes: &'n mut [NavNode<'a>],
        segments: &[&str],
    ) -> Option<&'n mut NavNode<'a>> {
        let (first, rest) = segments.split_first()?;
        let node = nodes.iter_mut().find(|node| node.path == *first)?;
        if rest.is_empty() {
            Some(node)
        } else {
            Self::find_mut(&mut node.children, rest)
        }
    }
}

fn navigation_tree<'a>(
    list_entity: &'a ListEntity,
    entity_sets_flat: &'a EntitySetsFlat,
    additional: &'a [SelectedEntityAnswer],
) -> Vec<NavNode<'a>> {
    let mut nodes: Vec<NavNode<'a>> = list_entity
        .nav_prop_entities()
        .iter()
        .map(|entity| NavNode::from_entity(entity, entity_sets_flat))
        .collect();

    for selection in additional {
        let segments = selection.parent_segments();
        let Some(parent) = NavNode::find_mut(&mut nodes, &segments) else {
            continue;
        };
        let path = selection.entity.entity_path.as_str();
        if parent.children.iter().all(|child| child.path != path) {
            parent.children.push(NavNode {
                path,
                entity_set: &selection.entity.entity_set_name,
                children: Vec::new(),
            });
        }
    }
    nodes
}

/// Look up a navigation value; absent keys are normal for sparse payloads.
fn navigation<'v>(row: &'v RawRecord, path: &str) -> Option<&'v Value> {
    row.get(path)
}

/// Rows held by a navigation value: an object is one row, arrays keep their
/// object elements, anything else holds none.
///
/// V2 payloads wrap to-many navigations in `{"results": [..]}` and leave
/// unexpanded ones as `{"__deferred": {..}}`.
fn nested_rows(value: &Value) -> Vec<&RawRecord> {
    match value {
        Value::Object(row) if is_deferred(row) => Vec::new(),
        Value::Object(row) => match v2_results(row) {
            Some(items) => object_rows(items),
            None => vec![row],
        },
        Value::Array(items) => object_rows(items),
        _ => Vec::new(),
    }
}

fn object_rows(items: &[Value]) -> Vec<&RawRecord> {
    items.iter().filter_map(Value::as_object).collect()
}

/// `results` array of a V2 collection wrapper; its other keys are `__` annotations.
fn v2_results(row: &RawRecord) -> Option<&[Value]> {
    let items = row.get(V2_RESULTS)?.as_array()?;
    row.keys()
        .all(|key| key == V2_RESULTS || key.starts_with("__"))
        .then_some(items.as_slice())
}

fn is_deferred(row: &RawRecord) -> bool {
    row.len() == 1 && row.contains_key(V2_DEFERRED)
}

fn root_rows(raw_result: &Value) -> Vec<&RawRecord> {
    match raw_result {
        Value::Null => Vec::new(),
        other => nested_rows(other),
    }
}

fn lift(row: &RawRecord, children: &[NavNode<'_>], data: &mut EntityFileData) -> RawRecord {
    for child in children {
        let Some(value) = navigation(row, child.path) else {
            continue;
        };
        let lifted: Vec<RawRecord> = nested_rows(value)
            .into_iter()
            .map(|nested| lift(nested, &child.children, data))
            .collect();
        data.ensure(child.entity_set).extend(lifted);
    }

    row.iter()
        .filter(|(key, _)| children.iter().all(|child| child.path != key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Decompose `raw_result` into one record list per entity set.
///
/// `additional` are hand picked entities expanded below a page entity.
pub fn decompose(
    list_entity: &ListEntity,
    raw_result: &Value,
    entity_sets_flat: &EntitySetsFlat,
    additional: &[SelectedEntityAnswer],
) -> EntityFileData {
    let tree = navigation_tree(list_entity, entity_sets_flat, additional);
    let mut data = EntityFileData::new();

    for row in root_rows(raw_result) {
        let cleaned = lift(row, &tree, &mut data);
        data.ensure(list_entity.entity_set_name()).push(cleaned);
    }
    data
}
