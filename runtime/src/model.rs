use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A JSON object as returned by the service, keys passed through unmodified.
pub type RawRecord = Map<String, Value>;

/// Entity path -> entity set name for every node of one query's expand tree.
pub type EntitySetsFlat = BTreeMap<String, String>;

/// A node of the entity tree handed over by the metadata layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_set_name: String,
    pub entity_path: String,
    /// Opaque reference to the entity type, never interpreted here.
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub nav_prop_entities: Vec<Entity>,
}

impl Entity {
    pub fn new(entity_path: impl Into<String>, entity_set_name: impl Into<String>) -> Self {
        Self {
            entity_set_name: entity_set_name.into(),
            entity_path: entity_path.into(),
            entity_type: None,
            nav_prop_entities: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Entity>) -> Self {
        self.nav_prop_entities = children;
        self
    }
}

/// The root of a query: the entity shown in the list report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntity {
    #[serde(flatten)]
    pub entity: Entity,
    #[serde(default)]
    pub semantic_keys: Vec<SemanticKeyFilter>,
}

impl ListEntity {
    pub fn new(entity: Entity) -> Self {
        Self {
            entity,
            semantic_keys: Vec::new(),
        }
    }

    pub fn with_semantic_keys(mut self, keys: Vec<SemanticKeyFilter>) -> Self {
        self.semantic_keys = keys;
        self
    }

    pub fn entity_set_name(&self) -> &str {
        &self.entity.entity_set_name
    }

    pub fn nav_prop_entities(&self) -> &[Entity] {
        &self.entity.nav_prop_entities
    }
}

/// A semantic key and the raw filter text entered for it.
///
/// `value` may hold several comma separated branches, each either a single
/// value or an inclusive `lo-hi` range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticKeyFilter {
    pub name: String,
    #[serde(rename = "type")]
    pub edm_type: String,
    #[serde(default)]
    pub value: Option<String>,
}

impl SemanticKeyFilter {
    pub fn new(name: impl Into<String>, edm_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            edm_type: edm_type.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// An extra entity picked by hand, addressed by its slash delimited path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedEntityAnswer {
    pub full_path: String,
    pub entity: SelectedEntity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedEntity {
    pub entity_path: String,
    pub entity_set_name: String,
    #[serde(default)]
    pub selected: Option<bool>,
}

impl SelectedEntityAnswer {
    pub fn new(
        full_path: impl Into<String>,
        entity_path: impl Into<String>,
        entity_set_name: impl Into<String>,
    ) -> Self {
        Self {
            full_path: full_path.into(),
            entity: SelectedEntity {
                entity_path: entity_path.into(),
                entity_set_name: entity_set_name.into(),
                selected: Some(true),
            },
        }
    }

    /// Segments of `full_path` leading to the selection's parent.
    pub fn parent_segments(&self) -> Vec<&str> {
        match self.full_path.rsplit_once('/') {
            Some((parent, _)) => parent.split('/').filter(|s| !s.is_empty()).collect(),
            None => Vec::new(),
        }
    }

    pub fn parent_path(&self) -> Option<&str> {
        self.full_path.rsplit_once('/').map(|(parent, _)| parent)
    }
}

/// Entity set name -> flat records, one mock data file per entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityFileData(BTreeMap<String, Vec<RawRecord>>);

impl EntityFileData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure an output array exists for `entity_set` and return it.
    pub fn ensure(&mut self, entity_set: &str) -> &mut Vec<RawRecord> {
        self.0.entry(entity_set.to_string()).or_default()
    }

    pub fn get(&self, entity_set: &str) -> Option<&[RawRecord]> {
        self.0.get(entity_set).map(Vec::as_slice)
    }

    pub fn entity_sets(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<RawRecord>)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }
}
