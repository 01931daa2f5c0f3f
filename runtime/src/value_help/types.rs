use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Group name shared by every code list of one service.
pub const CODE_LIST_TARGET: &str = "Code list";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceKind {
    ValueList,
    CodeList,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::ValueList => f.write_str("value-list"),
            ReferenceKind::CodeList => f.write_str("code-list"),
        }
    }
}

/// One value help relationship found in the main service's annotations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalServiceReference {
    #[serde(rename = "type")]
    pub kind: ReferenceKind,
    /// Annotated target (`Namespace.Type/Property`) for value lists, the
    /// collection path for code lists.
    pub target: String,
    /// Reference URL exactly as written in the annotation.
    pub value: String,
    /// Resolved path of the referenced service, ending in `/`.
    pub path: String,
}

impl ExternalServiceReference {
    /// Name the reference is grouped under.
    pub fn target_entity(&self) -> &str {
        match self.kind {
            ReferenceKind::CodeList => CODE_LIST_TARGET,
            ReferenceKind::ValueList => {
                let type_path = self
                    .target
                    .split_once('/')
                    .map(|(type_path, _)| type_path)
                    .unwrap_or(&self.target);
                type_path.rsplit('.').next().unwrap_or(type_path)
            }
        }
    }
}

/// Rows of one entity set of a value help service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySetData {
    pub entity_set_name: String,
    pub items: Vec<Value>,
}

/// A fetched value help service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalService {
    #[serde(rename = "type")]
    pub kind: ReferenceKind,
    /// Grouping target, see [`ExternalServiceReference::target_entity`].
    pub target: String,
    pub path: String,
    pub metadata: String,
    #[serde(default)]
    pub entity_data: Vec<EntitySetData>,
}

impl ExternalService {
    pub fn identity(&self) -> (ReferenceKind, &str, &str) {
        (self.kind, self.path.as_str(), self.target.as_str())
    }

    pub fn matches(&self, reference: &ExternalServiceReference) -> bool {
        self.kind == reference.kind
            && self.path == reference.path
            && self.target == reference.target_entity()
    }
}

/// A selectable value help group: one target entity of one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueHelpChoice {
    pub service_path: String,
    pub target: String,
    pub references: Vec<ExternalServiceReference>,
}

impl ValueHelpChoice {
    pub fn name(&self) -> String {
        format!("{} ({})", self.target, self.service_path)
    }
}
