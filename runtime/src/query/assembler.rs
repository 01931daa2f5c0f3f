use std::fmt;

use crate::model::{EntitySetsFlat, ListEntity, SelectedEntityAnswer};

use super::{
    expand::{ExpandSpec, add_manual_selections, build_expand},
    filter::{combine, semantic_key_filters},
};

pub const DEFAULT_TOP: usize = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub expand: ExpandSpec,
    pub filter: Option<String>,
    pub count: bool,
    pub top: Option<usize>,
}

impl QueryOptions {
    /// Option name and raw value pairs, in request order.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if !self.expand.is_empty() {
            params.push(("$expand", self.expand.to_clause()));
        }
        if let Some(filter) = &self.filter {
            params.push(("$filter", filter.clone()));
        }
        if self.count {
            params.push(("$count", "true".to_string()));
        }
        if let Some(top) = self.top {
            params.push(("$top", top.to_string()));
        }
        params
    }
}

fn join_params(params: &[(&'static str, String)]) -> String {
    params
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// An entity set request with its query options kept as separate values,
/// so the transport encodes each one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ODataQuery {
    pub entity_set: String,
    pub params: Vec<(&'static str, String)>,
}

impl ODataQuery {
    pub fn new(entity_set: impl Into<String>, params: Vec<(&'static str, String)>) -> Self {
        Self {
            entity_set: entity_set.into(),
            params,
        }
    }
}

impl fmt::Display for ODataQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.entity_set)?;
        if !self.params.is_empty() {
            write!(f, "?{}", join_params(&self.params))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledQuery {
    /// Readable form of `request`, e.g. `Travel?$top=1`.
    pub query: String,
    pub request: ODataQuery,
    pub entity_sets_flat: EntitySetsFlat,
}

/// Build the single query fetching the list entity and its expanded tree.
///
/// Semantic key filters take precedence: `top` only applies when no key
/// produced a filter.
pub fn assemble_query(
    list_entity: &ListEntity,
    selections: &[SelectedEntityAnswer],
    top: usize,
) -> AssembledQuery {
    let built = build_expand(list_entity.nav_prop_entities());
    let mut expand = built.expand;
    add_manual_selections(&mut expand, selections);

    let filters = semantic_key_filters(&list_entity.semantic_keys);
    let options = match combine(&filters) {
        Some(filter) => QueryOptions {
            expand,
            filter: Some(filter),
            count: true,
            top: None,
        },
        None => QueryOptions {
            expand,
            filter: None,
            count: false,
            top: Some(top),
        },
    };

    let request = ODataQuery::new(list_entity.entity_set_name(), options.to_params());
    AssembledQuery {
        query: request.to_string(),
        request,
        entity_sets_flat: built.entity_sets_flat,
    }
}
