use serde_json::Value;
use tracing::{error, info};

use crate::{
    model::{EntitySetsFlat, ListEntity, SelectedEntityAnswer},
    service::QueryExecutor,
};

use super::assembler::assemble_query;

/// Outcome of the main query: rows on success, a user facing message otherwise.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutcome {
    pub entity_data: Option<Value>,
    pub error: Option<String>,
}

impl QueryOutcome {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub result: QueryOutcome,
    pub entity_sets_flat: EntitySetsFlat,
}

/// Assemble and run the list entity query.
///
/// Transport and payload errors are logged and returned in the outcome,
/// never propagated.
pub async fn fetch_data(
    list_entity: &ListEntity,
    executor: &dyn QueryExecutor,
    selections: &[SelectedEntityAnswer],
    top: usize,
) -> FetchResult {
    let assembled = assemble_query(list_entity, selections, top);
    info!(query = %assembled.query, "fetching entity data");

    let result = match executor
        .get(&assembled.request)
        .await
        .and_then(|response| response.odata())
    {
        Ok(entity_data) => QueryOutcome {
            entity_data: Some(entity_data),
            error: None,
        },
        Err(err) => {
            let message = format!(
                "Error fetching data for entity set {}: {err:#}",
                list_entity.entity_set_name()
            );
            error!(error = %err, query = %assembled.query, "{message}");
            QueryOutcome {
                entity_data: None,
                error: Some(message),
            }
        }
    };

    FetchResult {
        result,
        entity_sets_flat: assembled.entity_sets_flat,
    }
}
