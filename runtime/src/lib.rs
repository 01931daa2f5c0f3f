//! Mock data generation for OData services.
//!
//! A list entity and its navigation tree are fetched with one `$expand`
//! query, the nested result is decomposed into flat records per entity set,
//! and value help services referenced from the main service are discovered
//! and fetched alongside.

pub mod config;
pub mod decompose;
pub mod model;
pub mod query;
pub mod service;
pub mod storage;
pub mod value_help;

pub use decompose::decompose;
pub use model::{
    Entity, EntityFileData, EntitySetsFlat, ListEntity, RawRecord, SelectedEntity,
    SelectedEntityAnswer, SemanticKeyFilter,
};
pub use query::{FetchResult, QueryOutcome, assemble_query, build_expand, fetch_data};
