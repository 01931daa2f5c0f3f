pub mod cache;
pub mod discovery;
pub mod metadata;
pub mod pipeline;
pub mod types;

pub use cache::RequestCache;
pub use discovery::{DiscoveryOptions, discover_choices, group_references};
pub use pipeline::{PassState, ValueHelpOptions, ValueHelpSession, fetch_entity_data};
pub use types::{
    CODE_LIST_TARGET, EntitySetData, ExternalService, ExternalServiceReference, ReferenceKind,
    ValueHelpChoice,
};
