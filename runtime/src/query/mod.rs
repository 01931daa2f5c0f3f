pub mod assembler;
pub mod executor;
pub mod expand;
pub mod filter;

pub use assembler::{AssembledQuery, DEFAULT_TOP, ODataQuery, QueryOptions, assemble_query};
pub use executor::{FetchResult, QueryOutcome, fetch_data};
pub use expand::{ExpandNode, ExpandResult, ExpandSpec, add_manual_selections, build_expand};
