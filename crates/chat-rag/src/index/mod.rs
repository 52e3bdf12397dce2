//! Vector indexes: search, persistence and per-session binding

pub mod registry;
pub mod store;
pub mod vector_index;

pub use registry::{IndexRegistry, IndexSummary};
pub use store::{validate_index_name, IndexStore};
pub use vector_index::{IndexProvenance, VectorIndex};
