//! Persistent storage backends

pub mod citation_db;

pub use citation_db::SqliteCitationStore;
