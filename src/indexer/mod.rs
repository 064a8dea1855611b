pub mod store;
pub mod staleness;
pub mod executor;
pub mod indexer;
pub mod batch;
pub mod online;
