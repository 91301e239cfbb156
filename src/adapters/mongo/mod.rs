//! Nightscout MongoDB backend

pub mod source;
pub mod store;

pub use source::MongoSource;
pub use store::{DocumentStore, FindQuery, MemoryStore, MongoStore};
