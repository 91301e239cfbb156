//! Source abstraction layer
//!
//! One capability trait, [`RecordSource`], with two backends combined in the
//! [`DataSource`] sum type so the pipeline stays backend-agnostic.

pub mod factory;
pub mod traits;

pub use factory::{create_sources, release_sources};
pub use traits::{forward, DataSource, QueryWindow, RecordSource};
