//! CLI command implementations

pub mod export;
pub mod validate;

pub use export::exit_code_for;
