//! Nightscout REST API backend

pub mod client;
pub mod models;

pub use client::NightscoutSource;
