//! Shared wire types used across the courier crates.

pub mod types;

pub use types::{ChatResponse, InboundMessage};
