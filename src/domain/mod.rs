//! Domain layer for the dynacache system
//!
//! This module contains the entity models, configuration types and the port
//! traits that collaborators implement.

pub mod errors;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use errors::{CacheError, CacheResult};
