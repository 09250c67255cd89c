//! Utilities
pub mod fmt;
pub mod stats;
