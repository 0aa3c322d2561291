//! Core relay functionality.

pub mod relay;
