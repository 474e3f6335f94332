//! # System Module
//!
//! Graph-wide and per-course statistics.

mod stats;

pub use stats::*;
