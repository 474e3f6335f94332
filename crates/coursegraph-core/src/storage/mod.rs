//! # Storage Module
//!
//! Persistent store backends.

mod redb_graph;

pub use redb_graph::RedbGraph;
