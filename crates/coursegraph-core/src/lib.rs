//! # coursegraph-core
//!
//! The knowledge-graph engine for course material.
//!
//! This crate turns per-chapter extraction results into a graph of courses,
//! chapters and concepts, with idempotent merge semantics, and moves that
//! graph in and out of JSON backups.
//!
//! ## Components
//!
//! - `graph` / `storage`: the `GraphStore` trait, in-memory and redb stores
//! - `resolver`: natural key to node
//! - `merge`: accumulation rules for attributes
//! - `dedup`: relationship existence checks
//! - `upsert`: create-or-merge orchestration and batch reports
//! - `ingestor`: one chapter's analysis into the graph
//! - `snapshot` / `export` / `restore`: backups with natural-key remapping
//! - `system`: statistics
//!
//! ## Constraints
//!
//! - Synchronous, single writer, no network dependencies
//! - Every create/update is atomic on its own; re-running is the recovery path
//! - `BTreeMap` only, integer arithmetic only

// =============================================================================
// MODULES
// =============================================================================

pub mod config;
pub mod dedup;
pub mod export;
pub mod graph;
pub mod ingestor;
pub mod merge;
pub mod primitives;
pub mod repair;
pub mod resolver;
pub mod restore;
pub mod retry;
pub mod snapshot;
pub mod storage;
pub mod system;
pub mod types;
pub mod upsert;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::entity::mention_key;
pub use types::{
    Chapter, ChapterMention, Concept, Course, Edge, EdgeId, GraphError, Label, NaturalKey,
    NewEdge, NodeData, NodeId, Provenance, RelationType, Segment, StoredNode, TaggedText,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use config::{DedupMode, StoreConfig};
pub use dedup::RelationshipDeduper;
pub use export::{ExportScope, GraphExporter};
pub use graph::{Graph, GraphStore};
pub use ingestor::{
    ChapterAnalysis, ChapterIngest, ConceptSummary, ExtractedConcept, ExtractedRelationship,
    RelatedConcept,
};
pub use merge::{AttributeMerger, MergePolicy};
pub use repair::repair_json;
pub use resolver::{EntityResolver, Resolution};
pub use restore::{GraphRestorer, RestoreReport};
pub use retry::RetryPolicy;
pub use snapshot::{EdgeRecord, NodeRecord, Snapshot, SnapshotMetadata};
pub use storage::RedbGraph;
pub use upsert::{BatchReport, EdgeOutcome, SkippedItem, UpsertEngine, UpsertOutcome};

// =============================================================================
// RE-EXPORTS: System (from system module)
// =============================================================================

pub use system::{CourseStats, GraphMetrics};
