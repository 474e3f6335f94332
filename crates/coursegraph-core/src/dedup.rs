//! # Relationship Deduper
//!
//! Decides whether a prospective edge already exists.

use crate::config::DedupMode;
use crate::graph::GraphStore;
use crate::{Edge, GraphError, NodeId, RelationType};

/// The RelationshipDeduper checks edge existence under a [`DedupMode`].
pub struct RelationshipDeduper;

impl RelationshipDeduper {
    /// Whether `edge` counts as a duplicate of `(source, target, kind)`.
    #[must_use]
    pub fn matches(
        edge: &Edge,
        source: NodeId,
        target: NodeId,
        kind: RelationType,
        mode: DedupMode,
    ) -> bool {
        let forward = edge.source == source && edge.target == target;
        let reverse = edge.source == target && edge.target == source;
        match mode {
            DedupMode::Directed => forward && edge.kind == kind,
            DedupMode::SymmetricPerType => (forward || reverse) && edge.kind == kind,
            DedupMode::Pairwise => forward || reverse,
        }
    }

    /// The existing edge that makes `(source, target, kind)` a duplicate.
    pub fn find<G: GraphStore>(
        graph: &G,
        source: NodeId,
        target: NodeId,
        kind: RelationType,
        mode: DedupMode,
    ) -> Result<Option<Edge>, GraphError> {
        Ok(graph
            .edges_between(source, target)?
            .into_iter()
            .find(|e| Self::matches(e, source, target, kind, mode)))
    }

    pub fn exists<G: GraphStore>(
        graph: &G,
        source: NodeId,
        target: NodeId,
        kind: RelationType,
        mode: DedupMode,
    ) -> Result<bool, GraphError> {
        Ok(Self::find(graph, source, target, kind, mode)?.is_some())
    }
}
