//! # Upsert Engine
//!
//! Create-or-merge for nodes and create-if-absent for edges.
//!
//! - Nodes are resolved by natural key; absent nodes are created, present
//!   ones merged under a [`MergePolicy`].
//! - Edges are checked against the [`RelationshipDeduper`] first.
//! - A missing edge endpoint is a counted skip, never an error.
//!
//! Every batch ends in a [`BatchReport`] so partial success is observable.

use crate::config::{DedupMode, StoreConfig};
use crate::dedup::RelationshipDeduper;
use crate::graph::GraphStore;
use crate::merge::{AttributeMerger, MergePolicy};
use crate::resolver::EntityResolver;
use crate::{EdgeId, GraphError, NaturalKey, NewEdge, NodeData, NodeId, RelationType};
use serde::Serialize;
use std::fmt;

// =============================================================================
// OUTCOMES
// =============================================================================

/// Result of a node upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub node: NodeId,
    pub created: bool,
    /// An existing node's attributes changed.
    pub updated: bool,
}

/// Result of an edge upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOutcome {
    Created(EdgeId),
    /// An equivalent edge already exists.
    Duplicate(EdgeId),
    /// An endpoint was unresolved.
    Skipped,
}

impl EdgeOutcome {
    #[must_use]
    pub fn created(&self) -> bool {
        matches!(self, EdgeOutcome::Created(_))
    }

    #[must_use]
    pub fn edge(&self) -> Option<EdgeId> {
        match self {
            EdgeOutcome::Created(id) | EdgeOutcome::Duplicate(id) => Some(*id),
            EdgeOutcome::Skipped => None,
        }
    }
}

/// An entity or edge left out of a batch, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedItem {
    pub subject: String,
    pub reason: String,
}

impl fmt::Display for SkippedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.subject, self.reason)
    }
}

/// Counts for one batch of upserts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub edges_created: usize,
    pub edges_duplicate: usize,
    pub skipped: Vec<SkippedItem>,
}

impl BatchReport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_node(&mut self, outcome: &UpsertOutcome) {
        if outcome.created {
            self.created += 1;
        } else if outcome.updated {
            self.updated += 1;
        } else {
            self.unchanged += 1;
        }
    }

    /// Count an edge outcome. `subject` describes the edge for skip reports.
    pub fn record_edge(&mut self, outcome: &EdgeOutcome, subject: impl Into<String>) {
        match outcome {
            EdgeOutcome::Created(_) => self.edges_created += 1,
            EdgeOutcome::Duplicate(_) => self.edges_duplicate += 1,
            EdgeOutcome::Skipped => self.skip(subject, "unresolved endpoint"),
        }
    }

    pub fn skip(&mut self, subject: impl Into<String>, reason: impl fmt::Display) {
        let item = SkippedItem {
            subject: subject.into(),
            reason: reason.to_string(),
        };
        tracing::warn!(subject = %item.subject, reason = %item.reason, "skipped");
        self.skipped.push(item);
    }

    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// Fold another report into this one.
    pub fn absorb(&mut self, other: BatchReport) {
        self.created += other.created;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.edges_created += other.edges_created;
        self.edges_duplicate += other.edges_duplicate;
        self.skipped.extend(other.skipped);
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "nodes: {} created, {} updated, {} unchanged; edges: {} created, {} duplicate; {} skipped",
            self.created,
            self.updated,
            self.unchanged,
            self.edges_created,
            self.edges_duplicate,
            self.skipped.len()
        )
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// The UpsertEngine orchestrates resolution, merging and deduplication.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpsertEngine {
    dedup: DedupMode,
}

impl UpsertEngine {
    #[must_use]
    pub fn new(dedup: DedupMode) -> Self {
        Self { dedup }
    }

    #[must_use]
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.dedup)
    }

    /// Create the node if its natural key is absent, otherwise merge into it.
    pub fn upsert_node<G: GraphStore>(
        &self,
        graph: &mut G,
        data: NodeData,
        policy: MergePolicy,
    ) -> Result<UpsertOutcome, GraphError> {
        let key = data.natural_key();

        let Some(node) = EntityResolver::resolve(graph, &key)? else {
            let node = graph.create_node(data)?;
            tracing::debug!(%key, %node, "created node");
            return Ok(UpsertOutcome {
                node,
                created: true,
                updated: false,
            });
        };

        let mut current = graph
            .get_node(node)?
            .ok_or(GraphError::NodeNotFound(node))?
            .data;
        let updated = AttributeMerger::merge_node(&mut current, data, policy);
        if updated {
            graph.update_node(node, current)?;
            tracing::debug!(%key, %node, "updated node");
        }

        Ok(UpsertOutcome {
            node,
            created: false,
            updated,
        })
    }

    /// Create the edge unless an equivalent one exists.
    ///
    /// A `None` endpoint, or one that no longer exists, yields
    /// [`EdgeOutcome::Skipped`].
    pub fn upsert_edge<G: GraphStore>(
        &self,
        graph: &mut G,
        source: Option<NodeId>,
        target: Option<NodeId>,
        kind: RelationType,
        description: &str,
    ) -> Result<EdgeOutcome, GraphError> {
        let (Some(source), Some(target)) = (source, target) else {
            return Ok(EdgeOutcome::Skipped);
        };

        if let Some(existing) =
            RelationshipDeduper::find(graph, source, target, kind, self.dedup)?
        {
            return Ok(EdgeOutcome::Duplicate(existing.id));
        }

        match graph.create_edge(NewEdge::new(source, target, kind, description)) {
            Ok(edge) => {
                tracing::debug!(%source, %target, %kind, %edge, "created edge");
                Ok(EdgeOutcome::Created(edge))
            }
            Err(GraphError::NodeNotFound(_)) => Ok(EdgeOutcome::Skipped),
            Err(e) => Err(e),
        }
    }

    /// Resolve both endpoints by natural key, then upsert the edge.
    ///
    /// Unresolved endpoints are recorded in `report` as skips.
    pub fn upsert_edge_by_key<G: GraphStore>(
        &self,
        graph: &mut G,
        source: &NaturalKey,
        target: &NaturalKey,
        kind: RelationType,
        description: &str,
        report: &mut BatchReport,
    ) -> Result<EdgeOutcome, GraphError> {
        let source_id = resolve_or_skip(graph, source)?;
        let target_id = resolve_or_skip(graph, target)?;

        let outcome = self.upsert_edge(graph, source_id, target_id, kind, description)?;
        match outcome {
            EdgeOutcome::Skipped => {
                let err = GraphError::UnresolvedEndpoint {
                    source_key: source.to_string(),
                    target_key: target.to_string(),
                };
                report.skip(format!("{kind} edge"), err);
            }
            other => report.record_edge(&other, ""),
        }
        Ok(outcome)
    }
}

/// Resolve a key, treating per-entity key errors as absence.
pub(crate) fn resolve_or_skip<G: GraphStore>(
    graph: &G,
    key: &NaturalKey,
) -> Result<Option<NodeId>, GraphError> {
    match EntityResolver::resolve(graph, key) {
        Ok(found) => Ok(found),
        Err(e) if e.is_store_failure() => Err(e),
        Err(_) => Ok(None),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::{Concept, Course, Segment, TaggedText};

    fn concept(name: &str, chapter: &str, def: &str) -> NodeData {
        let mut c = Concept::named(name);
        c.definition = TaggedText::single(Segment::from_chapter("C1", chapter, def));
        NodeData::Concept(c)
    }

    #[test]
    fn upsert_twice_creates_once() {
        let mut graph = Graph::new();
        let engine = UpsertEngine::default();

        let first = engine
            .upsert_node(&mut graph, concept("Water", "A", "D1"), MergePolicy::Accumulate)
            .expect("upsert");
        let second = engine
            .upsert_node(&mut graph, concept("Water", "A", "D1"), MergePolicy::Accumulate)
            .expect("upsert");

        assert!(first.created);
        assert!(!second.created);
        assert!(!second.updated);
        assert_eq!(first.node, second.node);
        assert_eq!(graph.node_count().expect("count"), 1);
    }

    #[test]
    fn upsert_merges_into_existing_node() {
        let mut graph = Graph::new();
        let engine = UpsertEngine::default();

        engine
            .upsert_node(&mut graph, concept("Water", "A", "D1"), MergePolicy::Accumulate)
            .expect("upsert");
        let outcome = engine
            .upsert_node(&mut graph, concept("Water", "B", "D2"), MergePolicy::Accumulate)
            .expect("upsert");
        assert!(outcome.updated);

        let stored = graph.get_node(outcome.node).expect("get").expect("present");
        let NodeData::Concept(c) = stored.data else {
            panic!("expected a concept");
        };
        assert_eq!(c.definition.segments().len(), 2);
    }

    #[test]
    fn keep_existing_leaves_course_untouched() {
        let mut graph = Graph::new();
        let engine = UpsertEngine::default();
        let course = |d: &str| {
            NodeData::Course(Course {
                name: "C1".into(),
                description: d.into(),
            })
        };

        engine
            .upsert_node(&mut graph, course("original"), MergePolicy::KeepExisting)
            .expect("upsert");
        let outcome = engine
            .upsert_node(&mut graph, course("changed"), MergePolicy::KeepExisting)
            .expect("upsert");

        assert!(!outcome.updated);
        let stored = graph.get_node(outcome.node).expect("get").expect("present");
        assert!(matches!(stored.data, NodeData::Course(c) if c.description == "original"));
    }

    #[test]
    fn reverse_edge_of_same_type_is_a_duplicate() {
        let mut graph = Graph::new();
        let engine = UpsertEngine::default();
        let x = engine
            .upsert_node(&mut graph, concept("X", "A", "x"), MergePolicy::Accumulate)
            .expect("upsert")
            .node;
        let y = engine
            .upsert_node(&mut graph, concept("Y", "A", "y"), MergePolicy::Accumulate)
            .expect("upsert")
            .node;

        let first = engine
            .upsert_edge(&mut graph, Some(x), Some(y), RelationType::RelatesTo, "")
            .expect("edge");
        let second = engine
            .upsert_edge(&mut graph, Some(y), Some(x), RelationType::RelatesTo, "")
            .expect("edge");

        assert!(first.created());
        assert_eq!(second, EdgeOutcome::Duplicate(first.edge().expect("id")));
        assert_eq!(graph.edge_count().expect("count"), 1);
    }

    #[test]
    fn missing_endpoint_is_skipped_not_raised() {
        let mut graph = Graph::new();
        let engine = UpsertEngine::default();
        let x = engine
            .upsert_node(&mut graph, concept("X", "A", "x"), MergePolicy::Accumulate)
            .expect("upsert")
            .node;

        assert_eq!(
            engine
                .upsert_edge(&mut graph, Some(x), None, RelationType::IsA, "")
                .expect("edge"),
            EdgeOutcome::Skipped
        );
        assert_eq!(
            engine
                .upsert_edge(&mut graph, Some(x), Some(NodeId(99)), RelationType::IsA, "")
                .expect("edge"),
            EdgeOutcome::Skipped
        );
    }

    #[test]
    fn edge_by_key_reports_unresolved_endpoint() {
        let mut graph = Graph::new();
        let engine = UpsertEngine::default();
        engine
            .upsert_node(&mut graph, concept("X", "A", "x"), MergePolicy::Accumulate)
            .expect("upsert");

        let mut report = BatchReport::new();
        let outcome = engine
            .upsert_edge_by_key(
                &mut graph,
                &NaturalKey::concept("X"),
                &NaturalKey::concept("Ghost"),
                RelationType::UsedIn,
                "",
                &mut report,
            )
            .expect("edge");

        assert_eq!(outcome, EdgeOutcome::Skipped);
        assert_eq!(report.skipped_count(), 1);
        assert!(report.skipped[0].reason.contains("Ghost"));
    }

    #[test]
    fn report_counts_and_absorbs() {
        let mut report = BatchReport::new();
        report.record_node(&UpsertOutcome {
            node: NodeId(0),
            created: true,
            updated: false,
        });
        report.record_edge(&EdgeOutcome::Duplicate(EdgeId(1)), "e");

        let mut other = BatchReport::new();
        other.skip("Ghost", "unresolved endpoint");
        report.absorb(other);

        assert_eq!(report.created, 1);
        assert_eq!(report.edges_duplicate, 1);
        assert_eq!(report.skipped_count(), 1);
    }
}
