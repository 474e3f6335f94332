//! # Graph Store
//!
//! The store abstraction the engine talks to, plus the in-memory store.
//!
//! This module defines the `GraphStore` trait and implements it for `Graph`.
//! All data structures use `BTreeMap` for deterministic ordering.

use crate::primitives::DEFAULT_PAGE_SIZE;
use crate::{Edge, EdgeId, GraphError, Label, NaturalKey, NewEdge, NodeData, NodeId, StoredNode};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// GRAPHSTORE TRAIT
// =============================================================================

/// A mutable property-graph store.
///
/// Every create/update is atomic on its own; there is no multi-operation
/// transaction. The engine assumes a single writer for the duration of a run.
///
/// Implementations index nodes by natural key. A scoped key is indexed both
/// exactly and without its scope, so unscoped lookups still find it.
pub trait GraphStore {
    /// Create a node and return its new transient id. Never deduplicates.
    fn create_node(&mut self, data: NodeData) -> Result<NodeId, GraphError>;

    /// Replace a node's attributes. The label and natural key must not change.
    fn update_node(&mut self, id: NodeId, data: NodeData) -> Result<(), GraphError>;

    /// Fetch a node by transient id.
    fn get_node(&self, id: NodeId) -> Result<Option<StoredNode>, GraphError>;

    /// Every node matching a natural key, in ascending id order.
    fn find_by_key(&self, key: &NaturalKey) -> Result<Vec<NodeId>, GraphError>;

    /// Create an edge. Both endpoints must exist. Never deduplicates.
    fn create_edge(&mut self, edge: NewEdge) -> Result<EdgeId, GraphError>;

    /// Edges joining `a` and `b` in either direction.
    fn edges_between(&self, a: NodeId, b: NodeId) -> Result<Vec<Edge>, GraphError>;

    /// Edges incident to `node` (incoming and outgoing).
    fn edges_of(&self, node: NodeId) -> Result<Vec<Edge>, GraphError>;

    /// Up to `limit` nodes with id strictly greater than `after`.
    fn nodes_page(
        &self,
        after: Option<NodeId>,
        limit: usize,
    ) -> Result<Vec<StoredNode>, GraphError>;

    /// Up to `limit` edges with id strictly greater than `after`.
    fn edges_page(&self, after: Option<EdgeId>, limit: usize) -> Result<Vec<Edge>, GraphError>;

    fn node_count(&self) -> Result<usize, GraphError>;

    fn edge_count(&self) -> Result<usize, GraphError>;

    /// Delete every node and edge. Destructive.
    fn clear(&mut self) -> Result<(), GraphError>;

    /// Walk all nodes page by page.
    fn all_nodes(&self) -> Result<Vec<StoredNode>, GraphError> {
        let mut out = Vec::new();
        let mut after = None;
        loop {
            let page = self.nodes_page(after, DEFAULT_PAGE_SIZE)?;
            let Some(last) = page.last() else {
                break;
            };
            after = Some(last.id);
            let full = page.len() == DEFAULT_PAGE_SIZE;
            out.extend(page);
            if !full {
                break;
            }
        }
        Ok(out)
    }

    /// Walk all edges page by page.
    fn all_edges(&self) -> Result<Vec<Edge>, GraphError> {
        let mut out = Vec::new();
        let mut after = None;
        loop {
            let page = self.edges_page(after, DEFAULT_PAGE_SIZE)?;
            let Some(last) = page.last() else {
                break;
            };
            after = Some(last.id);
            let full = page.len() == DEFAULT_PAGE_SIZE;
            out.extend(page);
            if !full {
                break;
            }
        }
        Ok(out)
    }

    /// All nodes carrying `label`. Full scan; intended for reporting.
    fn nodes_with_label(&self, label: Label) -> Result<Vec<StoredNode>, GraphError> {
        Ok(self
            .all_nodes()?
            .into_iter()
            .filter(|n| n.data.label() == label)
            .collect())
    }
}

/// Index entries a node is registered under.
pub(crate) fn index_entries(key: &NaturalKey) -> Vec<String> {
    let exact = key.index_key();
    let loose = key.unscoped_index_key();
    if exact == loose {
        vec![exact]
    } else {
        vec![exact, loose]
    }
}

/// Reject updates that would move a node to a different identity.
pub(crate) fn check_same_identity(
    id: NodeId,
    current: &NodeData,
    next: &NodeData,
) -> Result<(), GraphError> {
    if current.natural_key() != next.natural_key() {
        return Err(GraphError::InvalidKey(format!(
            "update of node {id} would change its natural key from {} to {}",
            current.natural_key(),
            next.natural_key()
        )));
    }
    Ok(())
}

// =============================================================================
// GRAPH IMPLEMENTATION
// =============================================================================

/// In-memory store.
///
/// Uses `BTreeMap` exclusively so ids, scans and exports are deterministic.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    /// Node storage: NodeId -> attributes
    nodes: BTreeMap<NodeId, NodeData>,

    /// Edge storage: EdgeId -> edge
    edges: BTreeMap<EdgeId, Edge>,

    /// Natural key index: index entry -> nodes
    key_index: BTreeMap<String, BTreeSet<NodeId>>,

    /// Incidence: node -> edges touching it
    adjacency: BTreeMap<NodeId, BTreeSet<EdgeId>>,

    next_node_id: u64,
    next_edge_id: u64,
}

impl Graph {
    /// Create a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &NodeData)> {
        self.nodes.iter().map(|(id, data)| (*id, data))
    }

    /// Get all edges in id order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    fn incident(&self, node: NodeId) -> impl Iterator<Item = &Edge> + '_ {
        self.adjacency
            .get(&node)
            .into_iter()
            .flatten()
            .filter_map(|edge_id| self.edges.get(edge_id))
    }
}

impl GraphStore for Graph {
    fn create_node(&mut self, data: NodeData) -> Result<NodeId, GraphError> {
        let key = data.natural_key();
        key.validate()?;

        let node_id = NodeId(self.next_node_id);
        self.next_node_id = self.next_node_id.saturating_add(1);

        for entry in index_entries(&key) {
            self.key_index.entry(entry).or_default().insert(node_id);
        }
        self.nodes.insert(node_id, data);
        Ok(node_id)
    }

    fn update_node(&mut self, id: NodeId, data: NodeData) -> Result<(), GraphError> {
        let current = self.nodes.get_mut(&id).ok_or(GraphError::NodeNotFound(id))?;
        check_same_identity(id, current, &data)?;
        *current = data;
        Ok(())
    }

    fn get_node(&self, id: NodeId) -> Result<Option<StoredNode>, GraphError> {
        Ok(self.nodes.get(&id).map(|data| StoredNode {
            id,
            data: data.clone(),
        }))
    }

    fn find_by_key(&self, key: &NaturalKey) -> Result<Vec<NodeId>, GraphError> {
        Ok(self
            .key_index
            .get(&key.index_key())
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default())
    }

    fn create_edge(&mut self, edge: NewEdge) -> Result<EdgeId, GraphError> {
        for endpoint in [edge.source, edge.target] {
            if !self.nodes.contains_key(&endpoint) {
                return Err(GraphError::NodeNotFound(endpoint));
            }
        }

        let edge_id = EdgeId(self.next_edge_id);
        self.next_edge_id = self.next_edge_id.saturating_add(1);

        self.adjacency.entry(edge.source).or_default().insert(edge_id);
        self.adjacency.entry(edge.target).or_default().insert(edge_id);
        self.edges.insert(edge_id, Edge::from_new(edge_id, edge));
        Ok(edge_id)
    }

    fn edges_between(&self, a: NodeId, b: NodeId) -> Result<Vec<Edge>, GraphError> {
        Ok(self
            .incident(a)
            .filter(|e| e.other_end(a) == Some(b))
            .cloned()
            .collect())
    }

    fn edges_of(&self, node: NodeId) -> Result<Vec<Edge>, GraphError> {
        Ok(self.incident(node).cloned().collect())
    }

    fn nodes_page(
        &self,
        after: Option<NodeId>,
        limit: usize,
    ) -> Result<Vec<StoredNode>, GraphError> {
        let start = after.map_or(0, |id| id.0.saturating_add(1));
        Ok(self
            .nodes
            .range(NodeId(start)..)
            .filter(|(id, _)| after.is_none_or(|a| **id > a))
            .take(limit)
            .map(|(id, data)| StoredNode {
                id: *id,
                data: data.clone(),
            })
            .collect())
    }

    fn edges_page(&self, after: Option<EdgeId>, limit: usize) -> Result<Vec<Edge>, GraphError> {
        let start = after.map_or(0, |id| id.0.saturating_add(1));
        Ok(self
            .edges
            .range(EdgeId(start)..)
            .filter(|(id, _)| after.is_none_or(|a| **id > a))
            .take(limit)
            .map(|(_, edge)| edge.clone())
            .collect())
    }

    fn node_count(&self) -> Result<usize, GraphError> {
        Ok(self.nodes.len())
    }

    fn edge_count(&self) -> Result<usize, GraphError> {
        Ok(self.edges.len())
    }

    fn clear(&mut self) -> Result<(), GraphError> {
        // Id counters keep running so stale ids from before the wipe never alias.
        self.nodes.clear();
        self.edges.clear();
        self.key_index.clear();
        self.adjacency.clear();
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Chapter, Concept, Course, RelationType};

    fn concept(name: &str) -> NodeData {
        NodeData::Concept(Concept::named(name))
    }

    fn chapter(course: &str, title: &str) -> NodeData {
        NodeData::Chapter(Chapter {
            title: title.into(),
            course: course.into(),
            main_ideas: vec![],
        })
    }

    #[test]
    fn create_node_assigns_sequential_ids() {
        let mut graph = Graph::new();
        let a = graph.create_node(concept("A")).expect("create");
        let b = graph.create_node(concept("B")).expect("create");

        assert_eq!(a, NodeId(0));
        assert_eq!(b, NodeId(1));
        assert_eq!(graph.node_count().expect("count"), 2);
    }

    #[test]
    fn create_node_rejects_empty_key() {
        let mut graph = Graph::new();
        assert!(matches!(
            graph.create_node(concept("")),
            Err(GraphError::InvalidKey(_))
        ));
    }

    #[test]
    fn find_by_key_matches_label_and_name() {
        let mut graph = Graph::new();
        let water = graph.create_node(concept("Water")).expect("create");
        graph
            .create_node(NodeData::Course(Course {
                name: "Water".into(),
                description: String::new(),
            }))
            .expect("create");

        let found = graph
            .find_by_key(&NaturalKey::concept("Water"))
            .expect("find");
        assert_eq!(found, vec![water]);
    }

    #[test]
    fn scoped_chapter_found_with_and_without_scope() {
        let mut graph = Graph::new();
        let ch1 = graph.create_node(chapter("C1", "Intro")).expect("create");
        let ch2 = graph.create_node(chapter("C2", "Intro")).expect("create");

        assert_eq!(
            graph
                .find_by_key(&NaturalKey::chapter("C1", "Intro"))
                .expect("find"),
            vec![ch1]
        );
        assert_eq!(
            graph
                .find_by_key(&NaturalKey::unscoped(Label::Chapter, "Intro"))
                .expect("find"),
            vec![ch1, ch2]
        );
    }

    #[test]
    fn update_node_refuses_identity_change() {
        let mut graph = Graph::new();
        let id = graph.create_node(concept("A")).expect("create");

        assert!(graph.update_node(id, concept("B")).is_err());
        assert!(matches!(
            graph.update_node(NodeId(99), concept("A")),
            Err(GraphError::NodeNotFound(_))
        ));
    }

    #[test]
    fn create_edge_requires_endpoints() {
        let mut graph = Graph::new();
        let a = graph.create_node(concept("A")).expect("create");

        let result = graph.create_edge(NewEdge::new(a, NodeId(7), RelationType::IsA, ""));
        assert!(matches!(result, Err(GraphError::NodeNotFound(NodeId(7)))));
        assert_eq!(graph.edge_count().expect("count"), 0);
    }

    #[test]
    fn edges_between_sees_both_directions() {
        let mut graph = Graph::new();
        let a = graph.create_node(concept("A")).expect("create");
        let b = graph.create_node(concept("B")).expect("create");
        let c = graph.create_node(concept("C")).expect("create");

        graph
            .create_edge(NewEdge::new(a, b, RelationType::RelatesTo, ""))
            .expect("edge");
        graph
            .create_edge(NewEdge::new(b, a, RelationType::IsA, ""))
            .expect("edge");
        graph
            .create_edge(NewEdge::new(a, c, RelationType::IsA, ""))
            .expect("edge");

        assert_eq!(graph.edges_between(a, b).expect("between").len(), 2);
        assert_eq!(graph.edges_between(b, a).expect("between").len(), 2);
        assert_eq!(graph.edges_of(a).expect("edges").len(), 3);
    }

    #[test]
    fn paging_walks_every_node_once() {
        let mut graph = Graph::new();
        for i in 0..7 {
            graph.create_node(concept(&format!("C{i}"))).expect("create");
        }

        let first = graph.nodes_page(None, 3).expect("page");
        let second = graph.nodes_page(first.last().map(|n| n.id), 3).expect("page");
        let third = graph.nodes_page(second.last().map(|n| n.id), 3).expect("page");

        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 3);
        assert_eq!(third.len(), 1);
        assert_eq!(graph.all_nodes().expect("all").len(), 7);
    }

    #[test]
    fn clear_removes_everything_but_never_reuses_ids() {
        let mut graph = Graph::new();
        let a = graph.create_node(concept("A")).expect("create");
        graph.clear().expect("clear");

        assert_eq!(graph.node_count().expect("count"), 0);
        assert!(graph
            .find_by_key(&NaturalKey::concept("A"))
            .expect("find")
            .is_empty());

        let again = graph.create_node(concept("A")).expect("create");
        assert_ne!(a, again);
    }
}
