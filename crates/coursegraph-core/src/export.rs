//! # Graph Export
//!
//! Read-only traversal of the store into a [`Snapshot`].
//!
//! The whole graph is walked page by page; a course scope covers the course,
//! its `PART_OF` members and the chapter/concept neighbours of those members.

use crate::config::StoreConfig;
use crate::graph::GraphStore;
use crate::resolver::EntityResolver;
use crate::snapshot::{EdgeRecord, NodeRecord, Snapshot};
use crate::{
    Edge, EdgeId, GraphError, Label, NaturalKey, NodeData, NodeId, RelationType, StoredNode,
};
use std::collections::{BTreeMap, BTreeSet};

/// What to export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportScope {
    AllGraph,
    /// One course and its neighbourhood, by course name.
    Course(String),
}

/// The GraphExporter serializes the store's contents.
pub struct GraphExporter;

impl GraphExporter {
    /// Export `scope` from `graph`.
    ///
    /// An unknown course yields an empty snapshot.
    pub fn export<G: GraphStore>(
        graph: &G,
        scope: &ExportScope,
        config: &StoreConfig,
    ) -> Result<Snapshot, GraphError> {
        let (nodes, edges) = match scope {
            ExportScope::AllGraph => Self::collect_all(graph, config.effective_page_size())?,
            ExportScope::Course(name) => Self::collect_course(graph, name)?,
        };

        let mut snapshot = Snapshot::empty(config.store_uri());
        for edge in edges.values() {
            let (Some(source), Some(target)) = (nodes.get(&edge.source), nodes.get(&edge.target))
            else {
                continue;
            };
            snapshot
                .relationships
                .details
                .push(Self::edge_record(edge, source, target));
        }
        for (id, data) in nodes {
            match data {
                NodeData::Course(c) => snapshot
                    .nodes
                    .courses
                    .push(NodeRecord::new(id.0, Label::Course, c)),
                NodeData::Chapter(c) => snapshot
                    .nodes
                    .chapters
                    .push(NodeRecord::new(id.0, Label::Chapter, c)),
                NodeData::Concept(c) => snapshot
                    .nodes
                    .concepts
                    .push(NodeRecord::new(id.0, Label::Concept, c)),
            }
        }
        snapshot.refresh_summary();

        tracing::info!(
            nodes = snapshot.node_count(),
            edges = snapshot.edge_count(),
            ?scope,
            "graph exported"
        );
        Ok(snapshot)
    }

    fn collect_all<G: GraphStore>(
        graph: &G,
        page_size: usize,
    ) -> Result<(BTreeMap<NodeId, NodeData>, BTreeMap<EdgeId, Edge>), GraphError> {
        let mut nodes = BTreeMap::new();
        let mut after = None;
        loop {
            let page = graph.nodes_page(after, page_size)?;
            let Some(last) = page.last() else { break };
            after = Some(last.id);
            let full = page.len() == page_size;
            nodes.extend(page.into_iter().map(|n| (n.id, n.data)));
            if !full {
                break;
            }
        }

        let mut edges = BTreeMap::new();
        let mut after = None;
        loop {
            let page = graph.edges_page(after, page_size)?;
            let Some(last) = page.last() else { break };
            after = Some(last.id);
            let full = page.len() == page_size;
            edges.extend(page.into_iter().map(|e| (e.id, e)));
            if !full {
                break;
            }
        }
        Ok((nodes, edges))
    }

    fn collect_course<G: GraphStore>(
        graph: &G,
        name: &str,
    ) -> Result<(BTreeMap<NodeId, NodeData>, BTreeMap<EdgeId, Edge>), GraphError> {
        let mut nodes = BTreeMap::new();
        let mut edges = BTreeMap::new();

        let Some(course) = EntityResolver::resolve(graph, &NaturalKey::course(name))? else {
            tracing::warn!(course = name, "course not found, nothing to export");
            return Ok((nodes, edges));
        };
        Self::insert_node(graph, course, &mut nodes)?;

        let mut members = BTreeSet::new();
        for edge in graph.edges_of(course)? {
            if edge.kind == RelationType::PartOf && edge.target == course {
                members.insert(edge.source);
                Self::insert_node(graph, edge.source, &mut nodes)?;
                edges.insert(edge.id, edge);
            }
        }

        for member in &members {
            for edge in graph.edges_of(*member)? {
                let Some(other) = edge.other_end(*member) else {
                    continue;
                };
                let Some(neighbour) = graph.get_node(other)? else {
                    continue;
                };
                match &neighbour.data {
                    NodeData::Course(_) => continue,
                    // Chapters of other courses a shared concept is mentioned in.
                    NodeData::Chapter(chapter) if chapter.course != name => continue,
                    _ => {}
                }
                nodes.insert(neighbour.id, neighbour.data);
                edges.insert(edge.id, edge);
            }
        }
        Ok((nodes, edges))
    }

    fn insert_node<G: GraphStore>(
        graph: &G,
        id: NodeId,
        nodes: &mut BTreeMap<NodeId, NodeData>,
    ) -> Result<(), GraphError> {
        if let Some(StoredNode { id, data }) = graph.get_node(id)? {
            nodes.insert(id, data);
        }
        Ok(())
    }

    fn edge_record(edge: &Edge, source: &NodeData, target: &NodeData) -> EdgeRecord {
        let source_key = source.natural_key();
        let target_key = target.natural_key();
        EdgeRecord {
            source_id: edge.source.0,
            source_name: source_key.key,
            source_labels: vec![source_key.label.as_str().to_string()],
            source_scope: source_key.scope,
            target_id: edge.target.0,
            target_name: target_key.key,
            target_labels: vec![target_key.label.as_str().to_string()],
            target_scope: target_key.scope,
            relationship_type: edge.kind.as_str().to_string(),
            description: edge.description.clone(),
        }
    }
}
