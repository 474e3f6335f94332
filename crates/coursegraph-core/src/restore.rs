//! # Graph Restore
//!
//! Re-materializes a [`Snapshot`] into a store whose transient ids differ
//! from the exporting store's.
//!
//! 1. Validate the snapshot (nothing is touched on failure).
//! 2. Wipe the target store.
//! 3. Create every node, courses first, then chapters, then concepts.
//! 4. Map each old id referenced by an edge to a new node by re-resolving
//!    the natural key carried in the edge record.
//! 5. Create each edge whose endpoints both mapped; count the rest.
//!
//! Edges whose endpoints cannot be re-resolved are lost. Shared natural keys
//! degrade to first-match-wins.
//!
//! Operator confirmation of the wipe is the caller's responsibility.

use crate::graph::GraphStore;
use crate::resolver::{EntityResolver, Resolution};
use crate::snapshot::{EdgeRecord, Snapshot};
use crate::{GraphError, NaturalKey, NewEdge, NodeData, NodeId};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Outcome of a restore.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub nodes_created: usize,
    /// Node records rejected by the store (e.g. empty natural key).
    pub nodes_skipped: usize,
    pub edges_created: usize,
    pub edges_skipped: usize,
    /// Old ids whose natural key matched no restored node.
    pub unmapped_ids: BTreeSet<u64>,
    /// Natural keys that matched more than one restored node.
    pub ambiguous: Vec<String>,
}

impl fmt::Display for RestoreReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "nodes: {} created, {} skipped; edges: {} created, {} skipped; {} unmapped ids",
            self.nodes_created,
            self.nodes_skipped,
            self.edges_created,
            self.edges_skipped,
            self.unmapped_ids.len()
        )
    }
}

/// The GraphRestorer rebuilds a store from a snapshot.
pub struct GraphRestorer;

impl GraphRestorer {
    /// Wipe `graph` and restore `snapshot` into it. Destructive.
    pub fn restore<G: GraphStore>(
        graph: &mut G,
        snapshot: &Snapshot,
    ) -> Result<RestoreReport, GraphError> {
        snapshot.validate()?;

        graph.clear()?;
        let mut report = RestoreReport::default();

        Self::plant_nodes(graph, snapshot, &mut report)?;
        let id_map = Self::remap_ids(graph, &snapshot.relationships.details, &mut report)?;

        for record in &snapshot.relationships.details {
            let kind = match record.kind() {
                Ok(kind) => kind,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping edge with unknown type");
                    report.edges_skipped += 1;
                    continue;
                }
            };
            let (Some(source), Some(target)) = (
                id_map.get(&record.source_id).copied(),
                id_map.get(&record.target_id).copied(),
            ) else {
                tracing::warn!(
                    source = %record.source_name,
                    target = %record.target_name,
                    kind = %kind,
                    "skipping edge with unmapped endpoint"
                );
                report.edges_skipped += 1;
                continue;
            };

            graph.create_edge(NewEdge::new(source, target, kind, record.description.clone()))?;
            report.edges_created += 1;
        }

        tracing::info!(%report, "restore complete");
        Ok(report)
    }

    /// Create every node record. Planting order follows `Label` order.
    fn plant_nodes<G: GraphStore>(
        graph: &mut G,
        snapshot: &Snapshot,
        report: &mut RestoreReport,
    ) -> Result<(), GraphError> {
        let nodes = &snapshot.nodes;
        let records = nodes
            .courses
            .iter()
            .map(|r| NodeData::Course(r.properties.clone()))
            .chain(
                nodes
                    .chapters
                    .iter()
                    .map(|r| NodeData::Chapter(r.properties.clone())),
            )
            .chain(
                nodes
                    .concepts
                    .iter()
                    .map(|r| NodeData::Concept(r.properties.clone())),
            );

        for data in records {
            let key = data.natural_key();
            match graph.create_node(data) {
                Ok(_) => report.nodes_created += 1,
                Err(e) if e.is_store_failure() => return Err(e),
                Err(e) => {
                    tracing::warn!(%key, error = %e, "skipping node record");
                    report.nodes_skipped += 1;
                }
            }
        }
        Ok(())
    }

    /// Build `old id -> new node` from the natural keys in the edge records.
    ///
    /// The first record mentioning an id decides its key.
    fn remap_ids<G: GraphStore>(
        graph: &G,
        records: &[EdgeRecord],
        report: &mut RestoreReport,
    ) -> Result<BTreeMap<u64, NodeId>, GraphError> {
        let mut keys: BTreeMap<u64, Option<NaturalKey>> = BTreeMap::new();
        for record in records {
            keys.entry(record.source_id)
                .or_insert_with(|| record.source_key());
            keys.entry(record.target_id)
                .or_insert_with(|| record.target_key());
        }

        let mut id_map = BTreeMap::new();
        for (old_id, key) in keys {
            let resolution = match &key {
                Some(key) => match EntityResolver::lookup(graph, key) {
                    Ok(resolution) => resolution,
                    Err(e) if e.is_store_failure() => return Err(e),
                    Err(_) => Resolution::Absent,
                },
                None => Resolution::Absent,
            };

            if let (Resolution::Ambiguous(ids), Some(key)) = (&resolution, &key) {
                let err = GraphError::AmbiguousNaturalKey {
                    key: key.clone(),
                    count: ids.len(),
                };
                tracing::warn!(old_id, error = %err, "first match wins");
                report.ambiguous.push(key.to_string());
            }

            match resolution.first() {
                Some(new_id) => {
                    id_map.insert(old_id, new_id);
                }
                None => {
                    tracing::warn!(old_id, key = ?key, "unmapped id");
                    report.unmapped_ids.insert(old_id);
                }
            }
        }
        Ok(id_map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::export::{ExportScope, GraphExporter};
    use crate::graph::Graph;
    use crate::snapshot::NodeRecord;
    use crate::{Chapter, Concept, Course, Label, RelationType};

    fn scenario() -> Graph {
        let mut graph = Graph::new();
        let c1 = graph
            .create_node(NodeData::Course(Course {
                name: "C1".into(),
                description: String::new(),
            }))
            .expect("create");
        let ch1 = graph
            .create_node(NodeData::Chapter(Chapter {
                title: "Ch1".into(),
                course: "C1".into(),
                main_ideas: vec![],
            }))
            .expect("create");
        let water = graph
            .create_node(NodeData::Concept(Concept::named("Water")))
            .expect("create");
        graph
            .create_edge(NewEdge::new(water, c1, RelationType::PartOf, ""))
            .expect("edge");
        graph
            .create_edge(NewEdge::new(water, ch1, RelationType::MentionedIn, ""))
            .expect("edge");
        graph
    }

    fn export(graph: &Graph) -> Snapshot {
        GraphExporter::export(graph, &ExportScope::AllGraph, &StoreConfig::default())
            .expect("export")
    }

    #[test]
    fn restore_into_fresh_store_reproduces_graph() {
        let snapshot = export(&scenario());

        // Offset ids so old and new ids cannot coincide.
        let mut target = Graph::new();
        for i in 0..10 {
            target
                .create_node(NodeData::Concept(Concept::named(format!("noise{i}"))))
                .expect("create");
        }

        let report = GraphRestorer::restore(&mut target, &snapshot).expect("restore");
        assert_eq!(report.nodes_created, 3);
        assert_eq!(report.edges_created, 2);
        assert_eq!(report.edges_skipped, 0);
        assert_eq!(target.node_count().expect("count"), 3);
        assert!(target
            .find_by_key(&NaturalKey::concept("Water"))
            .map(|ids| ids.len() == 1)
            .expect("find"));
    }

    #[test]
    fn edge_with_unknown_endpoint_is_skipped() {
        let mut snapshot = export(&scenario());
        snapshot.relationships.details[0].target_name = "Ghost".into();
        let ghost_id = snapshot.relationships.details[0].target_id;

        let mut target = Graph::new();
        let report = GraphRestorer::restore(&mut target, &snapshot).expect("restore");

        assert_eq!(report.nodes_created, 3);
        assert_eq!(report.edges_created, 1);
        assert_eq!(report.edges_skipped, 1);
        assert!(report.unmapped_ids.contains(&ghost_id));
    }

    #[test]
    fn unknown_relationship_type_is_skipped() {
        let mut snapshot = export(&scenario());
        snapshot.relationships.details[1].relationship_type = "INSPIRED_BY".into();

        let report = GraphRestorer::restore(&mut Graph::new(), &snapshot).expect("restore");
        assert_eq!(report.edges_created, 1);
        assert_eq!(report.edges_skipped, 1);
    }

    #[test]
    fn shared_natural_key_degrades_to_first_match() {
        let mut snapshot = export(&scenario());
        let mut twin = snapshot.nodes.concepts[0].clone();
        twin.id = 100;
        snapshot.nodes.concepts.push(twin);

        let mut target = Graph::new();
        let report = GraphRestorer::restore(&mut target, &snapshot).expect("restore");

        assert_eq!(report.nodes_created, 4);
        assert_eq!(report.edges_created, 2);
        assert_eq!(report.ambiguous, vec!["Concept(Water)".to_string()]);
    }

    #[test]
    fn legacy_records_without_scope_still_resolve() {
        let mut snapshot = export(&scenario());
        for record in &mut snapshot.relationships.details {
            record.source_scope = None;
            record.target_scope = None;
        }

        let report = GraphRestorer::restore(&mut Graph::new(), &snapshot).expect("restore");
        assert_eq!(report.edges_created, 2);
    }

    #[test]
    fn invalid_snapshot_leaves_store_untouched() {
        let mut snapshot = export(&scenario());
        snapshot
            .nodes
            .concepts
            .push(NodeRecord::new(0, Label::Concept, Concept::named("Dup")));

        let mut target = scenario();
        assert!(matches!(
            GraphRestorer::restore(&mut target, &snapshot),
            Err(GraphError::MalformedSnapshot(_))
        ));
        assert_eq!(target.node_count().expect("count"), 3);
    }
}
