//! # Graph Statistics
//!
//! Counts for reporting. All arithmetic is integer; shares are per-mille.

use crate::graph::GraphStore;
use crate::resolver::EntityResolver;
use crate::{GraphError, Label, NaturalKey, NodeData, RelationType};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Maximum number of undefined concept names listed per course.
pub const UNDEFINED_SAMPLE_SIZE: usize = 10;

/// Whole-graph counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphMetrics {
    pub node_count: usize,
    pub edge_count: usize,
    pub nodes_by_label: BTreeMap<Label, usize>,
    pub edges_by_type: BTreeMap<RelationType, usize>,
}

impl GraphMetrics {
    /// Compute metrics with one pass over nodes and edges.
    pub fn collect<G: GraphStore>(graph: &G) -> Result<Self, GraphError> {
        let mut metrics = Self::default();
        for node in graph.all_nodes()? {
            metrics.node_count += 1;
            *metrics.nodes_by_label.entry(node.data.label()).or_default() += 1;
        }
        for edge in graph.all_edges()? {
            metrics.edge_count += 1;
            *metrics.edges_by_type.entry(edge.kind).or_default() += 1;
        }
        Ok(metrics)
    }

    #[must_use]
    pub fn count_of(&self, label: Label) -> usize {
        self.nodes_by_label.get(&label).copied().unwrap_or(0)
    }
}

/// Concept coverage of one course.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CourseStats {
    pub course: String,
    /// Concepts with a `PART_OF` edge to the course.
    pub concept_count: usize,
    pub defined_count: usize,
    /// `defined_count / concept_count`, in thousandths.
    pub defined_per_mille: u64,
    /// Distinct edges between a course concept and another concept.
    pub concept_relationships: usize,
    pub relationships_by_type: BTreeMap<RelationType, usize>,
    /// First undefined concept names, sorted.
    pub undefined_sample: Vec<String>,
}

impl CourseStats {
    /// Statistics for `course`, or `None` if no such course exists.
    pub fn for_course<G: GraphStore>(graph: &G, course: &str) -> Result<Option<Self>, GraphError> {
        let Some(course_id) = EntityResolver::resolve(graph, &NaturalKey::course(course))? else {
            return Ok(None);
        };

        let mut stats = CourseStats {
            course: course.to_string(),
            ..Self::default()
        };
        let mut undefined = Vec::new();
        let mut members = BTreeSet::new();

        for edge in graph.edges_of(course_id)? {
            if edge.kind != RelationType::PartOf || edge.target != course_id {
                continue;
            }
            let Some(node) = graph.get_node(edge.source)? else {
                continue;
            };
            let NodeData::Concept(concept) = node.data else {
                continue;
            };
            if !members.insert(node.id) {
                continue;
            }
            stats.concept_count += 1;
            if concept.definition.is_empty() {
                undefined.push(concept.name);
            } else {
                stats.defined_count += 1;
            }
        }

        let mut counted = BTreeSet::new();
        for member in &members {
            for edge in graph.edges_of(*member)? {
                let Some(other) = edge.other_end(*member) else {
                    continue;
                };
                if other == *member || counted.contains(&edge.id) {
                    continue;
                }
                let is_concept = graph
                    .get_node(other)?
                    .is_some_and(|n| n.data.label() == Label::Concept);
                if is_concept {
                    counted.insert(edge.id);
                    *stats.relationships_by_type.entry(edge.kind).or_default() += 1;
                }
            }
        }
        stats.concept_relationships = counted.len();

        stats.defined_per_mille = if stats.concept_count > 0 {
            (stats.defined_count as u64).saturating_mul(1000) / (stats.concept_count as u64)
        } else {
            0
        };

        undefined.sort();
        undefined.truncate(UNDEFINED_SAMPLE_SIZE);
        stats.undefined_sample = undefined;

        Ok(Some(stats))
    }

    /// Statistics for every course, in course-name order.
    pub fn all<G: GraphStore>(graph: &G) -> Result<Vec<Self>, GraphError> {
        let mut names: Vec<String> = graph
            .nodes_with_label(Label::Course)?
            .into_iter()
            .map(|n| n.data.name().to_string())
            .collect();
        names.sort();
        names.dedup();

        let mut out = Vec::with_capacity(names.len());
        for name in names {
            if let Some(stats) = Self::for_course(graph, &name)? {
                out.push(stats);
            }
        }
        Ok(out)
    }
}
