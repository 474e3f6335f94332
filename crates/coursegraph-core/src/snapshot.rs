//! # Snapshot Format
//!
//! The JSON backup document written by the exporter and consumed by the
//! restorer.
//!
//! ```text
//! {
//!   "metadata": { "created_at", "store_uri", "version" },
//!   "nodes": { "courses": [..], "chapters": [..], "concepts": [..] },
//!   "relationships": { "summary": [{ "type", "count" }], "details": [..] }
//! }
//! ```
//!
//! Node records carry the exporting store's transient id. Edge records carry
//! both transient ids and the endpoints' natural keys; only the natural keys
//! are meaningful to a different store.

use crate::primitives::{
    MAX_SNAPSHOT_SIZE, SNAPSHOT_REQUIRED_KEYS, SNAPSHOT_VERSION, SUPPORTED_SNAPSHOT_VERSIONS,
};
use crate::{Chapter, Concept, Course, GraphError, Label, NaturalKey, RelationType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// DOCUMENT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// RFC 3339 timestamp.
    pub created_at: String,
    pub store_uri: String,
    pub version: String,
}

/// A node as exported: transient id, labels and typed properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord<T> {
    pub id: u64,
    pub labels: Vec<String>,
    pub properties: T,
}

impl<T> NodeRecord<T> {
    #[must_use]
    pub fn new(id: u64, label: Label, properties: T) -> Self {
        Self {
            id,
            labels: vec![label.as_str().to_string()],
            properties,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotNodes {
    #[serde(default)]
    pub courses: Vec<NodeRecord<Course>>,
    #[serde(default)]
    pub chapters: Vec<NodeRecord<Chapter>>,
    #[serde(default)]
    pub concepts: Vec<NodeRecord<Concept>>,
}

/// Count of edges of one type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCount {
    #[serde(rename = "type")]
    pub kind: String,
    pub count: usize,
}

/// One exported edge with both endpoints' identities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source_id: u64,
    pub source_name: String,
    pub source_labels: Vec<String>,
    /// Course of a chapter endpoint. Absent in older backups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_scope: Option<String>,
    pub target_id: u64,
    pub target_name: String,
    pub target_labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_scope: Option<String>,
    pub relationship_type: String,
    #[serde(default)]
    pub description: String,
}

impl EdgeRecord {
    /// Natural key of the source endpoint, if its labels name a known kind.
    #[must_use]
    pub fn source_key(&self) -> Option<NaturalKey> {
        endpoint_key(&self.source_labels, &self.source_name, self.source_scope.as_deref())
    }

    #[must_use]
    pub fn target_key(&self) -> Option<NaturalKey> {
        endpoint_key(&self.target_labels, &self.target_name, self.target_scope.as_deref())
    }

    pub fn kind(&self) -> Result<RelationType, GraphError> {
        self.relationship_type.parse()
    }
}

fn endpoint_key(labels: &[String], name: &str, scope: Option<&str>) -> Option<NaturalKey> {
    let label = labels.iter().find_map(|l| l.parse::<Label>().ok())?;
    Some(NaturalKey {
        label,
        key: name.to_string(),
        scope: scope.map(str::to_string),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRelationships {
    #[serde(default)]
    pub summary: Vec<TypeCount>,
    #[serde(default)]
    pub details: Vec<EdgeRecord>,
}

/// A complete backup document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub metadata: SnapshotMetadata,
    pub nodes: SnapshotNodes,
    pub relationships: SnapshotRelationships,
}

// =============================================================================
// CONSTRUCTION AND VALIDATION
// =============================================================================

impl Snapshot {
    /// An empty snapshot stamped with the current time.
    #[must_use]
    pub fn empty(store_uri: impl Into<String>) -> Self {
        Self {
            metadata: SnapshotMetadata {
                created_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                store_uri: store_uri.into(),
                version: SNAPSHOT_VERSION.to_string(),
            },
            nodes: SnapshotNodes::default(),
            relationships: SnapshotRelationships::default(),
        }
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.courses.len() + self.nodes.chapters.len() + self.nodes.concepts.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.relationships.details.len()
    }

    /// Recompute `relationships.summary` from the edge details.
    pub fn refresh_summary(&mut self) {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for edge in &self.relationships.details {
            *counts.entry(edge.relationship_type.as_str()).or_default() += 1;
        }
        self.relationships.summary = counts
            .into_iter()
            .map(|(kind, count)| TypeCount {
                kind: kind.to_string(),
                count,
            })
            .collect();
    }

    /// Every transient node id, in document order.
    fn node_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.nodes
            .courses
            .iter()
            .map(|r| r.id)
            .chain(self.nodes.chapters.iter().map(|r| r.id))
            .chain(self.nodes.concepts.iter().map(|r| r.id))
    }

    /// Structural checks: supported version, unique node ids.
    pub fn validate(&self) -> Result<(), GraphError> {
        if !SUPPORTED_SNAPSHOT_VERSIONS.contains(&self.metadata.version.as_str()) {
            return Err(GraphError::MalformedSnapshot(format!(
                "unsupported version: {}",
                self.metadata.version
            )));
        }

        let mut seen = BTreeSet::new();
        for id in self.node_ids() {
            if !seen.insert(id) {
                return Err(GraphError::MalformedSnapshot(format!(
                    "duplicate node id: {id}"
                )));
            }
        }
        Ok(())
    }

    /// Parse and validate a backup document.
    ///
    /// Any problem is reported as `MalformedSnapshot`, before a caller has
    /// had a chance to touch the store.
    pub fn from_json(text: &str) -> Result<Self, GraphError> {
        if text.len() > MAX_SNAPSHOT_SIZE {
            return Err(GraphError::MalformedSnapshot(format!(
                "backup exceeds {MAX_SNAPSHOT_SIZE} bytes"
            )));
        }

        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| GraphError::MalformedSnapshot(format!("invalid JSON: {e}")))?;
        let Some(object) = value.as_object() else {
            return Err(GraphError::MalformedSnapshot(
                "top level is not an object".to_string(),
            ));
        };
        for key in SNAPSHOT_REQUIRED_KEYS {
            if !object.contains_key(key) {
                return Err(GraphError::MalformedSnapshot(format!(
                    "missing required key: {key}"
                )));
            }
        }

        let snapshot: Snapshot = serde_json::from_value(value)
            .map_err(|e| GraphError::MalformedSnapshot(e.to_string()))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn to_json_pretty(&self) -> Result<String, GraphError> {
        serde_json::to_string_pretty(self).map_err(GraphError::codec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Snapshot {
        let mut snapshot = Snapshot::empty("redb://test");
        snapshot.nodes.courses.push(NodeRecord::new(
            0,
            Label::Course,
            Course {
                name: "C1".into(),
                description: String::new(),
            },
        ));
        snapshot
            .nodes
            .concepts
            .push(NodeRecord::new(1, Label::Concept, Concept::named("Water")));
        snapshot.relationships.details.push(EdgeRecord {
            source_id: 1,
            source_name: "Water".into(),
            source_labels: vec!["Concept".into()],
            source_scope: None,
            target_id: 0,
            target_name: "C1".into(),
            target_labels: vec!["Course".into()],
            target_scope: None,
            relationship_type: "PART_OF".into(),
            description: String::new(),
        });
        snapshot.refresh_summary();
        snapshot
    }

    #[test]
    fn written_document_parses_back() {
        let snapshot = sample();
        let json = snapshot.to_json_pretty().expect("json");
        let parsed = Snapshot::from_json(&json).expect("parse");

        assert_eq!(parsed.node_count(), 2);
        assert_eq!(parsed.edge_count(), 1);
        assert_eq!(parsed.relationships.summary[0].kind, "PART_OF");
        assert!(!json.contains("source_scope"));
    }

    #[test]
    fn missing_top_level_key_is_malformed() {
        let err = Snapshot::from_json(r#"{"metadata": {}, "nodes": {}}"#).expect_err("malformed");
        assert!(matches!(err, GraphError::MalformedSnapshot(msg) if msg.contains("relationships")));
    }

    #[test]
    fn invalid_json_is_malformed() {
        assert!(matches!(
            Snapshot::from_json("{not json"),
            Err(GraphError::MalformedSnapshot(_))
        ));
    }

    #[test]
    fn duplicate_node_ids_are_malformed() {
        let mut snapshot = sample();
        snapshot.nodes.concepts[0].id = 0;
        assert!(matches!(
            snapshot.validate(),
            Err(GraphError::MalformedSnapshot(_))
        ));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut snapshot = sample();
        snapshot.metadata.version = "9.9".into();
        let json = snapshot.to_json_pretty().expect("json");
        assert!(Snapshot::from_json(&json).is_err());
    }

    #[test]
    fn endpoint_key_uses_first_known_label() {
        let record = &sample().relationships.details[0];
        assert_eq!(record.source_key(), Some(NaturalKey::concept("Water")));
        assert_eq!(record.target_key(), Some(NaturalKey::course("C1")));
        assert_eq!(record.kind().expect("kind"), RelationType::PartOf);
    }
}
