//! # Core Type Definitions
//!
//! This module contains the identifier, label and error types shared by every
//! part of the engine:
//! - Store-assigned identifiers (`NodeId`, `EdgeId`)
//! - Entity kinds (`Label`) and the closed relationship vocabulary (`RelationType`)
//! - Natural keys used for entity resolution (`NaturalKey`)
//! - Error types (`GraphError`)
//!
//! Entity records themselves live in the [`entity`] submodule.
//!
//! ## Identifier Guarantees
//!
//! `NodeId` and `EdgeId` are transient: they are assigned by a store at
//! creation time and are NOT portable across a dump/restore cycle. Only the
//! natural key survives a restore.

pub mod entity;

use crate::primitives::{KEY_INDEX_SEPARATOR, MAX_KEY_LENGTH};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use entity::{
    Chapter, ChapterMention, Concept, Course, Edge, NewEdge, NodeData, Provenance, Segment,
    StoredNode, TaggedText,
};

// =============================================================================
// TRANSIENT IDENTIFIERS
// =============================================================================

/// Store-assigned identifier of a node.
///
/// Valid only inside the store instance that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Store-assigned identifier of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// LABELS
// =============================================================================

/// The kind of entity a node represents.
///
/// Ordering is significant: restore plants nodes in `Label` order so that
/// courses exist before chapters and concepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Label {
    Course,
    Chapter,
    Concept,
}

impl Label {
    /// All labels in planting order.
    pub const ALL: [Label; 3] = [Label::Course, Label::Chapter, Label::Concept];

    /// The label as it appears in backup files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Label::Course => "Course",
            Label::Chapter => "Chapter",
            Label::Concept => "Concept",
        }
    }

    /// Stable single-byte tag used by the persistent key index.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Label::Course => 0,
            Label::Chapter => 1,
            Label::Concept => 2,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Course" => Ok(Label::Course),
            "Chapter" => Ok(Label::Chapter),
            "Concept" => Ok(Label::Concept),
            other => Err(GraphError::InvalidKey(format!("unknown label: {other}"))),
        }
    }
}

// =============================================================================
// RELATIONSHIP TYPES
// =============================================================================

/// The closed set of relationship kinds an edge may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    RelatesTo,
    PartOf,
    IsA,
    PrerequisiteFor,
    ExampleOf,
    ContrastsWith,
    EvolvedFrom,
    UsedIn,
    MentionedIn,
}

impl RelationType {
    /// Every relationship type, in declaration order.
    pub const ALL: [RelationType; 9] = [
        RelationType::RelatesTo,
        RelationType::PartOf,
        RelationType::IsA,
        RelationType::PrerequisiteFor,
        RelationType::ExampleOf,
        RelationType::ContrastsWith,
        RelationType::EvolvedFrom,
        RelationType::UsedIn,
        RelationType::MentionedIn,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RelationType::RelatesTo => "RELATES_TO",
            RelationType::PartOf => "PART_OF",
            RelationType::IsA => "IS_A",
            RelationType::PrerequisiteFor => "PREREQUISITE_FOR",
            RelationType::ExampleOf => "EXAMPLE_OF",
            RelationType::ContrastsWith => "CONTRASTS_WITH",
            RelationType::EvolvedFrom => "EVOLVED_FROM",
            RelationType::UsedIn => "USED_IN",
            RelationType::MentionedIn => "MENTIONED_IN",
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationType {
    type Err = GraphError;

    /// Parses the wire name. Surrounding whitespace and case are ignored,
    /// since model output is not reliably normalised.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| GraphError::InvalidKey(format!("unknown relationship type: {s}")))
    }
}

// =============================================================================
// NATURAL KEY
// =============================================================================

/// Business identity of a node: label + key, optionally scoped.
///
/// - Course: `name`
/// - Concept: `name` (global across courses)
/// - Chapter: `title`, scoped by the owning course name
///
/// A chapter key without scope is legal for lookups; it matches the title in
/// any course (see [`crate::resolver::EntityResolver`]).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NaturalKey {
    pub label: Label,
    pub key: String,
    pub scope: Option<String>,
}

impl NaturalKey {
    #[must_use]
    pub fn course(name: impl Into<String>) -> Self {
        Self {
            label: Label::Course,
            key: name.into(),
            scope: None,
        }
    }

    #[must_use]
    pub fn concept(name: impl Into<String>) -> Self {
        Self {
            label: Label::Concept,
            key: name.into(),
            scope: None,
        }
    }

    #[must_use]
    pub fn chapter(course: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            label: Label::Chapter,
            key: title.into(),
            scope: Some(course.into()),
        }
    }

    /// Build a key from a label and raw key with no scope.
    #[must_use]
    pub fn unscoped(label: Label, key: impl Into<String>) -> Self {
        Self {
            label,
            key: key.into(),
            scope: None,
        }
    }

    /// Validate key constraints: non-empty and bounded.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.key.trim().is_empty() {
            return Err(GraphError::InvalidKey(format!(
                "empty natural key for {}",
                self.label
            )));
        }
        if self.key.len() > MAX_KEY_LENGTH {
            return Err(GraphError::InvalidKey(format!(
                "natural key for {} exceeds {} bytes",
                self.label, MAX_KEY_LENGTH
            )));
        }
        if self.key.contains(KEY_INDEX_SEPARATOR)
            || self
                .scope
                .as_deref()
                .is_some_and(|s| s.contains(KEY_INDEX_SEPARATOR))
        {
            return Err(GraphError::InvalidKey(
                "natural key contains a reserved control character".to_string(),
            ));
        }
        Ok(())
    }

    /// Index entry for the exact (label, scope, key) identity.
    #[must_use]
    pub fn index_key(&self) -> String {
        match &self.scope {
            Some(scope) => format!(
                "{}{sep}{}{sep}{}",
                self.label.tag(),
                scope,
                self.key,
                sep = KEY_INDEX_SEPARATOR
            ),
            None => self.unscoped_index_key(),
        }
    }

    /// Index entry ignoring scope. Scoped nodes are indexed under both forms.
    #[must_use]
    pub fn unscoped_index_key(&self) -> String {
        format!(
            "{}{sep}{sep}{}",
            self.label.tag(),
            self.key,
            sep = KEY_INDEX_SEPARATOR
        )
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "{}({} / {})", self.label, scope, self.key),
            None => write!(f, "{}({})", self.label, self.key),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the engine.
///
/// Store failures abort the current operation; everything else concerns a
/// single entity and is counted as a skip when it happens inside a batch.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The store could not be reached, opened, or a transaction failed.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// An edge references an endpoint that cannot be found.
    #[error("Unresolved endpoint: {source_key} -> {target_key}")]
    UnresolvedEndpoint {
        source_key: String,
        target_key: String,
    },

    /// A backup file is structurally invalid.
    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    /// More than one node shares the same natural key.
    #[error("Ambiguous natural key {key}: {count} matches")]
    AmbiguousNaturalKey { key: NaturalKey, count: usize },

    /// A natural key, label or relationship type is not acceptable.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The node was not found in the store.
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A file system error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

impl GraphError {
    /// Whether this error must abort the surrounding batch.
    ///
    /// Per-entity problems (bad keys, missing endpoints, ambiguity) never do.
    #[must_use]
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            GraphError::StoreUnavailable(_)
                | GraphError::SerializationError(_)
                | GraphError::IoError(_)
        )
    }

    /// Whether retrying the same operation may succeed.
    ///
    /// Only an unreachable or locked store qualifies; codec and file errors
    /// are deterministic.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, GraphError::StoreUnavailable(_))
    }

    pub(crate) fn store(e: impl fmt::Display) -> Self {
        GraphError::StoreUnavailable(e.to_string())
    }

    pub(crate) fn codec(e: impl fmt::Display) -> Self {
        GraphError::SerializationError(e.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================
