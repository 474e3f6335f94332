//! # Entity Records
//!
//! Typed attribute records for each node kind, plus the edge record.
//!
//! Nested attributes (`chapters_mentions`, tagged definitions) are genuine
//! structured values here. They are never stored as JSON-encoded strings.

use super::{EdgeId, Label, NaturalKey, NodeId, RelationType};
use crate::primitives::{AI_SUMMARY_TAG, MENTION_KEY_SEPARATOR, SEGMENT_SEPARATOR};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// TAGGED TEXT
// =============================================================================

/// Where a piece of accumulated text came from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Observed while processing the chapter `title` of `course`. Chapter
    /// titles repeat across courses, so both are part of the identity.
    Chapter { course: String, title: String },
    /// The generated all-chapters summary. At most one per attribute.
    AiSummary,
    /// Legacy or hand-entered text with no known source.
    Untagged,
}

impl Provenance {
    /// Human-readable tag rendered in front of a segment.
    #[must_use]
    pub fn tag(&self) -> Option<String> {
        match self {
            Provenance::Chapter { title, .. } => Some(format!("[{title}]")),
            Provenance::AiSummary => Some(format!("[{AI_SUMMARY_TAG}]")),
            Provenance::Untagged => None,
        }
    }
}

/// One provenance-tagged piece of an accumulated attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub source: Provenance,
    pub text: String,
}

impl Segment {
    #[must_use]
    pub fn new(source: Provenance, text: impl Into<String>) -> Self {
        Self {
            source,
            text: text.into(),
        }
    }

    /// Segment attributed to chapter `title` of `course`.
    #[must_use]
    pub fn from_chapter(
        course: impl Into<String>,
        title: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let source = Provenance::Chapter {
            course: course.into(),
            title: title.into(),
        };
        Self::new(source, text)
    }
}

/// An accumulated text attribute: an ordered list of tagged segments.
///
/// Each provenance appears at most once; see
/// [`AttributeMerger::merge_tagged`](crate::merge::AttributeMerger::merge_tagged).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaggedText {
    pub(crate) segments: Vec<Segment>,
}

impl TaggedText {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Text holding a single segment. Empty text yields an empty value.
    #[must_use]
    pub fn single(segment: Segment) -> Self {
        if segment.text.trim().is_empty() {
            return Self::default();
        }
        Self {
            segments: vec![segment],
        }
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|s| s.text.trim().is_empty())
    }

    /// The segment contributed by `source`, if any.
    #[must_use]
    pub fn segment(&self, source: &Provenance) -> Option<&Segment> {
        self.segments.iter().find(|s| &s.source == source)
    }

    /// Render as display text: `[tag] text` blocks separated by a blank line.
    #[must_use]
    pub fn render(&self) -> String {
        self.segments
            .iter()
            .filter(|s| !s.text.trim().is_empty())
            .map(|s| match s.source.tag() {
                Some(tag) => format!("{tag} {}", s.text.trim()),
                None => s.text.trim().to_string(),
            })
            .collect::<Vec<_>>()
            .join(SEGMENT_SEPARATOR)
    }
}

// =============================================================================
// NODE RECORDS
// =============================================================================

/// A course. Natural key: `name`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Course {
    pub name: String,
    pub description: String,
}

/// A chapter. Natural key: `title`, unique within `course`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    /// Back-reference by course name, not ownership.
    pub course: String,
    pub main_ideas: Vec<String>,
}

impl Chapter {
    /// Key of this chapter's entry in a concept's `chapters_mentions`.
    #[must_use]
    pub fn mention_key(&self) -> String {
        mention_key(&self.course, &self.title)
    }
}

/// Key of a chapter inside `chapters_mentions`: course and title joined.
#[must_use]
pub fn mention_key(course: &str, title: &str) -> String {
    format!("{course}{MENTION_KEY_SEPARATOR}{title}")
}

/// What one chapter said about a concept.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChapterMention {
    pub chapter_title: String,
    pub definition: String,
    pub example: String,
}

/// A concept, shared by every course that mentions it. Natural key: `name`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Concept {
    pub name: String,
    pub definition: TaggedText,
    pub example: TaggedText,
    pub questions: Vec<String>,
    pub chapters_mentions: BTreeMap<String, ChapterMention>,
}

impl Concept {
    /// A bare concept with nothing accumulated yet.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Attributes of any node, discriminated by label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeData {
    Course(Course),
    Chapter(Chapter),
    Concept(Concept),
}

impl NodeData {
    #[must_use]
    pub fn label(&self) -> Label {
        match self {
            NodeData::Course(_) => Label::Course,
            NodeData::Chapter(_) => Label::Chapter,
            NodeData::Concept(_) => Label::Concept,
        }
    }

    #[must_use]
    pub fn natural_key(&self) -> NaturalKey {
        match self {
            NodeData::Course(c) => NaturalKey::course(&c.name),
            NodeData::Chapter(ch) => NaturalKey::chapter(&ch.course, &ch.title),
            NodeData::Concept(c) => NaturalKey::concept(&c.name),
        }
    }

    /// The display name: course/concept name or chapter title.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            NodeData::Course(c) => &c.name,
            NodeData::Chapter(ch) => &ch.title,
            NodeData::Concept(c) => &c.name,
        }
    }
}

/// A node as held by a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredNode {
    pub id: NodeId,
    pub data: NodeData,
}

// =============================================================================
// EDGES
// =============================================================================

/// An edge to be created. Edges are immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: RelationType,
    pub description: String,
}

impl NewEdge {
    #[must_use]
    pub fn new(
        source: NodeId,
        target: NodeId,
        kind: RelationType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            source,
            target,
            kind,
            description: description.into(),
        }
    }
}

/// A stored edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub kind: RelationType,
    pub description: String,
}

impl Edge {
    #[must_use]
    pub fn from_new(id: EdgeId, edge: NewEdge) -> Self {
        Self {
            id,
            source: edge.source,
            target: edge.target,
            kind: edge.kind,
            description: edge.description,
        }
    }

    /// The endpoint opposite `node`, if `node` is an endpoint.
    #[must_use]
    pub fn other_end(&self, node: NodeId) -> Option<NodeId> {
        if self.source == node {
            Some(self.target)
        } else if self.target == node {
            Some(self.source)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_tags_segments_and_skips_blank_ones() {
        let text = TaggedText {
            segments: vec![
                Segment::new(Provenance::Untagged, "legacy"),
                Segment::from_chapter("C1", "Chapter A", "D1"),
                Segment::from_chapter("C1", "Chapter B", "  "),
                Segment::new(Provenance::AiSummary, "summary"),
            ],
        };

        assert_eq!(
            text.render(),
            format!("legacy\n\n[Chapter A] D1\n\n[{AI_SUMMARY_TAG}] summary")
        );
    }

    #[test]
    fn single_with_blank_text_is_empty() {
        assert!(TaggedText::single(Segment::from_chapter("C1", "A", " ")).is_empty());
        assert!(!TaggedText::single(Segment::from_chapter("C1", "A", "x")).is_empty());
    }

    #[test]
    fn chapter_natural_key_is_scoped_by_course() {
        let data = NodeData::Chapter(Chapter {
            title: "Ch1".into(),
            course: "C1".into(),
            main_ideas: vec![],
        });
        assert_eq!(data.natural_key(), NaturalKey::chapter("C1", "Ch1"));
        assert_eq!(data.name(), "Ch1");
    }

    #[test]
    fn other_end_of_edge() {
        let edge = Edge::from_new(
            EdgeId(0),
            NewEdge::new(NodeId(1), NodeId(2), RelationType::IsA, ""),
        );
        assert_eq!(edge.other_end(NodeId(1)), Some(NodeId(2)));
        assert_eq!(edge.other_end(NodeId(2)), Some(NodeId(1)));
        assert_eq!(edge.other_end(NodeId(3)), None);
    }
}
