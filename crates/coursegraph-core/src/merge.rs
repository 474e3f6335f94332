//! # Attribute Merger
//!
//! Combines newly observed attribute values with an entity's accumulated ones.
//!
//! Per-attribute rules under [`MergePolicy::Accumulate`]:
//! - `definition`, `example`: tagged append. A segment from the same source
//!   replaces the previous one; a new source appends.
//! - `questions`, course `description`, chapter `main_ideas`: replace if absent.
//! - `chapters_mentions`: nested merge; only the incoming chapter keys are
//!   written, other entries are left alone.

use crate::{Chapter, Concept, Course, NodeData, Segment, TaggedText};
use serde::{Deserialize, Serialize};

/// How incoming attributes combine with an existing node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Accumulate per the per-attribute rules.
    #[default]
    Accumulate,
    /// Non-empty incoming values replace existing ones wholesale.
    Overwrite,
    /// Leave an existing node untouched.
    KeepExisting,
}

/// The AttributeMerger applies merge rules. Pure: never touches a store.
pub struct AttributeMerger;

impl AttributeMerger {
    /// Merge one tagged segment into accumulated text.
    ///
    /// Returns true if `current` changed.
    pub fn merge_segment(current: &mut TaggedText, incoming: Segment) -> bool {
        if incoming.text.trim().is_empty() {
            return false;
        }
        let incoming = Segment::new(incoming.source, incoming.text.trim());

        match current
            .segments
            .iter_mut()
            .find(|s| s.source == incoming.source)
        {
            Some(existing) if existing.text == incoming.text => false,
            Some(existing) => {
                existing.text = incoming.text;
                true
            }
            None => {
                current.segments.push(incoming);
                true
            }
        }
    }

    /// Merge every segment of `incoming` into `current`.
    pub fn merge_tagged(current: &mut TaggedText, incoming: TaggedText) -> bool {
        let mut changed = false;
        for segment in incoming.segments {
            changed |= Self::merge_segment(current, segment);
        }
        changed
    }

    /// Set `current` to `incoming` only if `current` is empty.
    pub fn replace_if_absent<T: PartialEq + Default>(current: &mut T, incoming: T) -> bool {
        if *current != T::default() || incoming == T::default() {
            return false;
        }
        *current = incoming;
        true
    }

    /// Set `current` to `incoming` unless `incoming` is empty.
    fn overwrite<T: PartialEq + Default>(current: &mut T, incoming: T) -> bool {
        if incoming == T::default() || *current == incoming {
            return false;
        }
        *current = incoming;
        true
    }

    /// Merge a concept. Names are assumed equal.
    pub fn merge_concept(current: &mut Concept, incoming: Concept, policy: MergePolicy) -> bool {
        let mut changed = false;
        match policy {
            MergePolicy::KeepExisting => return false,
            MergePolicy::Accumulate => {
                changed |= Self::merge_tagged(&mut current.definition, incoming.definition);
                changed |= Self::merge_tagged(&mut current.example, incoming.example);
                changed |= Self::replace_if_absent(&mut current.questions, incoming.questions);
            }
            MergePolicy::Overwrite => {
                changed |= Self::overwrite(&mut current.definition, incoming.definition);
                changed |= Self::overwrite(&mut current.example, incoming.example);
                changed |= Self::overwrite(&mut current.questions, incoming.questions);
            }
        }
        for (key, mention) in incoming.chapters_mentions {
            if current.chapters_mentions.get(&key) != Some(&mention) {
                current.chapters_mentions.insert(key, mention);
                changed = true;
            }
        }
        changed
    }

    pub fn merge_course(current: &mut Course, incoming: Course, policy: MergePolicy) -> bool {
        match policy {
            MergePolicy::KeepExisting => false,
            MergePolicy::Accumulate => {
                Self::replace_if_absent(&mut current.description, incoming.description)
            }
            MergePolicy::Overwrite => Self::overwrite(&mut current.description, incoming.description),
        }
    }

    pub fn merge_chapter(current: &mut Chapter, incoming: Chapter, policy: MergePolicy) -> bool {
        match policy {
            MergePolicy::KeepExisting => false,
            MergePolicy::Accumulate => {
                Self::replace_if_absent(&mut current.main_ideas, incoming.main_ideas)
            }
            MergePolicy::Overwrite => Self::overwrite(&mut current.main_ideas, incoming.main_ideas),
        }
    }

    /// Merge node attributes of the same label. Mismatched labels never merge.
    pub fn merge_node(current: &mut NodeData, incoming: NodeData, policy: MergePolicy) -> bool {
        match (current, incoming) {
            (NodeData::Course(c), NodeData::Course(i)) => Self::merge_course(c, i, policy),
            (NodeData::Chapter(c), NodeData::Chapter(i)) => Self::merge_chapter(c, i, policy),
            (NodeData::Concept(c), NodeData::Concept(i)) => Self::merge_concept(c, i, policy),
            _ => false,
        }
    }
}
