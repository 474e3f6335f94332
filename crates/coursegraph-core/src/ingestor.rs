//! # Ingestor Module
//!
//! Loads one chapter's extracted analysis into the graph.
//!
//! For a chapter of course `C`:
//! - `C` is created if absent and otherwise left untouched
//! - the chapter is upserted, with `Chapter PART_OF Course`
//! - each concept is upserted with its chapter mention and chapter-tagged
//!   definition/example, plus `Concept MENTIONED_IN Chapter` and
//!   `Concept PART_OF Course`
//! - concept relationships are created when both ends resolve
//!
//! Per-entity failures become skips in the returned [`BatchReport`]. Store
//! failures abort the chapter; re-running it is safe.

use crate::graph::GraphStore;
use crate::merge::MergePolicy;
use crate::primitives::{
    DENSIFY_MAX_CONCEPTS, DENSIFY_MIN_CONCEPTS, DENSIFY_MIN_DEFINED, MAX_CONCEPTS_PER_CHAPTER,
    SPARSE_RELATIONSHIP_THRESHOLD, UNTITLED_CHAPTER_PREFIX,
};
use crate::repair::repair_json;
use crate::upsert::{BatchReport, UpsertEngine, resolve_or_skip};
use crate::{
    Chapter, ChapterMention, Concept, Course, GraphError, NaturalKey, NodeData, NodeId,
    Provenance, RelationType, Segment, TaggedText,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// EXTRACTED INPUT
// =============================================================================

/// A concept as produced by the extraction pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedConcept {
    pub name: String,
    pub definition: String,
    pub example: String,
    pub questions: Vec<String>,
}

/// A relationship between two concepts, by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedRelationship {
    pub source: String,
    pub target: String,
    /// Wire name of a [`RelationType`]; parsed leniently.
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

/// The extraction result for one chapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChapterAnalysis {
    pub title: String,
    pub main_ideas: Vec<String>,
    pub concepts: Vec<ExtractedConcept>,
    pub relationships: Vec<ExtractedRelationship>,
}

impl ChapterAnalysis {
    /// Parse raw model output, repairing it where possible.
    pub fn from_model_output(text: &str) -> Result<Self, GraphError> {
        let value = repair_json(text)?;
        serde_json::from_value(value).map_err(GraphError::codec)
    }

    /// Give an untitled chapter the positional title `Chapter {position}`.
    ///
    /// Returns whether the title was filled in.
    pub fn ensure_title(&mut self, position: usize) -> bool {
        if !self.title.trim().is_empty() {
            return false;
        }
        self.title = format!("{UNTITLED_CHAPTER_PREFIX} {position}");
        true
    }
}

/// A concept described across all chapters of a course.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConceptSummary {
    pub name: String,
    pub definition: String,
    pub example: String,
    pub questions: Vec<String>,
    pub related_concepts: Vec<RelatedConcept>,
}

/// A relationship from a summarized concept to another concept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelatedConcept {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

// =============================================================================
// INGESTION
// =============================================================================

/// The ChapterIngest loads chapter analyses and concept summaries.
pub struct ChapterIngest;

impl ChapterIngest {
    /// Load one chapter of `course` into the graph.
    ///
    /// Fails only on store failures or an unusable course/chapter key.
    pub fn ingest<G: GraphStore>(
        graph: &mut G,
        engine: &UpsertEngine,
        course: &str,
        analysis: &ChapterAnalysis,
    ) -> Result<BatchReport, GraphError> {
        let course = course.trim();
        let title = analysis.title.trim();
        let mut report = BatchReport::new();

        let course_id = Self::ensure_course(graph, engine, course, &mut report)?;

        let chapter = engine.upsert_node(
            graph,
            NodeData::Chapter(Chapter {
                title: title.to_string(),
                course: course.to_string(),
                main_ideas: analysis.main_ideas.clone(),
            }),
            MergePolicy::Accumulate,
        )?;
        report.record_node(&chapter);
        let chapter_id = chapter.node;

        let outcome = engine.upsert_edge(
            graph,
            Some(chapter_id),
            Some(course_id),
            RelationType::PartOf,
            "",
        )?;
        report.record_edge(&outcome, format!("{title} PART_OF {course}"));

        // Concepts of this chapter, by name, for relationship resolution.
        let mut local: BTreeMap<String, NodeId> = BTreeMap::new();
        let mention_key = crate::types::entity::mention_key(course, title);

        for (index, extracted) in analysis.concepts.iter().enumerate() {
            let name = extracted.name.trim();
            if index >= MAX_CONCEPTS_PER_CHAPTER {
                report.skip(name, "chapter concept limit reached");
                continue;
            }

            let concept = Self::concept_from_chapter(course, title, &mention_key, name, extracted);
            let outcome = match engine.upsert_node(
                graph,
                NodeData::Concept(concept),
                MergePolicy::Accumulate,
            ) {
                Ok(outcome) => outcome,
                Err(e) if e.is_store_failure() => return Err(e),
                Err(e) => {
                    report.skip(if name.is_empty() { "<unnamed concept>" } else { name }, e);
                    continue;
                }
            };
            report.record_node(&outcome);
            local.insert(name.to_string(), outcome.node);

            let mentioned = engine.upsert_edge(
                graph,
                Some(outcome.node),
                Some(chapter_id),
                RelationType::MentionedIn,
                "",
            )?;
            report.record_edge(&mentioned, format!("{name} MENTIONED_IN {title}"));

            let part_of = engine.upsert_edge(
                graph,
                Some(outcome.node),
                Some(course_id),
                RelationType::PartOf,
                "",
            )?;
            report.record_edge(&part_of, format!("{name} PART_OF {course}"));
        }

        for rel in &analysis.relationships {
            let subject = format!("{} {} {}", rel.source.trim(), rel.kind, rel.target.trim());
            let kind = match rel.kind.parse::<RelationType>() {
                Ok(kind) => kind,
                Err(e) => {
                    report.skip(subject, e);
                    continue;
                }
            };

            let source = Self::concept_handle(graph, &local, &rel.source)?;
            let target = Self::concept_handle(graph, &local, &rel.target)?;
            if source.is_none() || target.is_none() {
                let err = GraphError::UnresolvedEndpoint {
                    source_key: rel.source.trim().to_string(),
                    target_key: rel.target.trim().to_string(),
                };
                report.skip(subject, err);
                continue;
            }

            let outcome = engine.upsert_edge(graph, source, target, kind, &rel.description)?;
            report.record_edge(&outcome, subject);
        }

        tracing::info!(course, chapter = title, %report, "chapter ingested");
        Ok(report)
    }

    /// Apply an all-chapters summary to a concept of `course`.
    ///
    /// The summary becomes the concept's `AiSummary` segment, replacing any
    /// earlier summary and leaving chapter-tagged segments intact.
    pub fn ingest_summary<G: GraphStore>(
        graph: &mut G,
        engine: &UpsertEngine,
        course: &str,
        summary: &ConceptSummary,
    ) -> Result<BatchReport, GraphError> {
        let course = course.trim();
        let name = summary.name.trim();
        let mut report = BatchReport::new();

        let course_id = Self::ensure_course(graph, engine, course, &mut report)?;

        let concept = Concept {
            name: name.to_string(),
            definition: TaggedText::single(Segment::new(
                Provenance::AiSummary,
                summary.definition.trim(),
            )),
            example: TaggedText::single(Segment::new(
                Provenance::AiSummary,
                summary.example.trim(),
            )),
            questions: summary.questions.clone(),
            chapters_mentions: BTreeMap::new(),
        };
        let outcome = match engine.upsert_node(graph, NodeData::Concept(concept), MergePolicy::Accumulate)
        {
            Ok(outcome) => outcome,
            Err(e) if e.is_store_failure() => return Err(e),
            Err(e) => {
                report.skip(name, e);
                return Ok(report);
            }
        };
        report.record_node(&outcome);

        let part_of = engine.upsert_edge(
            graph,
            Some(outcome.node),
            Some(course_id),
            RelationType::PartOf,
            "",
        )?;
        report.record_edge(&part_of, format!("{name} PART_OF {course}"));

        for related in &summary.related_concepts {
            let subject = format!("{name} {} {}", related.kind, related.name.trim());
            let kind = match related.kind.parse::<RelationType>() {
                Ok(kind) => kind,
                Err(e) => {
                    report.skip(subject, e);
                    continue;
                }
            };
            engine.upsert_edge_by_key(
                graph,
                &NaturalKey::concept(name),
                &NaturalKey::concept(related.name.trim()),
                kind,
                &related.description,
                &mut report,
            )?;
        }

        tracing::info!(course, concept = name, %report, "summary ingested");
        Ok(report)
    }

    /// Add `RELATES_TO` links among defined concepts of a sparse chapter.
    ///
    /// Applies only when the chapter has fewer than
    /// `SPARSE_RELATIONSHIP_THRESHOLD` relationships and more than
    /// `DENSIFY_MIN_CONCEPTS` concepts. Links every pair of the first
    /// `DENSIFY_MAX_CONCEPTS` concepts with a definition, skipping pairs already
    /// related in either direction. Returns the number of links added.
    pub fn densify_relationships(analysis: &mut ChapterAnalysis) -> usize {
        if analysis.relationships.len() >= SPARSE_RELATIONSHIP_THRESHOLD
            || analysis.concepts.len() <= DENSIFY_MIN_CONCEPTS
        {
            return 0;
        }

        let defined: Vec<String> = analysis
            .concepts
            .iter()
            .filter(|c| !c.definition.trim().is_empty() && !c.name.trim().is_empty())
            .map(|c| c.name.trim().to_string())
            .take(DENSIFY_MAX_CONCEPTS)
            .collect();
        if defined.len() < DENSIFY_MIN_DEFINED {
            return 0;
        }

        let mut linked: BTreeSet<(String, String)> = analysis
            .relationships
            .iter()
            .flat_map(|r| {
                let (s, t) = (r.source.trim().to_string(), r.target.trim().to_string());
                [(s.clone(), t.clone()), (t, s)]
            })
            .collect();

        let mut added = 0;
        for (i, source) in defined.iter().enumerate() {
            for target in &defined[i + 1..] {
                if linked.contains(&(source.clone(), target.clone())) {
                    continue;
                }
                analysis.relationships.push(ExtractedRelationship {
                    source: source.clone(),
                    target: target.clone(),
                    kind: RelationType::RelatesTo.as_str().to_string(),
                    description: format!(
                        "'{source}' and '{target}' are related within this chapter"
                    ),
                });
                linked.insert((source.clone(), target.clone()));
                linked.insert((target.clone(), source.clone()));
                added += 1;
            }
        }

        tracing::debug!(chapter = %analysis.title, added, "densified sparse chapter");
        added
    }

    fn ensure_course<G: GraphStore>(
        graph: &mut G,
        engine: &UpsertEngine,
        course: &str,
        report: &mut BatchReport,
    ) -> Result<NodeId, GraphError> {
        let outcome = engine.upsert_node(
            graph,
            NodeData::Course(Course {
                name: course.to_string(),
                description: String::new(),
            }),
            MergePolicy::KeepExisting,
        )?;
        report.record_node(&outcome);
        Ok(outcome.node)
    }

    fn concept_from_chapter(
        course: &str,
        title: &str,
        mention_key: &str,
        name: &str,
        extracted: &ExtractedConcept,
    ) -> Concept {
        let definition = extracted.definition.trim();
        let example = extracted.example.trim();

        let mut concept = Concept::named(name);
        concept.definition = TaggedText::single(Segment::from_chapter(course, title, definition));
        concept.example = TaggedText::single(Segment::from_chapter(course, title, example));
        concept.questions = extracted.questions.clone();
        concept.chapters_mentions.insert(
            mention_key.to_string(),
            ChapterMention {
                chapter_title: title.to_string(),
                definition: definition.to_string(),
                example: example.to_string(),
            },
        );
        concept
    }

    /// A concept of this chapter, or any concept already in the graph.
    fn concept_handle<G: GraphStore>(
        graph: &G,
        local: &BTreeMap<String, NodeId>,
        name: &str,
    ) -> Result<Option<NodeId>, GraphError> {
        let name = name.trim();
        if let Some(id) = local.get(name) {
            return Ok(Some(*id));
        }
        resolve_or_skip(graph, &NaturalKey::concept(name))
    }
}

// =============================================================================
// TESTS
// =============================================================================
