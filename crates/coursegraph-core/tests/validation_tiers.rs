//! # Validation Tier Tests (T0-T4)
//!
//! End-to-end behaviour of the engine against both stores.
//!
//! ## Tiers
//! - T0: Entity Resolution
//! - T1: Upsert Idempotence
//! - T2: Attribute Accumulation
//! - T3: Relationship Deduplication
//! - T4: Backup and Restore

use coursegraph_core::{
    ChapterAnalysis, ChapterIngest, Concept, Course, EntityResolver, ExportScope,
    ExtractedConcept, ExtractedRelationship, Graph, GraphError, GraphExporter, GraphRestorer,
    GraphStore, Label, MergePolicy, NaturalKey, NodeData, RedbGraph, RelationType, Segment,
    Snapshot, StoreConfig, TaggedText, UpsertEngine,
};

fn concept(name: &str, chapter: &str, definition: &str) -> NodeData {
    let mut c = Concept::named(name);
    c.definition = TaggedText::single(Segment::from_chapter("C1", chapter, definition));
    NodeData::Concept(c)
}

fn course(name: &str) -> NodeData {
    NodeData::Course(Course {
        name: name.into(),
        description: String::new(),
    })
}

fn concept_data<G: GraphStore>(graph: &G, name: &str) -> Concept {
    let id = EntityResolver::resolve(graph, &NaturalKey::concept(name))
        .expect("resolve")
        .expect("concept exists");
    match graph.get_node(id).expect("get").map(|n| n.data) {
        Some(NodeData::Concept(c)) => c,
        other => unreachable!("expected concept, got {other:?}"),
    }
}

/// Course C1, Chapter Ch1 of C1, Concept Water (PART_OF C1, MENTIONED_IN Ch1).
fn water_scenario<G: GraphStore>(graph: &mut G) {
    let engine = UpsertEngine::default();
    let c1 = engine
        .upsert_node(graph, course("C1"), MergePolicy::KeepExisting)
        .expect("course")
        .node;
    let ch1 = engine
        .upsert_node(
            graph,
            NodeData::Chapter(coursegraph_core::Chapter {
                title: "Ch1".into(),
                course: "C1".into(),
                main_ideas: vec![],
            }),
            MergePolicy::Accumulate,
        )
        .expect("chapter")
        .node;
    let water = engine
        .upsert_node(graph, concept("Water", "Ch1", "H2O"), MergePolicy::Accumulate)
        .expect("concept")
        .node;
    engine
        .upsert_edge(graph, Some(water), Some(c1), RelationType::PartOf, "")
        .expect("edge");
    engine
        .upsert_edge(graph, Some(water), Some(ch1), RelationType::MentionedIn, "")
        .expect("edge");
}

// =============================================================================
// TIER T0: ENTITY RESOLUTION
// =============================================================================

mod t0_entity_resolution {
    use super::*;

    /// T0.1: Absent keys resolve to nothing and are never created.
    #[test]
    fn absent_key_resolves_to_none() {
        let graph = Graph::new();
        let found = EntityResolver::resolve(&graph, &NaturalKey::concept("Water")).expect("resolve");
        assert!(found.is_none());
        assert_eq!(graph.node_count().expect("count"), 0);
    }

    /// T0.2: The same name under different labels is a different entity.
    #[test]
    fn labels_partition_the_key_space() {
        let mut graph = Graph::new();
        let engine = UpsertEngine::default();
        engine
            .upsert_node(&mut graph, course("Water"), MergePolicy::Accumulate)
            .expect("course");
        engine
            .upsert_node(&mut graph, concept("Water", "A", "H2O"), MergePolicy::Accumulate)
            .expect("concept");

        assert_eq!(graph.node_count().expect("count"), 2);
    }

    /// T0.3: Chapter titles are unique per course, not globally.
    #[test]
    fn chapter_titles_scope_by_course() {
        let mut graph = Graph::new();
        let engine = UpsertEngine::default();
        for course_name in ["C1", "C2"] {
            let analysis = ChapterAnalysis {
                title: "Introduction".into(),
                ..ChapterAnalysis::default()
            };
            ChapterIngest::ingest(&mut graph, &engine, course_name, &analysis).expect("ingest");
        }

        assert_eq!(graph.nodes_with_label(Label::Chapter).expect("scan").len(), 2);
    }

    /// T0.4: Empty keys are rejected.
    #[test]
    fn empty_key_rejected() {
        let graph = Graph::new();
        assert!(matches!(
            EntityResolver::resolve(&graph, &NaturalKey::course("")),
            Err(GraphError::InvalidKey(_))
        ));
    }
}

// =============================================================================
// TIER T1: UPSERT IDEMPOTENCE
// =============================================================================

mod t1_upsert_idempotence {
    use super::*;

    /// T1.1: Upserting the same entity twice yields one node.
    #[test]
    fn same_upsert_twice_creates_once() {
        let mut graph = Graph::new();
        let engine = UpsertEngine::default();

        let first = engine
            .upsert_node(&mut graph, concept("Water", "A", "D1"), MergePolicy::Accumulate)
            .expect("first");
        let second = engine
            .upsert_node(&mut graph, concept("Water", "A", "D1"), MergePolicy::Accumulate)
            .expect("second");

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(graph.node_count().expect("count"), 1);
    }

    /// T1.2: Re-running a whole chapter changes nothing (persistent store).
    #[test]
    fn chapter_rerun_is_a_no_op_on_disk() {
        let temp = tempfile::tempdir().expect("temp dir");
        let mut graph = RedbGraph::open(temp.path().join("graph.redb")).expect("open");
        let engine = UpsertEngine::default();
        let analysis = ChapterAnalysis {
            title: "Ch1".into(),
            main_ideas: vec!["idea".into()],
            concepts: vec![ExtractedConcept {
                name: "Water".into(),
                definition: "H2O".into(),
                ..ExtractedConcept::default()
            }],
            relationships: vec![],
        };

        ChapterIngest::ingest(&mut graph, &engine, "C1", &analysis).expect("first");
        let report = ChapterIngest::ingest(&mut graph, &engine, "C1", &analysis).expect("second");

        assert_eq!(report.created + report.updated + report.edges_created, 0);
        assert_eq!(graph.node_count().expect("count"), 3);
        assert_eq!(graph.edge_count().expect("count"), 3);
    }
}

// =============================================================================
// TIER T2: ATTRIBUTE ACCUMULATION
// =============================================================================

mod t2_attribute_accumulation {
    use super::*;

    /// T2.1: Definitions from two chapters accumulate as distinct segments,
    /// and repeating the first does not duplicate it.
    #[test]
    fn definitions_accumulate_without_duplication() {
        let mut graph = Graph::new();
        let engine = UpsertEngine::default();

        for (chapter, definition) in [("Chapter A", "D1"), ("Chapter B", "D2"), ("Chapter A", "D1")] {
            engine
                .upsert_node(
                    &mut graph,
                    concept("Water", chapter, definition),
                    MergePolicy::Accumulate,
                )
                .expect("upsert");
        }

        let water = concept_data(&graph, "Water");
        assert_eq!(water.definition.segments().len(), 2);
        assert_eq!(water.definition.render(), "[Chapter A] D1\n\n[Chapter B] D2");
    }

    /// T2.2: Re-processing a chapter overwrites only that chapter's mention.
    #[test]
    fn mentions_are_per_chapter() {
        let mut graph = Graph::new();
        let engine = UpsertEngine::default();
        let chapter = |title: &str, definition: &str| ChapterAnalysis {
            title: title.into(),
            concepts: vec![ExtractedConcept {
                name: "Water".into(),
                definition: definition.into(),
                ..ExtractedConcept::default()
            }],
            ..ChapterAnalysis::default()
        };

        ChapterIngest::ingest(&mut graph, &engine, "C1", &chapter("Ch1", "old")).expect("ingest");
        ChapterIngest::ingest(&mut graph, &engine, "C1", &chapter("Ch2", "other")).expect("ingest");
        ChapterIngest::ingest(&mut graph, &engine, "C1", &chapter("Ch1", "new")).expect("ingest");

        let water = concept_data(&graph, "Water");
        assert_eq!(water.chapters_mentions.len(), 2);
        assert_eq!(water.chapters_mentions["C1 :: Ch1"].definition, "new");
        assert_eq!(water.chapters_mentions["C1 :: Ch2"].definition, "other");
    }
}

// =============================================================================
// TIER T3: RELATIONSHIP DEDUPLICATION
// =============================================================================

mod t3_relationship_dedup {
    use super::*;

    /// T3.1: (X RELATES_TO Y) then (Y RELATES_TO X) yields one edge.
    #[test]
    fn reverse_relates_to_is_deduplicated() {
        let mut graph = Graph::new();
        let engine = UpsertEngine::default();
        let analysis = ChapterAnalysis {
            title: "Ch1".into(),
            concepts: ["X", "Y"]
                .iter()
                .map(|n| ExtractedConcept {
                    name: (*n).into(),
                    ..ExtractedConcept::default()
                })
                .collect(),
            relationships: vec![
                ExtractedRelationship {
                    source: "X".into(),
                    target: "Y".into(),
                    kind: "RELATES_TO".into(),
                    description: String::new(),
                },
                ExtractedRelationship {
                    source: "Y".into(),
                    target: "X".into(),
                    kind: "RELATES_TO".into(),
                    description: String::new(),
                },
            ],
            ..ChapterAnalysis::default()
        };

        let report = ChapterIngest::ingest(&mut graph, &engine, "C1", &analysis).expect("ingest");
        assert_eq!(report.edges_duplicate, 1);

        let x = EntityResolver::resolve(&graph, &NaturalKey::concept("X"))
            .expect("resolve")
            .expect("x");
        let y = EntityResolver::resolve(&graph, &NaturalKey::concept("Y"))
            .expect("resolve")
            .expect("y");
        assert_eq!(graph.edges_between(x, y).expect("between").len(), 1);
    }

    /// T3.2: A reversed relationship of a different type is kept by default.
    #[test]
    fn reverse_of_different_type_is_kept() {
        let mut graph = Graph::new();
        let engine = UpsertEngine::default();
        let a = engine
            .upsert_node(&mut graph, concept("A", "Ch", "a"), MergePolicy::Accumulate)
            .expect("a")
            .node;
        let b = engine
            .upsert_node(&mut graph, concept("B", "Ch", "b"), MergePolicy::Accumulate)
            .expect("b")
            .node;

        engine
            .upsert_edge(&mut graph, Some(a), Some(b), RelationType::PrerequisiteFor, "")
            .expect("edge");
        let outcome = engine
            .upsert_edge(&mut graph, Some(b), Some(a), RelationType::ExampleOf, "")
            .expect("edge");

        assert!(outcome.created());
        assert_eq!(graph.edge_count().expect("count"), 2);
    }
}

// =============================================================================
// TIER T4: BACKUP AND RESTORE
// =============================================================================

mod t4_backup_restore {
    use super::*;

    /// T4.1: The C1/Ch1/Water scenario survives export, file and restore.
    #[test]
    fn water_scenario_round_trip() {
        let mut source = Graph::new();
        water_scenario(&mut source);
        let config = StoreConfig::default();

        let snapshot =
            GraphExporter::export(&source, &ExportScope::AllGraph, &config).expect("export");
        assert_eq!(snapshot.node_count(), 3);
        assert_eq!(snapshot.edge_count(), 2);

        let json = snapshot.to_json_pretty().expect("json");
        let parsed = Snapshot::from_json(&json).expect("parse");

        let temp = tempfile::tempdir().expect("temp dir");
        let mut target = RedbGraph::open(temp.path().join("restored.redb")).expect("open");
        let report = GraphRestorer::restore(&mut target, &parsed).expect("restore");

        assert_eq!(report.nodes_created, 3);
        assert_eq!(report.edges_created, 2);
        assert_eq!(target.node_count().expect("count"), 3);
        assert_eq!(target.edge_count().expect("count"), 2);
        assert!(EntityResolver::resolve(&target, &NaturalKey::concept("Water"))
            .expect("resolve")
            .is_some());
    }

    /// T4.2: With unique keys, N nodes and M edges restore to N and M.
    #[test]
    fn restore_fidelity_under_matched_keys() {
        let mut source = Graph::new();
        let engine = UpsertEngine::default();
        let mut analysis = ChapterAnalysis {
            title: "Ch1".into(),
            concepts: (0..8)
                .map(|i| ExtractedConcept {
                    name: format!("K{i}"),
                    definition: "defined".into(),
                    ..ExtractedConcept::default()
                })
                .collect(),
            ..ChapterAnalysis::default()
        };
        ChapterIngest::densify_relationships(&mut analysis);
        ChapterIngest::ingest(&mut source, &engine, "C1", &analysis).expect("ingest");

        let n = source.node_count().expect("count");
        let m = source.edge_count().expect("count");
        let snapshot = GraphExporter::export(&source, &ExportScope::AllGraph, &StoreConfig::default())
            .expect("export");

        let mut target = Graph::new();
        let report = GraphRestorer::restore(&mut target, &snapshot).expect("restore");
        assert_eq!(report.nodes_created, n);
        assert_eq!(report.edges_created, m);
        assert_eq!(target.node_count().expect("count"), n);
        assert_eq!(target.edge_count().expect("count"), m);
    }

    /// T4.3: One edge whose endpoint key is missing restores M-1 edges.
    #[test]
    fn restore_degrades_under_missing_key() {
        let mut source = Graph::new();
        water_scenario(&mut source);
        let mut snapshot =
            GraphExporter::export(&source, &ExportScope::AllGraph, &StoreConfig::default())
                .expect("export");
        let m = snapshot.edge_count();

        // Point one edge at a concept that was never exported.
        let record = snapshot
            .relationships
            .details
            .iter_mut()
            .find(|r| r.relationship_type == "MENTIONED_IN")
            .expect("mention edge");
        record.source_id = 999;
        record.source_name = "Steam".into();

        let mut target = Graph::new();
        let report = GraphRestorer::restore(&mut target, &snapshot).expect("restore");

        assert_eq!(report.nodes_created, 3);
        assert_eq!(report.edges_created, m - 1);
        assert_eq!(report.edges_skipped, 1);
        assert!(report.unmapped_ids.contains(&999));
    }

    /// T4.4: A malformed backup is rejected before anything is wiped.
    #[test]
    fn malformed_backup_aborts_before_wipe() {
        let result = Snapshot::from_json(r#"{"metadata": {}, "relationships": {}}"#);
        assert!(matches!(result, Err(GraphError::MalformedSnapshot(_))));
    }

    /// T4.5: A course-scoped export restores as a self-contained graph.
    #[test]
    fn course_export_restores() {
        let mut source = Graph::new();
        water_scenario(&mut source);
        let engine = UpsertEngine::default();
        engine
            .upsert_node(&mut source, course("Unrelated"), MergePolicy::Accumulate)
            .expect("course");

        let snapshot = GraphExporter::export(
            &source,
            &ExportScope::Course("C1".into()),
            &StoreConfig::default(),
        )
        .expect("export");
        assert_eq!(snapshot.node_count(), 3);

        let mut target = Graph::new();
        let report = GraphRestorer::restore(&mut target, &snapshot).expect("restore");
        assert_eq!(report.edges_created, 2);
        assert!(EntityResolver::resolve(&target, &NaturalKey::course("Unrelated"))
            .expect("resolve")
            .is_none());
    }
}
