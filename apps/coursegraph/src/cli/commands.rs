//! # CLI Command Implementations
//!
//! Each `cmd_*` opens the store described by the configuration, performs one
//! operation and prints the outcome, as text or as JSON in `--json-mode`.

use crate::backup::{list_backups, read_backup, write_backup};
use crate::config::AppConfig;
use coursegraph_core::{
    BatchReport, ChapterAnalysis, ChapterIngest, ConceptSummary, Course, CourseStats,
    EntityResolver, ExportScope, GraphError, GraphExporter, GraphMetrics, GraphRestorer,
    GraphStore, Label, MergePolicy, NaturalKey, NodeData, RedbGraph, UpsertEngine, repair_json,
};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a chapter analysis or summary file (100 MB).
const MAX_INGEST_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), GraphError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| GraphError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(GraphError::IoError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize an input path and ensure it is a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, GraphError> {
    let canonical = path.canonicalize().map_err(|e| {
        GraphError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(GraphError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Canonicalize the parent directory of an output path.
fn validate_output_path(path: &Path) -> Result<PathBuf, GraphError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        GraphError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(GraphError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| GraphError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

/// Read a UTF-8 input file after path and size checks.
fn read_input(path: &Path) -> Result<String, GraphError> {
    let validated = validate_file_path(path)?;
    validate_file_size(&validated, MAX_INGEST_FILE_SIZE)?;
    std::fs::read_to_string(&validated)
        .map_err(|e| GraphError::IoError(format!("Read '{}': {}", path.display(), e)))
}

fn print_json(value: &impl serde::Serialize) -> Result<(), GraphError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| GraphError::SerializationError(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Open the configured store, retrying while it is locked or unreachable.
pub fn open_store(config: &AppConfig) -> Result<RedbGraph, GraphError> {
    config
        .store
        .retry
        .run(|| RedbGraph::open_with(&config.store))
}

/// Ask on stdin; only a literal `yes` confirms.
pub fn confirm(prompt: &str) -> Result<bool, GraphError> {
    let stdin = std::io::stdin();
    confirm_with(prompt, &mut stdin.lock())
}

/// Ask `prompt`, reading the answer from `input`.
pub fn confirm_with(prompt: &str, input: &mut impl BufRead) -> Result<bool, GraphError> {
    print!("{} Type 'yes' to continue: ", prompt);
    std::io::stdout()
        .flush()
        .map_err(|e| GraphError::IoError(e.to_string()))?;

    let mut answer = String::new();
    input
        .read_line(&mut answer)
        .map_err(|e| GraphError::IoError(e.to_string()))?;
    Ok(answer.trim() == "yes")
}

/// Export the whole graph into a timestamped backup inside `dir`.
fn backup_graph(graph: &RedbGraph, config: &AppConfig, dir: &Path) -> Result<PathBuf, GraphError> {
    let snapshot = GraphExporter::export(graph, &ExportScope::AllGraph, &config.store)?;
    write_backup(dir, &snapshot)
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new database.
pub fn cmd_init(config: &AppConfig, force: bool) -> Result<(), GraphError> {
    let path = &config.store.path;
    if path.exists() {
        if !force {
            return Err(GraphError::IoError(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(path)
            .map_err(|e| GraphError::IoError(format!("Remove '{}': {}", path.display(), e)))?;
    }

    let _graph = open_store(config)?;
    println!("Initialized new database at {:?}", path);
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show node and relationship counts.
pub fn cmd_status(config: &AppConfig, json_mode: bool) -> Result<(), GraphError> {
    let graph = open_store(config)?;
    let metrics = GraphMetrics::collect(&graph)?;

    if json_mode {
        return print_json(&serde_json::json!({
            "database": config.store.path.to_string_lossy(),
            "store_uri": config.store.store_uri(),
            "node_count": metrics.node_count,
            "edge_count": metrics.edge_count,
            "nodes_by_label": metrics.nodes_by_label,
            "edges_by_type": metrics.edges_by_type,
        }));
    }

    println!("Course Graph Status");
    println!("===================");
    println!("Database: {:?}", config.store.path);
    println!();
    println!("Nodes:         {}", metrics.node_count);
    for label in Label::ALL {
        println!("  {:<12} {}", label.as_str(), metrics.count_of(label));
    }
    println!("Relationships: {}", metrics.edge_count);
    for (kind, count) in &metrics.edges_by_type {
        println!("  {:<17} {}", kind.as_str(), count);
    }

    Ok(())
}

// =============================================================================
// COURSE COMMAND
// =============================================================================

/// Create a course, or fill in its description if it has none.
pub fn cmd_create_course(config: &AppConfig, name: &str, description: &str) -> Result<(), GraphError> {
    let mut graph = open_store(config)?;
    let engine = UpsertEngine::from_config(&config.store);

    let course = NodeData::Course(Course {
        name: name.trim().to_string(),
        description: description.trim().to_string(),
    });
    let outcome = engine.upsert_node(&mut graph, course, MergePolicy::Accumulate)?;

    let verb = if outcome.created {
        "Created"
    } else if outcome.updated {
        "Updated"
    } else {
        "Unchanged"
    };
    println!("{} course '{}'", verb, name.trim());
    Ok(())
}

// =============================================================================
// INGEST COMMANDS
// =============================================================================

/// Ingest chapter analysis files into `course`.
///
/// A file that cannot be read, parsed even after repair, or ingested for a
/// reason other than a store failure is recorded as skipped; the remaining
/// files are still ingested. Untitled chapters are named by position.
pub fn cmd_ingest(
    config: &AppConfig,
    json_mode: bool,
    course: &str,
    files: &[PathBuf],
    densify: bool,
) -> Result<(), GraphError> {
    let mut graph = open_store(config)?;
    let engine = UpsertEngine::from_config(&config.store);
    let mut total = BatchReport::new();

    for (index, file) in files.iter().enumerate() {
        let parsed = read_input(file).and_then(|text| ChapterAnalysis::from_model_output(&text));
        let mut analysis = match parsed {
            Ok(analysis) => analysis,
            Err(e) => {
                total.skip(file.display().to_string(), e);
                continue;
            }
        };

        if analysis.ensure_title(index + 1) {
            tracing::warn!(file = %file.display(), title = %analysis.title, "untitled chapter");
        }

        if densify {
            let added = ChapterIngest::densify_relationships(&mut analysis);
            if added > 0 {
                tracing::info!(chapter = %analysis.title, added, "densified sparse chapter");
            }
        }

        let result = config
            .store
            .retry
            .run(|| ChapterIngest::ingest(&mut graph, &engine, course, &analysis));
        let report = match result {
            Ok(report) => report,
            Err(e) if e.is_store_failure() => return Err(e),
            Err(e) => {
                total.skip(file.display().to_string(), e);
                continue;
            }
        };
        tracing::info!(file = %file.display(), chapter = %analysis.title, %report, "chapter ingested");
        total.absorb(report);
    }

    print_report(json_mode, &total)
}

/// Apply concept summaries to `course`.
pub fn cmd_summarize(
    config: &AppConfig,
    json_mode: bool,
    course: &str,
    file: &Path,
) -> Result<(), GraphError> {
    let value = repair_json(&read_input(file)?)?;
    let summaries: Vec<ConceptSummary> = if value.is_array() {
        serde_json::from_value(value)
    } else {
        serde_json::from_value(value).map(|summary| vec![summary])
    }
    .map_err(|e| GraphError::SerializationError(e.to_string()))?;

    let mut graph = open_store(config)?;
    let engine = UpsertEngine::from_config(&config.store);
    let mut total = BatchReport::new();

    for summary in &summaries {
        let result = config
            .store
            .retry
            .run(|| ChapterIngest::ingest_summary(&mut graph, &engine, course, summary));
        match result {
            Ok(report) => total.absorb(report),
            Err(e) if e.is_store_failure() => return Err(e),
            Err(e) => total.skip(summary.name.clone(), e),
        }
    }

    print_report(json_mode, &total)
}

fn print_report(json_mode: bool, report: &BatchReport) -> Result<(), GraphError> {
    if json_mode {
        return print_json(report);
    }

    println!("{}", report);
    for item in &report.skipped {
        println!("  skipped: {}", item);
    }
    Ok(())
}

// =============================================================================
// SHOW COMMAND
// =============================================================================

/// Show a concept with its chapter mentions and relationships.
pub fn cmd_show(config: &AppConfig, json_mode: bool, name: &str) -> Result<(), GraphError> {
    let graph = open_store(config)?;
    let key = NaturalKey::concept(name.trim());

    let id = EntityResolver::resolve(&graph, &key)?
        .ok_or_else(|| GraphError::InvalidKey(format!("Unknown concept: {}", key)))?;
    let node = graph.get_node(id)?.ok_or(GraphError::NodeNotFound(id))?;
    let NodeData::Concept(concept) = node.data else {
        return Err(GraphError::InvalidKey(format!("Not a concept: {}", key)));
    };

    let mut relationships = Vec::new();
    for edge in graph.edges_of(id)? {
        let Some(other) = edge.other_end(id) else {
            continue;
        };
        let other = graph.get_node(other)?;
        let (label, other_name) = other
            .map(|n| (n.data.label().as_str(), n.data.name().to_string()))
            .unwrap_or(("?", String::new()));
        relationships.push(serde_json::json!({
            "type": edge.kind.as_str(),
            "direction": if edge.source == id { "outgoing" } else { "incoming" },
            "label": label,
            "name": other_name,
            "description": edge.description,
        }));
    }

    if json_mode {
        return print_json(&serde_json::json!({
            "name": concept.name,
            "definition": concept.definition.render(),
            "example": concept.example.render(),
            "questions": concept.questions,
            "chapters_mentions": concept.chapters_mentions,
            "relationships": relationships,
        }));
    }

    println!("Concept: {}", concept.name);
    println!();
    println!("Definition:\n{}", concept.definition.render());
    if !concept.example.is_empty() {
        println!();
        println!("Example:\n{}", concept.example.render());
    }
    if !concept.questions.is_empty() {
        println!();
        println!("Questions:");
        for question in &concept.questions {
            println!("  - {}", question);
        }
    }
    println!();
    println!("Mentioned in {} chapter(s):", concept.chapters_mentions.len());
    for mention in concept.chapters_mentions.keys() {
        println!("  - {}", mention);
    }
    println!();
    println!("Relationships ({}):", relationships.len());
    for rel in &relationships {
        let arrow = if rel["direction"] == "outgoing" { "->" } else { "<-" };
        println!(
            "  {} {} {}({})",
            rel["type"].as_str().unwrap_or_default(),
            arrow,
            rel["label"].as_str().unwrap_or_default(),
            rel["name"].as_str().unwrap_or_default()
        );
    }

    Ok(())
}

// =============================================================================
// STATS COMMAND
// =============================================================================

/// Concept coverage per course.
pub fn cmd_stats(config: &AppConfig, json_mode: bool, course: Option<&str>) -> Result<(), GraphError> {
    let graph = open_store(config)?;

    let stats = match course {
        Some(name) => vec![
            CourseStats::for_course(&graph, name)?
                .ok_or_else(|| GraphError::InvalidKey(format!("Unknown course: {}", name)))?,
        ],
        None => CourseStats::all(&graph)?,
    };

    if json_mode {
        return print_json(&stats);
    }

    if stats.is_empty() {
        println!("No courses.");
        return Ok(());
    }

    for s in &stats {
        println!("Course: {}", s.course);
        println!("  Concepts:             {}", s.concept_count);
        println!(
            "  With definition:      {} ({}.{}%)",
            s.defined_count,
            s.defined_per_mille / 10,
            s.defined_per_mille % 10
        );
        println!("  Concept relationships: {}", s.concept_relationships);
        for (kind, count) in &s.relationships_by_type {
            println!("    {:<17} {}", kind.as_str(), count);
        }
        if !s.undefined_sample.is_empty() {
            println!("  Missing definitions:  {}", s.undefined_sample.join(", "));
        }
        println!();
    }

    Ok(())
}

// =============================================================================
// EXPORT AND BACKUP COMMANDS
// =============================================================================

/// Export the graph, or one course, to `output`.
pub fn cmd_export(config: &AppConfig, output: &Path, course: Option<&str>) -> Result<(), GraphError> {
    let validated_output = validate_output_path(output)?;
    let graph = open_store(config)?;

    let scope = match course {
        Some(name) => ExportScope::Course(name.trim().to_string()),
        None => ExportScope::AllGraph,
    };
    let snapshot = GraphExporter::export(&graph, &scope, &config.store)?;

    if let ExportScope::Course(name) = &scope
        && snapshot.nodes.courses.is_empty()
    {
        return Err(GraphError::InvalidKey(format!("Unknown course: {}", name)));
    }

    let json = snapshot.to_json_pretty()?;
    std::fs::write(&validated_output, &json)
        .map_err(|e| GraphError::IoError(format!("Write file: {}", e)))?;

    println!(
        "Exported {} nodes and {} relationships to {:?}",
        snapshot.node_count(),
        snapshot.edge_count(),
        validated_output
    );
    Ok(())
}

/// Write a timestamped backup of the whole graph.
pub fn cmd_backup(config: &AppConfig) -> Result<PathBuf, GraphError> {
    let graph = open_store(config)?;
    let path = backup_graph(&graph, config, &config.backup.dir)?;
    println!("Backup written to {:?}", path);
    Ok(path)
}

/// List backups, newest first.
pub fn cmd_list_backups(config: &AppConfig, json_mode: bool) -> Result<(), GraphError> {
    let backups = list_backups(&config.backup.dir)?;

    if json_mode {
        return print_json(&backups);
    }

    if backups.is_empty() {
        println!("No backups in {:?}", config.backup.dir);
        return Ok(());
    }

    println!("Backups in {:?} (newest first):", config.backup.dir);
    for (i, backup) in backups.iter().enumerate() {
        let name = backup
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match (&backup.created_at, backup.nodes, backup.edges) {
            (Some(created), Some(nodes), Some(edges)) => println!(
                "  {}. {}  {}  {} nodes, {} relationships, {} KB",
                i + 1,
                name,
                created,
                nodes,
                edges,
                backup.size_bytes / 1024
            ),
            _ => println!("  {}. {}  (unreadable)", i + 1, name),
        }
    }

    Ok(())
}

// =============================================================================
// RESTORE AND CLEAR COMMANDS
// =============================================================================

/// Replace the graph with the contents of a backup.
///
/// The backup is validated before anything else happens; a safety backup of
/// the current graph is taken before the wipe unless disabled.
pub fn cmd_restore(
    config: &AppConfig,
    json_mode: bool,
    file: &Path,
    force: bool,
    safety_backup: bool,
) -> Result<(), GraphError> {
    let path = validate_file_path(file)?;
    let snapshot = read_backup(&path)?;
    println!(
        "Backup {:?}: {} nodes, {} relationships, created {}",
        path,
        snapshot.node_count(),
        snapshot.edge_count(),
        snapshot.metadata.created_at
    );

    let mut graph = open_store(config)?;

    if safety_backup && config.backup.safety_backup_before_restore {
        let safety = backup_graph(&graph, config, &config.backup.safety_dir())?;
        println!("Safety backup written to {:?}", safety);
    }

    if !force {
        let prompt = format!(
            "This deletes all {} nodes and {} relationships currently in the graph.",
            graph.node_count()?,
            graph.edge_count()?
        );
        if !confirm(&prompt)? {
            println!("Restore cancelled.");
            return Ok(());
        }
    }

    let report = GraphRestorer::restore(&mut graph, &snapshot)?;

    if json_mode {
        return print_json(&report);
    }

    println!("Restore complete: {}", report);
    if !report.ambiguous.is_empty() {
        println!("  ambiguous keys (first match used): {}", report.ambiguous.join(", "));
    }
    Ok(())
}

/// Delete every node and relationship.
pub fn cmd_clear(config: &AppConfig, force: bool) -> Result<(), GraphError> {
    let mut graph = open_store(config)?;
    let nodes = graph.node_count()?;
    let edges = graph.edge_count()?;

    if !force {
        let prompt = format!(
            "This deletes all {} nodes and {} relationships.",
            nodes, edges
        );
        if !confirm(&prompt)? {
            println!("Clear cancelled.");
            return Ok(());
        }
    }

    graph.clear()?;
    graph.compact()?;
    tracing::info!(nodes, edges, "graph cleared");
    println!("Deleted {} nodes and {} relationships.", nodes, edges);
    Ok(())
}
