//! # Engine Primitives
//!
//! Compile-time constants shared across the engine: key limits, text tags,
//! backup format identifiers and batch bounds.

// =============================================================================
// KEYS
// =============================================================================

/// Maximum length of a natural key in bytes.
///
/// Longer names are rejected rather than truncated, so two distinct names
/// can never collapse onto the same key.
pub const MAX_KEY_LENGTH: usize = 512;

/// Separator used inside persistent key-index entries.
///
/// A control character that cannot appear in a validated natural key.
pub const KEY_INDEX_SEPARATOR: char = '\u{1f}';

/// Separator between course name and chapter title in `chapters_mentions` keys.
pub const MENTION_KEY_SEPARATOR: &str = " :: ";

// =============================================================================
// ACCUMULATED TEXT
// =============================================================================

/// Separator placed between rendered segments (a blank line).
pub const SEGMENT_SEPARATOR: &str = "\n\n";

/// Tag rendered in front of the generated all-chapters summary.
pub const AI_SUMMARY_TAG: &str = "AI analysis";

// =============================================================================
// BACKUP FORMAT
// =============================================================================

/// Version written into backup metadata.
pub const SNAPSHOT_VERSION: &str = "1.0";

/// Backup versions this build can restore.
pub const SUPPORTED_SNAPSHOT_VERSIONS: &[&str] = &["1.0"];

/// Top-level keys every backup file must carry.
pub const SNAPSHOT_REQUIRED_KEYS: [&str; 3] = ["metadata", "nodes", "relationships"];

/// Maximum backup file size accepted by the parser (500 MB).
///
/// Checked before deserialization so a corrupt file cannot exhaust memory.
pub const MAX_SNAPSHOT_SIZE: usize = 500 * 1024 * 1024;

// =============================================================================
// BATCH BOUNDS
// =============================================================================

/// Default number of records fetched per page when walking the store.
pub const DEFAULT_PAGE_SIZE: usize = 500;

/// Maximum number of concepts accepted in one chapter analysis.
pub const MAX_CONCEPTS_PER_CHAPTER: usize = 10_000;

/// Title prefix for chapters whose analysis carries no title.
pub const UNTITLED_CHAPTER_PREFIX: &str = "Chapter";

/// Below this many relationships a chapter is considered sparse.
pub const SPARSE_RELATIONSHIP_THRESHOLD: usize = 10;

/// A sparse chapter is densified only if it has more concepts than this.
pub const DENSIFY_MIN_CONCEPTS: usize = 5;

/// Densification never links more than this many concepts.
pub const DENSIFY_MAX_CONCEPTS: usize = 10;

/// Densification needs at least this many defined concepts.
pub const DENSIFY_MIN_DEFINED: usize = 3;
