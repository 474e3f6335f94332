//! # Entity Resolver
//!
//! Maps a natural key to an existing node. Never creates.

use crate::graph::GraphStore;
use crate::{GraphError, NaturalKey, NodeId};

/// Outcome of a natural-key lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Absent,
    Unique(NodeId),
    /// Several nodes share the key. Ids are in ascending order.
    Ambiguous(Vec<NodeId>),
}

impl Resolution {
    /// The node to use: the unique match, or the first of several.
    #[must_use]
    pub fn first(&self) -> Option<NodeId> {
        match self {
            Resolution::Absent => None,
            Resolution::Unique(id) => Some(*id),
            Resolution::Ambiguous(ids) => ids.first().copied(),
        }
    }

    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Resolution::Ambiguous(_))
    }
}

/// The EntityResolver answers "does this entity already exist?".
///
/// Store failures surface unchanged as errors; they are not retried here.
pub struct EntityResolver;

impl EntityResolver {
    /// Look up every node matching `key`.
    pub fn lookup<G: GraphStore>(graph: &G, key: &NaturalKey) -> Result<Resolution, GraphError> {
        key.validate()?;

        let mut ids = graph.find_by_key(key)?;
        Ok(match ids.len() {
            0 => Resolution::Absent,
            1 => Resolution::Unique(ids.remove(0)),
            _ => Resolution::Ambiguous(ids),
        })
    }

    /// Resolve `key` to a single node.
    ///
    /// Ambiguity degrades to first match with a warning.
    pub fn resolve<G: GraphStore>(
        graph: &G,
        key: &NaturalKey,
    ) -> Result<Option<NodeId>, GraphError> {
        let resolution = Self::lookup(graph, key)?;
        if let Resolution::Ambiguous(ids) = &resolution {
            let err = GraphError::AmbiguousNaturalKey {
                key: key.clone(),
                count: ids.len(),
            };
            tracing::warn!(error = %err, chosen = ?resolution.first(), "first match wins");
        }
        Ok(resolution.first())
    }

    /// Resolve `key`, failing if several nodes share it.
    pub fn resolve_strict<G: GraphStore>(
        graph: &G,
        key: &NaturalKey,
    ) -> Result<Option<NodeId>, GraphError> {
        match Self::lookup(graph, key)? {
            Resolution::Ambiguous(ids) => Err(GraphError::AmbiguousNaturalKey {
                key: key.clone(),
                count: ids.len(),
            }),
            other => Ok(other.first()),
        }
    }
}
