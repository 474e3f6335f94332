//! # redb-backed Graph Storage
//!
//! A disk-backed graph store using the redb embedded database.
//!
//! Layout:
//! - `nodes`: NodeId -> postcard-encoded `NodeData`
//! - `edges`: EdgeId -> postcard-encoded `Edge`
//! - `key_index` (multimap): natural-key index entry -> NodeId
//! - `adjacency` (multimap): NodeId -> incident EdgeId
//! - `metadata`: id counters
//!
//! Every create/update commits its own write transaction, so a crash leaves
//! the store consistent at single node/edge granularity.

use crate::config::StoreConfig;
use crate::graph::{GraphStore, check_same_identity, index_entries};
use crate::{Edge, EdgeId, GraphError, NaturalKey, NewEdge, NodeData, NodeId, StoredNode};
use redb::{
    Database, MultimapTableDefinition, ReadableDatabase, ReadableTable,
    ReadableTableMetadata, TableDefinition,
};
use std::path::Path;

/// Table for nodes: NodeId(u64) -> serialized NodeData bytes
const NODES: TableDefinition<u64, &[u8]> = TableDefinition::new("nodes");

/// Table for edges: EdgeId(u64) -> serialized Edge bytes
const EDGES: TableDefinition<u64, &[u8]> = TableDefinition::new("edges");

/// Natural key index: index entry -> NodeId(u64), possibly several
const KEY_INDEX: MultimapTableDefinition<&str, u64> = MultimapTableDefinition::new("key_index");

/// Incidence: NodeId(u64) -> EdgeId(u64)
const ADJACENCY: MultimapTableDefinition<u64, u64> = MultimapTableDefinition::new("adjacency");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const NEXT_NODE_ID: &str = "next_node_id";
const NEXT_EDGE_ID: &str = "next_edge_id";

/// A disk-backed graph store using redb.
pub struct RedbGraph {
    db: Database,
    next_node_id: u64,
    next_edge_id: u64,
}

impl std::fmt::Debug for RedbGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbGraph")
            .field("next_node_id", &self.next_node_id)
            .field("next_edge_id", &self.next_edge_id)
            .finish_non_exhaustive()
    }
}

impl RedbGraph {
    /// Open or create a graph database at the given path.
    ///
    /// Fails with `StoreUnavailable` if the file is held by another process.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let db = Database::create(path.as_ref()).map_err(GraphError::store)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(GraphError::store)?;
            let _ = write_txn.open_table(NODES).map_err(GraphError::store)?;
            let _ = write_txn.open_table(EDGES).map_err(GraphError::store)?;
            let _ = write_txn
                .open_multimap_table(KEY_INDEX)
                .map_err(GraphError::store)?;
            let _ = write_txn
                .open_multimap_table(ADJACENCY)
                .map_err(GraphError::store)?;
            let _ = write_txn.open_table(METADATA).map_err(GraphError::store)?;
            write_txn.commit().map_err(GraphError::store)?;
        }

        let (next_node_id, next_edge_id) = {
            let read_txn = db.begin_read().map_err(GraphError::store)?;
            let table = read_txn.open_table(METADATA).map_err(GraphError::store)?;
            let read = |key: &str| -> Result<u64, GraphError> {
                Ok(table
                    .get(key)
                    .map_err(GraphError::store)?
                    .map(|v| v.value())
                    .unwrap_or(0))
            };
            (read(NEXT_NODE_ID)?, read(NEXT_EDGE_ID)?)
        };

        tracing::debug!(path = %path.as_ref().display(), next_node_id, next_edge_id, "opened redb store");

        Ok(Self {
            db,
            next_node_id,
            next_edge_id,
        })
    }

    /// Open the store described by `config`.
    pub fn open_with(config: &StoreConfig) -> Result<Self, GraphError> {
        Self::open(&config.path)
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), GraphError> {
        self.db.compact().map_err(GraphError::store)?;
        Ok(())
    }

    fn decode_node(bytes: &[u8]) -> Result<NodeData, GraphError> {
        postcard::from_bytes(bytes).map_err(GraphError::codec)
    }

    fn decode_edge(bytes: &[u8]) -> Result<Edge, GraphError> {
        postcard::from_bytes(bytes).map_err(GraphError::codec)
    }

    fn load_edges(&self, ids: &[u64]) -> Result<Vec<Edge>, GraphError> {
        let read_txn = self.db.begin_read().map_err(GraphError::store)?;
        let table = read_txn.open_table(EDGES).map_err(GraphError::store)?;

        let mut edges = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(data) = table.get(*id).map_err(GraphError::store)? {
                edges.push(Self::decode_edge(data.value())?);
            }
        }
        Ok(edges)
    }

    fn incident_ids(&self, node: NodeId) -> Result<Vec<u64>, GraphError> {
        let read_txn = self.db.begin_read().map_err(GraphError::store)?;
        let table = read_txn
            .open_multimap_table(ADJACENCY)
            .map_err(GraphError::store)?;

        let mut ids = Vec::new();
        for entry in table.get(node.0).map_err(GraphError::store)? {
            ids.push(entry.map_err(GraphError::store)?.value());
        }
        Ok(ids)
    }

    fn contains_node(&self, id: NodeId) -> Result<bool, GraphError> {
        let read_txn = self.db.begin_read().map_err(GraphError::store)?;
        let table = read_txn.open_table(NODES).map_err(GraphError::store)?;
        Ok(table.get(id.0).map_err(GraphError::store)?.is_some())
    }
}

// =============================================================================
// GRAPHSTORE TRAIT IMPLEMENTATION
// =============================================================================

impl GraphStore for RedbGraph {
    fn create_node(&mut self, data: NodeData) -> Result<NodeId, GraphError> {
        let key = data.natural_key();
        key.validate()?;

        let node_id = NodeId(self.next_node_id);
        let next = self.next_node_id.saturating_add(1);
        let bytes = postcard::to_allocvec(&data).map_err(GraphError::codec)?;

        let write_txn = self.db.begin_write().map_err(GraphError::store)?;
        {
            let mut nodes = write_txn.open_table(NODES).map_err(GraphError::store)?;
            nodes
                .insert(node_id.0, bytes.as_slice())
                .map_err(GraphError::store)?;

            let mut index = write_txn
                .open_multimap_table(KEY_INDEX)
                .map_err(GraphError::store)?;
            for entry in index_entries(&key) {
                index
                    .insert(entry.as_str(), node_id.0)
                    .map_err(GraphError::store)?;
            }

            let mut meta = write_txn.open_table(METADATA).map_err(GraphError::store)?;
            meta.insert(NEXT_NODE_ID, next).map_err(GraphError::store)?;
        }
        write_txn.commit().map_err(GraphError::store)?;

        // Update in-memory state only after successful commit.
        self.next_node_id = next;
        Ok(node_id)
    }

    fn update_node(&mut self, id: NodeId, data: NodeData) -> Result<(), GraphError> {
        let write_txn = self.db.begin_write().map_err(GraphError::store)?;
        {
            let mut nodes = write_txn.open_table(NODES).map_err(GraphError::store)?;
            let current = match nodes.get(id.0).map_err(GraphError::store)? {
                Some(existing) => Self::decode_node(existing.value())?,
                None => return Err(GraphError::NodeNotFound(id)),
            };
            check_same_identity(id, &current, &data)?;

            let bytes = postcard::to_allocvec(&data).map_err(GraphError::codec)?;
            nodes
                .insert(id.0, bytes.as_slice())
                .map_err(GraphError::store)?;
        }
        write_txn.commit().map_err(GraphError::store)?;
        Ok(())
    }

    fn get_node(&self, id: NodeId) -> Result<Option<StoredNode>, GraphError> {
        let read_txn = self.db.begin_read().map_err(GraphError::store)?;
        let table = read_txn.open_table(NODES).map_err(GraphError::store)?;

        match table.get(id.0).map_err(GraphError::store)? {
            Some(data) => Ok(Some(StoredNode {
                id,
                data: Self::decode_node(data.value())?,
            })),
            None => Ok(None),
        }
    }

    fn find_by_key(&self, key: &NaturalKey) -> Result<Vec<NodeId>, GraphError> {
        let read_txn = self.db.begin_read().map_err(GraphError::store)?;
        let table = read_txn
            .open_multimap_table(KEY_INDEX)
            .map_err(GraphError::store)?;

        let entry = key.index_key();
        let mut ids = Vec::new();
        for value in table.get(entry.as_str()).map_err(GraphError::store)? {
            ids.push(NodeId(value.map_err(GraphError::store)?.value()));
        }
        Ok(ids)
    }

    fn create_edge(&mut self, edge: NewEdge) -> Result<EdgeId, GraphError> {
        for endpoint in [edge.source, edge.target] {
            if !self.contains_node(endpoint)? {
                return Err(GraphError::NodeNotFound(endpoint));
            }
        }

        let edge_id = EdgeId(self.next_edge_id);
        let next = self.next_edge_id.saturating_add(1);
        let (source, target) = (edge.source, edge.target);
        let bytes =
            postcard::to_allocvec(&Edge::from_new(edge_id, edge)).map_err(GraphError::codec)?;

        let write_txn = self.db.begin_write().map_err(GraphError::store)?;
        {
            let mut edges = write_txn.open_table(EDGES).map_err(GraphError::store)?;
            edges
                .insert(edge_id.0, bytes.as_slice())
                .map_err(GraphError::store)?;

            let mut adjacency = write_txn
                .open_multimap_table(ADJACENCY)
                .map_err(GraphError::store)?;
            adjacency
                .insert(source.0, edge_id.0)
                .map_err(GraphError::store)?;
            adjacency
                .insert(target.0, edge_id.0)
                .map_err(GraphError::store)?;

            let mut meta = write_txn.open_table(METADATA).map_err(GraphError::store)?;
            meta.insert(NEXT_EDGE_ID, next).map_err(GraphError::store)?;
        }
        write_txn.commit().map_err(GraphError::store)?;

        self.next_edge_id = next;
        Ok(edge_id)
    }

    fn edges_between(&self, a: NodeId, b: NodeId) -> Result<Vec<Edge>, GraphError> {
        let ids = self.incident_ids(a)?;
        Ok(self
            .load_edges(&ids)?
            .into_iter()
            .filter(|e| e.other_end(a) == Some(b))
            .collect())
    }

    fn edges_of(&self, node: NodeId) -> Result<Vec<Edge>, GraphError> {
        let ids = self.incident_ids(node)?;
        self.load_edges(&ids)
    }

    fn nodes_page(
        &self,
        after: Option<NodeId>,
        limit: usize,
    ) -> Result<Vec<StoredNode>, GraphError> {
        let Some(start) = after.map_or(Some(0), |id| id.0.checked_add(1)) else {
            return Ok(Vec::new());
        };

        let read_txn = self.db.begin_read().map_err(GraphError::store)?;
        let table = read_txn.open_table(NODES).map_err(GraphError::store)?;

        let mut nodes = Vec::new();
        for entry in table.range(start..).map_err(GraphError::store)?.take(limit) {
            let (key, value) = entry.map_err(GraphError::store)?;
            nodes.push(StoredNode {
                id: NodeId(key.value()),
                data: Self::decode_node(value.value())?,
            });
        }
        Ok(nodes)
    }

    fn edges_page(&self, after: Option<EdgeId>, limit: usize) -> Result<Vec<Edge>, GraphError> {
        let Some(start) = after.map_or(Some(0), |id| id.0.checked_add(1)) else {
            return Ok(Vec::new());
        };

        let read_txn = self.db.begin_read().map_err(GraphError::store)?;
        let table = read_txn.open_table(EDGES).map_err(GraphError::store)?;

        let mut edges = Vec::new();
        for entry in table.range(start..).map_err(GraphError::store)?.take(limit) {
            let (_, value) = entry.map_err(GraphError::store)?;
            edges.push(Self::decode_edge(value.value())?);
        }
        Ok(edges)
    }

    fn node_count(&self) -> Result<usize, GraphError> {
        let read_txn = self.db.begin_read().map_err(GraphError::store)?;
        let table = read_txn.open_table(NODES).map_err(GraphError::store)?;
        let count = table.len().map_err(GraphError::store)?;
        Ok(count as usize)
    }

    fn edge_count(&self) -> Result<usize, GraphError> {
        let read_txn = self.db.begin_read().map_err(GraphError::store)?;
        let table = read_txn.open_table(EDGES).map_err(GraphError::store)?;
        let count = table.len().map_err(GraphError::store)?;
        Ok(count as usize)
    }

    fn clear(&mut self) -> Result<(), GraphError> {
        let write_txn = self.db.begin_write().map_err(GraphError::store)?;
        write_txn.delete_table(NODES).map_err(GraphError::store)?;
        write_txn.delete_table(EDGES).map_err(GraphError::store)?;
        write_txn
            .delete_multimap_table(KEY_INDEX)
            .map_err(GraphError::store)?;
        write_txn
            .delete_multimap_table(ADJACENCY)
            .map_err(GraphError::store)?;
        // Recreate empty tables; metadata counters survive the wipe.
        let _ = write_txn.open_table(NODES).map_err(GraphError::store)?;
        let _ = write_txn.open_table(EDGES).map_err(GraphError::store)?;
        let _ = write_txn
            .open_multimap_table(KEY_INDEX)
            .map_err(GraphError::store)?;
        let _ = write_txn
            .open_multimap_table(ADJACENCY)
            .map_err(GraphError::store)?;
        write_txn.commit().map_err(GraphError::store)?;

        tracing::info!("store cleared");
        Ok(())
    }
}
