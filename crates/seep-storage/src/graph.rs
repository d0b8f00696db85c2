//! Graph store: `graphs.db` nodes and edges.
//!
//! The graph is a pure projection of the relational model; this module
//! stores it and answers the bounded queries the taint engines issue.
//! Reverse-edge adjacency is never held in memory; lookups go to SQLite
//! behind small LRU caches.

use std::path::Path;
use std::sync::Arc;

use moka::sync::Cache;
use rusqlite::Connection;
use seep_core::errors::StoreError;
use serde::{Deserialize, Serialize};

/// Graph partition an edge belongs to.
pub const GRAPH_DATA_FLOW: &str = "data_flow";
pub const GRAPH_CALL: &str = "call";

const SUCCESSORS_CACHE_SIZE: u64 = 10_000;
const EDGE_TYPE_CACHE_SIZE: u64 = 20_000;

/// Metadata serialized into an edge row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeMeta {
    #[serde(default)]
    pub line: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call: Option<String>,
}

/// A predecessor returned to the IFDS engine: (node id, edge type, meta).
pub type Predecessor = (String, String, EdgeMeta);

/// Store over `graphs.db`.
pub struct GraphStore {
    conn: Connection,
    successors_cache: Cache<String, Arc<Vec<String>>>,
    edge_type_cache: Cache<(String, String), Arc<str>>,
}

impl GraphStore {
    /// Create a fresh graph database at `path`, replacing any existing file.
    pub fn create(path: &Path) -> Result<Self, StoreError> {
        if path.exists() {
            std::fs::remove_file(path).map_err(|e| StoreError::Sqlite {
                message: format!("failed to remove stale database {}: {e}", path.display()),
            })?;
        }
        let conn = Connection::open(path).map_err(StoreError::sqlite)?;
        Self::with_connection(conn)
    }

    /// Create an in-memory graph store (tests).
    pub fn create_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::sqlite)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "PRAGMA journal_mode = MEMORY;
             PRAGMA synchronous = OFF;
             CREATE TABLE IF NOT EXISTS nodes(
                 id TEXT NOT NULL,
                 graph_type TEXT NOT NULL,
                 PRIMARY KEY(id, graph_type)
             );
             CREATE TABLE IF NOT EXISTS edges(
                 source TEXT NOT NULL,
                 target TEXT NOT NULL,
                 type TEXT NOT NULL,
                 metadata TEXT,
                 graph_type TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source, graph_type);
             CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target, graph_type);",
        )
        .map_err(StoreError::sqlite)?;

        Ok(Self {
            conn,
            successors_cache: Cache::new(SUCCESSORS_CACHE_SIZE),
            edge_type_cache: Cache::new(EDGE_TYPE_CACHE_SIZE),
        })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a bulk-load transaction (graph construction).
    pub fn begin(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("BEGIN IMMEDIATE").map_err(StoreError::sqlite)
    }

    pub fn commit(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("COMMIT").map_err(StoreError::sqlite)
    }

    pub fn add_node(&self, id: &str, graph_type: &str) -> Result<(), StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("INSERT OR IGNORE INTO nodes(id, graph_type) VALUES (?1, ?2)")
            .map_err(StoreError::sqlite)?;
        stmt.execute(rusqlite::params![id, graph_type]).map_err(StoreError::sqlite)?;
        Ok(())
    }

    pub fn add_edge(
        &self,
        source: &str,
        target: &str,
        edge_type: &str,
        meta: &EdgeMeta,
        graph_type: &str,
    ) -> Result<(), StoreError> {
        let metadata = serde_json::to_string(meta).unwrap_or_default();
        let mut stmt = self
            .conn
            .prepare_cached(
                "INSERT INTO edges(source, target, type, metadata, graph_type)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .map_err(StoreError::sqlite)?;
        stmt.execute(rusqlite::params![source, target, edge_type, metadata, graph_type])
            .map_err(StoreError::sqlite)?;
        Ok(())
    }

    /// Does a data-flow node with this id exist?
    pub fn node_exists(&self, id: &str) -> Result<bool, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT 1 FROM nodes WHERE graph_type = 'data_flow' AND id = ?1 LIMIT 1",
            )
            .map_err(StoreError::sqlite)?;
        stmt.exists(rusqlite::params![id]).map_err(StoreError::sqlite)
    }

    /// Reverse data-flow predecessors of a node: the stored `*_reverse`
    /// edges whose source is the node. Ordered for determinism.
    pub fn reverse_predecessors(&self, node_id: &str) -> Result<Vec<Predecessor>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT target, type, metadata FROM edges
                 WHERE source = ?1 AND graph_type = 'data_flow' AND type LIKE '%_reverse'
                 ORDER BY target, type",
            )
            .map_err(StoreError::sqlite)?;
        let rows = stmt
            .query_map(rusqlite::params![node_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })
            .map_err(StoreError::sqlite)?;

        let mut out = Vec::new();
        for row in rows {
            let (target, edge_type, metadata) = row.map_err(StoreError::sqlite)?;
            out.push((target, edge_type, parse_meta(metadata)));
        }
        Ok(out)
    }

    /// Call-graph predecessors: call edges targeting the node.
    pub fn call_predecessors(&self, node_id: &str) -> Result<Vec<Predecessor>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT source, type, metadata FROM edges
                 WHERE target = ?1 AND graph_type = 'call'
                 ORDER BY source, type",
            )
            .map_err(StoreError::sqlite)?;
        let rows = stmt
            .query_map(rusqlite::params![node_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })
            .map_err(StoreError::sqlite)?;

        let mut out = Vec::new();
        for row in rows {
            let (source, edge_type, metadata) = row.map_err(StoreError::sqlite)?;
            out.push((source, edge_type, parse_meta(metadata)));
        }
        Ok(out)
    }

    /// Forward data-flow successors, LRU-cached.
    pub fn successors(&self, node_id: &str) -> Result<Arc<Vec<String>>, StoreError> {
        if let Some(hit) = self.successors_cache.get(node_id) {
            return Ok(hit);
        }
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT target FROM edges
                 WHERE source = ?1 AND graph_type = 'data_flow'
                 ORDER BY target",
            )
            .map_err(StoreError::sqlite)?;
        let rows = stmt
            .query_map(rusqlite::params![node_id], |row| row.get::<_, String>(0))
            .map_err(StoreError::sqlite)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(StoreError::sqlite)?);
        }
        let out = Arc::new(out);
        self.successors_cache.insert(node_id.to_string(), Arc::clone(&out));
        Ok(out)
    }

    /// Edge type between two data-flow nodes ("unknown" if absent), LRU-cached.
    pub fn edge_type(&self, from: &str, to: &str) -> Result<Arc<str>, StoreError> {
        let key = (from.to_string(), to.to_string());
        if let Some(hit) = self.edge_type_cache.get(&key) {
            return Ok(hit);
        }
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT type FROM edges
                 WHERE source = ?1 AND target = ?2 AND graph_type = 'data_flow'
                 LIMIT 1",
            )
            .map_err(StoreError::sqlite)?;
        let found: Option<String> = stmt
            .query_row(rusqlite::params![from, to], |row| row.get(0))
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StoreError::sqlite(other)),
            })?;
        let value: Arc<str> = Arc::from(found.as_deref().unwrap_or("unknown"));
        self.edge_type_cache.insert(key, Arc::clone(&value));
        Ok(value)
    }

    /// Data-flow node ids matching either `%::pattern` or `%::pattern.%`.
    pub fn nodes_matching_pattern(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT id FROM nodes
                 WHERE graph_type = 'data_flow' AND (id LIKE ?1 OR id LIKE ?2)
                 ORDER BY id",
            )
            .map_err(StoreError::sqlite)?;
        let rows = stmt
            .query_map(
                rusqlite::params![format!("%::{pattern}"), format!("%::{pattern}.%")],
                |row| row.get::<_, String>(0),
            )
            .map_err(StoreError::sqlite)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(StoreError::sqlite)?);
        }
        Ok(out)
    }

    /// Targets of `cross_boundary_api` edges (backend request nodes).
    pub fn cross_boundary_targets(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT DISTINCT target FROM edges
                 WHERE graph_type = 'data_flow' AND type = 'cross_boundary_api'
                 ORDER BY target",
            )
            .map_err(StoreError::sqlite)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(StoreError::sqlite)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(StoreError::sqlite)?);
        }
        Ok(out)
    }

    pub fn edge_count(&self) -> Result<i64, StoreError> {
        self.conn
            .query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))
            .map_err(StoreError::sqlite)
    }

    pub fn node_count(&self) -> Result<i64, StoreError> {
        self.conn
            .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))
            .map_err(StoreError::sqlite)
    }
}

fn parse_meta(metadata: Option<String>) -> EdgeMeta {
    metadata
        .as_deref()
        .and_then(|m| serde_json::from_str(m).ok())
        .unwrap_or_default()
}
