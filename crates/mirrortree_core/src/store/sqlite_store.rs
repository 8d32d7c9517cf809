//! SQLite-backed node store implementation.
//!
//! # Responsibility
//! - Implement the `NodeStore` contract on one rusqlite connection.
//! - Keep SQL details, path derivation and subtree queries inside the
//!   repository boundary.
//!
//! # Invariants
//! - Paths are derived from parent links; a subtree move is one row update.
//! - Session scope maps to one SQLite `BEGIN IMMEDIATE` transaction.
//! - `save`/`refresh` without an active scope perform zero writes.

use crate::db::migrations::latest_version;
use crate::store::node_store::{
    DisplayName, LinkReference, NodeId, NodeStore, StoreError, StoreResult, StoredNode,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::cell::Cell;
use std::collections::HashSet;
use uuid::Uuid;

/// SQLite-backed node store.
pub struct SqliteNodeStore<'conn> {
    conn: &'conn Connection,
    scope_active: Cell<bool>,
}

impl<'conn> SqliteNodeStore<'conn> {
    /// Creates a store from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_store_ready(conn)?;
        Ok(Self {
            conn,
            scope_active: Cell::new(false),
        })
    }
}

impl NodeStore for SqliteNodeStore<'_> {
    fn begin(&self) -> StoreResult<()> {
        if self.scope_active.get() {
            return Ok(());
        }
        self.conn.execute_batch("BEGIN IMMEDIATE;")?;
        self.scope_active.set(true);
        Ok(())
    }

    fn save(&self) -> StoreResult<()> {
        if !self.scope_active.get() {
            return Ok(());
        }
        self.conn.execute_batch("COMMIT;")?;
        self.scope_active.set(false);
        Ok(())
    }

    fn refresh(&self) -> StoreResult<()> {
        if !self.scope_active.get() {
            return Ok(());
        }
        self.conn.execute_batch("ROLLBACK;")?;
        self.scope_active.set(false);
        Ok(())
    }

    fn node_by_id(&self, node_uuid: NodeId) -> StoreResult<Option<StoredNode>> {
        let row = self
            .conn
            .query_row(
                "SELECT node_uuid, parent_uuid, name, node_type
                 FROM nodes
                 WHERE node_uuid = ?1;",
                [node_uuid.to_string()],
                parse_node_row,
            )
            .optional()?;

        match row.map(NodeRecord::try_from).transpose()? {
            None => Ok(None),
            Some(record) => {
                let path = self.path_of(&record)?;
                Ok(Some(record.into_stored(path)))
            }
        }
    }

    fn node_by_path(&self, path: &str) -> StoreResult<Option<StoredNode>> {
        let segments: Vec<&str> = crate::pathmap::segments(path).collect();
        if segments.is_empty() {
            return Ok(None);
        }

        let mut parent_uuid: Option<NodeId> = None;
        let mut current: Option<NodeRecord> = None;
        for segment in &segments {
            let row = self.child_by_name(parent_uuid, segment)?;
            match row {
                None => return Ok(None),
                Some(record) => {
                    parent_uuid = Some(record.node_uuid);
                    current = Some(record);
                }
            }
        }

        let normalized = format!("/{}", segments.join("/"));
        Ok(current.map(|record| record.into_stored(normalized)))
    }

    fn node_exists(&self, path: &str) -> StoreResult<bool> {
        Ok(self.node_by_path(path)?.is_some())
    }

    fn has_child(&self, node_uuid: NodeId, name: &str) -> StoreResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM nodes WHERE parent_uuid = ?1 AND name = ?2
            );",
            params![node_uuid.to_string(), name],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn create_node(
        &self,
        parent_uuid: Option<NodeId>,
        name: &str,
        node_type: &str,
    ) -> StoreResult<StoredNode> {
        if name.is_empty() || name.contains('/') {
            return Err(StoreError::InvalidData(format!(
                "invalid node name `{name}`"
            )));
        }

        let parent_path = match parent_uuid {
            None => String::new(),
            Some(parent_uuid) => match self.node_by_id(parent_uuid)? {
                None => return Err(StoreError::ParentNotFound(parent_uuid.to_string())),
                Some(parent) => parent.path,
            },
        };
        let path = format!("{parent_path}/{name}");

        let occupied = match parent_uuid {
            Some(parent_uuid) => self.has_child(parent_uuid, name)?,
            None => self.child_by_name(None, name)?.is_some(),
        };
        if occupied {
            return Err(StoreError::TargetExists(path));
        }

        let node_uuid = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO nodes (node_uuid, parent_uuid, name, node_type)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                node_uuid.to_string(),
                parent_uuid.map(|value| value.to_string()),
                name,
                node_type,
            ],
        )?;

        Ok(StoredNode {
            node_uuid,
            parent_uuid,
            name: name.to_string(),
            node_type: node_type.to_string(),
            path,
        })
    }

    fn move_node(&self, old_path: &str, new_path: &str) -> StoreResult<()> {
        let source = self
            .node_by_path(old_path)?
            .ok_or_else(|| StoreError::NodeNotFound(old_path.to_string()))?;
        if self.node_exists(new_path)? {
            return Err(StoreError::TargetExists(new_path.to_string()));
        }

        let new_parent_path = crate::pathmap::parent_path(new_path)
            .ok_or_else(|| StoreError::InvalidData(format!("invalid move target `{new_path}`")))?;
        let new_parent = self
            .node_by_path(new_parent_path)?
            .ok_or_else(|| StoreError::ParentNotFound(new_parent_path.to_string()))?;
        let new_name = crate::pathmap::leaf_name(new_path);
        if new_name.is_empty() {
            return Err(StoreError::InvalidData(format!(
                "invalid move target `{new_path}`"
            )));
        }

        self.conn.execute(
            "UPDATE nodes
             SET parent_uuid = ?2,
                 name = ?3,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE node_uuid = ?1;",
            params![
                source.node_uuid.to_string(),
                new_parent.node_uuid.to_string(),
                new_name,
            ],
        )?;
        Ok(())
    }

    fn add_tag(&self, node_uuid: NodeId, tag: &str) -> StoreResult<bool> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO node_tags (node_uuid, tag) VALUES (?1, ?2);",
            params![node_uuid.to_string(), tag],
        )?;
        Ok(changed > 0)
    }

    fn has_tag(&self, node_uuid: NodeId, tag: &str) -> StoreResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM node_tags WHERE node_uuid = ?1 AND tag = ?2
            );",
            params![node_uuid.to_string(), tag],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn set_property(&self, node_uuid: NodeId, name: &str, value: &str) -> StoreResult<bool> {
        let current: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM node_properties WHERE node_uuid = ?1 AND name = ?2;",
                params![node_uuid.to_string(), name],
                |row| row.get(0),
            )
            .optional()?;
        if current.as_deref() == Some(value) {
            return Ok(false);
        }

        self.conn.execute(
            "INSERT INTO node_properties (node_uuid, name, value)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(node_uuid, name) DO UPDATE SET value = excluded.value;",
            params![node_uuid.to_string(), name, value],
        )?;
        Ok(true)
    }

    fn property(&self, node_uuid: NodeId, name: &str) -> StoreResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM node_properties WHERE node_uuid = ?1 AND name = ?2;",
                params![node_uuid.to_string(), name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn display_names(&self, node_uuid: NodeId) -> StoreResult<Vec<DisplayName>> {
        let mut stmt = self.conn.prepare(
            "SELECT language, message
             FROM display_names
             WHERE node_uuid = ?1
             ORDER BY language ASC;",
        )?;
        let mut rows = stmt.query([node_uuid.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(DisplayName {
                language: row.get(0)?,
                message: row.get(1)?,
            });
        }
        Ok(items)
    }

    fn set_display_name(
        &self,
        node_uuid: NodeId,
        language: &str,
        message: &str,
    ) -> StoreResult<bool> {
        let current: Option<String> = self
            .conn
            .query_row(
                "SELECT message FROM display_names WHERE node_uuid = ?1 AND language = ?2;",
                params![node_uuid.to_string(), language],
                |row| row.get(0),
            )
            .optional()?;
        if current.as_deref() == Some(message) {
            return Ok(false);
        }

        self.conn.execute(
            "INSERT INTO display_names (node_uuid, language, message)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(node_uuid, language) DO UPDATE SET message = excluded.message;",
            params![node_uuid.to_string(), language, message],
        )?;
        Ok(true)
    }

    fn find_links_in_subtree(
        &self,
        root_path: &str,
        ref_property: &str,
        sentinel: &str,
    ) -> StoreResult<Vec<LinkReference>> {
        let root = match self.node_by_path(root_path)? {
            None => return Ok(Vec::new()),
            Some(root) => root,
        };

        let mut stmt = self.conn.prepare(
            "WITH RECURSIVE subtree(node_uuid) AS (
                SELECT node_uuid
                FROM nodes
                WHERE node_uuid = ?1
                UNION ALL
                SELECT child.node_uuid
                FROM nodes child
                INNER JOIN subtree parent ON child.parent_uuid = parent.node_uuid
            )
            SELECT props.node_uuid, props.value
            FROM node_properties props
            INNER JOIN subtree ON subtree.node_uuid = props.node_uuid
            WHERE props.name = ?2
              AND props.value <> ''
              AND props.value <> ?3
            ORDER BY props.node_uuid ASC;",
        )?;

        let mut rows = stmt.query(params![root.node_uuid.to_string(), ref_property, sentinel])?;
        let mut links = Vec::new();
        while let Some(row) = rows.next()? {
            let source_text: String = row.get(0)?;
            links.push(LinkReference {
                source_uuid: parse_uuid(&source_text, "node_properties.node_uuid")?,
                target: row.get(1)?,
            });
        }
        Ok(links)
    }
}

impl SqliteNodeStore<'_> {
    fn child_by_name(
        &self,
        parent_uuid: Option<NodeId>,
        name: &str,
    ) -> StoreResult<Option<NodeRecord>> {
        let row = match parent_uuid {
            Some(parent_uuid) => self
                .conn
                .query_row(
                    "SELECT node_uuid, parent_uuid, name, node_type
                     FROM nodes
                     WHERE parent_uuid = ?1 AND name = ?2;",
                    params![parent_uuid.to_string(), name],
                    parse_node_row,
                )
                .optional()?,
            None => self
                .conn
                .query_row(
                    "SELECT node_uuid, parent_uuid, name, node_type
                     FROM nodes
                     WHERE parent_uuid IS NULL AND name = ?1;",
                    [name],
                    parse_node_row,
                )
                .optional()?,
        };
        row.map(NodeRecord::try_from).transpose()
    }

    /// Derives the absolute path by walking parent links upward.
    fn path_of(&self, record: &NodeRecord) -> StoreResult<String> {
        let mut names = vec![record.name.clone()];
        let mut visited: HashSet<NodeId> = HashSet::from([record.node_uuid]);
        let mut cursor = record.parent_uuid;

        while let Some(parent_uuid) = cursor {
            if !visited.insert(parent_uuid) {
                return Err(StoreError::InvalidData(format!(
                    "parent cycle detected at node {parent_uuid}"
                )));
            }
            let parent = self
                .conn
                .query_row(
                    "SELECT node_uuid, parent_uuid, name, node_type
                     FROM nodes
                     WHERE node_uuid = ?1;",
                    [parent_uuid.to_string()],
                    parse_node_row,
                )
                .optional()?
                .map(NodeRecord::try_from)
                .transpose()?
                .ok_or_else(|| StoreError::ParentNotFound(parent_uuid.to_string()))?;
            names.push(parent.name.clone());
            cursor = parent.parent_uuid;
        }

        names.reverse();
        Ok(format!("/{}", names.join("/")))
    }
}

/// Row shape before path derivation.
struct NodeRecord {
    node_uuid: NodeId,
    parent_uuid: Option<NodeId>,
    name: String,
    node_type: String,
}

impl NodeRecord {
    fn into_stored(self, path: String) -> StoredNode {
        StoredNode {
            node_uuid: self.node_uuid,
            parent_uuid: self.parent_uuid,
            name: self.name,
            node_type: self.node_type,
            path,
        }
    }
}

struct RawNodeRow {
    node_uuid: String,
    parent_uuid: Option<String>,
    name: String,
    node_type: String,
}

impl TryFrom<RawNodeRow> for NodeRecord {
    type Error = StoreError;

    fn try_from(raw: RawNodeRow) -> StoreResult<Self> {
        Ok(Self {
            node_uuid: parse_uuid(&raw.node_uuid, "nodes.node_uuid")?,
            parent_uuid: raw
                .parent_uuid
                .map(|value| parse_uuid(&value, "nodes.parent_uuid"))
                .transpose()?,
            name: raw.name,
            node_type: raw.node_type,
        })
    }
}

fn parse_node_row(row: &Row<'_>) -> rusqlite::Result<RawNodeRow> {
    Ok(RawNodeRow {
        node_uuid: row.get(0)?,
        parent_uuid: row.get(1)?,
        name: row.get(2)?,
        node_type: row.get(3)?,
    })
}

fn parse_uuid(value: &str, column: &'static str) -> StoreResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| StoreError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn ensure_store_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in ["nodes", "node_tags", "node_properties", "display_names"] {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1
            );",
            [table],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(StoreError::MissingRequiredTable(table));
        }
    }

    Ok(())
}
