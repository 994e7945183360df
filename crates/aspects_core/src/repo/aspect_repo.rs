//! Aspect repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide read access to aspect/property nodes, parent closures and
//!   depth-first traversal streams.
//! - Provide atomic create/update/delete write paths.
//!
//! # Invariants
//! - `out_edges`/`in_edges` on returned nodes reflect only non-deleted
//!   properties, ordered by `sort_order, id`.
//! - Traversal emits each aspect vertex once; later references to it are
//!   represented by their property records alone.
//! - Edge identities are minted once per link and replaced only when the
//!   link's target changes.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::aspect::{
    AspectData, AspectId, AspectNode, AspectPropertyNode, BaseType, PropertyCardinality,
    PropertyId, SubjectId,
};
use crate::tree::TraversalRecord;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const ASPECT_SELECT_SQL: &str = "SELECT
    id,
    name,
    measure,
    base_type,
    subject_id,
    subject_name,
    ref_book_id,
    description,
    version,
    is_deleted
FROM aspects";

const PROPERTY_SELECT_SQL: &str = "SELECT
    id,
    name,
    aspect_id,
    target_id,
    cardinality,
    version,
    is_deleted,
    in_edge,
    out_edge
FROM aspect_properties";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for aspect persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Target aspect does not exist.
    AspectNotFound(AspectId),
    /// Target property does not exist.
    PropertyNotFound(PropertyId),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::AspectNotFound(id) => write!(f, "aspect not found: {id}"),
            Self::PropertyNotFound(id) => write!(f, "aspect property not found: {id}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "aspect repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted aspect data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Storage capability consumed by validators and the aspect service.
pub trait AspectRepository {
    /// Loads one aspect node by id.
    fn get_aspect(&self, id: AspectId, include_deleted: bool) -> RepoResult<Option<AspectNode>>;
    /// Loads one property node by id, tombstoned rows included.
    fn get_property(&self, id: PropertyId) -> RepoResult<Option<AspectPropertyNode>>;
    /// Lists all non-deleted aspects ordered by name.
    fn list_aspects(&self) -> RepoResult<Vec<AspectNode>>;
    /// Lists one aspect's non-deleted properties in property order.
    fn list_properties(&self, aspect_id: AspectId) -> RepoResult<Vec<AspectPropertyNode>>;
    /// Finds non-deleted aspects sharing a business key, excluding one id.
    ///
    /// `subject_id = None` matches only aspects that also have no subject.
    fn find_by_name_and_subject_excluding(
        &self,
        name: &str,
        subject_id: Option<SubjectId>,
        exclude_id: Option<AspectId>,
    ) -> RepoResult<Vec<AspectNode>>;
    /// Returns the aspect itself plus its transitive ancestor closure:
    /// every aspect that reaches `id` through a chain of live properties.
    fn find_parent_ids(&self, id: AspectId) -> RepoResult<Vec<AspectId>>;
    /// Whether any live property of another aspect targets `id`.
    fn is_referenced(&self, id: AspectId) -> RepoResult<bool>;
    /// Produces the depth-first preorder traversal stream rooted at `root`.
    fn traverse(&self, root: AspectId) -> RepoResult<Vec<TraversalRecord>>;
    /// Inserts a new aspect with its properties. Versions start at 1.
    fn create_aspect(&self, data: &AspectData) -> RepoResult<AspectId>;
    /// Applies an update request: field changes, property upserts and
    /// property soft deletions, bumping versions of every touched row.
    fn update_aspect(&self, data: &AspectData) -> RepoResult<()>;
    /// Tombstones an aspect together with its owned properties.
    fn soft_delete_aspect(&self, id: AspectId) -> RepoResult<()>;
    /// Hard-deletes an unreferenced aspect and its owned properties.
    fn delete_aspect(&self, id: AspectId) -> RepoResult<()>;
}

/// SQLite-backed aspect repository.
#[derive(Debug)]
pub struct SqliteAspectRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAspectRepository<'conn> {
    /// Creates a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        let expected_version = latest_version();
        let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        if actual_version != expected_version {
            return Err(RepoError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }
        Ok(Self { conn })
    }

    fn load_aspect_edges(&self, id: AspectId) -> RepoResult<(Vec<Uuid>, Vec<Uuid>)> {
        let mut out_edges = Vec::new();
        let mut stmt = self.conn.prepare(
            "SELECT in_edge
             FROM aspect_properties
             WHERE aspect_id = ?1
               AND is_deleted = 0
             ORDER BY sort_order ASC, id ASC;",
        )?;
        let mut rows = stmt.query([id.to_string()])?;
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            out_edges.push(parse_uuid(&value, "aspect_properties.in_edge")?);
        }

        let mut in_edges = Vec::new();
        let mut stmt = self.conn.prepare(
            "SELECT out_edge
             FROM aspect_properties
             WHERE target_id = ?1
               AND is_deleted = 0
             ORDER BY sort_order ASC, id ASC;",
        )?;
        let mut rows = stmt.query([id.to_string()])?;
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            in_edges.push(parse_uuid(&value, "aspect_properties.out_edge")?);
        }

        Ok((out_edges, in_edges))
    }

    fn load_aspect_node(&self, row: &Row<'_>) -> RepoResult<AspectNode> {
        let mut node = parse_aspect_row(row)?;
        let (out_edges, in_edges) = self.load_aspect_edges(node.id)?;
        node.out_edges = out_edges;
        node.in_edges = in_edges;
        Ok(node)
    }

    fn traverse_into(
        &self,
        node: AspectNode,
        visited: &mut HashSet<AspectId>,
        records: &mut Vec<TraversalRecord>,
    ) -> RepoResult<()> {
        visited.insert(node.id);
        let properties = self.list_properties(node.id)?;
        records.push(TraversalRecord::Aspect(node));

        for property in properties {
            let target_id = property.target_id;
            records.push(TraversalRecord::Property(property));
            if visited.contains(&target_id) {
                continue;
            }
            let target = self
                .get_aspect(target_id, true)?
                .ok_or(RepoError::AspectNotFound(target_id))?;
            self.traverse_into(target, visited, records)?;
        }
        Ok(())
    }

    fn next_sort_order(&self, aspect_id: AspectId) -> RepoResult<i64> {
        let next = self.conn.query_row(
            "SELECT COALESCE(MAX(sort_order), -1) + 1
             FROM aspect_properties
             WHERE aspect_id = ?1;",
            [aspect_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(next)
    }

    fn insert_property(
        &self,
        tx: &Transaction<'_>,
        aspect_id: AspectId,
        data_name: Option<&str>,
        target_id: AspectId,
        cardinality: PropertyCardinality,
        sort_order: i64,
    ) -> RepoResult<PropertyId> {
        let id = Uuid::new_v4();
        tx.execute(
            "INSERT INTO aspect_properties (
                id,
                aspect_id,
                target_id,
                name,
                cardinality,
                in_edge,
                out_edge,
                sort_order
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                id.to_string(),
                aspect_id.to_string(),
                target_id.to_string(),
                data_name,
                cardinality.as_str(),
                Uuid::new_v4().to_string(),
                Uuid::new_v4().to_string(),
                sort_order,
            ],
        )?;
        Ok(id)
    }
}

impl AspectRepository for SqliteAspectRepository<'_> {
    fn get_aspect(&self, id: AspectId, include_deleted: bool) -> RepoResult<Option<AspectNode>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ASPECT_SELECT_SQL}
             WHERE id = ?1
               AND (?2 = 1 OR is_deleted = 0);"
        ))?;
        let mut rows = stmt.query(params![id.to_string(), include_deleted as i64])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(self.load_aspect_node(row)?));
        }
        Ok(None)
    }

    fn get_property(&self, id: PropertyId) -> RepoResult<Option<AspectPropertyNode>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PROPERTY_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_property_row(row)?));
        }
        Ok(None)
    }

    fn list_aspects(&self) -> RepoResult<Vec<AspectNode>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ASPECT_SELECT_SQL}
             WHERE is_deleted = 0
             ORDER BY name ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut aspects = Vec::new();
        while let Some(row) = rows.next()? {
            aspects.push(self.load_aspect_node(row)?);
        }
        Ok(aspects)
    }

    fn list_properties(&self, aspect_id: AspectId) -> RepoResult<Vec<AspectPropertyNode>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PROPERTY_SELECT_SQL}
             WHERE aspect_id = ?1
               AND is_deleted = 0
             ORDER BY sort_order ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([aspect_id.to_string()])?;
        let mut properties = Vec::new();
        while let Some(row) = rows.next()? {
            properties.push(parse_property_row(row)?);
        }
        Ok(properties)
    }

    fn find_by_name_and_subject_excluding(
        &self,
        name: &str,
        subject_id: Option<SubjectId>,
        exclude_id: Option<AspectId>,
    ) -> RepoResult<Vec<AspectNode>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ASPECT_SELECT_SQL}
             WHERE name = ?1
               AND is_deleted = 0
               AND ((?2 IS NULL AND subject_id IS NULL) OR subject_id = ?2)
               AND (?3 IS NULL OR id <> ?3);"
        ))?;
        let mut rows = stmt.query(params![
            name,
            subject_id.map(|value| value.to_string()),
            exclude_id.map(|value| value.to_string()),
        ])?;
        let mut aspects = Vec::new();
        while let Some(row) = rows.next()? {
            aspects.push(self.load_aspect_node(row)?);
        }
        Ok(aspects)
    }

    fn find_parent_ids(&self, id: AspectId) -> RepoResult<Vec<AspectId>> {
        let mut stmt = self.conn.prepare(
            "WITH RECURSIVE ancestors(id) AS (
                SELECT ?1
                UNION
                SELECT property.aspect_id
                FROM aspect_properties property
                INNER JOIN ancestors ON property.target_id = ancestors.id
                WHERE property.is_deleted = 0
            )
            SELECT id FROM ancestors;",
        )?;
        let mut rows = stmt.query([id.to_string()])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            ids.push(parse_uuid(&value, "aspect_properties.aspect_id")?);
        }
        Ok(ids)
    }

    fn is_referenced(&self, id: AspectId) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM aspect_properties
                WHERE target_id = ?1
                  AND is_deleted = 0
            );",
            [id.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn traverse(&self, root: AspectId) -> RepoResult<Vec<TraversalRecord>> {
        let root_node = self
            .get_aspect(root, true)?
            .ok_or(RepoError::AspectNotFound(root))?;
        let mut visited = HashSet::new();
        let mut records = Vec::new();
        self.traverse_into(root_node, &mut visited, &mut records)?;
        Ok(records)
    }

    fn create_aspect(&self, data: &AspectData) -> RepoResult<AspectId> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let id = Uuid::new_v4();
        tx.execute(
            "INSERT INTO aspects (
                id,
                name,
                measure,
                base_type,
                subject_id,
                subject_name,
                description
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                id.to_string(),
                data.name.as_str(),
                data.measure.as_deref(),
                data.base_type.as_deref(),
                data.subject_id.map(|value| value.to_string()),
                data.subject_name.as_deref(),
                data.description.as_deref(),
            ],
        )?;

        for (index, property) in data.live_properties().enumerate() {
            self.insert_property(
                &tx,
                id,
                property.name.as_deref(),
                property.target_id,
                property.cardinality,
                index as i64,
            )?;
        }

        tx.commit()?;
        Ok(id)
    }

    fn update_aspect(&self, data: &AspectData) -> RepoResult<()> {
        let id = match data.id {
            Some(id) => id,
            None => return Err(RepoError::InvalidData("update without aspect id".into())),
        };

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE aspects
             SET name = ?2,
                 measure = ?3,
                 base_type = ?4,
                 subject_id = ?5,
                 subject_name = ?6,
                 description = ?7,
                 version = version + 1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND is_deleted = 0;",
            params![
                id.to_string(),
                data.name.as_str(),
                data.measure.as_deref(),
                data.base_type.as_deref(),
                data.subject_id.map(|value| value.to_string()),
                data.subject_name.as_deref(),
                data.description.as_deref(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::AspectNotFound(id));
        }

        let mut next_order = self.next_sort_order(id)?;
        for property in &data.properties {
            match (property.id, property.deleted) {
                (None, true) => {}
                (None, false) => {
                    self.insert_property(
                        &tx,
                        id,
                        property.name.as_deref(),
                        property.target_id,
                        property.cardinality,
                        next_order,
                    )?;
                    next_order += 1;
                }
                (Some(property_id), true) => {
                    let changed = tx.execute(
                        "UPDATE aspect_properties
                         SET is_deleted = 1,
                             version = version + 1,
                             updated_at = (strftime('%s', 'now') * 1000)
                         WHERE id = ?1
                           AND is_deleted = 0;",
                        [property_id.to_string()],
                    )?;
                    if changed == 0 {
                        return Err(RepoError::PropertyNotFound(property_id));
                    }
                }
                (Some(property_id), false) => {
                    let current_target: Option<String> = tx
                        .query_row(
                            "SELECT target_id
                             FROM aspect_properties
                             WHERE id = ?1
                               AND is_deleted = 0;",
                            [property_id.to_string()],
                            |row| row.get(0),
                        )
                        .optional()?;
                    let current_target = match current_target {
                        Some(value) => parse_uuid(&value, "aspect_properties.target_id")?,
                        None => return Err(RepoError::PropertyNotFound(property_id)),
                    };

                    // Retargeting a property mints a fresh outgoing edge
                    // identity; the old link no longer exists.
                    let out_edge = if current_target == property.target_id {
                        None
                    } else {
                        Some(Uuid::new_v4().to_string())
                    };
                    tx.execute(
                        "UPDATE aspect_properties
                         SET name = ?2,
                             target_id = ?3,
                             cardinality = ?4,
                             out_edge = COALESCE(?5, out_edge),
                             version = version + 1,
                             updated_at = (strftime('%s', 'now') * 1000)
                         WHERE id = ?1
                           AND is_deleted = 0;",
                        params![
                            property_id.to_string(),
                            property.name.as_deref(),
                            property.target_id.to_string(),
                            property.cardinality.as_str(),
                            out_edge,
                        ],
                    )?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn soft_delete_aspect(&self, id: AspectId) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE aspects
             SET is_deleted = 1,
                 version = version + 1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND is_deleted = 0;",
            [id.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::AspectNotFound(id));
        }
        tx.execute(
            "UPDATE aspect_properties
             SET is_deleted = 1,
                 version = version + 1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE aspect_id = ?1
               AND is_deleted = 0;",
            [id.to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn delete_aspect(&self, id: AspectId) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "DELETE FROM aspect_properties WHERE aspect_id = ?1;",
            [id.to_string()],
        )?;
        // Tombstoned inbound links would still hold a foreign key on the
        // aspect row; they die with their target.
        tx.execute(
            "DELETE FROM aspect_properties
             WHERE target_id = ?1
               AND is_deleted = 1;",
            [id.to_string()],
        )?;
        let changed = tx.execute("DELETE FROM aspects WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::AspectNotFound(id));
        }
        tx.commit()?;
        Ok(())
    }
}

fn parse_aspect_row(row: &Row<'_>) -> RepoResult<AspectNode> {
    let id_text: String = row.get("id")?;
    let id = parse_uuid(&id_text, "aspects.id")?;

    let base_type = match row.get::<_, Option<String>>("base_type")? {
        Some(value) => Some(BaseType::parse(&value).ok_or_else(|| {
            RepoError::InvalidData(format!("invalid base type `{value}` in aspects.base_type"))
        })?),
        None => None,
    };

    let subject_id = row
        .get::<_, Option<String>>("subject_id")?
        .map(|value| parse_uuid(&value, "aspects.subject_id"))
        .transpose()?;
    let ref_book_id = row
        .get::<_, Option<String>>("ref_book_id")?
        .map(|value| parse_uuid(&value, "aspects.ref_book_id"))
        .transpose()?;

    Ok(AspectNode {
        id,
        name: row.get("name")?,
        measure: row.get("measure")?,
        base_type,
        subject_id,
        subject_name: row.get("subject_name")?,
        ref_book_id,
        description: row.get("description")?,
        version: row.get("version")?,
        deleted: parse_deleted_flag(row.get("is_deleted")?, "aspects.is_deleted")?,
        out_edges: Vec::new(),
        in_edges: Vec::new(),
    })
}

fn parse_property_row(row: &Row<'_>) -> RepoResult<AspectPropertyNode> {
    let id_text: String = row.get("id")?;
    let aspect_text: String = row.get("aspect_id")?;
    let target_text: String = row.get("target_id")?;
    let in_edge_text: String = row.get("in_edge")?;
    let out_edge_text: String = row.get("out_edge")?;

    let cardinality_text: String = row.get("cardinality")?;
    let cardinality = PropertyCardinality::parse(&cardinality_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid cardinality `{cardinality_text}` in aspect_properties.cardinality"
        ))
    })?;

    Ok(AspectPropertyNode {
        id: parse_uuid(&id_text, "aspect_properties.id")?,
        name: row.get("name")?,
        aspect_id: parse_uuid(&aspect_text, "aspect_properties.aspect_id")?,
        target_id: parse_uuid(&target_text, "aspect_properties.target_id")?,
        cardinality,
        version: row.get("version")?,
        deleted: parse_deleted_flag(row.get("is_deleted")?, "aspect_properties.is_deleted")?,
        in_edge: parse_uuid(&in_edge_text, "aspect_properties.in_edge")?,
        out_edge: parse_uuid(&out_edge_text, "aspect_properties.out_edge")?,
    })
}

fn parse_deleted_flag(value: i64, column: &'static str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid is_deleted value `{other}` in {column}"
        ))),
    }
}

fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}
