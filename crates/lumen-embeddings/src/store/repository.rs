//! Embedding store: keyed upserts and nearest-neighbour reads over the three
//! collections.
//!
//! Every similarity read is a single statement that ranks with the
//! connection's `vec_cosine_distance` function, filters by threshold, and
//! orders by similarity, then recency, then key.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{ToSql, Value as SqlValue};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::Value;
use tracing::debug;

use super::connection::{COSINE_DISTANCE_FN, ConnectionPool, PooledConnection};
use super::migrations;
use super::types::{
    Collection, EmbeddingRecord, Metadata, NewRecord, QueryFilter, ScoredRecord, SimilarityQuery,
    StoreStats,
};
use crate::codec::VectorCodec;
use crate::errors::{Result, StoreError, ValidationError};

const BASE_COLUMNS: &str =
    "key, owner_id, source_text, embedding, model_id, metadata, created_at, updated_at";

/// Handle to the embedding store. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct EmbeddingStore {
    pool: ConnectionPool,
    codec: VectorCodec,
}

impl std::fmt::Debug for EmbeddingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingStore")
            .field("dimensions", &self.codec.dimensions())
            .field("pool_size", &self.pool.max_size())
            .finish_non_exhaustive()
    }
}

impl EmbeddingStore {
    /// Wrap an existing pool. Call [`EmbeddingStore::migrate`] before use
    /// unless the schema is known to be current.
    pub fn new(pool: ConnectionPool, dimensions: usize) -> Self {
        Self {
            pool,
            codec: VectorCodec::new(dimensions),
        }
    }

    /// Fixed vector dimension D for every record.
    pub fn dimensions(&self) -> usize {
        self.codec.dimensions()
    }

    /// Apply pending schema migrations, then check that every stored vector
    /// has this store's dimension.
    pub fn migrate(&self) -> Result<u32> {
        let conn = self.conn()?;
        let applied = migrations::run_migrations(&conn)?;
        self.check_dimensions(&conn)?;
        Ok(applied)
    }

    /// Fail if any collection already holds vectors of another dimension.
    fn check_dimensions(&self, conn: &Connection) -> Result<()> {
        let expected = self.codec.dimensions();
        let dims = i64::try_from(expected).unwrap_or(i64::MAX);
        for collection in Collection::ALL {
            let sql = format!(
                "SELECT DISTINCT dimensions FROM {} WHERE dimensions != ?1 LIMIT 1",
                collection.table()
            );
            let found: Option<i64> = conn
                .query_row(&sql, params![dims], |row| row.get(0))
                .optional()
                .map_err(StoreError::sqlite("check dimensions", collection, None))?;
            if let Some(actual) = found {
                return Err(ValidationError::DimensionMismatch {
                    expected,
                    actual: usize::try_from(actual).unwrap_or(0),
                }
                .into());
            }
        }
        Ok(())
    }

    fn conn(&self) -> std::result::Result<PooledConnection, StoreError> {
        Ok(self.pool.get()?)
    }

    /// Insert or replace the record at `(collection, key)`.
    ///
    /// A replace overwrites every field except `created_at`. `updated_at`
    /// never moves backwards.
    pub fn upsert(&self, record: &NewRecord<'_>) -> Result<EmbeddingRecord> {
        let collection = record.collection;
        if record.key.is_empty() {
            return Err(ValidationError::EmptyKey.into());
        }
        let blob = self.codec.encode(record.vector)?;
        let extra = extra_value(record)?;
        let metadata = serde_json::to_string(record.metadata).map_err(StoreError::from)?;
        let now = format_timestamp(Utc::now());
        let dims = i64::try_from(self.codec.dimensions()).unwrap_or(i64::MAX);

        let table = collection.table();
        let (extra_col, extra_param, extra_set) = match collection.extra_column() {
            Some(col) => (
                format!(", {col}"),
                ", ?9".to_string(),
                format!(", {col} = excluded.{col}"),
            ),
            None => (String::new(), String::new(), String::new()),
        };
        let sql = format!(
            "INSERT INTO {table}
               (key, owner_id, source_text, embedding, dimensions, model_id, metadata,
                created_at, updated_at{extra_col})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8{extra_param})
             ON CONFLICT(key) DO UPDATE SET
               owner_id = excluded.owner_id,
               source_text = excluded.source_text,
               embedding = excluded.embedding,
               dimensions = excluded.dimensions,
               model_id = excluded.model_id,
               metadata = excluded.metadata,
               updated_at = MAX(excluded.updated_at, {table}.updated_at){extra_set}
             RETURNING {}",
            select_columns(collection)
        );

        let mut values: Vec<&dyn ToSql> = params![
            record.key,
            record.owner_id,
            record.source_text,
            blob,
            dims,
            record.model_id,
            metadata,
            now,
        ]
        .to_vec();
        if let Some(extra) = &extra {
            values.push(extra);
        }

        let read = |row: &Row<'_>| RawRow::read(row, collection, false);
        let conn = self.conn()?;
        let raw = conn
            .query_row(&sql, values.as_slice(), read)
            .map_err(StoreError::sqlite("upsert", collection, Some(record.key)))?;
        let stored = self.decode(collection, raw)?.record;

        debug!(
            collection = %collection,
            key = record.key,
            owner_id = record.owner_id,
            "upserted embedding"
        );
        Ok(stored)
    }

    /// Fetch one record by key.
    pub fn get(&self, collection: Collection, key: &str) -> Result<Option<EmbeddingRecord>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE key = ?1",
            select_columns(collection),
            collection.table()
        );
        let read = |row: &Row<'_>| RawRow::read(row, collection, false);
        let conn = self.conn()?;
        let raw = conn
            .query_row(&sql, params![key], read)
            .optional()
            .map_err(StoreError::sqlite("get", collection, Some(key)))?;
        match raw {
            Some(raw) => Ok(Some(self.decode(collection, raw)?.record)),
            None => Ok(None),
        }
    }

    /// Records most similar to the query vector, best first.
    ///
    /// Results satisfy `similarity >= threshold`, number at most `limit`, and
    /// are ordered by similarity descending, then `updated_at` descending,
    /// then key ascending.
    pub fn query(&self, query: &SimilarityQuery<'_>) -> Result<Vec<ScoredRecord>> {
        validate_threshold(query.threshold)?;
        let blob = self.codec.encode(query.vector)?;
        if query.limit == 0 {
            return Ok(Vec::new());
        }

        let collection = query.collection;
        let mut conditions: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(blob)];

        if let Some(owner_id) = query.owner_id {
            conditions.push("owner_id = ?".to_string());
            values.push(Box::new(owner_id));
        }
        for filter in query.filters {
            push_filter(collection, filter, &mut conditions, &mut values)?;
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let columns = select_columns(collection);
        let sql = format!(
            "SELECT {columns}, similarity FROM (
               SELECT {columns}, 1.0 - {COSINE_DISTANCE_FN}(embedding, ?) AS similarity
               FROM {table}
               {where_clause}
             )
             WHERE similarity >= ?
             ORDER BY similarity DESC, updated_at DESC, key ASC
             LIMIT ?",
            table = collection.table()
        );
        values.push(Box::new(f64::from(query.threshold)));
        values.push(Box::new(i64::try_from(query.limit).unwrap_or(i64::MAX)));
        let params_refs: Vec<&dyn ToSql> = values.iter().map(AsRef::as_ref).collect();
        let read = |row: &Row<'_>| RawRow::read(row, collection, true);

        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(StoreError::sqlite("query", collection, None))?;
        let raws = stmt
            .query_map(params_refs.as_slice(), read)
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(StoreError::sqlite("query", collection, None))?;

        let results = raws
            .into_iter()
            .map(|raw| self.decode(collection, raw))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        debug!(
            collection = %collection,
            owner_id = ?query.owner_id,
            limit = query.limit,
            threshold = query.threshold,
            results = results.len(),
            "similarity query"
        );
        Ok(results)
    }

    /// Remove a record. Returns whether one existed.
    pub fn delete(&self, collection: Collection, key: &str) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                &format!("DELETE FROM {} WHERE key = ?1", collection.table()),
                params![key],
            )
            .map_err(StoreError::sqlite("delete", collection, Some(key)))?;
        debug!(collection = %collection, key, deleted = changed > 0, "delete embedding");
        Ok(changed > 0)
    }

    /// Record counts per collection.
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn()?;
        let count = |collection: Collection| -> std::result::Result<u64, StoreError> {
            let n: i64 = conn
                .query_row(
                    &format!("SELECT COUNT(*) FROM {}", collection.table()),
                    [],
                    |row| row.get(0),
                )
                .map_err(StoreError::sqlite("count", collection, None))?;
            Ok(u64::try_from(n).unwrap_or(0))
        };
        Ok(StoreStats {
            tasks: count(Collection::Task)?,
            content: count(Collection::Content)?,
            profiles: count(Collection::Profile)?,
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn decode(
        &self,
        collection: Collection,
        raw: RawRow,
    ) -> std::result::Result<ScoredRecord, StoreError> {
        let corrupt = |key: &str, message: String| StoreError::Corrupt {
            collection,
            key: key.to_string(),
            message,
        };
        let vector = self
            .codec
            .decode(&raw.embedding)
            .map_err(|e| corrupt(&raw.key, e.to_string()))?;
        let metadata: Metadata = serde_json::from_str(&raw.metadata)
            .map_err(|e| corrupt(&raw.key, format!("metadata: {e}")))?;
        let created_at = parse_timestamp(&raw.created_at).map_err(|e| corrupt(&raw.key, e))?;
        let updated_at = parse_timestamp(&raw.updated_at).map_err(|e| corrupt(&raw.key, e))?;
        let similarity = raw.similarity.map_or(0.0, |s| (s as f32).clamp(-1.0, 1.0));

        Ok(ScoredRecord {
            record: EmbeddingRecord {
                collection,
                key: raw.key,
                owner_id: raw.owner_id,
                source_text: raw.source_text,
                vector,
                model_id: raw.model_id,
                metadata,
                content_type: raw.content_type,
                profile_version: raw.profile_version,
                created_at,
                updated_at,
            },
            similarity,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────────────────────────

struct RawRow {
    key: String,
    owner_id: i64,
    source_text: String,
    embedding: Vec<u8>,
    model_id: String,
    metadata: String,
    created_at: String,
    updated_at: String,
    content_type: Option<String>,
    profile_version: Option<i64>,
    similarity: Option<f64>,
}

impl RawRow {
    fn read(
        row: &Row<'_>,
        collection: Collection,
        with_similarity: bool,
    ) -> rusqlite::Result<Self> {
        let mut next = 8;
        let (content_type, profile_version): (Option<String>, Option<i64>) = match collection {
            Collection::Task => (None, None),
            Collection::Content => {
                next += 1;
                (Some(row.get(8)?), None)
            }
            Collection::Profile => {
                next += 1;
                (None, Some(row.get(8)?))
            }
        };
        Ok(Self {
            key: row.get(0)?,
            owner_id: row.get(1)?,
            source_text: row.get(2)?,
            embedding: row.get(3)?,
            model_id: row.get(4)?,
            metadata: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
            content_type,
            profile_version,
            similarity: if with_similarity {
                Some(row.get(next)?)
            } else {
                None
            },
        })
    }
}

fn select_columns(collection: Collection) -> String {
    match collection.extra_column() {
        Some(col) => format!("{BASE_COLUMNS}, {col}"),
        None => BASE_COLUMNS.to_string(),
    }
}

fn extra_value(record: &NewRecord<'_>) -> std::result::Result<Option<SqlValue>, ValidationError> {
    let missing = |field| ValidationError::MissingField {
        collection: record.collection,
        field,
    };
    match record.collection {
        Collection::Task => Ok(None),
        Collection::Content => match record.content_type {
            Some(t) if !t.trim().is_empty() => Ok(Some(SqlValue::Text(t.to_string()))),
            _ => Err(missing("content_type")),
        },
        Collection::Profile => record
            .profile_version
            .map(|v| Some(SqlValue::Integer(v)))
            .ok_or_else(|| missing("profile_version")),
    }
}

/// RFC 3339 UTC with fixed microsecond precision, so text order is time order.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("timestamp {s:?}: {e}"))
}

fn validate_threshold(threshold: f32) -> std::result::Result<(), ValidationError> {
    if threshold.is_finite() && (-1.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(ValidationError::InvalidThreshold(f64::from(threshold)))
    }
}

fn is_plain_field(field: &str) -> bool {
    !field.is_empty() && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn push_filter(
    collection: Collection,
    filter: &QueryFilter,
    conditions: &mut Vec<String>,
    values: &mut Vec<Box<dyn ToSql>>,
) -> std::result::Result<(), ValidationError> {
    match filter {
        QueryFilter::ContentType(content_type) => {
            if collection != Collection::Content {
                return Err(ValidationError::UnsupportedFilter {
                    collection,
                    filter: "content type",
                });
            }
            conditions.push("content_type = ?".to_string());
            values.push(Box::new(content_type.clone()));
        }
        QueryFilter::Metadata { field, value } => {
            if !is_plain_field(field) {
                return Err(ValidationError::InvalidFilterField(field.clone()));
            }
            let path = format!("$.{field}");
            match value {
                Value::Null => {
                    conditions.push("json_type(metadata, ?) = 'null'".to_string());
                    values.push(Box::new(path));
                }
                Value::Bool(b) => {
                    conditions.push("json_type(metadata, ?) = ?".to_string());
                    values.push(Box::new(path));
                    values.push(Box::new(if *b { "true" } else { "false" }));
                }
                Value::Number(n) => {
                    conditions.push(
                        "(json_type(metadata, ?) IN ('integer', 'real') AND json_extract(metadata, ?) = ?)"
                            .to_string(),
                    );
                    values.push(Box::new(path.clone()));
                    values.push(Box::new(path));
                    match n.as_i64() {
                        Some(i) => values.push(Box::new(i)),
                        None => values.push(Box::new(n.as_f64().unwrap_or(f64::NAN))),
                    }
                }
                Value::String(s) => {
                    conditions.push(
                        "(json_type(metadata, ?) = 'text' AND json_extract(metadata, ?) = ?)"
                            .to_string(),
                    );
                    values.push(Box::new(path.clone()));
                    values.push(Box::new(path));
                    values.push(Box::new(s.clone()));
                }
                Value::Array(_) | Value::Object(_) => {
                    conditions.push(
                        "(json_type(metadata, ?) IN ('array', 'object') AND json_extract(metadata, ?) = json(?))"
                            .to_string(),
                    );
                    values.push(Box::new(path.clone()));
                    values.push(Box::new(path));
                    values.push(Box::new(value.to_string()));
                }
            }
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
