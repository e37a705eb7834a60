//! Bounded `SQLite` connection pool.
//!
//! Every new connection passes through [`ConnectionSetup`], which applies
//! pragmas and registers `vec_cosine_distance(a, b)`, the distance operator
//! all similarity reads are expressed in.

use std::time::Duration;

use lumen_settings::StoreSettings;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use rusqlite::functions::FunctionFlags;

use crate::codec;
use crate::errors::{StoreError, ValidationError};

/// Alias for the connection pool type.
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Alias for a pooled connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Name of the registered cosine-distance function.
pub const COSINE_DISTANCE_FN: &str = "vec_cosine_distance";

/// Pool and per-connection configuration.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// Wait for a free connection before giving up.
    pub connection_timeout: Duration,
    /// Wait on a locked database before giving up.
    pub busy_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::from_settings(&StoreSettings::default())
    }
}

impl ConnectionConfig {
    /// Build from the store settings section.
    pub fn from_settings(s: &StoreSettings) -> Self {
        Self {
            pool_size: s.pool_size.max(1),
            connection_timeout: Duration::from_millis(s.connection_timeout_ms),
            busy_timeout_ms: s.busy_timeout_ms,
        }
    }
}

#[derive(Debug)]
struct ConnectionSetup {
    busy_timeout_ms: u64,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ConnectionSetup {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(&format!(
            "PRAGMA busy_timeout = {};\
             PRAGMA journal_mode = WAL;\
             PRAGMA synchronous = NORMAL;",
            self.busy_timeout_ms
        ))?;
        register_vector_functions(conn)
    }
}

/// Register the vector functions on a single connection.
pub fn register_vector_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        COSINE_DISTANCE_FN,
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let a = vector_arg(ctx, 0)?;
            let b = vector_arg(ctx, 1)?;
            codec::cosine_distance(&a, &b).ok_or_else(|| {
                user_error(ValidationError::DimensionMismatch {
                    expected: a.len(),
                    actual: b.len(),
                })
            })
        },
    )
}

fn vector_arg(ctx: &rusqlite::functions::Context<'_>, idx: usize) -> rusqlite::Result<Vec<f32>> {
    let blob = ctx.get_raw(idx).as_blob().map_err(user_error)?;
    codec::from_blob(blob).map_err(user_error)
}

fn user_error<E>(err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::UserFunctionError(Box::new(err))
}

/// In-memory pool. Each in-memory connection is its own database, so the
/// pool holds exactly one connection regardless of `config.pool_size`.
pub fn new_in_memory(config: &ConnectionConfig) -> Result<ConnectionPool, StoreError> {
    build(SqliteConnectionManager::memory(), 1, config)
}

/// File-backed pool.
pub fn new_file(path: &str, config: &ConnectionConfig) -> Result<ConnectionPool, StoreError> {
    let manager = SqliteConnectionManager::file(path);
    build(manager, config.pool_size, config)
}

fn build(
    manager: SqliteConnectionManager,
    max_size: u32,
    config: &ConnectionConfig,
) -> Result<ConnectionPool, StoreError> {
    let pool = Pool::builder()
        .max_size(max_size)
        .connection_timeout(config.connection_timeout)
        .connection_customizer(Box::new(ConnectionSetup {
            busy_timeout_ms: config.busy_timeout_ms,
        }))
        .build(manager)?;
    Ok(pool)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
