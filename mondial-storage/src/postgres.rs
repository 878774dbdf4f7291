//! PostgreSQL Store Module
//!
//! Connection pooling with deadpool-postgres and a [`Store`] implementation
//! over it. Each store call checks out its own connection for the duration of
//! one statement; the connection goes back to the pool when it is dropped.
//!
//! Placeholders are rendered as `$n` with an explicit cast taken from the bind
//! value (`int8`, `float8`, `text`), so integer and float binds compare against
//! `NUMERIC` columns through the server's implicit casts. Null binds are
//! inlined as `NULL` and the remaining placeholders renumbered.

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime, Timeouts};
use mondial_core::{env_parse, MappingError, MondialError, MondialResult, Row, SqlValue, StorageError};
use std::time::Duration;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::NoTls;
use tracing::debug;

use crate::{QueryPlan, Store};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection wait/create/recycle timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "mondial".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a database configuration from environment variables.
    ///
    /// Environment variables:
    /// - `MONDIAL_DB_HOST` (default: localhost)
    /// - `MONDIAL_DB_PORT` (default: 5432)
    /// - `MONDIAL_DB_NAME` (default: mondial)
    /// - `MONDIAL_DB_USER` (default: postgres)
    /// - `MONDIAL_DB_PASSWORD` (default: empty)
    /// - `MONDIAL_DB_POOL_SIZE` (default: 16)
    /// - `MONDIAL_DB_TIMEOUT` in seconds (default: 30)
    pub fn from_env() -> MondialResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            host: std::env::var("MONDIAL_DB_HOST").unwrap_or(defaults.host),
            port: env_parse("MONDIAL_DB_PORT")?.unwrap_or(defaults.port),
            dbname: std::env::var("MONDIAL_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("MONDIAL_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("MONDIAL_DB_PASSWORD").unwrap_or(defaults.password),
            max_size: env_parse("MONDIAL_DB_POOL_SIZE")?.unwrap_or(defaults.max_size),
            timeout: env_parse::<u64>("MONDIAL_DB_TIMEOUT")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        })
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> MondialResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig {
            max_size: self.max_size,
            timeouts: Timeouts {
                wait: Some(self.timeout),
                create: Some(self.timeout),
                recycle: Some(self.timeout),
            },
            ..Default::default()
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StorageError::ConnectionFailed {
                reason: format!("Failed to create pool: {}", e),
            })?;

        Ok(pool)
    }
}

// ============================================================================
// PARAMETERS AND CELLS
// ============================================================================

/// A bind value in the shape tokio-postgres expects.
#[derive(Debug, Clone, PartialEq)]
enum PgParam {
    Long(i64),
    Double(f64),
    Text(String),
}

impl PgParam {
    /// `None` for nulls, which are inlined into the SQL instead.
    fn from_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Null => None,
            SqlValue::Int(v) => Some(PgParam::Long(*v)),
            SqlValue::Float(v) => Some(PgParam::Double(*v)),
            SqlValue::Text(v) => Some(PgParam::Text(v.clone())),
        }
    }

    fn as_to_sql(&self) -> &(dyn ToSql + Sync) {
        match self {
            PgParam::Long(v) => v,
            PgParam::Double(v) => v,
            PgParam::Text(v) => v,
        }
    }
}

/// Render a plan for PostgreSQL: numbered, cast placeholders and the
/// matching parameter list.
fn render_plan(plan: &QueryPlan) -> (String, Vec<PgParam>) {
    let mut next = 0;
    let sql = plan.render(|_, value| {
        let cast = match value {
            SqlValue::Null => return "NULL".to_string(),
            SqlValue::Int(_) => "int8",
            SqlValue::Float(_) => "float8",
            SqlValue::Text(_) => "text",
        };
        next += 1;
        format!("${}::{}", next, cast)
    });
    let params = plan.binds().iter().filter_map(PgParam::from_value).collect();
    (sql, params)
}

/// `NUMERIC` cell as a float value. Mondial stores populations, areas and
/// coordinates as `NUMERIC`.
fn numeric_cell(column: &str, value: Option<Decimal>) -> MondialResult<SqlValue> {
    match value {
        None => Ok(SqlValue::Null),
        Some(decimal) => decimal.to_f64().map(SqlValue::from).ok_or_else(|| {
            MappingError::TypeMismatch {
                column: column.to_string(),
                expected: format!("numeric representable as float8, got {}", decimal),
            }
            .into()
        }),
    }
}

fn read_cell(row: &tokio_postgres::Row, idx: usize) -> MondialResult<SqlValue> {
    let column = &row.columns()[idx];
    let ty = column.type_();
    let mismatch = |e: tokio_postgres::Error| -> MondialError {
        MappingError::TypeMismatch {
            column: column.name().to_string(),
            expected: format!("{} ({})", ty.name(), e),
        }
        .into()
    };

    let value = if *ty == Type::INT2 {
        SqlValue::from(row.try_get::<_, Option<i16>>(idx).map_err(mismatch)?.map(i64::from))
    } else if *ty == Type::INT4 {
        SqlValue::from(row.try_get::<_, Option<i32>>(idx).map_err(mismatch)?.map(i64::from))
    } else if *ty == Type::INT8 {
        SqlValue::from(row.try_get::<_, Option<i64>>(idx).map_err(mismatch)?)
    } else if *ty == Type::FLOAT4 {
        SqlValue::from(row.try_get::<_, Option<f32>>(idx).map_err(mismatch)?.map(f64::from))
    } else if *ty == Type::FLOAT8 {
        SqlValue::from(row.try_get::<_, Option<f64>>(idx).map_err(mismatch)?)
    } else if *ty == Type::NUMERIC {
        numeric_cell(
            column.name(),
            row.try_get::<_, Option<Decimal>>(idx).map_err(mismatch)?,
        )?
    } else if [Type::TEXT, Type::VARCHAR, Type::BPCHAR, Type::NAME].contains(ty) {
        SqlValue::from(row.try_get::<_, Option<String>>(idx).map_err(mismatch)?)
    } else {
        return Err(MappingError::UnsupportedColumnType {
            column: column.name().to_string(),
            type_name: ty.name().to_string(),
        }
        .into());
    };
    Ok(value)
}

fn read_row(row: &tokio_postgres::Row) -> MondialResult<Row> {
    let mut out = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        out.push(column.name(), read_cell(row, idx)?);
    }
    Ok(out)
}

fn fetch_failure(e: tokio_postgres::Error) -> MondialError {
    MondialError::fetch_failure(e.to_string())
}

// ============================================================================
// STORE
// ============================================================================

/// [`Store`] over a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &DbConfig) -> MondialResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Current pool size, for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_conn(&self) -> MondialResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(|e| {
            StorageError::ConnectionFailed {
                reason: e.to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn query(&self, plan: &QueryPlan) -> MondialResult<Vec<Row>> {
        let (sql, params) = render_plan(plan);
        let conn = self.get_conn().await?;
        debug!(sql = %sql, params = params.len(), "executing query");

        let statement = conn.prepare_cached(&sql).await.map_err(fetch_failure)?;
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(PgParam::as_to_sql).collect();
        let rows = conn.query(&statement, &refs).await.map_err(fetch_failure)?;

        rows.iter().map(read_row).collect()
    }

    async fn execute(&self, plan: &QueryPlan) -> MondialResult<u64> {
        let (sql, params) = render_plan(plan);
        let conn = self.get_conn().await?;
        debug!(sql = %sql, params = params.len(), "executing statement");

        let statement = conn.prepare_cached(&sql).await.map_err(fetch_failure)?;
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(PgParam::as_to_sql).collect();
        conn.execute(&statement, &refs).await.map_err(fetch_failure)
    }
}

// ============================================================================
// TESTS
// ============================================================================
