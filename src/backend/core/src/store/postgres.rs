//! PostgreSQL read store.
//!
//! Schema creation and migration are handled outside this service. The store
//! expects the following tables:
//!
//! ```sql
//! CREATE TABLE experiments (
//!     id           UUID PRIMARY KEY,
//!     principal_id TEXT NOT NULL,
//!     name         TEXT NOT NULL,
//!     status       TEXT NOT NULL,
//!     created_at   TIMESTAMPTZ NOT NULL,
//!     updated_at   TIMESTAMPTZ NOT NULL
//! );
//!
//! CREATE TABLE sequences (
//!     id            UUID PRIMARY KEY,
//!     experiment_id UUID NOT NULL REFERENCES experiments(id),
//!     name          TEXT NOT NULL,
//!     bases         TEXT NOT NULL,
//!     created_at    TIMESTAMPTZ NOT NULL,
//!     updated_at    TIMESTAMPTZ NOT NULL
//! );
//!
//! CREATE TABLE guide_candidates (
//!     id               UUID PRIMARY KEY,
//!     sequence_id      UUID NOT NULL REFERENCES sequences(id),
//!     spacer           TEXT NOT NULL,
//!     pam              TEXT NOT NULL,
//!     strand           TEXT NOT NULL,
//!     position         BIGINT NOT NULL,
//!     efficiency_score DOUBLE PRECISION NOT NULL,
//!     created_at       TIMESTAMPTZ NOT NULL
//! );
//!
//! CREATE TABLE off_target_sites (
//!     id            UUID PRIMARY KEY,
//!     guide_id      UUID NOT NULL REFERENCES guide_candidates(id),
//!     chromosome    TEXT NOT NULL,
//!     position      BIGINT NOT NULL,
//!     strand        TEXT NOT NULL,
//!     mismatches    INTEGER NOT NULL,
//!     binding_score DOUBLE PRECISION NOT NULL
//! );
//! ```

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::QueryAs;
use sqlx::{FromRow, PgPool, Postgres};
use tracing::debug;

use super::{FindAll, Predicate, ReadStore, Record, Row, Table, Value};
use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::model::{Experiment, GuideCandidate, OffTargetSite, Sequence};

/// Read store backed by a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new connection pool.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_all<R>(&self, sql: &str, binds: &[Value]) -> Result<Vec<Row>>
    where
        R: Record + for<'r> FromRow<'r, PgRow> + Unpin,
    {
        let query = bind_all(sqlx::query_as::<_, R>(sql), binds);
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Record::into_row).collect())
    }

    async fn fetch_optional<R>(&self, sql: &str, binds: &[Value]) -> Result<Option<Row>>
    where
        R: Record + for<'r> FromRow<'r, PgRow> + Unpin,
    {
        let query = bind_all(sqlx::query_as::<_, R>(sql), binds);
        let row = query.fetch_optional(&self.pool).await?;
        Ok(row.map(Record::into_row))
    }
}

fn bind_all<'q, O>(
    mut query: QueryAs<'q, Postgres, O, PgArguments>,
    binds: &'q [Value],
) -> QueryAs<'q, Postgres, O, PgArguments> {
    for value in binds {
        query = match value {
            Value::Uuid(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.as_str()),
            Value::Float(v) => query.bind(*v),
            Value::Int(v) => query.bind(*v),
            Value::Timestamp(v) => query.bind(*v),
        };
    }
    query
}

/// Build a `SELECT` over whitelisted columns with positional binds.
///
/// Callers must validate the predicate and ordering first; only column names
/// from [`Table::columns`] are ever interpolated.
pub(crate) fn select_sql(table: Table, predicate: &Predicate, query: Option<&FindAll>) -> (String, Vec<Value>) {
    let mut sql = format!("SELECT {} FROM {}", table.columns().join(", "), table.name());
    let mut binds = Vec::with_capacity(predicate.clauses().len());

    for (i, (column, value)) in predicate.clauses().iter().enumerate() {
        sql.push_str(if i == 0 { " WHERE " } else { " AND " });
        sql.push_str(&format!("{} = ${}", column, i + 1));
        binds.push(value.clone());
    }

    match query {
        Some(query) => {
            if !query.order_by.is_empty() {
                let order = query
                    .order_by
                    .iter()
                    .map(|o| format!("{} {}", o.column, o.direction.as_sql()))
                    .collect::<Vec<_>>()
                    .join(", ");
                sql.push_str(" ORDER BY ");
                sql.push_str(&order);
            }
            if let Some(limit) = query.limit {
                sql.push_str(&format!(" LIMIT {}", limit));
            }
        }
        None => sql.push_str(" LIMIT 1"),
    }

    (sql, binds)
}

#[async_trait]
impl ReadStore for PostgresStore {
    async fn find_one_where(&self, table: Table, predicate: &Predicate) -> Result<Option<Row>> {
        predicate.validate(table)?;
        let (sql, binds) = select_sql(table, predicate, None);
        debug!(table = %table, sql = %sql, "find_one_where");

        match table {
            Table::Experiments => self.fetch_optional::<Experiment>(&sql, &binds).await,
            Table::Sequences => self.fetch_optional::<Sequence>(&sql, &binds).await,
            Table::GuideCandidates => self.fetch_optional::<GuideCandidate>(&sql, &binds).await,
            Table::OffTargetSites => self.fetch_optional::<OffTargetSite>(&sql, &binds).await,
        }
    }

    async fn find_all_where(&self, table: Table, query: &FindAll) -> Result<Vec<Row>> {
        query.validate(table)?;
        let (sql, binds) = select_sql(table, &query.predicate, Some(query));
        debug!(table = %table, sql = %sql, "find_all_where");

        match table {
            Table::Experiments => self.fetch_all::<Experiment>(&sql, &binds).await,
            Table::Sequences => self.fetch_all::<Sequence>(&sql, &binds).await,
            Table::GuideCandidates => self.fetch_all::<GuideCandidate>(&sql, &binds).await,
            Table::OffTargetSites => self.fetch_all::<OffTargetSite>(&sql, &binds).await,
        }
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
