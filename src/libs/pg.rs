use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgQueryResult};
use sqlx::query::Query;
use sqlx::{Postgres, Row, query};
use tracing::{debug, info};

use crate::libs::config::OrmConfig;
use crate::libs::error::{OrmError, Result};
use crate::libs::executor::{Executor, Operation};
use crate::libs::query_builder::{create_table, render};
use crate::libs::record::Record;
use crate::libs::schema::{Catalog, TableSchema};

/// Executor backed by a sqlx Postgres pool.
///
/// The pool is owned here; [`PgExecutor::close`] releases it, and dropping
/// the executor does the same without waiting for connections to finish.
#[derive(Debug, Clone)]
pub struct PgExecutor {
    pool: PgPool,
}

impl PgExecutor {
    pub async fn connect(config: &OrmConfig) -> Result<Self> {
        info!(
            max_connections = config.max_connections,
            "connecting to postgres"
        );
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect(&config.database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for callers that need their own transactions.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create every catalog table that does not exist yet, parents first.
    pub async fn migrate(&self, catalog: &Catalog) -> Result<()> {
        for table in catalog.creation_order()? {
            let sql = create_table(table, catalog);
            debug!(table = %table.name, %sql, "migrating");
            query(&sql)
                .execute(&self.pool)
                .await
                .map_err(|e| OrmError::from_sqlx(Some(&table.name), e))?;
        }
        info!(tables = catalog.tables().len(), "migration complete");
        Ok(())
    }

    // -------- Execute raw SQL --------
    pub async fn raw(&self, sql: &str) -> Result<PgQueryResult> {
        Ok(query(sql).execute(&self.pool).await?)
    }

    pub async fn close(&self) {
        info!("closing postgres pool");
        self.pool.close().await;
    }
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: Value,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::String(s) => query.bind(s),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => query.bind(i),
            // u64 beyond i64 range; the column cast parses the text
            _ if n.is_u64() => query.bind(n.to_string()),
            (None, Some(f)) => query.bind(f),
            (None, None) => query.bind(n.to_string()),
        },
        Value::Bool(b) => query.bind(b),
        Value::Null => query.bind(None::<String>),
        other => query.bind(sqlx::types::Json(other)),
    }
}

#[async_trait]
impl Executor for PgExecutor {
    async fn execute(&self, table: &TableSchema, op: &Operation) -> Result<Vec<Record>> {
        let built = render(table, op);
        debug!(table = %table.name, sql = %built.sql, params = built.params.len(), "executing");

        let mut query = query(&built.sql);
        for value in built.params {
            query = bind_value(query, value);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| OrmError::from_sqlx(Some(&table.name), e))?;

        rows.iter()
            .map(|row| {
                let value: Value = row
                    .try_get(0)
                    .map_err(|e| OrmError::from_sqlx(Some(&table.name), e))?;
                Record::from_json(value)
            })
            .collect()
    }
}
