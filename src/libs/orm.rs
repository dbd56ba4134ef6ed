use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::libs::config::OrmConfig;
use crate::libs::error::{OrmError, Result};
use crate::libs::executor::{Executor, Operation};
use crate::libs::keys::{KeyPresence, resolve};
use crate::libs::pg::PgExecutor;
use crate::libs::record::{ColumnState, DeepRecord, Record};
use crate::libs::schema::{Autogen, Catalog, Relation, TableSchema};
use crate::libs::table::{Table, TableHandle};

/// The mapper: loaded table metadata plus the executor that reaches the store.
///
/// Every operation is independent and takes `&self`, so one `Orm` can serve
/// concurrent callers. Key checks happen here; uniqueness and NOT NULL are
/// enforced by the store and reported through classified errors.
pub struct Orm<E> {
    catalog: Catalog,
    executor: E,
}

impl Orm<PgExecutor> {
    /// Connect with the given tables.
    pub async fn connect(config: &OrmConfig, catalog: Catalog) -> Result<Self> {
        let executor = PgExecutor::connect(config).await?;
        Ok(Self::new(catalog, executor))
    }

    /// Connect and load the catalog from the database's `schema`.
    pub async fn connect_introspected(config: &OrmConfig, schema: &str) -> Result<Self> {
        let executor = PgExecutor::connect(config).await?;
        let catalog = Catalog::introspect(executor.pool(), schema).await?;
        Ok(Self::new(catalog, executor))
    }

    // -------- Create tables --------
    pub async fn migrate(&self) -> Result<()> {
        self.executor.migrate(&self.catalog).await
    }

    pub async fn close(&self) {
        self.executor.close().await
    }
}

impl<E: Executor> Orm<E> {
    pub fn new(catalog: Catalog, executor: E) -> Self {
        info!(tables = catalog.tables().len(), "mapper ready");
        Self { catalog, executor }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// A handle bound to one table.
    pub fn table(&self, name: &str) -> Result<TableHandle<'_, E>> {
        Ok(TableHandle::new(self, self.catalog.table(name)?))
    }

    /// A handle that converts `T` to and from records with serde.
    pub fn typed<T>(&self, name: &str) -> Result<Table<'_, T, E>> {
        Ok(Table::new(self.table(name)?))
    }

    /// Column names of `table`, in declaration order, each exactly once.
    pub fn columns(&self, table: &str) -> Result<Vec<&str>> {
        Ok(self.catalog.table(table)?.column_names())
    }

    // -------- Get first record matching a filter --------
    pub async fn find_one(&self, table: &str, filter: &Record) -> Result<Option<Record>> {
        let schema = self.catalog.table(table)?;
        let rows = self.select(schema, filter, Some(1)).await?;
        Ok(rows.into_iter().next())
    }

    // -------- Fetch multiple records --------
    pub async fn find(&self, table: &str, filter: &Record) -> Result<Vec<Record>> {
        let schema = self.catalog.table(table)?;
        self.select(schema, filter, None).await
    }

    // -------- Insert a record --------
    pub async fn insert(&self, table: &str, record: Record) -> Result<Record> {
        let schema = self.catalog.table(table)?;
        self.insert_into(schema, record).await
    }

    // -------- Update record --------
    /// Update the row identified by the record's full primary key with the
    /// record's other columns. `None` when no row has that key.
    pub async fn update(&self, table: &str, record: Record) -> Result<Option<Record>> {
        let schema = self.catalog.table(table)?;
        self.update_in(schema, record).await
    }

    /// Update when the whole key is given, insert when only autogenerated key
    /// columns are missing, fail otherwise.
    ///
    /// A full key that matches nothing yields `None`; it never falls back to an
    /// insert.
    pub async fn save(&self, table: &str, record: Record) -> Result<Option<Record>> {
        let schema = self.catalog.table(table)?;
        if schema.key_spec().is_empty() {
            return Err(OrmError::KeylessTable(schema.name.clone()));
        }
        match resolve(schema, &record) {
            KeyPresence::Complete => {
                debug!(table = %schema.name, "save resolved to update");
                self.update_in(schema, record).await
            }
            KeyPresence::PartialAutogen { pending } => {
                debug!(table = %schema.name, ?pending, "save resolved to insert");
                self.insert_into(schema, record).await.map(Some)
            }
            KeyPresence::Invalid { missing } => Err(OrmError::MissingKeyColumns {
                table: schema.name.clone(),
                columns: missing,
            }),
        }
    }

    /// Insert a parent row, then each child through its relation with the
    /// child's foreign key columns taken from the persisted parent.
    ///
    /// Relation names and child columns are checked before anything is
    /// written. Children are inserted in order and the first failure is
    /// returned; rows already written stay written.
    pub async fn insert_deep(&self, table: &str, deep: DeepRecord) -> Result<Record> {
        let schema = self.catalog.table(table)?;
        let DeepRecord { parent, children } = deep;

        let mut plan: Vec<(&Relation, &TableSchema, Vec<Record>)> = Vec::with_capacity(children.len());
        for (name, records) in children {
            let relation = schema
                .get_relation(&name)
                .ok_or_else(|| OrmError::UnknownRelation {
                    table: schema.name.clone(),
                    relation: name.clone(),
                })?;
            let child_schema = self.catalog.table(&relation.child_table)?;
            for record in &records {
                record.check_columns(child_schema)?;
            }
            plan.push((relation, child_schema, records));
        }

        let parent = self.insert_into(schema, parent).await?;

        for (relation, child_schema, records) in plan {
            for mut child in records {
                for (parent_column, child_column) in &relation.columns {
                    let value = parent.get(parent_column).cloned().unwrap_or(Value::Null);
                    child.set(child_column, value);
                }
                if let Err(err) = self.insert_into(child_schema, child).await {
                    warn!(
                        parent = %schema.name,
                        child = %child_schema.name,
                        error = %err,
                        "child insert failed after parent was written"
                    );
                    return Err(err);
                }
            }
        }

        Ok(parent)
    }

    async fn select(
        &self,
        schema: &TableSchema,
        filter: &Record,
        limit: Option<u32>,
    ) -> Result<Vec<Record>> {
        filter.check_columns(schema)?;
        let op = Operation::Select {
            filter: filter.clone(),
            order_by: schema
                .key_spec()
                .names()
                .into_iter()
                .map(str::to_string)
                .collect(),
            limit,
        };
        self.executor.execute(schema, &op).await
    }

    async fn insert_into(&self, schema: &TableSchema, mut record: Record) -> Result<Record> {
        record.check_columns(schema)?;
        if let KeyPresence::Invalid { missing } = resolve(schema, &record) {
            return Err(OrmError::MissingKeyColumns {
                table: schema.name.clone(),
                columns: missing,
            });
        }

        for column in schema.columns.iter().filter(|c| c.is_autogenerated()) {
            match (column.autogen, record.state(&column.name)) {
                (Some(Autogen::Uuid), ColumnState::Absent) => {
                    record.set(&column.name, Uuid::new_v4().to_string());
                }
                // a null autogenerated key is treated as absent; other nulls stay null
                (Some(Autogen::Uuid), ColumnState::Null) if column.primary => {
                    record.set(&column.name, Uuid::new_v4().to_string());
                }
                (Some(Autogen::Store), ColumnState::Null) if column.primary => {
                    record.remove(&column.name);
                }
                _ => {}
            }
        }

        let op = Operation::Insert { record };
        let mut rows = self.executor.execute(schema, &op).await?;
        rows.pop()
            .ok_or_else(|| OrmError::NoRowReturned(schema.name.clone()))
    }

    async fn update_in(&self, schema: &TableSchema, record: Record) -> Result<Option<Record>> {
        record.check_columns(schema)?;
        let key_spec = schema.key_spec();
        if key_spec.is_empty() {
            return Err(OrmError::KeylessTable(schema.name.clone()));
        }
        match resolve(schema, &record) {
            KeyPresence::Complete => {}
            KeyPresence::PartialAutogen { pending: missing } | KeyPresence::Invalid { missing } => {
                return Err(OrmError::MissingKeyColumns {
                    table: schema.name.clone(),
                    columns: missing,
                });
            }
        }

        let (key, values) = record.partition(&key_spec.names());
        if values.is_empty() {
            let rows = self.select(schema, &key, Some(1)).await?;
            return Ok(rows.into_iter().next());
        }

        let op = Operation::Update { key, values };
        let rows = self.executor.execute(schema, &op).await?;
        Ok(rows.into_iter().next())
    }
}
