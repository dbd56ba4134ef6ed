use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::trace;

use crate::libs::error::{OrmError, Result};
use crate::libs::executor::{Executor, Operation};
use crate::libs::record::Record;
use crate::libs::schema::{Autogen, TableSchema};

#[derive(Debug, Default)]
struct MemTable {
    rows: Vec<Record>,
    sequences: HashMap<String, i64>,
}

/// In-process executor that enforces the same constraints Postgres would:
/// primary key and single column uniqueness, NOT NULL, and sequence values
/// for store-generated columns. Errors are classified like the Postgres ones.
#[derive(Debug, Default)]
pub struct MemoryExecutor {
    tables: RwLock<HashMap<String, MemTable>>,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently stored in `table`.
    pub async fn row_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .await
            .get(table)
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }
}

fn matches(row: &Record, filter: &Record) -> bool {
    filter
        .iter()
        .all(|(column, expected)| row.get(column).unwrap_or(&Value::Null) == expected)
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        // nulls sort last, as in Postgres ascending order
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Greater,
        (_, None | Some(Value::Null)) => Ordering::Less,
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

fn check_not_null(schema: &TableSchema, row: &Record) -> Result<()> {
    for column in schema.columns.iter().filter(|c| c.not_null) {
        if row.get(&column.name).unwrap_or(&Value::Null).is_null() {
            return Err(OrmError::RequiredColumnMissing {
                table: schema.name.clone(),
                column: column.name.clone(),
            });
        }
    }
    Ok(())
}

/// Fails when `row` collides with any stored row other than `skip`.
fn check_unique(
    schema: &TableSchema,
    rows: &[Record],
    row: &Record,
    skip: Option<usize>,
) -> Result<()> {
    let others = || {
        rows.iter()
            .enumerate()
            .filter(move |(i, _)| Some(*i) != skip)
            .map(|(_, r)| r)
    };

    let key = schema.key_spec();
    if !key.is_empty() {
        let names = key.names();
        if others().any(|r| names.iter().all(|c| r.get(c) == row.get(c))) {
            return Err(OrmError::DuplicateKey {
                table: schema.name.clone(),
                constraint: format!("{}_pkey", schema.name),
            });
        }
    }

    for column in schema.columns.iter().filter(|c| c.unique && !c.primary) {
        let value = row.get(&column.name).unwrap_or(&Value::Null);
        if value.is_null() {
            continue;
        }
        if others().any(|r| r.get(&column.name) == Some(value)) {
            return Err(OrmError::DuplicateKey {
                table: schema.name.clone(),
                constraint: format!("{}_{}_key", schema.name, column.name),
            });
        }
    }
    Ok(())
}

impl MemTable {
    fn select(&self, filter: &Record, order_by: &[String], limit: Option<u32>) -> Vec<Record> {
        let mut found: Vec<Record> = self
            .rows
            .iter()
            .filter(|row| matches(row, filter))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            order_by
                .iter()
                .map(|c| compare(a.get(c), b.get(c)))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        });
        if let Some(n) = limit {
            found.truncate(n as usize);
        }
        found
    }

    fn insert(&mut self, schema: &TableSchema, record: &Record) -> Result<Record> {
        let mut row = Record::new();
        for column in &schema.columns {
            match record.get(&column.name) {
                Some(value) => row.set(&column.name, value.clone()),
                None if column.autogen == Some(Autogen::Store) => {
                    let next = self.sequences.entry(column.name.clone()).or_insert(0);
                    *next += 1;
                    row.set(&column.name, *next);
                }
                None => row.set(&column.name, Value::Null),
            }
        }
        if let Some(column) = record.columns().find(|c| schema.get_column(c).is_none()) {
            return Err(OrmError::UnknownColumn {
                table: schema.name.clone(),
                column: column.to_string(),
            });
        }

        check_not_null(schema, &row)?;
        check_unique(schema, &self.rows, &row, None)?;
        self.rows.push(row.clone());
        Ok(row)
    }

    fn update(&mut self, schema: &TableSchema, key: &Record, values: &Record) -> Result<Vec<Record>> {
        let targets: Vec<usize> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| matches(row, key))
            .map(|(i, _)| i)
            .collect();

        // validate every row before touching any, so a failure changes nothing
        let mut updated = Vec::with_capacity(targets.len());
        for &i in &targets {
            let mut row = self.rows[i].clone();
            for (column, value) in values.iter() {
                row.set(column, value.clone());
            }
            check_not_null(schema, &row)?;
            check_unique(schema, &self.rows, &row, Some(i))?;
            updated.push((i, row));
        }

        Ok(updated
            .into_iter()
            .map(|(i, row)| {
                self.rows[i] = row.clone();
                row
            })
            .collect())
    }
}

#[async_trait]
impl Executor for MemoryExecutor {
    async fn execute(&self, table: &TableSchema, op: &Operation) -> Result<Vec<Record>> {
        trace!(table = %table.name, ?op, "memory execute");
        let mut tables = self.tables.write().await;
        let mem = tables.entry(table.name.clone()).or_default();
        match op {
            Operation::Select {
                filter,
                order_by,
                limit,
            } => Ok(mem.select(filter, order_by, *limit)),
            Operation::Insert { record } => mem.insert(table, record).map(|row| vec![row]),
            Operation::Update { key, values } => mem.update(table, key, values),
        }
    }
}
