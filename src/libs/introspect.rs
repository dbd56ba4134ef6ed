use std::collections::{BTreeMap, HashMap, HashSet};

use sqlx::PgPool;
use tracing::{debug, info};

use crate::libs::error::Result;
use crate::libs::schema::{Autogen, Catalog, ColumnSchema, Relation, TableSchema};

const COLUMNS_SQL: &str = "
SELECT c.table_name::text, c.column_name::text, c.udt_name::text,
       c.is_nullable::text, c.column_default::text, c.is_identity::text
FROM information_schema.columns c
JOIN information_schema.tables t
  ON t.table_schema = c.table_schema AND t.table_name = c.table_name
WHERE c.table_schema = $1 AND t.table_type = 'BASE TABLE'
ORDER BY c.table_name, c.ordinal_position";

const KEYS_SQL: &str = "
SELECT tc.table_name::text, tc.constraint_name::text, tc.constraint_type::text,
       kcu.column_name::text
FROM information_schema.table_constraints tc
JOIN information_schema.key_column_usage kcu
  ON kcu.constraint_schema = tc.constraint_schema
 AND kcu.constraint_name = tc.constraint_name
 AND kcu.table_name = tc.table_name
WHERE tc.table_schema = $1 AND tc.constraint_type IN ('PRIMARY KEY', 'UNIQUE')
ORDER BY tc.table_name, tc.constraint_name, kcu.ordinal_position";

const FOREIGN_KEYS_SQL: &str = "
SELECT kcu.constraint_name::text, kcu.table_name::text, kcu.column_name::text,
       pk.table_name::text, pk.column_name::text
FROM information_schema.referential_constraints rc
JOIN information_schema.key_column_usage kcu
  ON kcu.constraint_schema = rc.constraint_schema
 AND kcu.constraint_name = rc.constraint_name
JOIN information_schema.key_column_usage pk
  ON pk.constraint_schema = rc.unique_constraint_schema
 AND pk.constraint_name = rc.unique_constraint_name
 AND pk.ordinal_position = kcu.position_in_unique_constraint
WHERE kcu.table_schema = $1
ORDER BY kcu.constraint_name, kcu.ordinal_position";

type ColumnRow = (String, String, String, String, Option<String>, String);
type KeyRow = (String, String, String, String);
type ForeignKeyRow = (String, String, String, String, String);

/// Column defaults that mean the store fills the value.
fn store_default(default: Option<&str>, is_identity: &str) -> bool {
    is_identity == "YES"
        || default.is_some_and(|d| {
            d.starts_with("nextval(") || d.contains("gen_random_uuid()") || d.contains("uuid_generate_v")
        })
}

impl Catalog {
    /// Load every base table in `schema` from `information_schema`.
    ///
    /// Columns keep the table's ordinal order and primary keys their
    /// constraint column order. Columns with an
    /// identity, sequence or uuid default count as autogenerated. Each foreign
    /// key becomes a relation on the referenced table, named after the child
    /// table, or after the constraint when one child references the same
    /// parent twice.
    pub async fn introspect(pool: &PgPool, schema: &str) -> Result<Catalog> {
        let columns: Vec<ColumnRow> = sqlx::query_as(COLUMNS_SQL)
            .bind(schema)
            .fetch_all(pool)
            .await?;
        let keys: Vec<KeyRow> = sqlx::query_as(KEYS_SQL).bind(schema).fetch_all(pool).await?;
        let foreign_keys: Vec<ForeignKeyRow> = sqlx::query_as(FOREIGN_KEYS_SQL)
            .bind(schema)
            .fetch_all(pool)
            .await?;

        let tables = assemble(columns, keys, foreign_keys);
        info!(schema, tables = tables.len(), "introspected schema");
        Catalog::new(tables)
    }
}

fn assemble(
    columns: Vec<ColumnRow>,
    keys: Vec<KeyRow>,
    foreign_keys: Vec<ForeignKeyRow>,
) -> Vec<TableSchema> {
    // primary key columns in constraint order, single column unique constraints
    let mut primary: HashMap<String, Vec<String>> = HashMap::new();
    let mut unique: HashMap<(String, String), Vec<String>> = HashMap::new();
    for (table, constraint, kind, column) in keys {
        if kind == "PRIMARY KEY" {
            primary.entry(table).or_default().push(column);
        } else {
            unique.entry((table, constraint)).or_default().push(column);
        }
    }
    let unique_columns: HashSet<(String, String)> = unique
        .into_iter()
        .filter(|(_, cols)| cols.len() == 1)
        .map(|((table, _), mut cols)| (table, cols.remove(0)))
        .collect();

    let mut tables: Vec<TableSchema> = Vec::new();
    for (table, name, udt, nullable, default, identity) in columns {
        if tables.last().map(|t| t.name != table).unwrap_or(true) {
            tables.push(TableSchema::new(&table));
        }
        let mut column = ColumnSchema::new(&name, &udt);
        column.not_null = nullable == "NO";
        column.unique = unique_columns.contains(&(table.clone(), name.clone()));
        if store_default(default.as_deref(), &identity) {
            column.autogen = Some(Autogen::Store);
        }
        if let Some(last) = tables.last_mut() {
            last.columns.push(column);
        }
    }

    // columns keep ordinal order; the key keeps constraint order
    for table in &mut tables {
        if let Some(key) = primary.get(&table.name) {
            for column in &mut table.columns {
                column.primary = key.contains(&column.name);
            }
            table.primary_key = key.clone();
        }
    }

    let mut grouped: BTreeMap<String, (String, String, Vec<(String, String)>)> = BTreeMap::new();
    for (constraint, child, child_column, parent, parent_column) in foreign_keys {
        grouped
            .entry(constraint)
            .or_insert_with(|| (child, parent, Vec::new()))
            .2
            .push((parent_column, child_column));
    }

    let mut pair_counts: HashMap<(String, String), usize> = HashMap::new();
    for (child, parent, _) in grouped.values() {
        *pair_counts.entry((child.clone(), parent.clone())).or_default() += 1;
    }

    for (constraint, (child, parent, columns)) in grouped {
        let name = if pair_counts[&(child.clone(), parent.clone())] > 1 {
            constraint
        } else {
            child.clone()
        };
        if let Some(table) = tables.iter_mut().find(|t| t.name == parent) {
            debug!(parent = %table.name, child = %child, relation = %name, "found relation");
            table.relations.push(Relation {
                name,
                child_table: child,
                columns,
            });
        }
    }

    tables
}
