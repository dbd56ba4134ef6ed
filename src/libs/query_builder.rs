use serde_json::Value;

use crate::libs::executor::Operation;
use crate::libs::record::Record;
use crate::libs::schema::{Autogen, Catalog, TableSchema};

/// Rendered SQL plus the values for its `$n` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Alias every statement gives its target table. Rows come back as
/// `to_jsonb(t)` so each one decodes to a single JSON object.
const ROW_ALIAS: &str = "t";

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Placeholder bookkeeping shared by every statement kind. Each bound value
/// is cast to the column's declared type so JSON numbers and strings land in
/// integer, uuid or timestamp columns alike. Nulls are inlined.
struct Params<'a> {
    table: &'a TableSchema,
    values: Vec<Value>,
}

impl<'a> Params<'a> {
    fn new(table: &'a TableSchema) -> Self {
        Self {
            table,
            values: Vec::new(),
        }
    }

    fn push(&mut self, column: &str, value: &Value) -> String {
        if value.is_null() {
            return "NULL".to_string();
        }
        self.values.push(value.clone());
        match self.table.get_column(column) {
            Some(c) => format!("${}::{}", self.values.len(), c.sql_type),
            None => format!("${}", self.values.len()),
        }
    }
}

pub struct QueryBuilder<'a> {
    params: Params<'a>,
    wheres: Vec<String>,
    order_clause: Option<String>,
    limit_clause: Option<String>,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(table: &'a TableSchema) -> Self {
        Self {
            params: Params::new(table),
            wheres: vec![],
            order_clause: None,
            limit_clause: None,
        }
    }

    pub fn r#where(mut self, column: &str, value: &Value) -> Self {
        let lhs = format!("{}.{}", ROW_ALIAS, quote_ident(column));
        if value.is_null() {
            self.wheres.push(format!("{} IS NULL", lhs));
        } else {
            let rhs = self.params.push(column, value);
            self.wheres.push(format!("{} = {}", lhs, rhs));
        }
        self
    }

    pub fn filter(self, record: &Record) -> Self {
        record
            .iter()
            .fold(self, |builder, (column, value)| builder.r#where(column, value))
    }

    pub fn order_by(mut self, columns: &[String]) -> Self {
        if !columns.is_empty() {
            let cols: Vec<String> = columns
                .iter()
                .map(|c| format!("{}.{}", ROW_ALIAS, quote_ident(c)))
                .collect();
            self.order_clause = Some(format!("ORDER BY {}", cols.join(", ")));
        }
        self
    }

    pub fn limit(mut self, n: u32) -> Self {
        self.limit_clause = Some(format!("LIMIT {}", n));
        self
    }

    pub fn build(self) -> BuiltQuery {
        let mut sql = format!(
            "SELECT to_jsonb({alias}) FROM {} AS {alias}",
            quote_ident(&self.params.table.name),
            alias = ROW_ALIAS
        );
        if !self.wheres.is_empty() {
            sql += &format!(" WHERE {}", self.wheres.join(" AND "));
        }
        if let Some(order) = &self.order_clause {
            sql += &format!(" {}", order);
        }
        if let Some(limit) = &self.limit_clause {
            sql += &format!(" {}", limit);
        }
        BuiltQuery {
            sql,
            params: self.params.values,
        }
    }
}

pub fn insert(table: &TableSchema, record: &Record) -> BuiltQuery {
    let mut params = Params::new(table);
    let target = format!("{} AS {}", quote_ident(&table.name), ROW_ALIAS);

    let sql = if record.is_empty() {
        format!(
            "INSERT INTO {} DEFAULT VALUES RETURNING to_jsonb({})",
            target, ROW_ALIAS
        )
    } else {
        let mut cols = Vec::with_capacity(record.len());
        let mut placeholders = Vec::with_capacity(record.len());
        for (column, value) in record.iter() {
            cols.push(quote_ident(column));
            placeholders.push(params.push(column, value));
        }
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING to_jsonb({})",
            target,
            cols.join(", "),
            placeholders.join(", "),
            ROW_ALIAS
        )
    };

    BuiltQuery {
        sql,
        params: params.values,
    }
}

pub fn update(table: &TableSchema, key: &Record, values: &Record) -> BuiltQuery {
    let mut params = Params::new(table);

    let sets: Vec<String> = values
        .iter()
        .map(|(column, value)| format!("{} = {}", quote_ident(column), params.push(column, value)))
        .collect();
    let conds: Vec<String> = key
        .iter()
        .map(|(column, value)| {
            format!(
                "{}.{} = {}",
                ROW_ALIAS,
                quote_ident(column),
                params.push(column, value)
            )
        })
        .collect();

    let mut sql = format!(
        "UPDATE {} AS {} SET {}",
        quote_ident(&table.name),
        ROW_ALIAS,
        sets.join(", ")
    );
    if !conds.is_empty() {
        sql += &format!(" WHERE {}", conds.join(" AND "));
    }
    sql += &format!(" RETURNING to_jsonb({})", ROW_ALIAS);

    BuiltQuery {
        sql,
        params: params.values,
    }
}

pub fn render(table: &TableSchema, op: &Operation) -> BuiltQuery {
    match op {
        Operation::Select {
            filter,
            order_by,
            limit,
        } => {
            let builder = QueryBuilder::new(table).filter(filter).order_by(order_by);
            match limit {
                Some(n) => builder.limit(*n).build(),
                None => builder.build(),
            }
        }
        Operation::Insert { record } => insert(table, record),
        Operation::Update { key, values } => update(table, key, values),
    }
}

/// `CREATE TABLE IF NOT EXISTS` for `table`, with a table level primary key
/// in key order and a foreign key for every relation that targets it.
pub fn create_table(table: &TableSchema, catalog: &Catalog) -> String {
    let mut defs: Vec<String> = table
        .columns
        .iter()
        .map(|c| {
            let mut col_def = format!("{} {}", quote_ident(&c.name), c.sql_type);
            if c.autogen == Some(Autogen::Store) {
                col_def.push_str(" GENERATED BY DEFAULT AS IDENTITY")
            }
            if c.not_null {
                col_def.push_str(" NOT NULL")
            }
            if c.unique {
                col_def.push_str(" UNIQUE")
            }
            col_def
        })
        .collect();

    let key = table.key_spec();
    if !key.is_empty() {
        let cols: Vec<String> = key.names().into_iter().map(quote_ident).collect();
        defs.push(format!("PRIMARY KEY ({})", cols.join(", ")));
    }

    for parent in catalog.tables() {
        for relation in parent.relations.iter().filter(|r| r.child_table == table.name) {
            let (parent_cols, child_cols): (Vec<String>, Vec<String>) = relation
                .columns
                .iter()
                .map(|(p, c)| (quote_ident(p), quote_ident(c)))
                .unzip();
            defs.push(format!(
                "FOREIGN KEY ({}) REFERENCES {} ({})",
                child_cols.join(", "),
                quote_ident(&parent.name),
                parent_cols.join(", ")
            ));
        }
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(&table.name),
        defs.join(", ")
    )
}
