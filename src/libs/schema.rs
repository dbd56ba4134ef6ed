// schema.rs
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::libs::error::{OrmError, Result};

/// Who fills a column when an insert leaves it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Autogen {
    /// The store assigns the value (identity, serial, column default).
    Store,
    /// The mapper generates a v4 UUID before the insert is sent.
    Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub sql_type: String,
    pub primary: bool,
    pub unique: bool,
    pub not_null: bool,
    pub autogen: Option<Autogen>,
}

impl ColumnSchema {
    pub fn new(name: &str, sql_type: &str) -> Self {
        Self {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            primary: false,
            unique: false,
            not_null: false,
            autogen: None,
        }
    }

    /// Mark the column as part of the primary key. Key columns are never null.
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self.not_null = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Value assigned by the store when absent (identity or sequence).
    pub fn serial(mut self) -> Self {
        self.autogen = Some(Autogen::Store);
        self
    }

    /// Value generated as a v4 UUID by the mapper when absent.
    pub fn uuid(mut self) -> Self {
        self.autogen = Some(Autogen::Uuid);
        self
    }

    pub fn is_autogenerated(&self) -> bool {
        self.autogen.is_some()
    }
}

/// Parent to child foreign key link used by nested inserts.
///
/// `columns` pairs each parent key column with the child column that
/// references it, e.g. `("key_one", "c_key_one")`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub name: String,
    pub child_table: String,
    pub columns: Vec<(String, String)>,
}

impl Relation {
    /// A relation named after its child table, the way nested payloads refer to it.
    pub fn new(child_table: &str, columns: &[(&str, &str)]) -> Self {
        Self::named(child_table, child_table, columns)
    }

    pub fn named(name: &str, child_table: &str, columns: &[(&str, &str)]) -> Self {
        Self {
            name: name.to_string(),
            child_table: child_table.to_string(),
            columns: columns
                .iter()
                .map(|(parent, child)| (parent.to_string(), child.to_string()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyColumn {
    pub name: String,
    pub autogen: Option<Autogen>,
}

impl KeyColumn {
    pub fn is_autogenerated(&self) -> bool {
        self.autogen.is_some()
    }
}

/// Ordered primary key of a table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeySpec {
    columns: Vec<KeyColumn>,
}

impl KeySpec {
    pub fn iter(&self) -> impl Iterator<Item = &KeyColumn> {
        self.columns.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.name == column)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
    /// Key column order when it differs from declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub relations: Vec<Relation>,
}

impl TableSchema {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnSchema) -> Self {
        self.columns.push(column);
        self
    }

    /// Order the primary key as `columns` instead of by declaration.
    /// Every name must be a column marked [`ColumnSchema::primary`].
    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn get_column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn get_relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Primary key columns, in `primary_key` order when one is set and in
    /// declaration order otherwise.
    pub fn key_spec(&self) -> KeySpec {
        let mut keys: Vec<&ColumnSchema> = self.columns.iter().filter(|c| c.primary).collect();
        if !self.primary_key.is_empty() {
            keys.sort_by_key(|c| {
                self.primary_key
                    .iter()
                    .position(|k| *k == c.name)
                    .unwrap_or(usize::MAX)
            });
        }
        KeySpec {
            columns: keys
                .into_iter()
                .map(|c| KeyColumn {
                    name: c.name.clone(),
                    autogen: c.autogen,
                })
                .collect(),
        }
    }

    /// Structural checks run once when the schema is loaded.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(OrmError::Schema(format!(
                    "column {} is declared twice on table {}",
                    column.name, self.name
                )));
            }
        }

        if !self.primary_key.is_empty() {
            let flagged = self.columns.iter().filter(|c| c.primary).count();
            let listed: HashSet<&str> = self.primary_key.iter().map(String::as_str).collect();
            let all_flagged = self
                .primary_key
                .iter()
                .all(|k| self.get_column(k).is_some_and(|c| c.primary));
            if !all_flagged || listed.len() != self.primary_key.len() || listed.len() != flagged {
                return Err(OrmError::Schema(format!(
                    "primary key order of table {} does not match its key columns",
                    self.name
                )));
            }
        }

        let mut relation_names = HashSet::new();
        for relation in &self.relations {
            if !relation_names.insert(relation.name.as_str()) {
                return Err(OrmError::Schema(format!(
                    "relation {} is declared twice on table {}",
                    relation.name, self.name
                )));
            }
            if relation.columns.is_empty() {
                return Err(OrmError::Schema(format!(
                    "relation {} on table {} maps no columns",
                    relation.name, self.name
                )));
            }
            for (parent, _) in &relation.columns {
                if self.get_column(parent).is_none() {
                    return Err(OrmError::Schema(format!(
                        "relation {} references unknown column {}.{}",
                        relation.name, self.name, parent
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Loaded table metadata. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: Vec<TableSchema>,
}

impl Catalog {
    /// Build a catalog, validating every table and every relation target.
    pub fn new(tables: Vec<TableSchema>) -> Result<Self> {
        let mut names = HashSet::new();
        for table in &tables {
            table.validate()?;
            if !names.insert(table.name.as_str()) {
                return Err(OrmError::Schema(format!(
                    "table {} is declared twice",
                    table.name
                )));
            }
        }

        for table in &tables {
            for relation in &table.relations {
                let child = tables
                    .iter()
                    .find(|t| t.name == relation.child_table)
                    .ok_or_else(|| {
                        OrmError::Schema(format!(
                            "relation {} on table {} targets unknown table {}",
                            relation.name, table.name, relation.child_table
                        ))
                    })?;
                for (_, column) in &relation.columns {
                    if child.get_column(column).is_none() {
                        return Err(OrmError::Schema(format!(
                            "relation {} references unknown column {}.{}",
                            relation.name, child.name, column
                        )));
                    }
                }
            }
        }

        Ok(Self { tables })
    }

    pub fn table(&self, name: &str) -> Result<&TableSchema> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| OrmError::UnknownTable(name.to_string()))
    }

    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    /// Tables ordered so every relation's parent precedes its child.
    pub fn creation_order(&self) -> Result<Vec<&TableSchema>> {
        let mut ordered: Vec<&TableSchema> = Vec::with_capacity(self.tables.len());
        let mut placed: HashSet<&str> = HashSet::new();

        while ordered.len() < self.tables.len() {
            let before = ordered.len();
            for table in &self.tables {
                if placed.contains(table.name.as_str()) {
                    continue;
                }
                let parents_ready = self.tables.iter().all(|parent| {
                    parent.name == table.name
                        || placed.contains(parent.name.as_str())
                        || !parent
                            .relations
                            .iter()
                            .any(|r| r.child_table == table.name)
                });
                if parents_ready {
                    placed.insert(table.name.as_str());
                    ordered.push(table);
                }
            }
            if ordered.len() == before {
                return Err(OrmError::Schema(
                    "relations between tables form a cycle".to_string(),
                ));
            }
        }
        Ok(ordered)
    }
}
