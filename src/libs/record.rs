use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::libs::error::{OrmError, Result};
use crate::libs::schema::TableSchema;

/// How a single column appears in a record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnState<'a> {
    Value(&'a Value),
    Null,
    Absent,
}

impl ColumnState<'_> {
    pub fn is_set(&self) -> bool {
        matches!(self, ColumnState::Value(_))
    }
}

/// A row payload: column name to JSON value.
///
/// A column that is missing from the map is absent; a column mapped to
/// `Value::Null` is present but null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from a JSON object.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self::from(map)),
            other => Err(OrmError::Decode(serde::de::Error::custom(format!(
                "expected a JSON object, got {other}"
            )))),
        }
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.0.clone().into_iter().collect())
    }

    /// Chainable setter.
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        self.0.insert(column.to_string(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.0.remove(column)
    }

    pub fn state(&self, column: &str) -> ColumnState<'_> {
        match self.0.get(column) {
            None => ColumnState::Absent,
            Some(Value::Null) => ColumnState::Null,
            Some(value) => ColumnState::Value(value),
        }
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Split into the columns named in `keys` and everything else.
    pub fn partition(self, keys: &[&str]) -> (Record, Record) {
        let (key, rest): (BTreeMap<_, _>, BTreeMap<_, _>) = self
            .0
            .into_iter()
            .partition(|(column, _)| keys.contains(&column.as_str()));
        (Record(key), Record(rest))
    }

    /// Fails on the first column the table does not declare.
    pub fn check_columns(&self, table: &TableSchema) -> Result<()> {
        match self.columns().find(|c| table.get_column(c).is_none()) {
            Some(column) => Err(OrmError::UnknownColumn {
                table: table.name.clone(),
                column: column.to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Record(map.into_iter().collect())
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Record(iter.into_iter().collect())
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A parent payload plus the child payloads to insert through its relations.
///
/// Children are keyed by relation name. Their foreign key columns are filled
/// from the persisted parent, so payloads may leave them out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeepRecord {
    pub parent: Record,
    pub children: BTreeMap<String, Vec<Record>>,
}

impl DeepRecord {
    pub fn new(parent: Record) -> Self {
        Self {
            parent,
            children: BTreeMap::new(),
        }
    }

    pub fn with_children(mut self, relation: &str, children: Vec<Record>) -> Self {
        self.children
            .entry(relation.to_string())
            .or_default()
            .extend(children);
        self
    }

    /// Split a JSON object into parent columns and child arrays.
    ///
    /// An array field named after one of `table`'s relations becomes that
    /// relation's children and must hold objects only. An array field named
    /// after a column is a column value. Any other array field is an unknown
    /// relation.
    pub fn split(table: &TableSchema, value: Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(OrmError::Decode(serde::de::Error::custom(
                "expected a JSON object for a nested insert",
            )));
        };

        let mut deep = DeepRecord::default();
        for (field, value) in map {
            match value {
                Value::Array(items) if table.get_relation(&field).is_some() => {
                    let children = items
                        .into_iter()
                        .map(Record::from_json)
                        .collect::<Result<Vec<_>>>()?;
                    deep.children.entry(field).or_default().extend(children);
                }
                Value::Array(_) if table.get_column(&field).is_none() => {
                    return Err(OrmError::UnknownRelation {
                        table: table.name.clone(),
                        relation: field,
                    });
                }
                other => deep.parent.set(&field, other),
            }
        }
        Ok(deep)
    }
}
