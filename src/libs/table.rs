use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::libs::error::Result;
use crate::libs::executor::Executor;
use crate::libs::orm::Orm;
use crate::libs::record::{DeepRecord, Record};
use crate::libs::schema::{KeySpec, TableSchema};

/// A handle to one table of an [`Orm`].
pub struct TableHandle<'a, E> {
    orm: &'a Orm<E>,
    schema: &'a TableSchema,
}

impl<E> Clone for TableHandle<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for TableHandle<'_, E> {}

impl<'a, E: Executor> TableHandle<'a, E> {
    pub(crate) fn new(orm: &'a Orm<E>, schema: &'a TableSchema) -> Self {
        Self { orm, schema }
    }

    pub fn name(&self) -> &'a str {
        &self.schema.name
    }

    pub fn schema(&self) -> &'a TableSchema {
        self.schema
    }

    pub fn key_spec(&self) -> KeySpec {
        self.schema.key_spec()
    }

    /// Column names in declaration order.
    pub fn columns(&self) -> Vec<&'a str> {
        self.schema.column_names()
    }

    /// First row matching `filter`, ordered by primary key.
    ///
    /// # Example
    /// ```ignore
    /// let row = orm.table("junction")?
    ///     .find_one(&Record::new().with("value", "other side"))
    ///     .await?;
    /// ```
    pub async fn find_one(&self, filter: &Record) -> Result<Option<Record>> {
        self.orm.find_one(self.name(), filter).await
    }

    pub async fn find(&self, filter: &Record) -> Result<Vec<Record>> {
        self.orm.find(self.name(), filter).await
    }

    pub async fn insert(&self, record: Record) -> Result<Record> {
        self.orm.insert(self.name(), record).await
    }

    pub async fn update(&self, record: Record) -> Result<Option<Record>> {
        self.orm.update(self.name(), record).await
    }

    pub async fn save(&self, record: Record) -> Result<Option<Record>> {
        self.orm.save(self.name(), record).await
    }

    pub async fn insert_deep(&self, deep: DeepRecord) -> Result<Record> {
        self.orm.insert_deep(self.name(), deep).await
    }

    /// Nested insert from one JSON object whose relation-named array fields
    /// hold the child payloads.
    ///
    /// # Example
    /// ```ignore
    /// orm.table("compoundpk")?.insert_json(json!({
    ///     "key_one": 234, "key_two": 567, "value": "deep insert test",
    ///     "junction": [{ "value": "other side" }]
    /// })).await?;
    /// ```
    pub async fn insert_json(&self, value: Value) -> Result<Record> {
        let deep = DeepRecord::split(self.schema, value)?;
        self.insert_deep(deep).await
    }
}

/// A table handle that speaks in `T` instead of records.
///
/// `T` is converted through `serde_json`; fields must be named like the
/// table's columns. A `None` autogenerated key column is treated as absent,
/// so `Option` key fields work for rows the store numbers.
pub struct Table<'a, T, E> {
    handle: TableHandle<'a, E>,
    _marker: PhantomData<T>,
}

impl<'a, T, E> Table<'a, T, E> {
    pub fn new(handle: TableHandle<'a, E>) -> Self {
        Self {
            handle,
            _marker: PhantomData,
        }
    }

    pub fn handle(&self) -> TableHandle<'a, E> {
        self.handle
    }
}

impl<'a, T, E> Table<'a, T, E>
where
    T: Serialize + DeserializeOwned + Send + Sync,
    E: Executor,
{
    fn to_record(item: &T) -> Result<Record> {
        Record::from_json(serde_json::to_value(item)?)
    }

    fn from_record(record: Record) -> Result<T> {
        Ok(serde_json::from_value(record.to_json())?)
    }

    pub async fn find_one(&self, filter: &Record) -> Result<Option<T>> {
        self.handle
            .find_one(filter)
            .await?
            .map(Self::from_record)
            .transpose()
    }

    pub async fn find(&self, filter: &Record) -> Result<Vec<T>> {
        self.handle
            .find(filter)
            .await?
            .into_iter()
            .map(Self::from_record)
            .collect()
    }

    pub async fn insert(&self, item: &T) -> Result<T> {
        let record = self.handle.insert(Self::to_record(item)?).await?;
        Self::from_record(record)
    }

    pub async fn update(&self, item: &T) -> Result<Option<T>> {
        self.handle
            .update(Self::to_record(item)?)
            .await?
            .map(Self::from_record)
            .transpose()
    }

    pub async fn save(&self, item: &T) -> Result<Option<T>> {
        self.handle
            .save(Self::to_record(item)?)
            .await?
            .map(Self::from_record)
            .transpose()
    }
}
