#![allow(dead_code)]

use pkmapper::{Catalog, ColumnSchema, MemoryExecutor, Orm, Record, Relation, TableSchema};
use serde_json::Value;

/// The compound key fixture: a plain two-column key, a key whose second
/// column is numbered by the store, and a junction table hanging off each.
pub fn tables() -> Vec<TableSchema> {
    vec![
        TableSchema::new("compoundpk")
            .column(ColumnSchema::new("key_one", "integer").primary())
            .column(ColumnSchema::new("key_two", "integer").primary())
            .column(ColumnSchema::new("value", "text"))
            .relation(Relation::new(
                "junction",
                &[("key_one", "c_key_one"), ("key_two", "c_key_two")],
            )),
        TableSchema::new("compoundserials")
            .column(ColumnSchema::new("key_one", "integer").primary())
            .column(ColumnSchema::new("key_two", "integer").primary().serial())
            .column(ColumnSchema::new("value", "text"))
            .relation(Relation::new(
                "serialjunction",
                &[("key_one", "s_key_one"), ("key_two", "s_key_two")],
            )),
        TableSchema::new("junction")
            .column(ColumnSchema::new("id", "integer").primary().serial())
            .column(ColumnSchema::new("c_key_one", "integer").not_null())
            .column(ColumnSchema::new("c_key_two", "integer").not_null())
            .column(ColumnSchema::new("value", "text")),
        TableSchema::new("serialjunction")
            .column(ColumnSchema::new("id", "integer").primary().serial())
            .column(ColumnSchema::new("s_key_one", "integer").not_null())
            .column(ColumnSchema::new("s_key_two", "integer").not_null())
            .column(ColumnSchema::new("value", "text")),
    ]
}

pub fn catalog() -> Catalog {
    Catalog::new(tables()).unwrap()
}

pub fn memory_orm() -> Orm<MemoryExecutor> {
    pkmapper::init_tracing();
    Orm::new(catalog(), MemoryExecutor::new())
}

pub fn rec(value: Value) -> Record {
    Record::from_json(value).unwrap()
}
