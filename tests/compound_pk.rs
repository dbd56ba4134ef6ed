mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::{memory_orm, rec};
use async_trait::async_trait;
use pkmapper::{
    Catalog, ColumnSchema, DeepRecord, Executor, MemoryExecutor, Operation, Orm, OrmError, Record,
    TableSchema,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

async fn seeded() -> Orm<MemoryExecutor> {
    let orm = memory_orm();
    orm.insert(
        "compoundpk",
        rec(json!({"key_one": 123, "key_two": 456, "value": "hi"})),
    )
    .await
    .unwrap();
    orm
}

#[tokio::test]
async fn finds() {
    let orm = seeded().await;
    let res = orm
        .find_one("compoundpk", &Record::new())
        .await
        .unwrap()
        .unwrap();

    assert!(res.contains("key_one"));
    assert!(res.contains("key_two"));
    assert!(res.contains("value"));
}

#[tokio::test]
async fn find_one_without_match_is_empty() {
    let orm = seeded().await;
    let res = orm
        .find_one("compoundpk", &rec(json!({"key_one": 999})))
        .await
        .unwrap();
    assert!(res.is_none());
}

#[tokio::test]
async fn find_rejects_unknown_columns() {
    let orm = seeded().await;
    let err = orm
        .find_one("compoundpk", &rec(json!({"nope": 1})))
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::UnknownColumn { column, .. } if column == "nope"));
}

#[tokio::test]
async fn inserts() {
    let orm = memory_orm();
    let res = orm
        .insert(
            "compoundpk",
            rec(json!({"key_one": 123, "key_two": 456, "value": "hi"})),
        )
        .await
        .unwrap();

    assert_eq!(res, rec(json!({"key_one": 123, "key_two": 456, "value": "hi"})));
}

#[tokio::test]
async fn deep_inserts() {
    let orm = memory_orm();
    let res = orm
        .table("compoundpk")
        .unwrap()
        .insert_json(json!({
            "key_one": 234,
            "key_two": 567,
            "value": "deep insert test",
            "junction": [{
                "c_key_one": null,
                "c_key_two": null,
                "value": "other side"
            }]
        }))
        .await
        .unwrap();

    assert_eq!(res.get("key_one"), Some(&json!(234)));
    assert_eq!(res.get("key_two"), Some(&json!(567)));
    assert_eq!(res.get("value"), Some(&json!("deep insert test")));

    let junction = orm
        .find_one("junction", &rec(json!({"value": "other side"})))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(junction.get("c_key_one"), Some(&json!(234)));
    assert_eq!(junction.get("c_key_two"), Some(&json!(567)));

    assert_eq!(orm.executor().row_count("compoundpk").await, 1);
    assert_eq!(orm.executor().row_count("junction").await, 1);
}

#[tokio::test]
async fn deep_insert_fills_every_child_and_overwrites_foreign_keys() {
    let orm = memory_orm();
    let deep = DeepRecord::new(rec(json!({"key_one": 1, "key_two": 2})))
        .with_children(
            "junction",
            vec![
                rec(json!({"value": "a"})),
                rec(json!({"c_key_one": 77, "c_key_two": 88, "value": "b"})),
            ],
        );
    orm.insert_deep("compoundpk", deep).await.unwrap();

    let children = orm.find("junction", &Record::new()).await.unwrap();
    assert_eq!(children.len(), 2);
    for child in children {
        assert_eq!(child.get("c_key_one"), Some(&json!(1)));
        assert_eq!(child.get("c_key_two"), Some(&json!(2)));
    }
}

#[tokio::test]
async fn deep_insert_passes_store_assigned_keys_to_children() {
    let orm = memory_orm();
    orm.save("compoundserials", rec(json!({"key_one": 5, "value": "first"})))
        .await
        .unwrap();

    let parent = orm
        .table("compoundserials")
        .unwrap()
        .insert_json(json!({
            "key_one": 5,
            "value": "with children",
            "serialjunction": [{"value": "a"}, {"value": "b"}]
        }))
        .await
        .unwrap();
    let key_two = parent.get("key_two").and_then(|v| v.as_i64()).unwrap();
    assert_eq!(key_two, 2);

    let children = orm.find("serialjunction", &Record::new()).await.unwrap();
    assert_eq!(children.len(), 2);
    for child in children {
        assert_eq!(child.get("s_key_one"), Some(&json!(5)));
        assert_eq!(child.get("s_key_two"), Some(&json!(key_two)));
    }
}

#[tokio::test]
async fn insert_json_keeps_array_columns_on_the_parent() {
    let catalog = Catalog::new(vec![
        TableSchema::new("docs")
            .column(ColumnSchema::new("id", "integer").primary())
            .column(ColumnSchema::new("tags", "jsonb")),
    ])
    .unwrap();
    let orm = Orm::new(catalog, MemoryExecutor::new());

    let row = orm
        .table("docs")
        .unwrap()
        .insert_json(json!({"id": 2, "tags": ["a", "b"]}))
        .await
        .unwrap();
    assert_eq!(row.get("tags"), Some(&json!(["a", "b"])));

    let err = orm
        .table("docs")
        .unwrap()
        .insert_json(json!({"id": 3, "labels": ["c"]}))
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::UnknownRelation { relation, .. } if relation == "labels"));
    assert_eq!(orm.executor().row_count("docs").await, 1);
}

#[tokio::test]
async fn deep_insert_stops_when_the_parent_fails() {
    let orm = seeded().await;
    let deep = DeepRecord::new(rec(json!({"key_one": 123, "key_two": 456})))
        .with_children("junction", vec![rec(json!({"value": "orphan"}))]);

    let err = orm.insert_deep("compoundpk", deep).await.unwrap_err();
    assert!(matches!(err, OrmError::DuplicateKey { .. }));
    assert_eq!(orm.executor().row_count("junction").await, 0);
}

#[tokio::test]
async fn deep_insert_checks_children_before_writing() {
    let orm = memory_orm();
    let unknown_relation = DeepRecord::new(rec(json!({"key_one": 1, "key_two": 1})))
        .with_children("others", vec![rec(json!({"value": "x"}))]);
    let err = orm.insert_deep("compoundpk", unknown_relation).await.unwrap_err();
    assert!(matches!(err, OrmError::UnknownRelation { relation, .. } if relation == "others"));

    let unknown_column = DeepRecord::new(rec(json!({"key_one": 1, "key_two": 1})))
        .with_children("junction", vec![rec(json!({"colour": "x"}))]);
    let err = orm.insert_deep("compoundpk", unknown_column).await.unwrap_err();
    assert!(matches!(err, OrmError::UnknownColumn { column, .. } if column == "colour"));

    assert_eq!(orm.executor().row_count("compoundpk").await, 0);
}

#[tokio::test]
async fn deep_insert_keeps_the_parent_when_a_child_fails() {
    let orm = memory_orm();
    orm.insert(
        "compoundpk",
        rec(json!({"key_one": 9, "key_two": 9})),
    )
    .await
    .unwrap();
    orm.insert(
        "junction",
        rec(json!({"id": 1, "c_key_one": 9, "c_key_two": 9, "value": "taken"})),
    )
    .await
    .unwrap();

    let deep = DeepRecord::new(rec(json!({"key_one": 5, "key_two": 6})))
        .with_children("junction", vec![rec(json!({"id": 1, "value": "clash"}))]);
    let err = orm.insert_deep("compoundpk", deep).await.unwrap_err();
    assert!(matches!(err, OrmError::DuplicateKey { ref table, .. } if table == "junction"));

    let parent = orm
        .find_one("compoundpk", &rec(json!({"key_one": 5, "key_two": 6})))
        .await
        .unwrap();
    assert!(parent.is_some());
    assert_eq!(orm.executor().row_count("junction").await, 1);
}

#[tokio::test]
async fn detects_pk_collisions() {
    let orm = seeded().await;
    let err = orm
        .insert(
            "compoundpk",
            rec(json!({"key_one": 123, "key_two": 456, "value": "changed?"})),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), Some("23505"));
    assert!(matches!(err, OrmError::DuplicateKey { .. }));

    let existing = orm
        .find_one("compoundpk", &rec(json!({"key_one": 123, "key_two": 456})))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(existing.get("value"), Some(&json!("hi")));
    assert_eq!(orm.executor().row_count("compoundpk").await, 1);
}

#[tokio::test]
async fn detects_missing_key_columns() {
    let orm = memory_orm();
    let err = orm
        .insert("compoundpk", rec(json!({"key_one": 123, "value": "oops"})))
        .await
        .unwrap_err();

    assert!(err.is_missing_column());
    assert!(
        matches!(err, OrmError::MissingKeyColumns { ref columns, .. } if columns == &["key_two"])
    );
    assert_eq!(orm.executor().row_count("compoundpk").await, 0);
}

#[tokio::test]
async fn store_reports_missing_required_columns() {
    let orm = memory_orm();
    let err = orm
        .insert("junction", rec(json!({"c_key_one": 1, "value": "half"})))
        .await
        .unwrap_err();

    assert_eq!(err.code(), Some("23502"));
    assert!(matches!(err, OrmError::RequiredColumnMissing { column, .. } if column == "c_key_two"));
}

#[tokio::test]
async fn updates_with_the_single_record_format() {
    let orm = seeded().await;
    let res = orm
        .update(
            "compoundpk",
            rec(json!({"key_one": 123, "key_two": 456, "value": "again"})),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(res, rec(json!({"key_one": 123, "key_two": 456, "value": "again"})));
}

#[tokio::test]
async fn update_of_a_missing_row_returns_nothing() {
    let orm = seeded().await;
    let res = orm
        .update(
            "compoundpk",
            rec(json!({"key_one": 1, "key_two": 1, "value": "ghost"})),
        )
        .await
        .unwrap();
    assert!(res.is_none());
    assert_eq!(orm.executor().row_count("compoundpk").await, 1);
}

#[tokio::test]
async fn update_requires_the_whole_key() {
    let orm = memory_orm();
    let err = orm
        .update("compoundserials", rec(json!({"key_one": 1, "value": "x"})))
        .await
        .unwrap_err();
    assert!(
        matches!(err, OrmError::MissingKeyColumns { ref columns, .. } if columns == &["key_two"])
    );
}

#[tokio::test]
async fn update_with_only_key_columns_reads_the_row() {
    let orm = seeded().await;
    let res = orm
        .update("compoundpk", rec(json!({"key_one": 123, "key_two": 456})))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(res.get("value"), Some(&json!("hi")));
}

#[tokio::test]
async fn saves_over_an_existing_record_if_passed_both_keys() {
    let orm = seeded().await;
    let res = orm
        .save(
            "compoundpk",
            rec(json!({"key_one": 123, "key_two": 456, "value": "yet again"})),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(res.get("key_one"), Some(&json!(123)));
    assert_eq!(res.get("key_two"), Some(&json!(456)));
    assert_eq!(res.get("value"), Some(&json!("yet again")));
    assert_eq!(orm.executor().row_count("compoundpk").await, 1);
}

#[tokio::test]
async fn save_with_an_unknown_full_key_does_not_insert() {
    let orm = seeded().await;
    let res = orm
        .save(
            "compoundpk",
            rec(json!({"key_one": 1, "key_two": 2, "value": "new?"})),
        )
        .await
        .unwrap();
    assert!(res.is_none());
    assert_eq!(orm.executor().row_count("compoundpk").await, 1);
}

#[tokio::test]
async fn fails_to_save_if_a_required_key_is_missing() {
    let orm = seeded().await;
    let err = orm
        .save("compoundpk", rec(json!({"key_one": 123, "value": "oops"})))
        .await
        .unwrap_err();

    assert!(err.is_missing_column());
    let row = orm
        .find_one("compoundpk", &rec(json!({"key_one": 123})))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get("value"), Some(&json!("hi")));
    assert_eq!(orm.executor().row_count("compoundpk").await, 1);
}

#[tokio::test]
async fn saves_and_inserts_a_new_record_if_an_autogenerated_key_is_missing() {
    let orm = memory_orm();
    let first = orm
        .save("compoundserials", rec(json!({"key_one": 123, "value": "try this"})))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(first.get("key_one"), Some(&json!(123)));
    let key_two = first.get("key_two").and_then(|v| v.as_i64()).unwrap();
    assert!(key_two > 0);
    assert_eq!(first.get("value"), Some(&json!("try this")));

    let second = orm
        .save("compoundserials", rec(json!({"key_one": 123, "value": "and this"})))
        .await
        .unwrap()
        .unwrap();
    assert_ne!(second.get("key_two"), first.get("key_two"));
    assert_eq!(orm.executor().row_count("compoundserials").await, 2);
}

#[tokio::test]
async fn keyless_tables_cannot_be_saved() {
    let catalog = Catalog::new(vec![
        TableSchema::new("events").column(ColumnSchema::new("payload", "text")),
    ])
    .unwrap();
    let orm = Orm::new(catalog, MemoryExecutor::new());

    orm.insert("events", rec(json!({"payload": "x"}))).await.unwrap();
    let err = orm
        .save("events", rec(json!({"payload": "y"})))
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::KeylessTable(name) if name == "events"));
}

#[tokio::test]
async fn creates_one_entry_per_column_in_the_columns_array() {
    let orm = memory_orm();
    let columns = orm.columns("compoundpk").unwrap();
    let unique: HashSet<&str> = columns.iter().copied().collect();
    assert_eq!(unique.len(), columns.len());
    assert_eq!(columns, vec!["key_one", "key_two", "value"]);
}

#[tokio::test]
async fn unknown_tables_are_reported() {
    let orm = memory_orm();
    let err = orm.insert("nope", Record::new()).await.unwrap_err();
    assert!(matches!(err, OrmError::UnknownTable(name) if name == "nope"));
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Serial {
    key_one: i64,
    key_two: Option<i64>,
    value: String,
}

#[tokio::test]
async fn typed_tables_round_trip_through_serde() {
    let orm = memory_orm();
    let serials = orm.typed::<Serial>("compoundserials").unwrap();

    let saved = serials
        .save(&Serial {
            key_one: 7,
            key_two: None,
            value: "typed".into(),
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved.key_two, Some(1));

    let updated = serials
        .save(&Serial {
            value: "typed again".into(),
            ..saved
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.value, "typed again");

    let all = serials.find(&Record::new().with("key_one", 7)).await.unwrap();
    assert_eq!(all, vec![updated]);
}

#[tokio::test]
async fn uuid_keys_are_generated_by_the_mapper() {
    let catalog = Catalog::new(vec![
        TableSchema::new("sessions")
            .column(ColumnSchema::new("tenant", "integer").primary())
            .column(ColumnSchema::new("id", "uuid").primary().uuid())
            .column(ColumnSchema::new("label", "text"))
            .column(ColumnSchema::new("token", "uuid").uuid()),
    ])
    .unwrap();
    let orm = Orm::new(catalog, MemoryExecutor::new());

    let row = orm
        .save("sessions", rec(json!({"tenant": 1, "label": "first"})))
        .await
        .unwrap()
        .unwrap();
    let id = row.get("id").and_then(|v| v.as_str()).unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
    let token = row.get("token").and_then(|v| v.as_str()).unwrap();
    assert!(uuid::Uuid::parse_str(token).is_ok());

    let row = orm
        .insert(
            "sessions",
            rec(json!({"tenant": 1, "id": null, "token": null})),
        )
        .await
        .unwrap();
    assert!(row.get("id").and_then(|v| v.as_str()).is_some());
    assert_eq!(row.get("token"), Some(&json!(null)));
}

/// Accepts every statement and returns nothing.
struct SilentStore;

#[async_trait]
impl Executor for SilentStore {
    async fn execute(&self, _table: &TableSchema, _op: &Operation) -> pkmapper::Result<Vec<Record>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn insert_without_a_returned_row_has_no_sqlstate() {
    let orm = Orm::new(common::catalog(), SilentStore);
    let err = orm
        .insert("compoundpk", rec(json!({"key_one": 1, "key_two": 2})))
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::NoRowReturned(ref table) if table == "compoundpk"));
    assert_eq!(err.code(), None);
}

#[tokio::test]
async fn concurrent_saves_get_distinct_generated_keys() {
    let orm = Arc::new(memory_orm());
    let mut handles = Vec::new();
    for i in 0..8 {
        let orm = Arc::clone(&orm);
        handles.push(tokio::spawn(async move {
            orm.save("compoundserials", rec(json!({"key_one": 1, "value": i})))
                .await
        }));
    }

    let mut keys = HashSet::new();
    for handle in handles {
        let row = handle.await.unwrap().unwrap().unwrap();
        keys.insert(row.get("key_two").and_then(|v| v.as_i64()).unwrap());
    }
    assert_eq!(keys.len(), 8);
}
