use crate::libs::record::{ColumnState, Record};
use crate::libs::schema::TableSchema;

/// How completely a record carries its table's primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPresence {
    /// Every key column holds a non-null value.
    Complete,
    /// Every non-autogenerated key column is set; the listed autogenerated
    /// ones are absent or null and will be assigned on insert.
    PartialAutogen { pending: Vec<String> },
    /// The listed non-autogenerated key columns are absent or null.
    Invalid { missing: Vec<String> },
}

/// Classify `record` against the primary key of `table`.
pub fn resolve(table: &TableSchema, record: &Record) -> KeyPresence {
    let mut missing = Vec::new();
    let mut pending = Vec::new();

    for column in table.key_spec().iter() {
        if let ColumnState::Value(_) = record.state(&column.name) {
            continue;
        }
        if column.is_autogenerated() {
            pending.push(column.name.clone());
        } else {
            missing.push(column.name.clone());
        }
    }

    if !missing.is_empty() {
        KeyPresence::Invalid { missing }
    } else if !pending.is_empty() {
        KeyPresence::PartialAutogen { pending }
    } else {
        KeyPresence::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::schema::ColumnSchema;
    use serde_json::Value;

    fn compoundpk() -> TableSchema {
        TableSchema::new("compoundpk")
            .column(ColumnSchema::new("key_one", "integer").primary())
            .column(ColumnSchema::new("key_two", "integer").primary())
            .column(ColumnSchema::new("value", "text"))
    }

    fn compoundserials() -> TableSchema {
        TableSchema::new("compoundserials")
            .column(ColumnSchema::new("key_one", "integer").primary())
            .column(ColumnSchema::new("key_two", "integer").primary().serial())
            .column(ColumnSchema::new("value", "text"))
    }

    #[test]
    fn full_key_is_complete() {
        let record = Record::new()
            .with("key_one", 123)
            .with("key_two", 456)
            .with("value", "hi");
        assert_eq!(resolve(&compoundpk(), &record), KeyPresence::Complete);
        assert_eq!(resolve(&compoundserials(), &record), KeyPresence::Complete);
    }

    #[test]
    fn missing_plain_key_is_invalid() {
        let record = Record::new().with("key_one", 123).with("value", "oops");
        assert_eq!(
            resolve(&compoundpk(), &record),
            KeyPresence::Invalid {
                missing: vec!["key_two".to_string()]
            }
        );
    }

    #[test]
    fn null_counts_as_missing() {
        let record = Record::new()
            .with("key_one", Value::Null)
            .with("key_two", 456);
        assert_eq!(
            resolve(&compoundpk(), &record),
            KeyPresence::Invalid {
                missing: vec!["key_one".to_string()]
            }
        );
    }

    #[test]
    fn missing_autogenerated_key_is_partial() {
        let record = Record::new().with("key_one", 123).with("value", "try this");
        assert_eq!(
            resolve(&compoundserials(), &record),
            KeyPresence::PartialAutogen {
                pending: vec!["key_two".to_string()]
            }
        );
    }

    #[test]
    fn invalid_wins_over_partial() {
        let record = Record::new().with("value", "nothing");
        assert_eq!(
            resolve(&compoundserials(), &record),
            KeyPresence::Invalid {
                missing: vec!["key_one".to_string()]
            }
        );
    }

    #[test]
    fn keyless_tables_are_trivially_complete() {
        let table = TableSchema::new("log").column(ColumnSchema::new("line", "text"));
        assert_eq!(
            resolve(&table, &Record::new().with("line", "x")),
            KeyPresence::Complete
        );
    }
}
