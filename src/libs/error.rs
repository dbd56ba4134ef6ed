use sqlx::error::DatabaseError;
use sqlx::postgres::PgDatabaseError;
use thiserror::Error;

/// SQLSTATE raised by Postgres for a unique or primary key collision.
pub const UNIQUE_VIOLATION: &str = "23505";
/// SQLSTATE raised by Postgres when a NOT NULL column receives no value.
pub const NOT_NULL_VIOLATION: &str = "23502";

pub type Result<T, E = OrmError> = std::result::Result<T, E>;

/// Every failure the mapper can report.
///
/// Store errors are classified once, where the executor hands them back, so
/// callers match on variants instead of comparing raw SQLSTATE strings. The
/// store's SQLSTATE is still reachable through [`OrmError::code`].
#[derive(Debug, Error)]
pub enum OrmError {
    /// The payload does not carry every key column the operation needs.
    /// Raised before the store is contacted.
    #[error("table {table} is missing key columns: {}", .columns.join(", "))]
    MissingKeyColumns { table: String, columns: Vec<String> },

    #[error("duplicate key value violates unique constraint \"{constraint}\" on table {table}")]
    DuplicateKey { table: String, constraint: String },

    #[error("null value in column \"{column}\" of table {table} violates not-null constraint")]
    RequiredColumnMissing { table: String, column: String },

    /// Any database error without a dedicated variant.
    #[error("database error {code}: {message}")]
    Unclassified { code: String, message: String },

    /// The store accepted an insert but handed no row back.
    #[error("insert into {0} returned no row")]
    NoRowReturned(String),

    #[error("table {0} does not exist")]
    UnknownTable(String),

    #[error("column {column} does not exist on table {table}")]
    UnknownColumn { table: String, column: String },

    #[error("table {table} has no relation named {relation}")]
    UnknownRelation { table: String, relation: String },

    #[error("table {0} has no primary key")]
    KeylessTable(String),

    /// Schema metadata is malformed. Detected when a catalog is built.
    #[error("invalid schema: {0}")]
    Schema(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("record conversion failed: {0}")]
    Decode(#[from] serde_json::Error),

    /// Pool, IO and protocol level failures.
    #[error(transparent)]
    Connection(sqlx::Error),
}

impl OrmError {
    /// SQLSTATE of the store error this variant was translated from.
    pub fn code(&self) -> Option<&str> {
        match self {
            OrmError::DuplicateKey { .. } => Some(UNIQUE_VIOLATION),
            OrmError::RequiredColumnMissing { .. } => Some(NOT_NULL_VIOLATION),
            OrmError::Unclassified { code, .. } if !code.is_empty() => Some(code.as_str()),
            _ => None,
        }
    }

    /// True for both the local key check and the store's not-null check.
    pub fn is_missing_column(&self) -> bool {
        matches!(
            self,
            OrmError::MissingKeyColumns { .. } | OrmError::RequiredColumnMissing { .. }
        )
    }

    /// Translate a sqlx error raised while operating on `table`.
    pub fn from_sqlx(table: Option<&str>, err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => Self::classify(table, db.as_ref()),
            other => OrmError::Connection(other),
        }
    }

    fn classify(table: Option<&str>, db: &(dyn DatabaseError + 'static)) -> Self {
        let pg = db.try_downcast_ref::<PgDatabaseError>();
        let table = table
            .map(str::to_string)
            .or_else(|| pg.and_then(|e| e.table()).map(str::to_string))
            .unwrap_or_default();

        match db.code().as_deref() {
            Some(UNIQUE_VIOLATION) => OrmError::DuplicateKey {
                table,
                constraint: db.constraint().unwrap_or_default().to_string(),
            },
            Some(NOT_NULL_VIOLATION) => OrmError::RequiredColumnMissing {
                table,
                column: pg.and_then(|e| e.column()).unwrap_or_default().to_string(),
            },
            code => OrmError::Unclassified {
                code: code.unwrap_or_default().to_string(),
                message: db.message().to_string(),
            },
        }
    }
}

impl From<sqlx::Error> for OrmError {
    fn from(err: sqlx::Error) -> Self {
        OrmError::from_sqlx(None, err)
    }
}
