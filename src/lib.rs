//! Async data mapper for tables with compound primary keys.
//!
//! [`Orm`] decides between insert and update from which key columns a
//! record carries, fills foreign keys for nested inserts, and reports store
//! failures as classified [`OrmError`] variants. It runs against Postgres
//! through [`PgExecutor`] or in process through [`MemoryExecutor`].

pub mod libs;

pub use libs::*;
