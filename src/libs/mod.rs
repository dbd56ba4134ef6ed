pub mod config;
pub mod error;
pub mod executor;
pub mod introspect;
pub mod keys;
pub mod memory;
pub mod orm;
pub mod pg;
pub mod query_builder;
pub mod record;
pub mod schema;
pub mod table;
pub mod telemetry;

// Re-export them for easier access from lib.rs
pub use config::*;
pub use error::*;
pub use executor::*;
pub use keys::*;
pub use memory::*;
pub use orm::*;
pub use pg::*;
pub use record::*;
pub use schema::*;
pub use table::*;
pub use telemetry::*;
