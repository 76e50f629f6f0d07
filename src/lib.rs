//! SQLite data-access layer for a small e-commerce shop.
//!
//! # Intention
//!
//! - Keep categories, products, customers and orders in one SQLite file with
//!   enforced foreign keys and a schema applied through migrations.
//! - Offer typed CRUD, filtered and paginated reads, sales reports, and
//!   CSV/JSON import and export on top of a single [`Database`] handle.
//!
//! # Architectural Boundaries
//!
//! - Only storage and reporting code belongs here; the `shop-db` binary is a
//!   thin command-line shell over this API.
//! - Every dynamic identifier is checked against [`schema::catalog_schema`].

pub mod catalog;
pub mod config;
pub mod customers;
pub mod error;
pub mod logging;
pub mod maintenance;
pub mod models;
pub mod orders;
pub mod reports;
pub mod schema;
pub mod sqlite;
pub mod transfer;

pub use config::{JournalMode, LoggingConfig, StoreConfig};
pub use error::{Result, StoreError};
pub use models::*;
pub use schema::Table;
pub use sqlite::{
    CreateOperation, CrudOperation, Database, DeleteOperation, ExecOutcome, Params, Query,
    QueryOperator, ReadOperation, ResultSet, SqlQuery, UpdateOperation, Value,
};
pub use transfer::{ColumnMapping, ImportSummary};
