//! chainview-store - SQLite persistence for continuation chain data
//!
//! This crate owns the on-disk session index and the continuation edge list.
//! Both tables are rebuildable from a full transcript scan and incrementally
//! updatable from partial rescans; the engine crate drives the writes and the
//! resolver consumes consistent [`chainview_core::ChainSnapshot`] reads.

pub mod connection;
pub mod edges;
pub mod schema;
pub mod sessions;

pub use connection::{default_db_path, ChainStore, StoreError};
pub use schema::{init_schema, migrate_schema, DB_VERSION};
