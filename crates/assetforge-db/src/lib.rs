//! assetforge-db: catalog schema, migrations, and query operations
//!
//! The catalog is a SQLite database accessed through rusqlite with r2d2
//! connection pooling. It stores assets, their tags, and the history of
//! compression jobs run against them.
//!
//! # Modules
//!
//! - `migrations` - Embedded schema migrations
//! - `pool` - Connection pool management
//! - `models` - Rust models matching the database schema
//! - `queries` - Per-table query operations
//!
//! # Example
//!
//! ```no_run
//! use assetforge_db::pool::{init_pool, get_conn};
//! use assetforge_db::queries::compression_jobs;
//! use assetforge_common::AssetId;
//!
//! let pool = init_pool("./data/assets.db").unwrap();
//! let conn = get_conn(&pool).unwrap();
//!
//! let history = compression_jobs::list_jobs_for_asset(&conn, AssetId::new()).unwrap();
//! println!("{} jobs", history.len());
//! ```

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
