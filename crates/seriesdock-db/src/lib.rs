//! Seriesdock-DB: catalog schema, migrations, and query operations.
//!
//! This crate provides database functionality for seriesdock using SQLite
//! with rusqlite and r2d2 connection pooling.
//!
//! # Modules
//!
//! - `migrations` - Database schema migrations
//! - `pool` - Connection pool management
//! - `models` - Rust models matching the database schema
//! - `queries` - Database query operations
//!
//! # Example
//!
//! ```no_run
//! use seriesdock_db::pool::{init_pool, get_conn};
//! use seriesdock_db::queries::collections;
//!
//! let pool = init_pool("/var/lib/seriesdock/catalog.sqlite").unwrap();
//! let conn = get_conn(&pool).unwrap();
//!
//! let collection = collections::create_collection(&conn, "Crime Dramas", Some(99)).unwrap();
//! println!("Created collection: {}", collection.slug);
//! ```

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;

pub use pool::{get_conn, DbPool, PooledConnection};
