//! pgstamp - Template database cache for PostgreSQL
//!
//! Initializing a database with a large module set is slow. pgstamp keeps
//! fully built databases as templates named after a fingerprint of their
//! recipe, and clones them with `CREATE DATABASE ... TEMPLATE` on the next
//! request for the same recipe.

pub mod build;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod provision;
pub mod store;
pub mod ui;

pub use error::{PgstampError, PgstampResult};
