//! SQLite backend for the Elicit evidence store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every call runs on that one thread,
//! which makes each push's scan-then-insert atomic with respect to every
//! other caller.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
