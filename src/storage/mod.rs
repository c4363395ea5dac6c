//! Storage backends.
//!
//! [`traits`] defines the narrow raw-I/O surface the executor drives;
//! [`sqlite`] is the bundled implementation over rusqlite.

pub mod sqlite;
pub mod traits;

pub use sqlite::SqliteBackend;
pub use traits::{ResultSet, Row, StorageBackend};
