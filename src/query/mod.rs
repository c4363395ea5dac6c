//! Operation descriptors — immutable value objects consumed by the executor.

pub mod types;

pub use types::{DeleteQuery, GetQuery, InsertQuery, Query, RawQuery, UpdateQuery};
