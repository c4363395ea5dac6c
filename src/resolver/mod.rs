//! Resolver strategies — per-type translation between domain objects and
//! physical storage operations.
//!
//! All resolver traits are pure strategy objects: `Send + Sync`, no shared
//! mutable state, safe to invoke concurrently for different objects.

pub mod delete;
pub mod get;
pub mod put;

pub use delete::{
    ByQueryDeleteResolver, DefaultDeleteResolver, DeleteMapping, DeleteResolver, DeleteResult,
};
pub use get::{GetResolver, RowGetResolver};
pub use put::{DefaultPutResolver, PutMapping, PutOutcome, PutResolver, PutResult};
