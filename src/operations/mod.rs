//! Prepared operations.
//!
//! A prepared operation pairs one descriptor (or object) with the store
//! that will execute it. Every prepared operation offers blocking
//! execution and one-shot deferred execution; reads additionally offer a
//! continuous live stream. All three run the same dispatch path: the
//! interceptor chain wraps a terminal call that resolves the type mapping,
//! invokes the resolver, and publishes change notifications.

pub mod delete;
mod deferred;
pub mod execute;
pub mod get;
pub mod put;

pub use deferred::Deferred;
pub use delete::{PreparedDeleteByQuery, PreparedDeleteCollection, PreparedDeleteObject};
pub use execute::PreparedExecuteRaw;
pub use get::{PreparedGetList, PreparedGetObject, PreparedGetRows};
pub use put::{PreparedPutCollection, PreparedPutObject};

use crate::error::{Result, RippleDbError, StorageError};
use crate::interceptor::{OpOutput, OperationContext};

/// Wrap a failure surfaced during execution with the operation context.
pub(crate) fn wrap_storage(context: &OperationContext, error: RippleDbError) -> RippleDbError {
    RippleDbError::Storage(StorageError::new(context.description.clone(), error))
}

/// Recover the typed result after the chain returns. An interceptor that
/// short-circuits must return the operation's result type.
pub(crate) fn downcast_output<T: 'static>(
    output: OpOutput,
    context: &OperationContext,
) -> Result<T> {
    output.downcast::<T>().map(|boxed| *boxed).map_err(|_| {
        RippleDbError::Internal(format!(
            "interceptor returned an unexpected result type for {}",
            context.description
        ))
    })
}
