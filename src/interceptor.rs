//! Interceptor chain — middleware wrapping every operation's execution.
//!
//! The chain is an ordered list of interceptors plus one terminal closure
//! that performs the real dispatch (registry lookup, resolver, executor).
//! `proceed` invokes the next element with a continuation reference; an
//! interceptor may instead short-circuit by returning its own result or an
//! error. Execution is synchronous on the thread performing the operation,
//! for every execution including live-stream re-executions.
//!
//! Results cross the chain type-erased as `Box<dyn Any + Send>`; the
//! prepared operation downcasts after the chain returns.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Result, RippleDbError};

// ============================================================================
// Operation metadata
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Put,
    Get,
    Delete,
    ExecuteRaw,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Put => "Put",
            OperationKind::Get => "Get",
            OperationKind::Delete => "Delete",
            OperationKind::ExecuteRaw => "ExecuteRaw",
        };
        f.write_str(name)
    }
}

/// What the chain is currently executing: the operation kind plus a
/// human-readable description used in logs and error wrapping.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub kind: OperationKind,
    pub description: String,
}

impl OperationContext {
    pub fn new(kind: OperationKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }
}

// ============================================================================
// Interceptor + Chain
// ============================================================================

/// Type-erased operation result.
pub type OpOutput = Box<dyn Any + Send>;

pub trait Interceptor: Send + Sync {
    /// Handle `operation`. Call `chain.proceed(operation)` to continue to
    /// the next link, or short-circuit by returning a result or an error.
    fn intercept(&self, operation: &OperationContext, chain: &mut Chain<'_>) -> Result<OpOutput>;
}

/// Continuation through the remaining interceptors down to the terminal
/// dispatch.
pub struct Chain<'a> {
    remaining: &'a [Arc<dyn Interceptor>],
    terminal: &'a mut dyn FnMut() -> Result<OpOutput>,
}

impl Chain<'_> {
    pub fn proceed(&mut self, operation: &OperationContext) -> Result<OpOutput> {
        if let Some((head, rest)) = self.remaining.split_first() {
            let mut next = Chain {
                remaining: rest,
                terminal: &mut *self.terminal,
            };
            head.intercept(operation, &mut next)
        } else {
            (self.terminal)()
        }
    }
}

/// Run `real_call` through `interceptors`. The terminal dispatch runs at
/// most once; a second `proceed` after exhaustion is an internal error.
pub(crate) fn run_chain(
    interceptors: &[Arc<dyn Interceptor>],
    operation: &OperationContext,
    real_call: impl FnOnce() -> Result<OpOutput>,
) -> Result<OpOutput> {
    let mut real_call = Some(real_call);
    let mut terminal = move || match real_call.take() {
        Some(call) => call(),
        None => Err(RippleDbError::Internal(
            "an interceptor called proceed() more than once".to_string(),
        )),
    };
    let mut chain = Chain {
        remaining: interceptors,
        terminal: &mut terminal,
    };
    chain.proceed(operation)
}

// ============================================================================
// LoggingInterceptor
// ============================================================================

/// Logs every operation's kind and description at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingInterceptor;

impl Interceptor for LoggingInterceptor {
    fn intercept(&self, operation: &OperationContext, chain: &mut Chain<'_>) -> Result<OpOutput> {
        debug!(kind = %operation.kind, description = %operation.description, "executing operation");
        let result = chain.proceed(operation);
        if let Err(error) = &result {
            debug!(kind = %operation.kind, %error, "operation failed");
        }
        result
    }
}

// ============================================================================
// Tests
// ============================================================================
