//! Put resolution — insert-or-update strategies and their result value.

use std::collections::BTreeSet;

use crate::client::Store;
use crate::error::Result;
use crate::query::{InsertQuery, UpdateQuery};
use crate::storage::Row;

// ============================================================================
// PutResult
// ============================================================================

/// What a put physically did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// A new row was inserted; carries the generated row id.
    Inserted { id: i64 },
    /// Existing rows were updated.
    Updated { rows: u64 },
    /// The strategy decided neither applies.
    Unchanged,
}

/// Immutable result of a put operation.
///
/// Exactly one of inserted/updated/unchanged; the affected sets are empty
/// when the outcome is `Unchanged`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResult {
    pub outcome: PutOutcome,
    pub affected_tables: BTreeSet<String>,
    pub affected_tags: BTreeSet<String>,
}

impl PutResult {
    pub fn inserted<T, G>(id: i64, tables: T, tags: G) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        G: IntoIterator,
        G::Item: Into<String>,
    {
        Self {
            outcome: PutOutcome::Inserted { id },
            affected_tables: tables.into_iter().map(Into::into).collect(),
            affected_tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn updated<T, G>(rows: u64, tables: T, tags: G) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        G: IntoIterator,
        G::Item: Into<String>,
    {
        Self {
            outcome: PutOutcome::Updated { rows },
            affected_tables: tables.into_iter().map(Into::into).collect(),
            affected_tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// A put that touched nothing. Affected sets are empty.
    pub fn unchanged() -> Self {
        Self {
            outcome: PutOutcome::Unchanged,
            affected_tables: BTreeSet::new(),
            affected_tags: BTreeSet::new(),
        }
    }

    pub fn was_inserted(&self) -> bool {
        matches!(self.outcome, PutOutcome::Inserted { .. })
    }

    /// True only for a positive updated-row count; this is the predicate the
    /// engine uses (together with `was_inserted`) to decide whether to
    /// publish a change notification.
    pub fn was_updated(&self) -> bool {
        matches!(self.outcome, PutOutcome::Updated { rows } if rows > 0)
    }

    pub fn inserted_id(&self) -> Option<i64> {
        match self.outcome {
            PutOutcome::Inserted { id } => Some(id),
            _ => None,
        }
    }

    pub fn rows_updated(&self) -> Option<u64> {
        match self.outcome {
            PutOutcome::Updated { rows } => Some(rows),
            _ => None,
        }
    }
}

// ============================================================================
// PutResolver
// ============================================================================

/// Strategy translating a domain object into a physical insert or update.
pub trait PutResolver<T>: Send + Sync {
    fn perform_put(&self, store: &Store, object: &T) -> Result<PutResult>;
}

/// Mapping functions the default put strategy is assembled from.
pub trait PutMapping<T>: Send + Sync {
    /// Insert query for `object`.
    fn insert_query(&self, object: &T) -> InsertQuery;

    /// Update query whose where clause identifies `object`'s row.
    fn update_query(&self, object: &T) -> UpdateQuery;

    /// Column values for `object`.
    fn to_row(&self, object: &T) -> Row;
}

/// Default put strategy: attempt the update first, insert when no row
/// matched.
///
/// An object that carries no identity produces an update query matching
/// nothing, so it falls through to the insert arm. Strategies that must not
/// fall back implement [`PutResolver`] directly and hard-fail instead.
pub struct DefaultPutResolver<M> {
    mapping: M,
}

impl<M> DefaultPutResolver<M> {
    pub fn new(mapping: M) -> Self {
        Self { mapping }
    }
}

impl<T, M> PutResolver<T> for DefaultPutResolver<M>
where
    M: PutMapping<T>,
{
    fn perform_put(&self, store: &Store, object: &T) -> Result<PutResult> {
        let row = self.mapping.to_row(object);
        let update = self.mapping.update_query(object);
        let low = store.low_level();

        let rows_updated = low.update(&update, &row)?;
        if rows_updated > 0 {
            Ok(PutResult::updated(
                rows_updated,
                [update.table],
                [] as [String; 0],
            ))
        } else {
            let insert = self.mapping.insert_query(object);
            let id = low.insert(&insert, &row)?;
            Ok(PutResult::inserted(id, [insert.table], [] as [String; 0]))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
