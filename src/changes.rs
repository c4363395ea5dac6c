//! Change notification values.
//!
//! [`Changes`] describes which tables and tags a completed write touched;
//! [`ChangeFilter`] is the predicate a subscriber registers to select the
//! publications it cares about. Both compare as sets — element order never
//! matters.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

// ============================================================================
// Changes
// ============================================================================

/// Tables and tags affected by a completed write.
///
/// Never null, may be empty. Equality is set-based. A batch executed inside
/// a transaction produces a single `Changes` that is the union of the
/// per-item affected sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Changes {
    pub affected_tables: BTreeSet<String>,
    pub affected_tags: BTreeSet<String>,
}

impl Changes {
    /// Create a `Changes` from table and tag collections.
    pub fn new<T, G>(tables: T, tags: G) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        G: IntoIterator,
        G::Item: Into<String>,
    {
        Self {
            affected_tables: tables.into_iter().map(Into::into).collect(),
            affected_tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Shorthand for a change affecting a single table and no tags.
    pub fn table(name: impl Into<String>) -> Self {
        Self::new([name.into()], [] as [String; 0])
    }

    /// True when neither tables nor tags are affected.
    pub fn is_empty(&self) -> bool {
        self.affected_tables.is_empty() && self.affected_tags.is_empty()
    }

    /// Union `other` into `self`.
    pub fn merge(&mut self, other: &Changes) {
        self.affected_tables
            .extend(other.affected_tables.iter().cloned());
        self.affected_tags
            .extend(other.affected_tags.iter().cloned());
    }
}

// ============================================================================
// ChangeFilter
// ============================================================================

/// Subscriber-side predicate over published [`Changes`].
///
/// A filter matches when its tables intersect the affected tables or its
/// tags intersect the affected tags. [`ChangeFilter::all`] matches every
/// publication; a filter with two empty sets matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeFilter {
    tables: BTreeSet<String>,
    tags: BTreeSet<String>,
    match_all: bool,
}

impl ChangeFilter {
    /// Filter on table and tag sets.
    pub fn new<T, G>(tables: T, tags: G) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        G: IntoIterator,
        G::Item: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
            tags: tags.into_iter().map(Into::into).collect(),
            match_all: false,
        }
    }

    /// Filter on tables only.
    pub fn tables<T>(tables: T) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self::new(tables, [] as [String; 0])
    }

    /// A filter that matches every publication.
    pub fn all() -> Self {
        Self {
            tables: BTreeSet::new(),
            tags: BTreeSet::new(),
            match_all: true,
        }
    }

    /// True when this filter selects `changes`.
    pub fn matches(&self, changes: &Changes) -> bool {
        if self.match_all {
            return true;
        }
        self.tables
            .iter()
            .any(|t| changes.affected_tables.contains(t))
            || self.tags.iter().any(|t| changes.affected_tags.contains(t))
    }

    /// True when this filter can never match (no tables, no tags, not `all`).
    pub fn is_empty(&self) -> bool {
        !self.match_all && self.tables.is_empty() && self.tags.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
