//! Cacheability metadata
//!
//! A mergeable bag of cache contexts, cache tags and a max-age. Actions,
//! access decisions, responses and whole batches all carry one; merging is
//! associative and commutative with [`CacheabilityMetadata::default`] as the
//! identity.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Max-age value meaning "cacheable forever".
pub const PERMANENT: i64 = -1;

/// Cache contexts, tags and max-age describing how a value may be cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheabilityMetadata {
    /// Request dimensions the value varies by (e.g. `user.permissions`).
    #[serde(default)]
    pub contexts: BTreeSet<String>,
    /// Invalidation tags.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Seconds the value stays fresh; [`PERMANENT`] for no limit.
    #[serde(default = "permanent")]
    pub max_age: i64,
}

fn permanent() -> i64 {
    PERMANENT
}

impl Default for CacheabilityMetadata {
    fn default() -> Self {
        Self {
            contexts: BTreeSet::new(),
            tags: BTreeSet::new(),
            max_age: PERMANENT,
        }
    }
}

impl CacheabilityMetadata {
    /// Empty metadata (the merge identity).
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style context addition.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.contexts.insert(context.into());
        self
    }

    /// Builder-style tag addition.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Builder-style max-age.
    pub fn with_max_age(mut self, max_age: i64) -> Self {
        self.max_age = max_age;
        self
    }

    /// Add cache contexts.
    pub fn add_contexts<I, S>(&mut self, contexts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.contexts.extend(contexts.into_iter().map(Into::into));
    }

    /// Add cache tags.
    pub fn add_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
    }

    /// Fold another bag into this one.
    pub fn merge(&mut self, other: &CacheabilityMetadata) {
        self.contexts.extend(other.contexts.iter().cloned());
        self.tags.extend(other.tags.iter().cloned());
        self.max_age = merge_max_age(self.max_age, other.max_age);
    }

    /// Non-mutating variant of [`merge`](Self::merge).
    pub fn merged(mut self, other: &CacheabilityMetadata) -> Self {
        self.merge(other);
        self
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty() && self.tags.is_empty() && self.max_age == PERMANENT
    }
}

/// Smallest max-age wins; [`PERMANENT`] behaves as infinity.
fn merge_max_age(a: i64, b: i64) -> i64 {
    match (a, b) {
        (PERMANENT, other) | (other, PERMANENT) => other,
        (a, b) => a.min(b),
    }
}
