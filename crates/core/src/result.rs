//! Typed outcomes of stacking operations.
//!
//! Policy rejections are expected, frequent and non-exceptional: they come
//! back as enum variants, never as errors, and callers branch on them.

use serde::{Deserialize, Serialize};

/// Outcome of a pure merge-compatibility check between two stacked objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StackCheckResult {
    /// The pair may merge right now.
    Success,
    /// The objects are not of comparable kind, or are the same object.
    NotSimilar,
    /// Compatible kinds, but the summed amount would exceed the stack
    /// limit. Distinguished from [`NotSimilar`](Self::NotSimilar) so
    /// callers can treat the pair as "compatible but full".
    LimitExceeded,
    /// Stacking is globally disabled for this object class.
    NotEnabled,
    /// The objects live in different worlds.
    DifferentWorld,
    /// At least one kind is blacklisted (or not whitelisted).
    Blacklisted,
    /// Stacking is disabled in this world.
    WorldDisabled,
}

/// Outcome of an attempted merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StackResult {
    /// The donor was folded into the target.
    Success,
    /// The compatibility check failed.
    NotSimilar,
    /// An observer vetoed the merge before any mutation.
    EventCancelled,
    /// The merge was attempted off the mutation thread; nothing happened.
    /// This marks an integration bug upstream and is logged, never retried.
    ThreadCatcher,
}

/// Outcome of an attempted unstack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnstackResult {
    /// The amount was split off.
    Success,
    /// An observer vetoed the unstack before any mutation.
    EventCancelled,
}
