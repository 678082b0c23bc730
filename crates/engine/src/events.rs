//! Cancellable merge/unstack events.
//!
//! Observers are synchronous callbacks invoked strictly before any
//! mutation; a single veto short-circuits the operation with zero side
//! effects. Plain result aggregation, no exception-style control flow.

use stackforge_core::{EntityId, SpatialKey, StackKind};
use std::sync::RwLock;

/// Verdict returned by an event observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Let the operation proceed.
    Allow,
    /// Cancel the operation before any mutation.
    Veto,
}

/// A merge about to fold `donor` into `target`.
#[derive(Debug, Clone, Copy)]
pub struct MergeEvent {
    /// Object being folded in and removed.
    pub donor: SpatialKey,
    /// Surviving object.
    pub target: SpatialKey,
    /// Shared kind of the pair.
    pub kind: StackKind,
    /// Donor amount before the merge.
    pub donor_amount: u32,
    /// Target amount before the merge.
    pub target_amount: u32,
    /// Target amount the merge would produce.
    pub new_amount: u32,
}

/// An unstack about to split `amount` off the object at `key`.
#[derive(Debug, Clone, Copy)]
pub struct UnstackEvent {
    /// Object being reduced.
    pub key: SpatialKey,
    /// Kind of the object.
    pub kind: StackKind,
    /// Amount being split off.
    pub amount: u32,
    /// Entity that requested the split, when one did.
    pub actor: Option<EntityId>,
}

type MergeListener = Box<dyn Fn(&MergeEvent) -> EventOutcome + Send + Sync>;
type UnstackListener = Box<dyn Fn(&UnstackEvent) -> EventOutcome + Send + Sync>;

/// Observer lists for cancellable stacking events.
#[derive(Default)]
pub struct EventBus {
    merge: RwLock<Vec<MergeListener>>,
    unstack: RwLock<Vec<UnstackListener>>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a merge observer.
    pub fn on_merge<F>(&self, listener: F)
    where
        F: Fn(&MergeEvent) -> EventOutcome + Send + Sync + 'static,
    {
        self.merge
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Box::new(listener));
    }

    /// Register an unstack observer.
    pub fn on_unstack<F>(&self, listener: F)
    where
        F: Fn(&UnstackEvent) -> EventOutcome + Send + Sync + 'static,
    {
        self.unstack
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Box::new(listener));
    }

    /// Fire a merge event; any veto wins.
    pub fn fire_merge(&self, event: &MergeEvent) -> EventOutcome {
        let listeners = self.merge.read().unwrap_or_else(|e| e.into_inner());
        for listener in listeners.iter() {
            if listener(event) == EventOutcome::Veto {
                return EventOutcome::Veto;
            }
        }
        EventOutcome::Allow
    }

    /// Fire an unstack event; any veto wins.
    pub fn fire_unstack(&self, event: &UnstackEvent) -> EventOutcome {
        let listeners = self.unstack.read().unwrap_or_else(|e| e.into_inner());
        for listener in listeners.iter() {
            if listener(event) == EventOutcome::Veto {
                return EventOutcome::Veto;
            }
        }
        EventOutcome::Allow
    }
}
