//! The stacked object entity: one in-world representative standing in for
//! `amount` logically-identical simulated objects.
//!
//! Objects are `Active` while present in the registry and `Removed` once
//! deregistered; there are no other states. All state transitions happen on
//! the mutation thread through [`StackEngine`](crate::engine::StackEngine).

use serde::{Deserialize, Serialize};
use stackforge_core::{AuxState, ObjectClass, SpatialKey, StackKind};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Lifecycle state of a stacked object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifeState {
    /// Present in the registry with amount >= 1.
    Active,
    /// Deregistered; terminal. The live object may still exist unstacked.
    Removed,
}

/// Core stacked object data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackedObject {
    key: SpatialKey,
    kind: StackKind,
    amount: u32,
    aux: AuxState,
    state: LifeState,
    dirty: bool,
}

impl StackedObject {
    /// Create an active stacked object. Amounts below 1 are clamped to 1;
    /// an object never enters the registry with a non-positive amount.
    pub fn new(key: SpatialKey, kind: StackKind, amount: u32, aux: AuxState) -> Self {
        Self {
            key,
            kind,
            amount: amount.max(1),
            aux,
            state: LifeState::Active,
            dirty: false,
        }
    }

    /// Canonical identity used for registry indexing and storage keying.
    pub fn key(&self) -> SpatialKey {
        self.key
    }

    /// Class + kind discriminator.
    pub fn kind(&self) -> StackKind {
        self.kind
    }

    /// Object class shorthand.
    pub fn class(&self) -> ObjectClass {
        self.kind.class()
    }

    /// Current stack amount.
    pub fn amount(&self) -> u32 {
        self.amount
    }

    /// Set the stack amount and mark the object dirty for persistence.
    /// The registry invariant (amount >= 1 while Active) is enforced by the
    /// engine, which removes the object when a transition would go below 1.
    pub fn set_amount(&mut self, amount: u32) {
        self.amount = amount;
        self.dirty = true;
    }

    /// Kind-specific auxiliary state.
    pub fn aux(&self) -> &AuxState {
        &self.aux
    }

    /// Mutable access to auxiliary state; marks the object dirty.
    pub fn aux_mut(&mut self) -> &mut AuxState {
        self.dirty = true;
        &mut self.aux
    }

    /// Lifecycle state.
    pub fn state(&self) -> LifeState {
        self.state
    }

    /// Mark the object removed. Idempotent.
    pub fn mark_removed(&mut self) {
        self.state = LifeState::Removed;
    }

    /// Whether the object has unsaved changes.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clear the dirty flag after a persistence enqueue.
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Whether two objects are of comparable kind. Same concrete class and
    /// discriminator; an object is never similar to itself.
    pub fn is_similar(&self, other: &StackedObject) -> bool {
        self.key != other.key && self.kind.is_similar(other.kind)
    }
}

impl PartialEq for StackedObject {
    fn eq(&self, other: &Self) -> bool {
        self.class() == other.class() && self.key == other.key
    }
}

impl Eq for StackedObject {}

impl fmt::Display for StackedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{{key={}, amount={}, kind={:?}}}",
            self.class().as_str(),
            self.key,
            self.amount,
            self.kind
        )
    }
}

/// Shared handle to a stacked object. The registry holds the canonical
/// handle; live objects resolve theirs through the registry side-table
/// (identity lookup only, never ownership).
#[derive(Clone)]
pub struct StackRef {
    inner: Arc<Mutex<StackedObject>>,
}

impl StackRef {
    /// Wrap a stacked object in a shared handle.
    pub fn new(object: StackedObject) -> Self {
        Self {
            inner: Arc::new(Mutex::new(object)),
        }
    }

    /// Lock the underlying object. Poisoning is recovered rather than
    /// propagated; the data itself stays consistent because mutation only
    /// happens on one thread.
    pub fn lock(&self) -> MutexGuard<'_, StackedObject> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spatial key without holding the lock across calls.
    pub fn key(&self) -> SpatialKey {
        self.lock().key()
    }

    /// Kind without holding the lock across calls.
    pub fn kind(&self) -> StackKind {
        self.lock().kind()
    }

    /// Amount without holding the lock across calls.
    pub fn amount(&self) -> u32 {
        self.lock().amount()
    }

    /// Whether both handles point at the same canonical object.
    pub fn same_object(&self, other: &StackRef) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for StackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StackRef({})", self.lock())
    }
}
