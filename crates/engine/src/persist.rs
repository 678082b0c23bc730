//! Asynchronous, coalescing persistence queue.
//!
//! Mutations are enqueued fire-and-forget from the mutation thread, keyed
//! by spatial key: a rapid sequence of writes to one key collapses to the
//! last operation (last-write-wins), so at most one op per key reaches the
//! store per flush. A background worker drains the queue; `flush` drains it
//! synchronously for cache saves and shutdown.

use crate::store::{PersistOp, StackStore};
use stackforge_core::SpatialKey;
use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

struct Shared {
    pending: Mutex<PendingState>,
    wake: Condvar,
}

struct PendingState {
    ops: BTreeMap<SpatialKey, PersistOp>,
    shutdown: bool,
}

/// Coalescing write queue in front of a [`StackStore`].
pub struct PersistQueue {
    shared: Arc<Shared>,
    store: Arc<dyn StackStore>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PersistQueue {
    /// Spawn the background flusher over the given store.
    pub fn new(store: Arc<dyn StackStore>) -> Self {
        let shared = Arc::new(Shared {
            pending: Mutex::new(PendingState {
                ops: BTreeMap::new(),
                shutdown: false,
            }),
            wake: Condvar::new(),
        });

        let worker_shared = shared.clone();
        let worker_store = store.clone();
        let worker = thread::Builder::new()
            .name("stackforge-persist".into())
            .spawn(move || worker_loop(worker_shared, worker_store))
            .ok();
        if worker.is_none() {
            warn!("failed to spawn persistence worker; writes flush synchronously");
        }

        Self {
            shared,
            store,
            worker: Mutex::new(worker),
        }
    }

    /// Queue an operation for the key, superseding any earlier queued op
    /// for the same key. Non-blocking.
    pub fn enqueue(&self, key: SpatialKey, op: PersistOp) {
        let mut pending = self
            .shared
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        pending.ops.insert(key, op);
        self.shared.wake.notify_one();
    }

    /// Number of queued, not-yet-applied operations.
    pub fn pending_len(&self) -> usize {
        self.shared
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .ops
            .len()
    }

    /// Drain the queue on the calling thread. Used by cache saves, which
    /// want the store current before returning.
    pub fn flush(&self) {
        let batch = {
            let mut pending = self
                .shared
                .pending
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut pending.ops)
        };
        apply_batch(&*self.store, batch);
    }

    /// Flush remaining writes and stop the worker. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut pending = self
                .shared
                .pending
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            pending.shutdown = true;
            self.shared.wake.notify_all();
        }
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                warn!("persistence worker panicked during shutdown");
            }
        }
        self.flush();
    }
}

impl Drop for PersistQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: Arc<Shared>, store: Arc<dyn StackStore>) {
    loop {
        let (batch, shutdown) = {
            let mut pending = shared.pending.lock().unwrap_or_else(|e| e.into_inner());
            while pending.ops.is_empty() && !pending.shutdown {
                let (guard, _timeout) = shared
                    .wake
                    .wait_timeout(pending, Duration::from_millis(200))
                    .unwrap_or_else(|e| e.into_inner());
                pending = guard;
            }
            (std::mem::take(&mut pending.ops), pending.shutdown)
        };

        apply_batch(&*store, batch);
        if shutdown {
            return;
        }
    }
}

fn apply_batch(store: &dyn StackStore, batch: BTreeMap<SpatialKey, PersistOp>) {
    if batch.is_empty() {
        return;
    }
    let entries: Vec<(SpatialKey, PersistOp)> = batch.into_iter().collect();
    debug!("flushing {} persistence op(s)", entries.len());
    if let Err(err) = store.apply(&entries) {
        // Isolated: a failed flush loses these writes but never takes the
        // engine down. The next amount change re-enqueues the key.
        warn!("persistence flush failed: {err}");
    }
}
