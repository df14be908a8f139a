//! Per-piece listener registry.
//!
//! Listeners are keyed by absolute piece index and spread across a fixed
//! number of shards so that writers touching different pieces rarely contend
//! on the same lock. Dispatch snapshots the listeners of one piece and runs
//! them with no lock held, so a listener may subscribe or unsubscribe freely.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use super::{Piece, PieceState};

/// Source of subscription ids. Shared by every registry so a handle from one
/// list can never match a listener registered on another.
static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(0);

/// Callback invoked after each state write on the subscribed piece.
///
/// Receives the subscription it was registered under, the piece, and the
/// state that was written.
pub type PieceStateCallback = Box<dyn Fn(Subscription, Piece, PieceState) + Send + Sync>;

/// Handle returned by `subscribe`, used to cancel the registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    piece_index: u32,
    id: u64,
}

impl Subscription {
    /// Absolute index of the piece this subscription listens to.
    pub fn piece_index(&self) -> u32 {
        self.piece_index
    }
}

struct Listener {
    subscription: Subscription,
    active: AtomicBool,
    callback: PieceStateCallback,
}

type Shard = Mutex<HashMap<u32, Vec<Arc<Listener>>>>;

/// Registry of piece state listeners.
pub struct PieceSubscriptions {
    shards: Box<[Shard]>,
    registered: AtomicUsize,
}

impl PieceSubscriptions {
    /// Creates a registry with `shard_count` shards (at least one).
    pub fn new(shard_count: usize) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|_| Mutex::new(HashMap::new()))
            .collect();
        Self {
            shards,
            registered: AtomicUsize::new(0),
        }
    }

    fn shard(&self, piece_index: u32) -> &Shard {
        &self.shards[piece_index as usize % self.shards.len()]
    }

    /// Registers `callback` for state writes on `piece_index`.
    pub fn subscribe<F>(&self, piece_index: u32, callback: F) -> Subscription
    where
        F: Fn(Subscription, Piece, PieceState) + Send + Sync + 'static,
    {
        let subscription = Subscription {
            piece_index,
            id: NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed),
        };
        let listener = Arc::new(Listener {
            subscription,
            active: AtomicBool::new(true),
            callback: Box::new(callback),
        });

        {
            let mut shard = self.shard(piece_index).lock();
            shard.entry(piece_index).or_default().push(listener);
            self.registered.fetch_add(1, Ordering::AcqRel);
        }

        trace!("Subscribed {} to piece {}", subscription.id, piece_index);
        subscription
    }

    /// Removes a registration. Unknown or already removed handles are ignored.
    ///
    /// Returns whether a registration was actually removed.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let removed = {
            let mut shard = self.shard(subscription.piece_index).lock();
            let Some(listeners) = shard.get_mut(&subscription.piece_index) else {
                return false;
            };
            let Some(position) = listeners
                .iter()
                .position(|listener| listener.subscription == subscription)
            else {
                return false;
            };

            let removed = listeners.remove(position);
            if listeners.is_empty() {
                shard.remove(&subscription.piece_index);
            }
            self.registered.fetch_sub(1, Ordering::AcqRel);
            removed
        };

        // A dispatch already holding a snapshot skips inactive listeners.
        removed.active.store(false, Ordering::Release);

        trace!(
            "Unsubscribed {} from piece {}",
            subscription.id, subscription.piece_index
        );
        true
    }

    /// Delivers a completed state write to every listener of `piece`.
    ///
    /// Listeners registered while this dispatch runs are not invoked for this
    /// event. Each listener is invoked at most once per call.
    pub fn notify(&self, piece: Piece, state: PieceState) {
        let snapshot: Vec<Arc<Listener>> = {
            let shard = self.shard(piece.piece_index()).lock();
            match shard.get(&piece.piece_index()) {
                Some(listeners) => listeners.clone(),
                None => return,
            }
        };

        trace!(
            "Dispatching {} state {} to {} listeners",
            piece,
            state,
            snapshot.len()
        );
        for listener in snapshot {
            if listener.active.load(Ordering::Acquire) {
                (listener.callback)(listener.subscription, piece, state);
            }
        }
    }

    /// Number of live registrations across all pieces.
    pub fn len(&self) -> usize {
        self.registered.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live registrations for one piece index.
    pub fn len_for(&self, piece_index: u32) -> usize {
        self.shard(piece_index)
            .lock()
            .get(&piece_index)
            .map_or(0, Vec::len)
    }
}

impl Default for PieceSubscriptions {
    fn default() -> Self {
        Self::new(crate::config::PieceListConfig::default().subscription_shards)
    }
}

impl fmt::Debug for PieceSubscriptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PieceSubscriptions")
            .field("shards", &self.shards.len())
            .field("registered", &self.len())
            .finish()
    }
}
