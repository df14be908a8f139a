//! The piece list that owns piece states.
//!
//! `DefaultPieceList` is the only type that allocates state cells. Its clones
//! and every slice derived from it share one `PieceStateStore`, so a state
//! written through any of them is immediately visible through all of them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use super::{
    MutablePieceList, Piece, PieceError, PieceGeometry, PieceList, PieceListSlice, PieceState,
    PieceStateCallback, PieceSubscriptions, Subscription,
};
use crate::config::PieceListConfig;

/// State cells, compare-and-set lock, and listener registry of one piece set.
pub(crate) struct PieceStateStore {
    states: Box<[AtomicU8]>,
    initial_piece_index: u32,
    /// Serializes compare-and-set across the whole list. Plain writes skip it.
    cas_lock: Mutex<()>,
    subscriptions: PieceSubscriptions,
}

impl PieceStateStore {
    fn new(geometry: &PieceGeometry, config: &PieceListConfig) -> Self {
        let states = (0..geometry.count())
            .map(|_| AtomicU8::new(PieceState::Ready.as_u8()))
            .collect();
        Self {
            states,
            initial_piece_index: geometry.initial_piece_index(),
            cas_lock: Mutex::new(()),
            subscriptions: PieceSubscriptions::new(config.subscription_shards),
        }
    }

    fn cell(&self, piece: Piece) -> &AtomicU8 {
        let cell = piece
            .piece_index()
            .checked_sub(self.initial_piece_index)
            .and_then(|slot| self.states.get(slot as usize));
        match cell {
            Some(cell) => cell,
            None => panic!(
                "{piece} is outside piece index space {}..{}",
                self.initial_piece_index,
                u64::from(self.initial_piece_index) + self.states.len() as u64
            ),
        }
    }

    pub(crate) fn state(&self, piece: Piece) -> PieceState {
        PieceState::from_u8(self.cell(piece).load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, piece: Piece, state: PieceState) {
        self.cell(piece).store(state.as_u8(), Ordering::Release);
        trace!("{piece} set to {state}");
        self.subscriptions.notify(piece, state);
    }

    pub(crate) fn compare_and_set_state(
        &self,
        piece: Piece,
        expect: PieceState,
        update: PieceState,
    ) -> bool {
        let cell = self.cell(piece);
        let swapped = {
            let _guard = self.cas_lock.lock();
            if cell.load(Ordering::Acquire) == expect.as_u8() {
                cell.store(update.as_u8(), Ordering::Release);
                true
            } else {
                false
            }
        };

        if swapped {
            trace!("{piece} moved from {expect} to {update}");
            // Notify outside the lock so listeners may write states themselves.
            self.subscriptions.notify(piece, update);
        }
        swapped
    }

    pub(crate) fn subscribe(&self, piece: Piece, callback: PieceStateCallback) -> Subscription {
        self.subscriptions.subscribe(piece.piece_index(), callback)
    }

    pub(crate) fn unsubscribe(&self, subscription: Subscription) {
        self.subscriptions.unsubscribe(subscription);
    }

    pub(crate) fn subscriptions(&self) -> &PieceSubscriptions {
        &self.subscriptions
    }

    pub(crate) async fn await_finished(self: &Arc<Self>, piece: Piece) {
        loop {
            let (finished_tx, finished_rx) = oneshot::channel::<()>();
            let finished_tx = Mutex::new(Some(finished_tx));
            let store = Arc::downgrade(self);

            // Register before looking at the state: a write landing in between
            // is then either seen by the check below or delivered to the listener.
            let subscription =
                self.subscriptions
                    .subscribe(piece.piece_index(), move |subscription, _, state| {
                        if !state.is_finished() {
                            return;
                        }
                        if let Some(finished_tx) = finished_tx.lock().take() {
                            let _ = finished_tx.send(());
                        }
                        if let Some(store) = store.upgrade() {
                            store.unsubscribe(subscription);
                        }
                    });
            let mut registration = WaitRegistration {
                subscriptions: &self.subscriptions,
                subscription,
                piece,
                resolved: false,
            };

            if self.state(piece).is_finished() || finished_rx.await.is_ok() {
                registration.resolved = true;
                return;
            }

            // The listener went away without a finishing write.
            registration.resolved = true;
            trace!("Wait for {piece} lost its listener, registering again");
        }
    }
}

/// Removes an `await_finished` listener when the wait completes or is dropped.
struct WaitRegistration<'a> {
    subscriptions: &'a PieceSubscriptions,
    subscription: Subscription,
    piece: Piece,
    resolved: bool,
}

impl Drop for WaitRegistration<'_> {
    fn drop(&mut self) {
        self.subscriptions.unsubscribe(self.subscription);
        if !self.resolved {
            debug!("Wait for {} cancelled", self.piece);
        }
    }
}

/// Owner of the state cells for one piece set.
///
/// Cloning yields another handle to the same states and subscriptions.
///
/// ```
/// use piecemeal_core::pieces::{DefaultPieceList, MutablePieceList, PieceList, PieceState};
///
/// let list = DefaultPieceList::create_uniform(1000, 300, 0, 0).unwrap();
/// let last = list.piece_by_index(3).unwrap();
/// assert_eq!(list.size(last), 100);
///
/// assert!(list.compare_and_set_state(last, PieceState::Ready, PieceState::Finished));
/// assert_eq!(list.state(last), PieceState::Finished);
/// ```
#[derive(Clone)]
pub struct DefaultPieceList {
    geometry: Arc<PieceGeometry>,
    store: Arc<PieceStateStore>,
}

impl DefaultPieceList {
    /// Creates a list over `geometry` with every piece `Ready`.
    pub fn new(geometry: PieceGeometry) -> Self {
        Self::with_config(geometry, &PieceListConfig::default())
    }

    /// Creates a list using the registry settings from `config`.
    pub fn with_config(geometry: PieceGeometry, config: &PieceListConfig) -> Self {
        debug!(
            "Created piece list {}..{} ({} pieces, {} bytes)",
            geometry.initial_piece_index(),
            geometry.end_piece_index(),
            geometry.count(),
            geometry.total_size()
        );
        let store = Arc::new(PieceStateStore::new(&geometry, config));
        Self {
            geometry: Arc::new(geometry),
            store,
        }
    }

    /// A list with no pieces.
    pub fn empty() -> Self {
        Self::new(PieceGeometry::empty())
    }

    /// Builds a list with per-piece sizes from `size_of_piece`.
    ///
    /// # Errors
    ///
    /// - `PieceError::InvalidGeometry` - See `PieceGeometry::from_fn`
    pub fn create(
        num_pieces: usize,
        initial_data_offset: u64,
        initial_piece_index: u32,
        size_of_piece: impl FnMut(usize) -> u64,
    ) -> Result<Self, PieceError> {
        PieceGeometry::from_fn(
            num_pieces,
            initial_data_offset,
            initial_piece_index,
            size_of_piece,
        )
        .map(Self::new)
    }

    /// Builds a list splitting `total_size` bytes into `piece_size` pieces.
    ///
    /// # Errors
    ///
    /// - `PieceError::InvalidGeometry` - See `PieceGeometry::uniform`
    pub fn create_uniform(
        total_size: u64,
        piece_size: u64,
        initial_data_offset: u64,
        initial_piece_index: u32,
    ) -> Result<Self, PieceError> {
        PieceGeometry::uniform(
            total_size,
            piece_size,
            initial_data_offset,
            initial_piece_index,
        )
        .map(Self::new)
    }

    /// Live subscriptions across all pieces, including pending waits.
    pub fn subscription_count(&self) -> usize {
        self.store.subscriptions().len()
    }

    /// Live subscriptions on one piece, including pending waits.
    pub fn subscription_count_for(&self, piece: Piece) -> usize {
        self.store.subscriptions().len_for(piece.piece_index())
    }

    pub(crate) fn store(&self) -> &Arc<PieceStateStore> {
        &self.store
    }
}

impl Default for DefaultPieceList {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for DefaultPieceList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultPieceList")
            .field("initial_piece_index", &self.geometry.initial_piece_index())
            .field("count", &self.geometry.count())
            .field("total_size", &self.geometry.total_size())
            .field("subscriptions", self.store.subscriptions())
            .finish()
    }
}

#[async_trait]
impl PieceList for DefaultPieceList {
    fn geometry(&self) -> &PieceGeometry {
        &self.geometry
    }

    fn state(&self, piece: Piece) -> PieceState {
        self.store.state(piece)
    }

    async fn await_finished(&self, piece: Piece) {
        self.store.await_finished(piece).await
    }
}

impl MutablePieceList for DefaultPieceList {
    fn set_state(&self, piece: Piece, state: PieceState) {
        self.store.set_state(piece, state)
    }

    fn compare_and_set_state(&self, piece: Piece, expect: PieceState, update: PieceState) -> bool {
        self.store.compare_and_set_state(piece, expect, update)
    }

    fn subscribe_piece_state(&self, piece: Piece, callback: PieceStateCallback) -> Subscription {
        self.store.subscribe(piece, callback)
    }

    fn unsubscribe_piece_state(&self, subscription: Subscription) {
        self.store.unsubscribe(subscription)
    }

    fn slice(&self, start: usize, end: usize) -> Result<PieceListSlice, PieceError> {
        PieceListSlice::new(self, start, end)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use tokio_test::{assert_pending, assert_ready};

    use super::*;

    fn ten_pieces() -> DefaultPieceList {
        DefaultPieceList::create_uniform(10 * 16, 16, 0, 0).unwrap()
    }

    #[test]
    fn test_new_list_is_all_ready() {
        let list = ten_pieces();

        assert_eq!(list.count(), 10);
        for index in 0..10 {
            let piece = list.piece_by_index(index).unwrap();
            assert_eq!(list.state(piece), PieceState::Ready);
        }
    }

    #[test]
    fn test_empty_list() {
        let list = DefaultPieceList::empty();

        assert!(list.is_empty());
        assert_eq!(list.total_size(), 0);
        assert!(list.piece_by_index(0).is_err());
    }

    #[test]
    fn test_compare_and_set_only_on_match() {
        let list = ten_pieces();
        let piece = list.piece_by_index(4).unwrap();

        assert!(!list.compare_and_set_state(piece, PieceState::Downloading, PieceState::Finished));
        assert_eq!(list.state(piece), PieceState::Ready);

        assert!(list.compare_and_set_state(piece, PieceState::Ready, PieceState::Downloading));
        assert_eq!(list.state(piece), PieceState::Downloading);
    }

    #[test]
    fn test_clone_shares_state() {
        let list = ten_pieces();
        let other = list.clone();
        let piece = list.piece_by_index(2).unwrap();

        other.set_state(piece, PieceState::Failed);
        assert_eq!(list.state(piece), PieceState::Failed);
    }

    #[test]
    fn test_writes_notify_subscribers() {
        let list = ten_pieces();
        let piece = list.piece_by_index(1).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let callback_seen = Arc::clone(&seen);
        let subscription = list.subscribe_piece_state(
            piece,
            Box::new(move |_, piece, state| callback_seen.lock().push((piece, state))),
        );

        list.set_state(piece, PieceState::Downloading);
        assert!(!list.compare_and_set_state(piece, PieceState::Ready, PieceState::Finished));
        assert!(list.compare_and_set_state(
            piece,
            PieceState::Downloading,
            PieceState::Finished
        ));
        list.unsubscribe_piece_state(subscription);
        list.set_state(piece, PieceState::Ready);

        assert_eq!(
            *seen.lock(),
            vec![
                (piece, PieceState::Downloading),
                (piece, PieceState::Finished)
            ]
        );
    }

    #[test]
    fn test_listener_may_write_state_during_notification() {
        let list = ten_pieces();
        let piece = list.piece_by_index(0).unwrap();
        let next = list.piece_by_index(1).unwrap();

        let writer = list.clone();
        list.subscribe_piece_state(
            piece,
            Box::new(move |_, _, state| {
                if state.is_finished() {
                    writer.compare_and_set_state(next, PieceState::Ready, PieceState::Downloading);
                }
            }),
        );

        assert!(list.compare_and_set_state(piece, PieceState::Ready, PieceState::Finished));
        assert_eq!(list.state(next), PieceState::Downloading);
    }

    #[tokio::test]
    async fn test_await_finished_resolves_on_finish() {
        let list = ten_pieces();
        let piece = list.piece_by_index(7).unwrap();

        let waiter = {
            let list = list.clone();
            tokio::spawn(async move { list.await_finished(piece).await })
        };

        while list.subscription_count_for(piece) == 0 {
            tokio::task::yield_now().await;
        }
        list.set_state(piece, PieceState::Downloading);
        list.set_state(piece, PieceState::Finished);

        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter should resolve")
            .unwrap();
        assert_eq!(list.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_await_finished_returns_for_already_finished_piece() {
        let list = ten_pieces();
        let piece = list.piece_by_index(3).unwrap();
        list.set_state(piece, PieceState::Finished);

        tokio::time::timeout(Duration::from_secs(1), list.await_finished(piece))
            .await
            .expect("already finished piece should not block");
        assert_eq!(list.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_wait_leaves_no_registration() {
        let list = ten_pieces();
        let piece = list.piece_by_index(5).unwrap();

        let result =
            tokio::time::timeout(Duration::from_millis(20), list.await_finished(piece)).await;
        assert!(result.is_err());
        assert_eq!(list.subscription_count(), 0);

        let hits = Arc::new(AtomicUsize::new(0));
        let callback_hits = Arc::clone(&hits);
        list.subscribe_piece_state(
            piece,
            Box::new(move |_, _, _| {
                callback_hits.fetch_add(1, Ordering::SeqCst);
            }),
        );
        list.set_state(piece, PieceState::Finished);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_foreign_handle_does_not_release_wait() {
        let other = ten_pieces();
        let foreign =
            other.subscribe_piece_state(other.piece_by_index(0).unwrap(), Box::new(|_, _, _| {}));

        let list = ten_pieces();
        let piece = list.piece_by_index(0).unwrap();
        let mut wait = tokio_test::task::spawn(list.await_finished(piece));
        assert_pending!(wait.poll());

        list.unsubscribe_piece_state(foreign);
        assert_eq!(list.subscription_count_for(piece), 1);
        assert_pending!(wait.poll());
        assert_eq!(list.state(piece), PieceState::Ready);

        list.set_state(piece, PieceState::Finished);
        assert_ready!(wait.poll());
        assert_eq!(other.subscription_count(), 1);
    }

    #[test]
    fn test_finished_wait_deregisters_before_next_poll() {
        let list = ten_pieces();
        let piece = list.piece_by_index(8).unwrap();
        let mut wait = tokio_test::task::spawn(list.await_finished(piece));
        assert_pending!(wait.poll());

        list.set_state(piece, PieceState::Finished);
        // Gone from the registry before the waiting task runs again
        assert_eq!(list.subscription_count(), 0);
        assert!(wait.is_woken());
        assert_ready!(wait.poll());
    }

    #[test]
    #[should_panic(expected = "outside piece index space")]
    fn test_state_of_foreign_piece_panics() {
        let list = ten_pieces();
        let other = DefaultPieceList::create_uniform(100, 10, 0, 50).unwrap();
        list.state(other.piece_by_index(55).unwrap());
    }
}
