//! Views over a contiguous sub-range of a piece list.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::default_list::PieceStateStore;
use super::{
    DefaultPieceList, MutablePieceList, Piece, PieceError, PieceGeometry, PieceList, PieceState,
    PieceStateCallback, Subscription,
};

/// A window onto part of a `DefaultPieceList`.
///
/// The slice copies the sizes and offsets of its range but shares the state
/// cells and subscriptions of the backing list. Slice and backing list use
/// the same absolute piece indices, so a `Piece` obtained from one can be
/// passed to the other as long as it lies inside both.
///
/// State reads and writes are forwarded to the backing store as-is; only the
/// geometry accessors are limited to the slice's own range.
#[derive(Clone)]
pub struct PieceListSlice {
    geometry: PieceGeometry,
    store: Arc<PieceStateStore>,
}

impl PieceListSlice {
    /// Creates a view over the list positions `start..end` of `backing`.
    ///
    /// # Errors
    ///
    /// - `PieceError::InvalidSlice` - If `start > end` or `end > backing.count()`
    pub fn new(backing: &DefaultPieceList, start: usize, end: usize) -> Result<Self, PieceError> {
        Self::from_parts(backing.geometry(), backing.store(), start, end)
    }

    fn from_parts(
        geometry: &PieceGeometry,
        store: &Arc<PieceStateStore>,
        start: usize,
        end: usize,
    ) -> Result<Self, PieceError> {
        let geometry = geometry.slice_geometry(start, end)?;
        debug!(
            "Sliced pieces {}..{} from list positions {}..{}",
            geometry.initial_piece_index(),
            geometry.end_piece_index(),
            start,
            end
        );
        Ok(Self {
            geometry,
            store: Arc::clone(store),
        })
    }
}

impl std::fmt::Debug for PieceListSlice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PieceListSlice")
            .field("initial_piece_index", &self.geometry.initial_piece_index())
            .field("count", &self.geometry.count())
            .field("total_size", &self.geometry.total_size())
            .finish()
    }
}

#[async_trait]
impl PieceList for PieceListSlice {
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

impl MutablePieceList for PieceListSlice {
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

    /// Slices of a slice share the same backing store; positions are relative
    /// to this slice.
    fn slice(&self, start: usize, end: usize) -> Result<PieceListSlice, PieceError> {
        Self::from_parts(&self.geometry, &self.store, start, end)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn backing() -> DefaultPieceList {
        DefaultPieceList::create_uniform(1000, 100, 0, 0).unwrap()
    }

    #[test]
    fn test_slice_geometry() {
        let list = backing();
        let slice = list.slice(3, 7).unwrap();

        assert_eq!(slice.count(), 4);
        assert_eq!(slice.initial_piece_index(), 3);
        assert_eq!(slice.end_piece_index(), 7);
        assert_eq!(slice.total_size(), 400);

        let piece = slice.piece_by_index(3).unwrap();
        assert_eq!(slice.data_start_offset(piece), 300);
        assert!(slice.piece_by_index(2).is_err());
        assert!(slice.piece_by_index(7).is_err());
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let list = backing();

        assert!(matches!(
            list.slice(5, 4),
            Err(PieceError::InvalidSlice {
                start: 5,
                end: 4,
                count: 10
            })
        ));
        assert!(list.slice(0, 11).is_err());
        assert!(list.slice(10, 10).unwrap().is_empty());
    }

    #[test]
    fn test_state_shared_both_ways() {
        let list = backing();
        let slice = list.slice(3, 7).unwrap();

        let through_slice = slice.piece_by_index(5).unwrap();
        slice.set_state(through_slice, PieceState::Finished);
        assert_eq!(
            list.state(list.piece_by_index(5).unwrap()),
            PieceState::Finished
        );

        let through_list = list.piece_by_index(6).unwrap();
        assert!(list.compare_and_set_state(
            through_list,
            PieceState::Ready,
            PieceState::Downloading
        ));
        assert_eq!(slice.state(through_list), PieceState::Downloading);
    }

    #[test]
    fn test_nested_slice_shares_backing() {
        let list = backing();
        let outer = list.slice(2, 9).unwrap();
        let inner = outer.slice(1, 3).unwrap();

        assert_eq!(inner.initial_piece_index(), 3);
        assert_eq!(inner.count(), 2);
        assert!(outer.slice(0, 8).is_err());

        let piece = inner.piece_by_index(4).unwrap();
        inner.set_state(piece, PieceState::Failed);
        assert_eq!(outer.state(piece), PieceState::Failed);
        assert_eq!(list.state(piece), PieceState::Failed);
    }

    #[test]
    fn test_subscriptions_go_to_backing_registry() {
        let list = backing();
        let slice = list.slice(0, 5).unwrap();
        let piece = slice.piece_by_index(1).unwrap();

        let subscription = slice.subscribe_piece_state(piece, Box::new(|_, _, _| {}));
        assert_eq!(list.subscription_count_for(piece), 1);

        slice.unsubscribe_piece_state(subscription);
        slice.unsubscribe_piece_state(subscription);
        assert_eq!(list.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_through_slice_finished_through_list() {
        let list = backing();
        let slice = list.slice(4, 8).unwrap();
        let piece = slice.piece_by_index(4).unwrap();

        let waiter = {
            let slice = slice.clone();
            tokio::spawn(async move { slice.await_finished(piece).await })
        };
        while list.subscription_count_for(piece) == 0 {
            tokio::task::yield_now().await;
        }
        list.set_state(piece, PieceState::Finished);

        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("slice waiter should resolve")
            .unwrap();
    }
}
