//! Read and write contracts for piece lists.

use std::ops::Range;

use async_trait::async_trait;

use super::{
    Piece, PieceError, PieceGeometry, PieceListSlice, PieceState, PieceStateCallback, Subscription,
};

/// Read access to a contiguous run of pieces.
///
/// A list covers the absolute piece indices
/// `initial_piece_index()..end_piece_index()`. Pieces are addressed only by
/// absolute index, never by list position, so handles stay valid across
/// every slice sharing the same index space.
///
/// Geometry accessors panic when handed a piece outside the list; use
/// `piece_by_index` to obtain checked handles.
#[async_trait]
pub trait PieceList: Send + Sync {
    /// Immutable sizes and offsets of this list.
    fn geometry(&self) -> &PieceGeometry;

    /// Current download state of `piece`.
    fn state(&self, piece: Piece) -> PieceState;

    /// Suspends until `piece` reaches `PieceState::Finished`.
    ///
    /// Returns immediately if the piece is already finished. Dropping the
    /// returned future cancels the wait and removes its registration.
    async fn await_finished(&self, piece: Piece);

    /// Returns the handle for an absolute piece index.
    ///
    /// # Errors
    ///
    /// - `PieceError::IndexOutOfBounds` - If the index is outside this list
    fn piece_by_index(&self, piece_index: u32) -> Result<Piece, PieceError> {
        self.geometry().piece_by_index(piece_index)
    }

    fn contains_piece_index(&self, piece_index: u32) -> bool {
        self.geometry().contains_piece_index(piece_index)
    }

    /// Number of pieces in this list.
    fn count(&self) -> usize {
        self.geometry().count()
    }

    fn is_empty(&self) -> bool {
        self.geometry().is_empty()
    }

    /// Sum of all piece sizes in bytes.
    fn total_size(&self) -> u64 {
        self.geometry().total_size()
    }

    fn initial_piece_index(&self) -> u32 {
        self.geometry().initial_piece_index()
    }

    /// Exclusive upper bound of the index space.
    fn end_piece_index(&self) -> u32 {
        self.geometry().end_piece_index()
    }

    fn size(&self, piece: Piece) -> u64 {
        self.geometry().size(piece)
    }

    fn data_start_offset(&self, piece: Piece) -> u64 {
        self.geometry().data_start_offset(piece)
    }

    /// Inclusive.
    fn data_last_offset(&self, piece: Piece) -> u64 {
        self.geometry().data_last_offset(piece)
    }

    /// Exclusive.
    fn data_end_offset(&self, piece: Piece) -> u64 {
        self.geometry().data_end_offset(piece)
    }

    fn data_offset_range(&self, piece: Piece) -> Range<u64> {
        self.geometry().data_offset_range(piece)
    }
}

/// Piece list whose states can be written.
///
/// Every write, whether plain or through compare-and-set, notifies the
/// subscribers of the written piece. Writes made through a slice are visible
/// through the backing list and every other slice of it.
pub trait MutablePieceList: PieceList {
    /// Stores `state` unconditionally. Concurrent plain writes are last-write-wins.
    fn set_state(&self, piece: Piece, state: PieceState);

    /// Atomically replaces the state of `piece` with `update` if it is `expect`.
    ///
    /// Returns false, without writing, when the current state differs.
    fn compare_and_set_state(&self, piece: Piece, expect: PieceState, update: PieceState) -> bool;

    /// Registers `callback` for every state write on `piece`.
    fn subscribe_piece_state(&self, piece: Piece, callback: PieceStateCallback) -> Subscription;

    /// Cancels a registration. Unknown or repeated handles are ignored.
    fn unsubscribe_piece_state(&self, subscription: Subscription);

    /// Creates a view over the list positions `start..end`.
    ///
    /// # Errors
    ///
    /// - `PieceError::InvalidSlice` - If `start > end` or `end > count()`
    fn slice(&self, start: usize, end: usize) -> Result<PieceListSlice, PieceError>;
}
