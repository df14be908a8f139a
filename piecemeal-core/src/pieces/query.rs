//! Traversal, search and aggregates over piece lists.
//!
//! Every helper walks the raw index range of the list and builds `Piece`
//! handles on the fly; no collection of handles is materialized unless the
//! helper returns one.

use std::cmp::Ordering;
use std::iter::FusedIterator;
use std::ops::Range;

use super::{Piece, PieceError, PieceList, PieceState};

/// Iterator over the pieces of a list, in index order.
#[derive(Debug, Clone)]
pub struct Pieces {
    indices: Range<u32>,
}

impl Iterator for Pieces {
    type Item = Piece;

    #[inline]
    fn next(&mut self) -> Option<Piece> {
        self.indices.next().map(Piece::from_raw)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.indices.size_hint()
    }
}

impl DoubleEndedIterator for Pieces {
    #[inline]
    fn next_back(&mut self) -> Option<Piece> {
        self.indices.next_back().map(Piece::from_raw)
    }
}

impl ExactSizeIterator for Pieces {}

impl FusedIterator for Pieces {}

/// Query helpers available on every `PieceList`.
pub trait PieceQuery: PieceList {
    /// Iterates all pieces in ascending index order.
    fn pieces(&self) -> Pieces {
        Pieces {
            indices: self.initial_piece_index()..self.end_piece_index(),
        }
    }

    fn first(&self) -> Option<Piece> {
        (!self.is_empty()).then(|| self.geometry().piece_at_list_index_unchecked(0))
    }

    fn last(&self) -> Option<Piece> {
        (!self.is_empty()).then(|| {
            self.geometry()
                .piece_at_list_index_unchecked(self.count() - 1)
        })
    }

    /// Absolute index of the first piece matching `predicate`.
    fn piece_index_of_first(&self, mut predicate: impl FnMut(Piece) -> bool) -> Option<u32> {
        self.pieces()
            .find(|&piece| predicate(piece))
            .map(Piece::piece_index)
    }

    /// Absolute index of the last piece matching `predicate`.
    fn piece_index_of_last(&self, mut predicate: impl FnMut(Piece) -> bool) -> Option<u32> {
        self.pieces()
            .rev()
            .find(|&piece| predicate(piece))
            .map(Piece::piece_index)
    }

    /// Piece with the smallest key. Ties go to the lowest index.
    ///
    /// # Errors
    ///
    /// - `PieceError::Empty` - If the list has no pieces
    fn min_by_key<K: Ord>(&self, key: impl FnMut(Piece) -> K) -> Result<Piece, PieceError> {
        select_by(self.pieces(), key, Ordering::Less).map(|(piece, _)| piece)
    }

    /// Piece with the largest key. Ties go to the lowest index.
    ///
    /// # Errors
    ///
    /// - `PieceError::Empty` - If the list has no pieces
    fn max_by_key<K: Ord>(&self, key: impl FnMut(Piece) -> K) -> Result<Piece, PieceError> {
        select_by(self.pieces(), key, Ordering::Greater).map(|(piece, _)| piece)
    }

    /// Smallest value of `projection` over all pieces.
    ///
    /// # Errors
    ///
    /// - `PieceError::Empty` - If the list has no pieces
    fn min_of<K: Ord>(&self, projection: impl FnMut(Piece) -> K) -> Result<K, PieceError> {
        select_by(self.pieces(), projection, Ordering::Less).map(|(_, value)| value)
    }

    /// Largest value of `projection` over all pieces.
    ///
    /// # Errors
    ///
    /// - `PieceError::Empty` - If the list has no pieces
    fn max_of<K: Ord>(&self, projection: impl FnMut(Piece) -> K) -> Result<K, PieceError> {
        select_by(self.pieces(), projection, Ordering::Greater).map(|(_, value)| value)
    }

    fn sum_of(&self, projection: impl FnMut(Piece) -> u64) -> u64 {
        self.pieces().map(projection).sum()
    }

    /// Pieces after the leading run matching `predicate`.
    fn drop_while(&self, mut predicate: impl FnMut(Piece) -> bool) -> Vec<Piece> {
        self.pieces().skip_while(|&piece| predicate(piece)).collect()
    }

    /// The leading run of pieces matching `predicate`. Stops at the first miss.
    fn take_while(&self, mut predicate: impl FnMut(Piece) -> bool) -> Vec<Piece> {
        self.pieces().take_while(|&piece| predicate(piece)).collect()
    }

    /// Binary search over the whole list.
    ///
    /// The list must be sorted with respect to `comparator`, which returns
    /// the ordering of the probed piece relative to the target.
    fn binary_search_by(&self, comparator: impl FnMut(Piece) -> Ordering) -> Option<Piece> {
        search_positions(self, 0, self.count(), comparator)
    }

    /// Binary search restricted to the list positions `from..to`.
    ///
    /// # Errors
    ///
    /// - `PieceError::ListIndexOutOfBounds` - If `from > to` or `to > count()`
    fn binary_search_within(
        &self,
        from: usize,
        to: usize,
        comparator: impl FnMut(Piece) -> Ordering,
    ) -> Result<Option<Piece>, PieceError> {
        if from > to || to > self.count() {
            return Err(PieceError::ListIndexOutOfBounds {
                from,
                to,
                count: self.count(),
            });
        }
        Ok(search_positions(self, from, to, comparator))
    }

    /// Piece holding the content byte at `offset`, if this list covers it.
    fn piece_at_data_offset(&self, offset: u64) -> Option<Piece> {
        let geometry = self.geometry();
        self.binary_search_by(|piece| {
            if geometry.data_end_offset(piece) <= offset {
                Ordering::Less
            } else if geometry.data_start_offset(piece) > offset {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        })
    }

    /// Number of pieces currently in `state`.
    fn count_in_state(&self, state: PieceState) -> usize {
        self.pieces()
            .filter(|&piece| self.state(piece) == state)
            .count()
    }

    /// Bytes covered by finished pieces.
    fn finished_size(&self) -> u64 {
        self.pieces()
            .filter(|&piece| self.state(piece).is_finished())
            .map(|piece| self.size(piece))
            .sum()
    }

    /// True when every piece is finished. Vacuously true for an empty list.
    fn is_all_finished(&self) -> bool {
        self.pieces().all(|piece| self.state(piece).is_finished())
    }
}

impl<L: PieceList + ?Sized> PieceQuery for L {}

/// Keeps the first piece whose key beats every earlier one in `direction`.
fn select_by<K: Ord>(
    mut pieces: Pieces,
    mut key: impl FnMut(Piece) -> K,
    direction: Ordering,
) -> Result<(Piece, K), PieceError> {
    let first = pieces.next().ok_or(PieceError::Empty)?;
    let mut best = (first, key(first));
    for piece in pieces {
        let value = key(piece);
        if value.cmp(&best.1) == direction {
            best = (piece, value);
        }
    }
    Ok(best)
}

fn search_positions<L: PieceList + ?Sized>(
    list: &L,
    from: usize,
    to: usize,
    mut comparator: impl FnMut(Piece) -> Ordering,
) -> Option<Piece> {
    let geometry = list.geometry();
    let (mut low, mut high) = (from, to);
    while low < high {
        let mid = low + (high - low) / 2;
        let piece = geometry.piece_at_list_index_unchecked(mid);
        match comparator(piece) {
            Ordering::Less => low = mid + 1,
            Ordering::Greater => high = mid,
            Ordering::Equal => return Some(piece),
        }
    }
    None
}
