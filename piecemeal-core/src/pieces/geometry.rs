//! Immutable piece geometry: per-piece sizes and data offsets.
//!
//! A geometry describes how a contiguous run of absolute piece indices maps
//! onto the logical byte stream of the downloadable content. It never changes
//! after construction, so it is read without synchronization.

use std::ops::Range;

use super::{Piece, PieceError};

/// Per-piece byte sizes and data offsets for a contiguous piece index space.
///
/// Slot `i` of both arrays describes absolute piece `initial_piece_index + i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceGeometry {
    sizes: Box<[u64]>,
    data_offsets: Box<[u64]>,
    initial_piece_index: u32,
    total_size: u64,
}

impl PieceGeometry {
    /// Geometry with no pieces, starting at piece index 0.
    pub fn empty() -> Self {
        Self {
            sizes: Box::new([]),
            data_offsets: Box::new([]),
            initial_piece_index: 0,
            total_size: 0,
        }
    }

    /// Builds geometry by asking `size_of_piece` for the size of each list index.
    ///
    /// Offsets accumulate from `initial_data_offset`. The size function is
    /// called exactly once per index, in order.
    ///
    /// # Errors
    ///
    /// - `PieceError::InvalidGeometry` - If a size is zero, offsets overflow,
    ///   or the piece index range does not fit in `u32`
    pub fn from_fn(
        num_pieces: usize,
        initial_data_offset: u64,
        initial_piece_index: u32,
        mut size_of_piece: impl FnMut(usize) -> u64,
    ) -> Result<Self, PieceError> {
        validate_index_space(num_pieces, initial_piece_index)?;

        let mut sizes = Vec::with_capacity(num_pieces);
        let mut data_offsets = Vec::with_capacity(num_pieces);
        let mut offset = initial_data_offset;

        for list_index in 0..num_pieces {
            let size = size_of_piece(list_index);
            if size == 0 {
                return Err(PieceError::InvalidGeometry {
                    reason: format!("piece at list index {list_index} has size 0"),
                });
            }
            sizes.push(size);
            data_offsets.push(offset);
            offset = offset
                .checked_add(size)
                .ok_or_else(|| PieceError::InvalidGeometry {
                    reason: format!("data offset overflows after list index {list_index}"),
                })?;
        }

        Ok(Self {
            sizes: sizes.into_boxed_slice(),
            data_offsets: data_offsets.into_boxed_slice(),
            initial_piece_index,
            total_size: offset - initial_data_offset,
        })
    }

    /// Splits `total_size` bytes into pieces of `piece_size` bytes.
    ///
    /// Every piece has `piece_size` bytes except the last one, which holds the
    /// remainder. When `piece_size` divides `total_size` exactly, all pieces
    /// are full-sized; a zero-size trailing piece is never produced.
    ///
    /// # Errors
    ///
    /// - `PieceError::InvalidGeometry` - If `piece_size` is zero or the
    ///   resulting layout does not fit the index or offset space
    pub fn uniform(
        total_size: u64,
        piece_size: u64,
        initial_data_offset: u64,
        initial_piece_index: u32,
    ) -> Result<Self, PieceError> {
        if piece_size == 0 {
            return Err(PieceError::InvalidGeometry {
                reason: "piece size must be positive".to_string(),
            });
        }

        let num_pieces = usize::try_from(total_size.div_ceil(piece_size)).map_err(|_| {
            PieceError::InvalidGeometry {
                reason: format!("{total_size} bytes in {piece_size}-byte pieces is too many pieces"),
            }
        })?;
        let last_piece_size = match total_size % piece_size {
            0 => piece_size,
            remainder => remainder,
        };

        Self::from_fn(
            num_pieces,
            initial_data_offset,
            initial_piece_index,
            |list_index| {
                if list_index + 1 == num_pieces {
                    last_piece_size
                } else {
                    piece_size
                }
            },
        )
    }

    /// Copies the list-relative sub-range `start..end` into a new geometry.
    ///
    /// The copy keeps absolute piece indices: its first piece is
    /// `initial_piece_index + start`.
    ///
    /// # Errors
    ///
    /// - `PieceError::InvalidSlice` - If `start > end` or `end > count`
    pub fn slice_geometry(&self, start: usize, end: usize) -> Result<Self, PieceError> {
        if start > end || end > self.count() {
            return Err(PieceError::InvalidSlice {
                start,
                end,
                count: self.count(),
            });
        }

        let sizes: Box<[u64]> = self.sizes[start..end].into();
        let total_size = sizes.iter().sum();

        Ok(Self {
            sizes,
            data_offsets: self.data_offsets[start..end].into(),
            // start <= count and the whole index space fits in u32
            initial_piece_index: self.initial_piece_index + start as u32,
            total_size,
        })
    }

    /// Per-piece sizes in list order.
    pub fn sizes(&self) -> &[u64] {
        &self.sizes
    }

    /// Per-piece data offsets in list order.
    pub fn data_offsets(&self) -> &[u64] {
        &self.data_offsets
    }

    /// Absolute index of the first piece. `0` for an empty geometry.
    pub fn initial_piece_index(&self) -> u32 {
        self.initial_piece_index
    }

    /// Exclusive upper bound of the piece index space.
    pub fn end_piece_index(&self) -> u32 {
        self.initial_piece_index + self.sizes.len() as u32
    }

    /// Sum of all piece sizes in bytes.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Number of pieces.
    pub fn count(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    pub fn contains_piece_index(&self, piece_index: u32) -> bool {
        piece_index >= self.initial_piece_index && piece_index < self.end_piece_index()
    }

    /// Returns the handle for an absolute piece index.
    ///
    /// # Errors
    ///
    /// - `PieceError::IndexOutOfBounds` - If the index is outside this geometry
    pub fn piece_by_index(&self, piece_index: u32) -> Result<Piece, PieceError> {
        if !self.contains_piece_index(piece_index) {
            return Err(PieceError::IndexOutOfBounds {
                piece_index,
                start: self.initial_piece_index,
                end: self.end_piece_index(),
            });
        }
        Ok(Piece::from_raw(piece_index))
    }

    /// Builds a handle from a 0-based list index. Does not check bounds.
    #[inline]
    pub(crate) fn piece_at_list_index_unchecked(&self, list_index: usize) -> Piece {
        Piece::from_raw(self.initial_piece_index + list_index as u32)
    }

    /// Position of `piece` in this geometry's arrays, if it belongs here.
    pub fn list_index_of(&self, piece: Piece) -> Option<usize> {
        self.contains_piece_index(piece.piece_index())
            .then(|| (piece.piece_index() - self.initial_piece_index) as usize)
    }

    /// Size of `piece` in bytes.
    ///
    /// # Panics
    ///
    /// Panics if `piece` is outside this geometry's index space.
    pub fn size(&self, piece: Piece) -> u64 {
        self.sizes[self.slot(piece)]
    }

    /// Offset of the first byte of `piece` in the content stream.
    ///
    /// # Panics
    ///
    /// Panics if `piece` is outside this geometry's index space.
    pub fn data_start_offset(&self, piece: Piece) -> u64 {
        self.data_offsets[self.slot(piece)]
    }

    /// Offset of the last byte of `piece` (inclusive).
    ///
    /// # Panics
    ///
    /// Panics if `piece` is outside this geometry's index space.
    pub fn data_last_offset(&self, piece: Piece) -> u64 {
        self.data_end_offset(piece) - 1
    }

    /// Offset one past the last byte of `piece` (exclusive).
    ///
    /// # Panics
    ///
    /// Panics if `piece` is outside this geometry's index space.
    pub fn data_end_offset(&self, piece: Piece) -> u64 {
        let slot = self.slot(piece);
        self.data_offsets[slot] + self.sizes[slot]
    }

    /// Byte range covered by `piece`.
    ///
    /// # Panics
    ///
    /// Panics if `piece` is outside this geometry's index space.
    pub fn data_offset_range(&self, piece: Piece) -> Range<u64> {
        let slot = self.slot(piece);
        self.data_offsets[slot]..self.data_offsets[slot] + self.sizes[slot]
    }

    fn slot(&self, piece: Piece) -> usize {
        match self.list_index_of(piece) {
            Some(slot) => slot,
            None => panic!(
                "{piece} is outside piece index space {}..{}",
                self.initial_piece_index,
                self.end_piece_index()
            ),
        }
    }
}

impl Default for PieceGeometry {
    fn default() -> Self {
        Self::empty()
    }
}

fn validate_index_space(num_pieces: usize, initial_piece_index: u32) -> Result<(), PieceError> {
    // The last valid index must stay below Piece::INVALID.
    let end = u64::from(initial_piece_index) + num_pieces as u64;
    if end > u64::from(u32::MAX) {
        return Err(PieceError::InvalidGeometry {
            reason: format!(
                "{num_pieces} pieces starting at index {initial_piece_index} exceed the piece index space"
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_with_remainder() {
        let geometry = PieceGeometry::uniform(1000, 300, 0, 0).unwrap();

        assert_eq!(geometry.sizes(), &[300, 300, 300, 100]);
        assert_eq!(geometry.data_offsets(), &[0, 300, 600, 900]);
        assert_eq!(geometry.count(), 4);
        assert_eq!(geometry.total_size(), 1000);
        assert_eq!(geometry.end_piece_index(), 4);
    }

    #[test]
    fn test_uniform_exact_division_has_no_empty_tail() {
        let geometry = PieceGeometry::uniform(900, 300, 0, 0).unwrap();

        assert_eq!(geometry.sizes(), &[300, 300, 300]);
        assert_eq!(geometry.total_size(), 900);
    }

    #[test]
    fn test_uniform_applies_initial_offset_and_index() {
        let geometry = PieceGeometry::uniform(250, 100, 1_000, 10).unwrap();

        assert_eq!(geometry.data_offsets(), &[1_000, 1_100, 1_200]);
        assert_eq!(geometry.sizes(), &[100, 100, 50]);
        assert_eq!(geometry.initial_piece_index(), 10);
        assert_eq!(geometry.end_piece_index(), 13);

        let last = geometry.piece_by_index(12).unwrap();
        assert_eq!(geometry.data_start_offset(last), 1_200);
        assert_eq!(geometry.data_last_offset(last), 1_249);
        assert_eq!(geometry.data_end_offset(last), 1_250);
        assert_eq!(geometry.data_offset_range(last), 1_200..1_250);
    }

    #[test]
    fn test_uniform_zero_total_is_empty() {
        let geometry = PieceGeometry::uniform(0, 300, 0, 5).unwrap();

        assert!(geometry.is_empty());
        assert_eq!(geometry.total_size(), 0);
        assert_eq!(geometry.end_piece_index(), 5);
    }

    #[test]
    fn test_zero_piece_size_rejected() {
        let err = PieceGeometry::uniform(1000, 0, 0, 0).unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_from_fn_calls_size_function_once_per_index() {
        let mut calls = Vec::new();
        let geometry = PieceGeometry::from_fn(3, 5, 0, |i| {
            calls.push(i);
            (i as u64 + 1) * 10
        })
        .unwrap();

        assert_eq!(calls, vec![0, 1, 2]);
        assert_eq!(geometry.sizes(), &[10, 20, 30]);
        assert_eq!(geometry.data_offsets(), &[5, 15, 35]);
        assert_eq!(geometry.total_size(), 60);
    }

    #[test]
    fn test_from_fn_rejects_zero_size() {
        let result = PieceGeometry::from_fn(3, 0, 0, |i| if i == 1 { 0 } else { 10 });
        assert!(matches!(result, Err(PieceError::InvalidGeometry { .. })));
    }

    #[test]
    fn test_from_fn_rejects_offset_overflow() {
        let result = PieceGeometry::from_fn(2, u64::MAX - 5, 0, |_| 10);
        assert!(matches!(result, Err(PieceError::InvalidGeometry { .. })));
    }

    #[test]
    fn test_index_space_must_fit() {
        let result = PieceGeometry::from_fn(2, 0, u32::MAX - 1, |_| 1);
        assert!(matches!(result, Err(PieceError::InvalidGeometry { .. })));

        let geometry = PieceGeometry::from_fn(1, 0, u32::MAX - 1, |_| 1).unwrap();
        assert_eq!(geometry.end_piece_index(), u32::MAX);
    }

    #[test]
    fn test_piece_by_index_bounds() {
        let geometry = PieceGeometry::uniform(1000, 100, 0, 20).unwrap();

        assert!(geometry.piece_by_index(19).is_err());
        assert!(geometry.piece_by_index(30).is_err());
        assert_eq!(geometry.piece_by_index(20).unwrap().piece_index(), 20);
        assert_eq!(geometry.piece_by_index(29).unwrap().piece_index(), 29);

        match geometry.piece_by_index(30) {
            Err(PieceError::IndexOutOfBounds {
                piece_index,
                start,
                end,
            }) => {
                assert_eq!((piece_index, start, end), (30, 20, 30));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_slice_geometry_copies_sub_range() {
        let geometry = PieceGeometry::uniform(1000, 300, 0, 4).unwrap();
        let sliced = geometry.slice_geometry(1, 4).unwrap();

        assert_eq!(sliced.sizes(), &[300, 300, 100]);
        assert_eq!(sliced.data_offsets(), &[300, 600, 900]);
        assert_eq!(sliced.initial_piece_index(), 5);
        assert_eq!(sliced.total_size(), 700);

        assert!(geometry.slice_geometry(2, 2).unwrap().is_empty());
        assert!(geometry.slice_geometry(3, 2).is_err());
        assert!(geometry.slice_geometry(0, 5).is_err());
    }

    #[test]
    #[should_panic(expected = "outside piece index space")]
    fn test_foreign_piece_panics() {
        let geometry = PieceGeometry::uniform(1000, 100, 0, 0).unwrap();
        geometry.size(Piece::from_raw(10));
    }
}
