//! Piece geometry and shared piece-state tracking.
//!
//! A content object is split into contiguous pieces. `PieceGeometry` records
//! where each piece lives in the content byte stream, `DefaultPieceList` owns
//! the per-piece download state, and `PieceListSlice` exposes a sub-range of
//! a list that shares the very same state cells and subscriptions.

pub mod default_list;
pub mod geometry;
pub mod list;
pub mod piece;
pub mod query;
pub mod slice;
pub mod subscriptions;

pub use default_list::DefaultPieceList;
pub use geometry::PieceGeometry;
pub use list::{MutablePieceList, PieceList};
pub use piece::{Piece, PieceState};
pub use query::{PieceQuery, Pieces};
pub use slice::PieceListSlice;
pub use subscriptions::{PieceStateCallback, PieceSubscriptions, Subscription};

/// Errors reported by piece lists and geometry.
///
/// `InvalidGeometry` and `InvalidSlice` are configuration errors: the caller
/// built something inconsistent and should not retry. The remaining variants
/// are ordinary, recoverable lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PieceError {
    #[error("Invalid piece geometry: {reason}")]
    InvalidGeometry { reason: String },

    #[error("Invalid slice {start}..{end} of a list with {count} pieces")]
    InvalidSlice {
        start: usize,
        end: usize,
        count: usize,
    },

    #[error("Piece index {piece_index} out of bounds {start}..{end}")]
    IndexOutOfBounds {
        piece_index: u32,
        start: u32,
        end: u32,
    },

    #[error("List range {from}..{to} out of bounds for a list with {count} pieces")]
    ListIndexOutOfBounds {
        from: usize,
        to: usize,
        count: usize,
    },

    #[error("Piece list is empty")]
    Empty,
}

impl PieceError {
    /// Checks if this error comes from malformed construction parameters.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            PieceError::InvalidGeometry { .. } | PieceError::InvalidSlice { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(
            PieceError::InvalidGeometry {
                reason: "x".to_string()
            }
            .is_configuration_error()
        );
        assert!(
            PieceError::InvalidSlice {
                start: 2,
                end: 1,
                count: 3
            }
            .is_configuration_error()
        );
        assert!(!PieceError::Empty.is_configuration_error());
        assert!(
            !PieceError::IndexOutOfBounds {
                piece_index: 9,
                start: 0,
                end: 4
            }
            .is_configuration_error()
        );
    }

    #[test]
    fn test_out_of_bounds_message_names_range() {
        let err = PieceError::IndexOutOfBounds {
            piece_index: 9,
            start: 0,
            end: 4,
        };
        assert_eq!(err.to_string(), "Piece index 9 out of bounds 0..4");
    }
}
