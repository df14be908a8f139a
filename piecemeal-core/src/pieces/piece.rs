//! Piece handles and piece states.

use std::fmt;

/// Index-only handle identifying one piece by its absolute piece index.
///
/// A `Piece` carries no geometry or state. It is only meaningful together with
/// a piece list (or a slice of it) whose index space contains it. Handles
/// obtained from a list are valid in every slice sharing that index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Piece(u32);

impl Piece {
    /// Reserved "no piece" sentinel. Never produced by a valid piece list.
    pub const INVALID: Piece = Piece(u32::MAX);

    /// Creates a handle from an absolute piece index without any validation.
    ///
    /// Prefer `PieceList::piece_by_index`, which checks the index against
    /// the list's index space.
    pub(crate) const fn from_raw(piece_index: u32) -> Self {
        Self(piece_index)
    }

    /// Returns the absolute piece index.
    pub const fn piece_index(self) -> u32 {
        self.0
    }

    /// Returns false for the `INVALID` sentinel.
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }
}

impl fmt::Display for Piece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "Piece({})", self.0)
        } else {
            write!(f, "Piece(invalid)")
        }
    }
}

/// Download state of a single piece.
///
/// `Ready` and `Finished` are the states every engine relies on. The others
/// describe intermediate or failed transfers; set, compare-and-set and
/// notifications treat every state the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
#[repr(u8)]
pub enum PieceState {
    /// Not yet requested or obtained
    #[default]
    Ready = 0,
    /// Requested from a peer, data in flight
    Downloading = 1,
    /// Fully received
    Finished = 2,
    /// Transfer failed and may be retried
    Failed = 3,
    /// No connected peer can provide this piece
    NotAvailable = 4,
}

impl PieceState {
    pub(crate) const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decodes a state stored in an atomic cell.
    ///
    /// Cells are only ever written through `as_u8`, so unknown values cannot
    /// occur; they decode to `Ready` rather than panicking.
    pub(crate) const fn from_u8(value: u8) -> Self {
        match value {
            1 => PieceState::Downloading,
            2 => PieceState::Finished,
            3 => PieceState::Failed,
            4 => PieceState::NotAvailable,
            _ => PieceState::Ready,
        }
    }

    /// Returns true for `Finished`.
    pub const fn is_finished(self) -> bool {
        matches!(self, PieceState::Finished)
    }
}

impl fmt::Display for PieceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PieceState::Ready => write!(f, "ready"),
            PieceState::Downloading => write!(f, "downloading"),
            PieceState::Finished => write!(f, "finished"),
            PieceState::Failed => write!(f, "failed"),
            PieceState::NotAvailable => write!(f, "not-available"),
        }
    }
}
