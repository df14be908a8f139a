//! Piecemeal Core - piece geometry and concurrent piece-state tracking
//!
//! This crate provides the bookkeeping a BitTorrent-style engine needs for a
//! content object split into pieces: where each piece lives in the content
//! byte stream, what state each piece is in, slices that share that state,
//! and an async wait for a piece to finish. Networking, disk I/O, piece
//! selection and hash checks are left to the engine that uses it.

pub mod config;
pub mod pieces;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::{PieceListConfig, PiecemealConfig, SimulationConfig};
pub use pieces::{
    DefaultPieceList, MutablePieceList, Piece, PieceError, PieceGeometry, PieceList,
    PieceListSlice, PieceQuery, PieceState, Subscription,
};

/// Top-level errors surfaced by Piecemeal components.
#[derive(Debug, thiserror::Error)]
pub enum PiecemealError {
    #[error("Piece error: {0}")]
    Piece(#[from] PieceError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("Simulation error: {reason}")]
    Simulation { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PiecemealError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            PiecemealError::Piece(e) => match e {
                PieceError::InvalidGeometry { reason } => format!("Invalid piece layout: {reason}"),
                PieceError::InvalidSlice { start, end, count } => {
                    format!("Cannot slice {start}..{end} out of {count} pieces")
                }
                PieceError::IndexOutOfBounds {
                    piece_index,
                    start,
                    end,
                } => format!("Piece {piece_index} is not in {start}..{end}"),
                _ => "Piece lookup failed".to_string(),
            },
            PiecemealError::Configuration { reason } => format!("Configuration error: {reason}"),
            PiecemealError::Simulation { .. } => "Simulation failed".to_string(),
            PiecemealError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        match self {
            PiecemealError::Piece(e) => e.is_configuration_error(),
            PiecemealError::Configuration { .. } => true,
            PiecemealError::Simulation { .. } | PiecemealError::Io(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PiecemealError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        let err: PiecemealError = PieceError::InvalidGeometry {
            reason: "piece size must be positive".to_string(),
        }
        .into();
        assert!(err.is_user_error());
        assert_eq!(
            err.user_message(),
            "Invalid piece layout: piece size must be positive"
        );

        let err: PiecemealError = PieceError::Empty.into();
        assert!(!err.is_user_error());
        assert_eq!(err.user_message(), "Piece lookup failed");
    }
}
