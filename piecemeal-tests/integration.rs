//! Integration tests for Piecemeal
//!
//! These tests drive piece lists the way a download engine does: many
//! concurrent writers, slices per file, and readers awaiting pieces.

#[path = "integration/await_finished.rs"]
mod await_finished;
#[path = "integration/concurrent_state.rs"]
mod concurrent_state;
#[path = "integration/piece_geometry.rs"]
mod piece_geometry;
#[path = "integration/slice_sharing.rs"]
mod slice_sharing;
