//! Slices sharing state with their backing list

use std::time::Duration;

use piecemeal_core::{
    DefaultPieceList, MutablePieceList, PieceError, PieceList, PieceQuery, PieceState,
};

#[test]
fn test_write_through_slice_visible_in_backing_list() {
    let list = DefaultPieceList::create_uniform(10 * 512, 512, 0, 0).unwrap();
    let slice = list.slice(3, 7).unwrap();

    assert_eq!(slice.count(), 4);
    assert_eq!(slice.initial_piece_index(), list.initial_piece_index() + 3);

    slice.set_state(slice.piece_by_index(5).unwrap(), PieceState::Finished);
    assert_eq!(
        list.state(list.piece_by_index(5).unwrap()),
        PieceState::Finished
    );

    list.set_state(list.piece_by_index(6).unwrap(), PieceState::Failed);
    assert_eq!(
        slice.state(slice.piece_by_index(6).unwrap()),
        PieceState::Failed
    );
}

#[test]
fn test_per_file_slices_of_multi_file_content() {
    // Three files of 700, 1300 and 500 bytes in 256-byte pieces. Files share
    // boundary pieces, so their piece ranges overlap.
    let list = DefaultPieceList::create_uniform(2500, 256, 0, 0).unwrap();
    let files = [(0u64, 700u64), (700, 1300), (2000, 500)];

    let slices: Vec<_> = files
        .iter()
        .map(|&(offset, length)| {
            let first = list.piece_at_data_offset(offset).unwrap();
            let last = list.piece_at_data_offset(offset + length - 1).unwrap();
            let start = (first.piece_index() - list.initial_piece_index()) as usize;
            let end = (last.piece_index() - list.initial_piece_index()) as usize + 1;
            list.slice(start, end).unwrap()
        })
        .collect();

    assert_eq!(slices[0].pieces().count(), 3); // pieces 0..3
    assert_eq!(slices[1].initial_piece_index(), 2); // 700 falls in piece 2
    assert_eq!(slices[1].end_piece_index(), 8);
    assert_eq!(slices[2].initial_piece_index(), 7);

    // Piece 2 holds the end of file 0 and the start of file 1
    let shared = list.piece_by_index(2).unwrap();
    slices[0].set_state(shared, PieceState::Finished);
    assert!(slices[1].state(shared).is_finished());
    assert_eq!(slices[1].count_in_state(PieceState::Finished), 1);
    assert_eq!(list.finished_size(), 256);
}

#[test]
fn test_out_of_range_slice_is_configuration_error() {
    let list = DefaultPieceList::create_uniform(1000, 100, 0, 0).unwrap();

    let err = list.slice(4, 11).unwrap_err();
    assert!(err.is_configuration_error());
    assert_eq!(
        err,
        PieceError::InvalidSlice {
            start: 4,
            end: 11,
            count: 10
        }
    );
}

#[tokio::test]
async fn test_wait_on_one_slice_resolved_through_another() {
    let list = DefaultPieceList::create_uniform(1000, 100, 0, 0).unwrap();
    let left = list.slice(0, 6).unwrap();
    let right = list.slice(4, 10).unwrap();
    let piece = left.piece_by_index(5).unwrap();

    let waiter = {
        let left = left.clone();
        tokio::spawn(async move { left.await_finished(piece).await })
    };
    while list.subscription_count_for(piece) == 0 {
        tokio::task::yield_now().await;
    }

    assert!(right.compare_and_set_state(piece, PieceState::Ready, PieceState::Finished));
    tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("waiter should resume")
        .unwrap();
    assert_eq!(list.subscription_count(), 0);
}
