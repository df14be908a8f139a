//! Concurrent writers contending on piece state

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use piecemeal_core::{DefaultPieceList, MutablePieceList, PieceList, PieceQuery, PieceState};
use tokio::sync::Barrier;

const WORKERS: usize = 32;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exactly_one_compare_and_set_wins() {
    let list = DefaultPieceList::create_uniform(64 * 1024, 16 * 1024, 0, 0).unwrap();
    let piece = list.piece_by_index(2).unwrap();
    let barrier = Arc::new(Barrier::new(WORKERS));

    let mut handles = Vec::with_capacity(WORKERS);
    for _ in 0..WORKERS {
        let list = list.clone();
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            list.compare_and_set_state(piece, PieceState::Ready, PieceState::Finished)
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(list.state(piece), PieceState::Finished);
}

#[test]
fn test_claims_across_threads_are_disjoint() {
    let list = DefaultPieceList::create_uniform(256 * 100, 100, 0, 0).unwrap();
    let claims: Vec<AtomicUsize> = (0..list.count()).map(|_| AtomicUsize::new(0)).collect();

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                for piece in list.pieces() {
                    if list.compare_and_set_state(piece, PieceState::Ready, PieceState::Downloading)
                    {
                        claims[piece.piece_index() as usize].fetch_add(1, Ordering::SeqCst);
                        list.set_state(piece, PieceState::Finished);
                    }
                }
            });
        }
    });

    assert!(claims.iter().all(|claimed| claimed.load(Ordering::SeqCst) == 1));
    assert!(list.is_all_finished());
}

#[test]
fn test_every_successful_write_notifies_once() {
    let list = DefaultPieceList::create_uniform(1000, 100, 0, 0).unwrap();
    let piece = list.piece_by_index(0).unwrap();
    let notifications = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&notifications);
    list.subscribe_piece_state(
        piece,
        Box::new(move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );

    let successes = AtomicUsize::new(0);
    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                for _ in 0..100 {
                    if list.compare_and_set_state(piece, PieceState::Ready, PieceState::Downloading)
                    {
                        successes.fetch_add(1, Ordering::SeqCst);
                        list.set_state(piece, PieceState::Ready);
                    }
                }
            });
        }
    });

    // Each successful claim is followed by one plain write back to Ready
    assert_eq!(
        notifications.load(Ordering::SeqCst),
        successes.load(Ordering::SeqCst) * 2
    );
    assert_eq!(list.state(piece), PieceState::Ready);
}

#[test]
fn test_plain_writes_are_visible_to_other_threads() {
    let list = DefaultPieceList::create_uniform(1000, 100, 0, 0).unwrap();

    std::thread::scope(|scope| {
        for piece in list.pieces() {
            let list = &list;
            scope.spawn(move || list.set_state(piece, PieceState::NotAvailable));
        }
    });

    assert_eq!(list.count_in_state(PieceState::NotAvailable), 10);
}
