//! Waiting for pieces to finish, with cancellation

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::join_all;
use piecemeal_core::{DefaultPieceList, MutablePieceList, PieceList, PieceState};
use tokio_test::{assert_pending, assert_ready};

fn list() -> DefaultPieceList {
    DefaultPieceList::create_uniform(8 * 1024, 1024, 0, 0).unwrap()
}

#[test]
fn test_wait_stays_pending_until_finished() {
    let list = list();
    let piece = list.piece_by_index(3).unwrap();
    let mut wait = tokio_test::task::spawn(list.await_finished(piece));

    assert_pending!(wait.poll());
    assert_eq!(list.subscription_count_for(piece), 1);

    list.set_state(piece, PieceState::Downloading);
    assert_pending!(wait.poll());

    list.set_state(piece, PieceState::Finished);
    assert!(wait.is_woken());
    assert_ready!(wait.poll());

    drop(wait);
    assert_eq!(list.subscription_count(), 0);
}

#[test]
fn test_dropped_wait_is_never_resumed() {
    let list = list();
    let piece = list.piece_by_index(0).unwrap();
    let mut wait = tokio_test::task::spawn(list.await_finished(piece));

    assert_pending!(wait.poll());
    assert_eq!(list.subscription_count(), 1);

    drop(wait);
    assert_eq!(list.subscription_count(), 0);

    list.set_state(piece, PieceState::Finished);
    assert_eq!(list.subscription_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_waiters_each_resume_once() {
    let list = list();
    let piece = list.piece_by_index(5).unwrap();
    let resumed = Arc::new(AtomicUsize::new(0));

    let waiters: Vec<_> = (0..16)
        .map(|_| {
            let list = list.clone();
            let resumed = Arc::clone(&resumed);
            tokio::spawn(async move {
                list.await_finished(piece).await;
                resumed.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    while list.subscription_count_for(piece) < 16 {
        tokio::task::yield_now().await;
    }
    list.set_state(piece, PieceState::Finished);
    // A second finishing write must not resume anyone again
    list.set_state(piece, PieceState::Finished);

    let results = tokio::time::timeout(Duration::from_secs(5), join_all(waiters))
        .await
        .expect("waiters should resume");
    assert!(results.into_iter().all(|joined| joined.is_ok()));
    assert_eq!(resumed.load(Ordering::SeqCst), 16);
    assert_eq!(list.subscription_count(), 0);
}

#[tokio::test]
async fn test_aborted_waiter_releases_registration() {
    let list = list();
    let piece = list.piece_by_index(6).unwrap();

    let waiter = {
        let list = list.clone();
        tokio::spawn(async move { list.await_finished(piece).await })
    };
    while list.subscription_count_for(piece) == 0 {
        tokio::task::yield_now().await;
    }

    waiter.abort();
    let joined = waiter.await;
    assert!(joined.unwrap_err().is_cancelled());
    assert_eq!(list.subscription_count(), 0);

    list.set_state(piece, PieceState::Finished);
}

#[tokio::test]
async fn test_select_cancels_losing_wait() {
    let list = list();
    let slow = list.piece_by_index(1).unwrap();
    let fast = list.piece_by_index(2).unwrap();

    let writer = {
        let list = list.clone();
        tokio::spawn(async move {
            while list.subscription_count() < 2 {
                tokio::task::yield_now().await;
            }
            list.set_state(fast, PieceState::Finished);
        })
    };

    let finished_first = tokio::select! {
        _ = list.await_finished(slow) => slow,
        _ = list.await_finished(fast) => fast,
    };
    writer.await.unwrap();

    assert_eq!(finished_first, fast);
    assert_eq!(list.subscription_count(), 0);
}

#[tokio::test]
async fn test_timeout_is_layered_by_the_caller() {
    let list = list();
    let piece = list.piece_by_index(7).unwrap();

    let timed_out =
        tokio::time::timeout(Duration::from_millis(10), list.await_finished(piece)).await;

    assert!(timed_out.is_err());
    assert_eq!(list.state(piece), PieceState::Ready);
    assert_eq!(list.subscription_count(), 0);
}

#[tokio::test]
async fn test_compare_and_set_resumes_waiter() {
    let list = list();
    let piece = list.piece_by_index(4).unwrap();
    assert!(list.compare_and_set_state(piece, PieceState::Ready, PieceState::Downloading));

    let waiter = {
        let list = list.clone();
        tokio::spawn(async move { list.await_finished(piece).await })
    };
    while list.subscription_count_for(piece) == 0 {
        tokio::task::yield_now().await;
    }

    assert!(list.compare_and_set_state(piece, PieceState::Downloading, PieceState::Finished));
    tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("waiter should resume")
        .unwrap();
}

#[tokio::test]
async fn test_handle_from_another_list_leaves_wait_pending() {
    let first = list();
    let foreign =
        first.subscribe_piece_state(first.piece_by_index(0).unwrap(), Box::new(|_, _, _| {}));

    let second = list();
    let piece = second.piece_by_index(0).unwrap();
    let waiter = {
        let second = second.clone();
        tokio::spawn(async move { second.await_finished(piece).await })
    };
    while second.subscription_count_for(piece) == 0 {
        tokio::task::yield_now().await;
    }

    second.unsubscribe_piece_state(foreign);
    assert_eq!(second.subscription_count(), 1);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    second.set_state(piece, PieceState::Finished);
    tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("waiter should resume")
        .unwrap();
    assert_eq!(first.subscription_count(), 1);
}
