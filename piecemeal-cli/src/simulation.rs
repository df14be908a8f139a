//! Simulated download against a single piece list.
//!
//! Workers race to claim pieces with compare-and-set, "transfer" them by
//! sleeping for a seeded random delay, and mark them finished or failed. A
//! player awaits every piece in order, and a slice over the second half of
//! the content counts finish notifications the way a per-file view would.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use piecemeal_core::config::PiecemealConfig;
use piecemeal_core::{
    DefaultPieceList, MutablePieceList, PieceGeometry, PieceList, PieceQuery, PieceState,
    PiecemealError, Result,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Outcome of one simulated download.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub seed: u64,
    pub piece_count: usize,
    pub total_size: u64,
    pub failed_transfers: usize,
    /// Claims lost to another worker's compare-and-set
    pub lost_claims: usize,
    pub tail_finished_notifications: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
struct WorkerStats {
    completed: usize,
    failed: usize,
    lost_claims: usize,
}

/// Runs workers and a player until every piece is finished.
///
/// # Errors
/// - `PiecemealError::Configuration` - Zero workers or a failure rate outside `0.0..1.0`
/// - `PiecemealError::Piece` - Invalid piece layout
/// - `PiecemealError::Simulation` - A worker or the player task panicked
pub async fn run_simulation(config: &PiecemealConfig) -> Result<SimulationReport> {
    let simulation = &config.simulation;
    if simulation.workers == 0 {
        return Err(PiecemealError::Configuration {
            reason: "simulation needs at least one worker".to_string(),
        });
    }
    if !(0.0..1.0).contains(&simulation.failure_rate) {
        return Err(PiecemealError::Configuration {
            reason: format!(
                "failure rate {} must be in 0.0..1.0",
                simulation.failure_rate
            ),
        });
    }

    let seed = simulation
        .deterministic_seed
        .unwrap_or_else(|| rand::rng().random());
    let geometry =
        PieceGeometry::from_fn(simulation.piece_count, 0, 0, |_| simulation.piece_size)?;
    let list = DefaultPieceList::with_config(geometry, &config.pieces);
    info!(
        "Simulating {} pieces with {} workers (seed {})",
        list.count(),
        simulation.workers,
        seed
    );

    let started = Instant::now();

    let tail = list.slice(list.count() / 2, list.count())?;
    let tail_finished = Arc::new(AtomicUsize::new(0));
    let tail_subscriptions: Vec<_> = tail
        .pieces()
        .map(|piece| {
            let tail_finished = Arc::clone(&tail_finished);
            tail.subscribe_piece_state(
                piece,
                Box::new(move |_, _, state| {
                    if state.is_finished() {
                        tail_finished.fetch_add(1, Ordering::Relaxed);
                    }
                }),
            )
        })
        .collect();

    let player = {
        let list = list.clone();
        tokio::spawn(async move { play_in_order(&list).await })
    };

    let max_delay_ms = u64::try_from(simulation.max_transfer_delay.as_millis()).unwrap_or(u64::MAX);
    let mut workers = JoinSet::new();
    for worker_id in 0..simulation.workers {
        let list = list.clone();
        let rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(worker_id as u64));
        let failure_rate = simulation.failure_rate;
        workers.spawn(run_worker(list, worker_id, rng, max_delay_ms, failure_rate));
    }

    let mut totals = WorkerStats::default();
    while let Some(joined) = workers.join_next().await {
        let stats = joined.map_err(|e| PiecemealError::Simulation {
            reason: format!("worker task failed: {e}"),
        })?;
        totals.completed += stats.completed;
        totals.failed += stats.failed;
        totals.lost_claims += stats.lost_claims;
    }

    player.await.map_err(|e| PiecemealError::Simulation {
        reason: format!("player task failed: {e}"),
    })?;

    for subscription in tail_subscriptions {
        tail.unsubscribe_piece_state(subscription);
    }

    let report = SimulationReport {
        seed,
        piece_count: list.count(),
        total_size: list.total_size(),
        failed_transfers: totals.failed,
        lost_claims: totals.lost_claims,
        tail_finished_notifications: tail_finished.load(Ordering::Relaxed),
        elapsed: started.elapsed(),
    };
    info!(
        "Simulation complete: {} transfers, {} failed, {} lost claims in {:?}",
        totals.completed, report.failed_transfers, report.lost_claims, report.elapsed
    );
    Ok(report)
}

async fn run_worker(
    list: DefaultPieceList,
    worker_id: usize,
    mut rng: ChaCha8Rng,
    max_delay_ms: u64,
    failure_rate: f64,
) -> WorkerStats {
    let mut stats = WorkerStats::default();

    loop {
        let claimable = list.pieces().find(|&piece| {
            matches!(
                list.state(piece),
                PieceState::Ready | PieceState::Failed
            )
        });
        let Some(piece) = claimable else {
            if list.is_all_finished() {
                break;
            }
            // Remaining pieces are in flight on other workers
            tokio::time::sleep(Duration::from_millis(1)).await;
            continue;
        };

        let current = list.state(piece);
        if !matches!(current, PieceState::Ready | PieceState::Failed)
            || !list.compare_and_set_state(piece, current, PieceState::Downloading)
        {
            stats.lost_claims += 1;
            tokio::task::yield_now().await;
            continue;
        }

        tokio::time::sleep(Duration::from_millis(rng.random_range(0..=max_delay_ms))).await;

        if rng.random_bool(failure_rate) {
            debug!("Worker {worker_id} failed {piece}");
            list.set_state(piece, PieceState::Failed);
            stats.failed += 1;
        } else {
            list.set_state(piece, PieceState::Finished);
            stats.completed += 1;
        }
    }

    debug!(
        "Worker {worker_id} done: {} completed, {} failed",
        stats.completed, stats.failed
    );
    stats
}

async fn play_in_order(list: &DefaultPieceList) {
    let count = list.count();
    for (played, piece) in list.pieces().enumerate() {
        list.await_finished(piece).await;
        if (played + 1) % 16 == 0 || played + 1 == count {
            info!(
                "Playable up to byte {} ({}/{} pieces)",
                list.data_end_offset(piece),
                played + 1,
                count
            );
        }
    }
}
