//! CLI command implementations

use clap::Subcommand;
use piecemeal_core::config::PiecemealConfig;
use piecemeal_core::{DefaultPieceList, PieceList, PieceQuery, Result};

use crate::simulation::run_simulation;

/// Number of leading pieces listed by `inspect`.
const INSPECT_PREVIEW_PIECES: usize = 8;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Print the piece layout for a content object
    Inspect {
        /// Total content size in bytes
        #[arg(long)]
        total_size: u64,
        /// Piece size in bytes (defaults to the configured piece size)
        #[arg(long)]
        piece_size: Option<u64>,
        /// Offset of the first piece in the content stream
        #[arg(long, default_value = "0")]
        initial_offset: u64,
        /// Absolute index of the first piece
        #[arg(long, default_value = "0")]
        initial_index: u32,
    },
    /// Run simulated workers and a player against one piece list
    Simulate {
        /// Number of pieces
        #[arg(short, long)]
        pieces: Option<usize>,
        /// Piece size in bytes
        #[arg(long)]
        piece_size: Option<u64>,
        /// Number of concurrent workers
        #[arg(short, long)]
        workers: Option<usize>,
        /// Seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,
        /// Probability that a transfer fails (0.0 to 1.0, exclusive)
        #[arg(long)]
        failure_rate: Option<f64>,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands) -> Result<()> {
    let config = PiecemealConfig::from_env();
    match command {
        Commands::Inspect {
            total_size,
            piece_size,
            initial_offset,
            initial_index,
        } => inspect_layout(
            total_size,
            piece_size.unwrap_or(config.pieces.default_piece_size),
            initial_offset,
            initial_index,
        ),
        Commands::Simulate {
            pieces,
            piece_size,
            workers,
            seed,
            failure_rate,
        } => {
            let mut config = config;
            if let Some(pieces) = pieces {
                config.simulation.piece_count = pieces;
            }
            if let Some(piece_size) = piece_size {
                config.simulation.piece_size = piece_size;
            }
            if let Some(workers) = workers {
                config.simulation.workers = workers;
            }
            if let Some(seed) = seed {
                config.simulation.deterministic_seed = Some(seed);
            }
            if let Some(failure_rate) = failure_rate {
                config.simulation.failure_rate = failure_rate;
            }

            let report = run_simulation(&config).await?;
            println!("Simulation finished in {:?}", report.elapsed);
            println!("  Seed: {}", report.seed);
            println!(
                "  Pieces: {} ({} bytes)",
                report.piece_count, report.total_size
            );
            println!("  Failed transfers: {}", report.failed_transfers);
            println!("  Lost claims: {}", report.lost_claims);
            println!(
                "  Second half finished notifications: {}",
                report.tail_finished_notifications
            );
            Ok(())
        }
    }
}

/// Print the geometry of a uniform piece layout
///
/// # Errors
/// - `PiecemealError::Piece` - Piece size is zero or the layout does not fit
pub fn inspect_layout(
    total_size: u64,
    piece_size: u64,
    initial_offset: u64,
    initial_index: u32,
) -> Result<()> {
    let list =
        DefaultPieceList::create_uniform(total_size, piece_size, initial_offset, initial_index)?;

    println!(
        "{} pieces, indices {}..{}, {} bytes",
        list.count(),
        list.initial_piece_index(),
        list.end_piece_index(),
        list.total_size()
    );

    for piece in list.pieces().take(INSPECT_PREVIEW_PIECES) {
        print_piece(&list, piece);
    }
    if list.count() > INSPECT_PREVIEW_PIECES {
        if list.count() > INSPECT_PREVIEW_PIECES + 1 {
            println!("  ...");
        }
        if let Some(last) = list.last() {
            print_piece(&list, last);
        }
    }

    Ok(())
}

fn print_piece(list: &DefaultPieceList, piece: piecemeal_core::Piece) {
    let range = list.data_offset_range(piece);
    println!(
        "  piece {:>6}  {:>12} bytes  [{}, {})",
        piece.piece_index(),
        list.size(piece),
        range.start,
        range.end
    );
}
