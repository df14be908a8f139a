//! Centralized configuration for Piecemeal.
//!
//! All tunable parameters are defined here to avoid hard-coded values
//! scattered throughout the codebase.

use std::time::Duration;

/// Central configuration for all Piecemeal components.
///
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct PiecemealConfig {
    pub pieces: PieceListConfig,
    pub simulation: SimulationConfig,
}

/// Piece list construction settings.
#[derive(Debug, Clone)]
pub struct PieceListConfig {
    /// Number of lock shards in each subscription registry
    pub subscription_shards: usize,
    /// Piece size used when a caller does not specify one
    pub default_piece_size: u64,
}

impl Default for PieceListConfig {
    fn default() -> Self {
        Self {
            subscription_shards: 16,
            default_piece_size: 262_144, // 256 KiB
        }
    }
}

/// Settings for the simulated download driven by `piecemeal simulate`.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Deterministic seed for reproducible runs
    pub deterministic_seed: Option<u64>,
    /// Number of concurrent simulated workers
    pub workers: usize,
    /// Number of pieces in the simulated content
    pub piece_count: usize,
    /// Size of each simulated piece in bytes
    pub piece_size: u64,
    /// Probability that a simulated transfer fails (0.0 to 1.0)
    pub failure_rate: f64,
    /// Upper bound of the simulated per-piece transfer time
    pub max_transfer_delay: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            deterministic_seed: None,
            workers: 8,
            piece_count: 64,
            piece_size: 262_144,
            failure_rate: 0.05, // 5% failed transfers
            max_transfer_delay: Duration::from_millis(40),
        }
    }
}

impl SimulationConfig {
    /// Creates a configuration for deterministic testing.
    pub fn deterministic_testing() -> Self {
        Self {
            deterministic_seed: Some(42), // Fixed seed for reproducible tests
            workers: 4,
            piece_count: 16,
            piece_size: 16_384,
            failure_rate: 0.0,
            max_transfer_delay: Duration::from_millis(1),
        }
    }
}

impl PiecemealConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Unparseable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(shards) = std::env::var("PIECEMEAL_SUBSCRIPTION_SHARDS") {
            if let Ok(count) = shards.parse::<usize>() {
                config.pieces.subscription_shards = count.max(1);
            }
        }

        if let Ok(piece_size) = std::env::var("PIECEMEAL_DEFAULT_PIECE_SIZE") {
            if let Ok(bytes) = piece_size.parse::<u64>() {
                config.pieces.default_piece_size = bytes;
            }
        }

        if let Ok(seed) = std::env::var("PIECEMEAL_SIMULATION_SEED") {
            if let Ok(seed_value) = seed.parse::<u64>() {
                config.simulation.deterministic_seed = Some(seed_value);
            }
        }

        if let Ok(workers) = std::env::var("PIECEMEAL_SIMULATION_WORKERS") {
            if let Ok(count) = workers.parse::<usize>() {
                config.simulation.workers = count;
            }
        }

        config
    }

    /// Creates a configuration optimized for testing.
    pub fn for_testing() -> Self {
        Self {
            pieces: PieceListConfig {
                subscription_shards: 4,
                ..Default::default()
            },
            simulation: SimulationConfig::deterministic_testing(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = PiecemealConfig::default();

        assert_eq!(config.pieces.subscription_shards, 16);
        assert_eq!(config.pieces.default_piece_size, 262_144);
        assert_eq!(config.simulation.workers, 8);
        assert_eq!(config.simulation.deterministic_seed, None);
    }

    #[test]
    fn test_testing_preset() {
        let config = PiecemealConfig::for_testing();

        assert_eq!(config.pieces.subscription_shards, 4);
        assert_eq!(config.simulation.deterministic_seed, Some(42));
        assert_eq!(config.simulation.failure_rate, 0.0);
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("PIECEMEAL_SUBSCRIPTION_SHARDS", "0");
            std::env::set_var("PIECEMEAL_DEFAULT_PIECE_SIZE", "1048576");
            std::env::set_var("PIECEMEAL_SIMULATION_SEED", "12345");
            std::env::set_var("PIECEMEAL_SIMULATION_WORKERS", "not-a-number");
        }

        let config = PiecemealConfig::from_env();

        assert_eq!(config.pieces.subscription_shards, 1);
        assert_eq!(config.pieces.default_piece_size, 1_048_576);
        assert_eq!(config.simulation.deterministic_seed, Some(12345));
        assert_eq!(config.simulation.workers, 8);

        // Cleanup
        unsafe {
            std::env::remove_var("PIECEMEAL_SUBSCRIPTION_SHARDS");
            std::env::remove_var("PIECEMEAL_DEFAULT_PIECE_SIZE");
            std::env::remove_var("PIECEMEAL_SIMULATION_SEED");
            std::env::remove_var("PIECEMEAL_SIMULATION_WORKERS");
        }
    }
}
