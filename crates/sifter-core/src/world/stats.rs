//! Simulation statistics collection trait

/// Trait for collecting simulation statistics
///
/// Chunk jobs count locally; the frame driver feeds the totals in here
/// after each group, so implementations never see concurrent calls.
pub trait SimStats {
    /// Record that a cell changed position
    fn record_cell_moved(&mut self);

    /// Record that a velocity trace was blocked
    fn record_collision(&mut self);

    /// Record that a chunk job ran
    fn record_chunk_simulated(&mut self);
}

/// A no-op implementation for when stats collection is not needed
#[derive(Default)]
pub struct NoopStats;

impl SimStats for NoopStats {
    fn record_cell_moved(&mut self) {}
    fn record_collision(&mut self) {}
    fn record_chunk_simulated(&mut self) {}
}

/// Running totals across frames
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CountingStats {
    pub cells_moved: u64,
    pub collisions: u64,
    pub chunks_simulated: u64,
}

impl SimStats for CountingStats {
    fn record_cell_moved(&mut self) {
        self.cells_moved += 1;
    }

    fn record_collision(&mut self) {
        self.collisions += 1;
    }

    fn record_chunk_simulated(&mut self) {
        self.chunks_simulated += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_stats_all_methods() {
        let mut stats = NoopStats;

        for _ in 0..100 {
            stats.record_cell_moved();
            stats.record_collision();
            stats.record_chunk_simulated();
        }
        // No-op implementation should not track any state, just pass through
    }

    #[test]
    fn test_counting_stats_implementation() {
        let mut stats = CountingStats::default();

        stats.record_cell_moved();
        stats.record_cell_moved();
        stats.record_collision();
        stats.record_chunk_simulated();
        stats.record_chunk_simulated();
        stats.record_chunk_simulated();

        assert_eq!(stats.cells_moved, 2);
        assert_eq!(stats.collisions, 1);
        assert_eq!(stats.chunks_simulated, 3);
    }

    #[test]
    fn test_stats_as_trait_object() {
        let mut counting = CountingStats::default();
        let stats: &mut dyn SimStats = &mut counting;
        stats.record_collision();
        assert_eq!(counting.collisions, 1);
    }
}
