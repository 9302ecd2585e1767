//! Dirty/activity tracking - which chunks need simulation this frame
//!
//! Chunk workers never write chunk metadata. They record dirty marks into a
//! private [`DirtyLog`], and the frame driver merges every log serially once
//! the group has finished.

use smallvec::SmallVec;

use super::chunk::{ChunkState, DirtyRect};
use super::grid::CellStore;
use super::CHUNK_SIZE;

/// Receiver for dirty marks in chunk-local coordinates
pub trait DirtySink {
    fn mark(&mut self, chunk: usize, x: usize, y: usize);
}

/// Mark `(x, y)` in its own chunk, plus the touching cells of any adjacent
/// chunk when the cell sits on a chunk edge.
pub fn mark_with_neighbors<S: DirtySink + ?Sized>(sink: &mut S, cells: &CellStore, x: i32, y: i32) {
    let (home, lx, ly) = cells.world_to_chunk(x, y);
    sink.mark(home, lx, ly);

    let on_edge = lx == 0 || ly == 0 || lx == CHUNK_SIZE - 1 || ly == CHUNK_SIZE - 1;
    if !on_edge {
        return;
    }

    for dy in -1..=1 {
        for dx in -1..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let (nx, ny) = (x + dx, y + dy);
            if !cells.in_bounds(nx, ny) {
                continue;
            }
            let (chunk, nlx, nly) = cells.world_to_chunk(nx, ny);
            if chunk != home {
                sink.mark(chunk, nlx, nly);
            }
        }
    }
}

/// Dirty marks produced by one chunk job
///
/// A job writes at most into its own chunk and the eight around it.
#[derive(Debug, Default, Clone)]
pub struct DirtyLog {
    entries: SmallVec<[(usize, DirtyRect); 9]>,
}

impl DirtySink for DirtyLog {
    fn mark(&mut self, chunk: usize, x: usize, y: usize) {
        match self.entries.iter_mut().find(|(c, _)| *c == chunk) {
            Some((_, rect)) => rect.expand(x, y),
            None => self.entries.push((chunk, DirtyRect::new(x, y))),
        }
    }
}

impl DirtyLog {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn touched_chunks(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.iter().map(|(chunk, _)| *chunk)
    }

    pub fn rect_for(&self, chunk: usize) -> Option<DirtyRect> {
        self.entries
            .iter()
            .find(|(c, _)| *c == chunk)
            .map(|(_, rect)| *rect)
    }

    /// Apply the marks; these become next frame's dirty rects
    pub fn merge_into(&self, chunks: &mut [ChunkState]) {
        for (chunk, rect) in &self.entries {
            chunks[*chunk].mark_rect(rect);
        }
    }
}

/// Per-frame activity transitions
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActivitySummary {
    pub active: usize,
    /// Active now, idle last frame
    pub woken: usize,
    /// Idle now, active last frame
    pub slept: usize,
}

/// Activity tracking utilities
pub struct ActivityTracker;

impl ActivityTracker {
    /// Select this frame's chunks and turn their dirty rects into sweep rects
    ///
    /// The sweep rect is the dirty rect grown by one cell, so cells resting
    /// next to a change get a chance to react. Structure chunks sweep fully.
    pub fn plan_frame(chunks: &mut [ChunkState]) -> (Vec<usize>, ActivitySummary) {
        let mut plan = Vec::new();
        let mut summary = ActivitySummary::default();

        for (index, chunk) in chunks.iter_mut().enumerate() {
            let active = chunk.needs_simulation();
            match (chunk.was_active_last_frame, active) {
                (false, true) => summary.woken += 1,
                (true, false) => summary.slept += 1,
                _ => {}
            }
            chunk.was_active_last_frame = active;

            if !active {
                chunk.sweep_rect = None;
                continue;
            }

            chunk.sweep_rect = Some(if chunk.has_structure {
                DirtyRect::full()
            } else {
                chunk
                    .dirty_rect
                    .map(|rect| rect.grown(1))
                    .unwrap_or_else(DirtyRect::full)
            });
            chunk.clear_dirty_rect();
            plan.push(index);
        }

        summary.active = plan.len();
        (plan, summary)
    }

    /// Re-queue planned chunks in full (used when a frame is aborted)
    pub fn mark_all_dirty(chunks: &mut [ChunkState], plan: &[usize]) {
        for &index in plan {
            chunks[index].mark_all();
        }
    }

    /// End of frame: drop sweep rects, report how many chunks stay queued
    pub fn settle(chunks: &mut [ChunkState]) -> usize {
        let mut queued = 0;
        for chunk in chunks.iter_mut() {
            chunk.sweep_rect = None;
            if chunk.needs_simulation() {
                queued += 1;
            }
        }
        queued
    }

    /// Chunks that will be simulated next frame
    pub fn queued_count(chunks: &[ChunkState]) -> usize {
        chunks.iter().filter(|c| c.needs_simulation()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::IVec2;

    fn states(n: usize) -> Vec<ChunkState> {
        (0..n)
            .map(|i| ChunkState::new(IVec2::new(i as i32, 0)))
            .collect()
    }

    #[test]
    fn test_plan_skips_clean_chunks() {
        let mut chunks = states(4);
        chunks[1].mark_dirty(5, 5);
        chunks[3].has_structure = true;

        let (plan, summary) = ActivityTracker::plan_frame(&mut chunks);
        assert_eq!(plan, vec![1, 3]);
        assert_eq!(summary.active, 2);
        assert_eq!(summary.woken, 2);
        assert!(chunks[0].sweep_rect.is_none());
    }

    #[test]
    fn test_plan_grows_dirty_rect_into_sweep() {
        let mut chunks = states(1);
        chunks[0].mark_dirty(5, 5);

        ActivityTracker::plan_frame(&mut chunks);
        let sweep = chunks[0].sweep_rect.unwrap();
        assert_eq!((sweep.min_x, sweep.min_y, sweep.max_x, sweep.max_y), (4, 4, 6, 6));
        assert!(!chunks[0].is_dirty(), "dirty rect consumed by the plan");
    }

    #[test]
    fn test_structure_chunk_sweeps_fully() {
        let mut chunks = states(1);
        chunks[0].has_structure = true;
        chunks[0].mark_dirty(1, 1);

        ActivityTracker::plan_frame(&mut chunks);
        assert_eq!(chunks[0].sweep_rect, Some(DirtyRect::full()));
    }

    #[test]
    fn test_quiet_chunk_falls_asleep() {
        let mut chunks = states(1);
        chunks[0].mark_dirty(0, 0);

        let (_, first) = ActivityTracker::plan_frame(&mut chunks);
        assert_eq!(first.woken, 1);
        assert_eq!(ActivityTracker::settle(&mut chunks), 0);

        let (plan, second) = ActivityTracker::plan_frame(&mut chunks);
        assert!(plan.is_empty());
        assert_eq!(second.slept, 1);
    }

    #[test]
    fn test_dirty_log_merges_per_chunk() {
        let mut chunks = states(3);
        let mut log = DirtyLog::default();
        log.mark(2, 3, 4);
        log.mark(2, 10, 1);
        log.mark(0, 31, 31);

        assert_eq!(log.touched_chunks().collect::<Vec<_>>(), vec![2, 0]);
        log.merge_into(&mut chunks);

        assert!(!chunks[1].is_dirty());
        assert_eq!(
            chunks[2].dirty_rect,
            Some(DirtyRect {
                min_x: 3,
                min_y: 1,
                max_x: 10,
                max_y: 4
            })
        );
        assert_eq!(chunks[0].dirty_rect, Some(DirtyRect::new(31, 31)));
    }

    #[test]
    fn test_mark_with_neighbors_interior_stays_home() {
        let cells = CellStore::new(3, 3);
        let mut log = DirtyLog::default();
        mark_with_neighbors(&mut log, &cells, 40, 40);
        assert_eq!(log.touched_chunks().collect::<Vec<_>>(), vec![4]);
    }

    #[test]
    fn test_mark_with_neighbors_corner_wakes_three() {
        let cells = CellStore::new(3, 3);
        let mut log = DirtyLog::default();
        // Bottom-left corner of the centre chunk
        mark_with_neighbors(&mut log, &cells, 32, 32);

        let mut touched: Vec<_> = log.touched_chunks().collect();
        touched.sort_unstable();
        assert_eq!(touched, vec![0, 1, 3, 4]);
        assert_eq!(log.rect_for(0), Some(DirtyRect::new(31, 31)));
    }
}
