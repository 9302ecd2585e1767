//! Chunk metadata - dirty bounds and activity for one 32x32 region

use glam::IVec2;

use super::CHUNK_SIZE;

/// Bounding rect of touched cells, in chunk-local coordinates (inclusive)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirtyRect {
    pub min_x: usize,
    pub min_y: usize,
    pub max_x: usize,
    pub max_y: usize,
}

impl DirtyRect {
    pub fn new(x: usize, y: usize) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    /// The whole chunk
    pub fn full() -> Self {
        Self {
            min_x: 0,
            min_y: 0,
            max_x: CHUNK_SIZE - 1,
            max_y: CHUNK_SIZE - 1,
        }
    }

    pub fn expand(&mut self, x: usize, y: usize) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    pub fn union(&mut self, other: &DirtyRect) {
        self.expand(other.min_x, other.min_y);
        self.expand(other.max_x, other.max_y);
    }

    /// Grow by `margin` cells on every side, clipped to the chunk
    pub fn grown(&self, margin: usize) -> Self {
        Self {
            min_x: self.min_x.saturating_sub(margin),
            min_y: self.min_y.saturating_sub(margin),
            max_x: (self.max_x + margin).min(CHUNK_SIZE - 1),
            max_y: (self.max_y + margin).min(CHUNK_SIZE - 1),
        }
    }

    pub fn width(&self) -> usize {
        self.max_x - self.min_x + 1
    }
}

/// Activity bookkeeping for one chunk
#[derive(Clone, Debug)]
pub struct ChunkState {
    /// Chunk coordinates (in chunk space, not cell space)
    pub pos: IVec2,

    /// Cells touched since the last frame plan
    pub dirty_rect: Option<DirtyRect>,

    /// Region simulated in the current frame
    pub sweep_rect: Option<DirtyRect>,

    pub was_active_last_frame: bool,

    /// Contains cells driven by structures (belts, lifts) every frame
    pub has_structure: bool,
}

impl ChunkState {
    pub fn new(pos: IVec2) -> Self {
        Self {
            pos,
            dirty_rect: None,
            sweep_rect: None,
            was_active_last_frame: false,
            has_structure: false,
        }
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty_rect.is_some()
    }

    /// Dirty or holding structures that need continuous simulation
    pub fn needs_simulation(&self) -> bool {
        self.is_dirty() || self.has_structure
    }

    pub fn mark_dirty(&mut self, x: usize, y: usize) {
        debug_assert!(x < CHUNK_SIZE && y < CHUNK_SIZE);
        match &mut self.dirty_rect {
            Some(rect) => rect.expand(x, y),
            None => self.dirty_rect = Some(DirtyRect::new(x, y)),
        }
    }

    pub fn mark_rect(&mut self, rect: &DirtyRect) {
        match &mut self.dirty_rect {
            Some(existing) => existing.union(rect),
            None => self.dirty_rect = Some(*rect),
        }
    }

    pub fn mark_all(&mut self) {
        self.dirty_rect = Some(DirtyRect::full());
    }

    pub fn clear_dirty_rect(&mut self) {
        self.dirty_rect = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirty_rect() {
        let mut chunk = ChunkState::new(IVec2::ZERO);

        chunk.mark_dirty(10, 10);
        chunk.mark_dirty(20, 25);

        let rect = chunk.dirty_rect.unwrap();
        assert_eq!(rect.min_x, 10);
        assert_eq!(rect.min_y, 10);
        assert_eq!(rect.max_x, 20);
        assert_eq!(rect.max_y, 25);
    }

    #[test]
    fn test_grown_clips_to_chunk() {
        let rect = DirtyRect::new(0, CHUNK_SIZE - 1).grown(1);
        assert_eq!(rect.min_x, 0);
        assert_eq!(rect.max_x, 1);
        assert_eq!(rect.min_y, CHUNK_SIZE - 2);
        assert_eq!(rect.max_y, CHUNK_SIZE - 1);
    }

    #[test]
    fn test_structure_keeps_chunk_active() {
        let mut chunk = ChunkState::new(IVec2::new(3, 4));
        assert!(!chunk.needs_simulation());

        chunk.has_structure = true;
        assert!(chunk.needs_simulation());
        assert!(!chunk.is_dirty());
    }

    #[test]
    fn test_mark_rect_unions() {
        let mut chunk = ChunkState::new(IVec2::ZERO);
        chunk.mark_dirty(5, 5);
        chunk.mark_rect(&DirtyRect {
            min_x: 1,
            min_y: 8,
            max_x: 2,
            max_y: 9,
        });

        assert_eq!(
            chunk.dirty_rect,
            Some(DirtyRect {
                min_x: 1,
                min_y: 5,
                max_x: 5,
                max_y: 9,
            })
        );
    }
}
