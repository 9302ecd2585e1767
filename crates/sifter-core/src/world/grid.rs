//! Grid & chunk store - the flat cell array plus per-chunk metadata
//!
//! Cells live in [`CellStore`], three atomic words per position, so chunk
//! workers can share it by reference. Chunk metadata lives beside it in
//! [`Grid`] and is only ever mutated through `&mut Grid` (serially).

use std::sync::atomic::{AtomicU64, Ordering};

use glam::IVec2;
use sifter_simulation::{Cell, CellFlags, MaterialId, Materials};

use super::activity::{DirtySink, mark_with_neighbors};
use super::chunk::ChunkState;
use super::movement::can_displace;
use super::CHUNK_SIZE;
use crate::error::GridError;

/// Shared cell storage
///
/// Every accessor takes `&self`. Two workers never touch the same cell in one
/// pass (see `scheduler`), and the group barrier orders passes, so `Relaxed`
/// is sufficient; the atomics only rule out torn words.
pub struct CellStore {
    width: u32,
    height: u32,
    chunks_x: u32,
    chunks_y: u32,
    head: Box<[AtomicU64]>,
    motion: Box<[AtomicU64]>,
    link: Box<[AtomicU64]>,
}

impl CellStore {
    pub fn new(chunks_x: u32, chunks_y: u32) -> Self {
        let width = chunks_x * CHUNK_SIZE as u32;
        let height = chunks_y * CHUNK_SIZE as u32;
        let len = width as usize * height as usize;
        let words = |value: u64| -> Box<[AtomicU64]> {
            (0..len).map(|_| AtomicU64::new(value)).collect()
        };

        Self {
            width,
            height,
            chunks_x,
            chunks_y,
            head: words(Cell::AIR.pack_head()),
            motion: words(Cell::AIR.pack_motion()),
            link: words(Cell::AIR.pack_link()),
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn chunks_x(&self) -> u32 {
        self.chunks_x
    }

    #[inline]
    pub fn chunks_y(&self) -> u32 {
        self.chunks_y
    }

    pub fn len(&self) -> usize {
        self.head.len()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_empty()
    }

    #[inline]
    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height
    }

    /// Flat index of a cell, row-major with y growing upwards
    #[inline]
    pub fn index(&self, x: i32, y: i32) -> Option<usize> {
        self.in_bounds(x, y)
            .then(|| y as usize * self.width as usize + x as usize)
    }

    #[inline]
    pub fn load(&self, index: usize) -> Cell {
        Cell::unpack(
            self.head[index].load(Ordering::Relaxed),
            self.motion[index].load(Ordering::Relaxed),
            self.link[index].load(Ordering::Relaxed),
        )
    }

    /// Write material and motion state; the positional link word is untouched.
    #[inline]
    pub fn store(&self, index: usize, cell: &Cell) {
        self.head[index].store(cell.pack_head(), Ordering::Relaxed);
        self.motion[index].store(cell.pack_motion(), Ordering::Relaxed);
    }

    #[inline]
    pub fn load_owner(&self, index: usize) -> u32 {
        self.link[index].load(Ordering::Relaxed) as u32
    }

    fn store_link(&self, index: usize, owner_id: u32, structure_id: u16) {
        let link = Cell {
            owner_id,
            structure_id,
            ..Cell::AIR
        };
        self.link[index].store(link.pack_link(), Ordering::Relaxed);
    }

    /// Convert world coordinates to chunk index + local offset
    #[inline]
    pub fn world_to_chunk(&self, x: i32, y: i32) -> (usize, usize, usize) {
        debug_assert!(self.in_bounds(x, y));
        let cx = x as usize / CHUNK_SIZE;
        let cy = y as usize / CHUNK_SIZE;
        (
            cy * self.chunks_x as usize + cx,
            x as usize % CHUNK_SIZE,
            y as usize % CHUNK_SIZE,
        )
    }

    pub fn chunk_index(&self, pos: IVec2) -> Option<usize> {
        (pos.x >= 0
            && pos.y >= 0
            && (pos.x as u32) < self.chunks_x
            && (pos.y as u32) < self.chunks_y)
            .then(|| pos.y as usize * self.chunks_x as usize + pos.x as usize)
    }

    pub fn chunk_pos(&self, chunk_index: usize) -> IVec2 {
        let cx = self.chunks_x as usize;
        IVec2::new((chunk_index % cx) as i32, (chunk_index / cx) as i32)
    }

    /// Whether a cell of `mover_id` could enter `(x, y)` moving downwards
    pub fn can_move_into(&self, x: i32, y: i32, materials: &Materials, mover_id: u16) -> bool {
        let Some(index) = self.index(x, y) else {
            return false; // World edges are solid
        };
        let target = self.load(index);
        can_displace(
            materials.get(mover_id),
            &target,
            materials.get(target.material_id),
            -1,
        )
    }

    /// Cell count per material id
    pub fn count_materials(&self, material_slots: usize) -> Vec<usize> {
        let mut counts = vec![0; material_slots.max(1)];
        for index in 0..self.len() {
            let id = self.head[index].load(Ordering::Relaxed) as u16 as usize;
            if id >= counts.len() {
                counts.resize(id + 1, 0);
            }
            counts[id] += 1;
        }
        counts
    }
}

/// The world grid: shared cells plus serially-owned chunk states
pub struct Grid {
    cells: CellStore,
    chunks: Vec<ChunkState>,
}

impl Grid {
    pub fn new(chunks_x: u32, chunks_y: u32) -> Self {
        let cells = CellStore::new(chunks_x, chunks_y);
        let chunks = (0..chunks_x as usize * chunks_y as usize)
            .map(|i| ChunkState::new(cells.chunk_pos(i)))
            .collect();
        Self { cells, chunks }
    }

    pub fn width(&self) -> u32 {
        self.cells.width
    }

    pub fn height(&self) -> u32 {
        self.cells.height
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        self.cells.in_bounds(x, y)
    }

    fn checked_index(&self, x: i32, y: i32) -> Result<usize, GridError> {
        self.cells.index(x, y).ok_or(GridError::OutOfBounds {
            x,
            y,
            width: self.cells.width,
            height: self.cells.height,
        })
    }

    /// Get cell at world coordinates
    pub fn get(&self, x: i32, y: i32) -> Result<Cell, GridError> {
        let index = self.checked_index(x, y)?;
        Ok(self.cells.load(index))
    }

    /// Get cell with coordinates clamped to the world edges (tooling reads)
    pub fn get_clamped(&self, x: i32, y: i32) -> Cell {
        let x = x.clamp(0, self.cells.width as i32 - 1);
        let y = y.clamp(0, self.cells.height as i32 - 1);
        self.cells.load(y as usize * self.cells.width as usize + x as usize)
    }

    /// Paint a material, resetting motion state and flags
    pub fn set(&mut self, x: i32, y: i32, material_id: u16) -> Result<(), GridError> {
        let index = self.checked_index(x, y)?;
        let old = self.cells.load(index);
        let cell = Cell {
            temperature: old.temperature,
            flags: if material_id == MaterialId::AIR {
                CellFlags::empty()
            } else {
                CellFlags::PLACED
            },
            ..Cell::new(material_id)
        };
        self.cells.store(index, &cell);
        self.mark_dirty_with_neighbors(x, y)?;

        if old.material_id != material_id {
            log::trace!(
                "[MODIFY] ({}, {}) set to {} (was {})",
                x,
                y,
                material_id,
                old.material_id
            );
        }
        Ok(())
    }

    /// Write a full cell (material, flags, velocity); ownership links are kept
    pub fn set_cell(&mut self, x: i32, y: i32, cell: Cell) -> Result<(), GridError> {
        let index = self.checked_index(x, y)?;
        let mut cell = cell;
        cell.clamp_velocity();
        self.cells.store(index, &cell);
        self.mark_dirty_with_neighbors(x, y)?;
        Ok(())
    }

    /// Expand the owning chunk's dirty rect
    pub fn mark_dirty(&mut self, x: i32, y: i32) -> Result<(), GridError> {
        self.checked_index(x, y)?;
        let (chunk, lx, ly) = self.cells.world_to_chunk(x, y);
        self.chunks[chunk].mark_dirty(lx, ly);
        Ok(())
    }

    /// Mark dirty, also waking adjacent chunks when `(x, y)` is on a chunk edge
    pub fn mark_dirty_with_neighbors(&mut self, x: i32, y: i32) -> Result<(), GridError> {
        self.checked_index(x, y)?;
        let Self { cells, chunks } = self;
        mark_with_neighbors(&mut ChunkSink(chunks), cells, x, y);
        Ok(())
    }

    /// Hand a cell to a rigid-body cluster. Owned cells are never simulated.
    pub fn set_owner(&mut self, x: i32, y: i32, owner_id: u32) -> Result<(), GridError> {
        let index = self.checked_index(x, y)?;
        let cell = self.cells.load(index);
        self.cells.store_link(index, owner_id, cell.structure_id);
        if owner_id == 0 {
            // Released cells may need to fall again
            self.mark_dirty_with_neighbors(x, y)?;
        }
        Ok(())
    }

    pub fn clear_owner(&mut self, x: i32, y: i32) -> Result<(), GridError> {
        self.set_owner(x, y, 0)
    }

    /// Tag a cell as part of a structure footprint
    pub fn set_structure(&mut self, x: i32, y: i32, structure_id: u16) -> Result<(), GridError> {
        let index = self.checked_index(x, y)?;
        let cell = self.cells.load(index);
        self.cells.store_link(index, cell.owner_id, structure_id);

        let (chunk, _, _) = self.cells.world_to_chunk(x, y);
        if structure_id != 0 {
            self.chunks[chunk].has_structure = true;
        } else {
            self.refresh_structure_flag(chunk);
        }
        Ok(())
    }

    fn refresh_structure_flag(&mut self, chunk: usize) {
        let origin = self.cells.chunk_pos(chunk) * CHUNK_SIZE as i32;
        let any = (0..CHUNK_SIZE as i32).any(|ly| {
            (0..CHUNK_SIZE as i32).any(|lx| {
                self.cells
                    .index(origin.x + lx, origin.y + ly)
                    .is_some_and(|i| self.cells.load(i).structure_id != 0)
            })
        });
        self.chunks[chunk].has_structure = any;
    }

    /// Push a free, movable cell by a sub-cell force (structure force providers)
    ///
    /// Returns `false` when the cell is air, static or owned by a cluster.
    pub fn apply_force(
        &mut self,
        x: i32,
        y: i32,
        fx: i16,
        fy: i16,
        materials: &Materials,
    ) -> Result<bool, GridError> {
        let index = self.checked_index(x, y)?;
        let mut cell = self.cells.load(index);
        if cell.is_owned() {
            log::warn!(
                "Force on ({}, {}) rejected: cell belongs to cluster {}",
                x,
                y,
                cell.owner_id
            );
            return Ok(false);
        }
        if cell.is_empty() || materials.get(cell.material_id).is_static() {
            return Ok(false);
        }
        cell.accelerate(fx, fy);
        self.cells.store(index, &cell);
        self.mark_dirty_with_neighbors(x, y)?;
        Ok(true)
    }

    pub fn can_move_into(&self, x: i32, y: i32, materials: &Materials, mover_id: u16) -> bool {
        self.cells.can_move_into(x, y, materials, mover_id)
    }

    pub fn count_materials(&self, materials: &Materials) -> Vec<usize> {
        self.cells.count_materials(materials.len())
    }

    pub fn cells(&self) -> &CellStore {
        &self.cells
    }

    pub fn chunk(&self, pos: IVec2) -> Option<&ChunkState> {
        self.cells.chunk_index(pos).map(|i| &self.chunks[i])
    }

    pub fn chunks(&self) -> &[ChunkState] {
        &self.chunks
    }

    /// Shared cells plus exclusive chunk states, for the frame driver
    pub(crate) fn split_mut(&mut self) -> (&CellStore, &mut [ChunkState]) {
        (&self.cells, &mut self.chunks)
    }
}

/// Applies dirty marks straight to chunk states (serial callers only)
pub(crate) struct ChunkSink<'a>(pub &'a mut [ChunkState]);

impl DirtySink for ChunkSink<'_> {
    fn mark(&mut self, chunk: usize, x: usize, y: usize) {
        self.0[chunk].mark_dirty(x, y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_access() {
        let mut grid = Grid::new(2, 2);

        grid.set(10, 20, MaterialId::SAND).unwrap();
        assert_eq!(grid.get(10, 20).unwrap().material_id, MaterialId::SAND);

        grid.set(0, 0, MaterialId::STONE).unwrap();
        grid.set(63, 63, MaterialId::WATER).unwrap();
        assert_eq!(grid.get(0, 0).unwrap().material_id, MaterialId::STONE);
        assert_eq!(grid.get(63, 63).unwrap().material_id, MaterialId::WATER);
    }

    #[test]
    fn test_out_of_bounds_is_an_error() {
        let mut grid = Grid::new(1, 1);
        assert_eq!(
            grid.get(-1, 0),
            Err(GridError::OutOfBounds {
                x: -1,
                y: 0,
                width: 32,
                height: 32
            })
        );
        assert!(grid.set(32, 0, MaterialId::SAND).is_err());
        assert_eq!(grid.get_clamped(100, -5).material_id, MaterialId::AIR);
    }

    #[test]
    fn test_dirty_marks_out_of_bounds_are_errors() {
        let mut grid = Grid::new(2, 1);
        assert!(matches!(
            grid.mark_dirty(64, 0),
            Err(GridError::OutOfBounds { x: 64, .. })
        ));
        assert!(matches!(
            grid.mark_dirty_with_neighbors(-1, 5),
            Err(GridError::OutOfBounds { x: -1, y: 5, .. })
        ));
        assert!(grid.chunks().iter().all(|chunk| !chunk.is_dirty()));

        grid.mark_dirty_with_neighbors(31, 5).unwrap();
        assert!(grid.chunk(IVec2::new(1, 0)).unwrap().is_dirty());
    }

    #[test]
    fn test_set_resets_velocity() {
        let mut grid = Grid::new(1, 1);
        let mut moving = Cell::new(MaterialId::SAND);
        moving.vel_y = -4;
        moving.frac_x = 12;
        grid.set_cell(5, 5, moving).unwrap();
        assert_eq!(grid.get(5, 5).unwrap().vel_y, -4);

        grid.set(5, 5, MaterialId::GRAVEL).unwrap();
        let cell = grid.get(5, 5).unwrap();
        assert_eq!(cell.material_id, MaterialId::GRAVEL);
        assert!(cell.is_at_rest());
        assert_eq!(cell.frac_x, 0);
        assert!(cell.flags.contains(CellFlags::PLACED));
    }

    #[test]
    fn test_set_marks_owning_chunk_dirty() {
        let mut grid = Grid::new(2, 2);
        grid.set(40, 10, MaterialId::SAND).unwrap();

        let chunk = grid.chunk(IVec2::new(1, 0)).unwrap();
        assert!(chunk.is_dirty());
        assert!(!grid.chunk(IVec2::new(0, 0)).unwrap().is_dirty());
        assert!(!grid.chunk(IVec2::new(1, 1)).unwrap().is_dirty());
    }

    #[test]
    fn test_edge_write_wakes_neighbor_chunks() {
        let mut grid = Grid::new(2, 2);
        // Top-left corner cell of chunk (1, 0) touches chunks (0,0), (0,1), (1,1)
        grid.set(32, 31, MaterialId::SAND).unwrap();

        for pos in [
            IVec2::new(0, 0),
            IVec2::new(1, 0),
            IVec2::new(0, 1),
            IVec2::new(1, 1),
        ] {
            assert!(grid.chunk(pos).unwrap().is_dirty(), "chunk {pos} not woken");
        }

        // Neighbour marks land on the boundary cells, not the whole chunk
        let left = grid.chunk(IVec2::new(0, 0)).unwrap().dirty_rect.unwrap();
        assert_eq!((left.min_x, left.max_x), (31, 31));
    }

    #[test]
    fn test_ownership_survives_material_writes() {
        let mut grid = Grid::new(1, 1);
        grid.set_owner(3, 3, 17).unwrap();
        grid.set(3, 3, MaterialId::STONE).unwrap();

        let cell = grid.get(3, 3).unwrap();
        assert_eq!(cell.owner_id, 17);
        assert_eq!(cell.material_id, MaterialId::STONE);

        grid.clear_owner(3, 3).unwrap();
        assert_eq!(grid.get(3, 3).unwrap().owner_id, 0);
    }

    #[test]
    fn test_structure_flag_follows_footprint() {
        let mut grid = Grid::new(2, 1);
        grid.set_structure(4, 4, 9).unwrap();
        assert!(grid.chunk(IVec2::ZERO).unwrap().has_structure);

        grid.set_structure(4, 4, 0).unwrap();
        assert!(!grid.chunk(IVec2::ZERO).unwrap().has_structure);
    }

    #[test]
    fn test_apply_force_skips_owned_and_static() {
        let materials = Materials::new();
        let mut grid = Grid::new(1, 1);
        grid.set(1, 1, MaterialId::STONE).unwrap();
        grid.set(2, 2, MaterialId::SAND).unwrap();
        grid.set(3, 3, MaterialId::SAND).unwrap();
        grid.set_owner(3, 3, 5).unwrap();

        assert!(!grid.apply_force(1, 1, 64, 0, &materials).unwrap());
        assert!(grid.apply_force(2, 2, 128, 0, &materials).unwrap());
        assert!(!grid.apply_force(3, 3, 128, 0, &materials).unwrap());

        assert_eq!(grid.get(2, 2).unwrap().vel_x, 2);
        assert_eq!(grid.get(3, 3).unwrap().vel_x, 0);
    }

    #[test]
    fn test_can_move_into() {
        let materials = Materials::new();
        let mut grid = Grid::new(1, 1);
        grid.set(0, 0, MaterialId::STONE).unwrap();
        grid.set(1, 0, MaterialId::WATER).unwrap();
        grid.set(2, 0, MaterialId::WATER).unwrap();
        grid.set_owner(2, 0, 1).unwrap();

        assert!(grid.can_move_into(5, 5, &materials, MaterialId::SAND)); // air
        assert!(!grid.can_move_into(0, 0, &materials, MaterialId::SAND)); // static
        assert!(grid.can_move_into(1, 0, &materials, MaterialId::SAND)); // lighter liquid
        assert!(!grid.can_move_into(1, 0, &materials, MaterialId::OIL)); // heavier liquid
        assert!(!grid.can_move_into(2, 0, &materials, MaterialId::SAND)); // owned
        assert!(!grid.can_move_into(-1, 0, &materials, MaterialId::SAND)); // edge
    }

    #[test]
    fn test_count_materials() {
        let materials = Materials::new();
        let mut grid = Grid::new(1, 1);
        grid.set(0, 0, MaterialId::SAND).unwrap();
        grid.set(1, 0, MaterialId::SAND).unwrap();
        grid.set(2, 0, MaterialId::WATER).unwrap();

        let counts = grid.count_materials(&materials);
        assert_eq!(counts[MaterialId::SAND as usize], 2);
        assert_eq!(counts[MaterialId::WATER as usize], 1);
        assert_eq!(counts[MaterialId::AIR as usize], 32 * 32 - 3);
    }
}
