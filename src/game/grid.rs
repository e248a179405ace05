//! Spatial Broad-Phase Grid
//!
//! Uniform bucket grid over the square world. An actor is filed under the
//! cell containing its centre; a query with reach `r` around `(x, y)`
//! looks only at the 2×2 block of cells whose lower-left corner holds
//! `(x - r, y - r)`. That block covers the whole query square as long as
//! a cell is at least `2 * r` wide, which `GameConfig::validate` enforces.
//!
//! ```text
//!   ┌─────┬─────┐
//!   │     │  ·  │   · query square [x-r, x+r]²
//!   ├─────┼──·──┤     never spans more than two cells per axis
//!   │  ·──┼──·  │
//!   └─────┴─────┘
//! ```
//!
//! Each entry also carries a "resolved" flag. Pair passes mark an actor
//! resolved once handled so later queries skip it and every pair is
//! visited once.

use crate::core::fixed::Fixed;

/// Bucket grid over list indices.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    shift: u32,
    dim: i32,
    cells: Vec<Vec<u32>>,
    resolved: Vec<bool>,
}

impl SpatialGrid {
    /// Create an empty grid of `dim × dim` cells of `1 << shift` raw units.
    pub fn new(shift: u32, dim: i32) -> Self {
        let dim = dim.max(1);
        Self {
            shift,
            dim,
            cells: vec![Vec::new(); (dim * dim) as usize],
            resolved: Vec::new(),
        }
    }

    /// Empty every bucket, keeping allocations.
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
        self.resolved.clear();
    }

    #[inline]
    fn cell_coord(&self, v: Fixed) -> i32 {
        (v >> self.shift).clamp(0, self.dim - 1)
    }

    /// File list index `index` at `(x, y)`.
    pub fn add(&mut self, index: usize, x: Fixed, y: Fixed) {
        let cx = self.cell_coord(x);
        let cy = self.cell_coord(y);
        self.cells[(cy * self.dim + cx) as usize].push(index as u32);
        if self.resolved.len() <= index {
            self.resolved.resize(index + 1, false);
        }
    }

    /// Mark an index as handled for the current pass.
    pub fn mark_resolved(&mut self, index: usize) {
        if let Some(flag) = self.resolved.get_mut(index) {
            *flag = true;
        }
    }

    /// Whether an index has been marked resolved.
    pub fn is_resolved(&self, index: usize) -> bool {
        self.resolved.get(index).copied().unwrap_or(false)
    }

    /// Visit every candidate within the 2×2 block around `(x, y)`.
    ///
    /// Candidates are a superset of the actors within `reach`; the caller
    /// does the exact test. With `skip_resolved`, indices marked resolved
    /// are not visited.
    pub fn query<F>(&self, x: Fixed, y: Fixed, reach: Fixed, skip_resolved: bool, mut visit: F)
    where
        F: FnMut(usize),
    {
        let cx0 = self.cell_coord(x.saturating_sub(reach));
        let cy0 = self.cell_coord(y.saturating_sub(reach));
        let cx1 = (cx0 + 1).min(self.dim - 1);
        let cy1 = (cy0 + 1).min(self.dim - 1);

        for cy in cy0..=cy1 {
            for cx in cx0..=cx1 {
                for &index in &self.cells[(cy * self.dim + cx) as usize] {
                    let index = index as usize;
                    if skip_resolved && self.resolved[index] {
                        continue;
                    }
                    visit(index);
                }
            }
        }
    }

    /// Number of filed entries.
    pub fn len(&self) -> usize {
        self.cells.iter().map(Vec::len).sum()
    }

    /// True when nothing is filed.
    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Vec::is_empty)
    }
}
