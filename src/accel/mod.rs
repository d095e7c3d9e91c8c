//! Macrocell value-range acceleration grid.
//!
//! The volume is partitioned into cells of `MACROCELL_SIDE` voxels per axis;
//! each cell caches the min/max over its trilinear interpolation stencil
//! (the cell's voxels plus one past the upper face) extended by one more
//! voxel on each side. The extension covers samples taken exactly at the
//! boundary t values emitted by the interval iterator: a boundary belongs
//! to both adjacent cells numerically, and the recomputed sample base can
//! round one voxel past either face, reading `16·c - 1` below the cell or
//! `16·c + 17` above it. With both covered, the cached range bounds every
//! sample value a ray can encounter anywhere in the closed interval,
//! endpoints included.
//!
//! Cell ranges are independent of one another, so the build is a flat
//! parallel map over cell indices.

use std::sync::OnceLock;
use std::time::Instant;

use glam::IVec3;
use rayon::prelude::*;

use crate::math::Range1;
use crate::volume::voxels::VoxelBuffer;

/// Macrocell edge length in voxels. Compile-time constant shared by the
/// builder and the traversal stepping code.
pub const MACROCELL_SIDE: i32 = 16;

/// Environment variable naming a thread-count hint for accelerator builds.
pub const BUILD_THREADS_ENV: &str = "VOLUME_KERNEL_BUILD_THREADS";

pub struct GridAccelerator {
    cells_per_dim: IVec3,
    ranges: Vec<Range1>,
}

impl GridAccelerator {
    /// Compute per-cell value ranges for a voxel grid of `dims` voxels.
    /// Deterministic for given voxel data; does not mutate its inputs.
    pub fn build(dims: IVec3, voxels: &VoxelBuffer) -> Self {
        let start = Instant::now();

        let cells_per_dim = IVec3::new(
            cells_on_axis(dims.x),
            cells_on_axis(dims.y),
            cells_on_axis(dims.z),
        );
        let cell_count =
            cells_per_dim.x as usize * cells_per_dim.y as usize * cells_per_dim.z as usize;

        let compute = || {
            (0..cell_count)
                .into_par_iter()
                .map(|index| {
                    let ci = index as i32 % cells_per_dim.x;
                    let cj = (index as i32 / cells_per_dim.x) % cells_per_dim.y;
                    let ck = index as i32 / (cells_per_dim.x * cells_per_dim.y);
                    cell_range(dims, voxels, ci, cj, ck)
                })
                .collect::<Vec<Range1>>()
        };

        let ranges = match build_pool() {
            Some(pool) => pool.install(compute),
            None => compute(),
        };

        log::debug!(
            "built macrocell grid: {cells_per_dim} cells in {:.2?}",
            start.elapsed()
        );

        Self {
            cells_per_dim,
            ranges,
        }
    }

    #[inline]
    pub fn cells_per_dim(&self) -> IVec3 {
        self.cells_per_dim
    }

    #[inline]
    pub fn contains_cell(&self, cell: IVec3) -> bool {
        cell.x >= 0
            && cell.y >= 0
            && cell.z >= 0
            && cell.x < self.cells_per_dim.x
            && cell.y < self.cells_per_dim.y
            && cell.z < self.cells_per_dim.z
    }

    /// Cached value range of one macrocell. O(1).
    #[inline]
    pub fn range_of(&self, ci: i32, cj: i32, ck: i32) -> Range1 {
        let index = (ck as usize * self.cells_per_dim.y as usize + cj as usize)
            * self.cells_per_dim.x as usize
            + ci as usize;
        self.ranges[index]
    }

    /// Union of all cell ranges: the value range of the whole volume.
    pub fn value_range(&self) -> Range1 {
        let mut total = Range1::EMPTY;
        for r in &self.ranges {
            total.extend(r.lower);
            total.extend(r.upper);
        }
        total
    }
}

/// Cell count on one axis: the lattice spans the `dim - 1` interpolation
/// cells, rounded up to whole macrocells.
#[inline]
fn cells_on_axis(dim: i32) -> i32 {
    (dim - 1 + MACROCELL_SIDE - 1) / MACROCELL_SIDE
}

/// Exact min/max over the cell's interpolation stencil extended by one
/// voxel on each side, clamped to the grid.
fn cell_range(dims: IVec3, voxels: &VoxelBuffer, ci: i32, cj: i32, ck: i32) -> Range1 {
    let i0 = (ci * MACROCELL_SIDE - 1).max(0);
    let j0 = (cj * MACROCELL_SIDE - 1).max(0);
    let k0 = (ck * MACROCELL_SIDE - 1).max(0);

    let i1 = (ci * MACROCELL_SIDE + MACROCELL_SIDE + 1).min(dims.x - 1);
    let j1 = (cj * MACROCELL_SIDE + MACROCELL_SIDE + 1).min(dims.y - 1);
    let k1 = (ck * MACROCELL_SIDE + MACROCELL_SIDE + 1).min(dims.z - 1);

    let row = dims.x as usize;
    let slice = dims.x as usize * dims.y as usize;

    let mut range = Range1::EMPTY;
    for k in k0..=k1 {
        for j in j0..=j1 {
            let base = k as usize * slice + j as usize * row;
            for i in i0..=i1 {
                range.extend(voxels.get(base + i as usize));
            }
        }
    }
    range
}

/// Scoped thread pool honoring the build thread-count hint; `None` uses the
/// global rayon pool.
fn build_pool() -> Option<&'static rayon::ThreadPool> {
    static POOL: OnceLock<Option<rayon::ThreadPool>> = OnceLock::new();
    POOL.get_or_init(|| {
        let threads: usize = std::env::var(BUILD_THREADS_ENV).ok()?.parse().ok()?;
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .ok()
    })
    .as_ref()
}
