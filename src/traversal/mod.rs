//! Lane-coherent interval iteration over the macrocell grid.
//!
//! A lane group of width W traverses W rays in lockstep. Each lane runs an
//! independent 3D-DDA over the macrocell lattice and yields, per `iterate`
//! call, one parametric sub-interval bounded to a single macrocell together
//! with that cell's cached value range. Emitted intervals chain without gaps
//! from the clipped box entry to the clipped box exit; a value selector may
//! cull cells, which skips the culled span without emitting it.
//!
//! Iterator state is a plain value with no heap allocation, so callers can
//! keep it in fixed-size stack or arena storage. The state references the
//! volume and selector without owning them; both must outlive the
//! iteration.

pub(crate) mod simd;

use crate::accel::{GridAccelerator, MACROCELL_SIDE};
use crate::math::{Range1, Ray};
use crate::selector::ValueSelector;
use crate::volume::structured::StructuredVolume;

/// Supported lane-group widths.
pub const LANE_WIDTHS: [usize; 4] = [1, 4, 8, 16];

/// One traversal interval: a parametric sub-range of the ray bounded to a
/// single macrocell, the cell's conservative value range, and a suggested
/// sampling step of about one sample per voxel crossed.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Interval {
    pub t_range: Range1,
    pub value_range: Range1,
    pub nominal_dt: f32,
}

/// Opaque iterator storage footprint per width, in bytes. Width 1 shares
/// the widest footprint so scalar callers can reuse wide storage.
pub const ITERATOR_STATE_SIZE_1: usize = 2048;
pub const ITERATOR_STATE_SIZE_4: usize = 512;
pub const ITERATOR_STATE_SIZE_8: usize = 1024;
pub const ITERATOR_STATE_SIZE_16: usize = 2048;

/// Required iterator storage alignment per width, in bytes.
pub const ITERATOR_STATE_ALIGN_1: usize = 64;
pub const ITERATOR_STATE_ALIGN_4: usize = 16;
pub const ITERATOR_STATE_ALIGN_8: usize = 32;
pub const ITERATOR_STATE_ALIGN_16: usize = 64;

/// Structure-of-arrays ray batch for a lane group of width W.
///
/// Layout matches the C-callable surface: three W-wide origin rows, three
/// W-wide direction rows, then the two t-range rows.
#[derive(Clone, Debug)]
#[repr(C)]
pub struct RaySoa<const W: usize> {
    pub org_x: [f32; W],
    pub org_y: [f32; W],
    pub org_z: [f32; W],
    pub dir_x: [f32; W],
    pub dir_y: [f32; W],
    pub dir_z: [f32; W],
    pub t_lower: [f32; W],
    pub t_upper: [f32; W],
}

impl<const W: usize> RaySoa<W> {
    pub fn zeroed() -> Self {
        Self {
            org_x: [0.0; W],
            org_y: [0.0; W],
            org_z: [0.0; W],
            dir_x: [0.0; W],
            dir_y: [0.0; W],
            dir_z: [0.0; W],
            t_lower: [0.0; W],
            t_upper: [0.0; W],
        }
    }

    /// Pack rays into lanes 0..rays.len(); remaining lanes stay degenerate.
    pub fn from_rays(rays: &[Ray]) -> Self {
        debug_assert!(rays.len() <= W);
        let mut soa = Self::zeroed();
        for (i, ray) in rays.iter().enumerate() {
            soa.set_lane(i, ray);
        }
        soa
    }

    #[inline]
    pub fn set_lane(&mut self, lane: usize, ray: &Ray) {
        self.org_x[lane] = ray.org.x;
        self.org_y[lane] = ray.org.y;
        self.org_z[lane] = ray.org.z;
        self.dir_x[lane] = ray.dir.x;
        self.dir_y[lane] = ray.dir.y;
        self.dir_z[lane] = ray.dir.z;
        self.t_lower[lane] = ray.t_range.lower;
        self.t_upper[lane] = ray.t_range.upper;
    }

    #[inline]
    pub fn lane(&self, lane: usize) -> Ray {
        Ray::new(
            glam::Vec3::new(self.org_x[lane], self.org_y[lane], self.org_z[lane]),
            glam::Vec3::new(self.dir_x[lane], self.dir_y[lane], self.dir_z[lane]),
            Range1::new(self.t_lower[lane], self.t_upper[lane]),
        )
    }
}

/// Structure-of-arrays interval output for a lane group of width W.
///
/// Lanes whose result flag is 0 are left untouched by `iterate`.
#[derive(Clone, Debug)]
#[repr(C)]
pub struct IntervalSoa<const W: usize> {
    pub t_lower: [f32; W],
    pub t_upper: [f32; W],
    pub value_lower: [f32; W],
    pub value_upper: [f32; W],
    pub nominal_dt: [f32; W],
}

impl<const W: usize> IntervalSoa<W> {
    pub fn zeroed() -> Self {
        Self {
            t_lower: [0.0; W],
            t_upper: [0.0; W],
            value_lower: [0.0; W],
            value_upper: [0.0; W],
            nominal_dt: [0.0; W],
        }
    }

    #[inline]
    pub fn lane(&self, lane: usize) -> Interval {
        Interval {
            t_range: Range1::new(self.t_lower[lane], self.t_upper[lane]),
            value_range: Range1::new(self.value_lower[lane], self.value_upper[lane]),
            nominal_dt: self.nominal_dt[lane],
        }
    }
}

/// Per-lane DDA state. A lane is either stepping (`active == 1`) or
/// exhausted (`active == 0`); exhausted lanes never emit again.
#[derive(Copy, Clone, Debug)]
#[repr(C)]
struct LaneState {
    t_delta: [f32; 3],
    t_next: [f32; 3],
    step: [i32; 3],
    cell: [i32; 3],
    t_cur: f32,
    t_limit: f32,
    nominal_dt: f32,
    active: u32,
}

impl LaneState {
    const INACTIVE: Self = Self {
        t_delta: [f32::INFINITY; 3],
        t_next: [f32::INFINITY; 3],
        step: [0; 3],
        cell: [0; 3],
        t_cur: 0.0,
        t_limit: 0.0,
        nominal_dt: 0.0,
        active: 0,
    };

    /// Set up the DDA for a ray known to hit the box on `[t_enter, t_exit)`.
    fn activate(volume: &StructuredVolume, ray: &Ray, t_enter: f32, t_exit: f32) -> Self {
        let cpd = volume.accelerator().cells_per_dim();
        let origin = volume.origin();
        let spacing = volume.spacing();

        // entry position in voxel units
        let entry_local = volume.world_to_local(ray.org + t_enter * ray.dir);

        let mut lane = Self {
            t_cur: t_enter,
            t_limit: t_exit,
            nominal_dt: spacing.min_element() / ray.dir.abs().max_element(),
            active: 1,
            ..Self::INACTIVE
        };

        for axis in 0..3 {
            let d = ray.dir[axis];
            let cell_f = entry_local[axis] / MACROCELL_SIDE as f32;
            let mut c = cell_f.floor() as i32;
            // an entry exactly on a cell boundary belongs to the cell in the
            // direction of travel
            if d < 0.0 && c as f32 == cell_f {
                c -= 1;
            }
            let c = c.clamp(0, cpd[axis] - 1);
            lane.cell[axis] = c;

            if d != 0.0 {
                let inv = 1.0 / d;
                lane.step[axis] = if d > 0.0 { 1 } else { -1 };
                lane.t_delta[axis] = (MACROCELL_SIDE as f32 * spacing[axis] * inv).abs();

                let boundary_cell = if d > 0.0 { c + 1 } else { c };
                let boundary_voxel = (boundary_cell * MACROCELL_SIDE) as f32;
                let plane = origin[axis] + boundary_voxel * spacing[axis];
                lane.t_next[axis] = (plane - ray.org[axis]) * inv;
            }
        }

        lane
    }
}

/// Advance one lane until it emits an interval or exhausts.
fn step_lane(
    accel: &GridAccelerator,
    selector: Option<&ValueSelector>,
    lane: &mut LaneState,
) -> Option<Interval> {
    loop {
        if lane.active == 0 {
            return None;
        }
        if lane.t_cur >= lane.t_limit {
            lane.active = 0;
            return None;
        }

        // next boundary crossing and the axis it happens on
        let mut axis = 0;
        if lane.t_next[1] < lane.t_next[axis] {
            axis = 1;
        }
        if lane.t_next[2] < lane.t_next[axis] {
            axis = 2;
        }
        let cell_exit = lane.t_next[axis];

        let next_cell = lane.cell[axis] + lane.step[axis];
        let leaving = next_cell < 0 || next_cell >= accel.cells_per_dim()[axis];

        // the final cell is clipped to the traversal exit so the last
        // interval ends exactly at min(ray t1, box exit)
        let last = leaving || cell_exit >= lane.t_limit;
        let t_hi = if last { lane.t_limit } else { cell_exit };

        let value_range = accel.range_of(lane.cell[0], lane.cell[1], lane.cell[2]);
        let pass = selector.map_or(true, |s| s.intersects(value_range));

        let t_lo = lane.t_cur;
        lane.t_cur = t_hi.max(lane.t_cur);
        if last {
            lane.active = 0;
        } else {
            lane.t_next[axis] += lane.t_delta[axis];
            lane.cell[axis] = next_cell;
        }

        if pass && t_hi > t_lo {
            return Some(Interval {
                t_range: Range1::new(t_lo, t_hi),
                value_range,
                nominal_dt: lane.nominal_dt,
            });
        }
        // culled by the selector or a zero-width sliver: keep walking
    }
}

/// Interval iterator for a lane group of width W.
///
/// A plain value type sized for the per-width opaque storage contracts; it
/// borrows the volume and selector for the duration of the iteration.
pub struct IntervalIterator<'a, const W: usize> {
    volume: &'a StructuredVolume,
    selector: Option<&'a ValueSelector>,
    lanes: [LaneState; W],
}

impl<'a, const W: usize> IntervalIterator<'a, W> {
    /// Initialize all lanes. Lanes that are masked off, degenerate, or miss
    /// the bounding box start exhausted; they report 0 on every `iterate`.
    pub fn new(
        volume: &'a StructuredVolume,
        rays: &RaySoa<W>,
        valid: &[bool; W],
        selector: Option<&'a ValueSelector>,
    ) -> Self {
        let mut t_enter = [0.0f32; W];
        let mut t_exit = [0.0f32; W];
        simd::intersect_bbox_batch(volume.bounding_box(), rays, &mut t_enter, &mut t_exit);

        let mut lanes = [LaneState::INACTIVE; W];
        for i in 0..W {
            if !valid[i] {
                continue;
            }
            let ray = rays.lane(i);
            if ray.is_degenerate() {
                continue;
            }
            // a graze (enter == exit) yields no intervals
            if !(t_enter[i] < t_exit[i]) {
                continue;
            }
            lanes[i] = LaneState::activate(volume, &ray, t_enter[i], t_exit[i]);
        }

        Self {
            volume,
            selector,
            lanes,
        }
    }

    /// Advance all valid lanes together. `result[i]` is 1 iff lane i emitted
    /// an interval into `interval` on this call; exhausted lanes report 0.
    pub fn iterate(
        &mut self,
        valid: &[bool; W],
        interval: &mut IntervalSoa<W>,
        result: &mut [i32; W],
    ) {
        let accel = self.volume.accelerator();
        for i in 0..W {
            result[i] = 0;
            if !valid[i] {
                continue;
            }
            if let Some(out) = step_lane(accel, self.selector, &mut self.lanes[i]) {
                interval.t_lower[i] = out.t_range.lower;
                interval.t_upper[i] = out.t_range.upper;
                interval.value_lower[i] = out.value_range.lower;
                interval.value_upper[i] = out.value_range.upper;
                interval.nominal_dt[i] = out.nominal_dt;
                result[i] = 1;
            }
        }
    }
}

impl<'a> IntervalIterator<'a, 1> {
    /// Scalar convenience constructor.
    pub fn single(
        volume: &'a StructuredVolume,
        ray: &Ray,
        selector: Option<&'a ValueSelector>,
    ) -> Self {
        Self::new(volume, &RaySoa::from_rays(std::slice::from_ref(ray)), &[true], selector)
    }

    /// Step the single lane, returning the next interval if any.
    pub fn next_interval(&mut self) -> Option<Interval> {
        step_lane(self.volume.accelerator(), self.selector, &mut self.lanes[0])
    }
}
