//! Regular structured volume: a scalar field sampled on a regular 3D grid.
//!
//! The volume owns its voxel buffer and the macrocell accelerator built over
//! it. Committed volumes are immutable; rebuilding (recommit) constructs a
//! fresh `StructuredVolume` that the caller swaps in whole, so concurrent
//! readers always observe a fully built state.

use glam::{IVec3, Vec3};

use crate::accel::GridAccelerator;
use crate::api::error::KernelError;
use crate::math::{slab_clip, Box3, Range1, Ray};
use crate::volume::voxels::VoxelBuffer;

pub struct StructuredVolume {
    dims: IVec3,
    origin: Vec3,
    spacing: Vec3,
    voxels: VoxelBuffer,
    bbox: Box3,
    accel: GridAccelerator,
}

impl StructuredVolume {
    /// Build a volume from validated grid parameters. This is the commit
    /// point: the macrocell accelerator is constructed here.
    pub fn new(
        dims: IVec3,
        origin: Vec3,
        spacing: Vec3,
        voxels: VoxelBuffer,
    ) -> Result<Self, KernelError> {
        if dims.x < 2 || dims.y < 2 || dims.z < 2 {
            return Err(KernelError::InvalidParameter {
                name: "dimensions",
                reason: format!("each axis needs at least 2 voxels, got {dims}"),
            });
        }
        if !(spacing.x > 0.0 && spacing.y > 0.0 && spacing.z > 0.0) {
            return Err(KernelError::InvalidParameter {
                name: "gridSpacing",
                reason: format!("spacing must be positive on all axes, got {spacing}"),
            });
        }

        let expected = dims.x as usize * dims.y as usize * dims.z as usize;
        if voxels.len() != expected {
            return Err(KernelError::VoxelCountMismatch {
                expected,
                actual: voxels.len(),
            });
        }

        let bbox = Box3::new(origin, origin + (dims - IVec3::ONE).as_vec3() * spacing);
        let accel = GridAccelerator::build(dims, &voxels);

        log::debug!(
            "committed structured volume: dims={dims} bbox=[{:?}, {:?}] voxel_type={:?}",
            bbox.lower,
            bbox.upper,
            voxels.voxel_type()
        );

        Ok(Self {
            dims,
            origin,
            spacing,
            voxels,
            bbox,
            accel,
        })
    }

    #[inline]
    pub fn dims(&self) -> IVec3 {
        self.dims
    }

    #[inline]
    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    #[inline]
    pub fn spacing(&self) -> Vec3 {
        self.spacing
    }

    #[inline]
    pub fn bounding_box(&self) -> &Box3 {
        &self.bbox
    }

    #[inline]
    pub fn accelerator(&self) -> &GridAccelerator {
        &self.accel
    }

    /// Grid-local coordinates: voxel units, origin at voxel (0,0,0).
    #[inline]
    pub fn world_to_local(&self, p: Vec3) -> Vec3 {
        (p - self.origin) / self.spacing
    }

    /// Base voxel index of the interpolation cell plus fractional offsets.
    ///
    /// The base is clamped to `[0, dim-2]` so the eight stencil corners are
    /// always in bounds; on the far faces the fractional reaches 1.0.
    #[inline]
    pub fn local_to_index_base(&self, local: Vec3) -> (IVec3, Vec3) {
        let floored = local.floor();
        let base = IVec3::new(
            (floored.x as i32).clamp(0, self.dims.x - 2),
            (floored.y as i32).clamp(0, self.dims.y - 2),
            (floored.z as i32).clamp(0, self.dims.z - 2),
        );
        let frac = local - base.as_vec3();
        (base, frac)
    }

    /// Decoded voxel value at integer grid indices. Callers must stay in
    /// bounds; the interpolation path guarantees this via base clamping.
    #[inline]
    pub fn voxel(&self, i: i32, j: i32, k: i32) -> f32 {
        let index = (k as usize * self.dims.y as usize + j as usize) * self.dims.x as usize
            + i as usize;
        self.voxels.get(index)
    }

    /// Trilinear sample at a world-space position; 0 outside the bounding box.
    pub fn sample_one(&self, p: Vec3) -> f32 {
        if !self.bbox.contains(p) {
            return 0.0;
        }

        let (base, frac) = self.local_to_index_base(self.world_to_local(p));
        let (i, j, k) = (base.x, base.y, base.z);
        let (fx, fy, fz) = (frac.x, frac.y, frac.z);

        let c000 = self.voxel(i, j, k);
        let c100 = self.voxel(i + 1, j, k);
        let c010 = self.voxel(i, j + 1, k);
        let c110 = self.voxel(i + 1, j + 1, k);
        let c001 = self.voxel(i, j, k + 1);
        let c101 = self.voxel(i + 1, j, k + 1);
        let c011 = self.voxel(i, j + 1, k + 1);
        let c111 = self.voxel(i + 1, j + 1, k + 1);

        let c00 = c000 + fx * (c100 - c000);
        let c10 = c010 + fx * (c110 - c010);
        let c01 = c001 + fx * (c101 - c001);
        let c11 = c011 + fx * (c111 - c011);

        let c0 = c00 + fy * (c10 - c00);
        let c1 = c01 + fy * (c11 - c01);

        c0 + fz * (c1 - c0)
    }

    /// Batched point sampling; lane i is exactly `sample_one(points[i])`.
    pub fn sample_many(&self, points: &[Vec3], out: &mut [f32]) {
        debug_assert_eq!(points.len(), out.len());
        for (p, o) in points.iter().zip(out.iter_mut()) {
            *o = self.sample_one(*p);
        }
    }

    /// Slab test against the volume bounding box, clipped to the ray's own
    /// t range. `None` when the ray misses, is behind the t range, or only
    /// grazes (enter == exit).
    pub fn intersect_bbox(&self, ray: &Ray) -> Option<Range1> {
        let (enter, exit) = slab_clip(
            &self.bbox,
            ray.org,
            ray.dir,
            ray.t_range.lower,
            ray.t_range.upper,
        );
        (enter < exit).then(|| Range1::new(enter, exit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Field f(x,y,z) = x + 2y + 4z in voxel units; trilinear interpolation
    /// reproduces a linear field exactly.
    fn linear_volume(n: i32) -> StructuredVolume {
        let mut voxels = Vec::with_capacity((n * n * n) as usize);
        for k in 0..n {
            for j in 0..n {
                for i in 0..n {
                    voxels.push(i as f32 + 2.0 * j as f32 + 4.0 * k as f32);
                }
            }
        }
        StructuredVolume::new(
            IVec3::splat(n),
            Vec3::ZERO,
            Vec3::ONE,
            VoxelBuffer::F32(voxels),
        )
        .unwrap()
    }

    #[test]
    fn test_commit_validation() {
        let err = StructuredVolume::new(
            IVec3::new(1, 4, 4),
            Vec3::ZERO,
            Vec3::ONE,
            VoxelBuffer::F32(vec![0.0; 16]),
        );
        assert!(err.is_err());

        let err = StructuredVolume::new(
            IVec3::splat(4),
            Vec3::ZERO,
            Vec3::new(1.0, 0.0, 1.0),
            VoxelBuffer::F32(vec![0.0; 64]),
        );
        assert!(err.is_err());

        let err = StructuredVolume::new(
            IVec3::splat(4),
            Vec3::ZERO,
            Vec3::ONE,
            VoxelBuffer::F32(vec![0.0; 63]),
        );
        assert!(matches!(
            err,
            Err(KernelError::VoxelCountMismatch {
                expected: 64,
                actual: 63
            })
        ));
    }

    #[test]
    fn test_sample_reproduces_linear_field() {
        let v = linear_volume(8);

        for &(x, y, z) in &[
            (0.0, 0.0, 0.0),
            (0.5, 0.5, 0.5),
            (3.25, 1.75, 6.5),
            (7.0, 7.0, 7.0),
        ] {
            let expected = x + 2.0 * y + 4.0 * z;
            let got = v.sample_one(Vec3::new(x, y, z));
            assert!(
                (got - expected).abs() < 1e-4,
                "sample at ({x},{y},{z}): got {got}, expected {expected}"
            );
        }
    }

    #[test]
    fn test_sample_outside_bbox_is_zero() {
        let v = linear_volume(8);
        assert_eq!(v.sample_one(Vec3::new(-0.01, 3.0, 3.0)), 0.0);
        assert_eq!(v.sample_one(Vec3::new(3.0, 7.01, 3.0)), 0.0);
        assert_eq!(v.sample_one(Vec3::splat(100.0)), 0.0);
    }

    #[test]
    fn test_sample_on_far_face_uses_clamped_base() {
        let v = linear_volume(8);
        // exactly on the upper corner: base clamps to 6, fractional is 1.0
        let got = v.sample_one(Vec3::splat(7.0));
        assert!((got - (7.0 + 14.0 + 28.0)).abs() < 1e-4);
    }

    #[test]
    fn test_sample_many_matches_sample_one() {
        let v = linear_volume(8);
        let points: Vec<Vec3> = (0..32)
            .map(|i| Vec3::splat(0.2) * i as f32)
            .collect();
        let mut out = vec![0.0; points.len()];
        v.sample_many(&points, &mut out);
        for (p, o) in points.iter().zip(out.iter()) {
            assert_eq!(*o, v.sample_one(*p));
        }
    }

    #[test]
    fn test_intersect_bbox_clips_and_misses() {
        let v = linear_volume(8);

        let hit = v
            .intersect_bbox(&Ray::new(
                Vec3::new(3.5, 3.5, -1.0),
                Vec3::new(0.0, 0.0, 1.0),
                Range1::new(0.0, f32::INFINITY),
            ))
            .unwrap();
        assert_eq!(hit, Range1::new(1.0, 8.0));

        assert!(v
            .intersect_bbox(&Ray::new(
                Vec3::new(-10.0, -10.0, -10.0),
                Vec3::new(-1.0, 0.0, 0.0),
                Range1::new(0.0, f32::INFINITY),
            ))
            .is_none());
    }
}
