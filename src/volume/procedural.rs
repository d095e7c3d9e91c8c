//! Procedural voxel field generators.
//!
//! Procedural kinds fill a full voxel buffer at commit time and behave as
//! ordinary structured volumes afterwards, so every query path (point
//! sampling, bbox intersection, interval traversal) is shared.

use glam::{IVec3, Vec3};
use noise::{NoiseFn, Perlin};
use rayon::prelude::*;

use crate::api::error::KernelError;
use crate::volume::structured::StructuredVolume;
use crate::volume::voxels::VoxelBuffer;

// wavelet parameters
const M: f32 = 1.0;
const G: f32 = 1.0;
const XM: f32 = 1.0;
const YM: f32 = 1.0;
const ZM: f32 = 1.0;
const XF: f32 = 3.0;
const YF: f32 = 3.0;
const ZF: f32 = 3.0;

/// Analytic wavelet field evaluated at a world-space position.
#[inline]
pub fn wavelet_value(p: Vec3) -> f32 {
    M * G * (XM * (XF * p.x).sin() + YM * (YF * p.y).sin() + ZM * (ZF * p.z).cos())
}

/// Spatial frequency of the Perlin field relative to world units.
const NOISE_FREQUENCY: f64 = 6.0;

/// Structured volume whose voxels are the wavelet field sampled at grid
/// positions.
pub fn wavelet_volume(
    dims: IVec3,
    origin: Vec3,
    spacing: Vec3,
) -> Result<StructuredVolume, KernelError> {
    let voxels = generate(dims, origin, spacing, wavelet_value)?;
    StructuredVolume::new(dims, origin, spacing, voxels)
}

/// Structured volume filled from seeded Perlin noise.
pub fn noise_volume(
    dims: IVec3,
    origin: Vec3,
    spacing: Vec3,
    seed: u32,
) -> Result<StructuredVolume, KernelError> {
    let perlin = Perlin::new(seed);
    let voxels = generate(dims, origin, spacing, move |p| {
        perlin.get([
            p.x as f64 * NOISE_FREQUENCY,
            p.y as f64 * NOISE_FREQUENCY,
            p.z as f64 * NOISE_FREQUENCY,
        ]) as f32
    })?;
    StructuredVolume::new(dims, origin, spacing, voxels)
}

/// Evaluate `field` at every grid position, parallelized over z slices.
fn generate<F>(
    dims: IVec3,
    origin: Vec3,
    spacing: Vec3,
    field: F,
) -> Result<VoxelBuffer, KernelError>
where
    F: Fn(Vec3) -> f32 + Sync,
{
    if dims.x < 2 || dims.y < 2 || dims.z < 2 {
        return Err(KernelError::InvalidParameter {
            name: "dimensions",
            reason: format!("each axis needs at least 2 voxels, got {dims}"),
        });
    }

    let (ux, uy, uz) = (dims.x as usize, dims.y as usize, dims.z as usize);
    let mut voxels = vec![0.0f32; ux * uy * uz];

    voxels
        .par_chunks_mut(ux * uy)
        .enumerate()
        .for_each(|(k, slice)| {
            let z = origin.z + k as f32 * spacing.z;
            for j in 0..uy {
                let y = origin.y + j as f32 * spacing.y;
                for i in 0..ux {
                    let x = origin.x + i as f32 * spacing.x;
                    slice[j * ux + i] = field(Vec3::new(x, y, z));
                }
            }
        });

    Ok(VoxelBuffer::F32(voxels))
}
