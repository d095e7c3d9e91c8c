//! Point-sampling conformance: trilinear exactness on linear fields, bbox
//! clamping, voxel-type decode paths, and batched/single equivalence.

use glam::{IVec3, Vec3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use volume_kernel::*;

/// f(x,y,z) = 1 + 2x + 3y + 5z on an 8^3 grid with unit spacing.
fn linear_volume() -> StructuredVolume {
    let n = 8;
    let mut voxels = Vec::with_capacity(n * n * n);
    for k in 0..n {
        for j in 0..n {
            for i in 0..n {
                voxels.push(1.0 + 2.0 * i as f32 + 3.0 * j as f32 + 5.0 * k as f32);
            }
        }
    }
    StructuredVolume::new(
        IVec3::splat(n as i32),
        Vec3::ZERO,
        Vec3::ONE,
        VoxelBuffer::F32(voxels),
    )
    .unwrap()
}

#[test]
fn test_trilinear_reproduces_linear_field() {
    let v = linear_volume();
    let mut rng = ChaCha8Rng::seed_from_u64(1);

    for _ in 0..64 {
        let p = Vec3::new(
            rng.gen_range(0.0..7.0),
            rng.gen_range(0.0..7.0),
            rng.gen_range(0.0..7.0),
        );
        let expected = 1.0 + 2.0 * p.x + 3.0 * p.y + 5.0 * p.z;
        let got = v.sample_one(p);
        assert!(
            (got - expected).abs() <= 1e-3,
            "sample at {p}: got {got}, expected {expected}"
        );
    }
}

#[test]
fn test_sample_at_voxel_positions_is_exact() {
    let v = linear_volume();
    for k in 0..8 {
        for i in 0..8 {
            let p = Vec3::new(i as f32, 3.0, k as f32);
            assert_eq!(v.sample_one(p), 1.0 + 2.0 * i as f32 + 9.0 + 5.0 * k as f32);
        }
    }
}

#[test]
fn test_outside_bbox_samples_zero() {
    let v = linear_volume();
    for p in [
        Vec3::new(-0.001, 3.0, 3.0),
        Vec3::new(3.0, 7.001, 3.0),
        Vec3::new(3.0, 3.0, -5.0),
        Vec3::splat(1000.0),
    ] {
        assert_eq!(v.sample_one(p), 0.0);
    }
}

#[test]
fn test_sample_many_equals_sample_one() {
    let v = procedural::wavelet_volume(IVec3::splat(32), Vec3::ZERO, Vec3::splat(1.0 / 31.0))
        .unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(5);

    // mix of inside and outside positions
    let points: Vec<Vec3> = (0..256)
        .map(|_| {
            Vec3::new(
                rng.gen_range(-0.5..1.5),
                rng.gen_range(-0.5..1.5),
                rng.gen_range(-0.5..1.5),
            )
        })
        .collect();

    let mut batched = vec![0.0f32; points.len()];
    v.sample_many(&points, &mut batched);

    for (p, got) in points.iter().zip(batched.iter()) {
        assert_eq!(got.to_bits(), v.sample_one(*p).to_bits());
    }
}

#[test]
fn test_integer_voxel_types_decode_without_normalization() {
    let dims = IVec3::new(2, 2, 2);
    let base: Vec<u32> = (0..8).map(|i| i * 100).collect();

    let v_u16 = StructuredVolume::new(
        dims,
        Vec3::ZERO,
        Vec3::ONE,
        VoxelBuffer::U16(base.iter().map(|&x| x as u16).collect()),
    )
    .unwrap();
    let v_f32 = StructuredVolume::new(
        dims,
        Vec3::ZERO,
        Vec3::ONE,
        VoxelBuffer::F32(base.iter().map(|&x| x as f32).collect()),
    )
    .unwrap();
    let v_f64 = StructuredVolume::new(
        dims,
        Vec3::ZERO,
        Vec3::ONE,
        VoxelBuffer::F64(base.iter().map(|&x| x as f64).collect()),
    )
    .unwrap();

    let p = Vec3::new(0.5, 0.25, 0.75);
    let expected = v_f32.sample_one(p);
    assert_eq!(v_u16.sample_one(p), expected);
    assert_eq!(v_f64.sample_one(p), expected);

    let v_u8 = StructuredVolume::new(
        dims,
        Vec3::ZERO,
        Vec3::ONE,
        VoxelBuffer::U8(vec![0, 10, 20, 30, 40, 50, 60, 70]),
    )
    .unwrap();
    assert_eq!(v_u8.sample_one(Vec3::ZERO), 0.0);
    assert_eq!(v_u8.sample_one(Vec3::new(1.0, 0.0, 0.0)), 10.0);
    assert_eq!(v_u8.sample_one(Vec3::new(0.0, 0.0, 1.0)), 40.0);
}

#[test]
fn test_world_local_round_trip() {
    let v = StructuredVolume::new(
        IVec3::new(4, 8, 16),
        Vec3::new(-1.0, 2.0, 0.5),
        Vec3::new(0.5, 0.25, 2.0),
        VoxelBuffer::F32(vec![0.0; 4 * 8 * 16]),
    )
    .unwrap();

    let local = v.world_to_local(Vec3::new(0.0, 2.5, 4.5));
    assert_eq!(local, Vec3::new(2.0, 2.0, 2.0));

    let (base, frac) = v.local_to_index_base(Vec3::new(1.25, 6.75, 14.5));
    assert_eq!(base, IVec3::new(1, 6, 14));
    assert!((frac - Vec3::new(0.25, 0.75, 0.5)).abs().max_element() < 1e-6);

    // base clamps on the far faces
    let (base, frac) = v.local_to_index_base(Vec3::new(3.0, 7.0, 15.0));
    assert_eq!(base, IVec3::new(2, 6, 14));
    assert_eq!(frac, Vec3::ONE);
}

#[test]
fn test_volume_value_range_covers_all_samples() {
    let v = procedural::wavelet_volume(IVec3::splat(64), Vec3::ZERO, Vec3::splat(1.0 / 63.0))
        .unwrap();
    let total = v.accelerator().value_range();

    let mut rng = ChaCha8Rng::seed_from_u64(9);
    for _ in 0..512 {
        let p = Vec3::new(
            rng.gen_range(0.0..1.0),
            rng.gen_range(0.0..1.0),
            rng.gen_range(0.0..1.0),
        );
        assert!(total.contains(v.sample_one(p)));
    }
}
