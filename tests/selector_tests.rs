//! Value-selector gating of interval iteration: emitted intervals must
//! overlap the committed ranges, culled cells break chaining monotonically,
//! and committing the same ranges twice reproduces identical output.

use glam::{IVec3, Vec3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use volume_kernel::*;

fn unit_wavelet_volume() -> StructuredVolume {
    procedural::wavelet_volume(IVec3::splat(128), Vec3::ZERO, Vec3::splat(1.0 / 127.0)).unwrap()
}

fn z_ray(x: f32, y: f32) -> Ray {
    Ray::new(
        Vec3::new(x, y, -1.0),
        Vec3::new(0.0, 0.0, 1.0),
        Range1::new(0.0, f32::INFINITY),
    )
}

fn collect_intervals(
    volume: &StructuredVolume,
    ray: &Ray,
    selector: Option<&ValueSelector>,
) -> Vec<Interval> {
    let mut it = IntervalIterator::single(volume, ray, selector);
    let mut out = Vec::new();
    while let Some(interval) = it.next_interval() {
        out.push(interval);
    }
    out
}

#[test]
fn test_emitted_intervals_overlap_selector_ranges() {
    let v = unit_wavelet_volume();
    let ranges = [Range1::new(0.9, 1.0), Range1::new(1.9, 2.0)];
    let selector = ValueSelector::new(&ranges).unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(3);
    for _ in 0..16 {
        let ray = z_ray(rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0));
        let intervals = collect_intervals(&v, &ray, Some(&selector));

        assert!(!intervals.is_empty(), "selector culled everything");
        for interval in &intervals {
            assert!(
                ranges.iter().any(|r| r.intersects(&interval.value_range)),
                "emitted interval {:?} overlaps no selector range",
                interval.value_range
            );
        }
    }
}

#[test]
fn test_selection_is_a_subset_of_full_iteration() {
    let v = unit_wavelet_volume();
    let selector = ValueSelector::new(&[Range1::new(1.9, 2.0)]).unwrap();

    let ray = z_ray(0.3, 0.6);
    let all = collect_intervals(&v, &ray, None);
    let selected = collect_intervals(&v, &ray, Some(&selector));

    assert!(selected.len() <= all.len());
    for interval in &selected {
        assert!(
            all.iter().any(|other| other == interval),
            "selected interval not present in unfiltered iteration"
        );
    }

    // culling never reorders: t ranges stay strictly increasing
    for pair in selected.windows(2) {
        assert!(pair[0].t_range.upper <= pair[1].t_range.lower);
    }
}

#[test]
fn test_recommitted_selector_reproduces_output() {
    let v = unit_wavelet_volume();
    let ranges = [Range1::new(1.9, 2.0), Range1::new(0.9, 1.0)];

    let first = ValueSelector::new(&ranges).unwrap();
    let second = ValueSelector::new(&ranges).unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(11);
    for _ in 0..8 {
        let ray = z_ray(rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0));
        let a = collect_intervals(&v, &ray, Some(&first));
        let b = collect_intervals(&v, &ray, Some(&second));
        assert_eq!(a, b);
    }
}

#[test]
fn test_selector_commit_failures() {
    assert!(matches!(
        ValueSelector::new(&[]),
        Err(KernelError::EmptySelectorRanges)
    ));
    assert!(matches!(
        ValueSelector::new(&[Range1::new(0.0, 1.0), Range1::new(3.0, 2.0)]),
        Err(KernelError::InvertedRange { .. })
    ));
}

#[test]
fn test_reject_all_selector_reports_done_immediately() {
    let v = unit_wavelet_volume();
    let selector = ValueSelector::reject_all();

    let rays = RaySoa::<4>::from_rays(&[z_ray(0.5, 0.5)]);
    let valid = [true, false, false, false];
    let mut it = IntervalIterator::<4>::new(&v, &rays, &valid, Some(&selector));

    let mut interval = IntervalSoa::zeroed();
    let mut result = [0i32; 4];
    it.iterate(&valid, &mut interval, &mut result);
    assert_eq!(result, [0, 0, 0, 0]);
}

#[test]
fn test_selector_with_out_of_band_ranges_culls_everything() {
    let v = unit_wavelet_volume();
    // the wavelet field on the unit cube stays well below 100
    let selector = ValueSelector::new(&[Range1::new(100.0, 200.0)]).unwrap();
    let intervals = collect_intervals(&v, &z_ray(0.5, 0.5), Some(&selector));
    assert!(intervals.is_empty());
}
