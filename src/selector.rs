//! Value selectors: committed sets of scalar ranges used to cull traversal
//! intervals whose value range is not interesting.

use crate::api::error::KernelError;
use crate::math::Range1;

/// Immutable, committed set of scalar ranges, kept sorted and disjoint so
/// the overlap test is a binary search.
#[derive(Clone, Debug)]
pub struct ValueSelector {
    ranges: Vec<Range1>,
}

impl ValueSelector {
    /// Commit a staged range list: validates, sorts, and coalesces.
    ///
    /// An empty list is rejected; a selector that matches nothing is still a
    /// distinct state (see [`ValueSelector::reject_all`]) but committing one
    /// explicitly is considered a caller mistake.
    pub fn new(ranges: &[Range1]) -> Result<Self, KernelError> {
        if ranges.is_empty() {
            return Err(KernelError::EmptySelectorRanges);
        }
        for r in ranges {
            if !(r.lower <= r.upper) {
                return Err(KernelError::InvertedRange {
                    lower: r.lower,
                    upper: r.upper,
                });
            }
        }

        let mut sorted = ranges.to_vec();
        sorted.sort_by(|a, b| a.lower.total_cmp(&b.lower));

        // coalesce overlapping and touching neighbors
        let mut coalesced: Vec<Range1> = Vec::with_capacity(sorted.len());
        for r in sorted {
            match coalesced.last_mut() {
                Some(last) if r.lower <= last.upper => {
                    last.upper = last.upper.max(r.upper);
                }
                _ => coalesced.push(r),
            }
        }

        Ok(Self { ranges: coalesced })
    }

    /// Selector with zero ranges: rejects every interval. This is the state
    /// of a selector whose commit never succeeded.
    pub const fn reject_all() -> Self {
        Self { ranges: Vec::new() }
    }

    /// Committed ranges, ascending and disjoint.
    pub fn ranges(&self) -> &[Range1] {
        &self.ranges
    }

    /// True when `range` overlaps any committed range. Lower-bound binary
    /// search plus a single predicate; O(log R).
    #[inline]
    pub fn intersects(&self, range: Range1) -> bool {
        let i = self.ranges.partition_point(|r| r.upper < range.lower);
        i < self.ranges.len() && self.ranges[i].lower <= range.upper
    }
}
