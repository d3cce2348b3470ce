//! Distance metrics for descriptor rows.
//!
//! The metric is a function of the element type the index searches in:
//!
//! - float rows use **squared** L2 (the square root is monotone, so ranking is
//!   unchanged and the kd-tree pruning bound stays cheap),
//! - binary rows use Hamming distance.
//!
//! Distances from the approximate index and from the exact scan over
//! not-yet-indexed words are merged by value, so both sides compute exactly
//! what [`row_distance`] computes. Stored words are always finite, so a
//! distance is never NaN unless the query itself carries one.

use crate::descriptor::Row;
use crate::simd;

/// Distance between two rows of the same element type.
///
/// Rows of different type or dimension are infinitely far apart, so they are
/// never selected as a nearest neighbor.
#[inline]
#[must_use]
pub fn row_distance(a: Row<'_>, b: Row<'_>) -> f32 {
    match (a, b) {
        (Row::F32(a), Row::F32(b)) if a.len() == b.len() => simd::l2_distance_squared(a, b),
        (Row::U8(a), Row::U8(b)) if a.len() == b.len() => simd::hamming(a, b) as f32,
        _ => f32::INFINITY,
    }
}
