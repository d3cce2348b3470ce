//! Inner loops for descriptor distances.
//!
//! Written as plain iterator chains over fixed-width chunks so the compiler can
//! auto-vectorize them; there is no runtime feature dispatch.
//!
//! ```rust
//! use visword::simd::{hamming, l2_distance_squared};
//!
//! assert_eq!(l2_distance_squared(&[0.0, 1.0], &[0.0, 3.0]), 4.0);
//! assert_eq!(hamming(&[0b1010_1010], &[0b0101_0101]), 8);
//! ```

const LANES: usize = 8;

/// Squared L2 distance. Processes `LANES` elements at a time with independent
/// accumulators.
#[inline]
#[must_use]
pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len().min(b.len());
    let (a, b) = (&a[..n], &b[..n]);

    let mut acc = [0.0f32; LANES];
    let mut chunks_a = a.chunks_exact(LANES);
    let mut chunks_b = b.chunks_exact(LANES);
    for (ca, cb) in (&mut chunks_a).zip(&mut chunks_b) {
        for i in 0..LANES {
            let d = ca[i] - cb[i];
            acc[i] += d * d;
        }
    }
    let tail: f32 = chunks_a
        .remainder()
        .iter()
        .zip(chunks_b.remainder())
        .map(|(x, y)| (x - y) * (x - y))
        .sum();
    acc.iter().sum::<f32>() + tail
}

/// Number of differing bits between two byte strings.
#[inline]
#[must_use]
pub fn hamming(a: &[u8], b: &[u8]) -> u32 {
    let mut chunks_a = a.chunks_exact(8);
    let mut chunks_b = b.chunks_exact(8);
    let mut bits = 0u32;
    for (ca, cb) in (&mut chunks_a).zip(&mut chunks_b) {
        let mut wa = [0u8; 8];
        let mut wb = [0u8; 8];
        wa.copy_from_slice(ca);
        wb.copy_from_slice(cb);
        bits += (u64::from_le_bytes(wa) ^ u64::from_le_bytes(wb)).count_ones();
    }
    bits + chunks_a
        .remainder()
        .iter()
        .zip(chunks_b.remainder())
        .map(|(x, y)| (x ^ y).count_ones())
        .sum::<u32>()
}
