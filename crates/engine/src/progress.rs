//! Mapping item indices onto a phase's progress band.

/// Progress for item `i` of `n` in the band `[lo, hi]`: `lo + floor(i / n * (hi - lo))`.
pub fn scale(i: usize, n: usize, lo: u8, hi: u8) -> u8 {
    if n == 0 || hi <= lo {
        return lo;
    }
    let span = usize::from(hi - lo);
    let step = (i.min(n) * span) / n;
    lo + step as u8
}

/// Emit every `stride` items so a phase reports roughly `steps` times.
pub fn stride(n: usize, steps: usize) -> usize {
    (n / steps.max(1)).max(1)
}
