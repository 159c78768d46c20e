//! Tag-range allocation: ordered 64-bit labels under insertion.
//!
//! Every mixed bottom carries a label in $[0, 2^{62})$, strictly
//! increasing in text order. A freshly split bottom needs a label
//! strictly between its neighbours'; when the neighbours are adjacent
//! integers the surrounding window is widened one prefix bit at a time
//! until the labels inside fall below a density threshold, then they are
//! respread uniformly over the window. With a geometric density schedule
//! this costs $O(\log^2 n)$ amortised per insertion (Itoh-style tag range
//! relabelling, in the family of Dietz & Sleator order maintenance).
//!
//! The arithmetic lives here as pure functions; the walk that collects
//! the window's bottoms belongs to the core, which owns the text order.

/// Labels live in `[0, 1 << LABEL_BITS)`.
pub const LABEL_BITS: u32 = 62;

/// Virtual label just past the end of the label space.
pub const LABEL_END: u64 = 1u64 << LABEL_BITS;

/// Density parameter derived from the current bottom-arena capacity,
/// kept in `[9, 16)`: larger arenas tolerate denser windows before a
/// respread.
pub fn tra_code(capacity: u64) -> u32 {
    let bits = 64 - capacity.leading_zeros();
    (9 + bits / 8).clamp(9, 15)
}

/// Number of labels a window of size `2^l` may hold before it must be
/// widened: `2^(l * code / 16)`.
///
/// Since `code < 16` this is always strictly below `2^l`, which keeps
/// respread steps at least one apart; at `l = 62` it exceeds any
/// realistic bottom count, so widening always terminates.
pub fn overflow_num(l: u32, code: u32) -> u64 {
    1u64 << ((l * code / 16).min(62))
}

/// Label halfway between `prev` and `next`, or `None` when the gap is
/// too tight (`next <= prev + 1`).
pub fn midpoint(prev: u64, next: u64) -> Option<u64> {
    if next - prev >= 2 {
        Some(prev + (next - prev) / 2)
    } else {
        None
    }
}

/// Start of the `2^l`-sized window containing `label`.
#[inline]
pub fn window_start(label: u64, l: u32) -> u64 {
    (label >> l) << l
}

/// Uniform respread of `n` labels over the window `[start, start + 2^l)`:
/// the `i`-th label (in text order) becomes `start + (i + 1) * step`.
///
/// Requires `n + 1 <= 2^l`, which [`overflow_num`] guarantees for every
/// window that passes the density check.
pub fn spread(start: u64, l: u32, n: u64) -> impl Iterator<Item = u64> {
    let step = (1u64 << l) / (n + 1);
    debug_assert!(step >= 1);
    (0..n).map(move |i| start + (i + 1) * step)
}
