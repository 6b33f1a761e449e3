//! Shuttle Rate Ladder
//!
//! Discrete table of signed playback rates used for shuttling. Repeated
//! shuttle presses walk the ladder one entry at a time, so pressing
//! "forward" three times from 1x lands on 8x.
//!
//! The ladder is immutable once built. Walking off either end clamps to the
//! extreme rate; it never wraps around.

/// Default rates: powers of two from 1/32x to 32x in both directions, plus 0.
pub const DEFAULT_RATES: [f32; 23] = [
    -32.0,
    -16.0,
    -8.0,
    -4.0,
    -2.0,
    -1.0,
    -1.0 / 2.0,
    -1.0 / 4.0,
    -1.0 / 8.0,
    -1.0 / 16.0,
    -1.0 / 32.0,
    0.0,
    1.0 / 32.0,
    1.0 / 16.0,
    1.0 / 8.0,
    1.0 / 4.0,
    1.0 / 2.0,
    1.0,
    2.0,
    4.0,
    8.0,
    16.0,
    32.0,
];

/// Ordered, deduplicated set of allowed playback rates
#[derive(Debug, Clone, PartialEq)]
pub struct RateLadder {
    /// Rates in ascending order, no duplicates, all finite
    rates: Vec<f32>,
}

impl RateLadder {
    /// Build a ladder from arbitrary rates.
    ///
    /// Non-finite values are dropped, the rest is sorted and deduplicated.
    /// Returns `None` if nothing usable remains.
    pub fn new(rates: &[f32]) -> Option<Self> {
        let mut sorted: Vec<f32> = rates
            .iter()
            .copied()
            .filter(|r| r.is_finite())
            // -0.0 and 0.0 are the same rate
            .map(|r| if r == 0.0 { 0.0 } else { r })
            .collect();
        sorted.sort_by(f32::total_cmp);
        sorted.dedup();
        if sorted.is_empty() {
            return None;
        }
        Some(RateLadder { rates: sorted })
    }

    /// All rates, ascending
    pub fn rates(&self) -> &[f32] {
        &self.rates
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// Always false: a ladder holds at least one rate
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Slowest (most negative) rate
    pub fn min(&self) -> f32 {
        self.rates[0]
    }

    /// Fastest rate
    pub fn max(&self) -> f32 {
        self.rates[self.rates.len() - 1]
    }

    /// Position of `rate` in the ladder, if it is an exact entry
    pub fn index_of(&self, rate: f32) -> Option<usize> {
        self.rates.iter().position(|r| *r == rate)
    }

    /// Whether `rate` is an exact ladder entry
    pub fn contains(&self, rate: f32) -> bool {
        self.index_of(rate).is_some()
    }

    /// Clamp a rate into `[min, max]`. NaN maps to the entry closest to 0.
    pub fn clamp(&self, rate: f32) -> f32 {
        if rate.is_nan() {
            return self.nearest(0.0);
        }
        rate.clamp(self.min(), self.max())
    }

    /// Ladder entry closest to `rate`.
    ///
    /// Ties resolve toward the entry nearer zero, so an ambiguous request
    /// never speeds playback up.
    pub fn nearest(&self, rate: f32) -> f32 {
        if rate.is_nan() {
            return self.nearest(0.0);
        }
        let mut best = self.rates[0];
        for &candidate in &self.rates[1..] {
            let d_best = (best - rate).abs();
            let d_cand = (candidate - rate).abs();
            if d_cand < d_best || (d_cand == d_best && candidate.abs() < best.abs()) {
                best = candidate;
            }
        }
        best
    }

    /// Next rate `steps` ladder entries away from `current`.
    ///
    /// The sign of `steps` picks the direction, its magnitude the number of
    /// entries to advance. `current` itself is never a candidate, so a rate
    /// never advances to itself. Walking past either end clamps to the extreme
    /// rate. `steps == 0` snaps `current` onto the ladder.
    pub fn next(&self, current: f32, steps: i32) -> f32 {
        if current.is_nan() {
            return self.nearest(0.0);
        }
        if steps == 0 {
            return self.nearest(current);
        }

        let wanted = steps.unsigned_abs() as usize;
        let candidate = if steps > 0 {
            self.rates.iter().copied().filter(|r| *r > current).take(wanted).last()
        } else {
            self.rates.iter().rev().copied().filter(|r| *r < current).take(wanted).last()
        };

        candidate.unwrap_or_else(|| self.clamp(current))
    }
}

impl Default for RateLadder {
    fn default() -> Self {
        RateLadder {
            rates: DEFAULT_RATES.to_vec(),
        }
    }
}
