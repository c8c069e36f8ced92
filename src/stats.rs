//! Statistics primitives.
//!
//! Plain single-writer accumulators (`Statistics`, `StatisticsExt`,
//! `Histogram`) and atomic variants used by the lock-free search tree.
//!
//! The atomic variants mirror the discipline of the tree: updates are
//! relaxed read-modify-write sequences, not compare-and-swap loops, so two
//! writers can interleave and a reader can observe a mean whose count was
//! about to change. The search tolerates this; the values are only move
//! ordering hints, not accounting.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Online mean with integer count.
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    mean: f32,
    count: u64,
}

impl Statistics {
    pub fn new() -> Statistics {
        Statistics::default()
    }

    pub fn add(&mut self, value: f32) {
        self.count += 1;
        self.mean += (value - self.mean) / self.count as f32;
    }

    pub fn clear(&mut self) {
        *self = Statistics::default();
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_defined(&self) -> bool {
        self.count > 0
    }

    pub fn mean(&self) -> f32 {
        debug_assert!(self.is_defined());
        self.mean
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_defined() {
            write!(f, "{:.3} {}", self.mean, self.count)
        } else {
            write!(f, "- {}", self.count)
        }
    }
}

/// Mean plus Welford variance, minimum and maximum. Single writer.
#[derive(Debug, Clone)]
pub struct StatisticsExt {
    stats: Statistics,
    /// Sum of squared deviations (Welford's M2).
    m2: f32,
    min: f32,
    max: f32,
}

impl Default for StatisticsExt {
    fn default() -> StatisticsExt {
        StatisticsExt {
            stats: Statistics::default(),
            m2: 0.0,
            min: f32::INFINITY,
            max: f32::NEG_INFINITY,
        }
    }
}

impl StatisticsExt {
    pub fn new() -> StatisticsExt {
        StatisticsExt::default()
    }

    pub fn add(&mut self, value: f32) {
        let old_mean = if self.stats.is_defined() {
            self.stats.mean()
        } else {
            0.0
        };
        self.stats.add(value);
        self.m2 += (value - old_mean) * (value - self.stats.mean());
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn clear(&mut self) {
        *self = StatisticsExt::default();
    }

    pub fn count(&self) -> u64 {
        self.stats.count()
    }

    pub fn is_defined(&self) -> bool {
        self.stats.is_defined()
    }

    pub fn mean(&self) -> f32 {
        self.stats.mean()
    }

    pub fn variance(&self) -> f32 {
        if self.count() < 2 {
            0.0
        } else {
            self.m2 / (self.count() - 1) as f32
        }
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }
}

impl fmt::Display for StatisticsExt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_defined() {
            write!(
                f,
                "{} var {:.3} min {:.1} max {:.1}",
                self.stats,
                self.variance(),
                self.min,
                self.max
            )
        } else {
            write!(f, "{}", self.stats)
        }
    }
}

/// Fixed-bin histogram over a half-open value range.
#[derive(Debug, Clone)]
pub struct Histogram {
    lo: f32,
    hi: f32,
    bins: Vec<u64>,
}

impl Histogram {
    pub fn new(lo: f32, hi: f32, nu_bins: usize) -> Histogram {
        assert!(nu_bins > 0 && hi > lo);
        Histogram {
            lo,
            hi,
            bins: vec![0; nu_bins],
        }
    }

    pub fn add(&mut self, value: f32) {
        let scaled = (value - self.lo) / (self.hi - self.lo) * self.bins.len() as f32;
        let bin = (scaled.max(0.0) as usize).min(self.bins.len() - 1);
        self.bins[bin] += 1;
    }

    pub fn clear(&mut self) {
        self.bins.iter_mut().for_each(|b| *b = 0);
    }

    pub fn bins(&self) -> &[u64] {
        &self.bins
    }
}

impl fmt::Display for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, count) in self.bins.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{count}")?;
        }
        Ok(())
    }
}

/// Online mean with integer count, updated by many threads.
///
/// The mean is stored as `f32` bits in an `AtomicU32`. See the module
/// comment for the consistency contract.
#[derive(Debug, Default)]
pub struct AtomicStatistics {
    mean: AtomicU32,
    count: AtomicU32,
}

impl AtomicStatistics {
    pub fn add(&self, value: f32) {
        let count = self.count.load(Ordering::Relaxed) + 1;
        let mean = f32::from_bits(self.mean.load(Ordering::Relaxed));
        let mean = mean + (value - mean) / count as f32;
        self.mean.store(mean.to_bits(), Ordering::Relaxed);
        self.count.store(count, Ordering::Relaxed);
    }

    /// Overwrite with a prior value and equivalent count.
    pub fn initialize(&self, value: f32, count: u32) {
        self.mean.store(value.to_bits(), Ordering::Relaxed);
        self.count.store(count, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.initialize(0.0, 0);
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn is_defined(&self) -> bool {
        self.count() > 0
    }

    pub fn mean(&self) -> f32 {
        f32::from_bits(self.mean.load(Ordering::Relaxed))
    }

    /// Copy the value of another accumulator (used by subtree extraction).
    pub fn copy_from(&self, other: &AtomicStatistics) {
        self.mean.store(other.mean.load(Ordering::Relaxed), Ordering::Relaxed);
        self.count.store(other.count.load(Ordering::Relaxed), Ordering::Relaxed);
    }
}

impl fmt::Display for AtomicStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3} {}", self.mean(), self.count())
    }
}

/// Weighted online mean with a float count; the RAVE accumulator.
#[derive(Debug, Default)]
pub struct AtomicWeightedStatistics {
    mean: AtomicU32,
    count: AtomicU32,
}

impl AtomicWeightedStatistics {
    pub fn add_weighted(&self, value: f32, weight: f32) {
        let count = f32::from_bits(self.count.load(Ordering::Relaxed)) + weight;
        let mean = f32::from_bits(self.mean.load(Ordering::Relaxed));
        let mean = mean + weight * (value - mean) / count;
        self.mean.store(mean.to_bits(), Ordering::Relaxed);
        self.count.store(count.to_bits(), Ordering::Relaxed);
    }

    pub fn initialize(&self, value: f32, count: f32) {
        self.mean.store(value.to_bits(), Ordering::Relaxed);
        self.count.store(count.to_bits(), Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.initialize(0.0, 0.0);
    }

    pub fn count(&self) -> f32 {
        f32::from_bits(self.count.load(Ordering::Relaxed))
    }

    pub fn is_defined(&self) -> bool {
        self.count() > 0.0
    }

    pub fn mean(&self) -> f32 {
        f32::from_bits(self.mean.load(Ordering::Relaxed))
    }

    pub fn copy_from(&self, other: &AtomicWeightedStatistics) {
        self.mean.store(other.mean.load(Ordering::Relaxed), Ordering::Relaxed);
        self.count.store(other.count.load(Ordering::Relaxed), Ordering::Relaxed);
    }
}

impl fmt::Display for AtomicWeightedStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3} {:.1}", self.mean(), self.count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean() {
        let mut s = Statistics::new();
        assert!(!s.is_defined());
        s.add(1.0);
        s.add(0.0);
        s.add(1.0);
        assert_eq!(s.count(), 3);
        assert!((s.mean() - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_variance() {
        let mut s = StatisticsExt::new();
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            s.add(v);
        }
        assert!((s.mean() - 5.0).abs() < 1e-6);
        // Sample variance of the classic example set.
        assert!((s.variance() - 32.0 / 7.0).abs() < 1e-5);
        assert_eq!(s.min(), 2.0);
        assert_eq!(s.max(), 9.0);
    }

    #[test]
    fn test_histogram() {
        let mut h = Histogram::new(0.0, 1.0, 4);
        h.add(0.1);
        h.add(0.6);
        h.add(0.9);
        h.add(2.0); // clamps into the last bin
        assert_eq!(h.bins(), &[1, 0, 1, 2]);
        assert_eq!(h.to_string(), "1 0 1 2");
    }

    #[test]
    fn test_atomic_mean_matches_plain() {
        let a = AtomicStatistics::default();
        let mut s = Statistics::new();
        for v in [1.0, 0.0, 0.0, 1.0, 1.0] {
            a.add(v);
            s.add(v);
        }
        assert_eq!(a.count() as u64, s.count());
        assert!((a.mean() - s.mean()).abs() < 1e-6);
    }

    #[test]
    fn test_weighted_mean() {
        let w = AtomicWeightedStatistics::default();
        w.add_weighted(1.0, 2.0);
        w.add_weighted(0.0, 2.0);
        assert!((w.mean() - 0.5).abs() < 1e-6);
        assert!((w.count() - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_initialize_as_prior() {
        let a = AtomicStatistics::default();
        a.initialize(0.5, 9);
        assert_eq!(a.count(), 9);
        a.add(1.0);
        assert_eq!(a.count(), 10);
        assert!((a.mean() - 0.55).abs() < 1e-6);
    }
}
