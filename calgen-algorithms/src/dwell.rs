//! Per-channel dwell-window sample collection with 3-sigma trimming.
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]

/// Valid amplitude domain `[lo, hi)` of a 12-bit ADC.
pub const ADC_DOMAIN: (f32, f32) = (0.0, 4096.0);

/// Number of trim passes applied by [`DwellAccumulator::robust_stat`].
const TRIM_ITERATIONS: usize = 3;

/// Half-width of the trim window in units of the current RMS.
const TRIM_SIGMA: f64 = 3.0;

/// Outlier-trimmed mean and width of one dwell window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobustStat {
    /// Mean of the retained samples.
    pub mean: f32,
    /// RMS (population standard deviation) of the retained samples.
    pub width: f32,
    /// Number of retained samples.
    pub entries: usize,
}

/// Sample buffer for one channel, live for a single dwell window.
///
/// Samples are tagged with the window they belong to; the first sample of
/// a new window discards everything collected for the previous one.
#[derive(Debug, Clone)]
pub struct DwellAccumulator {
    samples: Vec<f32>,
    window: Option<usize>,
    domain: (f32, f32),
    rejected: usize,
}

impl Default for DwellAccumulator {
    fn default() -> Self {
        Self::new(ADC_DOMAIN)
    }
}

impl DwellAccumulator {
    /// Creates an accumulator accepting samples in `[domain.0, domain.1)`.
    #[must_use]
    pub fn new(domain: (f32, f32)) -> Self {
        Self {
            samples: Vec::new(),
            window: None,
            domain,
            rejected: 0,
        }
    }

    /// Window currently being collected.
    #[must_use]
    pub fn window(&self) -> Option<usize> {
        self.window
    }

    /// Number of in-domain samples held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if no in-domain sample is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples dropped for falling outside the amplitude domain.
    #[must_use]
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    /// Adds a sample to `window`.
    ///
    /// Returns true if this call opened the window.
    pub fn ingest(&mut self, window: usize, amplitude: f32) -> bool {
        let opened = self.window != Some(window);
        if opened {
            self.clear();
            self.window = Some(window);
        }
        if amplitude >= self.domain.0 && amplitude < self.domain.1 {
            self.samples.push(amplitude);
        } else {
            self.rejected += 1;
        }
        opened
    }

    /// Empties the buffer.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.window = None;
        self.rejected = 0;
    }

    /// Robust `(mean, width)` of the samples collected for `window`.
    ///
    /// Starts from the plain mean/RMS, then applies exactly three passes of
    /// restricting to `[mean - 3 rms, mean + 3 rms]` and recomputing. Returns
    /// `None` when the window holds no samples.
    #[must_use]
    pub fn robust_stat(&self, window: usize) -> Option<RobustStat> {
        if self.window != Some(window) {
            return None;
        }

        let mut stat = moments(self.samples.iter().copied())?;
        for _ in 0..TRIM_ITERATIONS {
            let lo = stat.mean - TRIM_SIGMA * stat.rms;
            let hi = stat.mean + TRIM_SIGMA * stat.rms;
            let trimmed = self
                .samples
                .iter()
                .copied()
                .filter(|&a| f64::from(a) >= lo && f64::from(a) <= hi);
            // Rounding can leave a zero-width window empty; keep the last estimate.
            let Some(next) = moments(trimmed) else {
                break;
            };
            stat = next;
        }

        Some(RobustStat {
            mean: stat.mean as f32,
            width: stat.rms as f32,
            entries: stat.count,
        })
    }
}

struct Moments {
    mean: f64,
    rms: f64,
    count: usize,
}

fn moments(samples: impl Iterator<Item = f32>) -> Option<Moments> {
    let (mut count, mut sum, mut sum_sq) = (0usize, 0.0_f64, 0.0_f64);
    for s in samples {
        let s = f64::from(s);
        count += 1;
        sum += s;
        sum_sq += s * s;
    }
    if count == 0 {
        return None;
    }
    let n = count as f64;
    let mean = sum / n;
    let variance = (sum_sq / n - mean * mean).max(0.0);
    Some(Moments {
        mean,
        rms: variance.sqrt(),
        count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_plain_mean_when_nothing_trimmed() {
        let mut acc = DwellAccumulator::default();
        for a in [98.0, 99.0, 100.0, 101.0, 102.0] {
            acc.ingest(0, a);
        }
        let stat = acc.robust_stat(0).unwrap();
        assert_relative_eq!(stat.mean, 100.0);
        assert_relative_eq!(stat.width, 2.0_f32.sqrt(), epsilon = 1e-5);
        assert_eq!(stat.entries, 5);
    }

    #[test]
    fn test_outlier_is_trimmed() {
        let mut acc = DwellAccumulator::default();
        for i in 0..19 {
            acc.ingest(3, 99.0 + (i % 3) as f32);
        }
        acc.ingest(3, 1000.0);

        let stat = acc.robust_stat(3).unwrap();
        assert_eq!(stat.entries, 19);
        assert!((stat.mean - 100.0).abs() < 0.2, "mean {}", stat.mean);
        assert!(stat.width < 1.0);
    }

    #[test]
    fn test_new_window_discards_previous_samples() {
        let mut acc = DwellAccumulator::default();
        assert!(acc.ingest(0, 10.0));
        assert!(!acc.ingest(0, 12.0));
        assert!(acc.ingest(50, 500.0));

        assert_eq!(acc.len(), 1);
        assert!(acc.robust_stat(0).is_none());
        assert_relative_eq!(acc.robust_stat(50).unwrap().mean, 500.0);
    }

    #[test]
    fn test_out_of_domain_samples_dropped() {
        let mut acc = DwellAccumulator::default();
        acc.ingest(1, -3.0);
        acc.ingest(1, 4096.0);
        assert!(acc.is_empty());
        assert_eq!(acc.rejected(), 2);
        assert!(acc.robust_stat(1).is_none());
    }

    #[test]
    fn test_zero_width_window() {
        let mut acc = DwellAccumulator::default();
        for _ in 0..10 {
            acc.ingest(7, 0.1);
        }
        let stat = acc.robust_stat(7).unwrap();
        assert_relative_eq!(stat.mean, 0.1, epsilon = 1e-6);
        assert!(stat.width.abs() < 1e-3);
        assert_eq!(stat.entries, 10);
    }
}
