//! Curve point types and the smoothed output curve.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One `(setting, amplitude)` sample of a response curve.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CurvePoint {
    /// Injected test-signal level (e.g. charge-injection DAC).
    pub setting: f32,
    /// Digitized amplitude (ADC units).
    pub amplitude: f32,
}

impl CurvePoint {
    /// Creates a new curve point.
    #[inline]
    pub fn new(setting: f32, amplitude: f32) -> Self {
        Self { setting, amplitude }
    }
}

/// A smoothed per-channel curve mapping setting to expected amplitude.
///
/// Points are ordered by increasing setting. The curve is used downstream
/// as a nonlinearity lookup, so both directions of piecewise-linear
/// interpolation are provided.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SmoothedCurve {
    points: Vec<CurvePoint>,
}

impl SmoothedCurve {
    /// Wraps an ordered point sequence.
    #[must_use]
    pub fn new(points: Vec<CurvePoint>) -> Self {
        Self { points }
    }

    /// Returns the points.
    #[must_use]
    pub fn points(&self) -> &[CurvePoint] {
        &self.points
    }

    /// Returns the number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the curve holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Shifts every amplitude so the first point sits at zero.
    pub fn subtract_pedestal(&mut self) {
        if let Some(pedestal) = self.points.first().map(|p| p.amplitude) {
            for p in &mut self.points {
                p.amplitude -= pedestal;
            }
        }
    }

    /// Expected amplitude at `setting`.
    ///
    /// Linear between neighbouring points; outside the curve the first or
    /// last segment is extended. Returns `None` for curves with fewer than
    /// two points.
    #[must_use]
    pub fn amplitude_at(&self, setting: f32) -> Option<f32> {
        interpolate(&self.points, setting, |p| p.setting, |p| p.amplitude)
    }

    /// Setting that produces `amplitude`; the inverse of [`Self::amplitude_at`].
    ///
    /// Assumes amplitude is monotonic along the curve.
    #[must_use]
    pub fn setting_at(&self, amplitude: f32) -> Option<f32> {
        interpolate(&self.points, amplitude, |p| p.amplitude, |p| p.setting)
    }
}

fn interpolate(
    points: &[CurvePoint],
    x: f32,
    key: impl Fn(&CurvePoint) -> f32,
    value: impl Fn(&CurvePoint) -> f32,
) -> Option<f32> {
    if points.len() < 2 {
        return None;
    }

    // First segment whose upper end reaches x, else the last segment.
    let upper = points
        .iter()
        .skip(1)
        .position(|p| key(p) >= x)
        .map_or(points.len() - 1, |i| i + 1);
    let (a, b) = (&points[upper - 1], &points[upper]);

    let dx = key(b) - key(a);
    if dx == 0.0 {
        return Some(value(a));
    }
    Some(value(a) + (x - key(a)) * (value(b) - value(a)) / dx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn curve() -> SmoothedCurve {
        SmoothedCurve::new(vec![
            CurvePoint::new(0.0, 10.0),
            CurvePoint::new(100.0, 210.0),
            CurvePoint::new(200.0, 310.0),
        ])
    }

    #[test]
    fn test_amplitude_lookup() {
        let c = curve();
        assert_relative_eq!(c.amplitude_at(50.0).unwrap(), 110.0);
        assert_relative_eq!(c.amplitude_at(150.0).unwrap(), 260.0);
        // Extends the last segment.
        assert_relative_eq!(c.amplitude_at(300.0).unwrap(), 410.0);
        // Extends the first segment.
        assert_relative_eq!(c.amplitude_at(-10.0).unwrap(), -10.0);
    }

    #[test]
    fn test_setting_lookup_inverts_amplitude() {
        let c = curve();
        for s in [0.0_f32, 25.0, 100.0, 175.0, 200.0] {
            let adc = c.amplitude_at(s).unwrap();
            assert_relative_eq!(c.setting_at(adc).unwrap(), s, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_pedestal_subtraction() {
        let mut c = curve();
        c.subtract_pedestal();
        assert_eq!(c.points()[0].amplitude, 0.0);
        assert_relative_eq!(c.points()[2].amplitude, 300.0);
    }

    #[test]
    fn test_short_curve_has_no_lookup() {
        let c = SmoothedCurve::new(vec![CurvePoint::new(1.0, 1.0)]);
        assert!(c.amplitude_at(1.0).is_none());
        assert!(SmoothedCurve::default().setting_at(0.0).is_none());
    }
}
