//! Per-channel calibration tables.

use crate::channel::{ChannelArray, RngIdx};
use crate::curve::{CurvePoint, SmoothedCurve};

/// Raw accumulation product: per-channel `(setting, robust mean)` points.
///
/// One point is appended per completed dwell window, so each channel's
/// sequence is ordered by increasing setting. The robust width of each
/// window is kept alongside its mean.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CalibrationTable {
    curves: ChannelArray<RngIdx, Vec<CurvePoint>>,
    widths: ChannelArray<RngIdx, Vec<f32>>,
}

impl CalibrationTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a point and its window width to a channel's curve.
    pub fn push(&mut self, channel: RngIdx, point: CurvePoint, width: f32) {
        self.curves[channel].push(point);
        self.widths[channel].push(width);
    }

    /// Points recorded for a channel.
    #[must_use]
    pub fn points(&self, channel: RngIdx) -> &[CurvePoint] {
        &self.curves[channel]
    }

    /// Window widths recorded for a channel, parallel to [`Self::points`].
    #[must_use]
    pub fn widths(&self, channel: RngIdx) -> &[f32] {
        &self.widths[channel]
    }

    /// Iterates over channels with at least one point.
    pub fn iter(&self) -> impl Iterator<Item = (RngIdx, &[CurvePoint])> + '_ {
        self.curves
            .iter()
            .filter(|(_, pts)| !pts.is_empty())
            .map(|(ch, pts)| (ch, pts.as_slice()))
    }

    /// Number of channels with at least one point.
    #[must_use]
    pub fn populated_channels(&self) -> usize {
        self.iter().count()
    }

    /// Total number of points across all channels.
    #[must_use]
    pub fn total_points(&self) -> usize {
        self.curves.as_slice().iter().map(Vec::len).sum()
    }
}

/// Smoothed output curves keyed by channel.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SplineTable {
    curves: ChannelArray<RngIdx, Option<SmoothedCurve>>,
}

impl SplineTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a channel's curve, replacing any previous one.
    pub fn insert(&mut self, channel: RngIdx, curve: SmoothedCurve) {
        self.curves[channel] = Some(curve);
    }

    /// Curve for a channel, if smoothed.
    #[must_use]
    pub fn get(&self, channel: RngIdx) -> Option<&SmoothedCurve> {
        self.curves[channel].as_ref()
    }

    /// Iterates over channels that have a curve.
    pub fn iter(&self) -> impl Iterator<Item = (RngIdx, &SmoothedCurve)> + '_ {
        self.curves
            .iter()
            .filter_map(|(ch, curve)| curve.as_ref().map(|c| (ch, c)))
    }

    /// Number of channels with a curve.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns true if no channel has a curve.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Zeroes every curve's pedestal: each channel's amplitudes are shifted
    /// by that channel's own first output amplitude.
    pub fn subtract_pedestals(&mut self) {
        for curve in self.curves.as_mut_slice().iter_mut().flatten() {
            curve.subtract_pedestal();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelKey, Face, Range, XtalIdx};

    fn channel(column: usize) -> RngIdx {
        RngIdx::new(XtalIdx::new(0, 0, column).unwrap(), Face::Pos, Range::Lex8)
    }

    #[test]
    fn test_calibration_table_push_and_iter() {
        let mut table = CalibrationTable::new();
        table.push(channel(1), CurvePoint::new(0.0, 10.0), 1.5);
        table.push(channel(1), CurvePoint::new(5.0, 20.0), 2.0);
        table.push(channel(3), CurvePoint::new(0.0, 11.0), 0.5);

        assert_eq!(table.points(channel(1)).len(), 2);
        assert!(table.points(channel(2)).is_empty());
        assert_eq!(table.widths(channel(1)), &[1.5, 2.0]);
        assert_eq!(table.populated_channels(), 2);
        assert_eq!(table.total_points(), 3);

        let keys: Vec<_> = table.iter().map(|(ch, _)| ch.index()).collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_spline_pedestals_per_channel() {
        let mut table = SplineTable::new();
        table.insert(
            channel(0),
            SmoothedCurve::new(vec![CurvePoint::new(0.0, 50.0), CurvePoint::new(1.0, 80.0)]),
        );
        table.insert(
            channel(1),
            SmoothedCurve::new(vec![CurvePoint::new(0.0, -5.0), CurvePoint::new(1.0, 5.0)]),
        );
        table.subtract_pedestals();

        let c0 = table.get(channel(0)).unwrap().points();
        let c1 = table.get(channel(1)).unwrap().points();
        assert_eq!(c0[0].amplitude, 0.0);
        assert!((c0[1].amplitude - 30.0).abs() < f32::EPSILON);
        assert_eq!(c1[0].amplitude, 0.0);
        assert!((c1[1].amplitude - 10.0).abs() < f32::EPSILON);
        assert_eq!(table.len(), 2);
    }
}
