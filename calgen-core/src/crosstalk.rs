//! Sparse neighbouring-channel crosstalk table.

use crate::channel::RngIdx;
use crate::curve::CurvePoint;
use std::collections::BTreeMap;

/// Amplitude-vs-setting curves keyed by `(destination, source)` channel.
///
/// The source is the pulsed channel; the destination is the neighbour in
/// which leakage was measured. Curves are for inspection only and carry no
/// smoothing stage.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CrosstalkTable {
    curves: BTreeMap<(RngIdx, RngIdx), Vec<CurvePoint>>,
}

impl CrosstalkTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a point to the `(dest, source)` curve, creating it if absent.
    pub fn set_point(&mut self, dest: RngIdx, source: RngIdx, setting: f32, amplitude: f32) {
        self.curves
            .entry((dest, source))
            .or_default()
            .push(CurvePoint::new(setting, amplitude));
    }

    /// Curve for a `(dest, source)` pair.
    #[must_use]
    pub fn points(&self, dest: RngIdx, source: RngIdx) -> Option<&[CurvePoint]> {
        self.curves.get(&(dest, source)).map(Vec::as_slice)
    }

    /// Iterates over `(dest, source, points)` in key order.
    pub fn iter(&self) -> impl Iterator<Item = (RngIdx, RngIdx, &[CurvePoint])> + '_ {
        self.curves
            .iter()
            .map(|(&(dest, source), pts)| (dest, source, pts.as_slice()))
    }

    /// Number of stored pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.curves.len()
    }

    /// Returns true if no pair is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }

    /// Shifts every curve so its first point has zero amplitude.
    pub fn pedestal_subtract(&mut self) {
        for pts in self.curves.values_mut() {
            let Some(pedestal) = pts.first().map(|p| p.amplitude) else {
                continue;
            };
            for p in pts.iter_mut() {
                p.amplitude -= pedestal;
            }
        }
    }
}
