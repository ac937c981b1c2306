//! Spline-point generation from raw calibration curves.
//!
//! A raw curve is turned into spline points in stages:
//! 1. Boundary detection: points above 99% of the last amplitude are
//!    treated as saturated and dropped.
//! 2. Head extrapolation: the first few points are replaced by a straight
//!    line through two anchors further into the curve.
//! 3. Grouped local quadratic fits thin and smooth the bulk.
//! 4. The last few usable points are copied verbatim.
//! 5. A final point is extrapolated out to the full-scale amplitude.
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]

use calgen_core::channel::Range;
use calgen_core::{CurvePoint, SmoothedCurve, SmoothingError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Fraction of the last amplitude above which points count as saturated.
const SATURATION_FRACTION: f32 = 0.99;

/// Per-range smoothing parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SmoothingParams {
    /// Half-width of each regression window and the stride between centers.
    pub group_width: usize,
    /// Number of leading points replaced by extrapolation.
    pub extrap_lo_count: usize,
    /// Span, in points, between the two extrapolation anchors (inclusive).
    pub extrap_lo_src_count: usize,
    /// Number of trailing usable points copied verbatim.
    pub tail_verbatim_count: usize,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self::for_range(Range::Lex8)
    }
}

impl SmoothingParams {
    /// Preset parameters for a gain range.
    #[must_use]
    pub fn for_range(range: Range) -> Self {
        match range {
            Range::Lex8 | Range::Hex8 => Self {
                group_width: 3,
                extrap_lo_count: 3,
                extrap_lo_src_count: 4,
                tail_verbatim_count: 5,
            },
            Range::Lex1 | Range::Hex1 => Self {
                group_width: 4,
                extrap_lo_count: 2,
                extrap_lo_src_count: 4,
                tail_verbatim_count: 3,
            },
        }
    }

    fn validate(&self) -> Result<(), SmoothingError> {
        if self.group_width == 0 {
            return Err(SmoothingError::InvalidParams(
                "group_width must be > 0".into(),
            ));
        }
        if self.extrap_lo_src_count < 2 {
            return Err(SmoothingError::InvalidParams(
                "extrap_lo_src_count must be >= 2".into(),
            ));
        }
        Ok(())
    }

    /// Minimum number of usable points the stages need.
    fn required_points(&self) -> usize {
        let head = self.extrap_lo_count + self.extrap_lo_src_count;
        let tail = self.extrap_lo_count + self.tail_verbatim_count;
        let fit_margin = self.tail_verbatim_count.max(self.group_width - 1) + 1;
        head.max(tail).max(fit_margin)
    }
}

/// Smooths raw `(setting, amplitude)` curves into spline points.
#[derive(Clone, Debug, Default)]
pub struct CurveSmoother {
    params: SmoothingParams,
}

impl CurveSmoother {
    /// Creates a smoother with explicit parameters.
    #[must_use]
    pub fn new(params: SmoothingParams) -> Self {
        Self { params }
    }

    /// Creates a smoother with the preset for `range`.
    #[must_use]
    pub fn for_range(range: Range) -> Self {
        Self::new(SmoothingParams::for_range(range))
    }

    /// Parameters in use.
    #[must_use]
    pub fn params(&self) -> &SmoothingParams {
        &self.params
    }

    /// Smooths one channel's raw curve.
    ///
    /// `raw` must be ordered by increasing setting.
    ///
    /// # Errors
    /// Returns [`SmoothingError::TooFewPoints`] when the unsaturated part of
    /// the curve cannot feed every stage, or
    /// [`SmoothingError::InvalidParams`] for unusable parameters.
    pub fn smooth(&self, raw: &[CurvePoint]) -> Result<SmoothedCurve, SmoothingError> {
        let p = &self.params;
        p.validate()?;

        let Some(last) = raw.last() else {
            return Err(SmoothingError::TooFewPoints {
                available: 0,
                required: p.required_points(),
            });
        };
        let adc_max = last.amplitude;

        // Stage 1: last point of the leading unsaturated run.
        let threshold = SATURATION_FRACTION * adc_max;
        let first_saturated = raw
            .iter()
            .position(|pt| pt.amplitude > threshold)
            .unwrap_or(raw.len());
        let last_idx = first_saturated.saturating_sub(1);

        let available = last_idx + 1;
        let required = p.required_points();
        if available < required {
            return Err(SmoothingError::TooFewPoints {
                available,
                required,
            });
        }

        let mut out = Vec::with_capacity(available / p.group_width + p.extrap_lo_count + 8);

        // Stage 2: linear extrapolation of the head from two interior anchors.
        let anchor_a = raw[p.extrap_lo_count];
        let anchor_b = raw[p.extrap_lo_count + p.extrap_lo_src_count - 1];
        for pt in &raw[..p.extrap_lo_count] {
            out.push(CurvePoint::new(
                pt.setting,
                line_through(anchor_a, anchor_b, pt.setting),
            ));
        }

        // Stage 3: grouped quadratic fits.
        let fit_limit = last_idx - p.tail_verbatim_count.max(p.group_width - 1);
        let mut center = p.extrap_lo_count + p.group_width - 1;
        while center + p.group_width <= fit_limit {
            let lo = center.saturating_sub(p.group_width).max(p.extrap_lo_count);
            let hi = center + p.group_width;
            let (x_lo, x_hi) = (raw[lo].setting, raw[hi].setting);
            let window = raw[..=last_idx]
                .iter()
                .filter(|pt| pt.setting >= x_lo && pt.setting <= x_hi);

            let x = raw[center].setting;
            let y = QuadraticFit::fit(window).map_or(raw[center].amplitude, |fit| fit.eval(x));
            out.push(CurvePoint::new(x, y));
            center += p.group_width;
        }

        // Stage 4: verbatim tail.
        out.extend_from_slice(&raw[available - p.tail_verbatim_count..available]);

        // Stage 5: extend to full scale along the last emitted segment.
        if out.len() < 2 {
            return Err(SmoothingError::TooFewPoints {
                available: out.len(),
                required: 2,
            });
        }
        let (prev, tail) = (out[out.len() - 2], out[out.len() - 1]);
        let d_adc = tail.amplitude - prev.amplitude;
        let final_setting = if d_adc == 0.0 {
            last.setting
        } else {
            tail.setting + (adc_max - tail.amplitude) * (tail.setting - prev.setting) / d_adc
        };
        out.push(CurvePoint::new(final_setting, adc_max));

        Ok(SmoothedCurve::new(out))
    }
}

/// Amplitude at `x` on the straight line through `a` and `b`.
fn line_through(a: CurvePoint, b: CurvePoint, x: f32) -> f32 {
    let (xa, ya) = (f64::from(a.setting), f64::from(a.amplitude));
    let (xb, yb) = (f64::from(b.setting), f64::from(b.amplitude));
    if xb == xa {
        return a.amplitude;
    }
    let slope = (yb - ya) / (xb - xa);
    (ya + slope * (f64::from(x) - xa)) as f32
}

/// Least-squares parabola, expanded about the mean abscissa for conditioning.
struct QuadraticFit {
    x0: f64,
    coef: [f64; 3],
}

impl QuadraticFit {
    fn fit<'a>(points: impl Iterator<Item = &'a CurvePoint> + Clone) -> Option<Self> {
        let (n, sum_x) = points
            .clone()
            .fold((0usize, 0.0_f64), |(n, s), pt| (n + 1, s + f64::from(pt.setting)));
        if n < 3 {
            return None;
        }
        let x0 = sum_x / n as f64;

        // Normal equations: sums of dx^k (k = 0..4) and y * dx^k (k = 0..2).
        let mut s = [0.0_f64; 5];
        let mut t = [0.0_f64; 3];
        for pt in points {
            let dx = f64::from(pt.setting) - x0;
            let y = f64::from(pt.amplitude);
            let mut pow = 1.0;
            for (k, sk) in s.iter_mut().enumerate() {
                *sk += pow;
                if k < 3 {
                    t[k] += y * pow;
                }
                pow *= dx;
            }
        }

        let mut m = [
            [s[0], s[1], s[2], t[0]],
            [s[1], s[2], s[3], t[1]],
            [s[2], s[3], s[4], t[2]],
        ];
        let coef = solve3(&mut m)?;
        Some(Self { x0, coef })
    }

    fn eval(&self, x: f32) -> f32 {
        let dx = f64::from(x) - self.x0;
        (self.coef[0] + dx * (self.coef[1] + dx * self.coef[2])) as f32
    }
}

/// Gaussian elimination with partial pivoting on an augmented 3x4 system.
fn solve3(m: &mut [[f64; 4]; 3]) -> Option<[f64; 3]> {
    let scale = m
        .iter()
        .flat_map(|row| row[..3].iter())
        .fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if scale == 0.0 {
        return None;
    }
    let tolerance = scale * 1e-12;

    for col in 0..3 {
        let pivot = (col..3).max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))?;
        if m[pivot][col].abs() <= tolerance {
            return None;
        }
        m.swap(col, pivot);
        for row in col + 1..3 {
            let factor = m[row][col] / m[col][col];
            for k in col..4 {
                m[row][k] -= factor * m[col][k];
            }
        }
    }

    let mut x = [0.0_f64; 3];
    for row in (0..3).rev() {
        let tail: f64 = (row + 1..3).map(|k| m[row][k] * x[k]).sum();
        x[row] = (m[row][3] - tail) / m[row][row];
    }
    Some(x)
}
