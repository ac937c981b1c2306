//! High-level run helpers that combine accumulation and smoothing.

use crate::crosstalk::CrosstalkMeasurement;
use crate::engine::{AccumulationEngine, RunConfig, RunStatistics};
use crate::intnonlin::IntNonlinMeasurement;
use crate::smoothing::CurveSmoother;
use calgen_core::channel::RngIdx;
use calgen_core::error::Result;
use calgen_core::event::EventSource;
use calgen_core::plan::TestPlan;
use calgen_core::{CalibrationTable, CrosstalkTable, SmoothingError, SplineTable};
use rayon::prelude::*;

/// Products of an integral-nonlinearity run.
#[derive(Debug, Clone)]
pub struct IntNonlinOutput {
    /// Raw per-window robust means.
    pub raw: CalibrationTable,
    /// Smoothed, pedestal-subtracted curves.
    pub splines: SplineTable,
    /// Event-loop counters.
    pub statistics: RunStatistics,
    /// Channels whose raw curve could not be smoothed.
    pub smoothing_failures: Vec<(RngIdx, SmoothingError)>,
}

/// Products of a crosstalk run.
#[derive(Debug, Clone)]
pub struct CrosstalkOutput {
    /// Pedestal-subtracted neighbour curves.
    pub table: CrosstalkTable,
    /// Event-loop counters.
    pub statistics: RunStatistics,
}

/// Smooths every populated channel of `raw` using its range's preset.
///
/// Channels are independent, so the pass runs in parallel. Failures are
/// returned per channel rather than aborting the table.
pub fn smooth_table(raw: &CalibrationTable) -> (SplineTable, Vec<(RngIdx, SmoothingError)>) {
    let channels: Vec<_> = raw.iter().collect();
    let results: Vec<_> = channels
        .par_iter()
        .map(|&(channel, points)| {
            let smoother = CurveSmoother::for_range(channel.range());
            (channel, smoother.smooth(points))
        })
        .collect();

    let mut splines = SplineTable::new();
    let mut failures = Vec::new();
    for (channel, result) in results {
        match result {
            Ok(curve) => splines.insert(channel, curve),
            Err(err) => failures.push((channel, err)),
        }
    }
    (splines, failures)
}

/// Runs the integral-nonlinearity measurement over `source`, then smooths
/// and pedestal-subtracts every channel.
///
/// # Errors
/// Returns an error if the plan is inconsistent or the source's event count
/// is outside tolerance.
pub fn run_intnonlin<S: EventSource + ?Sized>(
    source: &mut S,
    plan: &TestPlan,
    config: &RunConfig,
) -> Result<IntNonlinOutput> {
    let measurement = IntNonlinMeasurement::new(plan, config);
    let (raw, statistics) = AccumulationEngine::new(plan, measurement, config)?.run(source)?;

    let (mut splines, smoothing_failures) = smooth_table(&raw);
    for (channel, err) in &smoothing_failures {
        log::warn!("{channel}: {err}, no spline written");
    }
    splines.subtract_pedestals();
    log::info!(
        "intNonlin: {} of {} channels smoothed",
        splines.len(),
        raw.populated_channels()
    );

    Ok(IntNonlinOutput {
        raw,
        splines,
        statistics,
        smoothing_failures,
    })
}

/// Runs the crosstalk measurement over `source` and pedestal-subtracts the
/// resulting curves.
///
/// # Errors
/// Returns an error for broadcast plans, inconsistent plans, or an event
/// count outside tolerance.
pub fn run_crosstalk<S: EventSource + ?Sized>(
    source: &mut S,
    plan: &TestPlan,
    config: &RunConfig,
) -> Result<CrosstalkOutput> {
    let measurement = CrosstalkMeasurement::new(plan, config)?;
    let (mut table, statistics) =
        AccumulationEngine::new(plan, measurement, config)?.run(source)?;
    table.pedestal_subtract();
    log::info!("crosstalk: {} channel pairs recorded", table.len());
    Ok(CrosstalkOutput { table, statistics })
}
