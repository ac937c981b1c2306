//! calgen-algorithms: Calibration accumulation and curve smoothing.
//!
//! This crate provides the event-driven calibration engine:
//! - **Sequencing** - derives the channel/setting/sample under test from a
//!   good-event counter (uniform and grouped timing)
//! - **Dwell accumulation** - per-channel 3-sigma trimmed statistics
//! - **Measurements** - integral nonlinearity and neighbour crosstalk
//! - **Smoothing** - spline-point generation from raw curves
//!
#![warn(missing_docs)]

mod crosstalk;
mod dwell;
mod engine;
mod intnonlin;
mod limiter;
mod processing;
mod sequencer;
mod smoothing;

pub use crosstalk::CrosstalkMeasurement;
pub use dwell::{DwellAccumulator, RobustStat, ADC_DOMAIN};
pub use engine::{
    AccumulationEngine, DwellMeasurement, EventOutcome, RunConfig, RunStatistics,
    WindowSummary,
};
pub use intnonlin::IntNonlinMeasurement;
pub use limiter::WarningLimiter;
pub use processing::{
    run_crosstalk, run_intnonlin, smooth_table, CrosstalkOutput, IntNonlinOutput,
};
pub use sequencer::{EventCursor, SequenceState, TestSequencer};
pub use smoothing::{CurveSmoother, SmoothingParams};
