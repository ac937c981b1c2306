//! calgen-core: Core types for calorimeter calibration generation.
//!
//! This crate provides the foundational abstractions shared by the
//! accumulation engine and the I/O layer: dense channel indices,
//! test plans, decoded event records and the calibration tables the
//! engine fills.
//!

pub mod channel;
pub mod crosstalk;
pub mod curve;
pub mod error;
pub mod event;
pub mod plan;
pub mod table;

pub use channel::{
    ChannelArray, ChannelKey, Diode, DiodeIdx, Face, FaceIdx, Range, RngIdx, XtalIdx,
};
pub use crosstalk::CrosstalkTable;
pub use curve::{CurvePoint, SmoothedCurve};
pub use error::{Error, Result, SmoothingError, SourceError};
pub use event::{CalEvent, CalHit, EventSource, MemoryEventSource, RawSample, Readout, TestConfig};
pub use plan::{validate_event_count, SettingGroup, TestPlan, Timing};
pub use table::{CalibrationTable, SplineTable};
