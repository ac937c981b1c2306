//! calgen-io: File I/O for calgen.
//!
//! This crate reads JSON-lines event files through memory-mapped access,
//! loads test plans from JSON and writes calibration tables as CSV.
//!

mod error;
mod plan;
mod reader;
mod writer;

pub use error::{Error, Result};
pub use plan::{load_test_plan, test_plan_from_json};
pub use reader::EventFileReader;
pub use writer::CalibFileWriter;
