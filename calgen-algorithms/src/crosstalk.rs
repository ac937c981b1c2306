//! Neighbouring-crystal crosstalk measurement.

use crate::dwell::DwellAccumulator;
use crate::engine::{DwellMeasurement, RunConfig, WindowSummary};
use crate::sequencer::SequenceState;
use calgen_core::channel::{ChannelArray, RngIdx, N_COLS, N_LYRS};
use calgen_core::event::CalEvent;
use calgen_core::plan::TestPlan;
use calgen_core::{CrosstalkTable, Error, Result};

/// Measures the signal induced in the columns adjacent to the pulsed one.
///
/// For every readout in column `c ± 1` the source channel is the same
/// face and range of the pulsed crystal in column `c` of that layer.
pub struct CrosstalkMeasurement {
    accumulators: ChannelArray<RngIdx, DwellAccumulator>,
    active: Vec<(RngIdx, RngIdx)>,
    table: CrosstalkTable,
}

impl CrosstalkMeasurement {
    /// Creates the measurement for `plan`.
    ///
    /// # Errors
    /// Returns a configuration error for broadcast plans, where the pulsed
    /// channel cannot be told apart from its neighbours.
    pub fn new(plan: &TestPlan, config: &RunConfig) -> Result<Self> {
        if plan.broadcast {
            return Err(Error::ConfigError(
                "crosstalk needs one column pulsed at a time, not broadcast mode".into(),
            ));
        }
        let domain = config.amplitude_domain;
        Ok(Self {
            accumulators: ChannelArray::from_fn(|_| DwellAccumulator::new(domain)),
            active: Vec::new(),
            table: CrosstalkTable::new(),
        })
    }
}

impl DwellMeasurement for CrosstalkMeasurement {
    type Output = CrosstalkTable;

    fn name(&self) -> &'static str {
        "crosstalk"
    }

    fn default_hits_per_tower(&self, _plan: &TestPlan) -> usize {
        N_LYRS * N_COLS
    }

    fn ingest(&mut self, event: &CalEvent, state: &SequenceState, window: usize) {
        let pulsed = state.channel;
        for hit in &event.hits {
            if hit.xtal.column().abs_diff(pulsed) != 1 {
                continue;
            }
            let Some(source_xtal) = hit.xtal.with_column(pulsed) else {
                continue;
            };
            for r in &hit.readouts {
                let dest = RngIdx::new(hit.xtal, r.face, r.range);
                if self.accumulators[dest].ingest(window, r.adc) {
                    self.active
                        .push((dest, RngIdx::new(source_xtal, r.face, r.range)));
                }
            }
        }
    }

    fn complete_window(
        &mut self,
        _state: &SequenceState,
        setting: f32,
        window: usize,
    ) -> WindowSummary {
        let mut summary = WindowSummary::default();
        for (dest, source) in self.active.drain(..) {
            let acc = &mut self.accumulators[dest];
            match acc.robust_stat(window) {
                Some(stat) => {
                    self.table.set_point(dest, source, setting, stat.mean);
                    summary.points += 1;
                }
                None => summary.empty_channels += 1,
            }
            acc.clear();
        }
        summary
    }

    fn finish(self) -> CrosstalkTable {
        self.table
    }
}
