//! Integral nonlinearity measurement: amplitude vs. injected charge per channel.

use crate::dwell::DwellAccumulator;
use crate::engine::{DwellMeasurement, RunConfig, WindowSummary};
use crate::sequencer::SequenceState;
use calgen_core::channel::{ChannelArray, RngIdx, N_COLS, N_LYRS};
use calgen_core::event::CalEvent;
use calgen_core::plan::TestPlan;
use calgen_core::{CalibrationTable, CurvePoint};

/// Collects robust per-window means for every pulsed channel.
///
/// In per-channel mode the plan's channel is the crystal column being
/// pulsed: only hits in that column are sampled. In broadcast mode every
/// hit is sampled.
pub struct IntNonlinMeasurement {
    broadcast: bool,
    accumulators: ChannelArray<RngIdx, DwellAccumulator>,
    active: Vec<RngIdx>,
    table: CalibrationTable,
}

impl IntNonlinMeasurement {
    /// Creates the measurement for `plan`.
    #[must_use]
    pub fn new(plan: &TestPlan, config: &RunConfig) -> Self {
        let domain = config.amplitude_domain;
        Self {
            broadcast: plan.broadcast,
            accumulators: ChannelArray::from_fn(|_| DwellAccumulator::new(domain)),
            active: Vec::new(),
            table: CalibrationTable::new(),
        }
    }
}

impl DwellMeasurement for IntNonlinMeasurement {
    type Output = CalibrationTable;

    fn name(&self) -> &'static str {
        "intNonlin"
    }

    fn default_hits_per_tower(&self, plan: &TestPlan) -> usize {
        if plan.broadcast {
            N_LYRS * N_COLS
        } else {
            N_LYRS
        }
    }

    fn ingest(&mut self, event: &CalEvent, state: &SequenceState, window: usize) {
        for hit in &event.hits {
            if !self.broadcast && hit.xtal.column() != state.channel {
                continue;
            }
            for sample in hit.samples() {
                if self.accumulators[sample.channel].ingest(window, sample.amplitude) {
                    self.active.push(sample.channel);
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
        for channel in self.active.drain(..) {
            let acc = &mut self.accumulators[channel];
            match acc.robust_stat(window) {
                Some(stat) => {
                    self.table
                        .push(channel, CurvePoint::new(setting, stat.mean), stat.width);
                    summary.points += 1;
                }
                None => summary.empty_channels += 1,
            }
            acc.clear();
        }
        summary
    }

    fn finish(self) -> CalibrationTable {
        self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calgen_core::channel::{Face, Range, XtalIdx};
    use calgen_core::event::CalHit;

    fn hit(column: usize, adc: f32) -> CalHit {
        CalHit::new(XtalIdx::new(0, 0, column).unwrap()).with_readout(Face::Pos, Range::Lex8, adc)
    }

    fn state(channel: usize, sample_index: usize) -> SequenceState {
        SequenceState {
            channel,
            setting_index: 0,
            sample_index,
            pulses_per_setting: 2,
        }
    }

    #[test]
    fn test_only_pulsed_column_is_sampled() {
        let plan = TestPlan::new(2, vec![10.0], 12);
        let mut m = IntNonlinMeasurement::new(&plan, &RunConfig::default());

        let event = CalEvent::new(vec![hit(3, 100.0), hit(4, 900.0)]);
        m.ingest(&event, &state(3, 0), 0);
        m.ingest(&event, &state(3, 1), 0);
        let summary = m.complete_window(&state(3, 1), 10.0, 0);
        assert_eq!(summary.points, 1);

        let table = m.finish();
        let ch = RngIdx::new(XtalIdx::new(0, 0, 3).unwrap(), Face::Pos, Range::Lex8);
        assert_eq!(table.points(ch), &[CurvePoint::new(10.0, 100.0)]);
        assert_eq!(table.populated_channels(), 1);
    }

    #[test]
    fn test_out_of_domain_window_counts_as_empty() {
        let plan = TestPlan::new(1, vec![0.0], 12).with_broadcast(true);
        let mut m = IntNonlinMeasurement::new(&plan, &RunConfig::default());

        m.ingest(&CalEvent::new(vec![hit(0, 5000.0)]), &state(0, 0), 0);
        let summary = m.complete_window(&state(0, 0), 0.0, 0);
        assert_eq!(summary, WindowSummary { points: 0, empty_channels: 1 });
        assert_eq!(m.finish().total_points(), 0);
    }
}
