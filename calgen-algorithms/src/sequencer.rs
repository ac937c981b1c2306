//! Test sequencing: which channel and setting is live for a given event.
//!
//! The pulser never tags events with their position in the scan, so the
//! active `(channel, setting, sample)` triple is reconstructed from the
//! number of good events seen so far and the declared [`TestPlan`].
//! The triple is recomputed from scratch for every event rather than
//! incremented, so a skipped event can never make the sequence drift.

use calgen_core::plan::{TestPlan, Timing};
use calgen_core::Result;

/// Position within the test sequence for one good event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceState {
    /// Channel (column) under test; always 0 in broadcast mode.
    pub channel: usize,
    /// Index into the plan's setting list.
    pub setting_index: usize,
    /// Pulse number within the current dwell window.
    pub sample_index: usize,
    /// Length of the current dwell window.
    pub pulses_per_setting: usize,
}

impl SequenceState {
    /// True for the first pulse of a dwell window.
    #[inline]
    pub fn is_window_start(&self) -> bool {
        self.sample_index == 0
    }

    /// True for the last pulse of a dwell window, when statistics are read out.
    #[inline]
    pub fn is_window_end(&self) -> bool {
        self.sample_index + 1 == self.pulses_per_setting
    }
}

/// Event span of one setting group in the grouped scheme.
#[derive(Debug, Clone, Copy)]
struct GroupSpan {
    first_event: usize,
    last_event: usize,
    setting_offset: usize,
    pulses_per_setting: usize,
    pulses_per_channel: usize,
}

#[derive(Debug, Clone)]
enum Scheme {
    Standard {
        pulses_per_setting: usize,
        pulses_per_channel: usize,
        total_events: usize,
    },
    Grouped(Vec<GroupSpan>),
}

/// Maps good-event ordinals to sequence positions.
#[derive(Debug, Clone)]
pub struct TestSequencer {
    scheme: Scheme,
    broadcast: bool,
}

impl TestSequencer {
    /// Builds a sequencer for `plan`, precomputing group boundaries.
    ///
    /// # Errors
    /// Returns a configuration error if the plan is inconsistent.
    pub fn new(plan: &TestPlan) -> Result<Self> {
        plan.validate()?;

        let scheme = match &plan.timing {
            Timing::Uniform => Scheme::Standard {
                pulses_per_setting: plan.pulses_per_setting,
                pulses_per_channel: plan.settings_count() * plan.pulses_per_setting,
                total_events: plan.expected_events(),
            },
            Timing::Grouped(groups) => {
                let channels = plan.sequential_channels();
                let mut spans = Vec::with_capacity(groups.len());
                let mut first_event = 0;
                let mut setting_offset = 0;
                for group in groups {
                    let pulses_per_setting = plan.pulses_per_setting * group.pulse_multiplier;
                    let pulses_per_channel = group.count * pulses_per_setting;
                    let span_len = pulses_per_channel * channels;
                    spans.push(GroupSpan {
                        first_event,
                        last_event: first_event + span_len - 1,
                        setting_offset,
                        pulses_per_setting,
                        pulses_per_channel,
                    });
                    first_event += span_len;
                    setting_offset += group.count;
                }
                Scheme::Grouped(spans)
            }
        };

        Ok(Self {
            scheme,
            broadcast: plan.broadcast,
        })
    }

    /// Number of good events the plan covers.
    #[must_use]
    pub fn total_events(&self) -> usize {
        match &self.scheme {
            Scheme::Standard { total_events, .. } => *total_events,
            Scheme::Grouped(spans) => spans.last().map_or(0, |s| s.last_event + 1),
        }
    }

    /// Derives the sequence position of the good event `good_ordinal`.
    ///
    /// Returns `None` for ordinals past the end of the plan.
    #[must_use]
    pub fn derive_state(&self, good_ordinal: usize) -> Option<SequenceState> {
        if good_ordinal >= self.total_events() {
            return None;
        }

        let (local, setting_offset, pulses_per_setting, pulses_per_channel) = match &self.scheme {
            Scheme::Standard {
                pulses_per_setting,
                pulses_per_channel,
                ..
            } => (good_ordinal, 0, *pulses_per_setting, *pulses_per_channel),
            Scheme::Grouped(spans) => {
                let span = spans
                    .iter()
                    .find(|s| good_ordinal >= s.first_event && good_ordinal <= s.last_event)?;
                (
                    good_ordinal - span.first_event,
                    span.setting_offset,
                    span.pulses_per_setting,
                    span.pulses_per_channel,
                )
            }
        };

        let channel = if self.broadcast {
            0
        } else {
            local / pulses_per_channel
        };
        let within_channel = local % pulses_per_channel;

        Some(SequenceState {
            channel,
            setting_index: setting_offset + within_channel / pulses_per_setting,
            sample_index: within_channel % pulses_per_setting,
            pulses_per_setting,
        })
    }
}

/// Mutable event counters for one read pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventCursor {
    /// Events read from the source, including skipped ones.
    pub raw_ordinal: usize,
    /// Events accepted into the sequence.
    pub good_ordinal: usize,
}

impl EventCursor {
    /// Creates a cursor at the start of a pass.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Position the next good event would occupy.
    #[must_use]
    pub fn peek(&self, sequencer: &TestSequencer) -> Option<SequenceState> {
        sequencer.derive_state(self.good_ordinal)
    }

    /// Counts a raw event.
    pub fn advance_raw(&mut self) {
        self.raw_ordinal += 1;
    }

    /// Accepts the pending good event, returning its ordinal.
    pub fn accept(&mut self) -> usize {
        let ordinal = self.good_ordinal;
        self.good_ordinal += 1;
        ordinal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calgen_core::plan::SettingGroup;

    #[test]
    fn test_standard_scheme_mapping() {
        let plan = TestPlan::new(10, vec![0.0, 100.0, 200.0], 4);
        let seq = TestSequencer::new(&plan).unwrap();
        assert_eq!(seq.total_events(), 120);

        let s = seq.derive_state(0).unwrap();
        assert_eq!((s.channel, s.setting_index, s.sample_index), (0, 0, 0));
        let s = seq.derive_state(29).unwrap();
        assert_eq!((s.channel, s.setting_index, s.sample_index), (0, 2, 9));
        assert!(s.is_window_end());
        let s = seq.derive_state(30).unwrap();
        assert_eq!((s.channel, s.setting_index, s.sample_index), (1, 0, 0));
        assert!(s.is_window_start());
        let s = seq.derive_state(119).unwrap();
        assert_eq!((s.channel, s.setting_index, s.sample_index), (3, 2, 9));
        assert!(seq.derive_state(120).is_none());
    }

    #[test]
    fn test_derive_state_is_deterministic() {
        let plan = TestPlan::new(7, vec![0.0, 1.0, 2.0, 3.0, 4.0], 3);
        let seq = TestSequencer::new(&plan).unwrap();
        for ordinal in 0..seq.total_events() {
            assert_eq!(seq.derive_state(ordinal), seq.derive_state(ordinal));
        }
    }

    #[test]
    fn test_dwell_windows_are_complete() {
        let pulses = 6;
        let plan = TestPlan::new(pulses, vec![0.0, 5.0, 10.0, 15.0], 3);
        let seq = TestSequencer::new(&plan).unwrap();

        let mut runs: Vec<((usize, usize), usize)> = Vec::new();
        for ordinal in 0..seq.total_events() {
            let s = seq.derive_state(ordinal).unwrap();
            let key = (s.channel, s.setting_index);
            match runs.last_mut() {
                Some((last, len)) if *last == key => *len += 1,
                _ => runs.push((key, 1)),
            }
        }

        assert_eq!(runs.len(), 4 * 3);
        assert!(runs.iter().all(|(_, len)| *len == pulses));
    }

    #[test]
    fn test_broadcast_ignores_channel() {
        let plan = TestPlan::new(5, vec![0.0, 1.0], 12).with_broadcast(true);
        let seq = TestSequencer::new(&plan).unwrap();
        assert_eq!(seq.total_events(), 10);
        for ordinal in 0..10 {
            assert_eq!(seq.derive_state(ordinal).unwrap().channel, 0);
        }
        assert_eq!(seq.derive_state(7).unwrap().setting_index, 1);
        assert!(seq.derive_state(10).is_none());
    }

    #[test]
    fn test_grouped_scheme_mapping() {
        // Group 0: 2 settings x 2 pulses; group 1: 2 settings x 6 pulses.
        let plan = TestPlan::from_groups(
            2,
            &[SettingGroup::new(1.0, 2, 1), SettingGroup::new(10.0, 2, 3)],
            2,
        );
        let seq = TestSequencer::new(&plan).unwrap();
        // (2*2 + 2*6) * 2 channels
        assert_eq!(seq.total_events(), 32);

        // Group 0 covers ordinals 0..8, channel-major.
        let s = seq.derive_state(3).unwrap();
        assert_eq!((s.channel, s.setting_index, s.sample_index), (0, 1, 1));
        let s = seq.derive_state(4).unwrap();
        assert_eq!((s.channel, s.setting_index, s.sample_index), (1, 0, 0));

        // Group 1 starts at 8 with global setting offset 2.
        let s = seq.derive_state(8).unwrap();
        assert_eq!((s.channel, s.setting_index, s.sample_index), (0, 2, 0));
        assert_eq!(s.pulses_per_setting, 6);
        let s = seq.derive_state(19).unwrap();
        assert_eq!((s.channel, s.setting_index, s.sample_index), (0, 3, 5));
        assert!(s.is_window_end());
        let s = seq.derive_state(20).unwrap();
        assert_eq!((s.channel, s.setting_index, s.sample_index), (1, 2, 0));

        assert!(seq.derive_state(32).is_none());
    }

    #[test]
    fn test_grouped_scheme_matches_uniform_with_unit_multipliers() {
        let grouped = TestPlan::from_groups(
            4,
            &[SettingGroup::new(2.0, 3, 1), SettingGroup::new(4.0, 3, 1)],
            1,
        );
        let uniform = grouped.clone().with_timing(Timing::Uniform);
        let a = TestSequencer::new(&grouped).unwrap();
        let b = TestSequencer::new(&uniform).unwrap();
        assert_eq!(a.total_events(), b.total_events());
        for ordinal in 0..a.total_events() {
            assert_eq!(a.derive_state(ordinal), b.derive_state(ordinal));
        }
    }

    #[test]
    fn test_cursor_counts() {
        let plan = TestPlan::new(2, vec![0.0, 1.0], 1);
        let seq = TestSequencer::new(&plan).unwrap();
        let mut cursor = EventCursor::new();

        cursor.advance_raw();
        assert_eq!(cursor.peek(&seq).unwrap().sample_index, 0);
        assert_eq!(cursor.accept(), 0);
        cursor.advance_raw();
        cursor.advance_raw();
        assert_eq!(cursor.peek(&seq).unwrap().sample_index, 1);
        assert_eq!(cursor.raw_ordinal, 3);
        assert_eq!(cursor.good_ordinal, 1);
    }
}
