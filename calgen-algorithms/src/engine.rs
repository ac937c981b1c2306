//! Sequential event-processing engine shared by all dwell-window measurements.
//!
//! The engine owns the event cursor and decides, per event, whether it
//! belongs to the test sequence. Everything measurement-specific (which
//! hits to sample, where finished statistics go) lives behind the
//! [`DwellMeasurement`] trait.

use crate::dwell::ADC_DOMAIN;
use crate::limiter::WarningLimiter;
use crate::sequencer::{EventCursor, SequenceState, TestSequencer};
use calgen_core::event::{CalEvent, EventSource, TestConfig};
use calgen_core::plan::{validate_event_count, TestPlan};
use calgen_core::{Result, SourceError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Per-run engine settings.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Per-event warnings logged before suppression kicks in.
    pub warning_budget: usize,
    /// Required divisor of each event's hit count; `None` uses the
    /// measurement's default.
    pub hits_per_tower: Option<usize>,
    /// Allowed difference between an event's recorded setting and the
    /// setting implied by the sequence.
    pub setting_tolerance: f32,
    /// Accepted amplitude range `[lo, hi)`.
    pub amplitude_domain: (f32, f32),
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            warning_budget: 10,
            hits_per_tower: None,
            setting_tolerance: 0.5,
            amplitude_domain: ADC_DOMAIN,
        }
    }
}

impl RunConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the warning budget.
    #[must_use]
    pub fn with_warning_budget(mut self, budget: usize) -> Self {
        self.warning_budget = budget;
        self
    }

    /// Overrides the expected hits per tower.
    #[must_use]
    pub fn with_hits_per_tower(mut self, hits: usize) -> Self {
        self.hits_per_tower = Some(hits);
        self
    }

    /// Sets the setting-match tolerance.
    #[must_use]
    pub fn with_setting_tolerance(mut self, tolerance: f32) -> Self {
        self.setting_tolerance = tolerance;
        self
    }

    /// Sets the accepted amplitude domain.
    #[must_use]
    pub fn with_amplitude_domain(mut self, lo: f32, hi: f32) -> Self {
        self.amplitude_domain = (lo, hi);
        self
    }
}

/// Counters describing one read pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunStatistics {
    /// Events requested from the source.
    pub events_read: usize,
    /// Decoded events accepted into the test sequence.
    pub good_events: usize,
    /// Missing or malformed records. Each still occupies a sequence slot.
    pub source_errors: usize,
    /// Events whose hit count did not fit the readout layout.
    pub structural_skips: usize,
    /// Events whose recorded setting disagreed with the sequence.
    pub setting_mismatches: usize,
    /// Events arriving after the plan was exhausted.
    pub beyond_plan: usize,
    /// Dwell windows read out.
    pub windows_completed: usize,
    /// Calibration points recorded.
    pub points_recorded: usize,
    /// Channel windows that ended without any usable sample.
    pub empty_windows: usize,
    /// Warnings swallowed by the rate limiter.
    pub warnings_suppressed: usize,
}

/// What the engine did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Event advanced the sequence and was sampled.
    Accepted,
    /// Event advanced the sequence but its layout was wrong.
    StructuralSkip,
    /// Event's recorded setting disagreed; sequence not advanced.
    SettingMismatch,
    /// Record could not be read; its pulse still advanced the sequence.
    Unreadable,
    /// Plan already exhausted.
    BeyondPlan,
}

/// Result of reading out one dwell window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowSummary {
    /// Points pushed into the output table.
    pub points: usize,
    /// Channels sampled in this window that produced no statistic.
    pub empty_channels: usize,
}

/// A measurement driven by dwell windows.
pub trait DwellMeasurement {
    /// Finished product.
    type Output;

    /// Measurement name for logging.
    fn name(&self) -> &'static str;

    /// Hit-count divisor expected of every event for this measurement.
    fn default_hits_per_tower(&self, plan: &TestPlan) -> usize;

    /// Feeds the samples of one accepted event.
    fn ingest(&mut self, event: &CalEvent, state: &SequenceState, window: usize);

    /// Reads out the window that `state` closes, at setting value `setting`.
    fn complete_window(
        &mut self,
        state: &SequenceState,
        setting: f32,
        window: usize,
    ) -> WindowSummary;

    /// Consumes the measurement.
    fn finish(self) -> Self::Output;
}

/// Drives a [`DwellMeasurement`] over a strictly ordered event stream.
pub struct AccumulationEngine<'a, M: DwellMeasurement> {
    plan: &'a TestPlan,
    sequencer: TestSequencer,
    cursor: EventCursor,
    measurement: M,
    hits_per_tower: usize,
    setting_tolerance: f32,
    warnings: WarningLimiter,
    stats: RunStatistics,
}

impl<'a, M: DwellMeasurement> AccumulationEngine<'a, M> {
    /// Prepares an engine for one read pass over `plan`.
    ///
    /// # Errors
    /// Returns a configuration error if the plan is inconsistent.
    pub fn new(plan: &'a TestPlan, measurement: M, config: &RunConfig) -> Result<Self> {
        let sequencer = TestSequencer::new(plan)?;
        let hits_per_tower = config
            .hits_per_tower
            .unwrap_or_else(|| measurement.default_hits_per_tower(plan));
        Ok(Self {
            plan,
            sequencer,
            cursor: EventCursor::new(),
            measurement,
            hits_per_tower,
            setting_tolerance: config.setting_tolerance,
            warnings: WarningLimiter::new(config.warning_budget),
            stats: RunStatistics::default(),
        })
    }

    /// Number of events the plan expects.
    #[must_use]
    pub fn expected_events(&self) -> usize {
        self.sequencer.total_events()
    }

    /// Current cursor position.
    #[must_use]
    pub fn cursor(&self) -> EventCursor {
        self.cursor
    }

    /// Counters so far.
    #[must_use]
    pub fn statistics(&self) -> &RunStatistics {
        &self.stats
    }

    fn config_matches(&self, config: &TestConfig, state: &SequenceState, setting: f32) -> bool {
        if (config.setting - setting).abs() > self.setting_tolerance {
            return false;
        }
        match config.column {
            Some(column) if !self.plan.broadcast => usize::from(column) == state.channel,
            _ => true,
        }
    }

    /// Processes the next event in file order.
    pub fn process_event(&mut self, event: &CalEvent) -> EventOutcome {
        let raw = self.cursor.raw_ordinal;
        self.cursor.advance_raw();
        self.stats.events_read += 1;

        let Some(state) = self.cursor.peek(&self.sequencer) else {
            self.stats.beyond_plan += 1;
            self.warnings.warn(format_args!(
                "event {raw}: test plan exhausted after {} good events, ignoring",
                self.cursor.good_ordinal
            ));
            return EventOutcome::BeyondPlan;
        };
        let setting = self.plan.settings[state.setting_index];

        if let Some(config) = &event.config {
            if !self.config_matches(config, &state, setting) {
                self.stats.setting_mismatches += 1;
                self.warnings.warn(format_args!(
                    "event {raw}: recorded setting {} (column {:?}) does not match expected \
                     setting {setting} on channel {}, skipping",
                    config.setting, config.column, state.channel
                ));
                return EventOutcome::SettingMismatch;
            }
        }

        let good = self.cursor.accept();
        self.stats.good_events += 1;
        let window = good - state.sample_index;

        let outcome = if self.hits_per_tower > 0 && event.hits.len() % self.hits_per_tower != 0 {
            self.stats.structural_skips += 1;
            self.warnings.warn(format_args!(
                "event {raw}: {} hits is not a multiple of {} per tower, skipping samples",
                event.hits.len(),
                self.hits_per_tower
            ));
            EventOutcome::StructuralSkip
        } else {
            self.measurement.ingest(event, &state, window);
            EventOutcome::Accepted
        };

        self.close_window_at(&state, window, raw);
        outcome
    }

    /// Reads out the dwell window if `state` is its last pulse.
    fn close_window_at(&mut self, state: &SequenceState, window: usize, raw: usize) {
        if !state.is_window_end() {
            return;
        }
        let setting = self.plan.settings[state.setting_index];
        let summary = self.measurement.complete_window(state, setting, window);
        self.stats.windows_completed += 1;
        self.stats.points_recorded += summary.points;
        self.stats.empty_windows += summary.empty_channels;
        log::debug!(
            "{}: window ending at event {raw} (channel {}, setting {setting}) gave {} points",
            self.measurement.name(),
            state.channel,
            summary.points
        );
        if summary.empty_channels > 0 {
            self.warnings.warn(format_args!(
                "{} channel(s) had no usable samples at setting {setting}",
                summary.empty_channels
            ));
        }
    }

    /// Accounts for an event the source could not provide.
    ///
    /// The pulse behind a lost record still happened, so it occupies its
    /// slot in the sequence: the cursor advances, nothing is sampled, and
    /// a window ending on that slot is read out as usual.
    pub fn record_source_error(&mut self, error: &SourceError) -> EventOutcome {
        let raw = self.cursor.raw_ordinal;
        self.cursor.advance_raw();
        self.stats.events_read += 1;
        self.stats.source_errors += 1;

        let Some(state) = self.cursor.peek(&self.sequencer) else {
            self.stats.beyond_plan += 1;
            self.warnings.warn(format_args!("{error}, past the end of the plan"));
            return EventOutcome::BeyondPlan;
        };
        self.warnings.warn(format_args!(
            "{error}, pulse {} of setting {} skipped",
            state.sample_index, state.setting_index
        ));
        let good = self.cursor.accept();
        self.close_window_at(&state, good - state.sample_index, raw);
        EventOutcome::Unreadable
    }

    /// Ends the pass, returning the measurement product and counters.
    pub fn finish(mut self) -> (M::Output, RunStatistics) {
        let expected = self.sequencer.total_events();
        if self.cursor.good_ordinal < expected {
            log::warn!(
                "{}: stream ended after {} of {} planned events",
                self.measurement.name(),
                self.cursor.good_ordinal,
                expected
            );
        }
        self.stats.warnings_suppressed = self.warnings.suppressed();
        if self.stats.warnings_suppressed > 0 {
            log::info!(
                "{} further event warnings were suppressed",
                self.stats.warnings_suppressed
            );
        }
        (self.measurement.finish(), self.stats)
    }

    /// Validates the source against the plan, then consumes it in order.
    ///
    /// # Errors
    /// Returns [`calgen_core::Error::EventCountMismatch`] when the source
    /// holds more than 10% more or fewer events than planned. Per-event
    /// problems are logged and skipped.
    pub fn run<S: EventSource + ?Sized>(
        mut self,
        source: &mut S,
    ) -> Result<(M::Output, RunStatistics)> {
        let observed = source.event_count();
        validate_event_count(self.expected_events(), observed)?;
        log::info!(
            "{}: processing {observed} events ({} expected)",
            self.measurement.name(),
            self.expected_events()
        );

        for ordinal in 0..observed {
            match source.event(ordinal) {
                Ok(event) => {
                    self.process_event(&event);
                }
                Err(error) => {
                    self.record_source_error(&error);
                }
            }
        }

        let (output, stats) = self.finish();
        log::info!(
            "pass complete: {} good events, {} windows, {} points",
            stats.good_events,
            stats.windows_completed,
            stats.points_recorded
        );
        Ok((output, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intnonlin::IntNonlinMeasurement;
    use calgen_core::channel::{Face, Range, RngIdx, XtalIdx};
    use calgen_core::event::CalHit;

    fn event(adc: f32) -> CalEvent {
        CalEvent::new(vec![
            CalHit::new(XtalIdx::new(0, 0, 0).unwrap()).with_readout(Face::Pos, Range::Lex8, adc)
        ])
        .with_config(TestConfig {
            setting: if adc < 500.0 { 0.0 } else { 10.0 },
            column: None,
        })
    }

    fn engine(plan: &TestPlan) -> AccumulationEngine<'_, IntNonlinMeasurement> {
        let config = RunConfig::default().with_hits_per_tower(1);
        let m = IntNonlinMeasurement::new(plan, &config);
        AccumulationEngine::new(plan, m, &config).unwrap()
    }

    #[test]
    fn test_lost_record_consumes_its_slot() {
        let plan = TestPlan::new(3, vec![0.0, 10.0], 12).with_broadcast(true);
        let mut eng = engine(&plan);

        assert_eq!(eng.process_event(&event(100.0)), EventOutcome::Accepted);
        assert_eq!(
            eng.record_source_error(&SourceError::Missing(1)),
            EventOutcome::Unreadable
        );
        assert_eq!(eng.cursor().good_ordinal, 2);
        assert_eq!(eng.cursor().raw_ordinal, 2);
        eng.process_event(&event(102.0));

        // Next setting's tag lines up with the sequence.
        for _ in 0..3 {
            assert_eq!(eng.process_event(&event(900.0)), EventOutcome::Accepted);
        }
        let (table, stats) = eng.finish();
        assert_eq!(stats.setting_mismatches, 0);
        assert_eq!(stats.windows_completed, 2);

        let ch = RngIdx::new(XtalIdx::new(0, 0, 0).unwrap(), Face::Pos, Range::Lex8);
        let points = table.points(ch);
        assert_eq!(points.len(), 2);
        assert!((points[0].amplitude - 101.0).abs() < 1e-4);
        assert!((points[1].amplitude - 900.0).abs() < 1e-4);
    }

    #[test]
    fn test_lost_record_at_window_end_reads_out_window() {
        let plan = TestPlan::new(2, vec![0.0, 10.0], 12).with_broadcast(true);
        let mut eng = engine(&plan);

        eng.process_event(&event(100.0));
        eng.record_source_error(&SourceError::Malformed {
            ordinal: 1,
            reason: "truncated".into(),
        });
        assert_eq!(eng.statistics().windows_completed, 1);
        assert_eq!(eng.statistics().points_recorded, 1);
        assert_eq!(eng.statistics().source_errors, 1);
        assert_eq!(eng.statistics().good_events, 1);
    }

    #[test]
    fn test_lost_record_past_plan() {
        let plan = TestPlan::new(1, vec![0.0], 12).with_broadcast(true);
        let mut eng = engine(&plan);
        eng.process_event(&event(100.0));
        assert_eq!(
            eng.record_source_error(&SourceError::Missing(1)),
            EventOutcome::BeyondPlan
        );
        assert_eq!(eng.cursor().good_ordinal, 1);
    }
}
