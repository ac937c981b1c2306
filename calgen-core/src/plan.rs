//! Test plans: the declared timing of a charge-injection run.

use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A group of consecutive settings sharing one step size and pulse count.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SettingGroup {
    /// Spacing between consecutive setting values in this group.
    pub step: f32,
    /// Number of settings in this group.
    pub count: usize,
    /// Pulses per setting in this group, as a multiple of the plan's base.
    pub pulse_multiplier: usize,
}

impl SettingGroup {
    /// Creates a new setting group.
    pub fn new(step: f32, count: usize, pulse_multiplier: usize) -> Self {
        Self {
            step,
            count,
            pulse_multiplier,
        }
    }
}

/// Sequencing scheme used by the pulser.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Timing {
    /// Every setting gets `pulses_per_setting` pulses; all settings of one
    /// channel are completed before the next channel starts.
    Uniform,
    /// Settings are partitioned into groups with their own pulse
    /// multipliers. Each group is run over every channel before the next
    /// group starts.
    Grouped(Vec<SettingGroup>),
}

/// Immutable description of one calibration run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TestPlan {
    /// Base number of pulses per setting.
    pub pulses_per_setting: usize,
    /// Ordered setting values.
    pub settings: Vec<f32>,
    /// Number of channels tested in sequence (ignored in broadcast mode).
    pub channel_count: usize,
    /// All channels pulsed simultaneously.
    pub broadcast: bool,
    /// Sequencing scheme.
    pub timing: Timing,
}

impl Default for TestPlan {
    fn default() -> Self {
        Self::cidac_defaults()
    }
}

impl TestPlan {
    /// Creates a uniform-timing plan.
    pub fn new(pulses_per_setting: usize, settings: Vec<f32>, channel_count: usize) -> Self {
        Self {
            pulses_per_setting,
            settings,
            channel_count,
            broadcast: false,
            timing: Timing::Uniform,
        }
    }

    /// Standard charge-injection scan: 50 pulses per setting, one column
    /// at a time over 12 columns, with progressively coarser DAC steps.
    pub fn cidac_defaults() -> Self {
        Self::from_groups(
            50,
            &[
                SettingGroup::new(2.0, 32, 1),
                SettingGroup::new(8.0, 32, 1),
                SettingGroup::new(32.0, 32, 1),
                SettingGroup::new(128.0, 21, 1),
            ],
            crate::channel::N_COLS,
        )
        .with_timing(Timing::Uniform)
    }

    /// Creates a grouped-timing plan, generating setting values from the
    /// group step sizes starting at zero.
    pub fn from_groups(
        pulses_per_setting: usize,
        groups: &[SettingGroup],
        channel_count: usize,
    ) -> Self {
        let mut settings = Vec::with_capacity(groups.iter().map(|g| g.count).sum());
        let mut value = 0.0_f32;
        for group in groups {
            for _ in 0..group.count {
                if !settings.is_empty() {
                    value += group.step;
                }
                settings.push(value);
            }
        }

        Self {
            pulses_per_setting,
            settings,
            channel_count,
            broadcast: false,
            timing: Timing::Grouped(groups.to_vec()),
        }
    }

    /// Sets broadcast mode.
    #[must_use]
    pub fn with_broadcast(mut self, broadcast: bool) -> Self {
        self.broadcast = broadcast;
        self
    }

    /// Sets the sequencing scheme.
    #[must_use]
    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// Sets the channel count.
    #[must_use]
    pub fn with_channel_count(mut self, channel_count: usize) -> Self {
        self.channel_count = channel_count;
        self
    }

    /// Number of settings.
    #[must_use]
    pub fn settings_count(&self) -> usize {
        self.settings.len()
    }

    /// Number of channels tested one after another (1 in broadcast mode).
    #[must_use]
    pub fn sequential_channels(&self) -> usize {
        if self.broadcast {
            1
        } else {
            self.channel_count
        }
    }

    /// Total number of pulses the plan expects in the event stream.
    #[must_use]
    pub fn expected_events(&self) -> usize {
        let per_channel = match &self.timing {
            Timing::Uniform => self.settings.len() * self.pulses_per_setting,
            Timing::Grouped(groups) => groups
                .iter()
                .map(|g| g.count * g.pulse_multiplier * self.pulses_per_setting)
                .sum(),
        };
        per_channel * self.sequential_channels()
    }

    /// Checks internal consistency.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] describing the first inconsistency.
    pub fn validate(&self) -> Result<()> {
        if self.pulses_per_setting == 0 {
            return Err(Error::ConfigError("pulses_per_setting must be > 0".into()));
        }
        if self.settings.is_empty() {
            return Err(Error::ConfigError("test plan has no settings".into()));
        }
        if !self.broadcast && self.channel_count == 0 {
            return Err(Error::ConfigError(
                "channel_count must be > 0 in per-channel mode".into(),
            ));
        }
        if self.settings.windows(2).any(|w| w[1] < w[0]) {
            return Err(Error::ConfigError(
                "setting values must be non-decreasing".into(),
            ));
        }
        if let Timing::Grouped(groups) = &self.timing {
            let grouped: usize = groups.iter().map(|g| g.count).sum();
            if grouped != self.settings.len() {
                return Err(Error::ConfigError(format!(
                    "setting groups cover {grouped} settings, plan has {}",
                    self.settings.len()
                )));
            }
            if groups.iter().any(|g| g.count == 0 || g.pulse_multiplier == 0) {
                return Err(Error::ConfigError(
                    "setting groups need count > 0 and pulse_multiplier > 0".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Checks an observed event count against the plan's expectation.
///
/// The run is rejected when the counts differ by more than 10% of the
/// expected total.
///
/// # Errors
/// Returns [`Error::EventCountMismatch`] when outside tolerance.
pub fn validate_event_count(expected: usize, observed: usize) -> Result<()> {
    if observed.abs_diff(expected).saturating_mul(10) > expected {
        return Err(Error::EventCountMismatch { expected, observed });
    }
    Ok(())
}
