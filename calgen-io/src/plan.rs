//! JSON test plan loading.
//!
//! ```json
//! {
//!   "pulses_per_setting": 50,
//!   "channel_count": 12,
//!   "broadcast": false,
//!   "setting_groups": [
//!     { "step": 2.0, "count": 32 },
//!     { "step": 8.0, "count": 32, "pulse_multiplier": 2 }
//!   ],
//!   "timing": "grouped"
//! }
//! ```
//!
//! Either `settings` (explicit values) or `setting_groups` must be given.
//! Missing fields take the standard charge-injection scan values.

use crate::{Error, Result};
use calgen_core::channel::N_COLS;
use calgen_core::plan::{SettingGroup, TestPlan, Timing};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Deserialize)]
#[serde(default)]
struct JsonPlan {
    pulses_per_setting: usize,
    settings: Option<Vec<f32>>,
    setting_groups: Option<Vec<JsonGroup>>,
    channel_count: usize,
    broadcast: bool,
    timing: JsonTiming,
}

impl Default for JsonPlan {
    fn default() -> Self {
        Self {
            pulses_per_setting: 50,
            settings: None,
            setting_groups: None,
            channel_count: N_COLS,
            broadcast: false,
            timing: JsonTiming::Uniform,
        }
    }
}

#[derive(Deserialize)]
struct JsonGroup {
    step: f32,
    count: usize,
    #[serde(default = "default_multiplier")]
    pulse_multiplier: usize,
}

fn default_multiplier() -> usize {
    1
}

#[derive(Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum JsonTiming {
    #[default]
    Uniform,
    Grouped,
}

impl JsonPlan {
    fn into_plan(self) -> Result<TestPlan> {
        let plan = match (self.settings, self.setting_groups) {
            (Some(settings), None) => {
                if self.timing == JsonTiming::Grouped {
                    return Err(Error::InvalidFormat(
                        "grouped timing needs \"setting_groups\"".into(),
                    ));
                }
                TestPlan::new(self.pulses_per_setting, settings, self.channel_count)
            }
            (None, Some(groups)) => {
                let groups: Vec<_> = groups
                    .into_iter()
                    .map(|g| SettingGroup::new(g.step, g.count, g.pulse_multiplier))
                    .collect();
                let plan =
                    TestPlan::from_groups(self.pulses_per_setting, &groups, self.channel_count);
                match self.timing {
                    JsonTiming::Grouped => plan,
                    JsonTiming::Uniform => plan.with_timing(Timing::Uniform),
                }
            }
            (Some(_), Some(_)) => {
                return Err(Error::InvalidFormat(
                    "give either \"settings\" or \"setting_groups\", not both".into(),
                ))
            }
            (None, None) => {
                return Err(Error::InvalidFormat(
                    "test plan has neither \"settings\" nor \"setting_groups\"".into(),
                ))
            }
        };

        let plan = plan.with_broadcast(self.broadcast);
        plan.validate()?;
        Ok(plan)
    }
}

/// Loads a test plan from a JSON file.
///
/// # Errors
/// Returns an error if the file cannot be read, is not valid JSON, or
/// describes an inconsistent plan.
pub fn load_test_plan<P: AsRef<Path>>(path: P) -> Result<TestPlan> {
    let file = File::open(path)?;
    let json: JsonPlan = serde_json::from_reader(BufReader::new(file))?;
    json.into_plan()
}

/// Parses a test plan from a JSON string.
///
/// # Errors
/// Returns an error if the string is not valid JSON or describes an
/// inconsistent plan.
pub fn test_plan_from_json(json: &str) -> Result<TestPlan> {
    let json: JsonPlan = serde_json::from_str(json)?;
    json.into_plan()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_settings() {
        let plan = test_plan_from_json(
            r#"{"pulses_per_setting": 10, "settings": [0, 100, 200], "broadcast": true}"#,
        )
        .unwrap();
        assert_eq!(plan.pulses_per_setting, 10);
        assert_eq!(plan.settings, vec![0.0, 100.0, 200.0]);
        assert_eq!(plan.channel_count, 12);
        assert!(plan.broadcast);
        assert_eq!(plan.timing, Timing::Uniform);
        assert_eq!(plan.expected_events(), 30);
    }

    #[test]
    fn test_setting_groups() {
        let json = r#"{
            "pulses_per_setting": 5,
            "channel_count": 2,
            "setting_groups": [
                {"step": 1.0, "count": 3},
                {"step": 10.0, "count": 2, "pulse_multiplier": 4}
            ]
        }"#;
        let uniform = test_plan_from_json(json).unwrap();
        assert_eq!(uniform.settings, vec![0.0, 1.0, 2.0, 12.0, 22.0]);
        assert_eq!(uniform.timing, Timing::Uniform);
        assert_eq!(uniform.expected_events(), 5 * 5 * 2);

        let grouped =
            test_plan_from_json(&json.replacen('{', r#"{"timing": "grouped","#, 1)).unwrap();
        assert!(matches!(grouped.timing, Timing::Grouped(ref g) if g.len() == 2));
        assert_eq!(grouped.expected_events(), 110);
    }

    #[test]
    fn test_rejects_ambiguous_or_empty_plans() {
        assert!(matches!(
            test_plan_from_json("{}"),
            Err(Error::InvalidFormat(_))
        ));
        assert!(matches!(
            test_plan_from_json(
                r#"{"settings": [1], "setting_groups": [{"step": 1, "count": 1}]}"#
            ),
            Err(Error::InvalidFormat(_))
        ));
        assert!(matches!(
            test_plan_from_json(r#"{"settings": [1], "timing": "grouped"}"#),
            Err(Error::InvalidFormat(_))
        ));
        assert!(matches!(
            test_plan_from_json(r#"{"settings": [5, 1]}"#),
            Err(Error::CoreError(_))
        ));
        assert!(matches!(
            test_plan_from_json("{"),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), r#"{"settings": [0, 4, 8], "channel_count": 3}"#).unwrap();
        let plan = load_test_plan(file.path()).unwrap();
        assert_eq!(plan.expected_events(), 3 * 50 * 3);
    }
}
