use serde::{Deserialize, Serialize};

/// Definition of a single feature flag, as found in the flag file.
///
/// The cache treats a flag as an opaque value: it is only stored, compared and handed to
/// notifiers. Rule evaluation is left to the caller.
///
/// ```yaml
/// test-flag:
///   rule: key eq "random-key"
///   percentage: 100
///   true: true
///   false: false
///   default: false
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
    /// Targeting rule selecting the users this flag applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    /// Percentage of targeted users receiving the `true` variation.
    #[serde(default)]
    pub percentage: f64,
    /// Value served to users in the rollout.
    #[serde(rename = "true", default)]
    pub true_value: FlagValue,
    /// Value served to targeted users outside of the rollout.
    #[serde(rename = "false", default)]
    pub false_value: FlagValue,
    /// Value served to users not matching the rule.
    #[serde(default)]
    pub default: FlagValue,
    /// Whether the flag is turned off.
    #[serde(default)]
    pub disable: bool,
    /// Whether evaluations of this flag should be exported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_events: Option<bool>,
}

/// A variation value. Any JSON-compatible value is accepted.
pub type FlagValue = serde_json::Value;

impl Flag {
    /// Returns `true` unless the flag is disabled.
    pub fn is_enabled(&self) -> bool {
        !self.disable
    }

    /// Returns `true` if evaluations of this flag are exported. Defaults to `true`.
    pub fn tracks_events(&self) -> bool {
        self.track_events.unwrap_or(true)
    }
}
