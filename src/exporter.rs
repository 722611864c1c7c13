//! Boundary of the data exporter: the component collecting flag evaluation events.
//!
//! Batching and flushing are implemented by the exporter itself. The client only validates the
//! configuration and hands it out.
use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{FlagValue, Result};

/// An evaluation event sent to a [`DataExporter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureEvent {
    /// Kind of event, `"feature"` for flag evaluations.
    pub kind: String,
    /// Kind of evaluation context, `"user"` or `"anonymousUser"`.
    pub context_kind: String,
    /// Key of the evaluated user.
    pub user_key: String,
    /// Creation time in seconds since the Unix epoch.
    pub creation_date: i64,
    /// Evaluated flag.
    pub key: String,
    /// Name of the served variation.
    pub variation: String,
    /// Served value.
    pub value: FlagValue,
    /// `true` if the SDK default value was served.
    pub default: bool,
}

/// A sink for [`FeatureEvent`]s.
pub trait DataExporter: Send + Sync {
    /// Export a batch of events.
    fn export(&self, events: &[FeatureEvent]) -> Result<()>;

    /// `true` if the exporter expects events in batches, `false` if it wants them one at a time.
    fn is_bulk(&self) -> bool {
        true
    }
}

impl<T: Fn(&[FeatureEvent]) -> Result<()> + Send + Sync> DataExporter for T {
    fn export(&self, events: &[FeatureEvent]) -> Result<()> {
        self(events)
    }
}

/// Configuration of the data exporter.
#[derive(Clone)]
pub struct DataExporterConfig {
    pub(crate) flush_interval: Duration,
    pub(crate) max_event_in_memory: usize,
    pub(crate) exporter: Arc<dyn DataExporter>,
}

impl DataExporterConfig {
    /// Default value for [`DataExporterConfig::flush_interval`].
    pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);
    /// Default value for [`DataExporterConfig::max_event_in_memory`].
    pub const DEFAULT_MAX_EVENT_IN_MEMORY: usize = 100_000;

    /// Create a configuration for `exporter` using default flush settings.
    pub fn new(exporter: impl DataExporter + 'static) -> DataExporterConfig {
        DataExporterConfig {
            flush_interval: DataExporterConfig::DEFAULT_FLUSH_INTERVAL,
            max_event_in_memory: DataExporterConfig::DEFAULT_MAX_EVENT_IN_MEMORY,
            exporter: Arc::new(exporter),
        }
    }

    /// Time between two flushes. Zero selects the default.
    pub fn with_flush_interval(mut self, flush_interval: Duration) -> DataExporterConfig {
        self.flush_interval = if flush_interval.is_zero() {
            DataExporterConfig::DEFAULT_FLUSH_INTERVAL
        } else {
            flush_interval
        };
        self
    }

    /// Number of buffered events triggering a flush. Zero selects the default.
    pub fn with_max_event_in_memory(mut self, max_event_in_memory: usize) -> DataExporterConfig {
        self.max_event_in_memory = if max_event_in_memory == 0 {
            DataExporterConfig::DEFAULT_MAX_EVENT_IN_MEMORY
        } else {
            max_event_in_memory
        };
        self
    }

    /// Time between two flushes.
    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// Number of buffered events triggering a flush.
    pub fn max_event_in_memory(&self) -> usize {
        self.max_event_in_memory
    }

    /// The exporter itself.
    pub fn exporter(&self) -> &Arc<dyn DataExporter> {
        &self.exporter
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{DataExporterConfig, FeatureEvent};
    use crate::Result;

    fn exporter(_: &[FeatureEvent]) -> Result<()> {
        Ok(())
    }

    #[test]
    fn defaults() {
        let config = DataExporterConfig::new(exporter);
        assert_eq!(config.flush_interval(), Duration::from_secs(60));
        assert_eq!(config.max_event_in_memory(), 100_000);
        assert!(config.exporter().is_bulk());
    }

    #[test]
    fn zero_values_fall_back_to_defaults() {
        let config = DataExporterConfig::new(exporter)
            .with_flush_interval(Duration::ZERO)
            .with_max_event_in_memory(0);
        assert_eq!(
            config.flush_interval(),
            DataExporterConfig::DEFAULT_FLUSH_INTERVAL
        );
        assert_eq!(
            config.max_event_in_memory(),
            DataExporterConfig::DEFAULT_MAX_EVENT_IN_MEMORY
        );

        let config = DataExporterConfig::new(exporter)
            .with_flush_interval(Duration::from_secs(10))
            .with_max_event_in_memory(1000);
        assert_eq!(config.flush_interval(), Duration::from_secs(10));
        assert_eq!(config.max_event_in_memory(), 1000);
    }

    #[test]
    fn exports_through_the_trait() {
        let config = DataExporterConfig::new(exporter);
        let event = FeatureEvent {
            kind: "feature".to_owned(),
            context_kind: "user".to_owned(),
            user_key: "random-key".to_owned(),
            creation_date: 1_617_970_547,
            key: "test-flag".to_owned(),
            variation: "True".to_owned(),
            value: serde_json::json!(true),
            default: false,
        };
        assert!(config.exporter().export(&[event]).is_ok());
    }
}
