use std::{sync::Arc, time::Duration};

use crate::{
    exporter::DataExporterConfig, notifier::NotifierConfig, retriever::Retriever, Client, Error,
    FileFormat, Result,
};

/// Configuration for [`Client`].
///
/// ```
/// # use std::time::Duration;
/// # use flagsync::{ClientConfig, FileRetriever};
/// let config = ClientConfig::new(FileRetriever::new("flags.yaml"))
///     .polling_interval(Duration::from_secs(10))
///     .environment("production");
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    pub(crate) retriever: Option<Arc<dyn Retriever>>,
    pub(crate) polling_interval: Duration,
    pub(crate) environment: String,
    pub(crate) offline: bool,
    pub(crate) start_with_retriever_error: bool,
    pub(crate) file_format: FileFormat,
    pub(crate) notifiers: Vec<NotifierConfig>,
    pub(crate) log_notifier: bool,
    pub(crate) data_exporter: Option<DataExporterConfig>,
    pub(crate) name: String,
}

impl Default for ClientConfig {
    /// A configuration without retriever. [`ClientConfig::retriever`] must be called before
    /// building a client.
    fn default() -> ClientConfig {
        ClientConfig {
            retriever: None,
            polling_interval: ClientConfig::DEFAULT_POLLING_INTERVAL,
            environment: String::new(),
            offline: false,
            start_with_retriever_error: false,
            file_format: FileFormat::default(),
            notifiers: Vec::new(),
            log_notifier: true,
            data_exporter: None,
            name: ClientConfig::DEFAULT_NAME.to_owned(),
        }
    }
}

impl ClientConfig {
    /// Default value for [`ClientConfig::polling_interval`].
    pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(60);
    /// Smallest accepted polling interval.
    pub const MIN_POLLING_INTERVAL: Duration = Duration::from_secs(1);
    /// Default value for [`ClientConfig::name`].
    pub const DEFAULT_NAME: &'static str = "flagsync";

    /// Create a default configuration fetching flags with `retriever`.
    pub fn new(retriever: impl Retriever + 'static) -> ClientConfig {
        ClientConfig::default().retriever(retriever)
    }

    /// Set the component fetching the flag file.
    pub fn retriever(mut self, retriever: impl Retriever + 'static) -> ClientConfig {
        self.retriever = Some(Arc::new(retriever));
        self
    }

    /// Set the time between two refreshes. Must be at least one second; ignored when offline.
    pub fn polling_interval(mut self, interval: Duration) -> ClientConfig {
        self.polling_interval = interval;
        self
    }

    /// Set the environment, made available to flag evaluation as is.
    pub fn environment(mut self, environment: impl Into<String>) -> ClientConfig {
        self.environment = environment.into();
        self
    }

    /// In offline mode the client never retrieves flags, never refreshes and never notifies.
    pub fn offline(mut self, offline: bool) -> ClientConfig {
        self.offline = offline;
        self
    }

    /// If `true`, a failing initial retrieval does not fail [`Client::new`]. The client starts
    /// with an empty cache and gets filled by the next successful refresh.
    pub fn start_with_retriever_error(mut self, start_with_retriever_error: bool) -> ClientConfig {
        self.start_with_retriever_error = start_with_retriever_error;
        self
    }

    /// Set the format of the flag file. Defaults to YAML.
    pub fn file_format(mut self, file_format: FileFormat) -> ClientConfig {
        self.file_format = file_format;
        self
    }

    /// Set the format of the flag file from its name (`"yaml"`, `"toml"` or `"json"`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownFileFormat`] for any other name.
    pub fn file_format_str(self, file_format: &str) -> Result<ClientConfig> {
        Ok(self.file_format(file_format.parse()?))
    }

    /// Register a notifier called with the changes of every refresh.
    pub fn notifier(mut self, notifier: impl Into<NotifierConfig>) -> ClientConfig {
        self.notifiers.push(notifier.into());
        self
    }

    /// Enable or disable the built-in notifier writing changes to the log. Enabled by default.
    pub fn log_notifier(mut self, enabled: bool) -> ClientConfig {
        self.log_notifier = enabled;
        self
    }

    /// Set the data exporter configuration.
    pub fn data_exporter(mut self, data_exporter: DataExporterConfig) -> ClientConfig {
        self.data_exporter = Some(data_exporter);
        self
    }

    /// Set the prefix of background thread names. Defaults to `"flagsync"`.
    pub fn name(mut self, name: impl Into<String>) -> ClientConfig {
        self.name = name.into();
        self
    }

    /// Check the settings that do not require building any component.
    pub(crate) fn validate(&self) -> Result<Arc<dyn Retriever>> {
        let retriever = self.retriever.clone().ok_or(Error::MissingRetriever)?;
        if !self.offline && self.polling_interval < ClientConfig::MIN_POLLING_INTERVAL {
            return Err(Error::InvalidPollingInterval(self.polling_interval));
        }
        Ok(retriever)
    }

    /// Create a new [`Client`] using this configuration.
    ///
    /// See [`Client::new`].
    pub fn to_client(self) -> Result<Client> {
        Client::new(self)
    }
}
