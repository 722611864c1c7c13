use std::{sync::Arc, time::Duration};

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the crate.
///
/// Only configuration errors and (unless [`ClientConfig::start_with_retriever_error`] is set)
/// errors from the initial retrieval are ever returned to the application. Errors happening in
/// the background refresh and notification pipeline are logged and swallowed.
///
/// [`ClientConfig::start_with_retriever_error`]: crate::ClientConfig::start_with_retriever_error
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// No retriever was configured.
    #[error("no retriever in the configuration, impossible to get the flags")]
    MissingRetriever,

    /// Polling interval is below [`ClientConfig::MIN_POLLING_INTERVAL`].
    ///
    /// [`ClientConfig::MIN_POLLING_INTERVAL`]: crate::ClientConfig::MIN_POLLING_INTERVAL
    #[error("polling interval {0:?} is below the minimum of 1s")]
    InvalidPollingInterval(Duration),

    /// A notifier configuration could not be turned into a notifier.
    #[error("wrong configuration in your {notifier}: {source}")]
    InvalidNotifierConfig {
        /// Kind of notifier ("webhook", "slack notifier").
        notifier: &'static str,
        /// Underlying URL error.
        #[source]
        source: url::ParseError,
    },

    /// Invalid URL passed to [`HttpRetriever`](crate::HttpRetriever).
    #[error("invalid retriever url")]
    InvalidRetrieverUrl(#[source] url::ParseError),

    /// Unknown flag file format tag.
    #[error("unknown file format {0:?}, expected one of yaml, toml, json")]
    UnknownFileFormat(String),

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),

    /// Network error.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),

    /// Remote endpoint answered with a non-success status code.
    #[error("unexpected response status {0}")]
    UnexpectedStatus(u16),

    /// Error returned by a user-supplied retriever.
    #[error("retriever error: {0}")]
    Retriever(Arc<dyn std::error::Error + Send + Sync>),

    /// Flag file is not valid YAML.
    #[error("invalid yaml flag file")]
    Yaml(#[source] Arc<serde_yaml::Error>),

    /// Flag file is not valid TOML.
    #[error("invalid toml flag file")]
    Toml(#[source] toml::de::Error),

    /// Flag file is not valid JSON.
    #[error("invalid json flag file")]
    Json(#[source] Arc<serde_json::Error>),

    /// Error returned by a user-supplied notifier.
    #[error("notifier error: {0}")]
    Notifier(Arc<dyn std::error::Error + Send + Sync>),

    /// The process-wide client has not been initialized with [`init`](crate::init).
    #[error("client is not initialized, call flagsync::init first")]
    NotInitialized,

    /// Indicates that the poller thread panicked. This should normally never happen.
    #[error("poller thread panicked")]
    PollerThreadPanicked,
}

impl Error {
    /// Wrap an arbitrary error coming from a custom retriever.
    pub fn retriever(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Error {
        Error::Retriever(Arc::from(err.into()))
    }

    /// Wrap an arbitrary error coming from a custom notifier.
    pub fn notifier(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Error {
        Error::Notifier(Arc::from(err.into()))
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(value: serde_yaml::Error) -> Self {
        Error::Yaml(Arc::new(value))
    }
}

impl From<toml::de::Error> for Error {
    fn from(value: toml::de::Error) -> Self {
        Error::Toml(value)
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Json(Arc::new(value))
    }
}
