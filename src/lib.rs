//! A client-side feature flag library keeping a local cache of flag definitions in sync with a
//! remote source.
//!
//! # Overview
//!
//! The library revolves around a [`Client`] that serves flag definitions from an in-memory cache.
//! Lookups never leave the process: a background poller thread periodically fetches the flag
//! file through a [`Retriever`], parses it, atomically swaps the served cache and tells the
//! registered [`Notifier`]s what changed.
//!
//! ```no_run
//! use std::time::Duration;
//! use flagsync::{Client, ClientConfig, FileRetriever, WebhookConfig};
//!
//! let client = Client::new(
//!     ClientConfig::new(FileRetriever::new("flags.yaml"))
//!         .polling_interval(Duration::from_secs(10))
//!         .notifier(WebhookConfig::new("https://example.com/hook").secret("secret")),
//! )?;
//!
//! let flag = client.get_flag("test-flag");
//!
//! client.close()?;
//! # Ok::<(), flagsync::Error>(())
//! ```
//!
//! Several clients can run side by side without sharing anything. Applications needing a single
//! client can use the process-wide one through [`init`] and [`close`].
//!
//! # Refresh failures
//!
//! When retrieving or parsing the flag file fails during a refresh, the client keeps serving the
//! last retrieved flags and tries again on the next tick. Only configuration errors and errors
//! from the very first retrieval are returned to the application, the latter only if
//! [`ClientConfig::start_with_retriever_error`] is not set.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging
//! messages. Consider integrating a `log`-compatible logger implementation for better visibility
//! into refreshes and notifications.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod cache_store;
mod client;
mod config;
mod diff;
mod error;
mod exporter;
mod flag;
mod format;
mod global;
mod notification;
mod notifier;
mod poller;
mod retriever;

pub use cache_store::{CacheSnapshot, CacheStore};
pub use client::Client;
pub use config::ClientConfig;
pub use diff::{DiffCache, DiffUpdated};
pub use error::{Error, Result};
pub use exporter::{DataExporter, DataExporterConfig, FeatureEvent};
pub use flag::{Flag, FlagValue};
pub use format::FileFormat;
pub use global::{
    all_flags, cache_refresh_date, client, close, get_flag, get_flags_from_cache, init,
};
pub use notification::NotificationService;
pub use notifier::{
    LogNotifier, Notifier, NotifierConfig, SlackConfig, SlackNotifier, WebhookConfig,
    WebhookNotifier,
};
pub use poller::{PollerState, PollerThread};
pub use retriever::{FileRetriever, HttpRetriever, Retriever};
