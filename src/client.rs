use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};

use crate::{
    cache_store::{CacheSnapshot, CacheStore},
    exporter::DataExporterConfig,
    notification::NotificationService,
    notifier::{LogNotifier, Notifier},
    poller::{PollerState, PollerThread, Refresher},
    ClientConfig, Flag, Result,
};

/// A self-contained feature flag client.
///
/// Each client owns its cache, its poller thread and its notifiers. Several clients can live in
/// the same process without sharing anything.
///
/// Flag lookups only read the local cache: they never block on a refresh and never fail because
/// the flag source is unavailable.
///
/// # Examples
/// ```no_run
/// # use std::time::Duration;
/// # use flagsync::{Client, ClientConfig, FileRetriever};
/// let client = Client::new(
///     ClientConfig::new(FileRetriever::new("flags.yaml")).polling_interval(Duration::from_secs(5)),
/// )?;
///
/// if let Some(flag) = client.get_flag("test-flag") {
///     println!("{:?}", flag);
/// }
///
/// client.close()?;
/// # Ok::<(), flagsync::Error>(())
/// ```
pub struct Client {
    cache_store: Arc<CacheStore>,
    notifications: Arc<NotificationService>,
    poller: Option<PollerThread>,
    environment: String,
    offline: bool,
    data_exporter: Option<DataExporterConfig>,
}

impl Client {
    /// Create a new `Client` using the specified configuration.
    ///
    /// Unless the client is offline, the flags are retrieved once before this function returns and
    /// a poller thread is started to refresh them at the configured interval.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingRetriever`](crate::Error::MissingRetriever) if no retriever is configured.
    /// - [`Error::InvalidPollingInterval`](crate::Error::InvalidPollingInterval) if the interval is
    ///   below one second.
    /// - [`Error::InvalidNotifierConfig`](crate::Error::InvalidNotifierConfig) if a notifier cannot
    ///   be built.
    /// - Any retrieval or parse error from the initial refresh, unless
    ///   [`ClientConfig::start_with_retriever_error`] is set.
    pub fn new(config: ClientConfig) -> Result<Client> {
        let retriever = config.validate()?;

        let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::with_capacity(config.notifiers.len() + 1);
        if config.log_notifier {
            notifiers.push(Arc::new(LogNotifier));
        }
        for notifier in &config.notifiers {
            notifiers.push(notifier.build()?);
        }

        let cache_store = Arc::new(CacheStore::new());

        if config.offline {
            // Notifiers are built to validate their configuration but never run offline.
            log::debug!(target: "flagsync", "client started in offline mode");
            return Ok(Client {
                cache_store,
                notifications: Arc::new(NotificationService::new(Vec::new(), &config.name)),
                poller: None,
                environment: config.environment,
                offline: true,
                data_exporter: None,
            });
        }

        let notifications = Arc::new(NotificationService::new(notifiers, &config.name));

        let refresher = Arc::new(Refresher {
            retriever,
            file_format: config.file_format,
            store: Arc::clone(&cache_store),
            notifications: Arc::clone(&notifications),
        });

        if let Err(err) = refresher.refresh() {
            if !config.start_with_retriever_error {
                notifications.drain();
                return Err(err);
            }
            log::warn!(target: "flagsync", "impossible to retrieve the flags, starting with an empty cache: {}", err);
        }

        let poller = match PollerThread::start(refresher, config.polling_interval, &config.name) {
            Ok(poller) => poller,
            Err(err) => {
                notifications.drain();
                return Err(err);
            }
        };

        Ok(Client {
            cache_store,
            notifications,
            poller: Some(poller),
            environment: config.environment,
            offline: false,
            data_exporter: config.data_exporter,
        })
    }

    /// Get the current definition of a flag. Returns `None` if the flag is unknown, in which case
    /// the caller should serve its own default value.
    pub fn get_flag(&self, name: &str) -> Option<Flag> {
        let flag = self.cache_store.get(name);
        if flag.is_none() {
            log::trace!(target: "flagsync", flag_key = name; "flag not found in cache");
        }
        flag
    }

    /// Get the whole current snapshot, including its refresh date.
    pub fn all_flags(&self) -> Arc<CacheSnapshot> {
        self.cache_store.snapshot()
    }

    /// Get a copy of every flag currently in the cache.
    pub fn get_flags_from_cache(&self) -> Result<HashMap<String, Flag>> {
        Ok(self.cache_store.snapshot().flags().clone())
    }

    /// Time of the last successful refresh. `None` if flags were never retrieved (offline mode or
    /// failing initial retrieval).
    pub fn cache_refresh_date(&self) -> Option<DateTime<Utc>> {
        self.cache_store.refreshed_at()
    }

    /// The configured environment.
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// `true` if the client was created in offline mode.
    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// Data exporter configuration. Always `None` in offline mode.
    pub fn data_exporter(&self) -> Option<&DataExporterConfig> {
        self.data_exporter.as_ref()
    }

    /// State of the poller thread. Offline clients are always [`PollerState::Stopped`].
    pub fn poller_state(&self) -> PollerState {
        self.poller
            .as_ref()
            .map_or(PollerState::Stopped, PollerThread::state)
    }

    /// Stop refreshing the flags and wait for pending notifications to be delivered.
    ///
    /// The cache keeps serving the last retrieved flags. Calling `close()` several times is safe.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PollerThreadPanicked`](crate::Error::PollerThreadPanicked) if the poller
    /// thread has panicked.
    pub fn close(&self) -> Result<()> {
        let result = match &self.poller {
            Some(poller) => poller.shutdown(),
            None => Ok(()),
        };
        self.notifications.drain();
        result
    }
}
