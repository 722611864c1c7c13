//! A background poller thread that periodically retrieves the flag file, installs it in the
//! cache store and notifies about the changes.
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::RecvTimeoutError,
        Arc, Mutex, MutexGuard,
    },
    thread::JoinHandle,
    time::Duration,
};

use derive_more::Display;

use crate::{
    cache_store::CacheStore, notification::NotificationService, retriever::Retriever, Error,
    FileFormat, Result,
};

/// Runs a single refresh cycle: retrieve, parse, install, notify.
pub(crate) struct Refresher {
    pub(crate) retriever: Arc<dyn Retriever>,
    pub(crate) file_format: FileFormat,
    pub(crate) store: Arc<CacheStore>,
    pub(crate) notifications: Arc<NotificationService>,
}

impl Refresher {
    /// On error, the cache store is left untouched.
    pub(crate) fn refresh(&self) -> Result<()> {
        log::debug!(target: "flagsync", "retrieving flags");
        let raw = self.retriever.retrieve()?;
        let flags = self.file_format.parse_flags(&raw)?;

        let (old, new) = self.store.install(flags);
        log::debug!(target: "flagsync", flag_count = new.len(); "flags installed in cache");

        self.notifications.notify(old.flags(), new.flags());
        Ok(())
    }
}

/// Lifecycle state of a [`PollerThread`].
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    /// Not polling.
    Stopped,
    /// Polling at the configured interval.
    Running,
    /// Stop requested, the thread has not exited yet.
    Stopping,
}

/// The configuration poller thread.
///
/// The thread waits for the polling interval, runs a refresh cycle, and starts over until it is
/// asked to stop. Failing cycles are logged and retried on the next tick.
pub struct PollerThread {
    join_handle: Mutex<Option<JoinHandle<()>>>,

    /// Used to send a stop command to the poller thread.
    stop_sender: std::sync::mpsc::SyncSender<()>,

    /// Shared with the thread, which marks itself `Stopped` when it exits.
    state: Arc<Mutex<PollerState>>,

    /// Set if a refresh cycle panicked and killed the thread.
    panicked: Arc<AtomicBool>,

    notifications: Arc<NotificationService>,
}

impl PollerThread {
    /// Starts the poller thread. The first tick happens after `interval`.
    pub(crate) fn start(
        refresher: Arc<Refresher>,
        interval: Duration,
        name: &str,
    ) -> Result<PollerThread> {
        // Using `sync_channel` here as it makes `stop_sender` `Sync` (shareable between
        // threads). Buffer size of 1 is enough: a stop command is sent with `try_send()` and a full
        // buffer means another thread has sent one already.
        let (stop_sender, stop_receiver) = std::sync::mpsc::sync_channel::<()>(1);

        let panicked = Arc::new(AtomicBool::new(false));
        let state = Arc::new(Mutex::new(PollerState::Running));
        let notifications = Arc::clone(&refresher.notifications);

        let join_handle = {
            let panicked = Arc::clone(&panicked);
            let state = Arc::clone(&state);

            std::thread::Builder::new()
                .name(format!("{name}-poller"))
                .spawn(move || {
                    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| loop {
                        match stop_receiver.recv_timeout(interval) {
                            Err(RecvTimeoutError::Timeout) => {
                                if let Err(err) = refresher.refresh() {
                                    // Keep serving the last known flags, next tick retries.
                                    log::warn!(target: "flagsync", "impossible to refresh the flags: {}", err);
                                }
                            }
                            Ok(()) => {
                                log::debug!(target: "flagsync", "poller thread received stop command");
                                return;
                            }
                            Err(RecvTimeoutError::Disconnected) => {
                                // The client was dropped without being closed.
                                log::debug!(target: "flagsync", "poller thread received disconnected");
                                return;
                            }
                        }
                    }));

                    if result.is_err() {
                        log::error!(target: "flagsync", "poller thread panicked, flags will not be refreshed anymore");
                        panicked.store(true, Ordering::SeqCst);
                    }
                    *lock_state(&state) = PollerState::Stopped;
                })?
        };

        Ok(PollerThread {
            join_handle: Mutex::new(Some(join_handle)),
            stop_sender,
            state,
            panicked,
            notifications,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PollerState {
        *lock_state(&self.state)
    }

    /// Stop the poller thread.
    ///
    /// This function does not wait for the thread to actually stop. The state goes back to
    /// `Stopped` as soon as the thread exits.
    pub fn stop(&self) {
        let mut state = lock_state(&self.state);
        // A thread that already exited has set `Stopped` itself.
        if *state == PollerState::Running {
            *state = PollerState::Stopping;
        }
        // Error means that the receiver was dropped (thread exited) or the channel buffer is
        // full. In both cases the thread is stopping anyway.
        let _ = self.stop_sender.try_send(());
    }

    /// Stop the poller thread, wait for it to exit and for pending notifications to be delivered.
    ///
    /// A refresh cycle already in progress is allowed to complete. Calling this on a stopped poller
    /// does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PollerThreadPanicked`] if the thread has panicked.
    pub fn shutdown(&self) -> Result<()> {
        self.stop();

        let join_handle = self
            .join_handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(join_handle) = join_handle else {
            // Already shut down.
            return Ok(());
        };

        let joined = join_handle.join();
        self.notifications.drain();
        *lock_state(&self.state) = PollerState::Stopped;

        if joined.is_err() || self.panicked.load(Ordering::SeqCst) {
            return Err(Error::PollerThreadPanicked);
        }
        Ok(())
    }
}

fn lock_state(state: &Mutex<PollerState>) -> MutexGuard<'_, PollerState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
        time::Duration,
    };

    use super::{PollerState, PollerThread, Refresher};
    use crate::{
        cache_store::CacheStore, notification::NotificationService, notifier::Notifier,
        retriever::Retriever, DiffCache, Error, FileFormat, Result,
    };

    /// Serves the configured responses in order, repeating the last one.
    struct Scripted {
        responses: Mutex<Vec<Result<&'static str>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(responses: Vec<Result<&'static str>>) -> Scripted {
            Scripted {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Retriever for Scripted {
        fn retrieve(&self) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            let response = if responses.len() > 1 {
                responses.remove(0)
            } else {
                responses[0].clone()
            };
            response.map(|content| content.as_bytes().to_vec())
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<DiffCache>>);

    impl Notifier for Recorder {
        fn notify(&self, diff: &DiffCache) -> Result<()> {
            self.0.lock().unwrap().push(diff.clone());
            Ok(())
        }
    }

    fn refresher(retriever: Arc<Scripted>, recorder: Arc<Recorder>) -> Arc<Refresher> {
        Arc::new(Refresher {
            retriever,
            file_format: FileFormat::Json,
            store: Arc::new(CacheStore::new()),
            notifications: Arc::new(NotificationService::new(
                vec![recorder as Arc<dyn Notifier>],
                "test",
            )),
        })
    }

    #[test]
    fn refresh_installs_and_notifies() {
        let retriever = Arc::new(Scripted::new(vec![
            Ok(r#"{"a": {"true": 1}}"#),
            Ok(r#"{"a": {"true": 2}}"#),
        ]));
        let recorder = Arc::new(Recorder::default());
        let refresher = refresher(retriever, recorder.clone());

        refresher.refresh().unwrap();
        refresher.refresh().unwrap();
        refresher.notifications.drain();

        let diffs = recorder.0.lock().unwrap();
        assert_eq!(diffs.len(), 2);
        assert!(diffs[0].added.contains_key("a"));
        assert!(diffs[1].updated.contains_key("a"));
    }

    #[test]
    fn failed_refresh_keeps_cache() {
        let retriever = Arc::new(Scripted::new(vec![
            Ok(r#"{"a": {"true": 1}}"#),
            Err(Error::retriever("source unavailable")),
            Ok("not json"),
        ]));
        let recorder = Arc::new(Recorder::default());
        let refresher = refresher(retriever, recorder.clone());

        refresher.refresh().unwrap();
        let before = refresher.store.snapshot();

        assert!(refresher.refresh().is_err());
        assert!(refresher.refresh().is_err());

        let after = refresher.store.snapshot();
        assert_eq!(before, after);
        assert_eq!(before.refreshed_at(), after.refreshed_at());

        refresher.notifications.drain();
        assert_eq!(recorder.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn polls_until_shutdown() {
        let retriever = Arc::new(Scripted::new(vec![Ok(r#"{"a": {"true": 1}}"#)]));
        let recorder = Arc::new(Recorder::default());
        let refresher = refresher(retriever.clone(), recorder);

        let poller = PollerThread::start(refresher, Duration::from_millis(50), "test").unwrap();
        assert_eq!(poller.state(), PollerState::Running);

        std::thread::sleep(Duration::from_millis(300));
        poller.shutdown().unwrap();
        assert_eq!(poller.state(), PollerState::Stopped);

        let calls = retriever.calls.load(Ordering::SeqCst);
        assert!(calls >= 2, "expected several polls, got {calls}");

        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(retriever.calls.load(Ordering::SeqCst), calls);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let retriever = Arc::new(Scripted::new(vec![Ok("{}")]));
        let poller = PollerThread::start(
            refresher(retriever, Arc::new(Recorder::default())),
            Duration::from_secs(60),
            "test",
        )
        .unwrap();

        poller.shutdown().unwrap();
        poller.shutdown().unwrap();
        poller.stop();
        assert_eq!(poller.state(), PollerState::Stopped);
    }

    #[test]
    fn reports_panicked_thread() {
        struct Panicking;
        impl Retriever for Panicking {
            fn retrieve(&self) -> Result<Vec<u8>> {
                panic!("retriever bug")
            }
        }

        let refresher = Arc::new(Refresher {
            retriever: Arc::new(Panicking),
            file_format: FileFormat::Json,
            store: Arc::new(CacheStore::new()),
            notifications: Arc::new(NotificationService::new(Vec::new(), "test")),
        });
        let poller = PollerThread::start(refresher, Duration::from_millis(10), "test").unwrap();

        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(poller.state(), PollerState::Stopped);

        poller.stop();
        assert_eq!(poller.state(), PollerState::Stopped);

        assert!(matches!(
            poller.shutdown(),
            Err(Error::PollerThreadPanicked)
        ));
        assert_eq!(poller.state(), PollerState::Stopped);
    }

    #[test]
    fn stop_without_shutdown_ends_stopped() {
        let retriever = Arc::new(Scripted::new(vec![Ok("{}")]));
        let poller = PollerThread::start(
            refresher(retriever, Arc::new(Recorder::default())),
            Duration::from_secs(60),
            "test",
        )
        .unwrap();

        poller.stop();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(poller.state(), PollerState::Stopped);

        poller.shutdown().unwrap();
    }
}
