//! Fan-out of cache changes to the registered notifiers.
use std::{
    collections::HashMap,
    sync::{Arc, Condvar, Mutex, MutexGuard},
};

use crate::{notifier::Notifier, DiffCache, Flag};

/// Dispatches [`DiffCache`]s to notifiers without blocking the refresh cycle.
///
/// Every delivery runs on its own thread. [`NotificationService::drain`] waits for all deliveries
/// started so far.
pub struct NotificationService {
    notifiers: Vec<Arc<dyn Notifier>>,
    thread_name: String,
    in_flight: Arc<InFlight>,
}

#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    done: Condvar,
}

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, usize> {
        // Deliveries run notifier code under `catch_unwind` and never panic while holding the
        // lock, so poisoning can only come from a bug here. Keep counting anyway.
        self.count
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Marks one delivery as complete when dropped.
struct DeliveryGuard(Arc<InFlight>);

impl DeliveryGuard {
    fn start(in_flight: &Arc<InFlight>) -> DeliveryGuard {
        *in_flight.lock() += 1;
        DeliveryGuard(Arc::clone(in_flight))
    }
}

impl Drop for DeliveryGuard {
    fn drop(&mut self) {
        let mut count = self.0.lock();
        *count -= 1;
        if *count == 0 {
            self.0.done.notify_all();
        }
    }
}

impl NotificationService {
    pub(crate) fn new(notifiers: Vec<Arc<dyn Notifier>>, name: &str) -> NotificationService {
        NotificationService {
            notifiers,
            thread_name: format!("{name}-notifier"),
            in_flight: Arc::default(),
        }
    }

    /// Number of registered notifiers.
    pub fn notifier_count(&self) -> usize {
        self.notifiers.len()
    }

    /// Compute the changes between `old` and `new` and dispatch them.
    pub fn notify(&self, old: &HashMap<String, Flag>, new: &HashMap<String, Flag>) {
        self.dispatch(DiffCache::between(old, new));
    }

    /// Start one delivery per notifier. Does nothing if `diff` is empty.
    pub fn dispatch(&self, diff: DiffCache) {
        if !diff.has_diff() {
            log::debug!(target: "flagsync", "no flag change, skipping notifications");
            return;
        }

        let diff = Arc::new(diff);
        for notifier in &self.notifiers {
            let guard = DeliveryGuard::start(&self.in_flight);
            let name = notifier.name().to_owned();
            let notifier = Arc::clone(notifier);
            let diff = Arc::clone(&diff);

            let spawned = std::thread::Builder::new()
                .name(self.thread_name.clone())
                .spawn(move || {
                    // Dropped at the end of the delivery, whatever its outcome.
                    let _guard = guard;
                    deliver(notifier.as_ref(), &diff);
                });

            if let Err(err) = spawned {
                // The closure (and the guard it owns) is dropped, releasing the in-flight slot.
                log::warn!(target: "flagsync", notifier = name.as_str(); "failed to start notification delivery: {:?}", err);
            }
        }
    }

    /// Number of deliveries that have not finished yet.
    pub fn in_flight(&self) -> usize {
        *self.in_flight.lock()
    }

    /// Block until every delivery started so far has finished.
    pub fn drain(&self) {
        let mut count = self.in_flight.lock();
        while *count > 0 {
            count = self
                .in_flight
                .done
                .wait(count)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }
}

fn deliver(notifier: &dyn Notifier, diff: &DiffCache) {
    let name = notifier.name();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| notifier.notify(diff)));
    match result {
        Ok(Ok(())) => {
            log::debug!(target: "flagsync", notifier = name; "notification delivered");
        }
        Ok(Err(err)) => {
            log::warn!(target: "flagsync", notifier = name; "error while delivering notification: {}", err);
        }
        Err(_panic) => {
            log::error!(target: "flagsync", notifier = name; "notifier panicked while delivering notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
        time::Duration,
    };

    use super::NotificationService;
    use crate::{notifier::Notifier, DiffCache, Error, Flag, Result};

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<DiffCache>>,
    }

    impl Notifier for Recorder {
        fn notify(&self, diff: &DiffCache) -> Result<()> {
            self.calls.lock().unwrap().push(diff.clone());
            Ok(())
        }
    }

    struct Slow {
        delay: Duration,
        finished: Arc<AtomicUsize>,
    }

    impl Notifier for Slow {
        fn notify(&self, _diff: &DiffCache) -> Result<()> {
            std::thread::sleep(self.delay);
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn cache(names: &[&str]) -> HashMap<String, Flag> {
        names
            .iter()
            .map(|name| (name.to_string(), Flag::default()))
            .collect()
    }

    #[test]
    fn empty_diff_starts_no_delivery() {
        let recorder = Arc::new(Recorder::default());
        let service = NotificationService::new(vec![recorder.clone() as Arc<dyn Notifier>], "test");

        service.notify(&cache(&["a"]), &cache(&["a"]));
        assert_eq!(service.in_flight(), 0);
        service.drain();

        assert!(recorder.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn every_notifier_receives_the_diff() {
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let service = NotificationService::new(
            vec![first.clone() as Arc<dyn Notifier>, second.clone()],
            "test",
        );
        assert_eq!(service.notifier_count(), 2);

        service.notify(&HashMap::new(), &cache(&["a", "b"]));
        service.drain();

        for recorder in [first, second] {
            let calls = recorder.calls.lock().unwrap();
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].added.len(), 2);
        }
    }

    #[test]
    fn dispatch_does_not_wait_for_delivery() {
        let finished = Arc::new(AtomicUsize::new(0));
        let service = NotificationService::new(
            vec![Arc::new(Slow {
                delay: Duration::from_millis(300),
                finished: finished.clone(),
            }) as Arc<dyn Notifier>],
            "test",
        );

        service.notify(&HashMap::new(), &cache(&["a"]));
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        assert_eq!(service.in_flight(), 1);

        service.drain();
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(service.in_flight(), 0);
    }

    #[test]
    fn failing_notifiers_do_not_affect_others() {
        let recorder = Arc::new(Recorder::default());
        let failing = |_: &DiffCache| -> Result<()> { Err(Error::notifier("endpoint down")) };
        let panicking = |_: &DiffCache| -> Result<()> { panic!("notifier bug") };
        let service = NotificationService::new(
            vec![
                Arc::new(failing) as Arc<dyn Notifier>,
                Arc::new(panicking),
                recorder.clone(),
            ],
            "test",
        );

        service.notify(&HashMap::new(), &cache(&["a"]));
        service.drain();

        assert_eq!(service.in_flight(), 0);
        assert_eq!(recorder.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn drain_waits_for_every_cycle() {
        let finished = Arc::new(AtomicUsize::new(0));
        let slow: Arc<dyn Notifier> = Arc::new(Slow {
            delay: Duration::from_millis(100),
            finished: finished.clone(),
        });
        let service = NotificationService::new(vec![slow.clone(), slow], "test");

        service.notify(&HashMap::new(), &cache(&["a"]));
        service.notify(&cache(&["a"]), &cache(&["b"]));
        service.drain();

        assert_eq!(finished.load(Ordering::SeqCst), 4);
    }
}
