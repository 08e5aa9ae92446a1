//! Fan-out of job-list snapshots to registered observers.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::separation::job::SeparationJob;

/// Handle returned by [`JobUpdates::subscribe`]; pass it back to
/// [`JobUpdates::unsubscribe`] to deregister.
pub type SubscriptionId = u64;

/// Observer callback receiving the full job snapshot, newest first.
pub type JobSnapshotFn = Box<dyn Fn(&[SeparationJob]) + Send + Sync>;

/// Snapshot fan-out hub with per-observer failure isolation: a panicking
/// callback is logged and the remaining observers are still notified.
pub struct JobUpdates {
    subscribers: Mutex<HashMap<SubscriptionId, JobSnapshotFn>>,
    next_id: AtomicU64,
}

impl JobUpdates {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers an observer and immediately hands it the current snapshot.
    pub fn subscribe(&self, callback: JobSnapshotFn, snapshot: &[SeparationJob]) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Self::invoke(id, &callback, snapshot);

        let mut subscribers = self.lock_subscribers();
        subscribers.insert(id, callback);
        log::debug!("Job subscriber {} registered", id);
        id
    }

    /// Removes an observer. Returns false when the id was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.lock_subscribers().remove(&id).is_some();
        if removed {
            log::debug!("Job subscriber {} removed", id);
        }
        removed
    }

    /// Pushes a snapshot to every registered observer.
    pub fn notify(&self, snapshot: &[SeparationJob]) {
        let subscribers = self.lock_subscribers();
        for (id, callback) in subscribers.iter() {
            Self::invoke(*id, callback, snapshot);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock_subscribers().len()
    }

    fn invoke(id: SubscriptionId, callback: &JobSnapshotFn, snapshot: &[SeparationJob]) {
        if catch_unwind(AssertUnwindSafe(|| callback(snapshot))).is_err() {
            log::warn!("Job subscriber {} panicked during notification", id);
        }
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, HashMap<SubscriptionId, JobSnapshotFn>> {
        match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job updates subscriber lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl Default for JobUpdates {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::separation::job::SeparationQuality;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn snapshot(count: usize) -> Vec<SeparationJob> {
        (0..count)
            .map(|i| SeparationJob::new(&format!("song-{}", i), SeparationQuality::Normal))
            .collect()
    }

    #[test]
    fn test_subscribe_receives_immediate_snapshot() {
        let hub = JobUpdates::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);

        hub.subscribe(
            Box::new(move |jobs| {
                seen_clone.store(jobs.len(), Ordering::SeqCst);
            }),
            &snapshot(3),
        );

        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_notify_reaches_all_subscribers() {
        let hub = JobUpdates::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            hub.subscribe(
                Box::new(move |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                }),
                &[],
            );
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        hub.notify(&snapshot(1));
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let hub = JobUpdates::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let id = hub.subscribe(
            Box::new(move |_| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            }),
            &[],
        );
        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));

        hub.notify(&snapshot(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let hub = JobUpdates::new();
        let calls = Arc::new(AtomicUsize::new(0));

        hub.subscribe(
            Box::new(|jobs| {
                if !jobs.is_empty() {
                    panic!("observer bug");
                }
            }),
            &[],
        );
        let calls_clone = Arc::clone(&calls);
        hub.subscribe(
            Box::new(move |_| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            }),
            &[],
        );

        hub.notify(&snapshot(1));
        hub.notify(&snapshot(2));

        // The healthy subscriber saw its initial snapshot plus both pushes.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
