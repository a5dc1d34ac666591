//! Resource-budgeted admission control shared by the parallel executor's
//! per-job and per-component submissions (§4.5, §5).
//!
//! Each worker advertises a fixed `{cpu, memory, storage}` capacity; a
//! submission is admitted only while every dimension's used amount stays at
//! or below capacity, and waiters are released in the order they were
//! notified once a running submission frees its share.

use std::sync::Mutex;

use common::tokio::sync::Notify;
use execution_graph::ResourceEstimate;

fn fits(used: &ResourceEstimate, need: &ResourceEstimate, capacity: &ResourceEstimate) -> bool {
    used.cpu + need.cpu <= capacity.cpu
        && used.memory + need.memory <= capacity.memory
        && used.storage + need.storage <= capacity.storage
}

/// Tracks how much of a fixed capacity is currently reserved and wakes
/// waiters when a reservation is released.
pub struct AdmissionController {
    capacity: ResourceEstimate,
    used: Mutex<ResourceEstimate>,
    notify: Notify,
}

impl AdmissionController {
    pub fn new(capacity: ResourceEstimate) -> Self {
        Self {
            capacity,
            used: Mutex::new(ResourceEstimate {
                cpu: 0.0,
                memory: 0.0,
                storage: 0.0,
            }),
            notify: Notify::new(),
        }
    }

    /// Block until `need` fits within the remaining capacity, then reserve
    /// it. The reservation is released when the returned guard is dropped.
    pub async fn admit(&self, need: ResourceEstimate) -> AdmissionGuard<'_> {
        loop {
            // Register for a wakeup before checking, so a release that
            // happens between the check and the wait is never missed.
            let mut notified = Box::pin(self.notify.notified());
            notified.as_mut().enable();

            {
                let mut used = self.used.lock().expect("admission lock poisoned");
                if fits(&used, &need, &self.capacity) {
                    used.cpu += need.cpu;
                    used.memory += need.memory;
                    used.storage += need.storage;
                    return AdmissionGuard {
                        controller: self,
                        held: need,
                    };
                }
            }

            notified.await;
        }
    }
}

/// An active reservation; dropping it returns the reserved amount to the
/// controller and wakes any waiters.
pub struct AdmissionGuard<'a> {
    controller: &'a AdmissionController,
    held: ResourceEstimate,
}

impl Drop for AdmissionGuard<'_> {
    fn drop(&mut self) {
        let mut used = self
            .controller
            .used
            .lock()
            .expect("admission lock poisoned");
        used.cpu -= self.held.cpu;
        used.memory -= self.held.memory;
        used.storage -= self.held.storage;
        drop(used);
        self.controller.notify.notify_waiters();
    }
}
