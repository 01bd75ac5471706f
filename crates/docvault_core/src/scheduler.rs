//! Admission control for file operations.
//!
//! At most `max_concurrent_operations` operations hold a [`Permit`] at any
//! moment. Waiters are admitted strictly in arrival order: each caller
//! draws a ticket and is admitted only when its ticket is next and a slot
//! is free.
//!
//! Admission blocks the calling thread. Once admitted, an operation runs
//! to completion; giving up is only possible while still queued (see
//! [`ConcurrencyController::acquire_timeout`]).

use crate::error::{CoreError, CoreResult};
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Debug, Default)]
struct AdmissionState {
    next_ticket: u64,
    now_serving: u64,
    in_flight: usize,
    /// Tickets whose holders stopped waiting.
    abandoned: BTreeSet<u64>,
}

impl AdmissionState {
    fn skip_abandoned(&mut self) {
        while self.abandoned.remove(&self.now_serving) {
            self.now_serving += 1;
        }
    }

    fn queued(&self) -> usize {
        let waiting = self.next_ticket - self.now_serving;
        usize::try_from(waiting).unwrap_or(usize::MAX) - self.abandoned.len()
    }
}

/// FIFO admission gate bounding concurrent file operations.
#[derive(Debug)]
pub struct ConcurrencyController {
    max: usize,
    state: Mutex<AdmissionState>,
    turn: Condvar,
    peak: AtomicUsize,
}

impl ConcurrencyController {
    /// Creates a controller admitting at most `max` operations at once.
    ///
    /// A bound of zero is treated as one.
    #[must_use]
    pub fn new(max: usize) -> Self {
        Self {
            max: max.max(1),
            state: Mutex::new(AdmissionState::default()),
            turn: Condvar::new(),
            peak: AtomicUsize::new(0),
        }
    }

    /// The admission bound.
    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max
    }

    /// Waits for a slot.
    pub fn acquire(&self) -> Permit<'_> {
        let mut state = self.state.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;

        while ticket != state.now_serving || state.in_flight >= self.max {
            self.turn.wait(&mut state);
        }
        self.admit(&mut state);
        Permit { controller: self }
    }

    /// Waits for a slot for at most `timeout`.
    ///
    /// Returns `None` if the deadline passes first; the caller's place in
    /// the queue is given up and later tickets move ahead.
    pub fn acquire_timeout(&self, timeout: Duration) -> Option<Permit<'_>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;

        while ticket != state.now_serving || state.in_flight >= self.max {
            if self.turn.wait_until(&mut state, deadline).timed_out()
                && (ticket != state.now_serving || state.in_flight >= self.max)
            {
                state.abandoned.insert(ticket);
                state.skip_abandoned();
                drop(state);
                self.turn.notify_all();
                trace!(ticket, "admission timed out");
                return None;
            }
        }
        self.admit(&mut state);
        Some(Permit { controller: self })
    }

    fn admit(&self, state: &mut AdmissionState) {
        state.now_serving += 1;
        state.skip_abandoned();
        state.in_flight += 1;
        self.peak.fetch_max(state.in_flight, Ordering::Relaxed);
        // The next ticket holder may now be at the head with a free slot.
        self.turn.notify_all();
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.in_flight -= 1;
        drop(state);
        self.turn.notify_all();
    }

    /// Runs `op` once admitted and returns its result unchanged.
    pub fn schedule<F, R>(&self, op: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _permit = self.acquire();
        op()
    }

    /// Runs `op` if admitted within `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AdmissionTimeout`] if no slot opened in time;
    /// `op` has then not run. Otherwise returns `op`'s own result.
    pub fn schedule_timeout<F, R>(&self, timeout: Duration, op: F) -> CoreResult<R>
    where
        F: FnOnce() -> CoreResult<R>,
    {
        let Some(_permit) = self.acquire_timeout(timeout) else {
            return Err(CoreError::AdmissionTimeout { waited: timeout });
        };
        op()
    }

    /// Operations currently holding a permit.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    /// Callers waiting for admission.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.state.lock().queued()
    }

    /// Highest `in_flight` value observed.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    /// Resets the peak gauge to the current in-flight count.
    pub fn reset_peak(&self) {
        let current = self.in_flight();
        self.peak.store(current, Ordering::Relaxed);
    }
}

/// An admission slot, released on drop.
///
/// Dropping happens during unwinding too, so a panicking operation still
/// frees its slot.
#[derive(Debug)]
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct Permit<'a> {
    controller: &'a ConcurrencyController,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.controller.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn sequential_callers_pass_through() {
        let controller = ConcurrencyController::new(2);
        let results: Vec<i32> = (0..5).map(|i| controller.schedule(|| i * 2)).collect();
        assert_eq!(results, vec![0, 2, 4, 6, 8]);
        assert_eq!(controller.in_flight(), 0);
        assert_eq!(controller.queued(), 0);
        assert_eq!(controller.peak_in_flight(), 1);
    }

    #[test]
    fn errors_pass_through_unchanged() {
        let controller = ConcurrencyController::new(1);
        let result: CoreResult<()> =
            controller.schedule(|| Err(CoreError::not_found("posts", "p9")));
        assert!(matches!(result, Err(CoreError::NotFound { id, .. }) if id == "p9"));
    }

    #[test]
    fn bound_holds_under_contention() {
        const LIMIT: usize = 3;
        const THREADS: usize = 12;

        let controller = Arc::new(ConcurrencyController::new(LIMIT));
        let running = Arc::new(AtomicUsize::new(0));
        let observed_max = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let controller = controller.clone();
                let running = running.clone();
                let observed_max = observed_max.clone();
                thread::spawn(move || {
                    controller.schedule(|| {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        observed_max.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(10));
                        running.fetch_sub(1, Ordering::SeqCst);
                    });
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(observed_max.load(Ordering::SeqCst) <= LIMIT);
        assert!(controller.peak_in_flight() <= LIMIT);
        assert_eq!(controller.in_flight(), 0);
    }

    #[test]
    fn admission_is_fifo() {
        let controller = Arc::new(ConcurrencyController::new(1));
        let order = Arc::new(Mutex::new(Vec::new()));

        // Hold the only slot while waiters queue up one by one.
        let blocker = controller.acquire();
        let mut handles = Vec::new();
        for i in 0..5 {
            let waiter = controller.clone();
            let order = order.clone();
            handles.push(thread::spawn(move || {
                waiter.schedule(|| order.lock().push(i));
            }));
            while controller.queued() < i + 1 {
                thread::yield_now();
            }
        }
        drop(blocker);
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn timeout_gives_up_place_in_queue() {
        let controller = Arc::new(ConcurrencyController::new(1));
        let blocker = controller.acquire();

        assert!(controller
            .acquire_timeout(Duration::from_millis(20))
            .is_none());
        assert_eq!(controller.queued(), 0);

        let result = controller.schedule_timeout(Duration::from_millis(5), || Ok(1));
        assert!(matches!(result, Err(CoreError::AdmissionTimeout { .. })));

        drop(blocker);
        // Abandoned tickets do not block later callers.
        assert_eq!(controller.schedule(|| 7), 7);
        assert_eq!(
            controller
                .schedule_timeout(Duration::from_millis(50), || Ok(8))
                .unwrap(),
            8
        );
    }

    #[test]
    fn permit_released_on_panic() {
        let controller = Arc::new(ConcurrencyController::new(1));
        let c = controller.clone();
        let result = thread::spawn(move || {
            c.schedule(|| panic!("operation failed"));
        })
        .join();
        assert!(result.is_err());
        assert_eq!(controller.in_flight(), 0);
        assert_eq!(controller.schedule(|| 1), 1);
    }

    #[test]
    fn bound_reached_when_possible() {
        let controller = Arc::new(ConcurrencyController::new(2));
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let controller = controller.clone();
                let barrier = barrier.clone();
                thread::spawn(move || controller.schedule(|| barrier.wait()))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(controller.peak_in_flight(), 2);
    }
}
