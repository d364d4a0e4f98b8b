//! Bounded-concurrency fan-out of lookups over a fixed worker pool.
//!
//! `max_concurrency` scoped worker threads drain a shared queue of candidates,
//! each running one lookup at a time, so the number of requests in flight can
//! never exceed the pool size. Results travel over a channel to the calling
//! thread, which is the only consumer.

use std::io;
use std::num::NonZeroUsize;
use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, warn};

use crate::check::{Lookup, LookupError, Outcome};
use crate::generate::Candidate;

/// What the dispatcher does after a lookup returns an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BatchPolicy {
    /// Record the error and keep going.
    #[default]
    ContinueOnError,
    /// Stop handing out candidates; let in-flight lookups finish.
    AbortOnError,
}

/// Everything a finished dispatch produced.
#[derive(Debug, Default)]
#[must_use]
pub struct Batch {
    /// One entry per dispatched candidate, in completion order.
    pub results: Vec<Result<Outcome, LookupError>>,
    /// Candidates never dispatched because the batch was halted.
    pub skipped: Vec<Candidate>,
    /// Worker threads that were actually started.
    pub workers: usize,
    /// Why the pool came up smaller than requested, if it did.
    pub spawn_error: Option<io::Error>,
}

impl Batch {
    /// Whether the batch was halted before every candidate was looked up.
    #[must_use]
    pub fn halted(&self) -> bool {
        !self.skipped.is_empty()
    }

    /// Available outcomes in collection order.
    pub fn available(&self) -> impl Iterator<Item = &Outcome> {
        self.results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .filter(|o| o.is_available())
    }

    /// Lookup errors in collection order.
    pub fn errors(&self) -> impl Iterator<Item = &LookupError> {
        self.results.iter().filter_map(|r| r.as_ref().err())
    }
}

/// Look up every candidate with at most `max_concurrency` lookups in flight.
///
/// `on_result` runs on the calling thread once per result, as results arrive.
/// Returning [`ControlFlow::Break`] halts the batch the same way a lookup error
/// does under [`BatchPolicy::AbortOnError`]. This call returns only after every
/// started lookup has completed.
///
/// If the OS refuses a worker thread, the batch runs on the workers already
/// started; with none started, every candidate is returned as skipped. A lookup
/// that panics yields [`LookupError::Internal`] for its candidate.
pub fn dispatch<L, F>(
    lookup: &L,
    candidates: Vec<Candidate>,
    max_concurrency: NonZeroUsize,
    policy: BatchPolicy,
    mut on_result: F,
) -> Batch
where
    L: Lookup + Sync + ?Sized,
    F: FnMut(&Result<Outcome, LookupError>) -> ControlFlow<()>,
{
    let total = candidates.len();
    if total == 0 {
        return Batch::default();
    }
    let workers = max_concurrency.get().min(total);

    let (queue_tx, queue_rx) = crossbeam_channel::bounded(total);
    for candidate in candidates {
        // Capacity equals the candidate count and the receiver is alive.
        let _ = queue_tx.send(candidate);
    }
    drop(queue_tx);

    let (result_tx, result_rx) = crossbeam_channel::unbounded();
    let halt = AtomicBool::new(false);
    let mut results = Vec::with_capacity(total);

    debug!(total, workers, ?policy, "dispatching lookups");

    let mut spawn_error = None;

    let started = thread::scope(|s| {
        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let queue = queue_rx.clone();
            let tx = result_tx.clone();
            let halt = &halt;
            let spawned = thread::Builder::new()
                .name(format!("lookup-{i}"))
                .spawn_scoped(s, move || worker(lookup, &queue, &tx, halt));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    warn!(error = %e, started = handles.len(), "failed to start lookup worker");
                    spawn_error = Some(e);
                    break;
                }
            }
        }
        drop(result_tx);
        let started = handles.len();

        // Ends once every worker has dropped its sender.
        for result in &result_rx {
            if let Err(e) = &result {
                warn!(error = %e, "lookup error");
                if policy == BatchPolicy::AbortOnError {
                    halt.store(true, Ordering::Release);
                }
            }
            if on_result(&result).is_break() {
                halt.store(true, Ordering::Release);
            }
            results.push(result);
        }

        for handle in handles {
            if handle.join().is_err() {
                error!("lookup worker panicked");
            }
        }
        started
    });

    let skipped: Vec<Candidate> = queue_rx.try_iter().collect();
    if !skipped.is_empty() {
        debug!(skipped = skipped.len(), "batch halted early");
    }
    Batch {
        results,
        skipped,
        workers: started,
        spawn_error,
    }
}

fn worker<L: Lookup + ?Sized>(
    lookup: &L,
    queue: &Receiver<Candidate>,
    results: &Sender<Result<Outcome, LookupError>>,
    halt: &AtomicBool,
) {
    while !halt.load(Ordering::Acquire) {
        let Ok(candidate) = queue.try_recv() else {
            break;
        };
        let result = panic::catch_unwind(AssertUnwindSafe(|| lookup.check(&candidate)))
            .unwrap_or_else(|payload| {
                Err(LookupError::Internal {
                    message: panic_message(payload.as_ref()),
                    candidate,
                })
            });
        if results.send(result).is_err() {
            break;
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "lookup panicked".to_string()
    }
}
