//! Shared pipeline machinery (§4.7, §4.8) — the memory admission gate,
//! cancellation token, and retry policy both the upload and download
//! pipelines are built from.
//!
//! Staging is plain `std::thread` workers connected by
//! `std::sync::mpsc::sync_channel` bounded queues, the same primitives the
//! teacher codebase reaches for in `io_stream` rather than an async runtime
//! — nothing here needs cooperative scheduling, only backpressure and
//! bounded buffering.

pub mod download;
pub mod upload;

use crate::error::NoiseFsError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Cooperative cancellation flag shared between the caller and every worker
/// thread in a pipeline run. Checked between blocks, never pre-empting
/// in-flight I/O.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns `Err(NoiseFsError::Cancelled)` if cancellation has been
    /// requested, `Ok(())` otherwise. Meant to be called at every block
    /// boundary inside a pipeline stage.
    pub fn check(&self) -> Result<(), NoiseFsError> {
        if self.is_cancelled() {
            tracing::debug!("cancellation observed");
            Err(NoiseFsError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// How often a parked [`MemoryGate::acquire`] wakes to recheck cancellation.
/// `release` also notifies the condvar directly, so this is only the
/// fallback for the case where nothing is ever going to call `release` again
/// (every holder broke out on error or cancellation).
const GATE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Bounds the sum of in-flight block bytes across every pipeline stage
/// (§4.7). The splitter's `admit` callback and a pipeline stage's intake
/// both call [`MemoryGate::acquire`] before taking on a block, and
/// [`MemoryGate::release`] once it leaves the pipeline (persisted or
/// written out).
pub struct MemoryGate {
    state: Mutex<usize>,
    limit: usize,
    cv: Condvar,
}

impl MemoryGate {
    pub fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(0),
            limit,
            cv: Condvar::new(),
        })
    }

    /// Block until `bytes` fit under the configured limit, then reserve them.
    /// A single reservation larger than the whole limit is still admitted
    /// once the gate is fully drained, so an oversized block never deadlocks.
    ///
    /// Wakes every [`GATE_POLL_INTERVAL`] to recheck `cancel` even with no
    /// `release` to wake it: a stage that held tokens can break out on error
    /// or cancellation without ever releasing them, and a caller parked here
    /// (typically the splitter feeding stage X, or download's fetch feeder)
    /// must not be left blocked forever when that happens.
    pub fn acquire(&self, bytes: usize, cancel: &CancellationToken) -> Result<(), NoiseFsError> {
        let mut used = self.state.lock().unwrap();
        while *used > 0 && *used + bytes > self.limit {
            cancel.check()?;
            let (guard, _timed_out) = self.cv.wait_timeout(used, GATE_POLL_INTERVAL).unwrap();
            used = guard;
        }
        cancel.check()?;
        *used += bytes;
        Ok(())
    }

    pub fn release(&self, bytes: usize) {
        let mut used = self.state.lock().unwrap();
        *used = used.saturating_sub(bytes);
        self.cv.notify_all();
    }

    /// Force the in-flight counter back to zero and wake every waiter.
    ///
    /// Called once a pipeline run has fully unwound — success, error, or
    /// cancellation, always after every worker thread has stopped touching
    /// the gate — so §4.7's "the in-flight memory counter returns to zero"
    /// holds even though individual stages break out of their loops on
    /// error/cancellation without releasing the tokens they were holding.
    pub fn drain(&self) {
        let mut used = self.state.lock().unwrap();
        *used = 0;
        self.cv.notify_all();
    }
}

/// Run `op` on a detached thread and wait up to `timeout` for it to finish
/// (§5 "backend operations carry a deadline propagated from the caller").
/// `Backend` is a synchronous trait with no cooperative cancellation, so a
/// timed-out call is abandoned rather than interrupted — the watcher thread
/// runs to completion and its result is simply dropped.
pub fn with_timeout<T: Send + 'static>(
    timeout: Duration,
    op: impl FnOnce() -> Result<T, NoiseFsError> + Send + 'static,
) -> Result<T, NoiseFsError> {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(op());
    });
    rx.recv_timeout(timeout).unwrap_or(Err(NoiseFsError::Timeout))
}

/// Retry `op` up to `max_attempts` times (the first call counts as attempt
/// one) with exponential backoff, but only while the error is transient
/// (§4.7, §4.8 — a permanent error or cancellation must abort immediately).
pub fn retry_with_backoff<T>(
    max_attempts: u32,
    cancel: &CancellationToken,
    mut op: impl FnMut() -> Result<T, NoiseFsError>,
) -> Result<T, NoiseFsError> {
    let mut attempt = 0u32;
    loop {
        cancel.check()?;
        attempt += 1;
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let backoff = Duration::from_millis(10u64.saturating_mul(1 << attempt.min(10)));
                std::thread::sleep(backoff);
                tracing::debug!(attempt, ?backoff, "retrying after transient backend error");
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn memory_gate_admits_within_limit_without_blocking() {
        let gate = MemoryGate::new(100);
        let cancel = CancellationToken::new();
        gate.acquire(50, &cancel).unwrap();
        gate.acquire(50, &cancel).unwrap();
        gate.release(100);
    }

    #[test]
    fn memory_gate_admits_oversized_reservation_once_drained() {
        let gate = MemoryGate::new(10);
        let cancel = CancellationToken::new();
        gate.acquire(100, &cancel).unwrap(); // larger than the limit, but gate starts empty
        gate.release(100);
    }

    #[test]
    fn memory_gate_acquire_wakes_on_cancellation_even_without_release() {
        let gate = MemoryGate::new(10);
        let cancel = CancellationToken::new();
        gate.acquire(10, &cancel).unwrap(); // fills the gate; nothing will ever release it

        let waiter_gate = gate.clone();
        let waiter_cancel = cancel.clone();
        let waiter = std::thread::spawn(move || waiter_gate.acquire(10, &waiter_cancel));

        std::thread::sleep(Duration::from_millis(150));
        cancel.cancel();
        assert!(matches!(
            waiter.join().unwrap(),
            Err(NoiseFsError::Cancelled)
        ));
    }

    #[test]
    fn memory_gate_drain_resets_the_counter_regardless_of_outstanding_holders() {
        let gate = MemoryGate::new(100);
        let cancel = CancellationToken::new();
        gate.acquire(80, &cancel).unwrap();
        gate.drain();
        // Fully available again even though the 80-byte reservation above
        // was never released.
        gate.acquire(100, &cancel).unwrap();
    }

    #[test]
    fn cancellation_token_check_errors_once_cancelled() {
        let token = CancellationToken::new();
        assert!(token.check().is_ok());
        token.cancel();
        assert!(matches!(token.check(), Err(NoiseFsError::Cancelled)));
    }

    #[test]
    fn retry_with_backoff_gives_up_on_permanent_error() {
        let calls = AtomicUsize::new(0);
        let cancel = CancellationToken::new();
        let result: Result<(), NoiseFsError> = retry_with_backoff(5, &cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(NoiseFsError::PermanentIO("nope".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn with_timeout_returns_timeout_error_when_op_runs_long() {
        let result: Result<(), NoiseFsError> = with_timeout(Duration::from_millis(20), || {
            std::thread::sleep(Duration::from_millis(200));
            Ok(())
        });
        assert!(matches!(result, Err(NoiseFsError::Timeout)));
    }

    #[test]
    fn with_timeout_passes_through_fast_result() {
        let result = with_timeout(Duration::from_secs(5), || Ok::<_, NoiseFsError>(7));
        assert_eq!(result.unwrap(), 7);
    }

    #[test]
    fn retry_with_backoff_retries_transient_then_succeeds() {
        let calls = AtomicUsize::new(0);
        let cancel = CancellationToken::new();
        let result = retry_with_backoff(5, &cancel, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(NoiseFsError::TransientIO("hiccup".into()))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
