//! Request coalescing
//!
//! [`SingleFlight`] runs an operation at most once at a time. Callers that
//! arrive while a run is in flight wait for it; if they arrived after that
//! run started, exactly one follow-up run happens on their behalf, shared by
//! everyone who queued up meanwhile.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct SingleFlight {
    // Tickets handed out so far
    requested: AtomicU64,
    // Highest ticket a finished run is known to cover
    completed: AtomicU64,
    gate: Mutex<()>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `op` unless a run that started after this call already finished.
    ///
    /// Returns `Ok(true)` when this caller performed the run and `Ok(false)`
    /// when it was covered by another caller's run. A failed run covers
    /// nobody; the next waiter tries again.
    pub async fn run<F, Fut, E>(&self, op: F) -> Result<bool, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let ticket = self.requested.fetch_add(1, Ordering::SeqCst) + 1;
        let _gate = self.gate.lock().await;

        if self.completed.load(Ordering::SeqCst) >= ticket {
            log::debug!("request {} coalesced into an earlier run", ticket);
            return Ok(false);
        }

        // Everything requested up to here is seen by this run
        let covered = self.requested.load(Ordering::SeqCst);
        op().await?;
        self.completed.store(covered, Ordering::SeqCst);
        Ok(true)
    }
}
