//! Purpose: Carry cancellation into a running load.
//! Exports: `LoadContext`, `CancelHandle`.
//! Role: Caller-supplied deadline and stop signal, checked between documents.
//! Invariants: Once cancelled, a context stays cancelled.
//! Invariants: Network calls race both the remaining deadline and the stop signal.
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::core::error::{Error, ErrorKind};

type StopSender = Arc<watch::Sender<bool>>;

#[derive(Clone, Debug)]
pub struct LoadContext {
    deadline: Option<Instant>,
    stop: StopSender,
}

/// Trips the stop signal of the context it was taken from (and of its clones).
#[derive(Clone, Debug)]
pub struct CancelHandle {
    stop: StopSender,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.stop.send_replace(true);
    }
}

impl Default for LoadContext {
    fn default() -> Self {
        let (stop, _rx) = watch::channel(false);
        Self {
            deadline: None,
            stop: Arc::new(stop),
        }
    }
}

impl LoadContext {
    /// A context that never expires on its own.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// A timeout too large to represent leaves the context without a deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            stop: Arc::clone(&self.stop),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.stopped() || self.expired()
    }

    /// `Cancelled` error if the stop signal is set or the deadline has passed.
    pub fn check(&self) -> Result<(), Error> {
        if self.stopped() {
            return Err(stop_requested());
        }
        if self.expired() {
            return Err(deadline_exceeded());
        }
        Ok(())
    }

    /// Run `fut` to completion unless the deadline passes or the context is
    /// cancelled first; the losing future is dropped.
    pub(crate) async fn bound<F, T>(&self, fut: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        let mut stop = self.stop.subscribe();
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            result = fut => result,
            _ = stop.wait_for(|stopped| *stopped) => Err(stop_requested()),
            () = deadline => Err(deadline_exceeded()),
        }
    }

    fn stopped(&self) -> bool {
        *self.stop.borrow()
    }

    fn expired(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

fn stop_requested() -> Error {
    Error::new(ErrorKind::Cancelled).with_message("load cancelled")
}

fn deadline_exceeded() -> Error {
    Error::new(ErrorKind::Cancelled).with_message("deadline exceeded")
}
