use std::{future, time::Duration};

use tokio::time::{sleep_until, Instant};

/// A single optional deadline.
///
/// At most one deadline is pending: scheduling replaces (cancels) the
/// previous one.
#[derive(Debug, Default)]
pub(crate) struct Timer {
    deadline: Option<Instant>,
}

impl Timer {
    /// Returns `true` if a pending deadline was replaced.
    pub(crate) fn schedule(&mut self, after: Duration) -> bool {
        self.deadline.replace(Instant::now() + after).is_some()
    }

    /// Returns `true` if a pending deadline was cancelled.
    pub(crate) fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolves when the deadline passes; never resolves while nothing is
    /// scheduled. The deadline stays set until [`Timer::cancel`].
    ///
    /// Cancel safe.
    pub(crate) async fn expired(&self) {
        match self.deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => future::pending().await,
        }
    }
}
