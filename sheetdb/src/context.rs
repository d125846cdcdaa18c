//! Per-operation cancellation and deadline.

use sheetdb_core::{BackendResult, SheetDbError, SheetDbResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Carried by every store operation. Each backend call is raced against
/// the token and the deadline.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl OpContext {
    /// No deadline, never cancelled unless [`OpContext::cancel`] is called.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Bind to an existing token, e.g. a child of a shutdown token.
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// Same cancellation, tighter of the two deadlines.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let at = Instant::now() + timeout;
        Self {
            cancel: self.cancel.child_token(),
            deadline: Some(self.deadline.map_or(at, |d| d.min(at))),
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail fast if the operation has already been cancelled or timed out.
    pub fn check(&self) -> SheetDbResult<()> {
        if self.cancel.is_cancelled() {
            return Err(SheetDbError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(SheetDbError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Run one backend call, wrapping its error with `operation` and `range`.
    pub async fn call<T, F>(
        &self,
        operation: &'static str,
        range: impl Into<String>,
        fut: F,
    ) -> SheetDbResult<T>
    where
        F: Future<Output = BackendResult<T>>,
    {
        self.check()?;
        let range = range.into();
        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SheetDbError::Cancelled),
            _ = deadline => Err(SheetDbError::DeadlineExceeded),
            result = fut => result.map_err(|e| SheetDbError::backend(operation, range, e)),
        }
    }
}
