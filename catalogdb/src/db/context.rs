//! Cancellation context passed as the first argument of every data-access operation.
//!
//! A [`Context`] fires either when its [`CancellationToken`] is cancelled or when its
//! optional deadline passes. Operations race their I/O and their backoff sleeps against
//! [`Context::done`], so a fired context aborts promptly with [`DbError::Cancelled`] or
//! [`DbError::DeadlineExceeded`], never with a retry-exhaustion error.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::db::errors::DbError;

#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that only fires when explicitly cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing token, e.g. a per-request or shutdown token
    pub fn from_token(token: CancellationToken) -> Self {
        Self { token, deadline: None }
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Set a deadline; an earlier existing deadline wins
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        });
        self
    }

    /// A context sharing this one's deadline whose token is a child of this one's token
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Non-blocking check; `None` while the context is still live
    pub fn err(&self) -> Option<DbError> {
        if self.token.is_cancelled() {
            Some(DbError::Cancelled)
        } else if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            Some(DbError::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Resolves once the context fires, yielding the matching cancellation error
    pub async fn done(&self) -> DbError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.token.cancelled() => DbError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => DbError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                DbError::Cancelled
            }
        }
    }
}
