//! Time limits for store calls.
//!
//! Every gateway call is bounded by a per-call timeout and, optionally, by a
//! deadline covering the whole run. Once the deadline has passed, calls fail
//! immediately instead of reaching the store.
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BudgetError {
    #[error("{op} timed out after {after:?}")]
    TimedOut { op: &'static str, after: Duration },
    #[error("{op} skipped: run deadline exceeded")]
    DeadlineExceeded { op: &'static str },
}

#[derive(Debug, Clone, Copy)]
pub struct Budget {
    per_call: Duration,
    deadline: Option<Instant>,
}

impl Budget {
    pub fn new(per_call: Duration) -> Self {
        Self {
            per_call,
            deadline: None,
        }
    }

    /// Also stop all calls once `run_limit` has elapsed from now.
    pub fn with_run_limit(mut self, run_limit: Option<Duration>) -> Self {
        self.deadline = run_limit.map(|limit| Instant::now() + limit);
        self
    }

    pub fn per_call(&self) -> Duration {
        self.per_call
    }

    /// Time the next call may take: the per-call timeout, shortened by the deadline.
    pub fn remaining(&self, op: &'static str) -> Result<Duration, BudgetError> {
        match self.deadline {
            None => Ok(self.per_call),
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    Err(BudgetError::DeadlineExceeded { op })
                } else {
                    Ok(left.min(self.per_call))
                }
            }
        }
    }

    /// Run `fut` within the budget. `op` names the call in errors.
    pub async fn run<F, T>(&self, op: &'static str, fut: F) -> anyhow::Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let limit = self.remaining(op)?;
        match tokio::time::timeout(limit, fut).await {
            Ok(res) => res,
            Err(_) if limit < self.per_call => Err(BudgetError::DeadlineExceeded { op }.into()),
            Err(_) => Err(BudgetError::TimedOut { op, after: limit }.into()),
        }
    }
}
