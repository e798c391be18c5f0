use std::fmt;

use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::{BoxFuture, Shared};

use crate::filters::result::FilterResult;
use crate::foundation::error::RenderError;

/// Why a filter future holds no value.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum FilterFailure {
    /// The stage ran and failed. Consumers degrade this to a transparent color.
    #[error("filter stage failed: {0}")]
    Failed(String),
    /// The chain is misconfigured. Never degraded.
    #[error("filter usage error: {0}")]
    Usage(String),
    /// The producing task went away without completing.
    #[error("filter stage abandoned")]
    Abandoned,
}

impl FilterFailure {
    /// `true` for configuration mistakes.
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }
}

impl From<RenderError> for FilterFailure {
    fn from(e: RenderError) -> Self {
        match e {
            RenderError::Usage(msg) => Self::Usage(msg),
            other => Self::Failed(other.to_string()),
        }
    }
}

impl From<FilterFailure> for RenderError {
    fn from(f: FilterFailure) -> Self {
        match f {
            FilterFailure::Usage(msg) => RenderError::Usage(msg),
            other => RenderError::Filter(other.to_string()),
        }
    }
}

/// Outcome of one filter stage.
pub type FilterOutcome = Result<FilterResult, FilterFailure>;

/// Cloneable handle to the eventual outcome of a filter stage.
///
/// Any number of consumers may wait on the same stage. Waiting blocks only the calling thread;
/// the draw pass uses [`FilterFuture::peek`] instead.
#[derive(Clone)]
pub struct FilterFuture {
    inner: Shared<BoxFuture<'static, FilterOutcome>>,
}

impl fmt::Debug for FilterFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterFuture")
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl FilterFuture {
    /// Already-completed future.
    pub fn ready(outcome: FilterOutcome) -> Self {
        Self {
            inner: futures::future::ready(outcome).boxed().shared(),
        }
    }

    /// Pending future plus the promise that completes it.
    pub fn channel() -> (FilterPromise, Self) {
        let (tx, rx) = oneshot::channel::<FilterOutcome>();
        let inner = rx
            .map(|r| r.unwrap_or(Err(FilterFailure::Abandoned)))
            .boxed()
            .shared();
        (FilterPromise { tx }, Self { inner })
    }

    /// Outcome if already available, without blocking.
    pub fn peek(&self) -> Option<FilterOutcome> {
        if let Some(done) = self.inner.peek() {
            return Some(done.clone());
        }
        self.inner.clone().now_or_never()
    }

    /// `true` once the outcome is available.
    pub fn is_ready(&self) -> bool {
        self.peek().is_some()
    }

    /// Block the current thread until the outcome is available.
    pub fn wait(&self) -> FilterOutcome {
        futures::executor::block_on(self.inner.clone())
    }
}

/// Completes a [`FilterFuture`]. Dropping it unfulfilled resolves the future as
/// [`FilterFailure::Abandoned`].
#[derive(Debug)]
pub struct FilterPromise {
    tx: oneshot::Sender<FilterOutcome>,
}

impl FilterPromise {
    /// Publish the outcome to every waiter.
    pub fn complete(self, outcome: FilterOutcome) {
        // A send error only means nobody is listening anymore.
        let _ = self.tx.send(outcome);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/filters/future.rs"]
mod tests;
