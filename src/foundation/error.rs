/// Result alias used throughout the crate.
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors produced by the rendering core and the image-filter pipeline.
///
/// Most failures never leave a draw pass: callers log them and skip the dependent effect.
/// [`RenderError::Usage`] is the exception and marks a misconfigured filter chain.
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    /// Malformed input that could not be interpreted.
    #[error("validation error: {0}")]
    Validation(String),

    /// A raster or pooled buffer could not be allocated.
    #[error("allocation error: {0}")]
    Allocation(String),

    /// A filter stage failed at runtime.
    #[error("filter error: {0}")]
    Filter(String),

    /// A filter chain is configured in a way that can never succeed.
    #[error("usage error: {0}")]
    Usage(String),

    /// Work could not be submitted to the worker pool.
    #[error("submission rejected: {0}")]
    Rejected(String),

    /// Anything else, with its source preserved.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RenderError {
    /// Build a [`RenderError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`RenderError::Allocation`].
    pub fn allocation(msg: impl Into<String>) -> Self {
        Self::Allocation(msg.into())
    }

    /// Build a [`RenderError::Filter`].
    pub fn filter(msg: impl Into<String>) -> Self {
        Self::Filter(msg.into())
    }

    /// Build a [`RenderError::Usage`].
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    /// Build a [`RenderError::Rejected`].
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    /// `true` for configuration mistakes that must not be papered over.
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
