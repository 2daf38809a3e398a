/// Convenience result type used across Strata.
pub type StrataResult<T> = Result<T, StrataError>;

/// Top-level error taxonomy used by engine APIs.
///
/// Only [`StrataError::Configuration`] and [`StrataError::ResourceExhaustion`] stop a batch.
/// Every other variant is recorded against the item that raised it.
#[derive(thiserror::Error, Debug)]
pub enum StrataError {
    /// Invalid configuration. Raised before any item is processed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A single composite could not be rendered.
    #[error("composition error: {0}")]
    Composition(String),

    /// A source could not be read or decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// A rendered composite could not be written.
    #[error("persist error: {0}")]
    Persist(String),

    /// An item exceeded its processing budget.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The destination or the allocator cannot take more work.
    #[error("resource exhaustion: {0}")]
    ResourceExhaustion(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StrataError {
    /// Build a [`StrataError::Configuration`] value.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Build a [`StrataError::Composition`] value.
    pub fn composition(msg: impl Into<String>) -> Self {
        Self::Composition(msg.into())
    }

    /// Build a [`StrataError::Decode`] value.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Build a [`StrataError::Persist`] value.
    pub fn persist(msg: impl Into<String>) -> Self {
        Self::Persist(msg.into())
    }

    /// Build a [`StrataError::Timeout`] value.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Build a [`StrataError::ResourceExhaustion`] value.
    pub fn resource_exhaustion(msg: impl Into<String>) -> Self {
        Self::ResourceExhaustion(msg.into())
    }

    /// Short stable name of the variant, used in reports and manifests.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Composition(_) => "composition",
            Self::Decode(_) => "decode",
            Self::Persist(_) => "persist",
            Self::Timeout(_) => "timeout",
            Self::ResourceExhaustion(_) => "resource_exhaustion",
            Self::Other(_) => "other",
        }
    }

    /// `true` when continuing the batch after this error is meaningless.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::ResourceExhaustion(_))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
