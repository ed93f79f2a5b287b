// Error types shared across the provisioner.

/// A failure that retrying cannot fix (bad credentials, missing asset,
/// digest mismatch). Retry loops downcast to this and stop early.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct NonRetryableError {
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl NonRetryableError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Whether `err` or anything in its chain is non-retryable.
    pub fn is_in_chain(err: &anyhow::Error) -> bool {
        err.chain().any(|cause| cause.is::<NonRetryableError>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn detected_through_context() {
        let err: anyhow::Result<()> = Err(NonRetryableError::new("HTTP 404")).context("download");
        let err = err.unwrap_err();
        assert!(NonRetryableError::is_in_chain(&err));
        assert_eq!(err.to_string(), "download");
    }

    #[test]
    fn plain_errors_are_retryable() {
        let err = anyhow::anyhow!("connection reset");
        assert!(!NonRetryableError::is_in_chain(&err));
    }

    #[test]
    fn source_is_kept() {
        let err = NonRetryableError::with_source("digest mismatch", anyhow::anyhow!("abc != def"));
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "abc != def");
    }
}
