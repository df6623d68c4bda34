//! Error types for the rightsizing library

/// Result type alias using RightsizingError
pub type Result<T> = std::result::Result<T, RightsizingError>;

/// Main error type for aggregation, inference and job handling
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RightsizingError {
    /// Zero entities matched a scoped lookup
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    /// More than one entity matched where exactly one was required
    #[error("multiple {kind} {name} exist")]
    NotUnique { kind: String, name: String },

    /// Malformed or inconsistent request parameters
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Metric store, inference service or task queue failure
    #[error("{source_name} failed: {message}")]
    Upstream {
        source_name: &'static str,
        message: String,
    },

    /// Corrupt or incompatible serialized forecast payload
    #[error("Failed to decode forecast payload: {0}")]
    Decode(String),
}

impl RightsizingError {
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn not_unique(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotUnique {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn upstream(source_name: &'static str, message: impl Into<String>) -> Self {
        Self::Upstream {
            source_name,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Only upstream failures are worth another attempt; lookups and
    /// decode errors fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream { .. })
    }
}

impl From<sqlx::Error> for RightsizingError {
    fn from(err: sqlx::Error) -> Self {
        Self::upstream("metric-store", err.to_string())
    }
}

impl From<tonic::Status> for RightsizingError {
    fn from(status: tonic::Status) -> Self {
        Self::upstream(
            "inference",
            format!("{:?}: {}", status.code(), status.message()),
        )
    }
}

impl From<tonic::transport::Error> for RightsizingError {
    fn from(err: tonic::transport::Error) -> Self {
        Self::upstream("inference", err.to_string())
    }
}

impl From<serde_json::Error> for RightsizingError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<base64::DecodeError> for RightsizingError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            RightsizingError::not_found("vm", "db1").to_string(),
            "vm db1 not found"
        );
        assert_eq!(
            RightsizingError::not_unique("vm", "db1").to_string(),
            "multiple vm db1 exist"
        );
    }

    #[test]
    fn test_only_upstream_is_retryable() {
        assert!(RightsizingError::upstream("task-queue", "broker down").is_retryable());
        assert!(!RightsizingError::not_found("pod", "all").is_retryable());
        assert!(!RightsizingError::Decode("bad".into()).is_retryable());
        assert!(!RightsizingError::Validation("end before start".into()).is_retryable());
    }
}
