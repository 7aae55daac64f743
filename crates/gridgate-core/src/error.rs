use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors that can occur while provisioning gateway primitives
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Malformed input: bad domain, empty required field, invalid IP or key.
    /// Always raised before any store or device mutation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Ownership conflict on a zone, label, routing domain
    #[error("unauthorized: cannot {action} {resource}")]
    Unauthorized {
        /// What the caller tried to do
        action: String,
        /// The zone, label or domain that is owned by someone else
        resource: String,
    },

    /// A collaborator could not find the requested resource
    #[error("resource not found: {resource}")]
    NotFound {
        /// Description of the resource that wasn't found
        resource: String,
    },

    /// Configuration store unreachable or returned garbage
    #[error("storage error: {0}")]
    Storage(String),

    /// Tunnel device or namespace call failed
    #[error("device error: {0}")]
    Device(String),

    /// Operation exceeded its deadline
    #[error("operation timed out after {0} seconds")]
    Timeout(u64),

    /// Identity directory lookup failed
    #[error("identity directory error: {0}")]
    Directory(String),

    /// Workload type not handled by this gateway
    #[error("unsupported workload type: {0}")]
    Unsupported(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON parsing/serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Shorthand for a [`GatewayError::Validation`]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Shorthand for a [`GatewayError::Unauthorized`]
    pub fn unauthorized(action: impl Into<String>, resource: impl Into<String>) -> Self {
        Self::Unauthorized {
            action: action.into(),
            resource: resource.into(),
        }
    }

    /// Returns true if the dispatcher may retry the same request later
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::Device(_) | Self::Timeout(_) | Self::Directory(_) | Self::Io(_)
        )
    }

    /// Returns true if the error is an ownership conflict
    #[must_use]
    pub const fn is_auth_error(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Returns true if the request itself was malformed
    #[must_use]
    pub const fn is_validation_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(GatewayError::Storage("down".into()).is_retryable());
        assert!(GatewayError::Timeout(10).is_retryable());
        assert!(!GatewayError::validation("bad").is_retryable());

        let err = GatewayError::unauthorized("claim", "a.grid.example.com");
        assert!(err.is_auth_error());
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "unauthorized: cannot claim a.grid.example.com"
        );
    }
}
