//! Compute provider error types

use thiserror::Error;

/// Errors reported by a compute provider or by the polling helpers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloudError {
    /// The provider denied the call for lack of permission.
    #[error("Access denied: {0}")]
    Authorization(String),

    /// The provider rejected the request (bad parameters, wrong state, ...).
    #[error("{}", client_message(.code, .message))]
    Client {
        code: Option<String>,
        message: String,
    },

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// The request never got a provider answer (DNS, TLS, dispatch, ...).
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// A polled resource reached a state from which the awaited one is unreachable.
    #[error("{resource_id} entered unexpected state '{state}' while waiting for '{expected}'")]
    UnexpectedState {
        resource_id: String,
        state: String,
        expected: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

fn client_message(code: &Option<String>, message: &str) -> String {
    match code {
        Some(code) => format!("An error occurred ({}): {}", code, message),
        None => format!("An error occurred: {}", message),
    }
}

impl CloudError {
    pub fn client(code: impl Into<String>, message: impl Into<String>) -> Self {
        CloudError::Client {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    pub fn is_authorization(&self) -> bool {
        matches!(self, CloudError::Authorization(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::ResourceNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

/// Fatal errors raised while selecting the working set.
///
/// Nothing has been mutated when one of these is returned, so the whole
/// command aborts instead of isolating the failure.
#[derive(Error, Debug)]
pub enum SelectionError {
    #[error(
        "profile '{profile}' does not have the required permissions in {region}: {message}\n\
        Check the IAM EC2 access policy associated with this user"
    )]
    Authorization {
        profile: String,
        region: String,
        message: String,
    },

    #[error("failed to query instances in {region}: {source}")]
    Query {
        region: String,
        #[source]
        source: CloudError,
    },
}

impl SelectionError {
    /// Promote a provider error raised by the initial listing query.
    pub fn from_query(profile: &str, region: &str, error: CloudError) -> Self {
        match error {
            CloudError::Authorization(message) => SelectionError::Authorization {
                profile: profile.to_string(),
                region: region.to_string(),
                message,
            },
            source => SelectionError::Query {
                region: region.to_string(),
                source,
            },
        }
    }

    pub fn is_authorization(&self) -> bool {
        matches!(self, SelectionError::Authorization { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_display() {
        let err = CloudError::client("IncorrectInstanceState", "instance is not running");
        assert_eq!(
            err.to_string(),
            "An error occurred (IncorrectInstanceState): instance is not running"
        );

        let err = CloudError::Client {
            code: None,
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "An error occurred: boom");
    }

    #[test]
    fn test_authorization_becomes_fatal_selection_error() {
        let err = SelectionError::from_query(
            "ops",
            "us-east-1",
            CloudError::Authorization("not authorized to DescribeInstances".to_string()),
        );
        assert!(err.is_authorization());
        let msg = err.to_string();
        assert!(msg.contains("ops"));
        assert!(msg.contains("IAM EC2 access policy"));
    }

    #[test]
    fn test_other_errors_become_query_errors() {
        let err = SelectionError::from_query(
            "ops",
            "eu-west-1",
            CloudError::Transport("dns failure".to_string()),
        );
        assert!(!err.is_authorization());
        assert!(err.to_string().contains("eu-west-1"));
    }
}
