//! AWS error classification
//!
//! SDK errors are classified by their service error code (`.code()`),
//! never by matching on the Debug text.

use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use ec2flow_cloud::CloudError;
use std::error::Error as StdError;
use std::fmt::Debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error(
        "no credentials for profile '{profile}': {message}\n\
        Run 'aws configure --profile {profile}' to set them"
    )]
    Credentials { profile: String, message: String },

    #[error(transparent)]
    Cloud(#[from] CloudError),
}

pub type Result<T> = std::result::Result<T, AwsError>;

/// Codes returned when the caller lacks IAM permission
const AUTHORIZATION_CODES: &[&str] = &[
    "UnauthorizedOperation",
    "AuthFailure",
    "UnauthorizedAccess",
];

/// Map a service error code and message onto the provider error taxonomy.
pub fn classify_aws_error(code: Option<&str>, message: Option<&str>) -> CloudError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if AUTHORIZATION_CODES.contains(&c) || c.starts_with("AccessDenied") => {
            CloudError::Authorization(format!("{}: {}", c, message))
        }
        Some(c) if c.ends_with(".NotFound") => CloudError::ResourceNotFound(message),
        Some(c) => CloudError::Client {
            code: Some(c.to_string()),
            message,
        },
        None => CloudError::Client {
            code: None,
            message,
        },
    }
}

/// Convert an SDK operation error.
///
/// Service errors are classified by code; anything that never got a
/// service response (dispatch, timeout, construction) is a transport error.
pub fn from_sdk_error<E, R>(err: SdkError<E, R>) -> CloudError
where
    E: ProvideErrorMetadata + StdError + 'static,
    R: Debug,
{
    match &err {
        SdkError::ServiceError(service) => {
            let service = service.err();
            classify_aws_error(service.code(), service.message())
        }
        _ => CloudError::Transport(DisplayErrorContext(&err).to_string()),
    }
}
