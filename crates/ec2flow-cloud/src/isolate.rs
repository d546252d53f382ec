//! Per-resource error isolation
//!
//! Batch operations run one provider call per resource. A failing call must
//! not abort the batch, so it is turned into an [`Outcome::Isolated`] value
//! that the caller branches on before moving to the next resource.

use crate::error::CloudError;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use tracing::warn;

/// Appended to a contained failure when the provider refused the call
pub(crate) const AUTHORIZATION_HINT: &str =
    "Check the IAM EC2 access policy associated with this profile";

/// A provider call that failed for one resource and was contained
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IsolatedFailure {
    pub resource_id: String,
    /// Short name of the operation that failed (e.g. "stop", "wait-stopped")
    pub step: String,
    #[serde(serialize_with = "serialize_error")]
    pub error: CloudError,
}

fn serialize_error<S: serde::Serializer>(
    error: &CloudError,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

impl fmt::Display for IsolatedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "can't {} {}. {}",
            self.step, self.resource_id, self.error
        )?;
        if self.error.is_authorization() {
            write!(f, ". {}", AUTHORIZATION_HINT)?;
        }
        Ok(())
    }
}

/// Result of one per-resource call: the value, or a contained failure
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Ok(T),
    Isolated(IsolatedFailure),
}

impl<T> Outcome<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Outcome::Ok(v) => Some(v),
            Outcome::Isolated(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&IsolatedFailure> {
        match self {
            Outcome::Ok(_) => None,
            Outcome::Isolated(f) => Some(f),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Ok(v) => Outcome::Ok(f(v)),
            Outcome::Isolated(failure) => Outcome::Isolated(failure),
        }
    }

    pub fn into_result(self) -> Result<T, IsolatedFailure> {
        match self {
            Outcome::Ok(v) => Ok(v),
            Outcome::Isolated(f) => Err(f),
        }
    }
}

impl<T: Serialize> Serialize for Outcome<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Outcome::Ok(v) => v.serialize(serializer),
            Outcome::Isolated(f) => f.serialize(serializer),
        }
    }
}

/// Run a single provider call for `resource_id`, containing its failure.
///
/// Success passes the value through unchanged. A failure is logged with
/// the resource id and the provider's error text and comes back as
/// [`Outcome::Isolated`]; it is never propagated.
pub async fn isolate<T, Fut>(resource_id: &str, step: &str, call: Fut) -> Outcome<T>
where
    Fut: Future<Output = Result<T, CloudError>>,
{
    match call.await {
        Ok(value) => Outcome::Ok(value),
        Err(error) => {
            warn!(resource_id = %resource_id, step = %step, error = %error, "Isolated failure");
            Outcome::Isolated(IsolatedFailure {
                resource_id: resource_id.to_string(),
                step: step.to_string(),
                error,
            })
        }
    }
}
