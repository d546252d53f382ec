//! AWS EC2 provider for ec2flow
//!
//! Implements [`ec2flow_cloud::ComputeProvider`] on top of `aws-sdk-ec2`.
//! Every trait method is a single EC2 API call (paginated where the API
//! pages); SDK errors are classified into [`ec2flow_cloud::CloudError`].

pub mod context;
pub mod error;
pub mod provider;

pub use context::{AwsContext, MaskedCredentials, mask};
pub use error::{AwsError, Result, classify_aws_error, from_sdk_error};
pub use provider::{Ec2Provider, Ec2ProviderFactory};
