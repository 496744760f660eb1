//! AWS provider for ragfleet
//!
//! Implements the `ragfleet-cloud` traits on top of the `aws` CLI and owns
//! the CloudFormation template of the document-QA environment.
//!
//! # Requirements
//!
//! - `aws` CLI v2 must be installed
//! - Credentials are resolved by the CLI (environment, profile or SSO)
//!
//! # Example
//!
//! ```ignore
//! use ragfleet_cloud::{CredentialProbe, StackApi};
//! use ragfleet_cloud_aws::AwsProvider;
//!
//! let provider = AwsProvider::new("us-east-1");
//!
//! let auth = provider.check_auth().await?;
//! if !auth.authenticated {
//!     panic!("Not authenticated: {:?}", auth.error);
//! }
//!
//! let state = provider.stack_state("rag-system").await?;
//! ```

pub mod awscli;
pub mod error;
pub mod provider;
pub mod template;
pub mod user_data;

pub use awscli::{AwsCli, EcrAuthorization, StaticCredentials};
pub use error::{AwsError, Result};
pub use provider::AwsProvider;
pub use template::{IMAGE_NAME_FILTER, ParameterSet, StackTemplate, build_descriptor};
pub use user_data::{BootstrapContext, render_bootstrap};
