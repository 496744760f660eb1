//! Image build and publish for ragfleet
//!
//! Build recipes come from the project's `docker-compose.yml`. Each one is
//! archived, built through the Docker Engine API for `linux/amd64`, tagged
//! with its registry-qualified name and pushed using a short-lived registry
//! token. The compose file is then rewritten to reference the pushed images.

pub mod auth;
pub mod builder;
pub mod compose;
pub mod context;
pub mod error;
pub mod progress;
pub mod publisher;
pub mod pusher;

pub use auth::{RegistryAuth, extract_registry, registry_host};
pub use builder::{ImageBuilder, TARGET_PLATFORM};
pub use compose::{BuildRecipe, ComposeFile};
pub use context::{BuildContext, ContextBuilder};
pub use error::{BuildError, BuildResult};
pub use progress::BuildProgress;
pub use publisher::{DEFAULT_TAG, ImagePublisher, ensure_known_services, repository_uri};
pub use pusher::{ImagePusher, validate_tag};
