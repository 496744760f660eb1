//! Image push to the container registry

use crate::auth::RegistryAuth;
use crate::error::{BuildError, BuildResult};
use crate::progress::BuildProgress;
use bollard::Docker;
use bollard::models::PushImageInfo;
use futures_util::StreamExt;

pub struct ImagePusher {
    docker: Docker,
    auth: RegistryAuth,
}

impl ImagePusher {
    pub fn new(docker: Docker, auth: RegistryAuth) -> Self {
        Self { docker, auth }
    }

    /// Push `image:tag` and return the full reference
    pub async fn push(&self, image: &str, tag: &str) -> BuildResult<String> {
        validate_tag(tag)?;
        let full_image = format!("{}:{}", image, tag);
        let credentials = self.auth.credentials_for(&full_image)?;

        #[allow(deprecated)]
        let options = bollard::image::PushImageOptions::<String> {
            tag: tag.to_string(),
        };

        tracing::info!(image = %full_image, "Pushing image");
        let progress = BuildProgress::new("Pushing", &full_image);

        #[allow(deprecated)]
        let mut stream = self
            .docker
            .push_image(image, Some(options), Some(credentials));

        while let Some(result) = stream.next().await {
            let info = match result {
                Ok(info) => info,
                Err(e) => {
                    progress.finish_error(&e.to_string());
                    return Err(BuildError::PushFailed {
                        image: full_image,
                        message: e.to_string(),
                    });
                }
            };

            if let Some(message) = push_error(&info) {
                progress.finish_error(&message);
                return Err(BuildError::PushFailed {
                    image: full_image,
                    message,
                });
            }
            if let Some(status) = &info.status {
                tracing::debug!(image = %full_image, status = %status, "Push progress");
                progress.set_message(&format!(
                    "{} {}",
                    status,
                    info.progress.as_deref().unwrap_or("")
                ));
            }
        }

        progress.finish_success(&format!("Pushed {}", full_image));
        Ok(full_image)
    }
}

fn push_error(info: &PushImageInfo) -> Option<String> {
    info.error.clone().filter(|e| !e.is_empty())
}

/// Docker tag rules: 1..=128 chars of `[A-Za-z0-9_.-]`, not starting with `.` or `-`
pub fn validate_tag(tag: &str) -> BuildResult<()> {
    if tag.is_empty() {
        return Err(BuildError::InvalidTag {
            tag: "(empty)".to_string(),
        });
    }

    if tag.len() > 128 {
        return Err(BuildError::InvalidTag {
            tag: format!("{} characters, max 128", tag.len()),
        });
    }

    let valid_chars = tag
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if tag.starts_with(['.', '-']) || !valid_chars {
        return Err(BuildError::InvalidTag {
            tag: tag.to_string(),
        });
    }

    Ok(())
}
