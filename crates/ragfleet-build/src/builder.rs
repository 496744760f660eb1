use crate::context::BuildContext;
use crate::error::{BuildError, BuildResult};
use crate::progress::BuildProgress;
use bollard::Docker;
use bollard::image::BuildImageOptions;
use bytes::Bytes;
use futures_util::stream::StreamExt;
use http_body_util::{Either, Full};
use std::collections::{BTreeMap, HashMap};

/// The node is an x86_64 instance regardless of where the build runs
pub const TARGET_PLATFORM: &str = "linux/amd64";

pub struct ImageBuilder {
    docker: Docker,
}

impl ImageBuilder {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Build `context` and tag the result as `tag`
    pub async fn build_image(
        &self,
        service: &str,
        context: BuildContext,
        tag: &str,
        build_args: &BTreeMap<String, String>,
    ) -> BuildResult<()> {
        tracing::info!(service = %service, tag = %tag, platform = TARGET_PLATFORM, "Building image");

        let buildargs: HashMap<&str, &str> = build_args
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        #[allow(deprecated)]
        let options = BuildImageOptions {
            dockerfile: context.dockerfile.as_str(),
            t: tag,
            buildargs,
            platform: TARGET_PLATFORM,
            rm: true,
            forcerm: true,
            pull: true,
            ..Default::default()
        };

        let body = Full::new(Bytes::from(context.archive));
        #[allow(deprecated)]
        let mut stream = self.docker.build_image(options, None, Some(Either::Left(body)));

        let progress = BuildProgress::new("Building", service);
        while let Some(msg) = stream.next().await {
            let outcome = match msg {
                Ok(info) => handle_build_output(service, &progress, info),
                Err(e) => Err(BuildError::DockerConnection(e)),
            };
            if let Err(e) = outcome {
                progress.finish_error(&e.to_string());
                return Err(e);
            }
        }

        progress.finish_success(&format!("Built {}", tag));
        tracing::info!(service = %service, tag = %tag, "Image built");
        Ok(())
    }
}

fn handle_build_output(
    service: &str,
    progress: &BuildProgress,
    output: bollard::models::BuildInfo,
) -> BuildResult<()> {
    if let Some(detail) = output.error_detail.and_then(|d| d.message) {
        return Err(BuildError::BuildFailed {
            service: service.to_string(),
            message: detail,
        });
    }

    if let Some(error) = output.error {
        return Err(BuildError::BuildFailed {
            service: service.to_string(),
            message: error,
        });
    }

    if let Some(line) = output.stream.as_deref().or(output.status.as_deref()) {
        tracing::debug!(service = %service, "{}", line.trim_end());
        progress.set_message(line);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{BuildInfo, ErrorDetail};

    #[test]
    fn test_error_detail_fails_the_build() {
        let progress = BuildProgress::new("Building", "api");
        let info = BuildInfo {
            error_detail: Some(ErrorDetail {
                code: Some(1),
                message: Some("RUN pip install: exit code 1".into()),
            }),
            ..Default::default()
        };

        let err = handle_build_output("api", &progress, info).unwrap_err();
        assert!(err.to_string().contains("exit code 1"));
        assert!(err.to_string().contains("api"));
    }

    #[test]
    fn test_stream_lines_pass() {
        let progress = BuildProgress::new("Building", "ui");
        let info = BuildInfo {
            stream: Some("Step 1/4 : FROM python:3.11\n".into()),
            ..Default::default()
        };
        assert!(handle_build_output("ui", &progress, info).is_ok());
    }

    #[tokio::test]
    #[ignore] // needs a Docker daemon
    async fn test_build_simple_image() {
        use crate::context::ContextBuilder;
        use std::fs;
        use tempfile::tempdir;

        let docker = Docker::connect_with_local_defaults().unwrap();
        let builder = ImageBuilder::new(docker.clone());

        let temp_dir = tempdir().unwrap();
        let dockerfile = temp_dir.path().join("Dockerfile");
        fs::write(&dockerfile, "FROM alpine:latest\nCMD echo 'test'").unwrap();
        let context = ContextBuilder::create_context(temp_dir.path(), &dockerfile).unwrap();

        builder
            .build_image("test", context, "ragfleet-test:latest", &BTreeMap::new())
            .await
            .unwrap();

        assert!(docker.inspect_image("ragfleet-test:latest").await.is_ok());
    }
}
