//! Build and push every compose recipe to the stack's registries

use crate::auth::RegistryAuth;
use crate::builder::ImageBuilder;
use crate::compose::BuildRecipe;
use crate::context::ContextBuilder;
use crate::error::{BuildError, BuildResult};
use crate::pusher::ImagePusher;
use bollard::Docker;
use colored::Colorize;
use std::collections::BTreeMap;

pub const DEFAULT_TAG: &str = "latest";

/// `<registry>/<stack>-<service>`
pub fn repository_uri(registry: &str, stack: &str, service: &str) -> String {
    format!("{}/{}-{}", registry, stack, service)
}

/// Every recipe must map onto a provisioned registry
pub fn ensure_known_services(recipes: &[BuildRecipe], known: &[&str]) -> BuildResult<()> {
    let unknown: Vec<&str> = recipes
        .iter()
        .map(|r| r.service.as_str())
        .filter(|s| !known.contains(s))
        .collect();

    if unknown.is_empty() {
        Ok(())
    } else {
        Err(BuildError::InvalidConfig(format!(
            "no registry is provisioned for service(s) {}; expected one of {}",
            unknown.join(", "),
            known.join(", ")
        )))
    }
}

pub struct ImagePublisher {
    builder: ImageBuilder,
    pusher: ImagePusher,
    registry: String,
    stack: String,
}

impl ImagePublisher {
    pub fn new(docker: Docker, auth: RegistryAuth, stack: impl Into<String>) -> Self {
        Self {
            builder: ImageBuilder::new(docker.clone()),
            registry: auth.registry().to_string(),
            pusher: ImagePusher::new(docker, auth),
            stack: stack.into(),
        }
    }

    /// Build then push each recipe in order; returns service → pushed image
    ///
    /// The first failure aborts the remaining recipes.
    pub async fn publish(&self, recipes: &[BuildRecipe]) -> BuildResult<BTreeMap<String, String>> {
        let mut images = BTreeMap::new();

        for recipe in recipes {
            let repository = repository_uri(&self.registry, &self.stack, &recipe.service);
            let local_tag = format!("{}:{}", repository, DEFAULT_TAG);

            println!("{} {}", "▶".blue(), recipe.service.bold());
            let context = ContextBuilder::create_context(&recipe.context, &recipe.dockerfile)?;
            self.builder
                .build_image(&recipe.service, context, &local_tag, &recipe.args)
                .await?;

            let pushed = self.pusher.push(&repository, DEFAULT_TAG).await?;
            images.insert(recipe.service.clone(), pushed);
        }

        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn recipe(service: &str) -> BuildRecipe {
        BuildRecipe {
            service: service.to_string(),
            context: PathBuf::from("."),
            dockerfile: PathBuf::from("Dockerfile"),
            args: BTreeMap::new(),
        }
    }

    #[test]
    fn test_repository_uri() {
        assert_eq!(
            repository_uri("123456789012.dkr.ecr.us-east-1.amazonaws.com", "rag-system", "api"),
            "123456789012.dkr.ecr.us-east-1.amazonaws.com/rag-system-api"
        );
    }

    #[test]
    fn test_known_services() {
        assert!(ensure_known_services(&[recipe("api"), recipe("ui")], &["api", "ui"]).is_ok());

        let err = ensure_known_services(&[recipe("api"), recipe("worker")], &["api", "ui"])
            .unwrap_err();
        assert!(err.to_string().contains("worker"));
        assert!(!err.to_string().contains("service(s) api"));
    }
}
