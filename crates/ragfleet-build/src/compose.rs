//! Build recipes from docker-compose.yml
//!
//! Services with a `build:` entry are built locally and pushed. Before the
//! compose file is shipped to the node, each `build:` entry is replaced by the
//! pushed `image:` reference so the node only ever pulls.

use crate::error::{BuildError, BuildResult};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const SENSITIVE_ARG_PATTERNS: [&str; 5] = ["password", "token", "secret", "api_key", "private_key"];

/// One service image to build
#[derive(Debug, Clone, PartialEq)]
pub struct BuildRecipe {
    pub service: String,
    pub context: PathBuf,
    pub dockerfile: PathBuf,
    pub args: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ComposeFile {
    path: PathBuf,
    document: Value,
}

impl ComposeFile {
    pub fn load(path: &Path) -> BuildResult<Self> {
        if !path.is_file() {
            return Err(BuildError::ComposeNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(path, &content)
    }

    pub fn parse(path: &Path, content: &str) -> BuildResult<Self> {
        let document: Value = serde_yaml::from_str(content).map_err(|e| BuildError::InvalidCompose {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let compose = Self {
            path: path.to_path_buf(),
            document,
        };
        compose.services()?;
        Ok(compose)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory relative build contexts are resolved against
    fn base_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    fn services(&self) -> BuildResult<&Mapping> {
        self.document
            .get("services")
            .and_then(Value::as_mapping)
            .ok_or_else(|| self.invalid("missing `services` mapping"))
    }

    fn invalid(&self, message: impl Into<String>) -> BuildError {
        BuildError::InvalidCompose {
            path: self.path.clone(),
            message: message.into(),
        }
    }

    /// Names of all declared services, in file order
    pub fn service_names(&self) -> BuildResult<Vec<String>> {
        Ok(self
            .services()?
            .keys()
            .filter_map(|k| k.as_str().map(str::to_string))
            .collect())
    }

    /// Resolve every `build:` entry into a recipe with checked paths
    pub fn recipes(&self) -> BuildResult<Vec<BuildRecipe>> {
        let mut recipes = Vec::new();

        for (name, service) in self.services()? {
            let Some(name) = name.as_str() else {
                return Err(self.invalid("service names must be strings"));
            };
            let Some(build) = service.get("build") else {
                tracing::debug!(service = %name, "No build entry, image is pulled as declared");
                continue;
            };

            let recipe = self.recipe(name, build)?;
            tracing::debug!(
                service = %name,
                context = %recipe.context.display(),
                dockerfile = %recipe.dockerfile.display(),
                "Resolved build recipe"
            );
            recipes.push(recipe);
        }

        Ok(recipes)
    }

    fn recipe(&self, service: &str, build: &Value) -> BuildResult<BuildRecipe> {
        let (context, dockerfile, args) = match build {
            Value::String(context) => (context.as_str(), "Dockerfile", BTreeMap::new()),
            Value::Mapping(map) => {
                let context = map.get("context").and_then(Value::as_str).unwrap_or(".");
                let dockerfile = map
                    .get("dockerfile")
                    .and_then(Value::as_str)
                    .unwrap_or("Dockerfile");
                let args = match map.get("args") {
                    Some(args) => self.build_args(service, args)?,
                    None => BTreeMap::new(),
                };
                (context, dockerfile, args)
            }
            _ => {
                return Err(self.invalid(format!(
                    "service {}: `build` must be a path or a mapping",
                    service
                )));
            }
        };

        let context = self.base_dir().join(context);
        if !context.is_dir() {
            return Err(BuildError::ContextNotFound(context));
        }

        let dockerfile = context.join(dockerfile);
        if !dockerfile.is_file() {
            return Err(BuildError::DockerfileNotFound(dockerfile));
        }

        for key in args.keys() {
            warn_if_sensitive(service, key);
        }

        Ok(BuildRecipe {
            service: service.to_string(),
            context,
            dockerfile,
            args,
        })
    }

    /// `args` is either a mapping or a list of `KEY=VALUE` strings
    fn build_args(&self, service: &str, args: &Value) -> BuildResult<BTreeMap<String, String>> {
        match args {
            Value::Mapping(map) => map
                .iter()
                .map(|(k, v)| {
                    let key = k
                        .as_str()
                        .ok_or_else(|| self.invalid(format!("service {}: non-string build arg", service)))?;
                    Ok((key.to_string(), scalar_to_string(v)))
                })
                .collect(),
            Value::Sequence(items) => items
                .iter()
                .map(|item| {
                    let entry = item
                        .as_str()
                        .ok_or_else(|| self.invalid(format!("service {}: non-string build arg", service)))?;
                    let (key, value) = entry.split_once('=').unwrap_or((entry, ""));
                    Ok((key.to_string(), value.to_string()))
                })
                .collect(),
            _ => Err(self.invalid(format!(
                "service {}: `build.args` must be a mapping or a list",
                service
            ))),
        }
    }

    /// Replace every `build:` entry with the pushed image reference
    pub fn rewrite(&self, images: &BTreeMap<String, String>) -> BuildResult<String> {
        let mut document = self.document.clone();
        let services = document
            .get_mut("services")
            .and_then(Value::as_mapping_mut)
            .ok_or_else(|| self.invalid("missing `services` mapping"))?;

        for (name, service) in services.iter_mut() {
            let Some(service) = service.as_mapping_mut() else {
                continue;
            };
            if service.remove("build").is_none() {
                continue;
            }

            let name = name.as_str().unwrap_or_default();
            let image = images.get(name).ok_or_else(|| {
                BuildError::InvalidConfig(format!("no pushed image for service {}", name))
            })?;
            service.insert(Value::from("image"), Value::from(image.as_str()));
        }

        Ok(serde_yaml::to_string(&document)?)
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// Build args end up in the image history
fn warn_if_sensitive(service: &str, key: &str) {
    let key_lower = key.to_lowercase();
    if SENSITIVE_ARG_PATTERNS.iter().any(|p| key_lower.contains(p)) {
        tracing::warn!(
            service = %service,
            arg = %key,
            "Build arg looks sensitive and will be recorded in the image history"
        );
    }
}
