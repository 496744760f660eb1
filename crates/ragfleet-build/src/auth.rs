//! Registry authentication
//!
//! ECR hands out a base64 `AWS:<password>` token valid for a few hours. It is
//! decoded into Bollard `DockerCredentials` for the registry host.

use crate::error::{BuildError, BuildResult};
use base64::Engine;
use bollard::auth::DockerCredentials;
use std::fmt;

/// Credentials for a single registry host
#[derive(Clone)]
pub struct RegistryAuth {
    registry: String,
    username: String,
    password: String,
}

impl fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("registry", &self.registry)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl RegistryAuth {
    /// Decode an ECR authorization token
    ///
    /// `proxy_endpoint` is the `https://<account>.dkr.ecr.<region>.amazonaws.com`
    /// value returned next to the token.
    pub fn from_authorization_token(token: &str, proxy_endpoint: &str) -> BuildResult<Self> {
        let registry = registry_host(proxy_endpoint);
        let fail = |message: String| BuildError::AuthFailed {
            registry: registry.clone(),
            message,
        };

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(token.trim())
            .map_err(|e| fail(format!("Failed to decode token: {}", e)))?;
        let decoded =
            String::from_utf8(decoded).map_err(|e| fail(format!("Invalid UTF-8 in token: {}", e)))?;

        let (username, password) = decoded
            .split_once(':')
            .ok_or_else(|| fail("Token is not of the form user:password".to_string()))?;

        tracing::debug!(registry = %registry, user = %username, "Decoded registry token");
        Ok(Self {
            registry: registry.clone(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// Credentials for pushing `image`, which must live on this registry
    pub fn credentials_for(&self, image: &str) -> BuildResult<DockerCredentials> {
        let target = extract_registry(image);
        if target != self.registry {
            return Err(BuildError::AuthFailed {
                registry: target,
                message: format!("only holding credentials for {}", self.registry),
            });
        }

        Ok(DockerCredentials {
            username: Some(self.username.clone()),
            password: Some(self.password.clone()),
            serveraddress: Some(self.registry.clone()),
            ..Default::default()
        })
    }
}

/// `https://host/` → `host`
pub fn registry_host(endpoint: &str) -> String {
    endpoint
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string()
}

/// Registry part of an image reference
///
/// # Examples
/// - `123456.dkr.ecr.region.amazonaws.com/app` -> `123456.dkr.ecr.region.amazonaws.com`
/// - `localhost:5000/app` -> `localhost:5000`
/// - `myuser/app:tag` -> `docker.io`
pub fn extract_registry(image: &str) -> String {
    match image.split_once('/') {
        Some((first, _)) if first.contains('.') || first.contains(':') => first.to_string(),
        _ => "docker.io".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENDPOINT: &str = "https://123456789012.dkr.ecr.us-east-1.amazonaws.com";

    fn token(raw: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(raw)
    }

    #[test]
    fn test_decode_token() {
        let auth = RegistryAuth::from_authorization_token(&token("AWS:s3cr3t"), ENDPOINT).unwrap();
        assert_eq!(auth.registry(), "123456789012.dkr.ecr.us-east-1.amazonaws.com");

        let creds = auth
            .credentials_for("123456789012.dkr.ecr.us-east-1.amazonaws.com/rag-system-api:latest")
            .unwrap();
        assert_eq!(creds.username.as_deref(), Some("AWS"));
        assert_eq!(creds.password.as_deref(), Some("s3cr3t"));
    }

    #[test]
    fn test_debug_hides_password() {
        let auth = RegistryAuth::from_authorization_token(&token("AWS:s3cr3t"), ENDPOINT).unwrap();
        assert!(!format!("{:?}", auth).contains("s3cr3t"));
    }

    #[test]
    fn test_rejects_malformed_tokens() {
        tokio_test::assert_err!(RegistryAuth::from_authorization_token("%%%", ENDPOINT));
        tokio_test::assert_err!(RegistryAuth::from_authorization_token(&token("no-colon"), ENDPOINT));
    }

    #[test]
    fn test_refuses_foreign_registry() {
        let auth = RegistryAuth::from_authorization_token(&token("AWS:pw"), ENDPOINT).unwrap();
        let err = auth.credentials_for("ghcr.io/org/app:latest").unwrap_err();
        assert!(matches!(err, BuildError::AuthFailed { registry, .. } if registry == "ghcr.io"));
    }

    #[test]
    fn test_registry_host() {
        assert_eq!(registry_host(ENDPOINT), "123456789012.dkr.ecr.us-east-1.amazonaws.com");
        assert_eq!(registry_host("https://localhost:5000/"), "localhost:5000");
    }

    #[test]
    fn test_extract_registry() {
        assert_eq!(
            extract_registry("123456789.dkr.ecr.ap-northeast-1.amazonaws.com/app"),
            "123456789.dkr.ecr.ap-northeast-1.amazonaws.com"
        );
        assert_eq!(extract_registry("localhost:5000/myapp"), "localhost:5000");
        assert_eq!(extract_registry("myuser/app:latest"), "docker.io");
        assert_eq!(extract_registry("nginx:alpine"), "docker.io");
    }
}
