//! aws CLI wrapper
//!
//! Every control-plane call shells out to `aws ... --output json` and parses
//! the response into the structs below.

use crate::error::{AwsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::process::Stdio;
use tokio::process::Command;

/// Arguments whose values never reach the log
const SENSITIVE_FLAGS: [&str; 3] = ["--parameters", "--template-body", "--change-batch"];

/// Batch limit of `s3api delete-objects`
const DELETE_BATCH: usize = 1000;

/// Static credentials passed to each child process, never to our own environment
#[derive(Clone)]
pub struct StaticCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl StaticCredentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
        }
    }

    fn apply(&self, cmd: &mut Command) {
        cmd.env("AWS_ACCESS_KEY_ID", &self.access_key_id);
        cmd.env("AWS_SECRET_ACCESS_KEY", &self.secret_access_key);
        match &self.session_token {
            Some(token) => cmd.env("AWS_SESSION_TOKEN", token),
            None => cmd.env_remove("AWS_SESSION_TOKEN"),
        };
    }
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

/// aws CLI wrapper bound to one region
#[derive(Debug, Clone)]
pub struct AwsCli {
    region: String,
    credentials: Option<StaticCredentials>,
}

impl AwsCli {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            credentials: None,
        }
    }

    /// Use these credentials instead of whatever the CLI would resolve
    pub fn with_credentials(mut self, credentials: StaticCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Check that the CLI exists and the credentials are accepted
    pub async fn caller_identity(&self) -> Result<CallerIdentity> {
        let which = Command::new("which").arg("aws").output().await?;
        if !which.status.success() {
            return Err(AwsError::AwsCliNotFound);
        }

        let output = self
            .run_command(&["sts", "get-caller-identity"])
            .await
            .map_err(|e| match e {
                AwsError::CommandFailed { stderr, .. } => {
                    AwsError::AuthenticationFailed(stderr.trim().to_string())
                }
                other => other,
            })?;
        Ok(serde_json::from_str(&output)?)
    }

    /// Run an aws command and return stdout
    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new("aws");
        cmd.arg("--region").arg(&self.region);
        cmd.args(args);
        cmd.arg("--output").arg("json");
        if let Some(credentials) = &self.credentials {
            credentials.apply(&mut cmd);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: aws --region {} {}", self.region, redact(args));

        let output = cmd.output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AwsError::CommandFailed {
                command: args.iter().take(2).copied().collect::<Vec<_>>().join(" "),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn run_json<T: serde::de::DeserializeOwned>(&self, args: &[&str]) -> Result<T> {
        let output = self.run_command(args).await?;
        if output.trim().is_empty() {
            return Err(AwsError::UnexpectedOutput(format!(
                "empty response from aws {}",
                args.iter().take(2).copied().collect::<Vec<_>>().join(" ")
            )));
        }
        Ok(serde_json::from_str(&output)?)
    }

    // --- CloudFormation ---

    /// Describe a stack, `None` when it does not exist
    pub async fn describe_stack(&self, name: &str) -> Result<Option<StackSummary>> {
        match self
            .run_json::<DescribeStacks>(&["cloudformation", "describe-stacks", "--stack-name", name])
            .await
        {
            Ok(response) => Ok(response.stacks.into_iter().next()),
            Err(e) if e.stderr_contains("does not exist") => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn create_stack(&self, submission: &StackSubmission<'_>) -> Result<()> {
        let parameters = submission.parameters_json()?;
        let mut args = vec![
            "cloudformation",
            "create-stack",
            "--stack-name",
            submission.name,
            "--template-body",
            submission.template_body,
            "--parameters",
            parameters.as_str(),
        ];
        if !submission.capabilities.is_empty() {
            args.push("--capabilities");
            args.extend(submission.capabilities.iter().copied());
        }
        self.run_command(&args).await?;
        Ok(())
    }

    /// Submit an update; `Ok(false)` when there is nothing to update
    pub async fn update_stack(&self, submission: &StackSubmission<'_>) -> Result<bool> {
        let parameters = submission.parameters_json()?;
        let mut args = vec![
            "cloudformation",
            "update-stack",
            "--stack-name",
            submission.name,
            "--template-body",
            submission.template_body,
            "--parameters",
            parameters.as_str(),
        ];
        if !submission.capabilities.is_empty() {
            args.push("--capabilities");
            args.extend(submission.capabilities.iter().copied());
        }
        match self.run_command(&args).await {
            Ok(_) => Ok(true),
            Err(e) if e.stderr_contains("No updates are to be performed") => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn delete_stack(&self, name: &str) -> Result<()> {
        self.run_command(&["cloudformation", "delete-stack", "--stack-name", name])
            .await?;
        Ok(())
    }

    // --- EC2 ---

    pub async fn describe_images(&self, name_filter: &str) -> Result<Vec<ImageInfo>> {
        let name = format!("Name=name,Values={}", name_filter);
        let response: DescribeImages = self
            .run_json(&[
                "ec2",
                "describe-images",
                "--owners",
                "amazon",
                "--filters",
                name.as_str(),
                "Name=state,Values=available",
            ])
            .await?;
        Ok(response.images)
    }

    pub async fn key_pair_exists(&self, name: &str) -> Result<bool> {
        match self
            .run_command(&["ec2", "describe-key-pairs", "--key-names", name])
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.has_code(&["InvalidKeyPair.NotFound"]) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create an RSA key pair and return its PEM private key
    pub async fn create_key_pair(&self, name: &str) -> Result<String> {
        let response: CreatedKeyPair = self
            .run_json(&[
                "ec2",
                "create-key-pair",
                "--key-name",
                name,
                "--key-type",
                "rsa",
                "--key-format",
                "pem",
            ])
            .await
            .map_err(|e| {
                if e.has_code(&["InvalidKeyPair.Duplicate"]) {
                    AwsError::AlreadyExists(format!("key pair {}", name))
                } else {
                    e
                }
            })?;
        Ok(response.key_material)
    }

    pub async fn delete_key_pair(&self, name: &str) -> Result<()> {
        self.run_command(&["ec2", "delete-key-pair", "--key-name", name])
            .await?;
        Ok(())
    }

    // --- S3 ---

    pub async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self
            .run_command(&["s3api", "head-bucket", "--bucket", bucket])
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.stderr_contains("404") || e.stderr_contains("Not Found") => Ok(false),
            Err(e) if e.stderr_contains("403") || e.stderr_contains("Forbidden") => {
                Err(AwsError::UnexpectedOutput(format!(
                    "bucket {} exists but is not accessible with these credentials",
                    bucket
                )))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let constraint = format!("LocationConstraint={}", self.region);
        let mut args = vec!["s3api", "create-bucket", "--bucket", bucket];
        // us-east-1 rejects an explicit location constraint
        if self.region != "us-east-1" {
            args.push("--create-bucket-configuration");
            args.push(constraint.as_str());
        }

        match self.run_command(&args).await {
            Ok(_) => Ok(()),
            Err(e) if e.has_code(&["BucketAlreadyOwnedByYou"]) => {
                Err(AwsError::AlreadyExists(format!("bucket {}", bucket)))
            }
            Err(e) if e.has_code(&["BucketAlreadyExists"]) => Err(AwsError::UnexpectedOutput(
                format!("bucket name {} is taken by another account", bucket),
            )),
            Err(e) => Err(e),
        }
    }

    /// Versioning, AES256 default encryption and a full public access block
    pub async fn harden_bucket(&self, bucket: &str) -> Result<()> {
        self.run_command(&[
            "s3api",
            "put-bucket-versioning",
            "--bucket",
            bucket,
            "--versioning-configuration",
            "Status=Enabled",
        ])
        .await?;

        let encryption = serde_json::json!({
            "Rules": [{ "ApplyServerSideEncryptionByDefault": { "SSEAlgorithm": "AES256" } }]
        })
        .to_string();
        self.run_command(&[
            "s3api",
            "put-bucket-encryption",
            "--bucket",
            bucket,
            "--server-side-encryption-configuration",
            encryption.as_str(),
        ])
        .await?;

        self.run_command(&[
            "s3api",
            "put-public-access-block",
            "--bucket",
            bucket,
            "--public-access-block-configuration",
            "BlockPublicAcls=true,IgnorePublicAcls=true,BlockPublicPolicy=true,RestrictPublicBuckets=true",
        ])
        .await?;
        Ok(())
    }

    /// Delete every object version and delete marker, then the bucket
    pub async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        let listing: ObjectVersions = self
            .run_json(&["s3api", "list-object-versions", "--bucket", bucket])
            .await?;
        let objects = listing.into_identifiers();
        tracing::info!(bucket = %bucket, count = objects.len(), "Emptying bucket");

        for batch in objects.chunks(DELETE_BATCH) {
            let request = serde_json::json!({ "Objects": batch, "Quiet": true }).to_string();
            self.run_command(&[
                "s3api",
                "delete-objects",
                "--bucket",
                bucket,
                "--delete",
                request.as_str(),
            ])
            .await?;
        }

        self.run_command(&["s3api", "delete-bucket", "--bucket", bucket])
            .await?;
        Ok(())
    }

    // --- ECR ---

    pub async fn repository_exists(&self, name: &str) -> Result<bool> {
        match self
            .run_command(&["ecr", "describe-repositories", "--repository-names", name])
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.has_code(&["RepositoryNotFoundException"]) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn create_repository(&self, name: &str) -> Result<()> {
        match self
            .run_command(&["ecr", "create-repository", "--repository-name", name])
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.has_code(&["RepositoryAlreadyExistsException"]) => {
                Err(AwsError::AlreadyExists(format!("registry {}", name)))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn enable_scan_on_push(&self, name: &str) -> Result<()> {
        self.run_command(&[
            "ecr",
            "put-image-scanning-configuration",
            "--repository-name",
            name,
            "--image-scanning-configuration",
            "scanOnPush=true",
        ])
        .await?;
        Ok(())
    }

    /// Delete a repository together with its images
    pub async fn delete_repository(&self, name: &str) -> Result<()> {
        self.run_command(&["ecr", "delete-repository", "--repository-name", name, "--force"])
            .await?;
        Ok(())
    }

    /// Short-lived registry token (base64 `AWS:<password>`) and its endpoint
    pub async fn authorization_token(&self) -> Result<EcrAuthorization> {
        let response: AuthorizationResponse =
            self.run_json(&["ecr", "get-authorization-token"]).await?;
        response
            .authorization_data
            .into_iter()
            .next()
            .ok_or_else(|| AwsError::UnexpectedOutput("no authorization data".to_string()))
    }

    // --- Route 53 ---

    pub async fn list_hosted_zones(&self) -> Result<Vec<HostedZoneInfo>> {
        let response: HostedZones = self.run_json(&["route53", "list-hosted-zones"]).await?;
        Ok(response.hosted_zones)
    }

    pub async fn upsert_a_record(
        &self,
        zone_id: &str,
        name: &str,
        address: &str,
        ttl: u32,
    ) -> Result<()> {
        let batch = change_batch(name, address, ttl).to_string();
        self.run_command(&[
            "route53",
            "change-resource-record-sets",
            "--hosted-zone-id",
            zone_id,
            "--change-batch",
            batch.as_str(),
        ])
        .await?;
        Ok(())
    }
}

/// Render the argument list for logging with sensitive values masked
fn redact(args: &[&str]) -> String {
    let mut out = Vec::with_capacity(args.len());
    let mut mask_next = false;
    for arg in args {
        if mask_next {
            out.push("<redacted>");
            mask_next = false;
        } else {
            mask_next = SENSITIVE_FLAGS.contains(arg);
            out.push(arg);
        }
    }
    out.join(" ")
}

/// UPSERT change batch for a single A record
pub fn change_batch(name: &str, address: &str, ttl: u32) -> serde_json::Value {
    serde_json::json!({
        "Comment": "ragfleet",
        "Changes": [{
            "Action": "UPSERT",
            "ResourceRecordSet": {
                "Name": name,
                "Type": "A",
                "TTL": ttl,
                "ResourceRecords": [{ "Value": address }]
            }
        }]
    })
}

/// Arguments of a create-stack or update-stack call
#[derive(Debug, Clone)]
pub struct StackSubmission<'a> {
    pub name: &'a str,
    pub template_body: &'a str,
    pub parameters: &'a BTreeMap<String, String>,
    pub capabilities: Vec<&'static str>,
}

impl StackSubmission<'_> {
    /// JSON list form, immune to commas in values
    pub fn parameters_json(&self) -> Result<String> {
        let list: Vec<ParameterValue<'_>> = self
            .parameters
            .iter()
            .map(|(key, value)| ParameterValue {
                parameter_key: key,
                parameter_value: value,
            })
            .collect();
        Ok(serde_json::to_string(&list)?)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ParameterValue<'a> {
    parameter_key: &'a str,
    parameter_value: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerIdentity {
    #[serde(rename = "Account")]
    pub account: String,

    #[serde(rename = "Arn")]
    pub arn: String,
}

#[derive(Debug, Deserialize)]
struct DescribeStacks {
    #[serde(rename = "Stacks", default)]
    stacks: Vec<StackSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackSummary {
    #[serde(rename = "StackName")]
    pub stack_name: String,

    #[serde(rename = "StackStatus")]
    pub stack_status: String,

    #[serde(rename = "StackStatusReason", default)]
    pub stack_status_reason: Option<String>,

    #[serde(rename = "Outputs", default)]
    pub outputs: Vec<StackOutput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackOutput {
    #[serde(rename = "OutputKey")]
    pub output_key: String,

    #[serde(rename = "OutputValue")]
    pub output_value: String,
}

#[derive(Debug, Deserialize)]
struct DescribeImages {
    #[serde(rename = "Images", default)]
    images: Vec<ImageInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageInfo {
    #[serde(rename = "ImageId")]
    pub image_id: String,

    #[serde(rename = "Name", default)]
    pub name: String,

    /// ISO 8601, e.g. `2024-03-01T12:00:00.000Z`
    #[serde(rename = "CreationDate")]
    pub creation_date: String,
}

#[derive(Debug, Deserialize)]
struct CreatedKeyPair {
    #[serde(rename = "KeyMaterial")]
    key_material: String,
}

#[derive(Debug, Default, Deserialize)]
struct ObjectVersions {
    #[serde(rename = "Versions", default)]
    versions: Option<Vec<ObjectVersion>>,

    #[serde(rename = "DeleteMarkers", default)]
    delete_markers: Option<Vec<ObjectVersion>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ObjectVersion {
    #[serde(rename = "Key")]
    key: String,

    #[serde(rename = "VersionId")]
    version_id: String,
}

impl ObjectVersions {
    fn into_identifiers(self) -> Vec<ObjectVersion> {
        self.versions
            .unwrap_or_default()
            .into_iter()
            .chain(self.delete_markers.unwrap_or_default())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct AuthorizationResponse {
    #[serde(rename = "authorizationData", default)]
    authorization_data: Vec<EcrAuthorization>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EcrAuthorization {
    #[serde(rename = "authorizationToken")]
    pub authorization_token: String,

    /// e.g. `https://123456789012.dkr.ecr.us-east-1.amazonaws.com`
    #[serde(rename = "proxyEndpoint")]
    pub proxy_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct HostedZones {
    #[serde(rename = "HostedZones", default)]
    hosted_zones: Vec<HostedZoneInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostedZoneInfo {
    /// `/hostedzone/Z123`
    #[serde(rename = "Id")]
    pub id: String,

    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Config", default)]
    pub config: Option<HostedZoneConfig>,
}

impl HostedZoneInfo {
    /// Id without the `/hostedzone/` prefix
    pub fn short_id(&self) -> &str {
        self.id.trim_start_matches("/hostedzone/")
    }

    pub fn is_private(&self) -> bool {
        self.config.as_ref().is_some_and(|c| c.private_zone)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostedZoneConfig {
    #[serde(rename = "PrivateZone", default)]
    pub private_zone: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_describe_stacks() {
        let json = r#"{
            "Stacks": [{
                "StackName": "rag-system",
                "StackStatus": "CREATE_COMPLETE",
                "Outputs": [
                    {"OutputKey": "PublicIp", "OutputValue": "203.0.113.5"},
                    {"OutputKey": "CacheEndpoint", "OutputValue": "cache.internal:6379"}
                ]
            }]
        }"#;
        let parsed: DescribeStacks = serde_json::from_str(json).unwrap();
        let stack = &parsed.stacks[0];
        assert_eq!(stack.stack_status, "CREATE_COMPLETE");
        assert_eq!(stack.outputs.len(), 2);
        assert_eq!(stack.outputs[0].output_value, "203.0.113.5");
    }

    #[test]
    fn test_parse_stack_without_outputs() {
        let json = r#"{"Stacks": [{"StackName": "s", "StackStatus": "CREATE_IN_PROGRESS"}]}"#;
        let parsed: DescribeStacks = serde_json::from_str(json).unwrap();
        assert!(parsed.stacks[0].outputs.is_empty());
    }

    #[test]
    fn test_parse_object_versions() {
        let json = r#"{
            "Versions": [{"Key": "a.pdf", "VersionId": "v1", "IsLatest": true}],
            "DeleteMarkers": [{"Key": "b.pdf", "VersionId": "v2"}]
        }"#;
        let parsed: ObjectVersions = serde_json::from_str(json).unwrap();
        let ids = parsed.into_identifiers();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[1].key, "b.pdf");

        let empty: ObjectVersions = serde_json::from_str("{}").unwrap();
        assert!(empty.into_identifiers().is_empty());
    }

    #[test]
    fn test_parse_hosted_zones() {
        let json = r#"{"HostedZones": [
            {"Id": "/hostedzone/Z1", "Name": "example.com.", "Config": {"PrivateZone": false}},
            {"Id": "/hostedzone/Z2", "Name": "internal.", "Config": {"PrivateZone": true}}
        ]}"#;
        let parsed: HostedZones = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.hosted_zones[0].short_id(), "Z1");
        assert!(!parsed.hosted_zones[0].is_private());
        assert!(parsed.hosted_zones[1].is_private());
    }

    #[test]
    fn test_parameters_json() {
        let mut params = BTreeMap::new();
        params.insert("DbPassword".to_string(), "a,b=c".to_string());
        let submission = StackSubmission {
            name: "rag-system",
            template_body: "{}",
            parameters: &params,
            capabilities: vec!["CAPABILITY_NAMED_IAM"],
        };
        assert_eq!(
            submission.parameters_json().unwrap(),
            r#"[{"ParameterKey":"DbPassword","ParameterValue":"a,b=c"}]"#
        );
    }

    #[test]
    fn test_redact() {
        let args = [
            "cloudformation",
            "create-stack",
            "--parameters",
            "[secret]",
            "--stack-name",
            "s",
        ];
        assert_eq!(
            redact(&args),
            "cloudformation create-stack --parameters <redacted> --stack-name s"
        );
    }

    #[test]
    fn test_change_batch() {
        let batch = change_batch("rag.example.com", "203.0.113.5", 300);
        let change = &batch["Changes"][0];
        assert_eq!(change["Action"], "UPSERT");
        assert_eq!(change["ResourceRecordSet"]["Type"], "A");
        assert_eq!(change["ResourceRecordSet"]["TTL"], 300);
        assert_eq!(
            change["ResourceRecordSet"]["ResourceRecords"][0]["Value"],
            "203.0.113.5"
        );
    }
}
