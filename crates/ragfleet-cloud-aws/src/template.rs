//! Typed CloudFormation template for the document-QA environment
//!
//! The template is built as data, validated (every `Ref`, `Fn::GetAtt`,
//! `Fn::Sub` placeholder and `DependsOn` must point at something declared)
//! and only then serialized for submission.

use crate::error::{AwsError, Result};
use ragfleet_cloud::outputs::{OUTPUT_CACHE_ENDPOINT, OUTPUT_DATABASE_ENDPOINT, OUTPUT_PUBLIC_IP};
use ragfleet_cloud::remote::{DATABASE_NAME, DATABASE_USER};
use ragfleet_cloud::{Capability, StackDescriptor};
use ragfleet_config::DeploymentConfig;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};

/// Base image name filter (Amazon Linux 2023, x86_64)
pub const IMAGE_NAME_FILTER: &str = "al2023-ami-2023.*-x86_64";

const REQUIRED_OUTPUTS: [&str; 3] = [OUTPUT_PUBLIC_IP, OUTPUT_DATABASE_ENDPOINT, OUTPUT_CACHE_ENDPOINT];

/// Application ports open to the world
const PUBLIC_PORTS: [u16; 3] = [80, 8000, 8501];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StackTemplate {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    pub description: String,
    pub parameters: BTreeMap<String, ParameterDecl>,
    pub resources: BTreeMap<String, Resource>,
    pub outputs: BTreeMap<String, Output>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParameterDecl {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub no_echo: bool,
    pub description: String,
}

impl ParameterDecl {
    fn new(kind: &str, description: &str) -> Self {
        Self {
            kind: kind.to_string(),
            default: None,
            no_echo: false,
            description: description.to_string(),
        }
    }

    fn with_default(mut self, default: &str) -> Self {
        self.default = Some(default.to_string());
        self
    }

    fn secret(mut self) -> Self {
        self.no_echo = true;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Resource {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    pub properties: Value,
}

impl Resource {
    fn new(kind: &str, properties: Value) -> Self {
        Self {
            kind: kind.to_string(),
            depends_on: Vec::new(),
            properties,
        }
    }

    fn depends_on(mut self, names: &[&str]) -> Self {
        self.depends_on = names.iter().map(|n| n.to_string()).collect();
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    pub description: String,
    pub value: Value,
}

fn r(name: &str) -> Value {
    json!({ "Ref": name })
}

fn get_att(resource: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [resource, attribute] })
}

fn sub(template: &str) -> Value {
    json!({ "Fn::Sub": template })
}

fn name_tag(suffix: &str) -> Value {
    json!([{ "Key": "Name", "Value": sub(&format!("${{AWS::StackName}}-{}", suffix)) }])
}

fn ingress_from_anywhere(port: u16) -> Value {
    json!({ "IpProtocol": "tcp", "FromPort": port, "ToPort": port, "CidrIp": "0.0.0.0/0" })
}

fn ingress_from_group(port: u16, group: &str) -> Value {
    json!({
        "IpProtocol": "tcp",
        "FromPort": port,
        "ToPort": port,
        "SourceSecurityGroupId": get_att(group, "GroupId")
    })
}

impl StackTemplate {
    /// The full environment; `bootstrap` becomes the instance UserData
    pub fn document_qa(bootstrap: &str) -> Self {
        let mut parameters = BTreeMap::new();
        parameters.insert(
            "ImageId".into(),
            ParameterDecl::new("AWS::EC2::Image::Id", "Base image for the application node"),
        );
        parameters.insert(
            "InstanceType".into(),
            ParameterDecl::new("String", "Application node size").with_default("t3.medium"),
        );
        parameters.insert(
            "KeyName".into(),
            ParameterDecl::new("AWS::EC2::KeyPair::KeyName", "SSH key pair"),
        );
        parameters.insert(
            "DbInstanceClass".into(),
            ParameterDecl::new("String", "Database instance class").with_default("db.t3.micro"),
        );
        parameters.insert(
            "DbPassword".into(),
            ParameterDecl::new("String", "Database master password").secret(),
        );
        parameters.insert(
            "CacheNodeType".into(),
            ParameterDecl::new("String", "Cache node type").with_default("cache.t3.micro"),
        );
        parameters.insert(
            "BucketName".into(),
            ParameterDecl::new("String", "Document bucket the node may access"),
        );
        parameters.insert(
            "SshCidr".into(),
            ParameterDecl::new("String", "Source range allowed to SSH").with_default("0.0.0.0/0"),
        );

        let mut resources = BTreeMap::new();
        let mut add = |name: &str, resource: Resource| {
            resources.insert(name.to_string(), resource);
        };

        // Network
        add(
            "Vpc",
            Resource::new(
                "AWS::EC2::VPC",
                json!({
                    "CidrBlock": "10.0.0.0/16",
                    "EnableDnsSupport": true,
                    "EnableDnsHostnames": true,
                    "Tags": name_tag("vpc")
                }),
            ),
        );
        add(
            "InternetGateway",
            Resource::new("AWS::EC2::InternetGateway", json!({ "Tags": name_tag("igw") })),
        );
        add(
            "GatewayAttachment",
            Resource::new(
                "AWS::EC2::VPCGatewayAttachment",
                json!({ "VpcId": r("Vpc"), "InternetGatewayId": r("InternetGateway") }),
            ),
        );
        for (name, cidr, az) in [
            ("PublicSubnetA", "10.0.1.0/24", 0),
            ("PublicSubnetB", "10.0.2.0/24", 1),
        ] {
            add(
                name,
                Resource::new(
                    "AWS::EC2::Subnet",
                    json!({
                        "VpcId": r("Vpc"),
                        "CidrBlock": cidr,
                        "AvailabilityZone": { "Fn::Select": [az, { "Fn::GetAZs": "" }] },
                        "MapPublicIpOnLaunch": true,
                        "Tags": name_tag(&name.to_lowercase())
                    }),
                ),
            );
        }
        add(
            "RouteTable",
            Resource::new(
                "AWS::EC2::RouteTable",
                json!({ "VpcId": r("Vpc"), "Tags": name_tag("public") }),
            ),
        );
        add(
            "DefaultRoute",
            Resource::new(
                "AWS::EC2::Route",
                json!({
                    "RouteTableId": r("RouteTable"),
                    "DestinationCidrBlock": "0.0.0.0/0",
                    "GatewayId": r("InternetGateway")
                }),
            )
            .depends_on(&["GatewayAttachment"]),
        );
        for (name, subnet) in [
            ("SubnetARouteAssociation", "PublicSubnetA"),
            ("SubnetBRouteAssociation", "PublicSubnetB"),
        ] {
            add(
                name,
                Resource::new(
                    "AWS::EC2::SubnetRouteTableAssociation",
                    json!({ "SubnetId": r(subnet), "RouteTableId": r("RouteTable") }),
                ),
            );
        }

        // Security groups
        let mut app_ingress = vec![json!({
            "IpProtocol": "tcp", "FromPort": 22, "ToPort": 22, "CidrIp": r("SshCidr")
        })];
        app_ingress.extend(PUBLIC_PORTS.iter().map(|p| ingress_from_anywhere(*p)));
        add(
            "AppSecurityGroup",
            Resource::new(
                "AWS::EC2::SecurityGroup",
                json!({
                    "GroupDescription": "Application node",
                    "VpcId": r("Vpc"),
                    "SecurityGroupIngress": app_ingress
                }),
            ),
        );
        add(
            "DatabaseSecurityGroup",
            Resource::new(
                "AWS::EC2::SecurityGroup",
                json!({
                    "GroupDescription": "PostgreSQL from the application node",
                    "VpcId": r("Vpc"),
                    "SecurityGroupIngress": [ingress_from_group(5432, "AppSecurityGroup")]
                }),
            ),
        );
        add(
            "CacheSecurityGroup",
            Resource::new(
                "AWS::EC2::SecurityGroup",
                json!({
                    "GroupDescription": "Redis from the application node",
                    "VpcId": r("Vpc"),
                    "SecurityGroupIngress": [ingress_from_group(6379, "AppSecurityGroup")]
                }),
            ),
        );

        // Identity
        add(
            "InstanceRole",
            Resource::new(
                "AWS::IAM::Role",
                json!({
                    "RoleName": sub("${AWS::StackName}-instance-role"),
                    "AssumeRolePolicyDocument": {
                        "Version": "2012-10-17",
                        "Statement": [{
                            "Effect": "Allow",
                            "Principal": { "Service": "ec2.amazonaws.com" },
                            "Action": "sts:AssumeRole"
                        }]
                    },
                    "ManagedPolicyArns": [
                        "arn:aws:iam::aws:policy/AmazonEC2ContainerRegistryReadOnly"
                    ],
                    "Policies": [{
                        "PolicyName": "document-qa",
                        "PolicyDocument": {
                            "Version": "2012-10-17",
                            "Statement": [
                                {
                                    "Effect": "Allow",
                                    "Action": ["s3:ListBucket"],
                                    "Resource": sub("arn:aws:s3:::${BucketName}")
                                },
                                {
                                    "Effect": "Allow",
                                    "Action": ["s3:GetObject", "s3:PutObject", "s3:DeleteObject"],
                                    "Resource": sub("arn:aws:s3:::${BucketName}/*")
                                },
                                {
                                    "Effect": "Allow",
                                    "Action": [
                                        "bedrock:InvokeModel",
                                        "bedrock:InvokeModelWithResponseStream"
                                    ],
                                    "Resource": "*"
                                }
                            ]
                        }
                    }]
                }),
            ),
        );
        add(
            "InstanceProfile",
            Resource::new(
                "AWS::IAM::InstanceProfile",
                json!({ "Roles": [r("InstanceRole")] }),
            ),
        );

        // Data stores
        add(
            "DbSubnetGroup",
            Resource::new(
                "AWS::RDS::DBSubnetGroup",
                json!({
                    "DBSubnetGroupDescription": "Database subnets",
                    "SubnetIds": [r("PublicSubnetA"), r("PublicSubnetB")]
                }),
            ),
        );
        add(
            "Database",
            Resource::new(
                "AWS::RDS::DBInstance",
                json!({
                    "Engine": "postgres",
                    "EngineVersion": "15",
                    "DBInstanceClass": r("DbInstanceClass"),
                    "AllocatedStorage": "20",
                    "DBName": DATABASE_NAME,
                    "MasterUsername": DATABASE_USER,
                    "MasterUserPassword": r("DbPassword"),
                    "DBSubnetGroupName": r("DbSubnetGroup"),
                    "VPCSecurityGroups": [get_att("DatabaseSecurityGroup", "GroupId")],
                    "PubliclyAccessible": false,
                    "BackupRetentionPeriod": 1
                }),
            ),
        );
        add(
            "CacheSubnetGroup",
            Resource::new(
                "AWS::ElastiCache::SubnetGroup",
                json!({
                    "Description": "Cache subnets",
                    "SubnetIds": [r("PublicSubnetA"), r("PublicSubnetB")]
                }),
            ),
        );
        add(
            "CacheCluster",
            Resource::new(
                "AWS::ElastiCache::CacheCluster",
                json!({
                    "Engine": "redis",
                    "CacheNodeType": r("CacheNodeType"),
                    "NumCacheNodes": 1,
                    "CacheSubnetGroupName": r("CacheSubnetGroup"),
                    "VpcSecurityGroupIds": [get_att("CacheSecurityGroup", "GroupId")]
                }),
            ),
        );

        // Compute
        add(
            "Instance",
            Resource::new(
                "AWS::EC2::Instance",
                json!({
                    "ImageId": r("ImageId"),
                    "InstanceType": r("InstanceType"),
                    "KeyName": r("KeyName"),
                    "IamInstanceProfile": r("InstanceProfile"),
                    "SubnetId": r("PublicSubnetA"),
                    "SecurityGroupIds": [get_att("AppSecurityGroup", "GroupId")],
                    "UserData": { "Fn::Base64": sub(bootstrap) },
                    "Tags": name_tag("app")
                }),
            )
            .depends_on(&["Database", "CacheCluster"]),
        );

        let mut outputs = BTreeMap::new();
        outputs.insert(
            OUTPUT_PUBLIC_IP.to_string(),
            Output {
                description: "Public address of the application node".into(),
                value: get_att("Instance", "PublicIp"),
            },
        );
        outputs.insert(
            OUTPUT_DATABASE_ENDPOINT.to_string(),
            Output {
                description: "PostgreSQL host:port".into(),
                value: sub("${Database.Endpoint.Address}:${Database.Endpoint.Port}"),
            },
        );
        outputs.insert(
            OUTPUT_CACHE_ENDPOINT.to_string(),
            Output {
                description: "Redis host:port".into(),
                value: sub("${CacheCluster.RedisEndpoint.Address}:${CacheCluster.RedisEndpoint.Port}"),
            },
        );

        Self {
            format_version: "2010-09-09".into(),
            description: "Document question-answering environment".into(),
            parameters,
            resources,
            outputs,
        }
    }

    /// Check references, dependencies and required outputs
    pub fn validate(&self) -> Result<()> {
        for output in REQUIRED_OUTPUTS {
            if !self.outputs.contains_key(output) {
                return Err(AwsError::Template(format!("missing output {}", output)));
            }
        }

        let mut refs = BTreeSet::new();
        let mut resource_refs = BTreeSet::new();
        for (name, resource) in &self.resources {
            for dep in &resource.depends_on {
                if !self.resources.contains_key(dep) {
                    return Err(AwsError::Template(format!(
                        "{} depends on undeclared resource {}",
                        name, dep
                    )));
                }
            }
            collect_references(&resource.properties, &mut refs, &mut resource_refs);
        }
        for output in self.outputs.values() {
            collect_references(&output.value, &mut refs, &mut resource_refs);
        }

        for name in refs {
            let known = name.starts_with("AWS::")
                || self.parameters.contains_key(&name)
                || self.resources.contains_key(&name);
            if !known {
                return Err(AwsError::Template(format!("reference to undeclared {}", name)));
            }
        }
        for name in resource_refs {
            if !self.resources.contains_key(&name) {
                return Err(AwsError::Template(format!(
                    "attribute of undeclared resource {}",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Walk a property tree collecting `Ref` targets and `GetAtt` resources
fn collect_references(value: &Value, refs: &mut BTreeSet<String>, resources: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(target)) = map.get("Ref") {
                refs.insert(target.clone());
            }
            if let Some(Value::Array(parts)) = map.get("Fn::GetAtt")
                && let Some(Value::String(target)) = parts.first()
            {
                resources.insert(target.clone());
            }
            if let Some(Value::String(template)) = map.get("Fn::Sub") {
                for placeholder in sub_placeholders(template) {
                    match placeholder.split_once('.') {
                        Some((resource, _)) => resources.insert(resource.to_string()),
                        None => refs.insert(placeholder.to_string()),
                    };
                }
            }
            for child in map.values() {
                collect_references(child, refs, resources);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_references(item, refs, resources);
            }
        }
        _ => {}
    }
}

/// `${Name}` placeholders of an `Fn::Sub` string; `${!Literal}` is skipped
fn sub_placeholders(template: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        let name = &after[..end];
        if !name.starts_with('!') && !name.is_empty() {
            found.push(name);
        }
        rest = &after[end + 1..];
    }
    found
}

/// Values bound to template parameters for one submission
#[derive(Debug, Clone, Default)]
pub struct ParameterSet {
    values: BTreeMap<String, String>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Parameters for the document-QA template
    pub fn for_deployment(config: &DeploymentConfig, image_id: &str, db_password: &str) -> Self {
        Self::new()
            .set("ImageId", image_id)
            .set("InstanceType", &config.instance_type)
            .set("KeyName", &config.key_pair_name)
            .set("DbInstanceClass", &config.db_instance_class)
            .set("DbPassword", db_password)
            .set("CacheNodeType", &config.cache_node_type)
            .set("BucketName", &config.bucket)
    }

    /// Check the set against the declarations
    ///
    /// Every declared parameter needs a value or a default; values for
    /// undeclared parameters are rejected.
    pub fn bind(&self, template: &StackTemplate) -> Result<BTreeMap<String, String>> {
        for key in self.values.keys() {
            if !template.parameters.contains_key(key) {
                return Err(AwsError::Template(format!("unknown parameter {}", key)));
            }
        }
        for (key, decl) in &template.parameters {
            let bound = self.values.get(key).is_some_and(|v| !v.is_empty());
            if !bound && decl.default.is_none() {
                return Err(AwsError::Template(format!("parameter {} has no value", key)));
            }
        }
        Ok(self.values.clone())
    }
}

/// Validate, bind and serialize into a submission-ready descriptor
pub fn build_descriptor(
    stack_name: &str,
    template: &StackTemplate,
    parameters: &ParameterSet,
) -> Result<StackDescriptor> {
    template.validate()?;
    let parameters = parameters.bind(template)?;
    Ok(StackDescriptor {
        name: stack_name.to_string(),
        template_body: template.to_json()?,
        parameters,
        capabilities: vec![Capability::NamedIam],
    })
}
