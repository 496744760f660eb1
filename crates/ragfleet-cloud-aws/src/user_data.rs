//! Bootstrap payload for the application node
//!
//! Rendered with Tera from a typed context. The output is later wrapped in
//! `Fn::Sub`, so dependency hosts are `${Resource.Attribute}` placeholders
//! resolved by CloudFormation and the script avoids `${...}` shell syntax.

use crate::error::{AwsError, Result};
use ragfleet_cloud::remote::READY_MARKER;
use serde::Serialize;
use tera::{Context, Tera};

const BOOTSTRAP_TEMPLATE: &str = r#"#!/bin/bash
set -euo pipefail
exec > >(tee -a /var/log/ragfleet-bootstrap.log) 2>&1

echo "=== ragfleet: bootstrap ==="

dnf install -y docker nmap-ncat
systemctl enable --now docker
usermod -aG docker {{ ssh_user }}

mkdir -p /usr/local/lib/docker/cli-plugins
curl -fsSL "https://github.com/docker/compose/releases/download/{{ compose_version }}/docker-compose-linux-x86_64" \
    -o /usr/local/lib/docker/cli-plugins/docker-compose
chmod +x /usr/local/lib/docker/cli-plugins/docker-compose

install -d -o {{ ssh_user }} -g {{ ssh_user }} /home/{{ ssh_user }}/app

wait_for() {
    name=$1; host=$2; port=$3; attempt=1
    until nc -z -w 5 "$host" "$port"; do
        if [ "$attempt" -ge {{ max_attempts }} ]; then
            echo "$name at $host:$port not reachable after {{ max_attempts }} attempts"
            exit 1
        fi
        attempt=$((attempt + 1))
        sleep {{ interval_secs }}
    done
    echo "$name at $host:$port is ready"
}
{% for dependency in dependencies %}
wait_for {{ dependency.name }} {{ dependency.host }} {{ dependency.port }}
{%- endfor %}

mkdir -p "$(dirname {{ ready_marker }})"
touch {{ ready_marker }}
echo "=== ragfleet: node ready ==="
"#;

/// A network dependency the node waits for before declaring itself ready
#[derive(Debug, Clone, Serialize)]
pub struct Dependency {
    pub name: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct BootstrapContext {
    pub ssh_user: String,
    pub compose_version: String,
    pub max_attempts: u32,
    pub interval_secs: u32,
    pub dependencies: Vec<Dependency>,
    /// Path the remote handshake waits on
    pub ready_marker: String,
}

impl BootstrapContext {
    /// Waits for the stack's database and cache
    pub fn for_stack(ssh_user: impl Into<String>) -> Self {
        Self {
            ssh_user: ssh_user.into(),
            compose_version: "v2.29.7".to_string(),
            max_attempts: 60,
            interval_secs: 10,
            dependencies: vec![
                Dependency {
                    name: "database".to_string(),
                    host: "${Database.Endpoint.Address}".to_string(),
                    port: 5432,
                },
                Dependency {
                    name: "cache".to_string(),
                    host: "${CacheCluster.RedisEndpoint.Address}".to_string(),
                    port: 6379,
                },
            ],
            ready_marker: READY_MARKER.to_string(),
        }
    }
}

pub fn render_bootstrap(context: &BootstrapContext) -> Result<String> {
    let context = Context::from_serialize(context)
        .map_err(|e| AwsError::Template(format!("bootstrap context: {}", e)))?;
    Tera::default()
        .render_str(BOOTSTRAP_TEMPLATE, &context)
        .map_err(|e| AwsError::Template(format!("bootstrap script: {}", tera_detail(&e))))
}

fn tera_detail(e: &tera::Error) -> String {
    use std::error::Error;

    let mut details = vec![e.to_string()];
    let mut source = e.source();
    while let Some(err) = source {
        details.push(err.to_string());
        source = err.source();
    }
    details.join(" | ")
}
