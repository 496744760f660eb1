//! Stack output resolution

use crate::error::{CloudError, Result};
use crate::provider::StackApi;
use crate::stack::StackOutputs;

pub const OUTPUT_PUBLIC_IP: &str = "PublicIp";
pub const OUTPUT_DATABASE_ENDPOINT: &str = "DatabaseEndpoint";
pub const OUTPUT_CACHE_ENDPOINT: &str = "CacheEndpoint";

/// Read the named outputs of a converged stack
///
/// Refuses with `OutputsUnavailable` unless the stack is `*_COMPLETE`. A
/// missing output is logged and left empty.
pub async fn resolve_outputs(api: &dyn StackApi, stack_name: &str) -> Result<StackOutputs> {
    let state = api.stack_state(stack_name).await?;
    if !state.is_complete() {
        return Err(CloudError::OutputsUnavailable {
            stack: stack_name.to_string(),
            state: state.to_string(),
        });
    }

    let mut raw = api.stack_outputs(stack_name).await?;
    let mut take = |key: &str| {
        let value = raw.remove(key).filter(|v| !v.is_empty());
        if value.is_none() {
            tracing::warn!(stack = %stack_name, output = %key, "Stack output missing");
        }
        value
    };

    let outputs = StackOutputs {
        public_ip: take(OUTPUT_PUBLIC_IP),
        database_endpoint: take(OUTPUT_DATABASE_ENDPOINT),
        cache_endpoint: take(OUTPUT_CACHE_ENDPOINT),
    };
    tracing::debug!(?outputs, "Resolved stack outputs");
    Ok(outputs)
}
