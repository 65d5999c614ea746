//! Resources of a single resource group

use super::records::{keep_successes, resource_record, sort_by_name, ResourceRecord};
use super::resource_groups::anyhow_chain;
use super::Context;
use crate::error::AggregateEnumerationError;
use futures::TryStreamExt;
use tracing::Instrument;

/// List the resources of one resource group, sorted by name.
/// A group that does not exist (or is not visible) yields an empty list.
pub async fn list_resources(
    ctx: &Context,
    subscription_id: &str,
    resource_group_name: &str,
) -> Result<Vec<ResourceRecord>, AggregateEnumerationError> {
    let span = ctx.request_span("list_resources");
    let result = collect_resources(ctx, subscription_id.trim(), resource_group_name.trim())
        .instrument(span.clone())
        .await;

    if let Err(e) = &result {
        let _guard = span.enter();
        tracing::error!(
            "Error getting resources for resource group {}: {}",
            resource_group_name,
            anyhow_chain(e)
        );
    }
    result
}

async fn collect_resources(
    ctx: &Context,
    subscription_id: &str,
    name: &str,
) -> Result<Vec<ResourceRecord>, AggregateEnumerationError> {
    if subscription_id.is_empty() {
        return Err(AggregateEnumerationError::InvalidRequest(
            "subscription id is empty".to_string(),
        ));
    }
    if name.is_empty() {
        return Err(AggregateEnumerationError::InvalidRequest(
            "resource group name is empty".to_string(),
        ));
    }

    tracing::info!(
        "Fetching resources for resource group {} in subscription {}",
        name,
        subscription_id
    );

    let client = ctx.client().await;
    let group = client
        .get_resource_group(subscription_id, name)
        .await
        .map_err(|source| AggregateEnumerationError::ResolveResourceGroup {
            subscription_id: subscription_id.to_string(),
            name: name.to_string(),
            source,
        })?;

    let Some(group) = group else {
        tracing::info!("Resource group {} not found in subscription {}", name, subscription_id);
        return Ok(Vec::new());
    };

    let results: Vec<_> = client
        .list_generic_resources(&group)
        .map_ok(|data| resource_record(name, &data))
        .try_collect()
        .await
        .map_err(|source| AggregateEnumerationError::Resources {
            name: name.to_string(),
            source,
        })?;

    let mut records = keep_successes(results);
    sort_by_name(&mut records);
    tracing::info!("Listed {} resources in {}", records.len(), name);
    Ok(records)
}
