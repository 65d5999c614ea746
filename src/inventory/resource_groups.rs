//! Resource groups across all visible subscriptions

use super::records::{keep_successes, resource_group_record, sort_by_name, ResourceGroupRecord};
use super::Context;
use crate::azure::client::ManagementApi;
use crate::azure::models::ResourceGroupHandle;
use crate::error::{AggregateEnumerationError, ItemKind, ItemProcessingError};
use futures::{StreamExt, TryStreamExt};
use std::collections::HashSet;
use tracing::Instrument;

/// List every resource group of every subscription, sorted by name
pub async fn list_resource_groups(
    ctx: &Context,
) -> Result<Vec<ResourceGroupRecord>, AggregateEnumerationError> {
    let span = ctx.request_span("list_resource_groups");
    let result = collect_resource_groups(ctx).instrument(span.clone()).await;

    if let Err(e) = &result {
        let _guard = span.enter();
        tracing::error!("Error getting resource groups: {}", anyhow_chain(e));
    }
    result
}

async fn collect_resource_groups(
    ctx: &Context,
) -> Result<Vec<ResourceGroupRecord>, AggregateEnumerationError> {
    let client = ctx.client().await;
    let mut records = Vec::new();

    let mut subscriptions = client.list_subscriptions();
    while let Some(subscription) = subscriptions.next().await {
        let subscription = subscription.map_err(AggregateEnumerationError::Subscriptions)?;
        if subscription.subscription_id.trim().is_empty() {
            tracing::warn!("Skipping subscription without an id: {}", subscription.label());
            continue;
        }
        tracing::info!("Processing subscription: {}", subscription.label());

        let results = subscription_groups(client.as_ref(), &subscription.subscription_id).await?;
        records.extend(keep_successes(results));
    }

    sort_by_name(&mut records);
    tracing::info!("Listed {} resource groups", records.len());
    Ok(records)
}

/// Build one result per resource group of a subscription
async fn subscription_groups(
    client: &dyn ManagementApi,
    subscription_id: &str,
) -> Result<Vec<Result<ResourceGroupRecord, ItemProcessingError>>, AggregateEnumerationError> {
    let mut seen = HashSet::new();
    let mut results = Vec::new();

    let mut groups = client.list_resource_groups(subscription_id);
    while let Some(group) = groups.next().await {
        let group = group.map_err(|source| AggregateEnumerationError::ResourceGroups {
            subscription_id: subscription_id.to_string(),
            source,
        })?;

        let result = match resource_group_record(subscription_id, &group, 0) {
            // Names are unique per subscription, compared case-insensitively
            Ok(record) if !seen.insert(record.name.to_ascii_lowercase()) => {
                Err(ItemProcessingError::Duplicate {
                    kind: ItemKind::ResourceGroup,
                    name: record.name,
                })
            }
            Ok(record) => {
                let resource_count = resource_count(client, subscription_id, &record.name).await;
                Ok(ResourceGroupRecord {
                    resource_count,
                    ..record
                })
            }
            Err(e) => Err(e),
        };
        results.push(result);
    }

    Ok(results)
}

/// Number of resources in a group; 0 when they cannot be listed
async fn resource_count(client: &dyn ManagementApi, subscription_id: &str, name: &str) -> usize {
    let group = ResourceGroupHandle::new(subscription_id, name);
    let counted = client
        .list_generic_resources(&group)
        .try_fold(0usize, |count, _| async move { Ok(count + 1) })
        .await;

    match counted {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!("Could not get resource count for {}: {:#}", name, e);
            0
        }
    }
}

/// Render an error with its causes on one line
pub(super) fn anyhow_chain(error: &AggregateEnumerationError) -> String {
    match error.cause() {
        Some(cause) => format!("{}: {:#}", error, cause),
        None => error.to_string(),
    }
}
