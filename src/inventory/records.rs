//! Display-ready inventory records and the helpers that build them

use crate::azure::models::{resource_group_of, GenericResourceData, ResourceGroupData};
use crate::error::{ItemKind, ItemProcessingError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Display;

/// Placeholder for values the API did not report
pub const NOT_AVAILABLE: &str = "N/A";

/// One resource group of the inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroupRecord {
    pub name: String,
    pub location: String,
    pub subscription_id: String,
    pub resource_count: usize,
    pub tags: HashMap<String, String>,
    /// Not exposed by the listing API; always `None`
    pub created_at: Option<DateTime<Utc>>,
}

/// One resource inside a resource group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub location: String,
    pub resource_group_name: String,
    pub resource_id: String,
    pub tags: HashMap<String, String>,
    pub sku: Option<String>,
    pub status: Option<String>,
    /// Not exposed by the listing API; always `None`
    pub created_at: Option<DateTime<Utc>>,
}

/// Anything listed by name
pub trait Named {
    fn name(&self) -> &str;
}

impl Named for ResourceGroupRecord {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for ResourceRecord {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Sort ascending by name, ordinal comparison; stable for equal names
pub fn sort_by_name<T: Named>(records: &mut [T]) {
    records.sort_by(|a, b| a.name().cmp(b.name()));
}

/// Keep successfully built items; log and drop the rest
pub fn keep_successes<T, E: Display>(results: impl IntoIterator<Item = Result<T, E>>) -> Vec<T> {
    results
        .into_iter()
        .filter_map(|result| match result {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::error!("Skipping item: {}", e);
                None
            }
        })
        .collect()
}

fn required(
    value: Option<&str>,
    kind: ItemKind,
    field: &'static str,
) -> Result<String, ItemProcessingError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ItemProcessingError::MissingField { kind, field })
}

fn or_not_available(value: Option<&str>) -> String {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(NOT_AVAILABLE)
        .to_string()
}

/// Build a resource group record from listing data
pub fn resource_group_record(
    subscription_id: &str,
    data: &ResourceGroupData,
    resource_count: usize,
) -> Result<ResourceGroupRecord, ItemProcessingError> {
    let name = required(data.name.as_deref(), ItemKind::ResourceGroup, "name")?;

    Ok(ResourceGroupRecord {
        name,
        location: or_not_available(data.location.as_deref()),
        subscription_id: subscription_id.to_string(),
        resource_count,
        tags: data.tags.clone().unwrap_or_default(),
        created_at: None,
    })
}

/// Build a resource record; the resource must belong to `resource_group_name`
pub fn resource_record(
    resource_group_name: &str,
    data: &GenericResourceData,
) -> Result<ResourceRecord, ItemProcessingError> {
    let kind = ItemKind::Resource;
    let name = required(data.name.as_deref(), kind, "name")?;
    let resource_id = required(data.id.as_deref(), kind, "id")?;
    let resource_type = required(data.resource_type.as_deref(), kind, "type")?;

    match resource_group_of(&resource_id) {
        Some(actual) if actual.eq_ignore_ascii_case(resource_group_name) => {}
        actual => {
            return Err(ItemProcessingError::ForeignItem {
                kind,
                name,
                expected: resource_group_name.to_string(),
                actual: actual.unwrap_or("").to_string(),
            });
        }
    }

    let sku = data
        .sku
        .as_ref()
        .and_then(|s| s.name.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(NOT_AVAILABLE)
        .to_string();

    Ok(ResourceRecord {
        name,
        resource_type,
        location: or_not_available(data.location.as_deref()),
        resource_group_name: resource_group_name.to_string(),
        resource_id,
        tags: data.tags.clone().unwrap_or_default(),
        sku: Some(sku),
        status: data
            .provisioning_state
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        created_at: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure::models::Sku;

    fn group(name: Option<&str>) -> ResourceGroupData {
        ResourceGroupData {
            name: name.map(String::from),
            location: Some("westeurope".into()),
            ..Default::default()
        }
    }

    fn resource(name: &str, group: &str) -> GenericResourceData {
        GenericResourceData {
            id: Some(format!(
                "/subscriptions/s1/resourceGroups/{}/providers/Microsoft.Web/sites/{}",
                group, name
            )),
            name: Some(name.into()),
            resource_type: Some("Microsoft.Web/sites".into()),
            ..Default::default()
        }
    }

    #[test]
    fn group_record_defaults_tags() {
        let record = resource_group_record("s1", &group(Some("rg-a")), 3).unwrap();
        assert_eq!(record.name, "rg-a");
        assert_eq!(record.location, "westeurope");
        assert_eq!(record.subscription_id, "s1");
        assert_eq!(record.resource_count, 3);
        assert!(record.tags.is_empty());
        assert!(record.created_at.is_none());
    }

    #[test]
    fn group_record_requires_name() {
        let err = resource_group_record("s1", &group(None), 0).unwrap_err();
        assert_eq!(
            err,
            ItemProcessingError::MissingField {
                kind: ItemKind::ResourceGroup,
                field: "name"
            }
        );
        assert!(resource_group_record("s1", &group(Some("   ")), 0).is_err());
    }

    #[test]
    fn resource_record_defaults() {
        let record = resource_record("rg-a", &resource("app", "rg-a")).unwrap();
        assert_eq!(record.location, NOT_AVAILABLE);
        assert_eq!(record.sku.as_deref(), Some(NOT_AVAILABLE));
        assert!(record.status.is_none());
        assert!(record.tags.is_empty());
        assert_eq!(record.resource_group_name, "rg-a");
    }

    #[test]
    fn resource_record_keeps_upstream_values() {
        let mut data = resource("st1", "RG-A");
        data.location = Some("northeurope".into());
        data.sku = Some(Sku {
            name: Some("Standard_LRS".into()),
            tier: None,
        });
        data.provisioning_state = Some("Succeeded".into());
        data.tags = Some(HashMap::from([("env".to_string(), "prod".to_string())]));

        // Resource group names are case-insensitive
        let record = resource_record("rg-a", &data).unwrap();
        assert_eq!(record.location, "northeurope");
        assert_eq!(record.sku.as_deref(), Some("Standard_LRS"));
        assert_eq!(record.status.as_deref(), Some("Succeeded"));
        assert_eq!(record.tags.get("env").map(String::as_str), Some("prod"));
    }

    #[test]
    fn resource_record_rejects_foreign_resource() {
        let err = resource_record("rg-a", &resource("app", "rg-b")).unwrap_err();
        assert!(matches!(err, ItemProcessingError::ForeignItem { .. }));
    }

    #[test]
    fn resource_record_requires_id_and_type() {
        let mut data = resource("app", "rg-a");
        data.resource_type = None;
        assert!(resource_record("rg-a", &data).is_err());

        let mut data = resource("app", "rg-a");
        data.id = None;
        assert!(resource_record("rg-a", &data).is_err());
    }

    #[test]
    fn sort_is_ordinal() {
        let mut records: Vec<ResourceGroupRecord> = ["b", "B", "a", "_x"]
            .iter()
            .map(|n| resource_group_record("s", &group(Some(n)), 0).unwrap())
            .collect();
        sort_by_name(&mut records);
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["B", "_x", "a", "b"]);
    }

    #[test]
    fn keep_successes_drops_errors() {
        let results: Vec<Result<u32, String>> = vec![Ok(1), Err("bad".into()), Ok(3)];
        assert_eq!(keep_successes(results), vec![1, 3]);
    }

    #[test]
    fn record_serializes_camel_case() {
        let record = resource_record("rg-a", &resource("app", "rg-a")).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "Microsoft.Web/sites");
        assert_eq!(json["resourceGroupName"], "rg-a");
        assert!(json["createdAt"].is_null());
    }
}
