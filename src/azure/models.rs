//! Azure Resource Manager payloads
//!
//! Every field the enumerators might find missing is optional here; deciding
//! whether an item is usable happens when records are built.

use serde::Deserialize;
use std::collections::HashMap;

/// Generic ARM list wrapper (`value` array with optional `nextLink`)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArmList<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(default)]
    pub next_link: Option<String>,
}

/// Subscription information
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    #[serde(default)]
    pub subscription_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

impl Subscription {
    /// Display name, falling back to the id
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.subscription_id)
    }
}

/// Resource group as returned by the resource group listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceGroupData {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub tags: Option<HashMap<String, String>>,
    #[serde(default)]
    pub properties: Option<ResourceGroupProperties>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroupProperties {
    #[serde(default)]
    pub provisioning_state: Option<String>,
}

/// A resolved resource group inside one subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceGroupHandle {
    pub subscription_id: String,
    pub name: String,
}

impl ResourceGroupHandle {
    pub fn new(subscription_id: &str, name: &str) -> Self {
        Self {
            subscription_id: subscription_id.to_string(),
            name: name.to_string(),
        }
    }
}

/// SKU block of a generic resource
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Sku {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tier: Option<String>,
}

/// Resource as returned by the type-agnostic resource listing
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericResourceData {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub tags: Option<HashMap<String, String>>,
    #[serde(default)]
    pub sku: Option<Sku>,
    /// Only present when the listing is expanded with `provisioningState`
    #[serde(default)]
    pub provisioning_state: Option<String>,
}

/// Extract the resource group segment of an ARM resource id
/// e.g. "/subscriptions/s/resourceGroups/rg-a/providers/..." -> "rg-a"
pub fn resource_group_of(resource_id: &str) -> Option<&str> {
    let mut segments = resource_id.split('/').filter(|s| !s.is_empty());
    while let Some(segment) = segments.next() {
        if segment.eq_ignore_ascii_case("resourcegroups") {
            return segments.next();
        }
    }
    None
}
