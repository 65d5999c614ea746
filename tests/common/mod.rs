//! In-memory management API, client factory and identity brokers for enumerator tests

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use azinv::azure::auth::{AmbientSettings, Credential, CredentialKind};
use azinv::azure::broker::{IdentityBroker, TokenBroker};
use azinv::azure::client::{ClientFactory, ManagementApi};
use azinv::azure::http::{ApiStatusError, ArmHttpClient};
use azinv::azure::models::{
    GenericResourceData, ResourceGroupData, ResourceGroupHandle, Sku, Subscription,
};
use azinv::error::CredentialError;
use azinv::inventory::Context;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

fn status_error(status: u16) -> anyhow::Error {
    anyhow!(ApiStatusError {
        status,
        body: String::new(),
    })
}

fn ok_stream<'a, T: Send + 'a>(items: Vec<T>) -> BoxStream<'a, Result<T>> {
    stream::iter(items.into_iter().map(Ok)).boxed()
}

fn err_stream<'a, T: Send + 'a>(status: u16) -> BoxStream<'a, Result<T>> {
    stream::iter(vec![Err(status_error(status))]).boxed()
}

fn resource_key(subscription_id: &str, group: &str) -> String {
    format!("{}/{}", subscription_id, group.to_ascii_lowercase())
}

/// Management API over fixed data
#[derive(Default)]
pub struct FakeArm {
    subscriptions: Vec<String>,
    groups: HashMap<String, Vec<ResourceGroupData>>,
    resources: HashMap<String, Vec<GenericResourceData>>,
    failing_counts: HashSet<String>,
    failing_group_listings: HashSet<String>,
    fail_subscriptions: bool,
    fail_resolve: bool,
}

impl FakeArm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscription(mut self, subscription_id: &str) -> Self {
        self.subscriptions.push(subscription_id.to_string());
        self
    }

    pub fn group(mut self, subscription_id: &str, data: ResourceGroupData) -> Self {
        self.groups
            .entry(subscription_id.to_string())
            .or_default()
            .push(data);
        self
    }

    pub fn resource(mut self, subscription_id: &str, group: &str, data: GenericResourceData) -> Self {
        self.resources
            .entry(resource_key(subscription_id, group))
            .or_default()
            .push(data);
        self
    }

    pub fn failing_count(mut self, subscription_id: &str, group: &str) -> Self {
        self.failing_counts.insert(resource_key(subscription_id, group));
        self
    }

    pub fn failing_group_listing(mut self, subscription_id: &str) -> Self {
        self.failing_group_listings.insert(subscription_id.to_string());
        self
    }

    pub fn failing_subscriptions(mut self) -> Self {
        self.fail_subscriptions = true;
        self
    }

    pub fn failing_resolve(mut self) -> Self {
        self.fail_resolve = true;
        self
    }
}

#[async_trait]
impl ManagementApi for FakeArm {
    fn list_subscriptions(&self) -> BoxStream<'_, Result<Subscription>> {
        if self.fail_subscriptions {
            return err_stream(401);
        }
        ok_stream(
            self.subscriptions
                .iter()
                .map(|id| Subscription {
                    subscription_id: id.clone(),
                    display_name: Some(format!("Subscription {}", id)),
                    ..Default::default()
                })
                .collect(),
        )
    }

    fn list_resource_groups(&self, subscription_id: &str) -> BoxStream<'_, Result<ResourceGroupData>> {
        if self.failing_group_listings.contains(subscription_id) {
            return err_stream(403);
        }
        ok_stream(self.groups.get(subscription_id).cloned().unwrap_or_default())
    }

    async fn get_resource_group(
        &self,
        subscription_id: &str,
        name: &str,
    ) -> Result<Option<ResourceGroupHandle>> {
        if self.fail_resolve {
            return Err(status_error(500));
        }
        let found = self
            .groups
            .get(subscription_id)
            .into_iter()
            .flatten()
            .filter_map(|g| g.name.as_deref())
            .find(|n| n.eq_ignore_ascii_case(name));
        Ok(found.map(|n| ResourceGroupHandle::new(subscription_id, n)))
    }

    fn list_generic_resources(
        &self,
        group: &ResourceGroupHandle,
    ) -> BoxStream<'_, Result<GenericResourceData>> {
        let key = resource_key(&group.subscription_id, &group.name);
        if self.failing_counts.contains(&key) {
            return err_stream(500);
        }
        ok_stream(self.resources.get(&key).cloned().unwrap_or_default())
    }
}

/// Hands out the same fake API and remembers the credential of every client built
pub struct FakeFactory {
    api: Arc<FakeArm>,
    built: Mutex<Vec<CredentialKind>>,
}

impl FakeFactory {
    pub fn new(api: FakeArm) -> Self {
        Self {
            api: Arc::new(api),
            built: Mutex::new(Vec::new()),
        }
    }

    pub fn built(&self) -> Vec<CredentialKind> {
        self.built.lock().unwrap().clone()
    }
}

impl ClientFactory for FakeFactory {
    fn build_client(&self, credential: Credential) -> Arc<dyn ManagementApi> {
        self.built.lock().unwrap().push(credential.kind());
        self.api.clone()
    }
}

/// Identity broker that always produces a token
pub struct SignedIn;

#[async_trait]
impl IdentityBroker for SignedIn {
    async fn delegated_token(&self, _scopes: &[&str]) -> Result<String, CredentialError> {
        Ok("user-token".to_string())
    }
}

/// Identity broker whose user never consented
pub struct NoConsent;

#[async_trait]
impl IdentityBroker for NoConsent {
    async fn delegated_token(&self, scopes: &[&str]) -> Result<String, CredentialError> {
        Err(CredentialError::ConsentRequired(scopes.join(" ")))
    }
}

pub fn context_with(api: FakeArm, identity: Arc<dyn IdentityBroker>) -> (Context, Arc<FakeFactory>) {
    let http = ArmHttpClient::with_retries(0).unwrap();
    let ambient = AmbientSettings {
        managed_identity: false,
        ..AmbientSettings::default()
    };
    let broker = TokenBroker::new(identity, &http, ambient);
    let factory = Arc::new(FakeFactory::new(api));
    (Context::new(broker, factory.clone()), factory)
}

pub fn context(api: FakeArm) -> Context {
    context_with(api, Arc::new(SignedIn)).0
}

pub fn group(name: &str) -> ResourceGroupData {
    ResourceGroupData {
        id: None,
        name: Some(name.to_string()),
        location: Some("westeurope".to_string()),
        tags: None,
        properties: None,
    }
}

pub fn resource(subscription_id: &str, group: &str, name: &str) -> GenericResourceData {
    GenericResourceData {
        id: Some(format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/virtualMachines/{}",
            subscription_id, group, name
        )),
        name: Some(name.to_string()),
        resource_type: Some("Microsoft.Compute/virtualMachines".to_string()),
        location: Some("westeurope".to_string()),
        tags: None,
        sku: Some(Sku {
            name: Some("Standard_B2s".to_string()),
            tier: None,
        }),
        provisioning_state: Some("Succeeded".to_string()),
    }
}
