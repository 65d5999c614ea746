//! Azure Resource Manager client
//!
//! [`ManagementApi`] is the seam the enumerators talk to. [`ArmClient`] implements
//! it over REST; listings are lazy streams that follow `nextLink` page by page.

use super::auth::Credential;
use super::http::{api_status, ArmHttpClient};
use super::models::{
    ArmList, GenericResourceData, ResourceGroupData, ResourceGroupHandle, Subscription,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use url::Url;

/// Default Azure Resource Manager endpoint
pub const DEFAULT_ARM_ENDPOINT: &str = "https://management.azure.com";

const SUBSCRIPTIONS_API_VERSION: &str = "2022-12-01";
const RESOURCES_API_VERSION: &str = "2021-04-01";

/// Remote management operations used by the inventory
#[async_trait]
pub trait ManagementApi: Send + Sync {
    /// All subscriptions visible to the credential
    fn list_subscriptions(&self) -> BoxStream<'_, Result<Subscription>>;

    /// All resource groups of one subscription
    fn list_resource_groups(&self, subscription_id: &str)
        -> BoxStream<'_, Result<ResourceGroupData>>;

    /// Resolve a resource group; `None` when it does not exist or is not visible
    async fn get_resource_group(
        &self,
        subscription_id: &str,
        name: &str,
    ) -> Result<Option<ResourceGroupHandle>>;

    /// All resources inside a resource group
    fn list_generic_resources(
        &self,
        group: &ResourceGroupHandle,
    ) -> BoxStream<'_, Result<GenericResourceData>>;
}

/// Wraps a credential into a management client
pub trait ClientFactory: Send + Sync {
    fn build_client(&self, credential: Credential) -> Arc<dyn ManagementApi>;
}

/// Main ARM client
#[derive(Clone)]
pub struct ArmClient {
    credential: Credential,
    http: ArmHttpClient,
    endpoint: Url,
}

impl ArmClient {
    /// Create a new ARM client. No request is made until first use.
    pub fn new(credential: Credential, http: ArmHttpClient, endpoint: Url) -> Self {
        Self {
            credential,
            http,
            endpoint,
        }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Make a GET request to the ARM API
    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let token = self
            .credential
            .token()
            .await
            .context("Failed to obtain access token")?;
        let value = self.http.get(url, token.secret()).await?;
        serde_json::from_value(value).context("Unexpected response shape")
    }

    // =========================================================================
    // URL helpers
    // =========================================================================

    /// Build ARM API URL
    pub fn arm_url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint.as_str().trim_end_matches('/'), path)
    }

    pub fn subscriptions_url(&self) -> String {
        self.arm_url(&format!("/subscriptions?api-version={}", SUBSCRIPTIONS_API_VERSION))
    }

    pub fn resource_groups_url(&self, subscription_id: &str) -> String {
        self.arm_url(&format!(
            "/subscriptions/{}/resourcegroups?api-version={}",
            urlencoding::encode(subscription_id),
            RESOURCES_API_VERSION
        ))
    }

    pub fn resource_group_url(&self, subscription_id: &str, name: &str) -> String {
        self.arm_url(&format!(
            "/subscriptions/{}/resourcegroups/{}?api-version={}",
            urlencoding::encode(subscription_id),
            urlencoding::encode(name),
            RESOURCES_API_VERSION
        ))
    }

    pub fn resources_url(&self, group: &ResourceGroupHandle) -> String {
        self.arm_url(&format!(
            "/subscriptions/{}/resourceGroups/{}/resources?api-version={}&$expand=provisioningState",
            urlencoding::encode(&group.subscription_id),
            urlencoding::encode(&group.name),
            RESOURCES_API_VERSION
        ))
    }

    /// A `nextLink` is only followed while it stays on the configured endpoint
    fn check_next_link(&self, link: &str) -> Result<()> {
        let next = Url::parse(link).context("Invalid nextLink")?;
        if next.scheme() != self.endpoint.scheme()
            || next.host_str() != self.endpoint.host_str()
            || next.port_or_known_default() != self.endpoint.port_or_known_default()
        {
            anyhow::bail!("nextLink points outside the management endpoint");
        }
        Ok(())
    }

    /// Lazily fetch every page of a list endpoint
    fn paged<'a, T>(&'a self, url: String) -> BoxStream<'a, Result<T>>
    where
        T: DeserializeOwned + Send + 'a,
    {
        stream::try_unfold(Some(url), move |next| async move {
            let Some(url) = next else {
                return Ok(None);
            };

            let page: ArmList<T> = self.get(&url).await?;
            let next = match page.next_link {
                Some(link) if !link.is_empty() => {
                    self.check_next_link(&link)?;
                    tracing::debug!("Following nextLink");
                    Some(link)
                }
                _ => None,
            };

            let items = stream::iter(page.value.into_iter().map(Ok::<T, anyhow::Error>));
            Ok::<_, anyhow::Error>(Some((items, next)))
        })
        .try_flatten()
        .boxed()
    }
}

#[async_trait]
impl ManagementApi for ArmClient {
    fn list_subscriptions(&self) -> BoxStream<'_, Result<Subscription>> {
        self.paged(self.subscriptions_url())
    }

    fn list_resource_groups(
        &self,
        subscription_id: &str,
    ) -> BoxStream<'_, Result<ResourceGroupData>> {
        self.paged(self.resource_groups_url(subscription_id))
    }

    async fn get_resource_group(
        &self,
        subscription_id: &str,
        name: &str,
    ) -> Result<Option<ResourceGroupHandle>> {
        let url = self.resource_group_url(subscription_id, name);
        match self.get::<ResourceGroupData>(&url).await {
            Ok(data) => {
                let resolved = data.name.filter(|n| !n.is_empty()).unwrap_or_else(|| name.to_string());
                Ok(Some(ResourceGroupHandle::new(subscription_id, &resolved)))
            }
            Err(e) => match api_status(&e) {
                Some(404) | Some(403) => {
                    tracing::info!("Resource group {} not visible: {}", name, e);
                    Ok(None)
                }
                _ => Err(e),
            },
        }
    }

    fn list_generic_resources(
        &self,
        group: &ResourceGroupHandle,
    ) -> BoxStream<'_, Result<GenericResourceData>> {
        self.paged(self.resources_url(group))
    }
}

/// Builds [`ArmClient`]s that share one HTTP connection pool
#[derive(Clone)]
pub struct ArmClientFactory {
    http: ArmHttpClient,
    endpoint: Url,
}

impl ArmClientFactory {
    pub fn new(http: ArmHttpClient, endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("Invalid management endpoint: {}", endpoint))?;
        Ok(Self { http, endpoint })
    }
}

impl ClientFactory for ArmClientFactory {
    fn build_client(&self, credential: Credential) -> Arc<dyn ManagementApi> {
        Arc::new(ArmClient::new(
            credential,
            self.http.clone(),
            self.endpoint.clone(),
        ))
    }
}
