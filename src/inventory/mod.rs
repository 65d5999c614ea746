//! Inventory aggregation
//!
//! Builds point-in-time snapshots of what the signed-in user can see:
//!
//! - [`list_resource_groups`] - every resource group of every visible subscription
//! - [`list_resources`] - every resource of one resource group
//!
//! Failures of a single item are logged and the item is skipped; failures of a
//! listing as a whole are returned as [`AggregateEnumerationError`].
//!
//! [`AggregateEnumerationError`]: crate::error::AggregateEnumerationError

mod records;
mod resource_groups;
mod resources;

pub use records::{
    keep_successes, resource_group_record, resource_record, sort_by_name, Named,
    ResourceGroupRecord, ResourceRecord, NOT_AVAILABLE,
};
pub use resource_groups::list_resource_groups;
pub use resources::list_resources;

use crate::azure::broker::TokenBroker;
use crate::azure::client::{ClientFactory, ManagementApi};
use std::sync::Arc;
use tracing::Span;
use uuid::Uuid;

/// Everything an inventory request needs: who to authenticate as and how to
/// reach the management API
pub struct Context {
    broker: TokenBroker,
    factory: Arc<dyn ClientFactory>,
}

impl Context {
    pub fn new(broker: TokenBroker, factory: Arc<dyn ClientFactory>) -> Self {
        Self { broker, factory }
    }

    /// New `inventory_request` span with its own request id
    pub fn request_span(&self, operation: &'static str) -> Span {
        let request_id = Uuid::new_v4();
        tracing::info_span!("inventory_request", %request_id, operation)
    }

    /// Fresh client for this request; credentials are never shared between requests
    async fn client(&self) -> Arc<dyn ManagementApi> {
        let credential = self.broker.acquire_credential().await;
        tracing::debug!("Building management client with {:?}", credential.kind());
        self.factory.build_client(credential)
    }
}
