//! Azure Resource Manager interaction module
//!
//! This module provides everything needed to talk to the management plane on
//! behalf of a user: credential acquisition, the HTTP layer and the typed client.
//!
//! # Module Structure
//!
//! - [`auth`] - Access tokens, delegated and ambient credential sources
//! - [`broker`] - Delegated token acquisition with fallback to the ambient identity
//! - [`client`] - ARM client and the [`client::ManagementApi`] seam
//! - [`http`] - HTTP utilities for REST API calls
//! - [`models`] - Wire types returned by ARM
//!
//! # Example
//!
//! ```ignore
//! use azinv::azure::{broker::TokenBroker, client::{ArmClientFactory, ClientFactory}};
//!
//! async fn example(broker: TokenBroker, factory: ArmClientFactory) {
//!     let credential = broker.acquire_credential().await;
//!     let client = factory.build_client(credential);
//!     let _subscriptions = client.list_subscriptions();
//! }
//! ```

pub mod auth;
pub mod broker;
pub mod client;
pub mod http;
pub mod models;
