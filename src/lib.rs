//! Read-only inventory of Azure resource groups and resources, fetched with the
//! signed-in user's delegated permissions.

pub mod azure;
pub mod config;
pub mod error;
pub mod inventory;
pub mod render;
