//! # Azure Resource Manager Client
//!
//! A small client for the parts of the ARM REST API this tool needs:
//! credentials, resource URLs, create-or-update and delete calls, and
//! waiting on the long-running operations they start.
//!
//! ## Submodules
//! - `auth`: credential discovery and token acquisition.
//! - `client`: the authenticated request layer and resource addressing.
//! - `lro`: long-running operation polling, deadlines and cancellation.
//! - `api`: the VM lifecycle operations implemented over ARM.

pub mod api;
pub mod auth;
pub mod client;
pub mod error;
pub mod lro;
pub mod types;

pub use api::AzureApi;
pub use auth::Credential;
pub use client::{ArmClient, DEFAULT_ARM_ENDPOINT, ResourceKind, resource_id};
pub use error::ArmError;
pub use lro::{OperationContext, Poller};
