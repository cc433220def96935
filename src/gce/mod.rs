//! Provider and metadata-server access.
//!
//! - [`api`] - the [`ComputeApi`] trait the reconciliation logic is written against
//! - [`client`] - REST implementation of [`ComputeApi`]
//! - [`metadata`] - identity of the running instance from the metadata server
//! - [`token`] - bearer tokens for the REST client
//! - [`memory`] - in-memory provider and metadata server

mod api;
mod client;
mod memory;
mod metadata;
mod token;

// Re-export public types and functions
pub use api::ComputeApi;
pub use client::GceClient;
pub use memory::{CallCounts, InMemoryCompute, InMemoryMetadata};
pub use metadata::{region_from_zone, InstanceMetadata, MetadataClient, MetadataSource};
pub use token::{MetadataTokenSource, StaticToken, TokenSource};
