//! The slice of the compute API this crate consumes.

use crate::error::ApiError;
use crate::models::{AliasIpRange, Instance, Network, Operation, Route, SecondaryRange, Subnetwork};
use async_trait::async_trait;

/// Read/write access to compute resources.
///
/// Mutating calls return the provider's [`Operation`] handle; completion is
/// observed separately through the `get_*_operation` calls.
#[async_trait]
pub trait ComputeApi: Send + Sync {
    async fn get_network(&self, project: &str, name: &str) -> Result<Network, ApiError>;

    async fn get_instance(
        &self,
        project: &str,
        zone: &str,
        name: &str,
    ) -> Result<Instance, ApiError>;

    /// Replace the alias IP ranges of one interface. `fingerprint` must be the
    /// interface fingerprint read alongside the current ranges.
    async fn update_alias_ip_ranges(
        &self,
        project: &str,
        zone: &str,
        instance: &str,
        interface: &str,
        fingerprint: Option<&str>,
        ranges: &[AliasIpRange],
    ) -> Result<Operation, ApiError>;

    async fn get_route(&self, project: &str, name: &str) -> Result<Route, ApiError>;

    async fn insert_route(&self, project: &str, route: &Route) -> Result<Operation, ApiError>;

    async fn delete_route(&self, project: &str, name: &str) -> Result<Operation, ApiError>;

    async fn get_subnetwork(
        &self,
        project: &str,
        region: &str,
        name: &str,
    ) -> Result<Subnetwork, ApiError>;

    /// Replace the secondary ranges of a subnetwork, guarded by `fingerprint`.
    async fn patch_secondary_ranges(
        &self,
        project: &str,
        region: &str,
        name: &str,
        fingerprint: Option<&str>,
        ranges: &[SecondaryRange],
    ) -> Result<Operation, ApiError>;

    async fn get_zone_operation(
        &self,
        project: &str,
        zone: &str,
        name: &str,
    ) -> Result<Operation, ApiError>;

    async fn get_region_operation(
        &self,
        project: &str,
        region: &str,
        name: &str,
    ) -> Result<Operation, ApiError>;

    async fn get_global_operation(&self, project: &str, name: &str) -> Result<Operation, ApiError>;
}
