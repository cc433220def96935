//! One-shot reconciliation of a node's subnet with the provider.
//!
//! Builds on the route and range managers: checks what exists, submits only
//! what is missing or wrong, and waits for each submitted operation.

use crate::error::Result;
use crate::gce::ComputeApi;
use crate::identity::{InstanceSnapshot, Session};
use crate::models::{Cidr, Operation, ResourceRef};
use colored::Colorize;

/// What [`Reconciler::ensure_route`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    AlreadyPresent,
    Created,
    /// A route with our name pointed elsewhere and was recreated.
    Replaced,
    /// Only from [`Reconciler::remove_route`]: nothing to delete.
    Absent,
    Removed,
}

/// What [`Reconciler::ensure_ranges`] had to do.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeOutcome {
    pub secondary_range_added: bool,
    pub alias_range_added: bool,
    /// The instance as re-fetched before the alias merge.
    pub instance: InstanceSnapshot,
}

pub struct Reconciler<'a, C> {
    session: &'a Session<C>,
}

impl<'a, C: ComputeApi> Reconciler<'a, C> {
    pub fn new(session: &'a Session<C>) -> Reconciler<'a, C> {
        Reconciler { session }
    }

    async fn wait(&self, project: &str, operation: &Operation) -> Result<()> {
        self.session.poller().wait(project, Some(operation)).await
    }

    /// Make sure the route for `subnet` exists and points at this node.
    pub async fn ensure_route(
        &self,
        subnet: &Cidr,
        instance: &InstanceSnapshot,
    ) -> Result<RouteOutcome> {
        let routes = self.session.routes();
        let project = &self.session.identity().network_project;

        let replaced = match routes.get_route(subnet).await {
            Ok(existing) if routes.points_at(&existing, instance) => {
                log::info!("Exact pre-existing route found for {subnet}");
                return Ok(RouteOutcome::AlreadyPresent);
            }
            Ok(existing) => {
                log::warn!(
                    "Deleting conflicting route {} with next hop {:?}",
                    existing.name.on_red(),
                    existing.next_hop()
                );
                let op = routes.delete_route(subnet).await?;
                self.wait(project, &op).await?;
                true
            }
            Err(e) if e.is_not_found() => false,
            Err(e) => return Err(e),
        };

        let op = routes.insert_route(subnet, instance).await?;
        self.wait(project, &op).await?;
        log::info!("Route for {} in place", subnet.to_string().on_green());
        Ok(if replaced {
            RouteOutcome::Replaced
        } else {
            RouteOutcome::Created
        })
    }

    /// Delete the route for `subnet`, treating an absent route as done.
    pub async fn remove_route(&self, subnet: &Cidr) -> Result<RouteOutcome> {
        let project = &self.session.identity().network_project;
        match self.session.routes().delete_route(subnet).await {
            Ok(op) => {
                self.wait(project, &op).await?;
                Ok(RouteOutcome::Removed)
            }
            Err(e) if e.is_not_found() => {
                log::info!("No route to remove for {subnet}");
                Ok(RouteOutcome::Absent)
            }
            Err(e) => Err(e),
        }
    }

    /// Register `subnet` as secondary range `range_name` on the node's
    /// subnetwork, then as an alias range on its interface.
    pub async fn ensure_ranges(
        &self,
        instance: &InstanceSnapshot,
        range_name: &str,
        subnet: &Cidr,
    ) -> Result<RangeOutcome> {
        let ranges = self.session.ranges();

        let secondary = ranges
            .add_subnet_secondary_range(instance, range_name, subnet)
            .await?;
        if let Some(op) = &secondary {
            // The operation lives in the subnetwork's project.
            let project = op
                .self_link
                .as_deref()
                .and_then(|l| ResourceRef::parse(l).ok())
                .map(|r| r.project)
                .unwrap_or_else(|| self.session.identity().network_project.clone());
            self.wait(&project, op).await?;
        }

        let (instance, alias) = ranges.add_alias_ip_range(range_name, subnet).await?;
        if let Some(op) = &alias {
            self.wait(&self.session.identity().instance_project, op).await?;
        }

        Ok(RangeOutcome {
            secondary_range_added: secondary.is_some(),
            alias_range_added: alias.is_some(),
            instance,
        })
    }
}
