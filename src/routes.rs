//! Routes that send a node's overlay subnet to that node.

use crate::config::ROUTE_PRIORITY;
use crate::error::{Error, Result};
use crate::gce::ComputeApi;
use crate::identity::{InstanceSnapshot, Session};
use crate::models::{Cidr, NextHop, Operation, Route};
use crate::naming::format_route_name;
use colored::Colorize;

/// Get, insert and delete the route named after a subnet. Routes live in the
/// network project.
pub struct RouteManager<'a, C> {
    session: &'a Session<C>,
}

impl<'a, C: ComputeApi> RouteManager<'a, C> {
    pub(crate) fn new(session: &'a Session<C>) -> RouteManager<'a, C> {
        RouteManager { session }
    }

    fn project(&self) -> &str {
        &self.session.identity().network_project
    }

    /// Look up the route for `subnet`. A missing route is an error for which
    /// [`Error::is_not_found`] holds; what that means is up to the caller.
    pub async fn get_route(&self, subnet: &Cidr) -> Result<Route> {
        let name = format_route_name(subnet);
        self.session
            .api()
            .get_route(self.project(), &name)
            .await
            .map_err(Error::request("getting route", name))
    }

    /// The next hop for routes to this node: the internal IP of interface 0
    /// when routing across projects, otherwise the instance itself.
    pub fn next_hop(&self, instance: &InstanceSnapshot) -> Result<NextHop> {
        if !self.session.identity().use_ip_next_hop() {
            return Ok(NextHop::Instance(instance.self_link.clone()));
        }
        let nic = instance.primary_interface().ok_or_else(|| {
            Error::Misconfigured(format!(
                "error expected instance={} to have network interfaces",
                instance.self_link
            ))
        })?;
        nic.network_ip.clone().map(NextHop::Ip).ok_or_else(|| {
            Error::Misconfigured(format!(
                "error expected interface {} of instance={} to have an internal IP",
                nic.name.as_deref().unwrap_or("nic0"),
                instance.self_link
            ))
        })
    }

    /// The route `insert_route` would submit.
    pub fn build_route(&self, subnet: &Cidr, instance: &InstanceSnapshot) -> Result<Route> {
        Ok(Route::new(
            format_route_name(subnet),
            subnet.to_string(),
            self.session.network().self_link.clone(),
            ROUTE_PRIORITY,
            self.next_hop(instance)?,
        ))
    }

    /// True when `route` already sends traffic to this node.
    pub fn points_at(&self, route: &Route, instance: &InstanceSnapshot) -> bool {
        match self.next_hop(instance) {
            Ok(expected) => route.next_hop() == Some(expected),
            Err(_) => false,
        }
    }

    /// Submit a route for `subnet` via this node. The returned operation must
    /// be polled to confirm the route exists.
    pub async fn insert_route(
        &self,
        subnet: &Cidr,
        instance: &InstanceSnapshot,
    ) -> Result<Operation> {
        let route = self.build_route(subnet, instance)?;
        log::info!("Inserting route for subnet: {}", subnet.to_string().on_blue());
        self.session
            .api()
            .insert_route(self.project(), &route)
            .await
            .map_err(Error::request("inserting route", route.name.clone()))
    }

    /// Submit deletion of the route for `subnet`. Deleting an absent route
    /// fails with a not-found error.
    pub async fn delete_route(&self, subnet: &Cidr) -> Result<Operation> {
        let name = format_route_name(subnet);
        log::info!("Deleting route {}", name.on_blue());
        self.session
            .api()
            .delete_route(self.project(), &name)
            .await
            .map_err(Error::request("deleting route", name))
    }
}
