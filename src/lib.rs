//! Keeps a node's overlay subnet reachable in a GCE network: a route sends
//! the subnet to the node, and the subnet is registered as a secondary range
//! of the node's subnetwork and an alias range of its interface.

pub mod config;
pub mod error;
pub mod gce;
pub mod identity;
pub mod models;
pub mod naming;
pub mod poller;
pub mod ranges;
pub mod reconcile;
pub mod routes;

use config::{Config, RouteAction};
use gce::{
    ComputeApi, GceClient, MetadataClient, MetadataSource, MetadataTokenSource, StaticToken,
    TokenSource,
};
use std::sync::Arc;

pub use error::{ApiError, Error, Result};
pub use identity::{InstanceSnapshot, NetworkIdentity, NetworkSnapshot, Session};
pub use naming::format_route_name;
pub use poller::{OperationPoller, PollConfig};
pub use ranges::{merge_by_name, Merged, RangeMerger};
pub use reconcile::{RangeOutcome, Reconciler, RouteOutcome};
pub use routes::RouteManager;

/// What one reconciliation pass did.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub route: RouteOutcome,
    pub ranges: Option<RangeOutcome>,
}

/// Resolve a session against the real provider from inside an instance.
pub async fn connect(config: &Config) -> Result<(Session<GceClient>, InstanceSnapshot)> {
    let http = reqwest::Client::new();
    let metadata: Arc<dyn MetadataSource> = Arc::new(MetadataClient::new(http.clone()));
    let tokens: Arc<dyn TokenSource> = match &config.access_token {
        Some(token) => Arc::new(StaticToken(token.clone())),
        None => Arc::new(MetadataTokenSource::new(metadata.clone())),
    };
    let api = GceClient::new(http, tokens);
    Session::from_metadata(api, metadata.as_ref(), config.network_project_override.as_deref()).await
}

/// Run one pass: the route per `config.action`, then the ranges when a range
/// name is configured and the route is being ensured.
pub async fn reconcile<C: ComputeApi>(
    session: &Session<C>,
    instance: &InstanceSnapshot,
    config: &Config,
) -> Result<Summary> {
    let reconciler = Reconciler::new(session);
    let route = match config.action {
        RouteAction::Ensure => reconciler.ensure_route(&config.subnet, instance).await?,
        RouteAction::Remove => reconciler.remove_route(&config.subnet).await?,
    };
    let ranges = match (&config.range_name, config.action) {
        (Some(name), RouteAction::Ensure) => {
            Some(reconciler.ensure_ranges(instance, name, &config.subnet).await?)
        }
        _ => None,
    };
    Ok(Summary { route, ranges })
}
