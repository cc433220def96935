//! Identity of this node in the provider, resolved once per session.
//!
//! A [`Session`] holds the immutable facts every call needs. The instance is
//! not cached inside it: callers hold an [`InstanceSnapshot`] and get a fresh
//! one from [`Session::refresh_instance`] when they need current state.

use crate::error::{Error, Result};
use crate::gce::{ComputeApi, InstanceMetadata, MetadataSource};
use crate::models::{Instance, Network};
use crate::poller::{OperationPoller, PollConfig};
use crate::ranges::RangeMerger;
use crate::routes::RouteManager;
use colored::Colorize;
use std::ops::Deref;
use std::sync::Arc;

/// Projects, location and name of the running instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkIdentity {
    pub network_name: String,
    /// Project owning the network; routes live here.
    pub network_project: String,
    pub instance_project: String,
    pub instance_zone: String,
    pub instance_region: String,
    pub instance_name: String,
    use_ip_next_hop: bool,
}

impl NetworkIdentity {
    /// The network project is the override when given, else the instance's
    /// own project.
    pub fn new(
        metadata: &InstanceMetadata,
        network_project_override: Option<&str>,
    ) -> NetworkIdentity {
        let network_project = network_project_override
            .filter(|p| !p.is_empty())
            .unwrap_or(&metadata.project)
            .to_string();
        // Routes cannot reference an instance in another project, so
        // cross-project setups target the instance's internal IP instead.
        let use_ip_next_hop = metadata.project != network_project;
        NetworkIdentity {
            network_name: metadata.network_name.clone(),
            network_project,
            instance_project: metadata.project.clone(),
            instance_zone: metadata.zone.clone(),
            instance_region: metadata.region.clone(),
            instance_name: metadata.instance_name.clone(),
            use_ip_next_hop,
        }
    }

    pub fn use_ip_next_hop(&self) -> bool {
        self.use_ip_next_hop
    }
}

/// The network object as fetched at session start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSnapshot {
    pub name: String,
    pub self_link: String,
}

impl From<Network> for NetworkSnapshot {
    fn from(network: Network) -> Self {
        NetworkSnapshot {
            name: network.name,
            self_link: network.self_link,
        }
    }
}

/// An instance as fetched at one point in time. Cheap to clone; refreshing
/// yields a new snapshot and leaves existing ones untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceSnapshot(Arc<Instance>);

impl InstanceSnapshot {
    pub fn new(instance: Instance) -> InstanceSnapshot {
        InstanceSnapshot(Arc::new(instance))
    }
}

impl Deref for InstanceSnapshot {
    type Target = Instance;

    fn deref(&self) -> &Instance {
        &self.0
    }
}

/// Resolved identity plus the provider client every manager issues calls through.
pub struct Session<C> {
    api: C,
    identity: NetworkIdentity,
    network: NetworkSnapshot,
    poll: PollConfig,
}

impl<C: ComputeApi> Session<C> {
    /// Query the metadata server, then resolve as [`Session::resolve`].
    pub async fn from_metadata(
        api: C,
        source: &dyn MetadataSource,
        network_project_override: Option<&str>,
    ) -> Result<(Session<C>, InstanceSnapshot)> {
        let metadata = InstanceMetadata::fetch(source).await?;
        Session::resolve(api, &metadata, network_project_override).await
    }

    /// Fetch the network and the instance. Fails naming the lookup that
    /// failed, or when the instance has no network interface.
    pub async fn resolve(
        api: C,
        metadata: &InstanceMetadata,
        network_project_override: Option<&str>,
    ) -> Result<(Session<C>, InstanceSnapshot)> {
        let identity = NetworkIdentity::new(metadata, network_project_override);

        let network = api
            .get_network(&identity.network_project, &identity.network_name)
            .await
            .map_err(Error::request(
                "getting network",
                format!("{}/{}", identity.network_project, identity.network_name),
            ))
            .map_err(Error::resolve("network from compute service"))?;

        let instance = fetch_instance(&api, &identity)
            .await
            .map_err(Error::resolve("instance from compute service"))?;
        if instance.network_interfaces.is_empty() {
            return Err(Error::Resolve {
                lookup: "instance network interfaces",
                source: Box::new(Error::Misconfigured(format!(
                    "expected instance={} to have network interfaces",
                    instance.self_link
                ))),
            });
        }

        log::info!(
            "Resolved instance {} in {}, network {} in {} (next hop by {})",
            identity.instance_name.on_blue(),
            identity.instance_project,
            identity.network_name.on_blue(),
            identity.network_project,
            if identity.use_ip_next_hop() { "ip" } else { "instance" },
        );

        let session = Session {
            api,
            identity,
            network: network.into(),
            poll: PollConfig::default(),
        };
        Ok((session, InstanceSnapshot::new(instance)))
    }

    /// Fetch the instance again, returning a new snapshot.
    pub async fn refresh_instance(&self) -> Result<InstanceSnapshot> {
        fetch_instance(&self.api, &self.identity)
            .await
            .map(InstanceSnapshot::new)
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Session<C> {
        self.poll = poll;
        self
    }

    pub fn api(&self) -> &C {
        &self.api
    }

    pub fn identity(&self) -> &NetworkIdentity {
        &self.identity
    }

    pub fn network(&self) -> &NetworkSnapshot {
        &self.network
    }

    pub fn poll_config(&self) -> &PollConfig {
        &self.poll
    }

    pub fn routes(&self) -> RouteManager<'_, C> {
        RouteManager::new(self)
    }

    pub fn ranges(&self) -> RangeMerger<'_, C> {
        RangeMerger::new(self)
    }

    pub fn poller(&self) -> OperationPoller<'_, C> {
        OperationPoller::new(&self.api, self.poll.clone())
    }
}

async fn fetch_instance<C: ComputeApi>(api: &C, identity: &NetworkIdentity) -> Result<Instance> {
    api.get_instance(
        &identity.instance_project,
        &identity.instance_zone,
        &identity.instance_name,
    )
    .await
    .map_err(Error::request(
        "getting instance",
        format!(
            "{}/{}/{}",
            identity.instance_project, identity.instance_zone, identity.instance_name
        ),
    ))
}
