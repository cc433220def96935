//! Compute resources as the provider's REST API represents them.
//!
//! Only the fields this crate reads or writes are modelled; unknown fields are
//! ignored when decoding.

use serde::{Deserialize, Serialize};

/// A VPC network. Only its self-link is used when building routes.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub self_link: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub self_link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterface>,
}

impl Instance {
    /// The first network interface. Multi-NIC instances are not supported:
    /// every lookup and update goes through interface 0.
    pub fn primary_interface(&self) -> Option<&NetworkInterface> {
        self.network_interfaces.first()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    /// Interface name, `nic0` for the first interface.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// Self-link of the subnetwork the interface is attached to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnetwork: Option<String>,
    /// Internal IP address.
    #[serde(rename = "networkIP", default, skip_serializing_if = "Option::is_none")]
    pub network_ip: Option<String>,
    /// Optimistic-concurrency fingerprint required by updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub alias_ip_ranges: Vec<AliasIpRange>,
}

/// A CIDR assigned to a network interface, optionally drawn from a named
/// secondary range of its subnetwork.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AliasIpRange {
    pub ip_cidr_range: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnetwork_range_name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subnetwork {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub self_link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_cidr_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub secondary_ip_ranges: Vec<SecondaryRange>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecondaryRange {
    pub range_name: String,
    pub ip_cidr_range: String,
}

/// Where a route sends matching traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextHop {
    /// An internal IP address, used when the instance lives in another project.
    Ip(String),
    /// An instance self-link.
    Instance(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub name: String,
    pub dest_range: String,
    pub network: String,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_hop_instance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_hop_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
}

impl Route {
    /// Build a route carrying exactly one next-hop variant.
    pub fn new(
        name: String,
        dest_range: String,
        network: String,
        priority: u32,
        next_hop: NextHop,
    ) -> Route {
        let (next_hop_ip, next_hop_instance) = match next_hop {
            NextHop::Ip(ip) => (Some(ip), None),
            NextHop::Instance(link) => (None, Some(link)),
        };
        Route {
            name,
            dest_range,
            network,
            priority,
            tags: vec![],
            next_hop_instance,
            next_hop_ip,
            self_link: None,
        }
    }

    /// The route's next hop; instance references win over IPs should the
    /// provider ever return both.
    pub fn next_hop(&self) -> Option<NextHop> {
        match (&self.next_hop_instance, &self.next_hop_ip) {
            (Some(link), _) => Some(NextHop::Instance(link.clone())),
            (None, Some(ip)) => Some(NextHop::Ip(ip.clone())),
            (None, None) => None,
        }
    }
}
