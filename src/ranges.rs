//! Registering a subnet as a named IP range.
//!
//! The same merge-by-name rule serves subnetwork secondary ranges and
//! instance alias ranges: an entry with the same name and CIDR is left alone,
//! otherwise the entry replaces the one with its name or is added. Merged
//! lists come back sorted by name.

use crate::error::{Error, Result};
use crate::gce::ComputeApi;
use crate::identity::{InstanceSnapshot, Session};
use crate::models::{AliasIpRange, Cidr, Location, Operation, ResourceRef, SecondaryRange};
use colored::Colorize;
use std::collections::BTreeMap;

/// Identity of a range within its owner. Alias ranges taken from the
/// subnetwork's primary range carry no name and are keyed by CIDR so they
/// are never collapsed into each other.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum RangeKey {
    Named(String),
    Unnamed(String),
}

pub trait NamedRange: Clone {
    fn key(&self) -> RangeKey;
    fn cidr(&self) -> &str;
}

impl NamedRange for SecondaryRange {
    fn key(&self) -> RangeKey {
        RangeKey::Named(self.range_name.clone())
    }

    fn cidr(&self) -> &str {
        &self.ip_cidr_range
    }
}

impl NamedRange for AliasIpRange {
    fn key(&self) -> RangeKey {
        match &self.subnetwork_range_name {
            Some(name) => RangeKey::Named(name.clone()),
            None => RangeKey::Unnamed(self.ip_cidr_range.clone()),
        }
    }

    fn cidr(&self) -> &str {
        &self.ip_cidr_range
    }
}

/// Outcome of [`merge_by_name`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Merged<R> {
    /// An identical entry already exists; nothing to submit.
    Unchanged,
    Updated(Vec<R>),
}

/// Insert or overwrite `entry` among `existing`, keyed by name.
pub fn merge_by_name<R: NamedRange>(existing: &[R], entry: R) -> Merged<R> {
    let key = entry.key();
    if existing
        .iter()
        .any(|r| r.key() == key && r.cidr().trim() == entry.cidr().trim())
    {
        return Merged::Unchanged;
    }

    let mut by_name: BTreeMap<RangeKey, R> =
        existing.iter().map(|r| (r.key(), r.clone())).collect();
    by_name.insert(key, entry);
    Merged::Updated(by_name.into_values().collect())
}

/// Adds named ranges to the node's subnetwork and to its interface 0.
pub struct RangeMerger<'a, C> {
    session: &'a Session<C>,
}

impl<'a, C: ComputeApi> RangeMerger<'a, C> {
    pub(crate) fn new(session: &'a Session<C>) -> RangeMerger<'a, C> {
        RangeMerger { session }
    }

    /// Register `cidr` as secondary range `range_name` on the subnetwork that
    /// interface 0 of `instance` is attached to. Returns `None` when the range
    /// is already present.
    pub async fn add_subnet_secondary_range(
        &self,
        instance: &InstanceSnapshot,
        range_name: &str,
        cidr: &Cidr,
    ) -> Result<Option<Operation>> {
        let link = instance
            .primary_interface()
            .and_then(|nic| nic.subnetwork.as_deref())
            .ok_or_else(|| {
                Error::Misconfigured(format!(
                    "expected instance={} to have a network interface attached to a subnetwork",
                    instance.self_link
                ))
            })?;
        let subnet_ref = ResourceRef::parse(link)?;
        let region = match &subnet_ref.location {
            Location::Region(region) => region.clone(),
            _ => return Err(Error::InvalidReference(link.to_string())),
        };
        let subject = format!("{}/{}/{}", subnet_ref.project, region, subnet_ref.name);

        let api = self.session.api();
        let subnetwork = api
            .get_subnetwork(&subnet_ref.project, &region, &subnet_ref.name)
            .await
            .map_err(Error::request("getting subnetwork", subject.clone()))?;

        let entry = SecondaryRange {
            range_name: range_name.to_string(),
            ip_cidr_range: cidr.to_string(),
        };
        let ranges = match merge_by_name(&subnetwork.secondary_ip_ranges, entry) {
            Merged::Unchanged => {
                log::info!("Secondary range {range_name}={cidr} already on subnetwork {subject}");
                return Ok(None);
            }
            Merged::Updated(ranges) => ranges,
        };

        log::info!(
            "Adding secondary range {}={} to subnetwork {subject}",
            range_name.on_blue(),
            cidr
        );
        api.patch_secondary_ranges(
            &subnet_ref.project,
            &region,
            &subnet_ref.name,
            subnetwork.fingerprint.as_deref(),
            &ranges,
        )
        .await
        .map(Some)
        .map_err(Error::request("patching subnetwork", subject))
    }

    /// Register `cidr` as alias range `range_name` on interface 0 of the
    /// instance. The instance is fetched again right before merging so the
    /// fingerprint is as fresh as possible; that snapshot is returned along
    /// with the operation (`None` when the range is already present).
    pub async fn add_alias_ip_range(
        &self,
        range_name: &str,
        cidr: &Cidr,
    ) -> Result<(InstanceSnapshot, Option<Operation>)> {
        let instance = self.session.refresh_instance().await?;
        let nic = instance.primary_interface().ok_or_else(|| {
            Error::Misconfigured(format!(
                "expected instance={} to have network interfaces",
                instance.self_link
            ))
        })?;

        let entry = AliasIpRange {
            ip_cidr_range: cidr.to_string(),
            subnetwork_range_name: Some(range_name.to_string()),
        };
        let ranges = match merge_by_name(&nic.alias_ip_ranges, entry) {
            Merged::Unchanged => {
                log::info!("Alias range {range_name}={cidr} already on {}", instance.name);
                return Ok((instance, None));
            }
            Merged::Updated(ranges) => ranges,
        };

        let identity = self.session.identity();
        let interface = nic.name.clone().unwrap_or_else(|| "nic0".to_string());
        log::info!(
            "Adding alias range {}={} to {}/{interface}",
            range_name.on_blue(),
            cidr,
            instance.name
        );
        let operation = self
            .session
            .api()
            .update_alias_ip_ranges(
                &identity.instance_project,
                &identity.instance_zone,
                &identity.instance_name,
                &interface,
                nic.fingerprint.as_deref(),
                &ranges,
            )
            .await
            .map_err(Error::request(
                "updating network interface",
                format!("{}/{interface}", identity.instance_name),
            ))?;
        Ok((instance, Some(operation)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gce::{InMemoryCompute, InstanceMetadata};
    use crate::models::{Instance, Network, NetworkInterface, Subnetwork};

    fn secondary(name: &str, cidr: &str) -> SecondaryRange {
        SecondaryRange {
            range_name: name.to_string(),
            ip_cidr_range: cidr.to_string(),
        }
    }

    #[test]
    fn test_merge_into_empty() {
        let merged = merge_by_name(&[], secondary("pods", "10.1.2.0/24"));
        assert_eq!(merged, Merged::Updated(vec![secondary("pods", "10.1.2.0/24")]));
    }

    #[test]
    fn test_merge_new_name_appends() {
        let existing = vec![secondary("services", "10.96.0.0/20")];
        match merge_by_name(&existing, secondary("pods", "10.1.2.0/24")) {
            Merged::Updated(ranges) => {
                assert_eq!(ranges.len(), 2);
                // Sorted by name.
                assert_eq!(ranges[0].range_name, "pods");
                assert_eq!(ranges[1].range_name, "services");
            }
            Merged::Unchanged => panic!("expected an update"),
        }
    }

    #[test]
    fn test_merge_same_name_replaces_cidr() {
        let existing = vec![
            secondary("pods", "10.1.2.0/24"),
            secondary("services", "10.96.0.0/20"),
        ];
        match merge_by_name(&existing, secondary("pods", "10.1.3.0/24")) {
            Merged::Updated(ranges) => {
                assert_eq!(ranges.len(), 2);
                assert_eq!(ranges[0], secondary("pods", "10.1.3.0/24"));
            }
            Merged::Unchanged => panic!("expected an update"),
        }
    }

    #[test]
    fn test_merge_identical_is_unchanged() {
        let existing = vec![secondary("pods", "10.1.2.0/24")];
        assert_eq!(
            merge_by_name(&existing, secondary("pods", "10.1.2.0/24")),
            Merged::Unchanged
        );
    }

    #[test]
    fn test_merge_output_is_deterministic() {
        let a = vec![secondary("b", "10.0.2.0/24"), secondary("a", "10.0.1.0/24")];
        let b = vec![secondary("a", "10.0.1.0/24"), secondary("b", "10.0.2.0/24")];
        assert_eq!(
            merge_by_name(&a, secondary("c", "10.0.3.0/24")),
            merge_by_name(&b, secondary("c", "10.0.3.0/24"))
        );
    }

    #[test]
    fn test_merge_keeps_unnamed_alias_ranges() {
        let existing = vec![
            AliasIpRange {
                ip_cidr_range: "10.128.0.32/32".to_string(),
                subnetwork_range_name: None,
            },
            AliasIpRange {
                ip_cidr_range: "10.128.0.33/32".to_string(),
                subnetwork_range_name: None,
            },
        ];
        let entry = AliasIpRange {
            ip_cidr_range: "10.1.2.0/24".to_string(),
            subnetwork_range_name: Some("pods".to_string()),
        };
        match merge_by_name(&existing, entry) {
            Merged::Updated(ranges) => assert_eq!(ranges.len(), 3),
            Merged::Unchanged => panic!("expected an update"),
        }
    }

    const SUBNET_LINK: &str =
        "https://www.googleapis.com/compute/v1/projects/host-project/regions/us-central1/subnetworks/nodes";

    async fn session() -> (Session<InMemoryCompute>, InstanceSnapshot) {
        let compute = InMemoryCompute::new();
        compute.add_network(
            "node-project",
            Network {
                name: "default".to_string(),
                ..Default::default()
            },
        );
        compute.add_instance(
            "node-project",
            "us-central1-a",
            Instance {
                name: "node-1".to_string(),
                network_interfaces: vec![NetworkInterface {
                    name: Some("nic0".to_string()),
                    subnetwork: Some(SUBNET_LINK.to_string()),
                    network_ip: Some("10.128.0.5".to_string()),
                    fingerprint: Some("nic-fp".to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            },
        );
        compute.add_subnetwork(
            "host-project",
            "us-central1",
            Subnetwork {
                name: "nodes".to_string(),
                fingerprint: Some("subnet-fp".to_string()),
                secondary_ip_ranges: vec![secondary("services", "10.96.0.0/20")],
                ..Default::default()
            },
        );
        let metadata = InstanceMetadata {
            network_name: "default".to_string(),
            project: "node-project".to_string(),
            instance_name: "node-1".to_string(),
            zone: "us-central1-a".to_string(),
            region: "us-central1".to_string(),
        };
        Session::resolve(compute, &metadata, None)
            .await
            .expect("Error resolving session")
    }

    #[tokio::test]
    async fn test_secondary_range_added_once() {
        let (session, instance) = session().await;
        let cidr = Cidr::new("10.1.2.0/24").unwrap();

        let first = session
            .ranges()
            .add_subnet_secondary_range(&instance, "pods", &cidr)
            .await
            .unwrap();
        assert!(first.is_some());
        let second = session
            .ranges()
            .add_subnet_secondary_range(&instance, "pods", &cidr)
            .await
            .unwrap();
        assert!(second.is_none());
        assert_eq!(session.api().calls().mutations, 1);

        let subnetwork = session
            .api()
            .subnetwork("host-project", "us-central1", "nodes")
            .unwrap();
        assert_eq!(
            subnetwork.secondary_ip_ranges,
            vec![
                secondary("pods", "10.1.2.0/24"),
                secondary("services", "10.96.0.0/20")
            ]
        );
    }

    #[tokio::test]
    async fn test_alias_range_added_once() {
        let (session, _) = session().await;
        let cidr = Cidr::new("10.1.2.0/24").unwrap();

        let (_, first) = session.ranges().add_alias_ip_range("pods", &cidr).await.unwrap();
        assert!(first.is_some());
        let (fresh, second) = session.ranges().add_alias_ip_range("pods", &cidr).await.unwrap();
        assert!(second.is_none());
        assert_eq!(session.api().calls().mutations, 1);
        assert_eq!(fresh.network_interfaces[0].alias_ip_ranges.len(), 1);
    }

    #[tokio::test]
    async fn test_alias_range_uses_refreshed_fingerprint() {
        let (session, stale) = session().await;
        // Someone else updates the interface after the session was resolved.
        let mut changed = (*stale).clone();
        changed.network_interfaces[0].fingerprint = Some("nic-fp-2".to_string());
        session.api().add_instance("node-project", "us-central1-a", changed);

        let cidr = Cidr::new("10.1.2.0/24").unwrap();
        let (fresh, op) = session.ranges().add_alias_ip_range("pods", &cidr).await.unwrap();
        assert!(op.is_some());
        assert_eq!(fresh.network_interfaces[0].fingerprint.as_deref(), Some("nic-fp-2"));
    }

    #[tokio::test]
    async fn test_secondary_range_needs_subnetwork_link() {
        let (session, _) = session().await;
        let bare = InstanceSnapshot::new(Instance {
            name: "node-1".to_string(),
            network_interfaces: vec![NetworkInterface::default()],
            ..Default::default()
        });
        let err = session
            .ranges()
            .add_subnet_secondary_range(&bare, "pods", &Cidr::new("10.1.2.0/24").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Misconfigured(_)));
        assert_eq!(session.api().calls().mutations, 0);
    }
}
