//! Integration tests for gce-subnet-routes
//!
//! These tests run complete reconciliation passes against the in-memory
//! provider loaded from the JSON fixtures.

use gce_subnet_routes::config::{Config, RouteAction};
use gce_subnet_routes::gce::{InMemoryCompute, InstanceMetadata};
use gce_subnet_routes::models::{Cidr, NextHop};
use gce_subnet_routes::{format_route_name, reconcile, RouteOutcome, Session};

fn config(subnet: &str, range_name: Option<&str>, override_project: Option<&str>) -> Config {
    Config {
        subnet: Cidr::new(subnet).unwrap(),
        range_name: range_name.map(str::to_string),
        network_project_override: override_project.map(str::to_string),
        access_token: None,
        action: RouteAction::Ensure,
    }
}

fn same_project_metadata() -> InstanceMetadata {
    InstanceMetadata {
        network_name: "default".to_string(),
        project: "node-project".to_string(),
        instance_name: "node-1".to_string(),
        zone: "us-central1-a".to_string(),
        region: "us-central1".to_string(),
    }
}

fn shared_vpc_metadata() -> InstanceMetadata {
    InstanceMetadata {
        network_name: "shared".to_string(),
        project: "node-project".to_string(),
        instance_name: "node-7".to_string(),
        zone: "europe-west1-b".to_string(),
        region: "europe-west1".to_string(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_same_project_route_uses_instance() {
    let compute = InMemoryCompute::from_fixture("src/tests/test_data/same_project.json")
        .expect("Failed to read provider fixture");
    compute.set_pending_checks(2);
    let cfg = config("10.1.2.0/24", None, None);
    let (session, instance) = Session::resolve(compute, &same_project_metadata(), None)
        .await
        .expect("Failed to resolve session");
    assert!(!session.identity().use_ip_next_hop());

    let summary = reconcile(&session, &instance, &cfg).await.expect("Failed to reconcile");
    assert_eq!(summary.route, RouteOutcome::Created);
    assert!(summary.ranges.is_none());

    let name = format_route_name(&cfg.subnet);
    assert_eq!(name, "flannel-10-1-2-0-24");
    let route = session.api().route("node-project", &name).expect("route created");
    assert_eq!(route.next_hop(), Some(NextHop::Instance(instance.self_link.clone())));
    assert_eq!(route.next_hop_ip, None);

    // A second pass finds the same route by the same name.
    let again = reconcile(&session, &instance, &cfg).await.expect("Failed to reconcile");
    assert_eq!(again.route, RouteOutcome::AlreadyPresent);
    assert_eq!(format_route_name(&cfg.subnet), name);
    assert_eq!(session.api().calls().mutations, 1);
}

#[tokio::test(start_paused = true)]
async fn test_shared_vpc_replaces_route_with_ip_next_hop() {
    let compute = InMemoryCompute::from_fixture("src/tests/test_data/shared_vpc.json")
        .expect("Failed to read provider fixture");
    let cfg = config("10.244.7.0/24", None, Some("host-project"));
    let (session, instance) =
        Session::resolve(compute, &shared_vpc_metadata(), Some("host-project"))
            .await
            .expect("Failed to resolve session");
    assert!(session.identity().use_ip_next_hop());
    assert_eq!(session.identity().network_project, "host-project");

    let summary = reconcile(&session, &instance, &cfg).await.expect("Failed to reconcile");
    assert_eq!(summary.route, RouteOutcome::Replaced);

    let route = session
        .api()
        .route("host-project", "flannel-10-244-7-0-24")
        .expect("route recreated");
    assert_eq!(route.next_hop_ip.as_deref(), Some("10.20.0.7"));
    assert_eq!(route.next_hop_instance, None);
}

#[tokio::test(start_paused = true)]
async fn test_ranges_registered_once() {
    let compute = InMemoryCompute::from_fixture("src/tests/test_data/shared_vpc.json")
        .expect("Failed to read provider fixture");
    compute.set_pending_checks(1);
    let cfg = config("10.244.8.0/24", Some("pods"), Some("host-project"));
    let (session, instance) =
        Session::resolve(compute, &shared_vpc_metadata(), Some("host-project"))
            .await
            .expect("Failed to resolve session");

    let summary = reconcile(&session, &instance, &cfg).await.expect("Failed to reconcile");
    let ranges = summary.ranges.expect("ranges reconciled");
    assert!(ranges.secondary_range_added);
    assert!(ranges.alias_range_added);
    // route insert, subnetwork patch, interface update
    assert_eq!(session.api().calls().mutations, 3);

    let subnetwork = session
        .api()
        .subnetwork("host-project", "europe-west1", "nodes")
        .unwrap();
    assert_eq!(subnetwork.secondary_ip_ranges.len(), 1);
    assert_eq!(subnetwork.secondary_ip_ranges[0].range_name, "pods");

    let node = session
        .api()
        .instance("node-project", "europe-west1-b", "node-7")
        .unwrap();
    let aliases = &node.network_interfaces[0].alias_ip_ranges;
    assert_eq!(aliases.len(), 2, "unnamed alias range must survive the merge");
    assert!(aliases.iter().any(|a| {
        a.subnetwork_range_name.as_deref() == Some("pods") && a.ip_cidr_range == "10.244.8.0/24"
    }));

    let again = reconcile(&session, &ranges.instance, &cfg)
        .await
        .expect("Failed to reconcile");
    let ranges = again.ranges.expect("ranges reconciled");
    assert!(!ranges.secondary_range_added);
    assert!(!ranges.alias_range_added);
    assert_eq!(again.route, RouteOutcome::AlreadyPresent);
    assert_eq!(session.api().calls().mutations, 3);
}

#[tokio::test(start_paused = true)]
async fn test_remove_action() {
    let compute = InMemoryCompute::from_fixture("src/tests/test_data/shared_vpc.json")
        .expect("Failed to read provider fixture");
    let mut cfg = config("10.244.7.0/24", Some("pods"), Some("host-project"));
    cfg.action = RouteAction::Remove;
    let (session, instance) =
        Session::resolve(compute, &shared_vpc_metadata(), Some("host-project"))
            .await
            .expect("Failed to resolve session");

    let summary = reconcile(&session, &instance, &cfg).await.expect("Failed to reconcile");
    assert_eq!(summary.route, RouteOutcome::Removed);
    assert!(summary.ranges.is_none());

    let again = reconcile(&session, &instance, &cfg).await.expect("Failed to reconcile");
    assert_eq!(again.route, RouteOutcome::Absent);
}

#[tokio::test]
async fn test_resolve_fails_without_network_project_network() {
    let compute = InMemoryCompute::from_fixture("src/tests/test_data/shared_vpc.json")
        .expect("Failed to read provider fixture");
    // Without the override the network is looked up in the instance project.
    let err = Session::resolve(compute, &shared_vpc_metadata(), None)
        .await
        .err()
        .expect("resolve should fail");
    assert!(err.is_not_found());
    assert!(err.to_string().starts_with("error getting network from compute service"));
}
