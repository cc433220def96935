//! In-memory provider and metadata server.
//!
//! Mirrors the provider semantics the reconciliation logic relies on: 404 for
//! absent resources, 409 for duplicate routes, 412 for stale fingerprints, and
//! operations that are fetched from the endpoint matching their scope. Every
//! call is counted so callers can assert which requests were made.

use super::api::ComputeApi;
use super::metadata::MetadataSource;
use crate::error::ApiError;
use crate::models::{
    AliasIpRange, Instance, Network, Operation, OperationScope, OperationStatus, Route,
    SecondaryRange, Subnetwork,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

const SELF_LINK_BASE: &str = "https://www.googleapis.com/compute/v1";
const GLOBAL: &str = "global";

/// (project, zone/region/"global", name)
type Key = (String, String, String);

fn key(project: &str, location: &str, name: &str) -> Key {
    (project.to_string(), location.to_string(), name.to_string())
}

/// Number of requests made, by kind.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub reads: u32,
    pub mutations: u32,
    pub status_checks: u32,
}

#[derive(Deserialize, Debug)]
struct FixtureEntry<T> {
    project: String,
    /// Zone for instances, region for subnetworks; unused otherwise.
    #[serde(default)]
    location: Option<String>,
    resource: T,
}

/// On-disk layout of a provider fixture.
#[derive(Deserialize, Debug, Default)]
struct Fixture {
    #[serde(default)]
    networks: Vec<FixtureEntry<Network>>,
    #[serde(default)]
    instances: Vec<FixtureEntry<Instance>>,
    #[serde(default)]
    subnetworks: Vec<FixtureEntry<Subnetwork>>,
    #[serde(default)]
    routes: Vec<FixtureEntry<Route>>,
}

#[derive(Default)]
struct State {
    networks: BTreeMap<Key, Network>,
    instances: BTreeMap<Key, Instance>,
    subnetworks: BTreeMap<Key, Subnetwork>,
    routes: BTreeMap<Key, Route>,
    /// Responses for successive status checks, keyed by operation self-link.
    /// The last response repeats once the queue is drained.
    operations: HashMap<String, VecDeque<Operation>>,
    next_operation: u64,
    next_fingerprint: u64,
    pending_checks: u32,
    calls: CallCounts,
}

impl State {
    fn fingerprint(&mut self) -> String {
        self.next_fingerprint += 1;
        format!("fp-{}", self.next_fingerprint)
    }

    /// Register a new operation. It reports PENDING for `pending_checks`
    /// status checks before turning DONE.
    fn operation(
        &mut self,
        project: &str,
        scope: OperationScope,
        kind: &str,
        target: &str,
    ) -> Operation {
        self.next_operation += 1;
        let name = format!("operation-{}", self.next_operation);
        let self_link = format!("{SELF_LINK_BASE}/projects/{project}/{scope}/operations/{name}");
        let mut op = Operation {
            name,
            status: OperationStatus::Pending,
            operation_type: kind.to_string(),
            target_link: Some(target.to_string()),
            self_link: Some(self_link.clone()),
            ..Default::default()
        };
        if self.pending_checks == 0 {
            op.status = OperationStatus::Done;
        }
        let mut responses: VecDeque<Operation> =
            std::iter::repeat(op.clone()).take(self.pending_checks as usize).collect();
        responses.push_back(Operation {
            status: OperationStatus::Done,
            ..op.clone()
        });
        self.operations.insert(self_link, responses);
        op
    }
}

/// [`ComputeApi`] backed by in-process maps.
#[derive(Default)]
pub struct InMemoryCompute {
    state: Mutex<State>,
}

impl InMemoryCompute {
    pub fn new() -> InMemoryCompute {
        InMemoryCompute::default()
    }

    /// Load resources from a JSON fixture file.
    pub fn from_fixture(path: impl AsRef<Path>) -> Result<InMemoryCompute, ApiError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ApiError::Decode {
            path: path.display().to_string(),
            message: format!("error reading fixture: {e}"),
        })?;
        let mut deserializer = serde_json::Deserializer::from_str(&json);
        let fixture: Fixture =
            serde_path_to_error::deserialize(&mut deserializer).map_err(|e| ApiError::Decode {
                path: e.path().to_string(),
                message: format!("error parsing fixture {}: {}", path.display(), e.inner()),
            })?;
        log::info!("Read provider fixture: {}", path.display());

        let compute = InMemoryCompute::new();
        for e in fixture.networks {
            compute.add_network(&e.project, e.resource);
        }
        for e in fixture.instances {
            let zone = e.location.as_deref().unwrap_or_default();
            compute.add_instance(&e.project, zone, e.resource);
        }
        for e in fixture.subnetworks {
            let region = e.location.as_deref().unwrap_or_default();
            compute.add_subnetwork(&e.project, region, e.resource);
        }
        for e in fixture.routes {
            compute.add_route(&e.project, e.resource);
        }
        Ok(compute)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not hide the state from later asserts.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_network(&self, project: &str, mut network: Network) {
        if network.self_link.is_empty() {
            network.self_link = format!(
                "{SELF_LINK_BASE}/projects/{project}/global/networks/{}",
                network.name
            );
        }
        self.lock()
            .networks
            .insert(key(project, GLOBAL, &network.name), network);
    }

    /// Add or replace an instance, e.g. to simulate a concurrent change.
    pub fn add_instance(&self, project: &str, zone: &str, mut instance: Instance) {
        if instance.self_link.is_empty() {
            instance.self_link = format!(
                "{SELF_LINK_BASE}/projects/{project}/zones/{zone}/instances/{}",
                instance.name
            );
        }
        self.lock()
            .instances
            .insert(key(project, zone, &instance.name), instance);
    }

    pub fn add_subnetwork(&self, project: &str, region: &str, mut subnetwork: Subnetwork) {
        if subnetwork.self_link.is_empty() {
            subnetwork.self_link = format!(
                "{SELF_LINK_BASE}/projects/{project}/regions/{region}/subnetworks/{}",
                subnetwork.name
            );
        }
        self.lock()
            .subnetworks
            .insert(key(project, region, &subnetwork.name), subnetwork);
    }

    pub fn add_route(&self, project: &str, route: Route) {
        self.lock().routes.insert(key(project, GLOBAL, &route.name), route);
    }

    /// Newly created operations report PENDING for `checks` status checks.
    pub fn set_pending_checks(&self, checks: u32) {
        self.lock().pending_checks = checks;
    }

    /// Script the responses successive status checks of `name` return.
    pub fn script_operation(
        &self,
        project: &str,
        scope: &OperationScope,
        name: &str,
        responses: Vec<Operation>,
    ) {
        let link = format!("{SELF_LINK_BASE}/projects/{project}/{scope}/operations/{name}");
        self.lock().operations.insert(link, responses.into());
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    pub fn route(&self, project: &str, name: &str) -> Option<Route> {
        self.lock().routes.get(&key(project, GLOBAL, name)).cloned()
    }

    pub fn instance(&self, project: &str, zone: &str, name: &str) -> Option<Instance> {
        self.lock().instances.get(&key(project, zone, name)).cloned()
    }

    pub fn subnetwork(&self, project: &str, region: &str, name: &str) -> Option<Subnetwork> {
        self.lock().subnetworks.get(&key(project, region, name)).cloned()
    }

    fn status(
        &self,
        project: &str,
        scope: OperationScope,
        name: &str,
    ) -> Result<Operation, ApiError> {
        let mut state = self.lock();
        state.calls.status_checks += 1;
        let link = format!("{SELF_LINK_BASE}/projects/{project}/{scope}/operations/{name}");
        let responses = state
            .operations
            .get_mut(&link)
            .ok_or_else(|| ApiError::not_found(&link))?;
        let op = if responses.len() > 1 {
            responses.pop_front()
        } else {
            responses.front().cloned()
        };
        op.ok_or_else(|| ApiError::not_found(&link))
    }
}

fn conflict(status: u16, message: String) -> ApiError {
    ApiError::Status { status, message }
}

#[async_trait]
impl ComputeApi for InMemoryCompute {
    async fn get_network(&self, project: &str, name: &str) -> Result<Network, ApiError> {
        let mut state = self.lock();
        state.calls.reads += 1;
        state
            .networks
            .get(&key(project, GLOBAL, name))
            .cloned()
            .ok_or_else(|| {
                ApiError::not_found(format!("projects/{project}/global/networks/{name}"))
            })
    }

    async fn get_instance(
        &self,
        project: &str,
        zone: &str,
        name: &str,
    ) -> Result<Instance, ApiError> {
        let mut state = self.lock();
        state.calls.reads += 1;
        state
            .instances
            .get(&key(project, zone, name))
            .cloned()
            .ok_or_else(|| {
                ApiError::not_found(format!("projects/{project}/zones/{zone}/instances/{name}"))
            })
    }

    async fn update_alias_ip_ranges(
        &self,
        project: &str,
        zone: &str,
        instance: &str,
        interface: &str,
        fingerprint: Option<&str>,
        ranges: &[AliasIpRange],
    ) -> Result<Operation, ApiError> {
        let mut state = self.lock();
        state.calls.mutations += 1;
        let new_fingerprint = state.fingerprint();
        let target = {
            let found = state
                .instances
                .get_mut(&key(project, zone, instance))
                .ok_or_else(|| {
                    ApiError::not_found(format!(
                        "projects/{project}/zones/{zone}/instances/{instance}"
                    ))
                })?;
            let nic = found
                .network_interfaces
                .iter_mut()
                .enumerate()
                .find(|(i, nic)| nic.name.as_deref().unwrap_or(&format!("nic{i}")) == interface)
                .map(|(_, nic)| nic)
                .ok_or_else(|| ApiError::Status {
                    status: 400,
                    message: format!("Invalid value for field 'networkInterface': '{interface}'"),
                })?;
            if nic.fingerprint.as_deref() != fingerprint {
                return Err(conflict(
                    412,
                    format!(
                        "Supplied fingerprint does not match current fingerprint of {interface}"
                    ),
                ));
            }
            nic.alias_ip_ranges = ranges.to_vec();
            nic.fingerprint = Some(new_fingerprint);
            found.self_link.clone()
        };
        Ok(state.operation(
            project,
            OperationScope::Zonal {
                zone: zone.to_string(),
            },
            "updateNetworkInterface",
            &target,
        ))
    }

    async fn get_route(&self, project: &str, name: &str) -> Result<Route, ApiError> {
        let mut state = self.lock();
        state.calls.reads += 1;
        state
            .routes
            .get(&key(project, GLOBAL, name))
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("projects/{project}/global/routes/{name}")))
    }

    async fn insert_route(&self, project: &str, route: &Route) -> Result<Operation, ApiError> {
        let mut state = self.lock();
        state.calls.mutations += 1;
        let k = key(project, GLOBAL, &route.name);
        if state.routes.contains_key(&k) {
            return Err(conflict(
                409,
                format!(
                    "The resource 'projects/{project}/global/routes/{}' already exists",
                    route.name
                ),
            ));
        }
        let self_link = format!("{SELF_LINK_BASE}/projects/{project}/global/routes/{}", route.name);
        let mut stored = route.clone();
        stored.self_link = Some(self_link.clone());
        state.routes.insert(k, stored);
        Ok(state.operation(project, OperationScope::Global, "insert", &self_link))
    }

    async fn delete_route(&self, project: &str, name: &str) -> Result<Operation, ApiError> {
        let mut state = self.lock();
        state.calls.mutations += 1;
        let link = format!("projects/{project}/global/routes/{name}");
        state
            .routes
            .remove(&key(project, GLOBAL, name))
            .ok_or_else(|| ApiError::not_found(&link))?;
        Ok(state.operation(
            project,
            OperationScope::Global,
            "delete",
            &format!("{SELF_LINK_BASE}/{link}"),
        ))
    }

    async fn get_subnetwork(
        &self,
        project: &str,
        region: &str,
        name: &str,
    ) -> Result<Subnetwork, ApiError> {
        let mut state = self.lock();
        state.calls.reads += 1;
        state
            .subnetworks
            .get(&key(project, region, name))
            .cloned()
            .ok_or_else(|| {
                ApiError::not_found(format!(
                    "projects/{project}/regions/{region}/subnetworks/{name}"
                ))
            })
    }

    async fn patch_secondary_ranges(
        &self,
        project: &str,
        region: &str,
        name: &str,
        fingerprint: Option<&str>,
        ranges: &[SecondaryRange],
    ) -> Result<Operation, ApiError> {
        let mut state = self.lock();
        state.calls.mutations += 1;
        let new_fingerprint = state.fingerprint();
        let target = {
            let subnetwork = state
                .subnetworks
                .get_mut(&key(project, region, name))
                .ok_or_else(|| {
                    ApiError::not_found(format!(
                        "projects/{project}/regions/{region}/subnetworks/{name}"
                    ))
                })?;
            if subnetwork.fingerprint.as_deref() != fingerprint {
                return Err(conflict(
                    412,
                    format!(
                        "Supplied fingerprint does not match current fingerprint of subnetwork {name}"
                    ),
                ));
            }
            subnetwork.secondary_ip_ranges = ranges.to_vec();
            subnetwork.fingerprint = Some(new_fingerprint);
            subnetwork.self_link.clone()
        };
        Ok(state.operation(
            project,
            OperationScope::Regional {
                region: region.to_string(),
            },
            "patch",
            &target,
        ))
    }

    async fn get_zone_operation(
        &self,
        project: &str,
        zone: &str,
        name: &str,
    ) -> Result<Operation, ApiError> {
        self.status(
            project,
            OperationScope::Zonal {
                zone: zone.to_string(),
            },
            name,
        )
    }

    async fn get_region_operation(
        &self,
        project: &str,
        region: &str,
        name: &str,
    ) -> Result<Operation, ApiError> {
        self.status(
            project,
            OperationScope::Regional {
                region: region.to_string(),
            },
            name,
        )
    }

    async fn get_global_operation(&self, project: &str, name: &str) -> Result<Operation, ApiError> {
        self.status(project, OperationScope::Global, name)
    }
}

/// [`MetadataSource`] answering from a fixed map of paths.
#[derive(Default)]
pub struct InMemoryMetadata {
    values: HashMap<String, String>,
    requests: AtomicU32,
}

impl InMemoryMetadata {
    pub fn new() -> InMemoryMetadata {
        InMemoryMetadata::default()
    }

    pub fn with(mut self, path: &str, value: &str) -> InMemoryMetadata {
        self.values.insert(path.to_string(), value.to_string());
        self
    }

    pub fn request_count(&self) -> u32 {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataSource for InMemoryMetadata {
    async fn get(&self, path: &str) -> Result<String, ApiError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.values
            .get(path)
            .cloned()
            .ok_or_else(|| ApiError::Metadata(format!("GET {path} returned 404 Not Found")))
    }
}
