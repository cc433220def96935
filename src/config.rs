//! Constants and environment-driven settings.

use crate::error::{Error, Result};
use crate::models::Cidr;
use std::time::Duration;

/// Selects the project owning the network when it differs from the
/// instance's own project (shared VPC deployments).
pub const ENV_NETWORK_PROJECT_ID: &str = "GCE_NETWORK_PROJECT_ID";
pub const ENV_SUBNET: &str = "SUBNET";
pub const ENV_RANGE_NAME: &str = "RANGE_NAME";
pub const ENV_ACCESS_TOKEN: &str = "GCE_ACCESS_TOKEN";
pub const ENV_ROUTE_ACTION: &str = "ROUTE_ACTION";

pub const COMPUTE_BASE_URL: &str = "https://compute.googleapis.com/compute/v1";
pub const METADATA_BASE_URL: &str = "http://metadata.google.internal/computeMetadata/v1";
/// Only the compute API is needed.
pub const COMPUTE_SCOPE: &str = "https://www.googleapis.com/auth/compute";

pub const ROUTE_PRIORITY: u32 = 1000;
pub const ROUTE_NAME_PREFIX: &str = "flannel";

pub const POLL_MAX_ATTEMPTS: u32 = 100;
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const POLL_REPORT_EVERY: u32 = 5;

/// What the binary does with the route for its subnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RouteAction {
    #[default]
    Ensure,
    Remove,
}

impl std::str::FromStr for RouteAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<RouteAction> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "ensure" => Ok(RouteAction::Ensure),
            "remove" => Ok(RouteAction::Remove),
            other => Err(Error::Config(format!(
                "{ENV_ROUTE_ACTION} must be 'ensure' or 'remove', got {other:?}"
            ))),
        }
    }
}

/// Settings for one reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub subnet: Cidr,
    pub range_name: Option<String>,
    pub network_project_override: Option<String>,
    pub access_token: Option<String>,
    pub action: RouteAction,
}

impl Config {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Config> {
        Config::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let subnet = get(ENV_SUBNET)
            .ok_or_else(|| Error::Config(format!("{ENV_SUBNET} is not set")))?;
        let subnet = Cidr::new(&subnet)?;
        if !subnet.is_network_aligned() {
            return Err(Error::Config(format!(
                "{ENV_SUBNET}={subnet} has host bits set, expected {}/{}",
                subnet.network(),
                subnet.prefix
            )));
        }
        let action = match get(ENV_ROUTE_ACTION) {
            Some(v) => v.parse()?,
            None => RouteAction::default(),
        };
        Ok(Config {
            subnet,
            range_name: get(ENV_RANGE_NAME),
            network_project_override: get(ENV_NETWORK_PROJECT_ID),
            access_token: get(ENV_ACCESS_TOKEN),
            action,
        })
    }
}
