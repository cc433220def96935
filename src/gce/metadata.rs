//! Metadata-server lookups for the identity of the running instance.

use crate::error::{ApiError, Error, Result};
use crate::models::last_segment;
use async_trait::async_trait;

const NETWORK_PATH: &str = "instance/network-interfaces/0/network";
const PROJECT_PATH: &str = "project/project-id";
const INSTANCE_NAME_PATH: &str = "instance/name";
const ZONE_PATH: &str = "instance/zone";

/// Raw access to the metadata server; `path` is relative to the
/// `computeMetadata/v1/` root.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn get(&self, path: &str) -> std::result::Result<String, ApiError>;
}

/// HTTP client for the metadata server reachable from inside an instance.
pub struct MetadataClient {
    http: reqwest::Client,
    base_url: String,
}

impl MetadataClient {
    pub fn new(http: reqwest::Client) -> MetadataClient {
        MetadataClient::with_base_url(http, crate::config::METADATA_BASE_URL)
    }

    pub fn with_base_url(http: reqwest::Client, base_url: &str) -> MetadataClient {
        MetadataClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl MetadataSource for MetadataClient {
    async fn get(&self, path: &str) -> std::result::Result<String, ApiError> {
        let url = format!("{}/{}", self.base_url, path);
        log::trace!("metadata GET {url}");
        let response = self
            .http
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::Metadata(format!(
                "GET {path} returned {status}: {}",
                body.trim()
            )));
        }
        Ok(body.trim().to_string())
    }
}

/// Identity facts about the running instance, as opaque strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceMetadata {
    pub network_name: String,
    pub project: String,
    pub instance_name: String,
    pub zone: String,
    pub region: String,
}

impl InstanceMetadata {
    /// Query every fact; the first failing lookup is named in the error.
    pub async fn fetch(source: &dyn MetadataSource) -> Result<InstanceMetadata> {
        let lookup = |what: &'static str| {
            move |e: ApiError| Error::Resolve {
                lookup: what,
                source: Box::new(Error::request("querying metadata", what)(e)),
            }
        };
        let network = source
            .get(NETWORK_PATH)
            .await
            .map_err(lookup("network metadata"))?;
        let project = source.get(PROJECT_PATH).await.map_err(lookup("project"))?;
        let instance_name = source
            .get(INSTANCE_NAME_PATH)
            .await
            .map_err(lookup("instance name"))?;
        let zone = source
            .get(ZONE_PATH)
            .await
            .map_err(lookup("instance zone"))?;
        let zone = last_segment(&zone).to_string();
        let region = region_from_zone(&zone).ok_or_else(|| Error::Resolve {
            lookup: "instance region",
            source: Box::new(Error::Misconfigured(format!(
                "zone {zone:?} does not name a region"
            ))),
        })?;

        Ok(InstanceMetadata {
            network_name: last_segment(&network).to_string(),
            project,
            instance_name,
            region,
            zone,
        })
    }
}

/// `us-central1-a` -> `us-central1`.
pub fn region_from_zone(zone: &str) -> Option<String> {
    match zone.rsplit_once('-') {
        Some((region, suffix)) if !region.is_empty() && !suffix.is_empty() => {
            Some(region.to_string())
        }
        _ => None,
    }
}
