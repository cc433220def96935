//! REST client for the compute v1 API.

use super::api::ComputeApi;
use super::token::TokenSource;
use crate::error::ApiError;
use crate::models::{AliasIpRange, Instance, Network, Operation, Route, SecondaryRange, Subnetwork};
use async_trait::async_trait;
use colored::Colorize;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize, Debug, Default)]
struct ErrorBody {
    #[serde(default)]
    error: ErrorDetail,
}

#[derive(Deserialize, Debug, Default)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

/// [`ComputeApi`] over HTTPS, authenticated with bearer tokens.
pub struct GceClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
}

impl GceClient {
    pub fn new(http: reqwest::Client, tokens: Arc<dyn TokenSource>) -> GceClient {
        GceClient::with_base_url(http, tokens, crate::config::COMPUTE_BASE_URL)
    }

    pub fn with_base_url(
        http: reqwest::Client,
        tokens: Arc<dyn TokenSource>,
        base_url: &str,
    ) -> GceClient {
        GceClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, ApiError> {
        let url = format!("{}/{}", self.base_url, path);
        log::debug!("{method} {url}", method = method.as_str().on_blue());

        let mut request = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(self.tokens.token().await?);
        if let Some(body) = body {
            log::trace!("request body={body}");
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.to_string());
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|b| b.error.message)
                .ok()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| text.trim().to_string());
            log::warn!(
                "{failed} {method} {url}: {status}",
                failed = "failed".on_red(),
                method = method.as_str(),
            );
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        decode(&text)
    }
}

/// Decode a response body, reporting the JSON path of the first mismatch.
fn decode<T: DeserializeOwned>(text: &str) -> Result<T, ApiError> {
    let mut deserializer = serde_json::Deserializer::from_str(text);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
        log::error!("RESPONSE START:\n\n{}\n\nRESPONSE END\n", text);
        ApiError::Decode {
            path: e.path().to_string(),
            message: e.inner().to_string(),
        }
    })
}

#[async_trait]
impl ComputeApi for GceClient {
    async fn get_network(&self, project: &str, name: &str) -> Result<Network, ApiError> {
        self.call(Method::GET, &format!("projects/{project}/global/networks/{name}"), None)
            .await
    }

    async fn get_instance(
        &self,
        project: &str,
        zone: &str,
        name: &str,
    ) -> Result<Instance, ApiError> {
        self.call(
            Method::GET,
            &format!("projects/{project}/zones/{zone}/instances/{name}"),
            None,
        )
        .await
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
        let body = serde_json::json!({
            "fingerprint": fingerprint,
            "aliasIpRanges": ranges,
        });
        self.call(
            Method::PATCH,
            &format!(
                "projects/{project}/zones/{zone}/instances/{instance}/updateNetworkInterface?networkInterface={interface}"
            ),
            Some(body),
        )
        .await
    }

    async fn get_route(&self, project: &str, name: &str) -> Result<Route, ApiError> {
        self.call(Method::GET, &format!("projects/{project}/global/routes/{name}"), None)
            .await
    }

    async fn insert_route(&self, project: &str, route: &Route) -> Result<Operation, ApiError> {
        let body = serde_json::to_value(route).map_err(|e| ApiError::Decode {
            path: "route".to_string(),
            message: e.to_string(),
        })?;
        self.call(Method::POST, &format!("projects/{project}/global/routes"), Some(body))
            .await
    }

    async fn delete_route(&self, project: &str, name: &str) -> Result<Operation, ApiError> {
        self.call(Method::DELETE, &format!("projects/{project}/global/routes/{name}"), None)
            .await
    }

    async fn get_subnetwork(
        &self,
        project: &str,
        region: &str,
        name: &str,
    ) -> Result<Subnetwork, ApiError> {
        self.call(
            Method::GET,
            &format!("projects/{project}/regions/{region}/subnetworks/{name}"),
            None,
        )
        .await
    }

    async fn patch_secondary_ranges(
        &self,
        project: &str,
        region: &str,
        name: &str,
        fingerprint: Option<&str>,
        ranges: &[SecondaryRange],
    ) -> Result<Operation, ApiError> {
        let body = serde_json::json!({
            "fingerprint": fingerprint,
            "secondaryIpRanges": ranges,
        });
        self.call(
            Method::PATCH,
            &format!("projects/{project}/regions/{region}/subnetworks/{name}"),
            Some(body),
        )
        .await
    }

    async fn get_zone_operation(
        &self,
        project: &str,
        zone: &str,
        name: &str,
    ) -> Result<Operation, ApiError> {
        self.call(
            Method::GET,
            &format!("projects/{project}/zones/{zone}/operations/{name}"),
            None,
        )
        .await
    }

    async fn get_region_operation(
        &self,
        project: &str,
        region: &str,
        name: &str,
    ) -> Result<Operation, ApiError> {
        self.call(
            Method::GET,
            &format!("projects/{project}/regions/{region}/operations/{name}"),
            None,
        )
        .await
    }

    async fn get_global_operation(&self, project: &str, name: &str) -> Result<Operation, ApiError> {
        self.call(Method::GET, &format!("projects/{project}/global/operations/{name}"), None)
            .await
    }
}
