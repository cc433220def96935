//! Asynchronous provider operations and the scope they are queried in.

use super::reference::{last_segment, Location, ResourceRef};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationStatus {
    #[default]
    Pending,
    Running,
    Done,
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            OperationStatus::Pending => "PENDING",
            OperationStatus::Running => "RUNNING",
            OperationStatus::Done => "DONE",
        };
        write!(f, "{s}")
    }
}

/// One entry of an operation's error list.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl std::fmt::Display for OperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationErrors {
    #[serde(default)]
    pub errors: Vec<OperationError>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub status: OperationStatus,
    /// e.g. `insert`, `delete`, `patch`.
    #[serde(default)]
    pub operation_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationErrors>,
}

impl Operation {
    pub fn is_done(&self) -> bool {
        self.status == OperationStatus::Done
    }

    /// Errors reported by the provider. A non-empty list is terminal even
    /// while the status is not yet DONE.
    pub fn errors(&self) -> &[OperationError] {
        self.error.as_ref().map(|e| e.errors.as_slice()).unwrap_or(&[])
    }
}

/// Endpoint family an operation's status must be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationScope {
    Zonal { zone: String },
    Regional { region: String },
    Global,
}

impl OperationScope {
    /// Derive the scope from the operation itself: its self-link when present,
    /// otherwise its zone or region field.
    pub fn of(operation: &Operation) -> Result<OperationScope> {
        if let Some(link) = &operation.self_link {
            let parsed =
                ResourceRef::parse(link).map_err(|_| Error::UnsupportedScope(link.clone()))?;
            return Ok(match parsed.location {
                Location::Global => OperationScope::Global,
                Location::Zone(zone) => OperationScope::Zonal { zone },
                Location::Region(region) => OperationScope::Regional { region },
            });
        }
        Ok(match (&operation.zone, &operation.region) {
            (Some(zone), _) => OperationScope::Zonal {
                zone: last_segment(zone).to_string(),
            },
            (None, Some(region)) => OperationScope::Regional {
                region: last_segment(region).to_string(),
            },
            (None, None) => OperationScope::Global,
        })
    }
}

impl std::fmt::Display for OperationScope {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            OperationScope::Zonal { zone } => write!(f, "zones/{zone}"),
            OperationScope::Regional { region } => write!(f, "regions/{region}"),
            OperationScope::Global => write!(f, "global"),
        }
    }
}
