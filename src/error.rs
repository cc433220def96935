//! Error types for route and range reconciliation.
//!
//! [`ApiError`] describes what went wrong talking to the provider or the
//! metadata server. [`Error`] wraps it with the action that was attempted.

use crate::models::OperationError;
use thiserror::Error;

/// Failure of a single provider or metadata exchange.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The provider answered with a non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    /// The response body did not match the expected resource shape.
    #[error("decoding response at path={path}: {message}")]
    Decode { path: String, message: String },
    #[error("metadata server: {0}")]
    Metadata(String),
}

impl ApiError {
    pub fn not_found(what: impl std::fmt::Display) -> ApiError {
        ApiError::Status {
            status: 404,
            message: format!("The resource '{what}' was not found"),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Status { status: 404, .. })
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Session construction failed while looking up `lookup`.
    #[error("error getting {lookup}: {source}")]
    Resolve {
        lookup: &'static str,
        #[source]
        source: Box<Error>,
    },
    /// The provider rejected a get/insert/delete/patch/update call.
    #[error("error {action} {subject}: {source}")]
    Request {
        action: &'static str,
        subject: String,
        #[source]
        source: ApiError,
    },
    /// Local state makes the request impossible; retrying will not help.
    #[error("{0}")]
    Misconfigured(String),
    /// The asynchronous operation itself reported errors.
    #[error("error running operation {name}: {}", format_operation_errors(.errors))]
    OperationFailed {
        name: String,
        errors: Vec<OperationError>,
    },
    /// The status of an operation could not be fetched.
    #[error("error fetching status of operation {name}: {source}")]
    StatusCheck {
        name: String,
        #[source]
        source: ApiError,
    },
    #[error("timeout waiting for operation {name} to finish after {attempts} checks")]
    Timeout { name: String, attempts: u32 },
    #[error("deadline reached waiting for operation {name} after {attempts} checks")]
    DeadlineExceeded { name: String, attempts: u32 },
    #[error("unsupported operation scope {0:?}")]
    UnsupportedScope(String),
    #[error("invalid CIDR {input:?}: {reason}")]
    InvalidCidr { input: String, reason: String },
    #[error("invalid resource reference {0:?}")]
    InvalidReference(String),
    #[error("configuration: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn request(
        action: &'static str,
        subject: impl Into<String>,
    ) -> impl FnOnce(ApiError) -> Error {
        let subject = subject.into();
        move |source| Error::Request {
            action,
            subject,
            source,
        }
    }

    pub(crate) fn resolve(lookup: &'static str) -> impl FnOnce(Error) -> Error {
        move |source| Error::Resolve {
            lookup,
            source: Box::new(source),
        }
    }

    /// True when the provider reported the subject of a request as absent.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Request { source, .. } => source.is_not_found(),
            Error::Resolve { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// True for outcomes where the operation ran and reported failure, as
    /// opposed to giving up on waiting for it.
    pub fn is_operation_failure(&self) -> bool {
        matches!(self, Error::OperationFailed { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Timeout { .. } | Error::DeadlineExceeded { .. }
        )
    }
}

fn format_operation_errors(errors: &[OperationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<String>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, Error>;
