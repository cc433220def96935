//! Waiting for asynchronous provider operations to finish.

use crate::config::{POLL_INTERVAL, POLL_MAX_ATTEMPTS, POLL_REPORT_EVERY};
use crate::error::{ApiError, Error, Result};
use crate::gce::ComputeApi;
use crate::models::{Operation, OperationScope};
use std::time::Duration;
use tokio::time::Instant;

/// Bounds of a completion wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    pub max_attempts: u32,
    /// Fixed pause between status checks.
    pub interval: Duration,
    /// Log the current status every this many attempts.
    pub report_every: u32,
    /// Give up once this instant has passed, even with attempts left.
    pub deadline: Option<Instant>,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            max_attempts: POLL_MAX_ATTEMPTS,
            interval: POLL_INTERVAL,
            report_every: POLL_REPORT_EVERY,
            deadline: None,
        }
    }
}

impl PollConfig {
    pub fn with_deadline(mut self, deadline: Instant) -> PollConfig {
        self.deadline = Some(deadline);
        self
    }
}

impl OperationScope {
    /// Fetch the current state of `name` from the endpoint for this scope.
    pub async fn fetch<C: ComputeApi + ?Sized>(
        &self,
        api: &C,
        project: &str,
        name: &str,
    ) -> std::result::Result<Operation, ApiError> {
        match self {
            OperationScope::Zonal { zone } => api.get_zone_operation(project, zone, name).await,
            OperationScope::Regional { region } => {
                api.get_region_operation(project, region, name).await
            }
            OperationScope::Global => api.get_global_operation(project, name).await,
        }
    }
}

/// Polls operation status until DONE, failure, or the attempt budget runs out.
pub struct OperationPoller<'a, C> {
    api: &'a C,
    config: PollConfig,
}

impl<'a, C: ComputeApi> OperationPoller<'a, C> {
    pub fn new(api: &'a C, config: PollConfig) -> OperationPoller<'a, C> {
        OperationPoller { api, config }
    }

    /// Wait for `operation`, deriving its scope from the operation itself.
    pub async fn wait(&self, project: &str, operation: Option<&Operation>) -> Result<()> {
        match operation {
            Some(op) if !op.errors().is_empty() => Err(failed(op)),
            Some(op) if !op.is_done() => {
                let scope = OperationScope::of(op)?;
                self.poll_operation_status(project, &scope, Some(op)).await
            }
            _ => Ok(()),
        }
    }

    /// Wait for `operation` in `project`/`scope` to reach DONE.
    ///
    /// Absent or already finished operations succeed without any request,
    /// unless they already carry an error list.
    /// Only the status check is repeated; a failed check, an error list on the
    /// operation, running out of attempts and passing the deadline each end
    /// the wait with their own error.
    pub async fn poll_operation_status(
        &self,
        project: &str,
        scope: &OperationScope,
        operation: Option<&Operation>,
    ) -> Result<()> {
        let name = match operation {
            None => return Ok(()),
            Some(op) if !op.errors().is_empty() => return Err(failed(op)),
            Some(op) if op.is_done() => return Ok(()),
            Some(op) => op.name.as_str(),
        };

        for attempt in 0..self.config.max_attempts {
            if let Some(deadline) = self.config.deadline {
                if Instant::now() >= deadline {
                    return Err(Error::DeadlineExceeded {
                        name: name.to_string(),
                        attempts: attempt,
                    });
                }
            }

            let current = scope
                .fetch(self.api, project, name)
                .await
                .map_err(|source| Error::StatusCheck {
                    name: name.to_string(),
                    source,
                })?;

            if !current.errors().is_empty() {
                return Err(failed(&current));
            }

            if self.config.report_every > 0 && attempt % self.config.report_every == 0 {
                log::info!(
                    "{} operation {name} status: {} waiting for completion...",
                    current.operation_type,
                    current.status
                );
            }

            if current.is_done() {
                log::debug!("operation {name} done after {} checks", attempt + 1);
                return Ok(());
            }

            if attempt + 1 < self.config.max_attempts {
                self.pause().await;
            }
        }

        Err(Error::Timeout {
            name: name.to_string(),
            attempts: self.config.max_attempts,
        })
    }

    async fn pause(&self) {
        let wake = Instant::now() + self.config.interval;
        match self.config.deadline {
            Some(deadline) if deadline < wake => tokio::time::sleep_until(deadline).await,
            _ => tokio::time::sleep_until(wake).await,
        }
    }
}

fn failed(operation: &Operation) -> Error {
    Error::OperationFailed {
        name: operation.name.clone(),
        errors: operation.errors().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gce::InMemoryCompute;
    use crate::models::{OperationError, OperationErrors, OperationStatus};

    const PROJECT: &str = "node-project";

    fn op(name: &str, status: OperationStatus) -> Operation {
        Operation {
            name: name.to_string(),
            status,
            operation_type: "insert".to_string(),
            ..Default::default()
        }
    }

    fn zonal() -> OperationScope {
        OperationScope::Zonal {
            zone: "us-central1-a".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_absent_or_done_makes_no_calls() {
        let compute = InMemoryCompute::new();
        let poller = OperationPoller::new(&compute, PollConfig::default());
        let start = Instant::now();

        poller
            .poll_operation_status(PROJECT, &OperationScope::Global, None)
            .await
            .unwrap();
        poller
            .poll_operation_status(
                PROJECT,
                &zonal(),
                Some(&op("operation-1", OperationStatus::Done)),
            )
            .await
            .unwrap();
        poller.wait(PROJECT, None).await.unwrap();

        assert_eq!(compute.calls().status_checks, 0);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_with_errors_fails_without_calls() {
        let compute = InMemoryCompute::new();
        let poller = OperationPoller::new(&compute, PollConfig::default());
        let mut failed = op("operation-1", OperationStatus::Done);
        failed.error = Some(OperationErrors {
            errors: vec![OperationError {
                code: "QUOTA_EXCEEDED".to_string(),
                message: "Quota 'ROUTES' exceeded".to_string(),
            }],
        });

        let err = poller
            .poll_operation_status(PROJECT, &zonal(), Some(&failed))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::OperationFailed { .. }));
        assert!(err.to_string().contains("QUOTA_EXCEEDED"));

        let err = poller.wait(PROJECT, Some(&failed)).await.unwrap_err();
        assert!(err.is_operation_failure());

        assert_eq!(compute.calls().status_checks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_on_third_check() {
        let compute = InMemoryCompute::new();
        compute.script_operation(
            PROJECT,
            &zonal(),
            "operation-1",
            vec![
                op("operation-1", OperationStatus::Pending),
                op("operation-1", OperationStatus::Running),
                op("operation-1", OperationStatus::Done),
            ],
        );
        let poller = OperationPoller::new(&compute, PollConfig::default());
        let start = Instant::now();

        poller
            .poll_operation_status(
                PROJECT,
                &zonal(),
                Some(&op("operation-1", OperationStatus::Pending)),
            )
            .await
            .unwrap();

        assert_eq!(compute.calls().status_checks, 3);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_budget() {
        let compute = InMemoryCompute::new();
        compute.script_operation(
            PROJECT,
            &OperationScope::Global,
            "operation-1",
            vec![op("operation-1", OperationStatus::Running)],
        );
        let poller = OperationPoller::new(&compute, PollConfig::default());

        let err = poller
            .poll_operation_status(
                PROJECT,
                &OperationScope::Global,
                Some(&op("operation-1", OperationStatus::Pending)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { attempts: 100, .. }));
        assert!(err.is_timeout());
        assert_eq!(compute.calls().status_checks, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_list_is_terminal_before_done() {
        let compute = InMemoryCompute::new();
        let mut failed = op("operation-1", OperationStatus::Running);
        failed.error = Some(OperationErrors {
            errors: vec![OperationError {
                code: "RESOURCE_NOT_READY".to_string(),
                message: "instance is being updated".to_string(),
            }],
        });
        compute.script_operation(
            PROJECT,
            &OperationScope::Global,
            "operation-1",
            vec![op("operation-1", OperationStatus::Pending), failed],
        );
        let poller = OperationPoller::new(&compute, PollConfig::default());

        let err = poller
            .poll_operation_status(
                PROJECT,
                &OperationScope::Global,
                Some(&op("operation-1", OperationStatus::Pending)),
            )
            .await
            .unwrap_err();

        assert!(err.is_operation_failure());
        assert!(err.to_string().contains("instance is being updated"));
        assert_eq!(compute.calls().status_checks, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_check_failure_is_not_retried() {
        let compute = InMemoryCompute::new();
        let poller = OperationPoller::new(&compute, PollConfig::default());

        // Never registered, so the status endpoint answers 404.
        let err = poller
            .poll_operation_status(
                PROJECT,
                &zonal(),
                Some(&op("operation-404", OperationStatus::Pending)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::StatusCheck { .. }));
        assert!(!err.is_operation_failure());
        assert_eq!(compute.calls().status_checks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_scope_fails_without_sleeping() {
        let compute = InMemoryCompute::new();
        let poller = OperationPoller::new(&compute, PollConfig::default());
        let mut pending = op("operation-1", OperationStatus::Pending);
        pending.self_link =
            Some("projects/node-project/aggregated/operations/operation-1".to_string());
        let start = Instant::now();

        let err = poller.wait(PROJECT, Some(&pending)).await.unwrap_err();

        assert!(matches!(err, Error::UnsupportedScope(_)));
        assert_eq!(compute.calls().status_checks, 0);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_dispatches_on_operation_scope() {
        let compute = InMemoryCompute::new();
        let scope = OperationScope::Regional {
            region: "us-central1".to_string(),
        };
        compute.script_operation(
            PROJECT,
            &scope,
            "operation-7",
            vec![op("operation-7", OperationStatus::Done)],
        );
        let mut pending = op("operation-7", OperationStatus::Pending);
        pending.region = Some(
            "https://www.googleapis.com/compute/v1/projects/node-project/regions/us-central1"
                .to_string(),
        );
        let poller = OperationPoller::new(&compute, PollConfig::default());

        poller.wait(PROJECT, Some(&pending)).await.unwrap();
        assert_eq!(compute.calls().status_checks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cuts_wait_short() {
        let compute = InMemoryCompute::new();
        compute.script_operation(
            PROJECT,
            &OperationScope::Global,
            "operation-1",
            vec![op("operation-1", OperationStatus::Running)],
        );
        let config =
            PollConfig::default().with_deadline(Instant::now() + Duration::from_millis(4500));
        let poller = OperationPoller::new(&compute, config);

        let err = poller
            .poll_operation_status(
                PROJECT,
                &OperationScope::Global,
                Some(&op("operation-1", OperationStatus::Pending)),
            )
            .await
            .unwrap_err();

        // Checks at 0s, 1s, 2s, 3s, 4s; the sleep after the fifth stops at 4.5s.
        assert!(matches!(err, Error::DeadlineExceeded { attempts: 5, .. }));
        assert!(err.is_timeout());
        assert_eq!(compute.calls().status_checks, 5);
    }
}
