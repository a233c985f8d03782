//! Block until a batch job reaches a terminal state.

use super::{BatchJobManager, BatchJobStatus, BatchState};
use crate::backoff::Backoff;
use crate::error::{HarkError, Result};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Poll `name` every `poll_interval` until it is terminal or `max_wait` has
/// elapsed.
///
/// Transient poll failures are retried with `backoff`, but never past
/// `max_wait`. Giving up never cancels the remote job; the manager keeps its
/// last observation.
#[instrument(skip(manager, backoff))]
pub async fn wait_until_terminal(
    manager: &BatchJobManager,
    name: &str,
    poll_interval: Duration,
    max_wait: Duration,
    backoff: &Backoff,
) -> Result<BatchJobStatus> {
    let started = Instant::now();
    let deadline = started + max_wait;
    let mut last_state = manager.last_observed(name).map(|s| s.state);

    let exceeded = |last_state: Option<BatchState>| HarkError::DeadlineExceeded {
        job: name.to_string(),
        last_state: last_state.map_or_else(|| "UNKNOWN".to_string(), |s| s.to_string()),
        waited_secs: started.elapsed().as_secs(),
    };

    loop {
        let polled =
            tokio::time::timeout_at(deadline, backoff.retry("batch poll", || manager.poll(name)))
                .await;
        let status = match polled {
            Ok(status) => status?,
            Err(_) => {
                warn!("Job {} still unsettled when the wait ran out", name);
                return Err(exceeded(last_state));
            }
        };
        if status.state.is_terminal() {
            info!("Job {} finished as {}", name, status.state);
            return Ok(status);
        }
        last_state = Some(status.state);

        let elapsed = started.elapsed();
        if elapsed >= max_wait {
            return Err(exceeded(last_state));
        }

        let pause = poll_interval.min(max_wait - elapsed);
        debug!("Job {} is {}; next poll in {:?}", name, status.state, pause);
        tokio::time::sleep(pause).await;
    }
}

#[cfg(test)]
mod tests {
    use super::super::fake::{FakeBatchService, Step};
    use super::super::{BatchOptions, TargetDescriptor};
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::config::TranscriptionPrompts;
    use std::sync::Arc;

    /// Timer deadlines round up to the next millisecond tick.
    fn assert_elapsed(started: Instant, secs: u64) {
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(secs), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(secs + 1), "elapsed {:?}", elapsed);
    }

    async fn submitted(service: Arc<FakeBatchService>) -> (BatchJobManager, String) {
        let manager = BatchJobManager::new(
            service,
            Arc::new(MemoryCacheStore::new()),
            TranscriptionPrompts::default(),
            10,
        );
        let job = manager
            .submit(
                vec![TargetDescriptor::new("https://cdn.example.com/ep.mp3")],
                BatchOptions::default(),
            )
            .await
            .unwrap();
        (manager, job.name)
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_until_terminal() {
        let service = Arc::new(FakeBatchService::new());
        let (manager, name) = submitted(service.clone()).await;
        service.script([
            Step::State(BatchState::Pending),
            Step::State(BatchState::Running),
            Step::State(BatchState::Succeeded),
        ]);

        let started = Instant::now();
        let status = wait_until_terminal(
            &manager,
            &name,
            Duration::from_secs(60),
            Duration::from_secs(3600),
            &Backoff::none(),
        )
        .await
        .unwrap();

        assert_eq!(status.state, BatchState::Succeeded);
        assert_eq!(service.calls.get(), 3);
        assert_elapsed(started, 120);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded_near_max_wait() {
        let service = Arc::new(FakeBatchService::new());
        let (manager, name) = submitted(service.clone()).await;
        service.script([Step::State(BatchState::Running)]);

        let started = Instant::now();
        let err = wait_until_terminal(
            &manager,
            &name,
            Duration::from_secs(60),
            Duration::from_secs(150),
            &Backoff::none(),
        )
        .await
        .unwrap_err();

        match err {
            HarkError::DeadlineExceeded { job, last_state, waited_secs } => {
                assert_eq!(job, name);
                assert_eq!(last_state, "RUNNING");
                assert_eq!(waited_secs, 150);
            }
            other => panic!("expected DeadlineExceeded, got {:?}", other),
        }
        assert_elapsed(started, 150);
        // Polled at 0, 60, 120 and 150 seconds
        assert_eq!(service.calls.get(), 4);

        // The job itself is untouched
        assert_eq!(service.calls.cancel.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(
            manager.last_observed(&name).map(|s| s.state),
            Some(BatchState::Running)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_poll_errors_are_retried() {
        let service = Arc::new(FakeBatchService::new());
        let (manager, name) = submitted(service.clone()).await;
        service.script([Step::Transient, Step::Transient, Step::State(BatchState::Failed)]);

        let backoff = Backoff {
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            max_attempts: 3,
        };
        let status = wait_until_terminal(
            &manager,
            &name,
            Duration::from_secs(60),
            Duration::from_secs(600),
            &backoff,
        )
        .await
        .unwrap();

        assert_eq!(status.state, BatchState::Failed);
        assert!(matches!(
            status.into_success(),
            Err(HarkError::RemoteTerminalFailure { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_surface_transient_error() {
        let service = Arc::new(FakeBatchService::new());
        let (manager, name) = submitted(service.clone()).await;
        service.script([Step::Transient, Step::Transient]);

        let backoff = Backoff {
            max_attempts: 2,
            ..Backoff::default()
        };
        let err = wait_until_terminal(
            &manager,
            &name,
            Duration::from_secs(60),
            Duration::from_secs(600),
            &backoff,
        )
        .await
        .unwrap_err();

        assert!(err.is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_backoff_stops_at_max_wait() {
        let service = Arc::new(FakeBatchService::new());
        let (manager, name) = submitted(service.clone()).await;
        service.script([
            Step::State(BatchState::Running),
            Step::Transient,
            Step::Transient,
            Step::Transient,
            Step::Transient,
            Step::State(BatchState::Running),
        ]);

        let backoff = Backoff {
            base_delay: Duration::from_secs(5),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            max_attempts: 5,
        };
        let started = Instant::now();
        let err = wait_until_terminal(
            &manager,
            &name,
            Duration::from_secs(1),
            Duration::from_secs(3),
            &backoff,
        )
        .await
        .unwrap_err();

        match err {
            HarkError::DeadlineExceeded { last_state, waited_secs, .. } => {
                assert_eq!(last_state, "RUNNING");
                assert_eq!(waited_secs, 3);
            }
            other => panic!("expected DeadlineExceeded, got {:?}", other),
        }
        assert_elapsed(started, 3);
        // One good poll, then a single failed attempt before the 5s retry pause
        assert_eq!(service.calls.get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_waits_share_runtime() {
        let service = Arc::new(FakeBatchService::new());
        let (manager, name) = submitted(service.clone()).await;
        service.script([Step::State(BatchState::Running)]);

        let none = Backoff::none();
        let short = wait_until_terminal(
            &manager,
            &name,
            Duration::from_secs(30),
            Duration::from_secs(60),
            &none,
        );
        let long = wait_until_terminal(
            &manager,
            &name,
            Duration::from_secs(30),
            Duration::from_secs(90),
            &none,
        );

        let started = Instant::now();
        let (a, b) = tokio::join!(short, long);
        assert!(matches!(a, Err(HarkError::DeadlineExceeded { .. })));
        assert!(matches!(b, Err(HarkError::DeadlineExceeded { .. })));
        assert_elapsed(started, 90);
    }
}
