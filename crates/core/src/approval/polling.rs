use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::approval::observer::{DecisionObserver, DecisionOutcome, ObserverError};
use crate::config::DecisionTransport;
use crate::domain::approval::ApprovalDecision;
use crate::domain::request::RequestId;

/// Read side of the workflow engine's run history.
#[async_trait]
pub trait DecisionSource: Send + Sync {
    async fn fetch_decision(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<ApprovalDecision>, ObserverError>;
}

/// Polls a [`DecisionSource`] on a fixed interval. A decision visible at
/// exactly the deadline is accepted; the next poll would land past it, so the
/// request times out instead.
pub struct PollingObserver<S> {
    source: S,
    interval: Duration,
    max_transport_errors: u32,
}

impl<S> PollingObserver<S>
where
    S: DecisionSource,
{
    pub fn new(source: S, interval: Duration, max_transport_errors: u32) -> Self {
        Self { source, interval, max_transport_errors: max_transport_errors.max(1) }
    }
}

#[async_trait]
impl<S> DecisionObserver for PollingObserver<S>
where
    S: DecisionSource,
{
    fn transport(&self) -> DecisionTransport {
        DecisionTransport::Polling
    }

    async fn await_decision(
        &self,
        request_id: &RequestId,
        deadline: Instant,
    ) -> Result<DecisionOutcome, ObserverError> {
        let mut consecutive_errors = 0u32;
        let mut polls = 0u32;

        loop {
            polls += 1;
            match self.source.fetch_decision(request_id).await {
                Ok(Some(decision)) => {
                    debug!(
                        event_name = "approval.poll_decided",
                        request_id = %request_id,
                        polls,
                        decision = decision.decision.as_str(),
                        "decision observed in run history"
                    );
                    return Ok(DecisionOutcome::Decided(decision));
                }
                Ok(None) => consecutive_errors = 0,
                Err(error) => {
                    consecutive_errors += 1;
                    warn!(
                        event_name = "approval.poll_failed",
                        request_id = %request_id,
                        consecutive_errors,
                        error = %error,
                        "run history poll failed"
                    );
                    if consecutive_errors >= self.max_transport_errors {
                        return Err(error);
                    }
                }
            }

            let next_poll = Instant::now() + self.interval;
            if next_poll > deadline {
                return Ok(DecisionOutcome::TimedOut);
            }
            tokio::time::sleep_until(next_poll).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::{DecisionSource, PollingObserver};
    use crate::approval::observer::{DecisionObserver, DecisionOutcome, ObserverError};
    use crate::domain::approval::{ApprovalDecision, Decision};
    use crate::domain::request::RequestId;

    /// Reports a decision once `available_after` has elapsed since creation.
    struct DelayedDecision {
        started: Instant,
        available_after: Duration,
        decision: Decision,
        polls: Mutex<u32>,
    }

    impl DelayedDecision {
        fn new(available_after: Duration, decision: Decision) -> Self {
            Self { started: Instant::now(), available_after, decision, polls: Mutex::new(0) }
        }

        fn polls(&self) -> u32 {
            *self.polls.lock().expect("polls lock")
        }
    }

    #[async_trait]
    impl DecisionSource for DelayedDecision {
        async fn fetch_decision(
            &self,
            request_id: &RequestId,
        ) -> Result<Option<ApprovalDecision>, ObserverError> {
            *self.polls.lock().expect("polls lock") += 1;
            if self.started.elapsed() >= self.available_after {
                Ok(Some(ApprovalDecision::new(*request_id, self.decision, None)))
            } else {
                Ok(None)
            }
        }
    }

    struct AlwaysFailing;

    #[async_trait]
    impl DecisionSource for AlwaysFailing {
        async fn fetch_decision(
            &self,
            _request_id: &RequestId,
        ) -> Result<Option<ApprovalDecision>, ObserverError> {
            Err(ObserverError::Transport("503 from run history".into()))
        }
    }

    const INTERVAL: Duration = Duration::from_secs(10);
    const TIMEOUT: Duration = Duration::from_secs(600);

    #[tokio::test(start_paused = true)]
    async fn decision_arriving_mid_wait_is_observed_on_next_poll() {
        let source = DelayedDecision::new(Duration::from_secs(95), Decision::Approved);
        let observer = PollingObserver::new(source, INTERVAL, 3);
        let started = Instant::now();

        let outcome = observer
            .await_decision(&RequestId::new(), started + TIMEOUT)
            .await
            .expect("observer");

        assert!(matches!(outcome, DecisionOutcome::Decided(ref d) if d.is_approved()));
        assert_eq!(started.elapsed(), Duration::from_secs(100));
    }

    #[tokio::test(start_paused = true)]
    async fn decision_exactly_at_ceiling_is_accepted() {
        let source = DelayedDecision::new(TIMEOUT, Decision::Rejected);
        let observer = PollingObserver::new(source, INTERVAL, 3);
        let started = Instant::now();

        let outcome = observer
            .await_decision(&RequestId::new(), started + TIMEOUT)
            .await
            .expect("observer");

        assert!(matches!(outcome, DecisionOutcome::Decided(ref d) if !d.is_approved()));
        assert_eq!(started.elapsed(), TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn decision_one_interval_past_ceiling_times_out() {
        let source = DelayedDecision::new(TIMEOUT + INTERVAL, Decision::Approved);
        let observer = PollingObserver::new(source, INTERVAL, 3);
        let started = Instant::now();

        let outcome = observer
            .await_decision(&RequestId::new(), started + TIMEOUT)
            .await
            .expect("observer");

        assert_eq!(outcome, DecisionOutcome::TimedOut);
        assert_eq!(observer.source.polls(), 61);
        assert!(started.elapsed() <= TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_transport_failure_is_reported() {
        let observer = PollingObserver::new(AlwaysFailing, INTERVAL, 3);
        let started = Instant::now();

        let error = observer
            .await_decision(&RequestId::new(), started + TIMEOUT)
            .await
            .expect_err("three consecutive failures");

        assert!(matches!(error, ObserverError::Transport(_)));
        assert_eq!(started.elapsed(), INTERVAL * 2);
    }
}
