use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::warn;

use crate::approval::observer::{DecisionObserver, DecisionOutcome, ObserverError};
use crate::config::DecisionTransport;
use crate::domain::approval::ApprovalDecision;
use crate::domain::request::RequestId;

const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// A message queue the workflow engine posts decisions to. `receive` blocks
/// for at most `wait` and returns `None` when nothing arrived.
#[async_trait]
pub trait DecisionQueue: Send + Sync {
    async fn receive(
        &self,
        request_id: &RequestId,
        wait: Duration,
    ) -> Result<Option<ApprovalDecision>, ObserverError>;
}

pub struct QueueObserver<Q> {
    queue: Q,
    receive_timeout: Duration,
    max_transport_errors: u32,
}

impl<Q> QueueObserver<Q>
where
    Q: DecisionQueue,
{
    pub fn new(queue: Q, receive_timeout: Duration, max_transport_errors: u32) -> Self {
        Self { queue, receive_timeout, max_transport_errors: max_transport_errors.max(1) }
    }
}

#[async_trait]
impl<Q> DecisionObserver for QueueObserver<Q>
where
    Q: DecisionQueue,
{
    fn transport(&self) -> DecisionTransport {
        DecisionTransport::Queue
    }

    async fn await_decision(
        &self,
        request_id: &RequestId,
        deadline: Instant,
    ) -> Result<DecisionOutcome, ObserverError> {
        let mut consecutive_errors = 0u32;

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(DecisionOutcome::TimedOut);
            }
            let wait = self.receive_timeout.min(deadline - now);

            // Outer bound in case the queue overruns `wait`.
            let received =
                tokio::time::timeout_at(deadline, self.queue.receive(request_id, wait)).await;

            match received {
                Err(_) => return Ok(DecisionOutcome::TimedOut),
                Ok(Ok(Some(decision))) if decision.request_id == *request_id => {
                    return Ok(DecisionOutcome::Decided(decision));
                }
                Ok(Ok(_)) => consecutive_errors = 0,
                Ok(Err(error)) => {
                    consecutive_errors += 1;
                    warn!(
                        event_name = "approval.queue_receive_failed",
                        request_id = %request_id,
                        consecutive_errors,
                        error = %error,
                        "decision queue receive failed"
                    );
                    if consecutive_errors >= self.max_transport_errors {
                        return Err(error);
                    }
                    let resume = (Instant::now() + ERROR_BACKOFF).min(deadline);
                    tokio::time::sleep_until(resume).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::{DecisionQueue, QueueObserver};
    use crate::approval::observer::{DecisionObserver, DecisionOutcome, ObserverError};
    use crate::domain::approval::{ApprovalDecision, Decision};
    use crate::domain::request::RequestId;

    /// Empty receives wait the full window; the decision shows up on the
    /// `deliver_on`th receive.
    struct ScriptedQueue {
        deliver_on: u32,
        receives: Mutex<u32>,
    }

    #[async_trait]
    impl DecisionQueue for ScriptedQueue {
        async fn receive(
            &self,
            request_id: &RequestId,
            wait: Duration,
        ) -> Result<Option<ApprovalDecision>, ObserverError> {
            let count = {
                let mut receives = self.receives.lock().expect("receives lock");
                *receives += 1;
                *receives
            };
            if count >= self.deliver_on {
                return Ok(Some(ApprovalDecision::new(*request_id, Decision::Approved, None)));
            }
            tokio::time::sleep(wait).await;
            Ok(None)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn loops_bounded_receives_until_decision() {
        let observer = QueueObserver::new(
            ScriptedQueue { deliver_on: 4, receives: Mutex::new(0) },
            Duration::from_secs(30),
            3,
        );
        let started = Instant::now();

        let outcome = observer
            .await_decision(&RequestId::new(), started + Duration::from_secs(600))
            .await
            .expect("observer");

        assert!(matches!(outcome, DecisionOutcome::Decided(_)));
        assert_eq!(started.elapsed(), Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn last_receive_is_clamped_to_the_deadline() {
        let observer = QueueObserver::new(
            ScriptedQueue { deliver_on: u32::MAX, receives: Mutex::new(0) },
            Duration::from_secs(30),
            3,
        );
        let started = Instant::now();

        let outcome = observer
            .await_decision(&RequestId::new(), started + Duration::from_secs(75))
            .await
            .expect("observer");

        assert_eq!(outcome, DecisionOutcome::TimedOut);
        assert_eq!(started.elapsed(), Duration::from_secs(75));
        assert_eq!(*observer.queue.receives.lock().expect("receives lock"), 3);
    }
}
