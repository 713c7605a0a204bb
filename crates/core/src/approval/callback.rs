use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::approval::observer::{DecisionObserver, DecisionOutcome, ObserverError};
use crate::config::DecisionTransport;
use crate::domain::approval::ApprovalDecision;
use crate::domain::request::RequestId;

/// How long delivery markers and unclaimed decisions are kept by default.
pub const CALLBACK_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

enum Slot {
    Waiting(oneshot::Sender<ApprovalDecision>),
    Buffered { decision: ApprovalDecision, at: Instant },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// A waiting observer received the decision.
    Handed,
    /// No observer is waiting yet; the decision is held until one registers.
    Buffered,
    /// A decision for this request was already delivered.
    Duplicate,
}

#[derive(Default)]
struct RegistryState {
    slots: HashMap<RequestId, Slot>,
    delivered: HashMap<RequestId, Instant>,
}

impl RegistryState {
    fn prune(&mut self, now: Instant, retention: Duration) {
        self.delivered.retain(|_, at| now.duration_since(*at) < retention);
        self.slots.retain(|_, slot| match slot {
            Slot::Waiting(sender) => !sender.is_closed(),
            Slot::Buffered { at, .. } => now.duration_since(*at) < retention,
        });
    }
}

/// Rendezvous between the HTTP callback route and the observer task waiting
/// on a request.
///
/// Entries are dropped when the observer gives up on a request, when
/// [`CallbackRegistry::forget`] is called, or once they are older than the
/// retention window. Observers whose task went away are dropped on the next
/// delivery.
pub struct CallbackRegistry {
    state: Mutex<RegistryState>,
    retention: Duration,
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::with_retention(CALLBACK_RETENTION)
    }
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self { state: Mutex::new(RegistryState::default()), retention }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut RegistryState) -> T) -> T {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut state)
    }

    pub fn deliver(&self, decision: ApprovalDecision) -> Delivery {
        let request_id = decision.request_id;
        let now = Instant::now();
        let retention = self.retention;
        self.with_state(|state| {
            state.prune(now, retention);
            if state.delivered.contains_key(&request_id) {
                return Delivery::Duplicate;
            }
            state.delivered.insert(request_id, now);
            match state.slots.remove(&request_id) {
                Some(Slot::Waiting(sender)) => match sender.send(decision) {
                    Ok(()) => Delivery::Handed,
                    // Observer gave up between registering and now.
                    Err(decision) => {
                        state.slots.insert(request_id, Slot::Buffered { decision, at: now });
                        Delivery::Buffered
                    }
                },
                Some(buffered @ Slot::Buffered { .. }) => {
                    state.slots.insert(request_id, buffered);
                    Delivery::Duplicate
                }
                None => {
                    state.slots.insert(request_id, Slot::Buffered { decision, at: now });
                    Delivery::Buffered
                }
            }
        })
    }

    fn register(
        &self,
        request_id: RequestId,
    ) -> Result<ApprovalDecision, oneshot::Receiver<ApprovalDecision>> {
        self.with_state(|state| match state.slots.remove(&request_id) {
            Some(Slot::Buffered { decision, .. }) => Ok(decision),
            Some(Slot::Waiting(_)) | None => {
                let (sender, receiver) = oneshot::channel();
                state.slots.insert(request_id, Slot::Waiting(sender));
                Err(receiver)
            }
        })
    }

    /// Drops everything held for `request_id`.
    pub fn forget(&self, request_id: &RequestId) {
        self.with_state(|state| {
            state.slots.remove(request_id);
            state.delivered.remove(request_id);
        });
    }

    /// Drops expired entries and observers that are no longer listening.
    pub fn prune(&self) {
        let now = Instant::now();
        let retention = self.retention;
        self.with_state(|state| state.prune(now, retention));
    }

    pub fn waiting(&self) -> usize {
        self.with_state(|state| {
            state.slots.values().filter(|slot| matches!(slot, Slot::Waiting(_))).count()
        })
    }

    /// Requests with any slot or delivery marker.
    pub fn tracked(&self) -> usize {
        self.with_state(|state| {
            state.slots.keys().chain(state.delivered.keys()).collect::<HashSet<_>>().len()
        })
    }
}

pub struct CallbackObserver {
    registry: Arc<CallbackRegistry>,
}

impl CallbackObserver {
    pub fn new(registry: Arc<CallbackRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl DecisionObserver for CallbackObserver {
    fn transport(&self) -> DecisionTransport {
        DecisionTransport::Callback
    }

    async fn await_decision(
        &self,
        request_id: &RequestId,
        deadline: Instant,
    ) -> Result<DecisionOutcome, ObserverError> {
        let receiver = match self.registry.register(*request_id) {
            Ok(decision) => return Ok(DecisionOutcome::Decided(decision)),
            Err(receiver) => receiver,
        };

        match tokio::time::timeout_at(deadline, receiver).await {
            Ok(Ok(decision)) => Ok(DecisionOutcome::Decided(decision)),
            Ok(Err(_)) => Err(ObserverError::Closed),
            Err(_) => {
                self.registry.forget(request_id);
                debug!(
                    event_name = "approval.callback_deadline_reached",
                    request_id = %request_id,
                    "no callback arrived before the decision deadline"
                );
                Ok(DecisionOutcome::TimedOut)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::Instant;

    use super::{CallbackObserver, CallbackRegistry, Delivery};
    use crate::approval::observer::{DecisionObserver, DecisionOutcome};
    use crate::domain::approval::{ApprovalDecision, Decision};
    use crate::domain::request::RequestId;

    #[tokio::test(start_paused = true)]
    async fn waiting_observer_receives_delivered_decision() {
        let registry = Arc::new(CallbackRegistry::new());
        let observer = CallbackObserver::new(registry.clone());
        let request_id = RequestId::new();
        let deadline = Instant::now() + Duration::from_secs(600);

        let waiter =
            tokio::spawn(async move { observer.await_decision(&request_id, deadline).await });
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(registry.waiting(), 1);

        let delivery =
            registry.deliver(ApprovalDecision::new(request_id, Decision::Approved, None));
        assert_eq!(delivery, Delivery::Handed);

        let outcome = waiter.await.expect("join").expect("observer");
        assert!(matches!(outcome, DecisionOutcome::Decided(d) if d.is_approved()));
    }

    #[tokio::test(start_paused = true)]
    async fn early_callback_is_buffered_until_observer_registers() {
        let registry = Arc::new(CallbackRegistry::new());
        let request_id = RequestId::new();

        let delivery =
            registry.deliver(ApprovalDecision::new(request_id, Decision::Rejected, None));
        assert_eq!(delivery, Delivery::Buffered);

        let outcome = CallbackObserver::new(registry)
            .await_decision(&request_id, Instant::now() + Duration::from_secs(1))
            .await
            .expect("observer");
        assert!(matches!(outcome, DecisionOutcome::Decided(d) if !d.is_approved()));
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_callbacks_are_flagged() {
        let registry = CallbackRegistry::new();
        let request_id = RequestId::new();

        registry.deliver(ApprovalDecision::new(request_id, Decision::Approved, None));
        assert_eq!(
            registry.deliver(ApprovalDecision::new(request_id, Decision::Approved, None)),
            Delivery::Duplicate
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_callback_times_out_at_deadline() {
        let registry = Arc::new(CallbackRegistry::new());
        let request_id = RequestId::new();
        let started = Instant::now();

        let outcome = CallbackObserver::new(registry.clone())
            .await_decision(&request_id, started + Duration::from_secs(600))
            .await
            .expect("observer");

        assert_eq!(outcome, DecisionOutcome::TimedOut);
        assert_eq!(started.elapsed(), Duration::from_secs(600));
        assert_eq!(registry.waiting(), 0);
        assert_eq!(registry.tracked(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_markers_and_unclaimed_decisions_are_pruned() {
        let registry = CallbackRegistry::with_retention(Duration::from_secs(3600));
        let stale = RequestId::new();
        let unclaimed = RequestId::new();

        registry.deliver(ApprovalDecision::new(stale, Decision::Approved, None));
        registry.deliver(ApprovalDecision::new(unclaimed, Decision::Rejected, None));
        assert_eq!(registry.tracked(), 2);

        tokio::time::advance(Duration::from_secs(3601)).await;
        let fresh = RequestId::new();
        registry.deliver(ApprovalDecision::new(fresh, Decision::Approved, None));
        assert_eq!(registry.tracked(), 1);

        // The marker is gone, so the old request is no longer a duplicate.
        assert_eq!(
            registry.deliver(ApprovalDecision::new(stale, Decision::Approved, None)),
            Delivery::Buffered
        );
    }

    #[tokio::test(start_paused = true)]
    async fn forget_and_dropped_observers_release_entries() {
        let registry = Arc::new(CallbackRegistry::new());
        let decided = RequestId::new();
        registry.deliver(ApprovalDecision::new(decided, Decision::Approved, None));
        registry.forget(&decided);
        assert_eq!(registry.tracked(), 0);

        let orphaned = RequestId::new();
        let observer = CallbackObserver::new(registry.clone());
        let waiter = tokio::spawn(async move {
            observer.await_decision(&orphaned, Instant::now() + Duration::from_secs(600)).await
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(registry.waiting(), 1);

        waiter.abort();
        let _ = waiter.await;
        registry.prune();
        assert_eq!(registry.waiting(), 0);
        assert_eq!(registry.tracked(), 0);
    }
}
