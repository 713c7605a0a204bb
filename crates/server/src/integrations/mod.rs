//! HTTP adapters for the external collaborators: the workflow engine
//! (submission, run history, decision queue), the remote execution function
//! and the notification webhook.

pub mod approval_channel;
pub mod queue;
pub mod remote;
pub mod run_history;
pub mod webhook;

use std::time::Duration;

use azops_core::approval::ObserverError;
use azops_core::domain::approval::{ApprovalDecision, DecisionRecord};
use azops_core::domain::request::RequestId;
use reqwest::Client;
use serde_json::Value;

pub use approval_channel::{DisabledChannel, HttpApprovalChannel};
pub use queue::HttpDecisionQueue;
pub use remote::RemoteFunctionBackend;
pub use run_history::RunHistorySource;
pub use webhook::WebhookNotifier;

const REQUEST_ID_PLACEHOLDER: &str = "{request_id}";

pub fn http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder().timeout(timeout).build()
}

pub(crate) fn request_url(template: &str, request_id: &RequestId) -> String {
    template.replace(REQUEST_ID_PLACEHOLDER, &request_id.to_string())
}

/// Extracts a decision from a workflow response body. The record may be the
/// body itself or sit under `outputs` / `properties.outputs` of a run. A body
/// without a record means the run has not finished yet.
pub(crate) fn parse_decision_body(
    body: &str,
    expected: &RequestId,
) -> Result<Option<ApprovalDecision>, ObserverError> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    let value: Value =
        serde_json::from_str(body).map_err(|error| ObserverError::Malformed(error.to_string()))?;

    let candidates = [
        Some(&value),
        value.get("outputs"),
        value.get("properties").and_then(|properties| properties.get("outputs")),
    ];
    let Some(record) =
        candidates.into_iter().flatten().find(|candidate| candidate.get("selectedOption").is_some())
    else {
        return Ok(None);
    };

    let record: DecisionRecord = serde_json::from_value(record.clone())
        .map_err(|error| ObserverError::Malformed(error.to_string()))?;
    let decision =
        record.into_decision().map_err(|error| ObserverError::Malformed(error.to_string()))?;
    if decision.request_id != *expected {
        return Err(ObserverError::Malformed(format!(
            "decision is for request {} but {expected} was expected",
            decision.request_id
        )));
    }
    Ok(Some(decision))
}

#[cfg(test)]
pub(crate) async fn serve_fixture(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind fixture");
    let address = listener.local_addr().expect("fixture address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{address}")
}

#[cfg(test)]
mod tests {
    use azops_core::approval::ObserverError;
    use azops_core::domain::approval::Decision;
    use azops_core::domain::request::RequestId;

    use super::{parse_decision_body, request_url};

    #[test]
    fn placeholder_is_replaced_with_request_id() {
        let id = RequestId::new();
        assert_eq!(
            request_url("https://flow.example.com/runs/{request_id}?api=1", &id),
            format!("https://flow.example.com/runs/{id}?api=1")
        );
    }

    #[test]
    fn decision_is_found_at_top_level_or_in_run_outputs() {
        let id = RequestId::new();

        let flat = format!(r#"{{"requestId":"{id}","selectedOption":"Approve"}}"#);
        let decision = parse_decision_body(&flat, &id).expect("parse").expect("decided");
        assert_eq!(decision.decision, Decision::Approved);

        let nested = format!(
            r#"{{"properties":{{"status":"Succeeded","outputs":{{"requestId":"{id}","selectedOption":"Reject","approver":"ops@example.com"}}}}}}"#
        );
        let decision = parse_decision_body(&nested, &id).expect("parse").expect("decided");
        assert_eq!(decision.decision, Decision::Rejected);
        assert_eq!(decision.decided_by.as_deref(), Some("ops@example.com"));
    }

    #[test]
    fn running_workflow_has_no_decision_yet() {
        let id = RequestId::new();
        assert_eq!(parse_decision_body(r#"{"properties":{"status":"Running"}}"#, &id), Ok(None));
        assert_eq!(parse_decision_body("  ", &id), Ok(None));
    }

    #[test]
    fn foreign_or_unknown_records_are_malformed() {
        let id = RequestId::new();
        let other = RequestId::new();

        let foreign = format!(r#"{{"requestId":"{other}","selectedOption":"Approve"}}"#);
        assert!(matches!(parse_decision_body(&foreign, &id), Err(ObserverError::Malformed(_))));

        let unknown = format!(r#"{{"requestId":"{id}","selectedOption":"Maybe"}}"#);
        assert!(matches!(parse_decision_body(&unknown, &id), Err(ObserverError::Malformed(_))));
    }
}
