use std::time::Duration;

use async_trait::async_trait;
use azops_core::approval::{DecisionQueue, ObserverError};
use azops_core::domain::approval::ApprovalDecision;
use azops_core::domain::request::RequestId;
use reqwest::{Client, StatusCode};

use super::{parse_decision_body, request_url};

/// Slack on top of the long-poll wait before the HTTP request itself gives up.
const RECEIVE_GRACE: Duration = Duration::from_secs(5);

/// Long-polls an HTTP-fronted queue for the decision on one request. The
/// server holds the request for up to `waitSeconds` and answers 204 when no
/// message arrived.
#[derive(Clone)]
pub struct HttpDecisionQueue {
    client: Client,
    url_template: String,
}

impl HttpDecisionQueue {
    pub fn new(client: Client, url_template: impl Into<String>) -> Self {
        Self { client, url_template: url_template.into() }
    }
}

#[async_trait]
impl DecisionQueue for HttpDecisionQueue {
    async fn receive(
        &self,
        request_id: &RequestId,
        wait: Duration,
    ) -> Result<Option<ApprovalDecision>, ObserverError> {
        let url = request_url(&self.url_template, request_id);
        let wait_seconds = wait.as_secs().max(1);
        let response = self
            .client
            .get(&url)
            .query(&[("requestId", request_id.to_string()), ("waitSeconds", wait_seconds.to_string())])
            .timeout(wait + RECEIVE_GRACE)
            .send()
            .await
            .map_err(|error| ObserverError::Transport(error.to_string()))?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body = response
                    .text()
                    .await
                    .map_err(|error| ObserverError::Transport(error.to_string()))?;
                parse_decision_body(&body, request_id)
            }
            status => Err(ObserverError::Transport(format!("decision queue answered {status}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use axum::{extract::Query, http::StatusCode, routing::get, Router};
    use azops_core::approval::DecisionQueue;
    use azops_core::domain::approval::Decision;
    use azops_core::domain::request::RequestId;

    use super::HttpDecisionQueue;
    use crate::integrations::{http_client, serve_fixture};

    #[tokio::test]
    async fn empty_receive_then_message() {
        let approved = RequestId::new();
        let approved_text = approved.to_string();
        let router = Router::new().route(
            "/decisions",
            get(move |Query(query): Query<HashMap<String, String>>| {
                let approved_text = approved_text.clone();
                async move {
                    assert_eq!(query.get("waitSeconds").map(String::as_str), Some("2"));
                    match query.get("requestId") {
                        Some(id) if *id == approved_text => (
                            StatusCode::OK,
                            format!(r#"{{"requestId":"{id}","selectedOption":"Reject"}}"#),
                        ),
                        _ => (StatusCode::NO_CONTENT, String::new()),
                    }
                }
            }),
        );
        let base = serve_fixture(router).await;
        let client = http_client(Duration::from_secs(30)).expect("client");
        let queue = HttpDecisionQueue::new(client, format!("{base}/decisions"));

        assert_eq!(queue.receive(&RequestId::new(), Duration::from_secs(2)).await, Ok(None));

        let decision = queue
            .receive(&approved, Duration::from_secs(2))
            .await
            .expect("receive")
            .expect("message");
        assert_eq!(decision.decision, Decision::Rejected);
    }
}
