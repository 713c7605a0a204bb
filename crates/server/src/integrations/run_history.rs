use async_trait::async_trait;
use azops_core::approval::{DecisionSource, ObserverError};
use azops_core::domain::approval::ApprovalDecision;
use azops_core::domain::request::RequestId;
use reqwest::{Client, StatusCode};
use tracing::debug;

use super::{parse_decision_body, request_url};

/// Reads a request's workflow run from the engine's run-history endpoint.
/// `url_template` carries a `{request_id}` placeholder.
#[derive(Clone)]
pub struct RunHistorySource {
    client: Client,
    url_template: String,
}

impl RunHistorySource {
    pub fn new(client: Client, url_template: impl Into<String>) -> Self {
        Self { client, url_template: url_template.into() }
    }
}

#[async_trait]
impl DecisionSource for RunHistorySource {
    async fn fetch_decision(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<ApprovalDecision>, ObserverError> {
        let url = request_url(&self.url_template, request_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|error| ObserverError::Transport(error.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::NO_CONTENT {
            debug!(event_name = "approval.run_pending", request_id = %request_id, "no run recorded yet");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ObserverError::Transport(format!("run history answered {status}")));
        }

        let body =
            response.text().await.map_err(|error| ObserverError::Transport(error.to_string()))?;
        parse_decision_body(&body, request_id)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{extract::Path, http::StatusCode, routing::get, Router};
    use azops_core::approval::{DecisionSource, ObserverError};
    use azops_core::domain::approval::Decision;
    use azops_core::domain::request::RequestId;

    use super::RunHistorySource;
    use crate::integrations::{http_client, serve_fixture};

    async fn source() -> RunHistorySource {
        let router = Router::new().route(
            "/runs/{id}",
            get(|Path(id): Path<String>| async move {
                match id.as_str() {
                    "00000000-0000-0000-0000-000000000000" => {
                        (StatusCode::INTERNAL_SERVER_ERROR, String::new())
                    }
                    _ if id.ends_with('1') => (
                        StatusCode::OK,
                        format!(r#"{{"properties":{{"status":"Succeeded","outputs":{{"requestId":"{id}","selectedOption":"Approve"}}}}}}"#),
                    ),
                    _ if id.ends_with('2') => {
                        (StatusCode::OK, r#"{"properties":{"status":"Running"}}"#.to_string())
                    }
                    _ => (StatusCode::NOT_FOUND, String::new()),
                }
            }),
        );
        let base = serve_fixture(router).await;
        let client = http_client(Duration::from_secs(5)).expect("client");
        RunHistorySource::new(client, format!("{base}/runs/{{request_id}}"))
    }

    fn id(suffix: char) -> RequestId {
        RequestId::parse(&format!("7f1c2e1a-54a4-4c39-9d0e-0b7b7a1d2f1{suffix}")).expect("uuid")
    }

    #[tokio::test]
    async fn finished_run_yields_decision() {
        let source = source().await;
        let decision = source.fetch_decision(&id('1')).await.expect("fetch").expect("decided");
        assert_eq!(decision.decision, Decision::Approved);
        assert_eq!(decision.request_id, id('1'));
    }

    #[tokio::test]
    async fn running_or_missing_run_has_no_decision() {
        let source = source().await;
        assert_eq!(source.fetch_decision(&id('2')).await, Ok(None));
        assert_eq!(source.fetch_decision(&id('3')).await, Ok(None));
    }

    #[tokio::test]
    async fn server_error_is_a_transport_error() {
        let source = source().await;
        let nil = RequestId::parse("00000000-0000-0000-0000-000000000000").expect("uuid");
        assert!(matches!(source.fetch_decision(&nil).await, Err(ObserverError::Transport(_))));
    }
}
