use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};
use tracing::debug;

use azops_core::domain::approval::{ApprovalDecision, Decision};
use azops_core::domain::execution::{ExecutionClaim, ExecutionResult, ExecutionStatus};
use azops_core::domain::request::{DeploymentRequest, RequestId};
use azops_core::domain::resource::ResourceKind;
use azops_core::ledger::{DeploymentLedger, LedgerError, Recorded};
use azops_core::lifecycle::{DeploymentState, DeploymentTransition, LifecycleEvent};
use azops_core::notify::NotificationKind;

use super::RepositoryError;
use crate::DbPool;

/// SQLite-backed deployment ledger. Insert-once writes rely on the primary
/// key of each table; transitions are appended only when the latest row's
/// `to_state` matches the expected `from`.
pub struct SqlDeploymentLedger {
    pool: DbPool,
}

impl SqlDeploymentLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert_request(&self, request: &DeploymentRequest) -> Result<bool, RepositoryError> {
        let request_id = request.request_id.to_string();
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO deployment_request (
                request_id, resource_type, resource_name, resource_group, location, command,
                requester_email, requester_name, estimated_cost, justification, session_id,
                created_at
             )
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(request_id) DO NOTHING",
        )
        .bind(&request_id)
        .bind(request.resource_type.as_str())
        .bind(&request.resource_name)
        .bind(&request.resource_group)
        .bind(&request.location)
        .bind(&request.command)
        .bind(&request.requester_email)
        .bind(&request.requester_name)
        .bind(request.estimated_cost.to_string())
        .bind(&request.justification)
        .bind(&request.session_id)
        .bind(request.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            return Ok(false);
        }

        let initial = DeploymentTransition::initial(request.request_id);
        sqlx::query(
            "INSERT INTO deployment_transition
                (request_id, sequence, from_state, to_state, event, occurred_at)
             VALUES (?, 1, NULL, ?, ?, ?)",
        )
        .bind(&request_id)
        .bind(initial.to.as_str())
        .bind(initial.event.as_str())
        .bind(initial.occurred_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn select_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<DeploymentRequest>, RepositoryError> {
        let row = sqlx::query(
            "SELECT request_id, resource_type, resource_name, resource_group, location, command,
                    requester_email, requester_name, estimated_cost, justification, session_id,
                    created_at
             FROM deployment_request WHERE request_id = ?",
        )
        .bind(request_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(request_from_row).transpose()
    }

    async fn request_exists(&self, request_id: &RequestId) -> Result<bool, RepositoryError> {
        let count: i64 =
            sqlx::query("SELECT COUNT(*) AS count FROM deployment_request WHERE request_id = ?")
                .bind(request_id.to_string())
                .fetch_one(&self.pool)
                .await?
                .try_get("count")?;
        Ok(count > 0)
    }

    async fn insert_decision(
        &self,
        decision: &ApprovalDecision,
    ) -> Result<Option<Recorded<ApprovalDecision>>, RepositoryError> {
        if !self.request_exists(&decision.request_id).await? {
            return Ok(None);
        }

        let inserted = sqlx::query(
            "INSERT INTO approval_decision (request_id, decision, decided_by, decided_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(request_id) DO NOTHING",
        )
        .bind(decision.request_id.to_string())
        .bind(decision.decision.as_str())
        .bind(&decision.decided_by)
        .bind(decision.decided_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 1 {
            return Ok(Some(Recorded::New(decision.clone())));
        }

        let existing = self.select_decision(&decision.request_id).await?.ok_or_else(|| {
            RepositoryError::Decode(format!(
                "decision for {} conflicted but could not be read back",
                decision.request_id
            ))
        })?;
        Ok(Some(Recorded::Existing(existing)))
    }

    async fn select_decision(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<ApprovalDecision>, RepositoryError> {
        let row = sqlx::query(
            "SELECT request_id, decision, decided_by, decided_at
             FROM approval_decision WHERE request_id = ?",
        )
        .bind(request_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(decision_from_row).transpose()
    }

    async fn insert_claim(&self, claim: &ExecutionClaim) -> Result<bool, RepositoryError> {
        let inserted = sqlx::query(
            "INSERT INTO execution_claim (request_id, claimed_by, claimed_at)
             VALUES (?, ?, ?)
             ON CONFLICT(request_id) DO NOTHING",
        )
        .bind(claim.request_id.to_string())
        .bind(&claim.claimed_by)
        .bind(claim.claimed_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(inserted.rows_affected() == 1)
    }

    async fn insert_result(&self, result: &ExecutionResult) -> Result<bool, RepositoryError> {
        let inserted = sqlx::query(
            "INSERT INTO execution_result (
                request_id, status, exit_code, output, verified_exists, command_fingerprint,
                completed_at
             )
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(request_id) DO NOTHING",
        )
        .bind(result.request_id.to_string())
        .bind(result.status.as_str())
        .bind(result.exit_code)
        .bind(&result.output)
        .bind(result.verified_exists)
        .bind(&result.command_fingerprint)
        .bind(result.completed_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(inserted.rows_affected() == 1)
    }

    async fn select_result(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<ExecutionResult>, RepositoryError> {
        let row = sqlx::query(
            "SELECT request_id, status, exit_code, output, verified_exists, command_fingerprint,
                    completed_at
             FROM execution_result WHERE request_id = ?",
        )
        .bind(request_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(result_from_row).transpose()
    }

    async fn insert_notification(
        &self,
        request_id: &RequestId,
        kind: NotificationKind,
    ) -> Result<bool, RepositoryError> {
        let inserted = sqlx::query(
            "INSERT INTO deployment_notification (request_id, kind, recorded_at)
             VALUES (?, ?, ?)
             ON CONFLICT(request_id) DO NOTHING",
        )
        .bind(request_id.to_string())
        .bind(kind.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(inserted.rows_affected() == 1)
    }

    async fn append_transition(
        &self,
        transition: &DeploymentTransition,
    ) -> Result<bool, RepositoryError> {
        let Some(from) = transition.from else {
            return Err(RepositoryError::Decode(format!(
                "transition for {} has no source state; only the initial row may omit it",
                transition.request_id
            )));
        };
        let request_id = transition.request_id.to_string();

        // The WHERE clause keeps SQLite from reading ON CONFLICT as a join.
        let inserted = sqlx::query(
            "INSERT INTO deployment_transition
                (request_id, sequence, from_state, to_state, event, occurred_at)
             SELECT latest.request_id, latest.sequence + 1, ?, ?, ?, ?
             FROM deployment_transition AS latest
             WHERE latest.request_id = ?
               AND latest.to_state = ?
               AND latest.sequence = (
                   SELECT MAX(sequence) FROM deployment_transition WHERE request_id = ?
               )
             ON CONFLICT(request_id, sequence) DO NOTHING",
        )
        .bind(from.as_str())
        .bind(transition.to.as_str())
        .bind(transition.event.as_str())
        .bind(transition.occurred_at.to_rfc3339())
        .bind(&request_id)
        .bind(from.as_str())
        .bind(&request_id)
        .execute(&self.pool)
        .await?;

        let advanced = inserted.rows_affected() == 1;
        if !advanced {
            debug!(
                event_name = "db.transition_conflict",
                request_id = %transition.request_id,
                from = from.as_str(),
                to = transition.to.as_str(),
                "transition skipped; request is no longer in the expected state"
            );
        }
        Ok(advanced)
    }

    async fn select_transitions(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<DeploymentTransition>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT request_id, from_state, to_state, event, occurred_at
             FROM deployment_transition
             WHERE request_id = ?
             ORDER BY sequence ASC",
        )
        .bind(request_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(transition_from_row).collect()
    }
}

#[async_trait]
impl DeploymentLedger for SqlDeploymentLedger {
    async fn record_request(&self, request: &DeploymentRequest) -> Result<bool, LedgerError> {
        Ok(self.insert_request(request).await?)
    }

    async fn find_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<DeploymentRequest>, LedgerError> {
        Ok(self.select_request(request_id).await?)
    }

    async fn record_decision(
        &self,
        decision: &ApprovalDecision,
    ) -> Result<Recorded<ApprovalDecision>, LedgerError> {
        self.insert_decision(decision)
            .await?
            .ok_or(LedgerError::UnknownRequest(decision.request_id))
    }

    async fn find_decision(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<ApprovalDecision>, LedgerError> {
        Ok(self.select_decision(request_id).await?)
    }

    async fn claim_execution(&self, claim: &ExecutionClaim) -> Result<bool, LedgerError> {
        Ok(self.insert_claim(claim).await?)
    }

    async fn record_result(&self, result: &ExecutionResult) -> Result<bool, LedgerError> {
        Ok(self.insert_result(result).await?)
    }

    async fn find_result(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<ExecutionResult>, LedgerError> {
        Ok(self.select_result(request_id).await?)
    }

    async fn record_notification(
        &self,
        request_id: &RequestId,
        kind: NotificationKind,
    ) -> Result<bool, LedgerError> {
        Ok(self.insert_notification(request_id, kind).await?)
    }

    async fn advance(&self, transition: &DeploymentTransition) -> Result<bool, LedgerError> {
        Ok(self.append_transition(transition).await?)
    }

    async fn list_transitions(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<DeploymentTransition>, LedgerError> {
        Ok(self.select_transitions(request_id).await?)
    }
}

fn decode_error(column: &str, value: &str) -> RepositoryError {
    RepositoryError::Decode(format!("unexpected {column} value `{value}`"))
}

fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|_| decode_error(column, value))
}

fn parse_request_id(value: &str) -> Result<RequestId, RepositoryError> {
    RequestId::parse(value).ok_or_else(|| decode_error("request_id", value))
}

fn request_from_row(row: &SqliteRow) -> Result<DeploymentRequest, RepositoryError> {
    let request_id: String = row.try_get("request_id")?;
    let resource_type: String = row.try_get("resource_type")?;
    let estimated_cost: String = row.try_get("estimated_cost")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(DeploymentRequest {
        request_id: parse_request_id(&request_id)?,
        resource_type: ResourceKind::parse(&resource_type)
            .ok_or_else(|| decode_error("resource_type", &resource_type))?,
        resource_name: row.try_get("resource_name")?,
        resource_group: row.try_get("resource_group")?,
        location: row.try_get("location")?,
        command: row.try_get("command")?,
        requester_email: row.try_get("requester_email")?,
        requester_name: row.try_get("requester_name")?,
        estimated_cost: Decimal::from_str(&estimated_cost)
            .map_err(|_| decode_error("estimated_cost", &estimated_cost))?,
        justification: row.try_get("justification")?,
        session_id: row.try_get("session_id")?,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

fn decision_from_row(row: &SqliteRow) -> Result<ApprovalDecision, RepositoryError> {
    let request_id: String = row.try_get("request_id")?;
    let decision: String = row.try_get("decision")?;
    let decided_at: String = row.try_get("decided_at")?;

    Ok(ApprovalDecision {
        request_id: parse_request_id(&request_id)?,
        decision: Decision::parse(&decision).ok_or_else(|| decode_error("decision", &decision))?,
        decided_by: row.try_get("decided_by")?,
        decided_at: parse_timestamp("decided_at", &decided_at)?,
    })
}

fn result_from_row(row: &SqliteRow) -> Result<ExecutionResult, RepositoryError> {
    let request_id: String = row.try_get("request_id")?;
    let status: String = row.try_get("status")?;
    let completed_at: String = row.try_get("completed_at")?;

    Ok(ExecutionResult {
        request_id: parse_request_id(&request_id)?,
        status: ExecutionStatus::parse(&status).ok_or_else(|| decode_error("status", &status))?,
        exit_code: row.try_get("exit_code")?,
        output: row.try_get("output")?,
        verified_exists: row.try_get("verified_exists")?,
        command_fingerprint: row.try_get("command_fingerprint")?,
        completed_at: parse_timestamp("completed_at", &completed_at)?,
    })
}

fn transition_from_row(row: &SqliteRow) -> Result<DeploymentTransition, RepositoryError> {
    let request_id: String = row.try_get("request_id")?;
    let from_state: Option<String> = row.try_get("from_state")?;
    let to_state: String = row.try_get("to_state")?;
    let event: String = row.try_get("event")?;
    let occurred_at: String = row.try_get("occurred_at")?;

    let from = match from_state {
        Some(value) => {
            Some(DeploymentState::parse(&value).ok_or_else(|| decode_error("from_state", &value))?)
        }
        None => None,
    };

    Ok(DeploymentTransition {
        request_id: parse_request_id(&request_id)?,
        from,
        to: DeploymentState::parse(&to_state).ok_or_else(|| decode_error("to_state", &to_state))?,
        event: LifecycleEvent::parse(&event).ok_or_else(|| decode_error("event", &event))?,
        occurred_at: parse_timestamp("occurred_at", &occurred_at)?,
    })
}
