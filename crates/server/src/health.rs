use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use azops_core::config::AppConfig;
use azops_db::DbPool;
use chrono::Utc;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    approval: HealthCheck,
    execution: HealthCheck,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub approval: HealthCheck,
    pub execution: HealthCheck,
    pub checked_at: String,
}

impl HealthState {
    pub fn new(db_pool: DbPool, config: &AppConfig) -> Self {
        let approval = if config.approval.enabled {
            HealthCheck {
                status: "ready",
                detail: format!("decisions arrive by {}", config.approval.transport.as_str()),
            }
        } else {
            HealthCheck {
                status: "disabled",
                detail: "requests are auto-approved".to_string(),
            }
        };
        let execution = HealthCheck {
            status: "ready",
            detail: format!("{} backend", config.execution.backend.as_str()),
        };
        Self { db_pool, approval, execution }
    }
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "azops-server runtime initialized".to_string(),
        },
        database,
        approval: state.approval,
        execution: state.execution,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}
