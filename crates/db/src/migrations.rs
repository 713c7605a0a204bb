use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// What a migration pass did and which ledger tables exist afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaReport {
    /// Migrations applied by this pass.
    pub applied: usize,
    pub known: usize,
    pub tables: Vec<String>,
}

pub async fn migrate_ledger(pool: &DbPool) -> Result<SchemaReport, MigrateError> {
    let before = applied_count(pool).await?;
    run_pending(pool).await?;
    let after = applied_count(pool).await?;

    Ok(SchemaReport {
        applied: after.saturating_sub(before),
        known: MIGRATOR.iter().filter(|migration| migration.migration_type.is_up_migration()).count(),
        tables: ledger_tables(pool).await?,
    })
}

/// Application tables in name order, without sqlx and sqlite bookkeeping.
pub async fn ledger_tables(pool: &DbPool) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name <> '_sqlx_migrations' AND substr(name, 1, 7) <> 'sqlite_'
         ORDER BY name",
    )
    .fetch_all(pool)
    .await
}

async fn applied_count(pool: &DbPool) -> Result<usize, sqlx::Error> {
    let tracked: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;
    if tracked == 0 {
        return Ok(0);
    }
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await?;
    Ok(usize::try_from(applied).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::{migrate_ledger, run_pending};
    use crate::{connect_with_settings, migrations::MIGRATOR};

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "deployment_request",
        "approval_decision",
        "execution_claim",
        "execution_result",
        "deployment_notification",
        "deployment_transition",
        "idx_deployment_request_session_id",
        "idx_deployment_transition_request_id",
    ];

    async fn table_count(pool: &sqlx::SqlitePool, name: &str) -> i64 {
        sqlx::query(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(name)
        .fetch_one(pool)
        .await
        .expect("check table")
        .get::<i64, _>("count")
    }

    #[tokio::test]
    async fn migrations_create_ledger_tables() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for table in MANAGED_SCHEMA_OBJECTS.iter().filter(|name| !name.starts_with("idx_")) {
            assert_eq!(table_count(&pool, table).await, 1, "missing table {table}");
        }
    }

    #[tokio::test]
    async fn schema_report_lists_ledger_tables_and_counts_new_work_once() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");

        let first = migrate_ledger(&pool).await.expect("first pass");
        assert_eq!(first.applied, first.known);
        assert_eq!(
            first.tables,
            vec![
                "approval_decision",
                "deployment_notification",
                "deployment_request",
                "deployment_transition",
                "execution_claim",
                "execution_result",
            ]
        );

        let second = migrate_ledger(&pool).await.expect("second pass");
        assert_eq!(second.applied, 0);
        assert_eq!(second.tables, first.tables);
    }

    #[tokio::test]
    async fn migrations_are_reversible() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        assert_eq!(table_count(&pool, "deployment_request").await, 0);
        assert_eq!(table_count(&pool, "deployment_transition").await, 0);
    }

    #[tokio::test]
    async fn migrations_up_down_up_preserves_schema_signature() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let initial_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            initial_signature.len(),
            MANAGED_SCHEMA_OBJECTS.len(),
            "initial migration pass should create all managed schema objects",
        );

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");
        assert!(
            managed_schema_signature(&pool).await.is_empty(),
            "managed schema objects should be removed after full undo",
        );

        run_pending(&pool).await.expect("re-run migrations");
        assert_eq!(
            managed_schema_signature(&pool).await,
            initial_signature,
            "up/down/up should preserve migration-managed schema signature",
        );
    }

    async fn managed_schema_signature(pool: &sqlx::SqlitePool) -> Vec<(String, String, String)> {
        let mut signature: Vec<(String, String, String)> = sqlx::query(
            "SELECT type, name, IFNULL(sql, '') AS sql
             FROM sqlite_master
             WHERE type IN ('table', 'index')",
        )
        .fetch_all(pool)
        .await
        .expect("load schema objects")
        .into_iter()
        .filter_map(|row| {
            let name = row.get::<String, _>("name");
            if MANAGED_SCHEMA_OBJECTS.contains(&name.as_str()) {
                Some((row.get::<String, _>("type"), name, row.get::<String, _>("sql")))
            } else {
                None
            }
        })
        .collect();
        signature.sort();
        signature
    }
}
