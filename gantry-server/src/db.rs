use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create pipelines table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipelines (
            pipeline_id BIGSERIAL PRIMARY KEY,
            status VARCHAR(20) NOT NULL,
            repository TEXT NOT NULL,
            branch TEXT NOT NULL,
            commit TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    // The unique triple backs idempotent submission
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_pipelines_source
         ON pipelines(repository, branch, commit)",
    )
    .execute(pool)
    .await?;

    // Backs the oldest-waiting scheduler scan
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_pipelines_status_created
         ON pipelines(status, created_at)",
    )
    .execute(pool)
    .await?;

    // Create step logs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS step_logs (
            log_id BIGSERIAL PRIMARY KEY,
            pipeline_id BIGINT NOT NULL REFERENCES pipelines(pipeline_id) ON DELETE CASCADE,
            command_number INTEGER NOT NULL,
            command_name TEXT NOT NULL,
            command TEXT NOT NULL,
            output TEXT NOT NULL,
            final_status TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_step_logs_pipeline
         ON step_logs(pipeline_id, command_number)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
