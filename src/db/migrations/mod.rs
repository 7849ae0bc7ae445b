use anyhow::Result;
use sqlx::PgPool;
use tracing::info;

/// Ordered migration files, embedded so the binary is self-contained.
const MIGRATIONS: &[(&str, &str)] = &[
    ("01_catalog.sql", include_str!("sql/01_catalog.sql")),
    ("02_events.sql", include_str!("sql/02_events.sql")),
    ("03_telemetry.sql", include_str!("sql/03_telemetry.sql")),
    ("04_indexes.sql", include_str!("sql/04_indexes.sql")),
];

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    for (name, sql) in MIGRATIONS {
        execute_migration(pool, name, sql).await?;
    }

    Ok(())
}

async fn execute_migration(pool: &PgPool, name: &str, sql: &str) -> Result<()> {
    // Migration files contain multiple statements, so they go through the
    // simple query protocol rather than a prepared statement.
    sqlx::raw_sql(sql)
        .execute(pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;

    info!("Applied migration: {}", name);

    Ok(())
}
