// storage/migrations.rs
// Database migration management

use sqlx::{Pool, Sqlite};

use crate::error_handling::DatabaseError;

/// Runs SQLx migrations located in the `migrations/` directory.
pub async fn run_migrations(pool: &Pool<Sqlite>) -> Result<(), DatabaseError> {
    let migrations_dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
    let migrator = sqlx::migrate::Migrator::new(migrations_dir.as_path()).await?;
    migrator.run(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::pool::init_memory_pool;

    #[tokio::test]
    async fn test_migrations_create_tables_and_rerun() {
        let pool = init_memory_pool().await.expect("pool");
        run_migrations(&pool).await.expect("first run");
        run_migrations(&pool).await.expect("second run is a no-op");

        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(pool.as_ref())
                .await
                .expect("schema readable");
        let names: Vec<_> = tables.into_iter().map(|t| t.0).collect();
        for expected in ["crawled_urls", "findings", "report_rows", "report_schemas"] {
            assert!(names.contains(&expected.to_string()), "missing table {}", expected);
        }
    }
}
