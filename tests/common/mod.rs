//! Common test utilities

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Connect to the test database and truncate every table this engine owns,
/// leaving a clean slate for each integration test.
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("failed to connect to test database");

    sqlx::query("TRUNCATE TABLE events, approvals, snapshots, sops CASCADE")
        .execute(&pool)
        .await
        .expect("failed to clean up test database");

    pool
}
