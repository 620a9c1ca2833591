use std::str::FromStr;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .context("parse DATABASE_URL")?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await
        .context("connect to database")?;

    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("run migrations")?;
    Ok(())
}

/// Insert the demo profile once, when the table is empty.
pub async fn seed_demo_profile(pool: &SqlitePool) -> anyhow::Result<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM profiles")
        .fetch_one(pool)
        .await?;
    if count > 0 {
        return Ok(());
    }

    sqlx::query(
        r#"
        INSERT INTO profiles (user_id, name, race, class, level, bio, looking_for, experience_level, timezone)
        VALUES (NULL, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind("Eldrin the Unattached")
    .bind("Elf")
    .bind("Wizard")
    .bind(5i64)
    .bind("Seeking a party for long rests and longer campaigns.")
    .bind("campaign,one-shots")
    .bind("veteran")
    .bind("UTC")
    .execute(pool)
    .await?;

    tracing::info!("seeded demo profile into empty profiles table");
    Ok(())
}

#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    migrate(&pool).await.expect("migrations");
    pool
}
