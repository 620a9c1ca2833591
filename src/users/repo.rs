use sqlx::{FromRow, SqlitePool};

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: i64,
    pub name: String,
    pub password_hash: String,
    pub is_admin: bool,
}

impl User {
    pub async fn find_by_name(db: &SqlitePool, name: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, name, password_hash, is_admin
            FROM users
            WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &SqlitePool, user_id: i64) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, name, password_hash, is_admin
            FROM users
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Create a new user with an already-hashed password.
    pub async fn create(db: &SqlitePool, name: &str, password_hash: &str) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, password_hash)
            VALUES (?, ?)
            RETURNING user_id, name, password_hash, is_admin
            "#,
        )
        .bind(name)
        .bind(password_hash)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    pub async fn update(
        db: &SqlitePool,
        user_id: i64,
        name: &str,
        password_hash: &str,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET name = ?, password_hash = ? WHERE user_id = ?")
            .bind(name)
            .bind(password_hash)
            .bind(user_id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn delete(db: &SqlitePool, user_id: i64) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM users WHERE user_id = ?")
            .bind(user_id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn list_all(db: &SqlitePool) -> anyhow::Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, name, password_hash, is_admin
            FROM users
            ORDER BY user_id DESC
            "#,
        )
        .fetch_all(db)
        .await?;
        Ok(users)
    }

    pub async fn count(db: &SqlitePool) -> anyhow::Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(db)
            .await?;
        Ok(n)
    }
}
