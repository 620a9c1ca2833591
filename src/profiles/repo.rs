use sqlx::{FromRow, SqlitePool};

/// A role-play profile. `user_id` is `None` for unclaimed demo profiles,
/// which no real owner can match.
#[derive(Debug, Clone, FromRow)]
pub struct Profile {
    pub profile_id: i64,
    pub user_id: Option<i64>,
    pub name: String,
    pub race: String,
    pub class: String,
    pub level: i64,
    pub bio: Option<String>,
    pub image_path: Option<String>,
    pub looking_for: String,
    pub experience_level: String,
    pub timezone: String,
}

/// Field set shared by create and update. Image attachment is handled
/// separately by the routes.
#[derive(Debug, Clone)]
pub struct ProfileData {
    pub name: String,
    pub race: String,
    pub class: String,
    pub level: i64,
    pub bio: Option<String>,
    pub looking_for: String,
    pub experience_level: String,
    pub timezone: String,
}

const COLUMNS: &str = "profile_id, user_id, name, race, class, level, bio, image_path, looking_for, experience_level, timezone";

impl Profile {
    pub async fn create(
        db: &SqlitePool,
        owner: Option<i64>,
        data: &ProfileData,
        image_path: Option<&str>,
    ) -> anyhow::Result<Profile> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            r#"
            INSERT INTO profiles (user_id, name, race, class, level, bio, image_path, looking_for, experience_level, timezone)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {COLUMNS}
            "#,
        ))
        .bind(owner)
        .bind(&data.name)
        .bind(&data.race)
        .bind(&data.class)
        .bind(data.level)
        .bind(&data.bio)
        .bind(image_path)
        .bind(&data.looking_for)
        .bind(&data.experience_level)
        .bind(&data.timezone)
        .fetch_one(db)
        .await?;
        Ok(profile)
    }

    pub async fn find_by_id(db: &SqlitePool, profile_id: i64) -> anyhow::Result<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            "SELECT {COLUMNS} FROM profiles WHERE profile_id = ?"
        ))
        .bind(profile_id)
        .fetch_optional(db)
        .await?;
        Ok(profile)
    }

    /// The "my profile" lookup: at most one row per owner by convention of
    /// the calling routes.
    pub async fn find_by_owner(db: &SqlitePool, user_id: i64) -> anyhow::Result<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            "SELECT {COLUMNS} FROM profiles WHERE user_id = ? LIMIT 1"
        ))
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        Ok(profile)
    }

    pub async fn list_all(db: &SqlitePool) -> anyhow::Result<Vec<Profile>> {
        let profiles = sqlx::query_as::<_, Profile>(&format!(
            "SELECT {COLUMNS} FROM profiles ORDER BY profile_id DESC"
        ))
        .fetch_all(db)
        .await?;
        Ok(profiles)
    }

    pub async fn update(
        db: &SqlitePool,
        profile_id: i64,
        data: &ProfileData,
        image_path: Option<&str>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE profiles
            SET name = ?, race = ?, class = ?, level = ?, bio = ?, image_path = ?,
                looking_for = ?, experience_level = ?, timezone = ?
            WHERE profile_id = ?
            "#,
        )
        .bind(&data.name)
        .bind(&data.race)
        .bind(&data.class)
        .bind(data.level)
        .bind(&data.bio)
        .bind(image_path)
        .bind(&data.looking_for)
        .bind(&data.experience_level)
        .bind(&data.timezone)
        .bind(profile_id)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn delete(db: &SqlitePool, profile_id: i64) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM profiles WHERE profile_id = ?")
            .bind(profile_id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn count(db: &SqlitePool) -> anyhow::Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM profiles")
            .fetch_one(db)
            .await?;
        Ok(n)
    }
}

#[cfg(test)]
pub fn sample_data(name: &str) -> ProfileData {
    ProfileData {
        name: name.into(),
        race: "Elf".into(),
        class: "Ranger".into(),
        level: 3,
        bio: Some("Looking for adventure.".into()),
        looking_for: "campaign".into(),
        experience_level: "casual".into(),
        timezone: "UTC".into(),
    }
}
