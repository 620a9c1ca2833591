use std::sync::Arc;
use std::time::Instant;

use sqlx::SqlitePool;

use crate::audit::AuditLog;
use crate::auth::rate_limit::FixedWindowLimiter;
use crate::auth::session::SessionStore;
use crate::config::AppConfig;
use crate::db;
use crate::storage::{ImageStore, LocalImageStore};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<AppConfig>,
    pub sessions: SessionStore,
    pub uploads: Arc<dyn ImageStore>,
    pub audit: Arc<AuditLog>,
    pub login_limiter: Arc<FixedWindowLimiter>,
    pub register_limiter: Arc<FixedWindowLimiter>,
    pub started_at: Instant,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let db = db::connect(&config.database_url).await?;
        let uploads =
            Arc::new(LocalImageStore::new(&config.upload_dir).await?) as Arc<dyn ImageStore>;
        Ok(Self::from_parts(db, config, uploads))
    }

    pub fn from_parts(db: SqlitePool, config: Arc<AppConfig>, uploads: Arc<dyn ImageStore>) -> Self {
        Self {
            db,
            sessions: SessionStore::new(),
            uploads,
            audit: Arc::new(AuditLog::new(&config.audit_log_path)),
            login_limiter: Arc::new(FixedWindowLimiter::new(&config.login_rate)),
            register_limiter: Arc::new(FixedWindowLimiter::new(&config.register_rate)),
            started_at: Instant::now(),
            config,
        }
    }

    #[cfg(test)]
    pub async fn for_tests() -> Self {
        use crate::config::RateLimitConfig;

        #[derive(Default)]
        struct NullImageStore;

        #[axum::async_trait]
        impl ImageStore for NullImageStore {
            async fn save(
                &self,
                _body: bytes::Bytes,
                _content_type: &str,
            ) -> anyhow::Result<String> {
                Ok("/uploads/test.png".into())
            }
            async fn delete(&self, _image_path: &str) -> anyhow::Result<()> {
                Ok(())
            }
        }

        let tmp = std::env::temp_dir().join(format!("dndating-test-{}", uuid::Uuid::new_v4()));
        let config = Arc::new(AppConfig {
            app_host: "127.0.0.1".into(),
            app_port: 0,
            database_url: "sqlite::memory:".into(),
            upload_dir: tmp.to_string_lossy().into_owned(),
            audit_log_path: tmp.join("app.log").to_string_lossy().into_owned(),
            admin_user: "admin".into(),
            admin_pass: "admin".into(),
            login_rate: RateLimitConfig {
                max_attempts: 100,
                window_secs: 60,
            },
            register_rate: RateLimitConfig {
                max_attempts: 100,
                window_secs: 60,
            },
        });
        std::fs::create_dir_all(&tmp).expect("test dir");

        let db = db::test_pool().await;
        Self::from_parts(db, config, Arc::new(NullImageStore) as Arc<dyn ImageStore>)
    }
}
