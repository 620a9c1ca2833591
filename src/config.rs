use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub max_attempts: u32,
    pub window_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_host: String,
    pub app_port: u16,
    pub database_url: String,
    pub upload_dir: String,
    pub audit_log_path: String,
    pub admin_user: String,
    pub admin_pass: String,
    pub login_rate: RateLimitConfig,
    pub register_rate: RateLimitConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://users.db".into());
        Ok(Self {
            app_host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            app_port: env_parse("APP_PORT", 3000),
            database_url,
            upload_dir: std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".into()),
            audit_log_path: std::env::var("AUDIT_LOG_PATH").unwrap_or_else(|_| "app.log".into()),
            admin_user: std::env::var("ADMIN_USER").unwrap_or_else(|_| "admin".into()),
            admin_pass: std::env::var("ADMIN_PASS").unwrap_or_else(|_| "admin".into()),
            login_rate: RateLimitConfig {
                max_attempts: env_parse("LOGIN_RATE_MAX", 5),
                window_secs: env_parse("LOGIN_RATE_WINDOW_SECS", 15 * 60),
            },
            register_rate: RateLimitConfig {
                max_attempts: env_parse("REGISTER_RATE_MAX", 3),
                window_secs: env_parse("REGISTER_RATE_WINDOW_SECS", 60 * 60),
            },
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
