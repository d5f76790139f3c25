use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub dev_mode: bool,
    /// Shared secret the payment provider presents on webhook deliveries
    pub webhook_secret: Option<String>,
    /// Bearer secret for the /admin endpoints
    pub admin_secret: Option<String>,
    /// Allowed CORS origins ("*" = any)
    pub cors_origins: Vec<String>,
    /// Requests per minute per IP on /premium/keys/validate (0 = unlimited)
    pub validate_rate_limit_rpm: u32,
    /// Days to retain webhook events before purging (0 = never purge)
    pub webhook_event_retention_days: i64,
}

/// Read an env var, treating empty or whitespace-only values as unset.
fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("KEYWAY_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let webhook_secret =
            non_empty_var("WEBHOOK_SECRET").or_else(|| non_empty_var("LASTLINK_WEBHOOK_SECRET"));

        let cors_origins = parse_origins(&env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".into()));

        let validate_rate_limit_rpm: u32 = env::var("RATE_LIMIT_VALIDATE_RPM")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let webhook_event_retention_days: i64 = env::var("WEBHOOK_EVENT_RETENTION_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "keyway.db".to_string()),
            dev_mode,
            webhook_secret,
            admin_secret: non_empty_var("ADMIN_SECRET"),
            cors_origins,
            validate_rate_limit_rpm,
            webhook_event_retention_days,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// True when any origin may call the API.
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.iter().any(|o| o == "*")
    }
}

/// Split a comma-separated origin list, dropping blanks.
pub fn parse_origins(raw: &str) -> Vec<String> {
    let origins: Vec<String> = raw
        .split(',')
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect();
    if origins.is_empty() {
        vec!["*".to_string()]
    } else {
        origins
    }
}
