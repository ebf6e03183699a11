use std::time::Duration;

pub struct Env {
    pub jwt_secret: String,
    pub database_url: String,
    pub redis_url: String,
    pub frontend_url: String,
    pub ip: String,
    pub port: u16,
    pub poll_interval_ms: u64,
    pub typing_ttl_secs: u64,
    pub presence_stale_secs: u64,
    pub page_limit_default: usize,
    pub page_limit_max: usize,
    pub push_channel_capacity: usize,
}

fn parse_var<T: std::str::FromStr>(name: &str, default: &str) -> T {
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse::<T>()
        .unwrap_or_else(|_| panic!("{name} must be a valid number"))
}

impl Env {
    fn new() -> Self {
        let jwt_secret = std::env::var("SECRET_KEY")
            .expect("SECRET_KEY must be set in .env file or environment variable");

        let database_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set in .env file or environment variable");
        let redis_url = std::env::var("REDIS_URL")
            .expect("REDIS_URL must be set in .env file or environment variable");

        let frontend_url =
            std::env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".to_string());
        let ip = std::env::var("IP").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_var::<u16>("PORT", "8080");

        Env {
            jwt_secret,
            database_url,
            redis_url,
            frontend_url,
            ip,
            port,
            poll_interval_ms: parse_var("POLL_INTERVAL_MS", "3000"),
            typing_ttl_secs: parse_var("TYPING_TTL_SECS", "5"),
            presence_stale_secs: parse_var("PRESENCE_STALE_SECS", "60"),
            page_limit_default: parse_var("PAGE_LIMIT_DEFAULT", "50"),
            page_limit_max: parse_var("PAGE_LIMIT_MAX", "100"),
            push_channel_capacity: parse_var("PUSH_CHANNEL_CAPACITY", "256"),
        }
    }

    pub fn messaging(&self) -> MessagingConfig {
        MessagingConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            typing_ttl: Duration::from_secs(self.typing_ttl_secs),
            presence_stale_after: Duration::from_secs(self.presence_stale_secs),
            page_limit_default: self.page_limit_default,
            page_limit_max: self.page_limit_max,
            push_channel_capacity: self.push_channel_capacity,
        }
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

/// Tunables shared by the services and the delivery engine.
///
/// Built from [`Env`] in production; tests use [`MessagingConfig::default`]
/// so they never touch the process environment.
#[derive(Debug, Clone)]
pub struct MessagingConfig {
    /// How often the fallback poller hits the message store while push is down.
    pub poll_interval: Duration,
    /// Lifetime of a typing indicator that is not refreshed.
    pub typing_ttl: Duration,
    /// A user with no heartbeat for this long is reported offline.
    pub presence_stale_after: Duration,
    pub page_limit_default: usize,
    pub page_limit_max: usize,
    pub push_channel_capacity: usize,
}

impl MessagingConfig {
    pub fn clamp_limit(&self, limit: Option<usize>) -> usize {
        limit.unwrap_or(self.page_limit_default).clamp(1, self.page_limit_max)
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            typing_ttl: Duration::from_secs(5),
            presence_stale_after: Duration::from_secs(60),
            page_limit_default: 50,
            page_limit_max: 100,
            push_channel_capacity: 256,
        }
    }
}
