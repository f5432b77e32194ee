use std::env;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub limits: LimitsConfig,
    pub server: ServerConfig,
    pub queue: QueueConfig,
    pub aws: AwsConfig,
    pub postgres: PostgresConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `MONITOR_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("MONITOR_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            limits: LimitsConfig::from_env_profiled(p),
            server: ServerConfig::from_env_profiled(p),
            queue: QueueConfig::from_env_profiled(p),
            aws: AwsConfig::from_env_profiled(p),
            postgres: PostgresConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  limits:    deletions={}, update_window={}m, updates={}, history_cap={}",
            self.limits.consecutive_deletions,
            self.limits.update_window_minutes,
            self.limits.update_window_count,
            self.limits
                .history_cap
                .map(|c| c.to_string())
                .unwrap_or_else(|| "(unbounded)".to_string())
        );
        tracing::info!(
            "  lanes:     count={}, capacity={}, sink_timeout={}ms",
            self.limits.lane_count,
            self.limits.lane_capacity,
            self.limits.sink_timeout_ms
        );
        tracing::info!("  server:    {}:{}", self.server.host, self.server.port);
        tracing::info!(
            "  queue:     url={}",
            self.queue.queue_url.as_deref().unwrap_or("(none)")
        );
        tracing::info!("  aws:       region={}", self.aws.region);
        tracing::info!(
            "  postgres:  host={}, db={}, configured={}",
            self.postgres.host,
            self.postgres.database,
            self.postgres.is_configured()
        );
    }

    /// Return a redacted view safe for API responses (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "limits": self.limits,
            "server": { "host": self.server.host, "port": self.server.port },
            "queue": {
                "queue_url": self.queue.queue_url,
                "configured": self.queue.is_configured(),
            },
            "aws": {
                "region": self.aws.region,
                "static_credentials": self.aws.access_key_id.is_some(),
            },
            "postgres": {
                "host": self.postgres.host,
                "port": self.postgres.port,
                "database": self.postgres.database,
                "configured": self.postgres.is_configured(),
            },
        })
    }
}

// ── Limits ────────────────────────────────────────────────────

/// Longest accepted update window (one year). Larger values are clamped.
pub const MAX_UPDATE_WINDOW_MINUTES: u64 = 366 * 24 * 60;

/// Thresholds and runtime knobs of the limit-checking engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Unbroken tail of user deletions that raises a notification.
    pub consecutive_deletions: usize,
    /// Trailing window for the user-update rule, in minutes.
    pub update_window_minutes: u64,
    /// User updates inside the window that raise a notification.
    pub update_window_count: usize,
    /// Per-user history cap; `None` keeps every event.
    pub history_cap: Option<usize>,
    /// Upper bound on a single notification save.
    pub sink_timeout_ms: u64,
    /// Number of ordered per-user processing lanes.
    pub lane_count: usize,
    /// Buffered events per lane before dispatch applies back-pressure.
    pub lane_capacity: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            consecutive_deletions: 3,
            update_window_minutes: 1,
            update_window_count: 2,
            history_cap: None,
            sink_timeout_ms: 5000,
            lane_count: 8,
            lane_capacity: 1024,
        }
    }
}

impl LimitsConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            consecutive_deletions: profiled_env_parse(p, "LIMIT_CONSECUTIVE_DELETIONS", d.consecutive_deletions).max(1),
            update_window_minutes: profiled_env_parse(p, "LIMIT_UPDATE_WINDOW_MINUTES", d.update_window_minutes)
                .min(MAX_UPDATE_WINDOW_MINUTES),
            update_window_count: profiled_env_parse(p, "LIMIT_UPDATE_WINDOW_COUNT", d.update_window_count).max(1),
            history_cap: profiled_env_opt(p, "EVENT_HISTORY_CAP").and_then(|v| v.parse().ok()),
            sink_timeout_ms: profiled_env_parse(p, "SINK_TIMEOUT_MS", d.sink_timeout_ms),
            lane_count: profiled_env_parse(p, "LANE_COUNT", d.lane_count).max(1),
            lane_capacity: profiled_env_parse(p, "LANE_CAPACITY", d.lane_capacity).max(1),
        }
    }

    /// The update rule's window as a duration, clamped to
    /// [`MAX_UPDATE_WINDOW_MINUTES`].
    pub fn update_window(&self) -> chrono::Duration {
        let minutes = self.update_window_minutes.min(MAX_UPDATE_WINDOW_MINUTES);
        chrono::Duration::minutes(minutes as i64)
    }

    pub fn sink_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.sink_timeout_ms)
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_parse(p, "PORT", 3000),
            cors_origin: profiled_env_or(p, "CORS_ORIGIN", "*"),
        }
    }
}

// ── Queue ─────────────────────────────────────────────────────

/// Inbound event queue. Expected to be a FIFO queue grouped by user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub queue_url: Option<String>,
    pub max_batch_size: u32,
    pub poll_interval_ms: u64,
    pub visibility_timeout_secs: u32,
}

impl QueueConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            queue_url: profiled_env_opt(p, "QUEUE_URL"),
            max_batch_size: profiled_env_parse(p, "QUEUE_MAX_BATCH_SIZE", 10),
            poll_interval_ms: profiled_env_parse(p, "QUEUE_POLL_INTERVAL_MS", 200),
            visibility_timeout_secs: profiled_env_parse(p, "QUEUE_VISIBILITY_TIMEOUT_SECS", 30),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.queue_url.is_some()
    }
}

// ── AWS ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            region: profiled_env_or(p, "AWS_REGION", "eu-west-1"),
            access_key_id: profiled_env_opt(p, "AWS_ACCESS_KEY_ID"),
            secret_access_key: profiled_env_opt(p, "AWS_SECRET_ACCESS_KEY"),
            session_token: profiled_env_opt(p, "AWS_SESSION_TOKEN"),
            endpoint_url: profiled_env_opt(p, "QUEUE_AWS_ENDPOINT_URL"),
        }
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "PG_HOST", "localhost"),
            port: profiled_env_parse(p, "PG_PORT", 5432),
            database: profiled_env_or(p, "PG_DATABASE", "event_monitor"),
            username: profiled_env_opt(p, "PG_USERNAME"),
            password: profiled_env_opt(p, "PG_PASSWORD"),
            ssl_mode: profiled_env_or(p, "PG_SSL_MODE", "prefer"),
            max_connections: profiled_env_parse(p, "PG_MAX_CONNECTIONS", 10),
        }
    }

    pub fn connection_string(&self) -> String {
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn is_configured(&self) -> bool {
        self.username.is_some()
    }
}
