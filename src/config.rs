// Push agent configuration
// Flattenable clap arguments with `KODEGEN_PUSH_*` environment fallbacks

use std::time::Duration;

use clap::{ArgAction, Args, Parser, ValueEnum};
use url::Url;

use crate::components::{PushError, PushResult};

pub const DEFAULT_API_BASE: &str = "http://localhost:3000/api";
pub const DEFAULT_WORKER_SCRIPT: &str = "/sw.js";
pub const DEFAULT_WORKER_SCOPE: &str = "/";
pub const DEFAULT_CACHE_VERSION: &str = "gaadimech-crm-v1";
pub const DEFAULT_TARGET_URL: &str = "/todays-leads";
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_INITIAL_REFRESH_DELAY_SECS: u64 = 10;
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 3_600;
pub const DEFAULT_REFRESH_JITTER: f64 = 0.0;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Clone, Debug, Parser)]
#[command(name = "kodegen-push", version, about = "Push subscription agent", long_about = None)]
pub struct PushConfig {
    /// Backend API base; registry routes live under `{api_base_url}/push/`
    #[arg(long, env = "KODEGEN_PUSH_API_BASE_URL", default_value = DEFAULT_API_BASE)]
    pub api_base_url: String,

    /// Application server key for providers that still require one
    #[arg(long, env = "KODEGEN_PUSH_VAPID_KEY")]
    pub vapid_key: Option<String>,

    #[command(flatten)]
    pub worker: WorkerConfig,

    #[command(flatten)]
    pub refresh: RefreshConfig,

    #[command(flatten)]
    pub registry: RegistryConfig,

    #[command(flatten)]
    pub log: LogConfig,
}

#[derive(Clone, Debug, Args)]
pub struct WorkerConfig {
    /// Script registered as the background worker
    #[arg(long, env = "KODEGEN_PUSH_WORKER_SCRIPT", default_value = DEFAULT_WORKER_SCRIPT)]
    pub worker_script: String,

    /// Path scope the worker controls
    #[arg(long, env = "KODEGEN_PUSH_WORKER_SCOPE", default_value = DEFAULT_WORKER_SCOPE)]
    pub worker_scope: String,

    /// Cache version tag; activation deletes every other cache
    #[arg(long, env = "KODEGEN_PUSH_CACHE_VERSION", default_value = DEFAULT_CACHE_VERSION)]
    pub cache_version: String,

    /// Navigation target for notifications without a url
    #[arg(long, env = "KODEGEN_PUSH_DEFAULT_URL", default_value = DEFAULT_TARGET_URL)]
    pub default_url: String,

    /// Upper bound on waiting for an active worker
    #[arg(long, env = "KODEGEN_PUSH_READY_TIMEOUT_MS", default_value_t = DEFAULT_READY_TIMEOUT_MS)]
    pub ready_timeout_ms: u64,
}

#[derive(Clone, Debug, Args)]
pub struct RefreshConfig {
    /// Delay between a visibility/focus change and the refresh it triggers
    #[arg(long, env = "KODEGEN_PUSH_SETTLE_DELAY_MS", default_value_t = DEFAULT_SETTLE_DELAY_MS)]
    pub settle_delay_ms: u64,

    /// First periodic refresh after permission is granted
    #[arg(
        long,
        env = "KODEGEN_PUSH_INITIAL_REFRESH_DELAY_SECS",
        default_value_t = DEFAULT_INITIAL_REFRESH_DELAY_SECS
    )]
    pub initial_refresh_delay_secs: u64,

    /// Periodic refresh interval, before jitter
    #[arg(
        long,
        env = "KODEGEN_PUSH_REFRESH_INTERVAL_SECS",
        default_value_t = DEFAULT_REFRESH_INTERVAL_SECS
    )]
    pub refresh_interval_secs: u64,

    /// Fraction of the interval added at random to each periodic delay (0.0 to 1.0)
    #[arg(long, env = "KODEGEN_PUSH_REFRESH_JITTER", default_value_t = DEFAULT_REFRESH_JITTER)]
    pub refresh_jitter: f64,
}

#[derive(Clone, Debug, Args)]
pub struct RegistryConfig {
    /// Whole-request timeout for registry calls
    #[arg(long, env = "KODEGEN_PUSH_HTTP_TIMEOUT_SECS", default_value_t = DEFAULT_HTTP_TIMEOUT_SECS)]
    pub http_timeout_secs: u64,

    #[arg(
        long,
        env = "KODEGEN_PUSH_CONNECT_TIMEOUT_SECS",
        default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS
    )]
    pub connect_timeout_secs: u64,

    /// Also send the token as the deprecated `endpoint` field
    #[arg(
        long,
        env = "KODEGEN_PUSH_LEGACY_ENDPOINT_FIELD",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub legacy_endpoint_field: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Args)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[arg(long, env = "KODEGEN_PUSH_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "KODEGEN_PUSH_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE.to_string(),
            vapid_key: None,
            worker: WorkerConfig {
                worker_script: DEFAULT_WORKER_SCRIPT.to_string(),
                worker_scope: DEFAULT_WORKER_SCOPE.to_string(),
                cache_version: DEFAULT_CACHE_VERSION.to_string(),
                default_url: DEFAULT_TARGET_URL.to_string(),
                ready_timeout_ms: DEFAULT_READY_TIMEOUT_MS,
            },
            refresh: RefreshConfig {
                settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
                initial_refresh_delay_secs: DEFAULT_INITIAL_REFRESH_DELAY_SECS,
                refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
                refresh_jitter: DEFAULT_REFRESH_JITTER,
            },
            registry: RegistryConfig {
                http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
                connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
                legacy_endpoint_field: true,
            },
            log: LogConfig::default(),
        }
    }
}

impl PushConfig {
    /// Read configuration from `KODEGEN_PUSH_*` variables, falling back to defaults
    pub fn from_env() -> PushResult<Self> {
        let config = Self::try_parse_from(["kodegen-push"])
            .map_err(|e| PushError::config("environment", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parsed API base URL
    pub fn api_base(&self) -> PushResult<Url> {
        let url = Url::parse(&self.api_base_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(PushError::config(
                "api_base_url",
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        Ok(url)
    }

    pub fn validate(&self) -> PushResult<()> {
        self.api_base()?;

        if !self.worker.worker_scope.starts_with('/') {
            return Err(PushError::config("worker_scope", "must be an absolute path"));
        }
        if self.worker.worker_script.trim().is_empty() {
            return Err(PushError::config("worker_script", "must not be empty"));
        }
        if self.worker.cache_version.trim().is_empty() {
            return Err(PushError::config("cache_version", "must not be empty"));
        }
        if self.worker.default_url.trim().is_empty() {
            return Err(PushError::config("default_url", "must not be empty"));
        }
        if self.vapid_key.as_deref().is_some_and(|key| key.trim().is_empty()) {
            return Err(PushError::config("vapid_key", "must not be blank when set"));
        }

        if !(0.0..=1.0).contains(&self.refresh.refresh_jitter) {
            return Err(PushError::config("refresh_jitter", "must be between 0.0 and 1.0"));
        }

        let non_zero = [
            ("ready_timeout_ms", self.worker.ready_timeout_ms),
            ("refresh_interval_secs", self.refresh.refresh_interval_secs),
            ("http_timeout_secs", self.registry.http_timeout_secs),
            ("connect_timeout_secs", self.registry.connect_timeout_secs),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(PushError::config(field, "must be greater than zero"));
            }
        }
        Ok(())
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.worker.ready_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.refresh.settle_delay_ms)
    }

    pub fn initial_refresh_delay(&self) -> Duration {
        Duration::from_secs(self.refresh.initial_refresh_delay_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh.refresh_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.registry.http_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.registry.connect_timeout_secs)
    }
}
