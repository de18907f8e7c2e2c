use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

const DEFAULT_FREE_DAILY_QUESTIONS: u32 = 5;
const DEFAULT_EDUCATION_DAILY_QUESTIONS: u32 = 50;
const DEFAULT_RATE_LIMIT_WINDOW_MS: u64 = 900_000;
const DEFAULT_RATE_LIMIT_MAX: u64 = 500;

/// Daily tutor-question quotas per tier; `None` means unlimited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanLimits {
    pub free_daily_questions: Option<u32>,
    pub premium_daily_questions: Option<u32>,
    pub education_daily_questions: Option<u32>,
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self {
            free_daily_questions: Some(DEFAULT_FREE_DAILY_QUESTIONS),
            premium_daily_questions: None,
            education_daily_questions: Some(DEFAULT_EDUCATION_DAILY_QUESTIONS),
        }
    }
}

/// Fixed-window, per-client-IP limit applied to `/api` routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub window_ms: u64,
    pub max: u64,
    pub trust_proxy: bool,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            window_ms: DEFAULT_RATE_LIMIT_WINDOW_MS,
            max: DEFAULT_RATE_LIMIT_MAX,
            trust_proxy: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    /// Directory for the daily rolling log file; `None` logs to stdout only.
    pub file_log_dir: Option<PathBuf>,
    pub database_path: PathBuf,
    pub admin_token: Option<String>,
    pub worker_leader: bool,
    pub plan_limits: PlanLimits,
    pub rate_limit: RateLimitSettings,
}

impl Config {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3000);

        let host = std::env::var("HOST")
            .ok()
            .and_then(|value| value.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let file_log_dir = env_bool("ENABLE_FILE_LOGS")
            .unwrap_or(false)
            .then(|| env_string("LOG_DIR").unwrap_or_else(|| "./logs".to_string()))
            .map(PathBuf::from);

        let database_path = env_string("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_database_path);

        let defaults = PlanLimits::default();
        let plan_limits = PlanLimits {
            free_daily_questions: env_quota("FREE_DAILY_QUESTIONS", defaults.free_daily_questions),
            premium_daily_questions: env_quota(
                "PREMIUM_DAILY_QUESTIONS",
                defaults.premium_daily_questions,
            ),
            education_daily_questions: env_quota(
                "EDUCATION_DAILY_QUESTIONS",
                defaults.education_daily_questions,
            ),
        };

        let rate_limit = RateLimitSettings {
            enabled: env_bool("RATE_LIMIT_ENABLED").unwrap_or(true),
            window_ms: env_u64("RATE_LIMIT_WINDOW_MS")
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_MS),
            max: env_u64("RATE_LIMIT_MAX").unwrap_or(DEFAULT_RATE_LIMIT_MAX),
            trust_proxy: env_bool("TRUST_PROXY").unwrap_or(false),
        };

        Self {
            host,
            port,
            log_level,
            file_log_dir,
            database_path,
            admin_token: env_string("ADMIN_TOKEN"),
            worker_leader: env_bool("WORKER_LEADER").unwrap_or(false),
            plan_limits,
            rate_limit,
        }
    }

    /// Configuration for tests and embedded use: loopback, given database file,
    /// no workers, no rate limiting.
    pub fn for_database(database_path: impl Into<PathBuf>) -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            log_level: "info".to_string(),
            file_log_dir: None,
            database_path: database_path.into(),
            admin_token: None,
            worker_leader: false,
            plan_limits: PlanLimits::default(),
            rate_limit: RateLimitSettings {
                enabled: false,
                ..RateLimitSettings::default()
            },
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tutorly")
        .join("tutorly.db")
}

pub(crate) fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    let value = std::env::var(key).ok()?;
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

pub(crate) fn env_u64(key: &str) -> Option<u64> {
    env_string(key)?.trim().parse::<u64>().ok()
}

/// Unset keeps the default, `unlimited` or `0` lifts the quota.
fn env_quota(key: &str, default: Option<u32>) -> Option<u32> {
    let Some(raw) = env_string(key) else {
        return default;
    };
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("unlimited") {
        return None;
    }
    match raw.parse::<u32>() {
        Ok(0) => None,
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = raw, "invalid quota value, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = PlanLimits::default();
        assert_eq!(limits.free_daily_questions, Some(5));
        assert_eq!(limits.premium_daily_questions, None);
        assert_eq!(limits.education_daily_questions, Some(50));
    }

    #[test]
    fn test_env_quota_parsing() {
        std::env::set_var("TUTORLY_TEST_QUOTA_A", "unlimited");
        assert_eq!(env_quota("TUTORLY_TEST_QUOTA_A", Some(3)), None);

        std::env::set_var("TUTORLY_TEST_QUOTA_B", "12");
        assert_eq!(env_quota("TUTORLY_TEST_QUOTA_B", Some(3)), Some(12));

        std::env::set_var("TUTORLY_TEST_QUOTA_C", "lots");
        assert_eq!(env_quota("TUTORLY_TEST_QUOTA_C", Some(3)), Some(3));

        assert_eq!(env_quota("TUTORLY_TEST_QUOTA_UNSET", Some(7)), Some(7));
    }

    #[test]
    fn test_for_database_binds_loopback() {
        let config = Config::for_database("/tmp/x.db");
        assert!(config.bind_addr().ip().is_loopback());
        assert!(!config.worker_leader);
        assert!(config.file_log_dir.is_none());
        assert!(!config.rate_limit.enabled);
    }
}
