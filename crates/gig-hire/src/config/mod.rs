use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

const DEFAULT_TX_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_RATE_LIMIT_MAX: u32 = 5;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;
const DEFAULT_BID_RATE_LIMIT_MAX: u32 = 10;
const DEFAULT_BID_RATE_LIMIT_WINDOW_SECS: u64 = 15 * 60;

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub hiring: HiringConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let hiring = HiringConfig::from_env()?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            hiring,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Bounds applied to hire attempts: the unit-of-work deadline, the admission windows
/// for hires and bid submissions, and whether proxy headers name the client origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HiringConfig {
    pub transaction_timeout: Duration,
    pub admission: AdmissionConfig,
    pub bid_admission: AdmissionConfig,
    /// Only enable behind a reverse proxy that overwrites `x-forwarded-for`.
    pub trust_forwarded: bool,
}

impl HiringConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let timeout_ms = parse_positive("HIRE_TX_TIMEOUT_MS", DEFAULT_TX_TIMEOUT_MS)?;

        Ok(Self {
            transaction_timeout: Duration::from_millis(timeout_ms),
            admission: AdmissionConfig::from_env(
                "HIRE_RATE_LIMIT_MAX",
                "HIRE_RATE_LIMIT_WINDOW_SECS",
                AdmissionConfig::default(),
            )?,
            bid_admission: AdmissionConfig::from_env(
                "BID_RATE_LIMIT_MAX",
                "BID_RATE_LIMIT_WINDOW_SECS",
                AdmissionConfig::bid_submissions(),
            )?,
            trust_forwarded: parse_flag("APP_TRUST_PROXY")?,
        })
    }
}

impl Default for HiringConfig {
    fn default() -> Self {
        Self {
            transaction_timeout: Duration::from_millis(DEFAULT_TX_TIMEOUT_MS),
            admission: AdmissionConfig::default(),
            bid_admission: AdmissionConfig::bid_submissions(),
            trust_forwarded: false,
        }
    }
}

/// Sliding-window limit applied per caller and origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionConfig {
    pub max_attempts: u32,
    pub window: Duration,
}

impl AdmissionConfig {
    /// 10 bid submissions per 15 minutes.
    pub fn bid_submissions() -> Self {
        Self {
            max_attempts: DEFAULT_BID_RATE_LIMIT_MAX,
            window: Duration::from_secs(DEFAULT_BID_RATE_LIMIT_WINDOW_SECS),
        }
    }

    fn from_env(
        max_key: &'static str,
        window_key: &'static str,
        defaults: Self,
    ) -> Result<Self, ConfigError> {
        let max_attempts = parse_positive(max_key, u64::from(defaults.max_attempts))?;
        let window_secs = parse_positive(window_key, defaults.window.as_secs())?;
        let max_attempts =
            u32::try_from(max_attempts).map_err(|_| ConfigError::InvalidNumber { key: max_key })?;

        Ok(Self {
            max_attempts,
            window: Duration::from_secs(window_secs),
        })
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RATE_LIMIT_MAX,
            window: Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECS),
        }
    }
}

fn parse_flag(key: &'static str) -> Result<bool, ConfigError> {
    let Ok(raw) = env::var(key) else {
        return Ok(false);
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag { key }),
    }
}

fn parse_positive(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    let Ok(raw) = env::var(key) else {
        return Ok(default);
    };

    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => Err(ConfigError::InvalidNumber { key }),
        Ok(value) => Ok(value),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
    InvalidFlag { key: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key } => {
                write!(f, "{key} must be a positive integer")
            }
            ConfigError::InvalidFlag { key } => write!(f, "{key} must be true or false"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InvalidFlag { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "HIRE_TX_TIMEOUT_MS",
            "HIRE_RATE_LIMIT_MAX",
            "HIRE_RATE_LIMIT_WINDOW_SECS",
            "BID_RATE_LIMIT_MAX",
            "BID_RATE_LIMIT_WINDOW_SECS",
            "APP_TRUST_PROXY",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.hiring, HiringConfig::default());
        assert_eq!(config.hiring.admission.max_attempts, 5);
        assert_eq!(config.hiring.admission.window, Duration::from_secs(60));
        assert_eq!(config.hiring.bid_admission.max_attempts, 10);
        assert_eq!(config.hiring.bid_admission.window, Duration::from_secs(900));
        assert!(!config.hiring.trust_forwarded);
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn reads_hiring_overrides() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("HIRE_TX_TIMEOUT_MS", "250");
        env::set_var("HIRE_RATE_LIMIT_MAX", "2");
        env::set_var("HIRE_RATE_LIMIT_WINDOW_SECS", "10");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(
            config.hiring.transaction_timeout,
            Duration::from_millis(250)
        );
        assert_eq!(config.hiring.admission.max_attempts, 2);
        assert_eq!(config.hiring.admission.window, Duration::from_secs(10));
        reset_env();
    }

    #[test]
    fn rejects_zero_timeout() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("HIRE_TX_TIMEOUT_MS", "0");
        match AppConfig::load() {
            Err(ConfigError::InvalidNumber { key }) => assert_eq!(key, "HIRE_TX_TIMEOUT_MS"),
            other => panic!("expected invalid number, got {other:?}"),
        }
        reset_env();
    }

    #[test]
    fn reads_bid_limits_and_proxy_trust() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("BID_RATE_LIMIT_MAX", "3");
        env::set_var("BID_RATE_LIMIT_WINDOW_SECS", "30");
        env::set_var("APP_TRUST_PROXY", "true");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.hiring.bid_admission.max_attempts, 3);
        assert_eq!(config.hiring.bid_admission.window, Duration::from_secs(30));
        assert!(config.hiring.trust_forwarded);
        reset_env();
    }

    #[test]
    fn rejects_unknown_proxy_flag() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_TRUST_PROXY", "sometimes");
        match AppConfig::load() {
            Err(ConfigError::InvalidFlag { key }) => assert_eq!(key, "APP_TRUST_PROXY"),
            other => panic!("expected invalid flag, got {other:?}"),
        }
        reset_env();
    }
}
