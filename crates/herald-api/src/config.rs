//! Configuration management for the Herald orchestration service.

use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use herald_queue::{ConsumerConfig, ManagerConfig};
use herald_resilience::{BreakerConfig, RetryConfig};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "config.toml";

/// Complete service configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables (highest priority)
/// 2. Configuration file (`config.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// Duration fields accept standard duration literals (`500ms`, `10s`, `1m`,
/// `2h`); boolean flags accept `true`/`false` as well as `1`/`0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server
    /// Server bind port.
    ///
    /// Environment variable: `PORT`
    #[serde(default = "default_port", alias = "PORT")]
    pub port: u16,
    /// HTTP read timeout.
    ///
    /// Environment variable: `READ_TIMEOUT`
    #[serde(default = "default_io_timeout", with = "duration_literal", alias = "READ_TIMEOUT")]
    pub read_timeout: Duration,
    /// HTTP write timeout, also the request deadline.
    ///
    /// Environment variable: `WRITE_TIMEOUT`
    #[serde(default = "default_io_timeout", with = "duration_literal", alias = "WRITE_TIMEOUT")]
    pub write_timeout: Duration,

    // Logging
    /// Log level filter.
    ///
    /// Environment variable: `LOG_LEVEL`
    #[serde(default = "default_log_level", alias = "LOG_LEVEL")]
    pub log_level: String,
    /// Log format: `json` or `console`.
    ///
    /// Environment variable: `LOG_FORMAT`
    #[serde(default = "default_log_format", alias = "LOG_FORMAT")]
    pub log_format: String,

    // External services
    /// Base URL of the user service.
    ///
    /// Environment variable: `USER_SERVICE_URL`
    #[serde(default = "default_user_service_url", alias = "USER_SERVICE_URL")]
    pub user_service_url: String,
    /// Per-request timeout for the user service.
    ///
    /// Environment variable: `USER_SERVICE_TIMEOUT`
    #[serde(
        default = "default_service_timeout",
        with = "duration_literal",
        alias = "USER_SERVICE_TIMEOUT"
    )]
    pub user_service_timeout: Duration,
    /// Base URL of the template service.
    ///
    /// Environment variable: `TEMPLATE_SERVICE_URL`
    #[serde(default = "default_template_service_url", alias = "TEMPLATE_SERVICE_URL")]
    pub template_service_url: String,
    /// Per-request timeout for the template service.
    ///
    /// Environment variable: `TEMPLATE_SERVICE_TIMEOUT`
    #[serde(
        default = "default_service_timeout",
        with = "duration_literal",
        alias = "TEMPLATE_SERVICE_TIMEOUT"
    )]
    pub template_service_timeout: Duration,
    /// Use in-process mocks instead of the real user/template services.
    ///
    /// Environment variable: `USE_MOCK_SERVICES`
    #[serde(default = "default_use_mocks", with = "flag", alias = "USE_MOCK_SERVICES")]
    pub use_mock_services: bool,

    // Message log
    /// Broker connection URL.
    ///
    /// Environment variable: `BROKER_URL`
    #[serde(default = "default_broker_url", alias = "BROKER_URL")]
    pub broker_url: String,
    /// Topic for email delivery jobs.
    ///
    /// Environment variable: `EMAIL_TOPIC`
    #[serde(default = "default_email_topic", alias = "EMAIL_TOPIC")]
    pub email_topic: String,
    /// Topic for push delivery jobs.
    ///
    /// Environment variable: `PUSH_TOPIC`
    #[serde(default = "default_push_topic", alias = "PUSH_TOPIC")]
    pub push_topic: String,
    /// Consumer group identifier for the email worker.
    ///
    /// Environment variable: `GROUP_ID`
    #[serde(default = "default_group_id", alias = "GROUP_ID")]
    pub group_id: String,

    // Idempotency cache
    /// Redis host.
    ///
    /// Environment variable: `REDIS_HOST`
    #[serde(default = "default_redis_host", alias = "REDIS_HOST")]
    pub redis_host: String,
    /// Redis port.
    ///
    /// Environment variable: `REDIS_PORT`
    #[serde(default = "default_redis_port", alias = "REDIS_PORT")]
    pub redis_port: u16,
    /// Redis password; empty disables authentication.
    ///
    /// Environment variable: `REDIS_PASSWORD`
    #[serde(default, alias = "REDIS_PASSWORD")]
    pub redis_password: String,
    /// Redis logical database.
    ///
    /// Environment variable: `REDIS_DB`
    #[serde(default, alias = "REDIS_DB")]
    pub redis_db: i64,
    /// Idempotency entry lifetime.
    ///
    /// Environment variable: `IDEMPOTENCY_TTL`
    #[serde(
        default = "default_idempotency_ttl",
        with = "duration_literal",
        alias = "IDEMPOTENCY_TTL"
    )]
    pub idempotency_ttl: Duration,

    // Store
    /// PostgreSQL host.
    ///
    /// Environment variable: `POSTGRES_HOST`
    #[serde(default = "default_postgres_host", alias = "POSTGRES_HOST")]
    pub postgres_host: String,
    /// PostgreSQL port.
    ///
    /// Environment variable: `POSTGRES_PORT`
    #[serde(default = "default_postgres_port", alias = "POSTGRES_PORT")]
    pub postgres_port: u16,
    /// PostgreSQL user.
    ///
    /// Environment variable: `POSTGRES_USER`
    #[serde(default = "default_postgres_user", alias = "POSTGRES_USER")]
    pub postgres_user: String,
    /// PostgreSQL password.
    ///
    /// Environment variable: `POSTGRES_PASSWORD`
    #[serde(default = "default_postgres_password", alias = "POSTGRES_PASSWORD")]
    pub postgres_password: String,
    /// PostgreSQL database name.
    ///
    /// Environment variable: `POSTGRES_DB`
    #[serde(default = "default_postgres_db", alias = "POSTGRES_DB")]
    pub postgres_db: String,
    /// PostgreSQL SSL mode.
    ///
    /// Environment variable: `POSTGRES_SSLMODE`
    #[serde(default = "default_postgres_sslmode", alias = "POSTGRES_SSLMODE")]
    pub postgres_sslmode: String,
    /// Maximum store connections in the pool.
    ///
    /// Environment variable: `POSTGRES_MAX_CONNS`
    #[serde(default = "default_postgres_max_conns", alias = "POSTGRES_MAX_CONNS")]
    pub postgres_max_conns: u32,

    // Circuit breaker
    /// Consecutive failures to trip an HTTP dependency breaker; also the
    /// half-open success target.
    ///
    /// Environment variable: `CIRCUIT_MAX_FAILURES`
    #[serde(default = "default_circuit_max_failures", alias = "CIRCUIT_MAX_FAILURES")]
    pub circuit_max_failures: u32,
    /// Open-state cool-down.
    ///
    /// Environment variable: `CIRCUIT_TIMEOUT`
    #[serde(
        default = "default_circuit_timeout",
        with = "duration_literal",
        alias = "CIRCUIT_TIMEOUT"
    )]
    pub circuit_timeout: Duration,
    /// Probes admitted while half-open.
    ///
    /// Environment variable: `CIRCUIT_HALF_OPEN_MAX`
    #[serde(default = "default_circuit_half_open_max", alias = "CIRCUIT_HALF_OPEN_MAX")]
    pub circuit_half_open_max: u32,

    // Retry
    /// Maximum retries per outbound call.
    ///
    /// Environment variable: `RETRY_MAX_RETRIES`
    #[serde(default = "default_retry_max_retries", alias = "RETRY_MAX_RETRIES")]
    pub retry_max_retries: u32,
    /// Delay before the first retry.
    ///
    /// Environment variable: `RETRY_INITIAL_DELAY`
    #[serde(
        default = "default_retry_initial_delay",
        with = "duration_literal",
        alias = "RETRY_INITIAL_DELAY"
    )]
    pub retry_initial_delay: Duration,
    /// Cap on retry delays.
    ///
    /// Environment variable: `RETRY_MAX_DELAY`
    #[serde(
        default = "default_retry_max_delay",
        with = "duration_literal",
        alias = "RETRY_MAX_DELAY"
    )]
    pub retry_max_delay: Duration,
    /// Exponential backoff multiplier.
    ///
    /// Environment variable: `RETRY_BACKOFF_MULTIPLIER`
    #[serde(default = "default_retry_backoff_multiplier", alias = "RETRY_BACKOFF_MULTIPLIER")]
    pub retry_backoff_multiplier: f64,

    // Email worker
    /// SMTP relay host.
    ///
    /// Environment variable: `SMTP_HOST`
    #[serde(default = "default_smtp_host", alias = "SMTP_HOST")]
    pub smtp_host: String,
    /// SMTP relay port.
    ///
    /// Environment variable: `SMTP_PORT`
    #[serde(default = "default_smtp_port", alias = "SMTP_PORT")]
    pub smtp_port: u16,
    /// SMTP username; empty disables authentication.
    ///
    /// Environment variable: `SMTP_USER`
    #[serde(default, alias = "SMTP_USER")]
    pub smtp_user: String,
    /// SMTP password.
    ///
    /// Environment variable: `SMTP_PASS`
    #[serde(default, alias = "SMTP_PASS")]
    pub smtp_pass: String,
    /// Sender address for outgoing email.
    ///
    /// Environment variable: `EMAIL_FROM`
    #[serde(default = "default_email_from", alias = "EMAIL_FROM")]
    pub email_from: String,
    /// Recipient used when a job's metadata carries none.
    ///
    /// Environment variable: `EMAIL_FALLBACK_RECIPIENT`
    #[serde(default, alias = "EMAIL_FALLBACK_RECIPIENT")]
    pub email_fallback_recipient: Option<String>,
    /// Base URL of the orchestrator, for status callbacks.
    ///
    /// Environment variable: `ORCHESTRATOR_URL`
    #[serde(default = "default_orchestrator_url", alias = "ORCHESTRATOR_URL")]
    pub orchestrator_url: String,
    /// Cumulative retry budget per email job.
    ///
    /// Environment variable: `SMTP_RETRY_BUDGET`
    #[serde(
        default = "default_smtp_retry_budget",
        with = "duration_literal",
        alias = "SMTP_RETRY_BUDGET"
    )]
    pub smtp_retry_budget: Duration,
}

impl Config {
    /// Loads configuration from defaults, `config.toml`, and environment
    /// variable overrides.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(""));

        let config: Self = figment.extract().context("failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Breaker configuration for an HTTP dependency.
    pub fn breaker_config(&self, name: &str) -> BreakerConfig {
        BreakerConfig::new(name)
            .with_max_failures(self.circuit_max_failures)
            .with_timeout(self.circuit_timeout)
            .with_half_open_max(self.circuit_half_open_max)
    }

    /// Retry configuration for outbound HTTP calls.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.retry_max_retries,
            initial_delay: self.retry_initial_delay,
            max_delay: self.retry_max_delay,
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }

    /// Producer manager configuration.
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            url: self.broker_url.clone(),
            email_topic: self.email_topic.clone(),
            push_topic: self.push_topic.clone(),
        }
    }

    /// Email-topic consumer configuration.
    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            url: self.broker_url.clone(),
            topic: self.email_topic.clone(),
            group_id: self.group_id.clone(),
            prefetch: 10,
        }
    }

    /// PostgreSQL connection URL.
    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.postgres_user,
            self.postgres_password,
            self.postgres_host,
            self.postgres_port,
            self.postgres_db,
            self.postgres_sslmode,
        )
    }

    /// PostgreSQL connection URL with the password masked for logging.
    pub fn database_url_masked(&self) -> String {
        format!(
            "postgres://{}:***@{}:{}/{}?sslmode={}",
            self.postgres_user,
            self.postgres_host,
            self.postgres_port,
            self.postgres_db,
            self.postgres_sslmode,
        )
    }

    /// Redis connection URL.
    pub fn redis_url(&self) -> String {
        if self.redis_password.is_empty() {
            format!("redis://{}:{}/{}", self.redis_host, self.redis_port, self.redis_db)
        } else {
            format!(
                "redis://:{}@{}:{}/{}",
                self.redis_password, self.redis_host, self.redis_port, self.redis_db
            )
        }
    }

    /// Server socket address.
    pub fn server_addr(&self) -> Result<SocketAddr> {
        SocketAddr::from_str(&format!("0.0.0.0:{}", self.port)).context("invalid server address")
    }

    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }

        if self.log_format != "json" && self.log_format != "console" {
            anyhow::bail!("log_format must be json or console");
        }

        if self.postgres_max_conns == 0 {
            anyhow::bail!("postgres_max_conns must be greater than 0");
        }

        if self.circuit_max_failures == 0 {
            anyhow::bail!("circuit_max_failures must be greater than 0");
        }

        if self.retry_backoff_multiplier < 1.0 {
            anyhow::bail!("retry_backoff_multiplier must be at least 1.0");
        }

        if self.idempotency_ttl.is_zero() {
            anyhow::bail!("idempotency_ttl must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            read_timeout: default_io_timeout(),
            write_timeout: default_io_timeout(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            user_service_url: default_user_service_url(),
            user_service_timeout: default_service_timeout(),
            template_service_url: default_template_service_url(),
            template_service_timeout: default_service_timeout(),
            use_mock_services: default_use_mocks(),
            broker_url: default_broker_url(),
            email_topic: default_email_topic(),
            push_topic: default_push_topic(),
            group_id: default_group_id(),
            redis_host: default_redis_host(),
            redis_port: default_redis_port(),
            redis_password: String::new(),
            redis_db: 0,
            idempotency_ttl: default_idempotency_ttl(),
            postgres_host: default_postgres_host(),
            postgres_port: default_postgres_port(),
            postgres_user: default_postgres_user(),
            postgres_password: default_postgres_password(),
            postgres_db: default_postgres_db(),
            postgres_sslmode: default_postgres_sslmode(),
            postgres_max_conns: default_postgres_max_conns(),
            circuit_max_failures: default_circuit_max_failures(),
            circuit_timeout: default_circuit_timeout(),
            circuit_half_open_max: default_circuit_half_open_max(),
            retry_max_retries: default_retry_max_retries(),
            retry_initial_delay: default_retry_initial_delay(),
            retry_max_delay: default_retry_max_delay(),
            retry_backoff_multiplier: default_retry_backoff_multiplier(),
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            smtp_user: String::new(),
            smtp_pass: String::new(),
            email_from: default_email_from(),
            email_fallback_recipient: None,
            orchestrator_url: default_orchestrator_url(),
            smtp_retry_budget: default_smtp_retry_budget(),
        }
    }
}

/// Parses a duration literal: a number with an `ms`, `s`, `m`, or `h`
/// suffix, or a bare number of seconds.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    let (number, scale_ms) = if let Some(value) = text.strip_suffix("ms") {
        (value, 1.0)
    } else if let Some(value) = text.strip_suffix('s') {
        (value, 1_000.0)
    } else if let Some(value) = text.strip_suffix('m') {
        (value, 60_000.0)
    } else if let Some(value) = text.strip_suffix('h') {
        (value, 3_600_000.0)
    } else {
        (text, 1_000.0)
    };

    let number: f64 =
        number.trim().parse().map_err(|_| format!("invalid duration literal: {text}"))?;
    if number < 0.0 {
        return Err(format!("duration must be non-negative: {text}"));
    }

    Ok(Duration::from_secs_f64(number * scale_ms / 1_000.0))
}

fn format_duration(duration: &Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1_000 || millis % 1_000 != 0 {
        return format!("{millis}ms");
    }
    let secs = duration.as_secs();
    if secs % 3_600 == 0 {
        format!("{}h", secs / 3_600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

mod duration_literal {
    //! Serde adapter for duration literals (`500ms`, `10s`, `1m`).

    use std::time::Duration;

    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Literal {
            Seconds(u64),
            Text(String),
        }

        match Literal::deserialize(deserializer)? {
            Literal::Seconds(secs) => Ok(Duration::from_secs(secs)),
            Literal::Text(text) => super::parse_duration(&text).map_err(D::Error::custom),
        }
    }
}

mod flag {
    //! Serde adapter for booleans accepting `true|1` and `false|0`.

    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(*value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Flag {
            Bool(bool),
            Number(i64),
            Text(String),
        }

        match Flag::deserialize(deserializer)? {
            Flag::Bool(value) => Ok(value),
            Flag::Number(value) => Ok(value == 1),
            Flag::Text(text) => match text.as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" | "" => Ok(false),
                other => Err(D::Error::custom(format!("invalid boolean flag: {other}"))),
            },
        }
    }
}

fn default_port() -> u16 {
    8080
}

fn default_io_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_user_service_url() -> String {
    "http://user-service:8081".to_string()
}

fn default_template_service_url() -> String {
    "http://template-service:8082".to_string()
}

fn default_service_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_use_mocks() -> bool {
    true
}

fn default_broker_url() -> String {
    "amqp://localhost:5672/%2f".to_string()
}

fn default_email_topic() -> String {
    "email.queue".to_string()
}

fn default_push_topic() -> String {
    "push.queue".to_string()
}

fn default_group_id() -> String {
    "email-worker".to_string()
}

fn default_redis_host() -> String {
    "localhost".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_idempotency_ttl() -> Duration {
    Duration::from_secs(3600)
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_user() -> String {
    "postgres".to_string()
}

fn default_postgres_password() -> String {
    "postgres".to_string()
}

fn default_postgres_db() -> String {
    "herald".to_string()
}

fn default_postgres_sslmode() -> String {
    "disable".to_string()
}

fn default_postgres_max_conns() -> u32 {
    25
}

fn default_circuit_max_failures() -> u32 {
    5
}

fn default_circuit_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_circuit_half_open_max() -> u32 {
    3
}

fn default_retry_max_retries() -> u32 {
    3
}

fn default_retry_initial_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_retry_max_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_retry_backoff_multiplier() -> f64 {
    2.0
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_email_from() -> String {
    "no-reply@herald.local".to_string()
}

fn default_orchestrator_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_smtp_retry_budget() -> Duration {
    Duration::from_secs(300)
}

#[cfg(test)]
mod tests {
    //! Configuration loading tests using `figment::Jail` for isolation.
    //!
    //! Each test runs in its own sandboxed environment with isolated
    //! environment variables and file system, so tests can run in parallel
    //! without contaminating each other.

    use figment::Jail;

    use super::*;

    #[test]
    fn default_config_validates() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.port, 8080);
        assert_eq!(config.email_topic, "email.queue");
        assert_eq!(config.push_topic, "push.queue");
        assert_eq!(config.idempotency_ttl, Duration::from_secs(3600));
        assert!(config.use_mock_services);
    }

    #[test]
    fn env_overrides_apply() {
        Jail::expect_with(|jail| {
            jail.set_env("PORT", "9090");
            jail.set_env("LOG_FORMAT", "console");
            jail.set_env("READ_TIMEOUT", "30s");
            jail.set_env("USER_SERVICE_URL", "http://users.internal:8081");
            jail.set_env("EMAIL_TOPIC", "email.jobs");
            jail.set_env("POSTGRES_MAX_CONNS", "50");
            jail.set_env("CIRCUIT_TIMEOUT", "2m");
            jail.set_env("RETRY_INITIAL_DELAY", "250ms");

            let config = Config::load().expect("config should load with env overrides");

            assert_eq!(config.port, 9090);
            assert_eq!(config.log_format, "console");
            assert_eq!(config.read_timeout, Duration::from_secs(30));
            assert_eq!(config.user_service_url, "http://users.internal:8081");
            assert_eq!(config.email_topic, "email.jobs");
            assert_eq!(config.postgres_max_conns, 50);
            assert_eq!(config.circuit_timeout, Duration::from_secs(120));
            assert_eq!(config.retry_initial_delay, Duration::from_millis(250));

            Ok(())
        });
    }

    #[test]
    fn boolean_flag_accepts_one() {
        Jail::expect_with(|jail| {
            jail.set_env("USE_MOCK_SERVICES", "1");
            let config = Config::load().expect("config should load");
            assert!(config.use_mock_services);

            Ok(())
        });
    }

    #[test]
    fn boolean_flag_accepts_false() {
        Jail::expect_with(|jail| {
            jail.set_env("USE_MOCK_SERVICES", "false");
            let config = Config::load().expect("config should load");
            assert!(!config.use_mock_services);

            Ok(())
        });
    }

    #[test]
    fn config_file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                port = 8181
                log_format = "console"
                retry_max_retries = 5
                idempotency_ttl = "30m"
                "#,
            )?;

            let config = Config::load().expect("config should load from file");

            assert_eq!(config.port, 8181);
            assert_eq!(config.retry_max_retries, 5);
            assert_eq!(config.idempotency_ttl, Duration::from_secs(1800));

            Ok(())
        });
    }

    #[test]
    fn conversion_helpers_produce_subsystem_configs() {
        let config = Config::default();

        let breaker = config.breaker_config("user-service");
        assert_eq!(breaker.max_failures, 5);
        assert_eq!(breaker.timeout, Duration::from_secs(60));
        assert_eq!(breaker.half_open_max, 3);

        let retry = config.retry_config();
        assert_eq!(retry.max_retries, 3);
        assert_eq!(retry.initial_delay, Duration::from_millis(100));

        let manager = config.manager_config();
        assert_eq!(manager.email_topic, "email.queue");
        assert_eq!(manager.push_topic, "push.queue");

        let consumer = config.consumer_config();
        assert_eq!(consumer.topic, "email.queue");
        assert_eq!(consumer.group_id, "email-worker");
    }

    #[test]
    fn database_url_is_masked_for_logging() {
        let config = Config { postgres_password: "secret123".into(), ..Default::default() };

        assert!(config.database_url().contains("secret123"));
        let masked = config.database_url_masked();
        assert!(!masked.contains("secret123"));
        assert!(masked.contains("***"));
        assert!(masked.contains("herald"));
    }

    #[test]
    fn redis_url_includes_password_only_when_set() {
        let config = Config::default();
        assert_eq!(config.redis_url(), "redis://localhost:6379/0");

        let config = Config { redis_password: "hunter2".into(), ..Default::default() };
        assert_eq!(config.redis_url(), "redis://:hunter2@localhost:6379/0");
    }

    #[test]
    fn invalid_config_validation_fails() {
        let config = Config { port: 0, ..Default::default() };
        assert!(config.validate().is_err());

        let config = Config { log_format: "xml".into(), ..Default::default() };
        assert!(config.validate().is_err());

        let config = Config { postgres_max_conns: 0, ..Default::default() };
        assert!(config.validate().is_err());

        let config = Config { circuit_max_failures: 0, ..Default::default() };
        assert!(config.validate().is_err());

        let config = Config { retry_backoff_multiplier: 0.5, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn duration_literals_parse() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("15").unwrap(), Duration::from_secs(15));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));

        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("-3s").is_err());
    }

    #[test]
    fn duration_formatting_round_trips() {
        for literal in ["500ms", "10s", "5m", "2h"] {
            let parsed = parse_duration(literal).unwrap();
            assert_eq!(format_duration(&parsed), literal);
            assert_eq!(parse_duration(&format_duration(&parsed)).unwrap(), parsed);
        }
    }
}
