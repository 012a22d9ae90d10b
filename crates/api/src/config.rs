use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

use domain::services::{RetryPolicy, TemplateStyle};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    /// Bearer token verification
    pub jwt: JwtAuthConfig,
    /// Outbound e-mail
    #[serde(default)]
    pub email: EmailConfig,
    /// Notification dispatch workers and retry policy
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Allowed CORS origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl From<&DatabaseConfig> for persistence::db::DatabaseConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            url: config.url.clone(),
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            connect_timeout_secs: config.connect_timeout_secs,
            idle_timeout_secs: config.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    5
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}

/// Identity tokens are issued by an external provider; this service only
/// verifies them.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtAuthConfig {
    /// Provider's RSA public key in PEM format (RS256)
    #[serde(default)]
    pub public_key: String,

    /// Shared secret (HS256), for development and tests
    #[serde(default)]
    pub shared_secret: String,

    /// Expected `iss` claim; empty disables the check
    #[serde(default)]
    pub issuer: String,

    /// Leeway in seconds for clock skew tolerance (default: 30)
    #[serde(default = "default_jwt_leeway")]
    pub leeway_secs: u64,
}

fn default_jwt_leeway() -> u64 {
    30 // 30 seconds for clock skew tolerance
}

/// Email service configuration for invitation and join-request mail.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// Whether email sending is enabled
    #[serde(default)]
    pub enabled: bool,

    /// Email provider: sendgrid, or console (for development)
    #[serde(default = "default_email_provider")]
    pub provider: String,

    /// SendGrid API key (for sendgrid provider)
    #[serde(default)]
    pub sendgrid_api_key: String,

    /// SendGrid mail send endpoint
    #[serde(default = "default_sendgrid_url")]
    pub sendgrid_url: String,

    /// Sender email address (From header)
    #[serde(default = "default_sender_email")]
    pub sender_email: String,

    /// Sender name (From header)
    #[serde(default = "default_sender_name")]
    pub sender_name: String,

    /// Base URL for email links (e.g., https://app.example.com)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Email template style: html or text
    #[serde(default = "default_template_style")]
    pub template_style: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_email_provider(),
            sendgrid_api_key: String::new(),
            sendgrid_url: default_sendgrid_url(),
            sender_email: default_sender_email(),
            sender_name: default_sender_name(),
            base_url: default_base_url(),
            template_style: default_template_style(),
        }
    }
}

fn default_email_provider() -> String {
    "console".to_string() // Default to console logging for development
}

fn default_sendgrid_url() -> String {
    "https://api.sendgrid.com/v3/mail/send".to_string()
}

fn default_sender_email() -> String {
    "noreply@watchparty.app".to_string()
}

fn default_sender_name() -> String {
    "Watch Party".to_string()
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_template_style() -> String {
    "html".to_string()
}

/// Dispatch worker pool and retry settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Number of concurrent dispatch workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Jobs a worker delivers per pass
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Seconds between polls when no job was signalled
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Seconds a claimed job stays leased to one worker. Jobs are claimed
    /// one at a time, so this must outlast a single pass.
    #[serde(default = "default_lease")]
    pub lease_secs: u64,

    /// Timeout for a single e-mail send
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_backoff")]
    pub base_backoff_secs: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Random jitter added to each backoff, as a fraction of the delay
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,

    /// Days to keep delivery audit rows
    #[serde(default = "default_audit_retention_days")]
    pub audit_retention_days: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            batch_size: default_batch_size(),
            poll_interval_secs: default_poll_interval(),
            lease_secs: default_lease(),
            attempt_timeout_secs: default_attempt_timeout(),
            max_attempts: default_max_attempts(),
            base_backoff_secs: default_base_backoff(),
            max_backoff_secs: default_max_backoff(),
            jitter_ratio: default_jitter_ratio(),
            audit_retention_days: default_audit_retention_days(),
        }
    }
}

impl DispatchConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_secs(self.base_backoff_secs),
            max_delay: Duration::from_secs(self.max_backoff_secs),
            jitter_ratio: self.jitter_ratio,
        }
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn lease(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lease_secs as i64)
    }
}

fn default_workers() -> usize {
    4
}
fn default_batch_size() -> i64 {
    10
}
fn default_poll_interval() -> u64 {
    5
}
fn default_lease() -> u64 {
    60
}
fn default_attempt_timeout() -> u64 {
    10
}
fn default_max_attempts() -> u32 {
    5
}
fn default_base_backoff() -> u64 {
    30
}
fn default_max_backoff() -> u64 {
    3600
}
fn default_jitter_ratio() -> f64 {
    0.1
}
fn default_audit_retention_days() -> u32 {
    30
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with WP__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("WP").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration for testing with custom overrides.
    ///
    /// This method creates a config entirely from defaults and overrides,
    /// without relying on config files (which may not be accessible during tests).
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        // Embed defaults directly to avoid file system dependency in tests
        let defaults = r#"
            [server]
            host = "0.0.0.0"
            port = 8080
            request_timeout_secs = 30

            [database]
            url = ""
            max_connections = 20
            min_connections = 5
            connect_timeout_secs = 10
            idle_timeout_secs = 600

            [logging]
            level = "info"
            format = "json"

            [jwt]
            shared_secret = "test_secret_key_for_jwt_testing_12345"
            leeway_secs = 0

            [email]
            enabled = false
            provider = "console"
            sender_email = "test@example.com"
            sender_name = "Test"
            template_style = "text"

            [dispatch]
            workers = 1
            attempt_timeout_secs = 1
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        // Skip validation in tests to allow partial configs
        Ok(cfg)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        // Database URL is required
        if self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "WP__DATABASE__URL environment variable must be set".to_string(),
            ));
        }

        // Validate port range
        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        // Validate connection pool settings
        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        if self.jwt.public_key.is_empty() && self.jwt.shared_secret.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "WP__JWT__PUBLIC_KEY or WP__JWT__SHARED_SECRET must be set".to_string(),
            ));
        }

        if self.email.enabled
            && self.email.provider == "sendgrid"
            && self.email.sendgrid_api_key.is_empty()
        {
            return Err(ConfigValidationError::MissingRequired(
                "WP__EMAIL__SENDGRID_API_KEY is required for the sendgrid provider".to_string(),
            ));
        }

        if self.email.template_style.parse::<TemplateStyle>().is_err() {
            return Err(ConfigValidationError::InvalidValue(format!(
                "Unknown email template style: {}",
                self.email.template_style
            )));
        }

        let dispatch = &self.dispatch;
        if dispatch.workers == 0 || dispatch.batch_size <= 0 {
            return Err(ConfigValidationError::InvalidValue(
                "dispatch.workers and dispatch.batch_size must be positive".to_string(),
            ));
        }
        if dispatch.max_attempts == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "dispatch.max_attempts must be at least 1".to_string(),
            ));
        }
        if dispatch.base_backoff_secs > dispatch.max_backoff_secs {
            return Err(ConfigValidationError::InvalidValue(
                "dispatch.base_backoff_secs cannot exceed max_backoff_secs".to_string(),
            ));
        }
        if dispatch.lease_secs <= dispatch.attempt_timeout_secs {
            return Err(ConfigValidationError::InvalidValue(format!(
                "dispatch.lease_secs ({}) must exceed attempt_timeout_secs ({})",
                dispatch.lease_secs, dispatch.attempt_timeout_secs
            )));
        }
        if !(0.0..=1.0).contains(&dispatch.jitter_ratio) {
            return Err(ConfigValidationError::InvalidValue(
                "dispatch.jitter_ratio must be between 0 and 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }
}
