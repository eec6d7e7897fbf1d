//! Centralized configuration for api-server.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than at request time. `.env` is loaded by
//! `main` before this runs.

use axum::http::HeaderValue;
use domain::validate::looks_like_email;
use mailer::resend::{DEFAULT_API_URL, DEFAULT_FROM};
use mailer::smtp::{DEFAULT_FROM_NAME, DEFAULT_HOST, DEFAULT_PORT};
use mailer::{RecipientPolicy, ResendConfig, SmtpConfig, SmtpSecurity};
use mysql_adapter::{MysqlSettings, TlsMode};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Storage backend provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageProvider {
    /// In-memory storage (data lost on restart)
    Memory,
    /// SQLite file-based storage
    Sqlite,
    /// MySQL server (production)
    Mysql,
}

impl StorageProvider {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("memory") {
            Self::Memory
        } else if s.eq_ignore_ascii_case("sqlite") {
            Self::Sqlite
        } else {
            Self::Mysql
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Server configuration loaded from environment variables.
///
/// All fields are validated at construction time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 8080)
    pub port: u16,
    /// CORS allow origin (default: http://localhost:4200)
    pub cors_allow_origin: HeaderValue,
    pub storage_provider: StorageProvider,
    /// Present when `storage_provider` is MySQL.
    pub mysql: Option<MysqlSettings>,
    /// SQLite database path (when using sqlite storage)
    pub db_path: PathBuf,
    /// Upper bound for one insert transaction
    pub tx_timeout: Duration,
    pub log_format: LogFormat,
    pub resend: ResendConfig,
    pub smtp: SmtpConfig,
    pub recipients: RecipientPolicy,
    /// Per-backend email send timeout
    pub send_timeout: Duration,
    /// How long shutdown waits for in-flight notifications
    pub shutdown_grace: Duration,
}

fn is_truthy(v: &str) -> bool {
    matches!(v.to_lowercase().as_str(), "1" | "true" | "yes")
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// Fails fast on invalid configuration.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Config::from_env`], reading values through `get`. Empty
    /// values count as unset.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        // Port
        let port = parse_or(&get, "PORT", 8080u16)?;

        // CORS allow origin
        let cors_origin_str =
            get("CORS_ALLOW_ORIGIN").unwrap_or_else(|| "http://localhost:4200".into());
        let cors_allow_origin = HeaderValue::from_str(&cors_origin_str).map_err(|e| ConfigError {
            field: "CORS_ALLOW_ORIGIN",
            message: format!("Invalid header value '{}': {}", cors_origin_str, e),
        })?;

        // Storage provider
        let storage_provider =
            StorageProvider::from_str(&get("STORAGE_PROVIDER").unwrap_or_else(|| "mysql".into()));

        let tx_timeout = timeout_secs(&get, "DB_TX_TIMEOUT_SECS", 10)?;

        // MySQL connection, only required when it is the selected backend
        let mysql = if storage_provider == StorageProvider::Mysql {
            Some(mysql_settings(&get, tx_timeout)?)
        } else {
            None
        };

        // DB path (for sqlite)
        let db_path = PathBuf::from(get("DB_PATH").unwrap_or_else(|| "./data/contacts.db".into()));

        // Log format
        let log_format =
            LogFormat::from_str(&get("LOG_FORMAT").unwrap_or_else(|| "pretty".into()));

        // Email backends
        let resend = ResendConfig {
            api_key: get("RESEND_API_KEY"),
            from: get("RESEND_FROM_EMAIL").unwrap_or_else(|| DEFAULT_FROM.into()),
            api_url: get("RESEND_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into()),
        };

        let security = match get("SMTP_TLS") {
            None => SmtpSecurity::StartTls,
            Some(v) => SmtpSecurity::parse(&v).ok_or_else(|| ConfigError {
                field: "SMTP_TLS",
                message: format!("Expected starttls, tls or none, got '{}'", v),
            })?,
        };
        let smtp = SmtpConfig {
            host: get("SMTP_HOST").unwrap_or_else(|| DEFAULT_HOST.into()),
            port: parse_or(&get, "SMTP_PORT", DEFAULT_PORT)?,
            username: get("SMTP_USERNAME"),
            password: get("SMTP_PASSWORD"),
            from_email: get("SMTP_FROM_EMAIL"),
            from_name: get("SMTP_FROM_NAME").unwrap_or_else(|| DEFAULT_FROM_NAME.into()),
            security,
        };

        // Recipient policy
        let policy = get("NOTIFY_RECIPIENT_POLICY").unwrap_or_else(|| "admin".into());
        let recipients = if policy.eq_ignore_ascii_case("admin") {
            let addr = get("RECIPIENT_EMAIL").ok_or_else(|| ConfigError {
                field: "RECIPIENT_EMAIL",
                message: "Required when NOTIFY_RECIPIENT_POLICY=admin".into(),
            })?;
            if !looks_like_email(addr.trim()) {
                return Err(ConfigError {
                    field: "RECIPIENT_EMAIL",
                    message: format!("'{}' is not an email address", addr),
                });
            }
            RecipientPolicy::Admin(addr.trim().to_string())
        } else if policy.eq_ignore_ascii_case("submitter") {
            RecipientPolicy::Submitter
        } else {
            return Err(ConfigError {
                field: "NOTIFY_RECIPIENT_POLICY",
                message: format!("Expected admin or submitter, got '{}'", policy),
            });
        };

        let send_timeout = timeout_secs(&get, "NOTIFY_SEND_TIMEOUT_SECS", 20)?;
        let shutdown_grace = Duration::from_secs(parse_or(&get, "SHUTDOWN_GRACE_SECS", 15u64)?);

        Ok(Self {
            port,
            cors_allow_origin,
            storage_provider,
            mysql,
            db_path,
            tx_timeout,
            log_format,
            resend,
            smtp,
            recipients,
            send_timeout,
            shutdown_grace,
        })
    }

    /// Log warnings about insecure or incomplete configuration.
    pub fn warn_if_insecure(&self) {
        if self.cors_allow_origin == HeaderValue::from_static("*") {
            tracing::warn!(
                "CORS_ALLOW_ORIGIN=*: any origin may call the API and credentials are disabled."
            );
        }
        if self.storage_provider == StorageProvider::Memory {
            tracing::warn!("STORAGE_PROVIDER=memory: contacts are lost on restart.");
        }
        if let Some(mysql) = &self.mysql {
            match mysql.tls {
                TlsMode::Insecure => tracing::warn!(
                    "DB_TLS_INSECURE is set: MySQL server certificate is NOT verified. \
                     DO NOT USE IN PRODUCTION."
                ),
                TlsMode::Preferred => tracing::warn!(
                    "SQL_CERTIFICATE not set: MySQL TLS is opportunistic and unverified."
                ),
                TlsMode::Disabled => {
                    tracing::warn!("DB_TLS_DISABLE is set: MySQL traffic is unencrypted.")
                }
                TlsMode::VerifyCa { .. } => {}
            }
        }
        if self.resend.api_key.is_none() {
            tracing::warn!("RESEND_API_KEY not set: every notification goes through SMTP.");
        }
        let smtp_missing = [
            ("SMTP_USERNAME", self.smtp.username.is_none()),
            ("SMTP_PASSWORD", self.smtp.password.is_none()),
            ("SMTP_FROM_EMAIL", self.smtp.from_email.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, missing)| missing.then_some(name))
        .collect::<Vec<_>>();
        if !smtp_missing.is_empty() {
            tracing::warn!(
                missing = %smtp_missing.join(", "),
                "SMTP fallback is not configured."
            );
        }
    }
}

fn parse_or<T, G>(get: &G, field: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(field) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e| ConfigError {
            field,
            message: format!("Invalid value '{}': {}", raw, e),
        }),
    }
}

// A zero timeout would fail every transaction or send attempt.
fn timeout_secs<G>(get: &G, field: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match parse_or(get, field, default)? {
        0 => Err(ConfigError {
            field,
            message: "Must be at least 1 second".into(),
        }),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn mysql_settings<G>(get: &G, tx_timeout: Duration) -> Result<MysqlSettings, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let required = |field: &'static str| {
        get(field).ok_or_else(|| ConfigError {
            field,
            message: "Required when STORAGE_PROVIDER=mysql".into(),
        })
    };

    let tls = if let Some(pem) = get("SQL_CERTIFICATE") {
        TlsMode::verify_ca(&pem).map_err(|e| ConfigError {
            field: "SQL_CERTIFICATE",
            message: e.to_string(),
        })?
    } else if get("DB_TLS_INSECURE").is_some_and(|v| is_truthy(&v)) {
        TlsMode::Insecure
    } else if get("DB_TLS_DISABLE").is_some_and(|v| is_truthy(&v)) {
        TlsMode::Disabled
    } else {
        TlsMode::Preferred
    };

    Ok(MysqlSettings {
        host: required("DB_HOST")?,
        port: parse_or(get, "DB_PORT", 3306u16)?,
        user: required("DB_USER")?,
        password: get("DB_PASSWORD").unwrap_or_default(),
        database: required("DB_NAME")?,
        tls,
        max_connections: parse_or(get, "DB_MAX_CONNECTIONS", 10u32)?,
        acquire_timeout: tx_timeout,
        tx_timeout,
    })
}
