//! mysql-adapter — MySQL implementation of the ContactRepository port.
//!
//! Purpose
//! - Production persistence for the `contact_form` table (see `schema.sql`).
//! - Owns the connection pool. The pool is created once at startup and passed
//!   in; requests share it and each insert runs in its own transaction.
//!
//! TLS
//! - With a CA certificate (PEM text), connections use `VERIFY_CA`.
//! - `TlsMode::Insecure` encrypts without verifying the server certificate.
//!   It exists for managed databases in non-production setups and is logged
//!   loudly at startup.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use domain::{Contact, ContactId, ContactRepository, CoreError, NewContact, PersistStage};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlSslMode};
use tracing::{info, warn};

const INSERT_CONTACT: &str =
    "INSERT INTO contact_form (nom, email, phone, formation, message) VALUES (?, ?, ?, ?, ?)";

/// Errors raised while turning configuration into connect options.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DbConfigError {
    #[error("CA certificate is not PEM encoded")]
    InvalidCertificate,
    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

/// How the driver negotiates TLS with the server.
#[derive(Clone, PartialEq, Eq)]
pub enum TlsMode {
    /// Verify the server certificate against this CA bundle (PEM).
    VerifyCa { ca_pem: Vec<u8> },
    /// TLS required, certificate not verified. Non-production only.
    Insecure,
    /// Use TLS when the server offers it.
    Preferred,
    Disabled,
}

impl TlsMode {
    /// Build the verified mode from PEM text, rejecting obviously bad input.
    pub fn verify_ca(pem: &str) -> Result<Self, DbConfigError> {
        if !pem.contains("-----BEGIN CERTIFICATE-----") {
            return Err(DbConfigError::InvalidCertificate);
        }
        Ok(TlsMode::VerifyCa {
            ca_pem: pem.as_bytes().to_vec(),
        })
    }

    pub fn label(&self) -> &'static str {
        match self {
            TlsMode::VerifyCa { .. } => "verify-ca",
            TlsMode::Insecure => "insecure",
            TlsMode::Preferred => "preferred",
            TlsMode::Disabled => "disabled",
        }
    }

    fn ssl_mode(&self) -> MySqlSslMode {
        match self {
            TlsMode::VerifyCa { .. } => MySqlSslMode::VerifyCa,
            TlsMode::Insecure => MySqlSslMode::Required,
            TlsMode::Preferred => MySqlSslMode::Preferred,
            TlsMode::Disabled => MySqlSslMode::Disabled,
        }
    }
}

impl fmt::Debug for TlsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Connection and pool settings for the MySQL gateway.
#[derive(Clone)]
pub struct MysqlSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub tls: TlsMode,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// Upper bound for one insert transaction.
    pub tx_timeout: Duration,
}

impl fmt::Debug for MysqlSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MysqlSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("tls", &self.tls)
            .field("max_connections", &self.max_connections)
            .field("tx_timeout", &self.tx_timeout)
            .finish()
    }
}

impl MysqlSettings {
    pub fn validate(&self) -> Result<(), DbConfigError> {
        if self.host.is_empty() {
            return Err(DbConfigError::Missing("DB_HOST"));
        }
        if self.user.is_empty() {
            return Err(DbConfigError::Missing("DB_USER"));
        }
        if self.database.is_empty() {
            return Err(DbConfigError::Missing("DB_NAME"));
        }
        Ok(())
    }

    pub fn connect_options(&self) -> MySqlConnectOptions {
        let opts = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
            .ssl_mode(self.tls.ssl_mode());
        match &self.tls {
            TlsMode::VerifyCa { ca_pem } => opts.ssl_ca_from_pem(ca_pem.clone()),
            _ => opts,
        }
    }
}

/// MySQL-backed contact repository.
#[derive(Clone)]
pub struct MysqlContactRepo {
    pool: MySqlPool,
    tx_timeout: Duration,
}

impl MysqlContactRepo {
    /// Open the pool and check one connection. Called once at startup.
    pub async fn connect(settings: &MysqlSettings) -> Result<Self, CoreError> {
        settings
            .validate()
            .map_err(|e| CoreError::Repository(e.to_string()))?;
        if settings.tls == TlsMode::Insecure {
            warn!("MySQL TLS certificate verification is DISABLED. DO NOT USE IN PRODUCTION.");
        }
        info!(
            host = %settings.host,
            port = settings.port,
            user = %settings.user,
            tls = settings.tls.label(),
            "connecting to MySQL"
        );
        let pool = MySqlPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect_with(settings.connect_options())
            .await
            .map_err(|e| CoreError::Repository(format!("mysql connect: {e}")))?;
        info!("connected to MySQL");
        Ok(Self::from_pool(pool, settings.tx_timeout))
    }

    pub fn from_pool(pool: MySqlPool, tx_timeout: Duration) -> Self {
        Self { pool, tx_timeout }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    async fn insert_tx(&self, new: NewContact) -> Result<Contact, CoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CoreError::persistence(PersistStage::Begin, e))?;

        let res = sqlx::query(INSERT_CONTACT)
            .bind(&new.nom)
            .bind(&new.email)
            .bind(&new.phone)
            .bind(&new.formation)
            .bind(&new.message)
            .execute(&mut *tx)
            .await;
        let done = match res {
            Ok(done) => done,
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    warn!(err = %rb, "rollback after failed insert");
                }
                return Err(CoreError::persistence(PersistStage::Insert, e));
            }
        };

        let id = match i64::try_from(done.last_insert_id())
            .map_err(|e| e.to_string())
            .and_then(|raw| ContactId::new(raw).map_err(|e| e.to_string()))
        {
            Ok(id) => id,
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    warn!(err = %rb, "rollback after bad last insert id");
                }
                return Err(CoreError::persistence(PersistStage::LastInsertId, e));
            }
        };

        tx.commit()
            .await
            .map_err(|e| CoreError::persistence(PersistStage::Commit, e))?;
        Ok(Contact::stored(id, new))
    }
}

type ContactRow = (
    i64,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

#[async_trait]
impl ContactRepository for MysqlContactRepo {
    async fn insert(&self, new: NewContact) -> Result<Contact, CoreError> {
        // On timeout the transaction future is dropped; sqlx rolls back the
        // connection before returning it to the pool.
        match tokio::time::timeout(self.tx_timeout, self.insert_tx(new)).await {
            Ok(res) => res,
            Err(_) => Err(CoreError::Timeout(self.tx_timeout)),
        }
    }

    async fn get(&self, id: ContactId) -> Result<Option<Contact>, CoreError> {
        let row: Option<ContactRow> = sqlx::query_as(
            "SELECT CAST(id AS SIGNED), nom, email, phone, formation, message FROM contact_form WHERE id = ?",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::Repository(format!("mysql error: {e}")))?;

        let Some((raw_id, nom, email, phone, formation, message)) = row else {
            return Ok(None);
        };
        Ok(Some(Contact {
            id: ContactId::new(raw_id)?,
            nom: nom.unwrap_or_default(),
            email: email.unwrap_or_default(),
            phone: phone.unwrap_or_default(),
            formation: formation.unwrap_or_default(),
            message: message.unwrap_or_default(),
        }))
    }

    async fn count(&self) -> Result<u64, CoreError> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM contact_form")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CoreError::Repository(format!("mysql error: {e}")))?;
        Ok(n.max(0) as u64)
    }
}
