//! Fallback backend: authenticated SMTP submission with the CSV attached.
//!
//! Uses lettre's `AsyncSmtpTransport` on the tokio runtime. The transport is
//! built per send so a bad relay never poisons later attempts.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::content::ContactEmail;
use crate::error::MailerError;
use crate::EmailBackend;

pub const DEFAULT_HOST: &str = "smtp.gmail.com";
pub const DEFAULT_PORT: u16 = 587;
pub const DEFAULT_FROM_NAME: &str = "Formulaire de Contact";

/// Transport security for the SMTP connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SmtpSecurity {
    /// Plain connect, then upgrade with STARTTLS (port 587).
    StartTls,
    /// Implicit TLS (port 465).
    Tls,
    /// No TLS at all. Local relays such as Mailpit only.
    Plain,
}

impl SmtpSecurity {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "starttls" => Some(SmtpSecurity::StartTls),
            "tls" | "ssl" => Some(SmtpSecurity::Tls),
            "none" | "plain" => Some(SmtpSecurity::Plain),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_email: Option<String>,
    pub from_name: String,
    pub security: SmtpSecurity,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            from_email: None,
            from_name: DEFAULT_FROM_NAME.to_string(),
            security: SmtpSecurity::StartTls,
        }
    }
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("from_email", &self.from_email)
            .field("from_name", &self.from_name)
            .field("security", &self.security)
            .finish()
    }
}

pub struct SmtpBackend {
    config: SmtpConfig,
    timeout: Duration,
}

impl SmtpBackend {
    pub fn new(config: SmtpConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    /// Missing settings, named after their environment variables.
    pub fn missing_settings(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.config.username.as_deref().unwrap_or("").is_empty() {
            missing.push("SMTP_USERNAME");
        }
        if self.config.password.as_deref().unwrap_or("").is_empty() {
            missing.push("SMTP_PASSWORD");
        }
        if self.config.from_email.as_deref().unwrap_or("").is_empty() {
            missing.push("SMTP_FROM_EMAIL");
        }
        missing
    }

    pub fn build_message(&self, email: &ContactEmail) -> Result<Message, MailerError> {
        let from_email = self.config.from_email.as_deref().unwrap_or_default();
        let from = Mailbox::new(
            Some(self.config.from_name.clone()),
            from_email
                .parse()
                .map_err(|e| MailerError::InvalidAddress(format!("{from_email}: {e}")))?,
        );
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| MailerError::InvalidAddress(format!("{}: {e}", email.to)))?;
        let csv_type = ContentType::parse("text/csv; charset=utf-8")
            .map_err(|e| MailerError::Build(e.to_string()))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(email.subject.clone())
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::html(email.html_body.clone()))
                    .singlepart(
                        Attachment::new(email.attachment.filename.clone())
                            .body(email.attachment.content.clone(), csv_type),
                    ),
            )
            .map_err(|e| MailerError::Build(e.to_string()))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailerError> {
        let credentials = Credentials::new(
            self.config.username.clone().unwrap_or_default(),
            self.config.password.clone().unwrap_or_default(),
        );
        let builder = match self.config.security {
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)?
            }
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.host)?,
            SmtpSecurity::Plain => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.config.host)
            }
        };
        Ok(builder
            .port(self.config.port)
            .credentials(credentials)
            .timeout(Some(self.timeout))
            .build())
    }
}

#[async_trait]
impl EmailBackend for SmtpBackend {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn send(&self, email: &ContactEmail) -> Result<(), MailerError> {
        let missing = self.missing_settings();
        if !missing.is_empty() {
            return Err(MailerError::NotConfigured(format!(
                "missing {}",
                missing.join(", ")
            )));
        }
        let message = self.build_message(email)?;
        self.transport()?.send(message).await?;
        info!(to = %email.to, host = %self.config.host, "smtp email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::CsvAttachment;

    fn email() -> ContactEmail {
        ContactEmail {
            to: "admin@example.com".into(),
            subject: "Nouveau contact: Awa".into(),
            html_body: "<p>Awa</p>".into(),
            attachment: CsvAttachment {
                filename: "contact_42.csv".into(),
                content: b"ID,Nom,Email,Phone,Formation,Message\n42,Awa,,,,\n".to_vec(),
            },
        }
    }

    fn configured() -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".into(),
            username: Some("mailer".into()),
            password: Some("app-password".into()),
            from_email: Some("forms@example.com".into()),
            ..SmtpConfig::default()
        }
    }

    #[test]
    fn security_parsing() {
        assert_eq!(SmtpSecurity::parse("STARTTLS"), Some(SmtpSecurity::StartTls));
        assert_eq!(SmtpSecurity::parse("ssl"), Some(SmtpSecurity::Tls));
        assert_eq!(SmtpSecurity::parse("none"), Some(SmtpSecurity::Plain));
        assert_eq!(SmtpSecurity::parse("bogus"), None);
    }

    #[test]
    fn debug_hides_password() {
        let shown = format!("{:?}", configured());
        assert!(!shown.contains("app-password"));
        assert!(shown.contains("<redacted>"));
    }

    #[test]
    fn message_has_named_from_and_csv_attachment() {
        let backend = SmtpBackend::new(configured(), Duration::from_secs(5));
        let msg = backend.build_message(&email()).unwrap();
        let raw = String::from_utf8_lossy(&msg.formatted()).to_string();
        assert!(raw.contains("Formulaire de Contact"));
        assert!(raw.contains("<forms@example.com>"));
        assert!(raw.contains("admin@example.com"));
        assert!(raw.contains("Content-Type: text/html"));
        assert!(raw.contains("Content-Type: text/csv"));
        assert!(raw.contains("filename=\"contact_42.csv\""));
    }

    #[test]
    fn bad_recipient_is_rejected_before_sending() {
        let backend = SmtpBackend::new(configured(), Duration::from_secs(5));
        let mut e = email();
        e.to = "not an address".into();
        assert!(matches!(
            backend.build_message(&e),
            Err(MailerError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn missing_credentials_short_circuit() {
        let backend = SmtpBackend::new(SmtpConfig::default(), Duration::from_secs(5));
        assert_eq!(
            backend.missing_settings(),
            vec!["SMTP_USERNAME", "SMTP_PASSWORD", "SMTP_FROM_EMAIL"]
        );
        let err = backend.send(&email()).await.unwrap_err();
        match err {
            MailerError::NotConfigured(msg) => {
                assert_eq!(msg, "missing SMTP_USERNAME, SMTP_PASSWORD, SMTP_FROM_EMAIL")
            }
            other => panic!("expected NotConfigured, got {other:?}"),
        }
    }

    #[test]
    fn backend_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SmtpBackend>();
    }
}
