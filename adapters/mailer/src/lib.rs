//! mailer — email notification backends for stored contacts.
//!
//! Purpose
//! - `ResendBackend`: primary, the Resend HTTP API (HTML body).
//! - `SmtpBackend`: fallback, authenticated SMTP with the contact attached as
//!   `contact_<id>.csv`.
//! - `FallbackDispatcher`: implements the domain `Notifier` port by trying the
//!   primary once and the fallback once, each under a send timeout.
//!
//! Notes
//! - A backend missing its credentials fails with a configuration error
//!   before any network traffic.
//! - Nothing is retried or queued; failures are returned to the caller, which
//!   logs them.

use async_trait::async_trait;

pub mod content;
pub mod dispatcher;
pub mod error;
pub mod resend;
pub mod smtp;

pub use content::{ContactEmail, CsvAttachment};
pub use dispatcher::{FallbackDispatcher, RecipientPolicy};
pub use error::MailerError;
pub use resend::{ResendBackend, ResendConfig};
pub use smtp::{SmtpBackend, SmtpConfig, SmtpSecurity};

/// One way of delivering a [`ContactEmail`].
#[async_trait]
pub trait EmailBackend: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;
    async fn send(&self, email: &ContactEmail) -> Result<(), MailerError>;
}
