use std::time::Duration;

use async_trait::async_trait;
use domain::validate::looks_like_email;
use domain::{Contact, Notifier, NotifyError};
use tracing::{error, info, warn};

use crate::content::ContactEmail;
use crate::EmailBackend;

/// Who receives the notification for a stored contact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecipientPolicy {
    /// Notify a fixed administrator address.
    Admin(String),
    /// Acknowledge the submitter at the address they entered.
    Submitter,
}

impl RecipientPolicy {
    pub fn resolve(&self, contact: &Contact) -> Result<String, NotifyError> {
        match self {
            RecipientPolicy::Admin(addr) => Ok(addr.clone()),
            RecipientPolicy::Submitter if looks_like_email(&contact.email) => {
                Ok(contact.email.clone())
            }
            RecipientPolicy::Submitter => Err(NotifyError::Configuration {
                backend: "recipient",
                message: format!("submitter address {:?} is not usable", contact.email),
            }),
        }
    }
}

/// Sends through `primary`, then once through `fallback` if that failed.
/// Each attempt is bounded by `send_timeout`.
pub struct FallbackDispatcher<P: EmailBackend, F: EmailBackend> {
    primary: P,
    fallback: F,
    recipients: RecipientPolicy,
    send_timeout: Duration,
}

impl<P: EmailBackend, F: EmailBackend> FallbackDispatcher<P, F> {
    pub fn new(primary: P, fallback: F, recipients: RecipientPolicy, send_timeout: Duration) -> Self {
        Self {
            primary,
            fallback,
            recipients,
            send_timeout,
        }
    }

    async fn attempt<B: EmailBackend>(&self, backend: &B, email: &ContactEmail) -> Result<(), NotifyError> {
        match tokio::time::timeout(self.send_timeout, backend.send(email)).await {
            Ok(res) => res.map_err(|e| e.into_notify(backend.name())),
            Err(_) => Err(NotifyError::Timeout {
                backend: backend.name(),
                after: self.send_timeout,
            }),
        }
    }
}

#[async_trait]
impl<P: EmailBackend, F: EmailBackend> Notifier for FallbackDispatcher<P, F> {
    async fn notify(&self, contact: &Contact) -> Result<(), NotifyError> {
        let to = self.recipients.resolve(contact)?;
        let email = ContactEmail::for_contact(contact, to).map_err(|e| e.into_notify("content"))?;

        let primary_err = match self.attempt(&self.primary, &email).await {
            Ok(()) => {
                info!(contact_id = %contact.id, backend = self.primary.name(), "notification delivered");
                return Ok(());
            }
            Err(e) => e,
        };
        warn!(
            contact_id = %contact.id,
            backend = self.primary.name(),
            err = %primary_err,
            "primary email backend failed; trying fallback"
        );

        match self.attempt(&self.fallback, &email).await {
            Ok(()) => {
                info!(contact_id = %contact.id, backend = self.fallback.name(), "notification delivered");
                Ok(())
            }
            Err(fallback_err) => {
                error!(
                    contact_id = %contact.id,
                    backend = self.fallback.name(),
                    err = %fallback_err,
                    "fallback email backend failed"
                );
                Err(NotifyError::AllBackendsFailed {
                    primary: Box::new(primary_err),
                    fallback: Box::new(fallback_err),
                })
            }
        }
    }
}
