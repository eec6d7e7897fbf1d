use domain::NotifyError;

/// Errors local to the mail backends. Mapped into [`NotifyError`] at the
/// dispatcher boundary.
#[derive(Debug, thiserror::Error)]
pub enum MailerError {
    #[error("{0}")]
    NotConfigured(String),
    #[error("invalid address {0}")]
    InvalidAddress(String),
    #[error("could not build message: {0}")]
    Build(String),
    #[error("csv generation failed: {0}")]
    Csv(String),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("api returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

impl MailerError {
    /// Attribute this error to a backend.
    pub fn into_notify(self, backend: &'static str) -> NotifyError {
        match self {
            MailerError::NotConfigured(message) => NotifyError::Configuration { backend, message },
            other => NotifyError::Transport {
                backend,
                message: other.to_string(),
            },
        }
    }
}
