//! Domain library for the contact intake service.
//!
//! This crate holds the domain types, ports (traits), and error definitions.
//! It only depends on `async-trait` for the async ports and `tracing` for the
//! detached notification task. Keep adapters and IO concerns out of this crate.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

/// Database-generated identifier of a stored contact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContactId(i64);

impl ContactId {
    /// Generated ids are always positive; zero means "not stored yet".
    pub fn new(raw: i64) -> Result<Self, CoreError> {
        if raw <= 0 {
            return Err(CoreError::InvalidId(raw));
        }
        Ok(Self(raw))
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl Display for ContactId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A submission accepted from the contact form, not yet persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewContact {
    pub nom: String,
    pub email: String,
    pub phone: String,
    pub formation: String,
    pub message: String,
}

/// A contact row that has been committed to storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contact {
    pub id: ContactId,
    pub nom: String,
    pub email: String,
    pub phone: String,
    pub formation: String,
    pub message: String,
}

impl Contact {
    /// Attach the generated id to a submission once its transaction committed.
    pub fn stored(id: ContactId, new: NewContact) -> Self {
        Self {
            id,
            nom: new.nom,
            email: new.email,
            phone: new.phone,
            formation: new.formation,
            message: new.message,
        }
    }
}

/// Persistence port. Implementations must write each submission inside its own
/// transaction and leave zero rows behind on any failure.
#[async_trait]
pub trait ContactRepository: Send + Sync {
    /// Insert one row, read the last-insert id, commit.
    async fn insert(&self, new: NewContact) -> Result<Contact, CoreError>;
    async fn get(&self, id: ContactId) -> Result<Option<Contact>, CoreError>;
    async fn count(&self) -> Result<u64, CoreError>;
}

/// Notification port: tell someone a contact was stored.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, contact: &Contact) -> Result<(), NotifyError>;
}

/// A detached unit of work handed to a [`TaskSpawner`].
pub type BoxTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Runs fire-and-forget work. Production spawns onto the runtime; tests
/// collect the tasks and drive them explicitly.
pub trait TaskSpawner: Send + Sync {
    fn spawn(&self, task: BoxTask);
}

impl<T: TaskSpawner + ?Sized> TaskSpawner for Arc<T> {
    fn spawn(&self, task: BoxTask) {
        (**self).spawn(task)
    }
}

#[async_trait]
impl<T: ContactRepository + ?Sized> ContactRepository for Arc<T> {
    async fn insert(&self, new: NewContact) -> Result<Contact, CoreError> {
        (**self).insert(new).await
    }

    async fn get(&self, id: ContactId) -> Result<Option<Contact>, CoreError> {
        (**self).get(id).await
    }

    async fn count(&self) -> Result<u64, CoreError> {
        (**self).count().await
    }
}

/// Step of the insert transaction that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PersistStage {
    Begin,
    Insert,
    LastInsertId,
    Commit,
}

impl PersistStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersistStage::Begin => "begin",
            PersistStage::Insert => "insert",
            PersistStage::LastInsertId => "last_insert_id",
            PersistStage::Commit => "commit",
        }
    }
}

/// Core domain errors (hand-written to keep this crate free of error crates).
#[derive(Debug)]
pub enum CoreError {
    InvalidId(i64),
    Persistence { stage: PersistStage, message: String },
    /// The transaction did not finish in time and was rolled back.
    Timeout(Duration),
    Repository(String),
}

impl CoreError {
    pub fn persistence(stage: PersistStage, err: impl Display) -> Self {
        CoreError::Persistence {
            stage,
            message: err.to_string(),
        }
    }
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::InvalidId(raw) => write!(f, "invalid contact id: {}", raw),
            CoreError::Persistence { stage, message } => {
                write!(f, "persistence failed at {}: {}", stage.as_str(), message)
            }
            CoreError::Timeout(after) => {
                write!(f, "transaction timed out after {}s", after.as_secs())
            }
            CoreError::Repository(msg) => write!(f, "repository error: {}", msg),
        }
    }
}

impl Error for CoreError {}

/// Notification failures. These are logged by the caller and never reach the
/// HTTP client.
#[derive(Debug)]
pub enum NotifyError {
    /// Backend is not configured; no network attempt was made.
    Configuration {
        backend: &'static str,
        message: String,
    },
    Transport {
        backend: &'static str,
        message: String,
    },
    Timeout {
        backend: &'static str,
        after: Duration,
    },
    AllBackendsFailed {
        primary: Box<NotifyError>,
        fallback: Box<NotifyError>,
    },
}

impl NotifyError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, NotifyError::Configuration { .. })
    }
}

impl Display for NotifyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyError::Configuration { backend, message } => {
                write!(f, "{} not configured: {}", backend, message)
            }
            NotifyError::Transport { backend, message } => {
                write!(f, "{} send failed: {}", backend, message)
            }
            NotifyError::Timeout { backend, after } => {
                write!(f, "{} send timed out after {}s", backend, after.as_secs())
            }
            NotifyError::AllBackendsFailed { primary, fallback } => {
                write!(
                    f,
                    "both methods failed (primary: {}; fallback: {})",
                    primary, fallback
                )
            }
        }
    }
}

impl Error for NotifyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            NotifyError::AllBackendsFailed { primary, .. } => Some(primary.as_ref()),
            _ => None,
        }
    }
}

pub mod adapters;
pub mod service;
pub mod validate;
