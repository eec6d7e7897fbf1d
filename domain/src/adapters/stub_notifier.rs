use std::sync::Mutex;

use async_trait::async_trait;

use crate::{Contact, ContactId, Notifier, NotifyError};

/// Notifier double that records which contacts it was asked about.
pub struct StubNotifier {
    fail: bool,
    calls: Mutex<Vec<ContactId>>,
}

impl StubNotifier {
    pub fn succeeding() -> Self {
        Self {
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always reports that both backends failed.
    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<ContactId> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for StubNotifier {
    async fn notify(&self, contact: &Contact) -> Result<(), NotifyError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(contact.id);
        }
        if self.fail {
            return Err(NotifyError::AllBackendsFailed {
                primary: Box::new(NotifyError::Transport {
                    backend: "stub-primary",
                    message: "unavailable".into(),
                }),
                fallback: Box::new(NotifyError::Transport {
                    backend: "stub-fallback",
                    message: "unavailable".into(),
                }),
            });
        }
        Ok(())
    }
}
