use std::sync::Arc;

use tracing::{error, info};

use crate::validate::normalize;
use crate::{Contact, ContactRepository, CoreError, NewContact, Notifier, TaskSpawner};

/// Application service orchestrating contact intake.
///
/// It remains generic over repository, notifier, and task spawner. A
/// submission is committed first; the notification is then handed to the
/// spawner and never awaited, so the caller's verdict only reflects
/// persistence.
pub struct ContactService<R: ContactRepository, N: Notifier + ?Sized, S: TaskSpawner> {
    repo: R,
    notifier: Arc<N>,
    spawner: S,
}

impl<R, N, S> ContactService<R, N, S>
where
    R: ContactRepository,
    N: Notifier + ?Sized + 'static,
    S: TaskSpawner,
{
    pub fn new(repo: R, notifier: Arc<N>, spawner: S) -> Self {
        Self {
            repo,
            notifier,
            spawner,
        }
    }

    /// Persist a submission and schedule its notification.
    pub async fn submit(&self, input: NewContact) -> Result<Contact, CoreError> {
        let contact = self.repo.insert(normalize(input)).await?;
        info!(contact_id = %contact.id, "contact committed");
        self.notify_detached(contact.clone());
        Ok(contact)
    }

    fn notify_detached(&self, contact: Contact) {
        let notifier = Arc::clone(&self.notifier);
        self.spawner.spawn(Box::pin(async move {
            match notifier.notify(&contact).await {
                Ok(()) => info!(contact_id = %contact.id, "notification sent"),
                Err(e) => error!(contact_id = %contact.id, err = %e, "notification failed"),
            }
        }));
    }

    /// Access the underlying repository (used by health checks and tests).
    pub fn repo(&self) -> &R {
        &self.repo
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_repo::{FailPoint, InMemoryContactRepo};
    use crate::adapters::spawner::CollectingSpawner;
    use crate::adapters::stub_notifier::StubNotifier;
    use crate::{ContactId, PersistStage};

    fn submission() -> NewContact {
        NewContact {
            nom: " Awa Koné ".into(),
            email: "awa@example.com".into(),
            phone: "0707070707".into(),
            formation: "Community management".into(),
            message: "Je souhaite m'inscrire".into(),
        }
    }

    #[tokio::test]
    async fn submit_commits_then_schedules_notification() {
        let notifier = Arc::new(StubNotifier::succeeding());
        let spawner = Arc::new(CollectingSpawner::new());
        let svc = ContactService::new(
            InMemoryContactRepo::new(),
            Arc::clone(&notifier),
            Arc::clone(&spawner),
        );

        let created = svc.submit(submission()).await.expect("stored");
        assert_eq!(created.id.get(), 1);
        assert_eq!(created.nom, "Awa Koné");
        assert_eq!(svc.repo().count().await.unwrap(), 1);

        // Nothing sent until the detached task runs.
        assert!(notifier.calls().is_empty());
        assert_eq!(spawner.pending(), 1);

        spawner.run_pending().await;
        assert_eq!(notifier.calls(), vec![created.id]);
    }

    #[tokio::test]
    async fn notification_failure_does_not_change_outcome() {
        let notifier = Arc::new(StubNotifier::failing());
        let spawner = Arc::new(CollectingSpawner::new());
        let svc = ContactService::new(
            InMemoryContactRepo::new(),
            Arc::clone(&notifier),
            Arc::clone(&spawner),
        );

        let created = svc.submit(submission()).await.expect("stored");
        spawner.run_pending().await;

        assert_eq!(notifier.calls().len(), 1);
        let stored = svc.repo().get(created.id).await.unwrap();
        assert_eq!(stored, Some(created));
    }

    #[tokio::test]
    async fn commit_failure_leaves_no_row_and_no_notification() {
        let notifier = Arc::new(StubNotifier::succeeding());
        let spawner = Arc::new(CollectingSpawner::new());
        let svc = ContactService::new(
            InMemoryContactRepo::failing_at(FailPoint::Commit),
            Arc::clone(&notifier),
            Arc::clone(&spawner),
        );

        let err = svc.submit(submission()).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Persistence {
                stage: PersistStage::Commit,
                ..
            }
        ));
        assert_eq!(svc.repo().count().await.unwrap(), 0);
        assert_eq!(spawner.pending(), 0);
        assert!(svc
            .repo()
            .get(ContactId::new(1).unwrap())
            .await
            .unwrap()
            .is_none());
    }
}
