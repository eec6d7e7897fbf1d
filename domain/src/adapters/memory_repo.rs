use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{Contact, ContactId, ContactRepository, CoreError, NewContact, PersistStage};

/// Transaction step at which [`InMemoryContactRepo`] simulates a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailPoint {
    Begin,
    Insert,
    Commit,
}

struct Table {
    rows: BTreeMap<i64, Contact>,
    // Like AUTO_INCREMENT, ids consumed by rolled-back inserts are not reused.
    next_id: i64,
}

/// Simple in-memory repository for tests and the `memory` storage provider.
/// A single mutex serializes inserts, so generated ids are unique.
pub struct InMemoryContactRepo {
    table: Mutex<Table>,
    fail_at: Mutex<Option<FailPoint>>,
}

impl InMemoryContactRepo {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table {
                rows: BTreeMap::new(),
                next_id: 1,
            }),
            fail_at: Mutex::new(None),
        }
    }

    /// Repository whose every insert fails at the given step.
    pub fn failing_at(point: FailPoint) -> Self {
        let repo = Self::new();
        repo.set_fail_point(Some(point));
        repo
    }

    pub fn set_fail_point(&self, point: Option<FailPoint>) {
        if let Ok(mut guard) = self.fail_at.lock() {
            *guard = point;
        }
    }

    fn fail_point(&self) -> Result<Option<FailPoint>, CoreError> {
        self.fail_at
            .lock()
            .map(|g| *g)
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))
    }
}

impl Default for InMemoryContactRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContactRepository for InMemoryContactRepo {
    async fn insert(&self, new: NewContact) -> Result<Contact, CoreError> {
        let fail_at = self.fail_point()?;
        if fail_at == Some(FailPoint::Begin) {
            return Err(CoreError::persistence(
                PersistStage::Begin,
                "simulated begin failure",
            ));
        }

        let mut table = self
            .table
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        if fail_at == Some(FailPoint::Insert) {
            return Err(CoreError::persistence(
                PersistStage::Insert,
                "simulated insert failure",
            ));
        }

        let id = ContactId::new(table.next_id)?;
        table.next_id += 1;
        let staged = Contact::stored(id, new);

        if fail_at == Some(FailPoint::Commit) {
            // Rolled back: the staged row is dropped, the id stays consumed.
            return Err(CoreError::persistence(
                PersistStage::Commit,
                "simulated commit failure",
            ));
        }

        table.rows.insert(id.get(), staged.clone());
        Ok(staged)
    }

    async fn get(&self, id: ContactId) -> Result<Option<Contact>, CoreError> {
        let table = self
            .table
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        Ok(table.rows.get(&id.get()).cloned())
    }

    async fn count(&self) -> Result<u64, CoreError> {
        let table = self
            .table
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        Ok(table.rows.len() as u64)
    }
}
