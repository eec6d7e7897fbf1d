//! sqlite-adapter — SQLite implementation of the ContactRepository port for local/dev.
//!
//! Purpose
//! - Provide a lightweight, file-based `contact_form` table to run the service
//!   locally without a MySQL server.
//! - Implements the `ContactRepository` trait from the `domain` crate with the
//!   same transaction contract as the MySQL adapter: one row on success, zero
//!   rows on any failure, bounded by a timeout.
//!
//! Notes
//! - Uses `rusqlite` with the `bundled` feature for portability.
//! - rusqlite is blocking, so every call runs on tokio's blocking pool behind
//!   a mutex-guarded connection.
//! - The tx timeout is enforced inside the blocking job through SQLite's busy
//!   timeout, and the job is always awaited. A reported failure therefore
//!   means nothing was committed.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use domain::{Contact, ContactId, ContactRepository, CoreError, NewContact, PersistStage};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::warn;

const DEFAULT_TX_TIMEOUT: Duration = Duration::from_secs(10);

/// SQLite-backed repository for local development.
pub struct SqliteContactRepo {
    conn: Arc<Mutex<Connection>>,
    tx_timeout: Duration,
}

impl SqliteContactRepo {
    /// Open (or create) a SQLite database at the given path and ensure schema.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(map_sqerr)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            tx_timeout: DEFAULT_TX_TIMEOUT,
        })
    }

    /// Like [`SqliteContactRepo::new`], creating missing parent directories first.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(map_sqerr)?;
        }
        Self::new(path)
    }

    /// Bound every transaction by `timeout`.
    pub fn with_tx_timeout(mut self, timeout: Duration) -> Self {
        self.tx_timeout = timeout;
        self
    }

    /// Run blocking work against the connection, bounded by the tx timeout.
    ///
    /// `f` receives the deadline. Lock waits inside SQLite give up once it
    /// passes, so the job finishes on its own and is awaited to completion.
    async fn run<T, F>(&self, f: F) -> Result<T, CoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, Instant) -> Result<T, CoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let timeout = self.tx_timeout;
        let deadline = Instant::now() + timeout;
        let job = tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(CoreError::Timeout(timeout));
            }
            guard.busy_timeout(remaining).map_err(map_sqerr)?;
            f(&mut guard, deadline)
        });
        job.await
            .map_err(|e| CoreError::Repository(format!("blocking task failed: {e}")))?
    }
}

fn init_schema(conn: &Connection) -> Result<(), CoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS contact_form (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            nom TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL DEFAULT '',
            phone TEXT NOT NULL DEFAULT '',
            formation TEXT NOT NULL DEFAULT '',
            message TEXT NOT NULL DEFAULT ''
        );
        "#,
    )
    .map_err(map_sqerr)
}

fn map_sqerr<E: std::fmt::Display>(e: E) -> CoreError {
    CoreError::Repository(format!("sqlite error: {e}"))
}

// A busy error means the lock wait ran out the busy timeout, which is the
// remaining budget.
fn step_error(
    stage: PersistStage,
    e: rusqlite::Error,
    deadline: Instant,
    timeout: Duration,
) -> CoreError {
    let busy = e.sqlite_error_code() == Some(ErrorCode::DatabaseBusy);
    if busy || Instant::now() >= deadline {
        warn!(stage = stage.as_str(), err = %e, "transaction ran out of time; rolling back");
        CoreError::Timeout(timeout)
    } else {
        CoreError::persistence(stage, e)
    }
}

// Dropping a rusqlite `Transaction` without committing rolls it back, so every
// early return below leaves the table untouched. That includes a failed COMMIT.
fn insert_tx(
    conn: &mut Connection,
    new: NewContact,
    deadline: Instant,
    timeout: Duration,
) -> Result<Contact, CoreError> {
    let tx = conn
        .transaction()
        .map_err(|e| step_error(PersistStage::Begin, e, deadline, timeout))?;
    tx.execute(
        "INSERT INTO contact_form (nom, email, phone, formation, message) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![new.nom, new.email, new.phone, new.formation, new.message],
    )
    .map_err(|e| step_error(PersistStage::Insert, e, deadline, timeout))?;
    let id = ContactId::new(tx.last_insert_rowid())
        .map_err(|e| CoreError::persistence(PersistStage::LastInsertId, e))?;

    if Instant::now() >= deadline {
        warn!(contact_id = %id, "deadline passed before commit; rolling back");
        return Err(CoreError::Timeout(timeout));
    }
    tx.commit()
        .map_err(|e| step_error(PersistStage::Commit, e, deadline, timeout))?;
    Ok(Contact::stored(id, new))
}

fn row_to_contact(row: &rusqlite::Row) -> rusqlite::Result<(i64, [String; 5])> {
    Ok((
        row.get(0)?,
        [row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?],
    ))
}

#[async_trait]
impl ContactRepository for SqliteContactRepo {
    async fn insert(&self, new: NewContact) -> Result<Contact, CoreError> {
        let timeout = self.tx_timeout;
        self.run(move |conn, deadline| insert_tx(conn, new, deadline, timeout))
            .await
    }

    async fn get(&self, id: ContactId) -> Result<Option<Contact>, CoreError> {
        let raw = self
            .run(move |conn, _| {
                conn.query_row(
                    "SELECT id, nom, email, phone, formation, message FROM contact_form WHERE id = ?1",
                    params![id.get()],
                    row_to_contact,
                )
                .optional()
                .map_err(map_sqerr)
            })
            .await?;
        let Some((raw_id, [nom, email, phone, formation, message])) = raw else {
            return Ok(None);
        };
        Ok(Some(Contact {
            id: ContactId::new(raw_id)?,
            nom,
            email,
            phone,
            formation,
            message,
        }))
    }

    async fn count(&self) -> Result<u64, CoreError> {
        self.run(|conn, _| {
            conn.query_row("SELECT COUNT(*) FROM contact_form", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as u64)
            .map_err(map_sqerr)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn tmp_db() -> (SqliteContactRepo, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        let repo = SqliteContactRepo::new(path).unwrap();
        (repo, dir)
    }

    fn sample(nom: &str) -> NewContact {
        NewContact {
            nom: nom.into(),
            email: "awa@example.com".into(),
            phone: "+225 07 00 00 00".into(),
            formation: "Marketing digital".into(),
            message: "Bonjour, \"devis\" svp".into(),
        }
    }

    #[tokio::test]
    async fn insert_get_roundtrip() {
        let (repo, _dir) = tmp_db();
        let created = repo.insert(sample("Awa")).await.unwrap();
        assert_eq!(created.id.get(), 1);
        let got = repo.get(created.id).await.unwrap().unwrap();
        assert_eq!(got, created);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn open_or_create_makes_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data").join("contacts.db");
        let repo = SqliteContactRepo::open_or_create(&path).unwrap();
        repo.insert(sample("Awa")).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn get_missing_is_none() {
        let (repo, _dir) = tmp_db();
        let got = repo.get(ContactId::new(99).unwrap()).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn failed_insert_rolls_back() {
        let (repo, _dir) = tmp_db();
        repo.insert(sample("ok")).await.unwrap();
        {
            let conn = repo.conn.lock().unwrap();
            conn.execute_batch(
                "CREATE TRIGGER reject_boom BEFORE INSERT ON contact_form
                 WHEN NEW.nom = 'boom'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();
        }
        let err = repo.insert(sample("boom")).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Persistence {
                stage: PersistStage::Insert,
                ..
            }
        ));
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn expired_deadline_never_commits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        let repo = SqliteContactRepo::new(&path)
            .unwrap()
            .with_tx_timeout(Duration::ZERO);
        let err = repo.insert(sample("late")).await.unwrap_err();
        assert!(matches!(err, CoreError::Timeout(_)));

        let reader = SqliteContactRepo::new(&path).unwrap();
        assert_eq!(reader.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn lock_contention_times_out_without_committing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        let repo = SqliteContactRepo::new(&path)
            .unwrap()
            .with_tx_timeout(Duration::from_millis(300));

        // An open read transaction holds a shared lock, so COMMIT cannot
        // take the exclusive lock until the reader finishes.
        let reader = Connection::open(&path).unwrap();
        reader.execute_batch("BEGIN").unwrap();
        let seen: i64 = reader
            .query_row("SELECT COUNT(*) FROM contact_form", [], |r| r.get(0))
            .unwrap();
        assert_eq!(seen, 0);
        let release = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(1));
            reader.execute_batch("COMMIT").unwrap();
        });

        let started = Instant::now();
        let err = repo.insert(sample("blocked")).await.unwrap_err();
        let elapsed = started.elapsed();
        assert!(matches!(err, CoreError::Timeout(_)), "got {err:?}");
        assert!(elapsed < Duration::from_millis(900), "took {elapsed:?}");

        // Once the lock is gone nothing shows up late.
        release.join().unwrap();
        assert_eq!(repo.count().await.unwrap(), 0);
        repo.insert(sample("after")).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inserts_get_distinct_ids() {
        let (repo, _dir) = tmp_db();
        let repo = Arc::new(repo);
        let mut handles = Vec::new();
        for i in 0..50 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                repo.insert(sample(&format!("c{i}"))).await
            }));
        }
        let mut ids = HashSet::new();
        for h in handles {
            ids.insert(h.await.unwrap().unwrap().id);
        }
        assert_eq!(ids.len(), 50);
        assert_eq!(repo.count().await.unwrap(), 50);
    }
}
