use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex, MutexGuard},
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::error::{QueryContext, StorageError};
use super::migrations::run_migrations;

const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);
const JOURNAL_MODE: &str = "WAL";
const SYNCHRONOUS: &str = "NORMAL";

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Role {
    Writer,
    Reader,
}

impl Role {
    fn thread_name(self) -> &'static str {
        match self {
            Role::Writer => "cliphome-db-writer",
            Role::Reader => "cliphome-db-reader",
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// One dedicated thread owning one SQLite connection.
struct DbWorker {
    sender: Mutex<Option<mpsc::Sender<DbCommand>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DbWorker {
    fn spawn(path: &Path, role: Role) -> Result<Self, StorageError> {
        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), StorageError>>();
        let path_for_thread = path.to_path_buf();

        let handle = thread::Builder::new()
            .name(role.thread_name().into())
            .spawn(move || {
                let mut conn = match open_connection(&path_for_thread, role) {
                    Ok(conn) => conn,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                if ready_tx.send(Ok(())).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => task(&mut conn),
                        DbCommand::Shutdown => break,
                    }
                }

                info!("{} shutting down", role.thread_name());
            })
            .map_err(StorageError::Spawn)?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = handle.join();
                return Err(err);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(StorageError::WorkerGone);
            }
        }

        Ok(Self {
            sender: Mutex::new(Some(command_tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    async fn execute<F, T>(&self, task: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let sender = lock(&self.sender).clone().ok_or(StorageError::Closed)?;
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                warn!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|_| StorageError::WorkerGone)?;

        reply_rx.await.map_err(|_| StorageError::WorkerGone)?
    }

    fn shutdown(&self) {
        let sender = lock(&self.sender).take();
        let handle = lock(&self.handle).take();

        if let Some(sender) = sender {
            // The worker may already be gone after a failed open; nothing to do then.
            let _ = sender.send(DbCommand::Shutdown);
        }
        if let Some(handle) = handle {
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

fn open_connection(path: &Path, role: Role) -> Result<Connection, StorageError> {
    let mut conn = Connection::open(path).map_err(|source| StorageError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    conn.busy_timeout(BUSY_TIMEOUT).op("set busy_timeout")?;
    let mode: String = conn
        .pragma_update_and_check(None, "journal_mode", JOURNAL_MODE, |row| row.get(0))
        .op("set journal_mode")?;
    if !mode.eq_ignore_ascii_case(JOURNAL_MODE) {
        warn!("SQLite refused WAL journal mode, running with '{mode}'");
    }
    conn.pragma_update(None, "synchronous", SYNCHRONOUS)
        .op("set synchronous")?;

    if role == Role::Writer {
        run_migrations(&mut conn)?;
    }

    Ok(conn)
}

struct DatabaseInner {
    writer: DbWorker,
    reader: DbWorker,
}

impl DatabaseInner {
    fn shutdown(&self) {
        self.reader.shutdown();
        self.writer.shutdown();
    }
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Handle to the history database.
///
/// Owns exactly two connections: a writer that also runs migrations, and a
/// reader so pagination is never queued behind capture writes. Clones share
/// the same workers.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    pub fn open(db_path: PathBuf) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| StorageError::Directory {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let writer = DbWorker::spawn(&db_path, Role::Writer)?;
        let reader = match DbWorker::spawn(&db_path, Role::Reader) {
            Ok(reader) => reader,
            Err(err) => {
                writer.shutdown();
                return Err(err);
            }
        };

        info!("Database initialized at {}", db_path.display());

        Ok(Self {
            inner: Arc::new(DatabaseInner { writer, reader }),
        })
    }

    /// Runs `task` on the writer connection.
    pub async fn execute<F, T>(&self, task: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        self.inner.writer.execute(task).await
    }

    /// Runs `task` on the reader connection.
    pub async fn query<F, T>(&self, task: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        self.inner.reader.execute(task).await
    }

    /// Stops both workers. Safe to call more than once; later operations on
    /// any clone fail with [`StorageError::Closed`].
    pub fn close(&self) {
        self.inner.shutdown();
    }
}
