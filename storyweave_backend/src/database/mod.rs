pub mod models;
pub mod repositories;

use crate::config::StoryweavePaths;
use crate::error::CoreResult;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

pub(crate) const MIGRATIONS: &str = r#"
    PRAGMA journal_mode = WAL;
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS contributions (
        id INTEGER PRIMARY KEY,
        story_id INTEGER NOT NULL,
        parent_id INTEGER NOT NULL DEFAULT 0,
        contributor TEXT NOT NULL,
        content_ref TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        created_at INTEGER NOT NULL,
        upvotes INTEGER NOT NULL DEFAULT 0,
        downvotes INTEGER NOT NULL DEFAULT 0,
        is_branch INTEGER NOT NULL DEFAULT 0,
        branch_title TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_contributions_story ON contributions(story_id);
    CREATE INDEX IF NOT EXISTS idx_contributions_contributor ON contributions(contributor);

    CREATE TABLE IF NOT EXISTS ledger_events (
        sequence INTEGER PRIMARY KEY AUTOINCREMENT,
        kind TEXT NOT NULL,
        payload TEXT NOT NULL,
        recorded_at INTEGER NOT NULL
    );
"#;

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    newly_created: bool,
}

impl Database {
    pub fn connect(paths: &StoryweavePaths) -> CoreResult<Self> {
        let newly_created = !paths.db_path.exists();
        let conn = Connection::open(&paths.db_path)?;
        Ok(Self::from_connection(conn, newly_created))
    }

    pub fn open_in_memory() -> CoreResult<Self> {
        let db = Self::from_connection(Connection::open_in_memory()?, true);
        db.ensure_migrations()?;
        Ok(db)
    }

    pub fn from_connection(conn: Connection, newly_created: bool) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            newly_created,
        }
    }

    /// Applies the schema; returns whether the database file was fresh.
    pub fn ensure_migrations(&self) -> CoreResult<bool> {
        self.with_conn(|conn| {
            conn.execute_batch(MIGRATIONS)?;
            Ok(())
        })?;
        Ok(self.newly_created)
    }

    pub fn with_repositories<T, F>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(repositories::SqliteRepositories<'_>) -> CoreResult<T>,
    {
        self.with_conn(|conn| {
            let repos = repositories::SqliteRepositories::new(conn);
            f(repos)
        })
    }

    fn with_conn<T, F>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&Connection) -> CoreResult<T>,
    {
        let guard = self.conn.lock()?;
        f(&guard)
    }
}
