use crate::database::models::LedgerEventRecord;
use crate::error::CoreResult;
use rusqlite::{params, Connection};

pub(super) struct SqliteEventRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

impl<'conn> super::EventRepository for SqliteEventRepository<'conn> {
    fn append(&self, kind: &str, payload: &str, recorded_at: i64) -> CoreResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO ledger_events (kind, payload, recorded_at)
            VALUES (?1, ?2, ?3)
            "#,
            params![kind, payload, recorded_at],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn list_all(&self) -> CoreResult<Vec<LedgerEventRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT sequence, kind, payload, recorded_at
            FROM ledger_events
            ORDER BY sequence ASC
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(LedgerEventRecord {
                sequence: row.get(0)?,
                kind: row.get(1)?,
                payload: row.get(2)?,
                recorded_at: row.get(3)?,
            })
        })?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    fn count(&self) -> CoreResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM ledger_events", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
