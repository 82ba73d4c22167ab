use crate::database::models::{
    Contribution, ContributionDraft, ContributionId, ContributionStatus, StoryId,
};
use crate::error::{CoreError, CoreResult, Entity};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use thiserror::Error;

pub(super) struct SqliteContributionRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, story_id, parent_id, contributor, content_ref, status, created_at,
           upvotes, downvotes, is_branch, branch_title
    FROM contributions
"#;

#[derive(Debug, Error)]
#[error("unknown contribution status {0:?}")]
struct UnknownStatus(String);

fn map_row(row: &Row<'_>) -> rusqlite::Result<Contribution> {
    let raw_status: String = row.get(5)?;
    let status = ContributionStatus::parse(&raw_status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            Type::Text,
            Box::new(UnknownStatus(raw_status.clone())),
        )
    })?;
    Ok(Contribution {
        id: row.get::<_, i64>(0)? as u64,
        story_id: row.get::<_, i64>(1)? as u64,
        parent_id: row.get::<_, i64>(2)? as u64,
        contributor: row.get(3)?,
        content_ref: row.get(4)?,
        status,
        created_at: row.get(6)?,
        upvotes: row.get::<_, i64>(7)? as u64,
        downvotes: row.get::<_, i64>(8)? as u64,
        is_branch: row.get(9)?,
        branch_title: row.get(10)?,
    })
}

impl<'conn> SqliteContributionRepository<'conn> {
    fn query_list(&self, filter: &str, param: &dyn rusqlite::ToSql) -> CoreResult<Vec<Contribution>> {
        let sql = format!("{SELECT_COLUMNS} WHERE {filter} ORDER BY id ASC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([param], map_row)?;
        let mut contributions = Vec::new();
        for row in rows {
            contributions.push(row?);
        }
        Ok(contributions)
    }
}

impl<'conn> super::ContributionRepository for SqliteContributionRepository<'conn> {
    fn insert(&self, record: &Contribution) -> CoreResult<()> {
        let inserted = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO contributions
                (id, story_id, parent_id, contributor, content_ref, status, created_at,
                 upvotes, downvotes, is_branch, branch_title)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                record.id as i64,
                record.story_id as i64,
                record.parent_id as i64,
                record.contributor,
                record.content_ref,
                record.status.as_str(),
                record.created_at,
                record.upvotes as i64,
                record.downvotes as i64,
                record.is_branch,
                record.branch_title,
            ],
        )?;
        if inserted == 0 {
            return Err(CoreError::DuplicateId {
                entity: Entity::Contribution,
                id: record.id,
            });
        }
        Ok(())
    }

    fn insert_next(&self, draft: &ContributionDraft) -> CoreResult<Contribution> {
        // ids continue from MAX(id), past any explicitly inserted record
        self.conn.execute(
            r#"
            INSERT INTO contributions
                (id, story_id, parent_id, contributor, content_ref, status, created_at,
                 is_branch, branch_title)
            VALUES ((SELECT COALESCE(MAX(id), 0) + 1 FROM contributions),
                    ?1, ?2, ?3, ?4, 'pending', ?5, ?6, ?7)
            "#,
            params![
                draft.story_id as i64,
                draft.parent_id as i64,
                draft.contributor,
                draft.content_ref,
                draft.created_at,
                draft.is_branch,
                draft.branch_title,
            ],
        )?;
        let id = self.conn.last_insert_rowid() as u64;
        Ok(draft.clone().into_contribution(id))
    }

    fn next_id(&self) -> CoreResult<ContributionId> {
        let next: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(id), 0) + 1 FROM contributions",
            [],
            |row| row.get(0),
        )?;
        Ok(next as u64)
    }

    fn get(&self, id: ContributionId) -> CoreResult<Option<Contribution>> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id as i64], map_row)
            .optional()?)
    }

    fn list_for_story(&self, story_id: StoryId) -> CoreResult<Vec<Contribution>> {
        self.query_list("story_id = ?1", &(story_id as i64))
    }

    fn list_for_contributor(&self, contributor: &str) -> CoreResult<Vec<Contribution>> {
        self.query_list("contributor = ?1", &contributor)
    }

    fn increment_vote(&self, id: ContributionId, is_upvote: bool) -> CoreResult<bool> {
        let sql = if is_upvote {
            "UPDATE contributions SET upvotes = upvotes + 1 WHERE id = ?1"
        } else {
            "UPDATE contributions SET downvotes = downvotes + 1 WHERE id = ?1"
        };
        let changed = self.conn.execute(sql, params![id as i64])?;
        Ok(changed > 0)
    }

    fn set_status(&self, id: ContributionId, status: ContributionStatus) -> CoreResult<bool> {
        let changed = self.conn.execute(
            "UPDATE contributions SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id as i64],
        )?;
        Ok(changed > 0)
    }
}
