mod contributions;
mod events;

use super::models::{
    Contribution, ContributionDraft, ContributionId, ContributionStatus, LedgerEventRecord,
    StoryId,
};
use crate::error::CoreResult;
use rusqlite::Connection;

pub trait ContributionRepository {
    /// Inserts a record with a caller-chosen id. Fails with `DuplicateId`.
    fn insert(&self, record: &Contribution) -> CoreResult<()>;
    /// Inserts a draft under the next unused id.
    fn insert_next(&self, draft: &ContributionDraft) -> CoreResult<Contribution>;
    fn next_id(&self) -> CoreResult<ContributionId>;
    fn get(&self, id: ContributionId) -> CoreResult<Option<Contribution>>;
    fn list_for_story(&self, story_id: StoryId) -> CoreResult<Vec<Contribution>>;
    fn list_for_contributor(&self, contributor: &str) -> CoreResult<Vec<Contribution>>;
    /// Returns false when no row matched.
    fn increment_vote(&self, id: ContributionId, is_upvote: bool) -> CoreResult<bool>;
    fn set_status(&self, id: ContributionId, status: ContributionStatus) -> CoreResult<bool>;
}

pub trait EventRepository {
    fn append(&self, kind: &str, payload: &str, recorded_at: i64) -> CoreResult<i64>;
    fn list_all(&self) -> CoreResult<Vec<LedgerEventRecord>>;
    fn count(&self) -> CoreResult<usize>;
}

pub struct SqliteRepositories<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRepositories<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn contributions(&self) -> impl ContributionRepository + '_ {
        contributions::SqliteContributionRepository { conn: self.conn }
    }

    pub fn events(&self) -> impl EventRepository + '_ {
        events::SqliteEventRepository { conn: self.conn }
    }
}
