use super::ContributionStore;
use crate::database::models::{
    Contribution, ContributionDraft, ContributionId, ContributionStatus, StoryId,
};
use crate::database::repositories::ContributionRepository;
use crate::database::Database;
use crate::error::{CoreError, CoreResult};

/// Store backed by the `contributions` table. Vote increments are single
/// `UPDATE .. SET x = x + 1` statements, so none are lost.
///
/// Every call goes through the one connection mutex held by [`Database`], so
/// votes are serialised across the whole store, not per contribution. Hosts
/// that need per-contribution vote throughput use
/// [`super::MemoryContributionStore`] in front of the journal instead.
#[derive(Clone)]
pub struct SqliteContributionStore {
    database: Database,
}

impl SqliteContributionStore {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

impl ContributionStore for SqliteContributionStore {
    fn add(&self, contribution: Contribution) -> CoreResult<()> {
        self.database
            .with_repositories(|repos| repos.contributions().insert(&contribution))
    }

    fn submit(&self, draft: ContributionDraft) -> CoreResult<Contribution> {
        self.database
            .with_repositories(|repos| repos.contributions().insert_next(&draft))
    }

    fn next_id(&self) -> CoreResult<ContributionId> {
        self.database
            .with_repositories(|repos| repos.contributions().next_id())
    }

    fn get(&self, id: ContributionId) -> CoreResult<Contribution> {
        self.database
            .with_repositories(|repos| repos.contributions().get(id))?
            .ok_or_else(|| CoreError::contribution_not_found(id))
    }

    fn list_for_story(&self, story_id: StoryId) -> CoreResult<Vec<Contribution>> {
        self.database
            .with_repositories(|repos| repos.contributions().list_for_story(story_id))
    }

    fn list_for_contributor(&self, contributor: &str) -> CoreResult<Vec<Contribution>> {
        self.database
            .with_repositories(|repos| repos.contributions().list_for_contributor(contributor))
    }

    fn record_vote(&self, id: ContributionId, is_upvote: bool) -> CoreResult<()> {
        let found = self
            .database
            .with_repositories(|repos| repos.contributions().increment_vote(id, is_upvote))?;
        if !found {
            return Err(CoreError::contribution_not_found(id));
        }
        Ok(())
    }

    fn set_status(&self, id: ContributionId, status: ContributionStatus) -> CoreResult<()> {
        let found = self
            .database
            .with_repositories(|repos| repos.contributions().set_status(id, status))?;
        if !found {
            return Err(CoreError::contribution_not_found(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract_tests;

    fn setup_store() -> SqliteContributionStore {
        SqliteContributionStore::new(Database::open_in_memory().expect("in-memory db"))
    }

    #[test]
    fn sqlite_store_add_get_and_duplicates() {
        contract_tests::add_get_and_duplicates(&setup_store());
    }

    #[test]
    fn sqlite_store_votes_and_status() {
        contract_tests::votes_and_status(&setup_store());
    }

    #[test]
    fn sqlite_store_concurrent_votes() {
        contract_tests::concurrent_votes_are_not_lost(&setup_store());
    }
}
