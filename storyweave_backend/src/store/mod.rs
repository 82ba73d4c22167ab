//! Flat contribution records, scoped by story.
//!
//! Two backings share the [`ContributionStore`] contract: an in-process map
//! whose vote counters are per-contribution atomics, and the SQLite
//! repositories under [`crate::database`].

mod memory;
mod sqlite;

pub use memory::MemoryContributionStore;
pub use sqlite::SqliteContributionStore;

use crate::database::models::{
    Contribution, ContributionDraft, ContributionId, ContributionStatus, StoryId,
};
use crate::error::CoreResult;

pub trait ContributionStore: Send + Sync {
    /// Inserts a record exactly as given. Fails with `DuplicateId`.
    fn add(&self, contribution: Contribution) -> CoreResult<()>;
    /// Assigns the next id to `draft` and inserts it.
    fn submit(&self, draft: ContributionDraft) -> CoreResult<Contribution>;
    /// The id the next `submit` would assign, if no other writer gets there first.
    fn next_id(&self) -> CoreResult<ContributionId>;
    fn get(&self, id: ContributionId) -> CoreResult<Contribution>;
    /// Records with a matching `story_id`, in no particular order.
    fn list_for_story(&self, story_id: StoryId) -> CoreResult<Vec<Contribution>>;
    fn list_for_contributor(&self, contributor: &str) -> CoreResult<Vec<Contribution>>;
    /// Adds one up- or downvote. Concurrent voters never lose increments.
    fn record_vote(&self, id: ContributionId, is_upvote: bool) -> CoreResult<()>;
    fn set_status(&self, id: ContributionId, status: ContributionStatus) -> CoreResult<()>;
}

#[cfg(test)]
pub(crate) mod contract_tests {
    //! Shared assertions run against every store backing.

    use super::*;
    use crate::error::CoreError;

    pub(crate) fn draft(story_id: StoryId, parent_id: ContributionId) -> ContributionDraft {
        ContributionDraft {
            story_id,
            parent_id,
            contributor: "alice".into(),
            content_ref: "blake3:feed".into(),
            created_at: 1_700_000_000,
            is_branch: false,
            branch_title: None,
        }
    }

    pub(crate) fn add_get_and_duplicates(store: &dyn ContributionStore) {
        assert_eq!(store.next_id().unwrap(), 1);
        let first = store.submit(draft(1, 0)).unwrap();
        assert_eq!(store.next_id().unwrap(), first.id + 1);
        let child = store.submit(draft(1, first.id)).unwrap();
        assert!(child.id > first.id);
        assert_eq!(store.get(child.id).unwrap().parent_id, first.id);

        let err = store.add(first.clone()).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateId { .. }));
        assert!(matches!(
            store.get(999).unwrap_err(),
            CoreError::NotFound { id: 999, .. }
        ));

        store.submit(draft(2, 0)).unwrap();
        let mut story_one: Vec<_> = store
            .list_for_story(1)
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        story_one.sort_unstable();
        assert_eq!(story_one, vec![first.id, child.id]);
        assert_eq!(store.list_for_contributor("alice").unwrap().len(), 3);
        assert!(store.list_for_contributor("bob").unwrap().is_empty());
    }

    pub(crate) fn votes_and_status(store: &dyn ContributionStore) {
        let record = store.submit(draft(1, 0)).unwrap();
        store.record_vote(record.id, true).unwrap();
        store.record_vote(record.id, true).unwrap();
        store.record_vote(record.id, false).unwrap();
        store
            .set_status(record.id, ContributionStatus::Rejected)
            .unwrap();
        let fetched = store.get(record.id).unwrap();
        assert_eq!((fetched.upvotes, fetched.downvotes), (2, 1));
        assert_eq!(fetched.status, ContributionStatus::Rejected);

        assert!(matches!(
            store.record_vote(77, true).unwrap_err(),
            CoreError::NotFound { id: 77, .. }
        ));
        assert!(matches!(
            store
                .set_status(77, ContributionStatus::Approved)
                .unwrap_err(),
            CoreError::NotFound { id: 77, .. }
        ));
    }

    pub(crate) fn concurrent_votes_are_not_lost(store: &dyn ContributionStore) {
        let id = store.submit(draft(1, 0)).unwrap().id;
        std::thread::scope(|scope| {
            for worker in 0..8 {
                scope.spawn(move || {
                    for _ in 0..50 {
                        store.record_vote(id, worker % 2 == 0).unwrap();
                    }
                });
            }
        });
        let fetched = store.get(id).unwrap();
        assert_eq!(fetched.upvotes, 200);
        assert_eq!(fetched.downvotes, 200);
    }
}
