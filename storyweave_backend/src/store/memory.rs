use super::ContributionStore;
use crate::database::models::{
    Contribution, ContributionDraft, ContributionId, ContributionStatus, StoryId,
};
use crate::error::{CoreError, CoreResult, Entity};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Immutable record plus the fields that may still change.
struct Entry {
    record: Contribution,
    upvotes: AtomicU64,
    downvotes: AtomicU64,
    status: Mutex<ContributionStatus>,
}

impl Entry {
    fn new(record: Contribution) -> Self {
        Self {
            upvotes: AtomicU64::new(record.upvotes),
            downvotes: AtomicU64::new(record.downvotes),
            status: Mutex::new(record.status),
            record,
        }
    }

    fn snapshot(&self) -> CoreResult<Contribution> {
        let mut record = self.record.clone();
        record.upvotes = self.upvotes.load(Ordering::Acquire);
        record.downvotes = self.downvotes.load(Ordering::Acquire);
        record.status = *self.status.lock()?;
        Ok(record)
    }
}

/// In-process store. The map lock is only taken for writes on insert; votes
/// touch nothing but the target contribution's counters.
#[derive(Default)]
pub struct MemoryContributionStore {
    entries: RwLock<BTreeMap<ContributionId, Arc<Entry>>>,
}

impl MemoryContributionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, id: ContributionId) -> CoreResult<Arc<Entry>> {
        self.entries
            .read()?
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::contribution_not_found(id))
    }

    fn collect<P>(&self, mut predicate: P) -> CoreResult<Vec<Contribution>>
    where
        P: FnMut(&Contribution) -> bool,
    {
        let entries = self.entries.read()?;
        let mut matched = Vec::new();
        for entry in entries.values() {
            if predicate(&entry.record) {
                matched.push(entry.snapshot()?);
            }
        }
        Ok(matched)
    }
}

impl ContributionStore for MemoryContributionStore {
    fn add(&self, contribution: Contribution) -> CoreResult<()> {
        let mut entries = self.entries.write()?;
        if entries.contains_key(&contribution.id) {
            return Err(CoreError::DuplicateId {
                entity: Entity::Contribution,
                id: contribution.id,
            });
        }
        entries.insert(contribution.id, Arc::new(Entry::new(contribution)));
        Ok(())
    }

    fn submit(&self, draft: ContributionDraft) -> CoreResult<Contribution> {
        let mut entries = self.entries.write()?;
        let id = id_after(entries.keys().next_back().copied())?;
        let record = draft.into_contribution(id);
        entries.insert(id, Arc::new(Entry::new(record.clone())));
        Ok(record)
    }

    fn next_id(&self) -> CoreResult<ContributionId> {
        id_after(self.entries.read()?.keys().next_back().copied())
    }

    fn get(&self, id: ContributionId) -> CoreResult<Contribution> {
        self.entry(id)?.snapshot()
    }

    fn list_for_story(&self, story_id: StoryId) -> CoreResult<Vec<Contribution>> {
        self.collect(|record| record.story_id == story_id)
    }

    fn list_for_contributor(&self, contributor: &str) -> CoreResult<Vec<Contribution>> {
        self.collect(|record| record.contributor == contributor)
    }

    fn record_vote(&self, id: ContributionId, is_upvote: bool) -> CoreResult<()> {
        let entry = self.entry(id)?;
        let counter = if is_upvote {
            &entry.upvotes
        } else {
            &entry.downvotes
        };
        counter.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn set_status(&self, id: ContributionId, status: ContributionStatus) -> CoreResult<()> {
        let entry = self.entry(id)?;
        *entry.status.lock()? = status;
        Ok(())
    }
}

fn id_after(last: Option<ContributionId>) -> CoreResult<ContributionId> {
    match last {
        None => Ok(1),
        Some(last) => last.checked_add(1).ok_or(CoreError::IdSpaceExhausted {
            entity: Entity::Contribution,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract_tests;

    #[test]
    fn memory_store_add_get_and_duplicates() {
        contract_tests::add_get_and_duplicates(&MemoryContributionStore::new());
    }

    #[test]
    fn memory_store_votes_and_status() {
        contract_tests::votes_and_status(&MemoryContributionStore::new());
    }

    #[test]
    fn memory_store_concurrent_votes() {
        contract_tests::concurrent_votes_are_not_lost(&MemoryContributionStore::new());
    }

    #[test]
    fn submitted_ids_skip_past_explicit_inserts() {
        let store = MemoryContributionStore::new();
        store
            .add(contract_tests::draft(1, 0).into_contribution(40))
            .unwrap();
        let next = store.submit(contract_tests::draft(1, 40)).unwrap();
        assert_eq!(next.id, 41);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn highest_possible_id_exhausts_submission() {
        let store = MemoryContributionStore::new();
        store
            .add(contract_tests::draft(1, 0).into_contribution(u64::MAX))
            .unwrap();
        assert!(matches!(
            store.submit(contract_tests::draft(1, 0)).unwrap_err(),
            CoreError::IdSpaceExhausted {
                entity: Entity::Contribution
            }
        ));
        assert!(matches!(
            store.next_id().unwrap_err(),
            CoreError::IdSpaceExhausted { .. }
        ));
        assert_eq!(store.len(), 1);
        store.record_vote(u64::MAX, true).unwrap();
    }
}
