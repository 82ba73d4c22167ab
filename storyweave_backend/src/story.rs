//! Host-facing service over the store, the ledger and the event journal.
//!
//! Every state change is journaled before it is applied, so a failed append
//! leaves nothing behind. Claims are the one exception: a payout cannot be
//! undone, so the claim event is written after the transfer and a failed
//! append surfaces as `ClaimNotJournaled`.

use crate::collaborators::{
    ContentStorage, FundsTransfer, MemoryContentStorage, ViewCountSource,
};
use crate::config::RewardConfig;
use crate::database::models::{
    Amount, Contribution, ContributionDraft, ContributionId, ContributionStatus, PendingReward,
    RewardId, StoryId, ROOT_PARENT,
};
use crate::error::{CoreError, CoreResult};
use crate::events::{EventJournal, LedgerEvent, MemoryEventJournal};
use crate::metrics::TreeMetrics;
use crate::rewards::{
    BatchClaimReport, ContributorStats, PoolId, PoolRegistry, RewardAllocation, RewardLedger,
};
use crate::store::{ContributionStore, MemoryContributionStore};
use crate::tree::{ContributionTreeBuilder, Forest};
use crate::utils::now_unix;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitContributionInput {
    pub story_id: StoryId,
    /// `0` starts a new root.
    #[serde(default)]
    pub parent_id: ContributionId,
    pub contributor: String,
    #[serde(default)]
    pub content_ref: String,
    pub created_at: Option<i64>,
    #[serde(default)]
    pub is_branch: bool,
    pub branch_title: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ReplaySummary {
    pub applied: usize,
    pub contributions: usize,
    pub rewards: usize,
    pub claims: usize,
}

/// Host-facing entry point: validates input, drives the store and the
/// ledger, and journals every committed transition.
#[derive(Clone)]
pub struct StoryService {
    store: Arc<dyn ContributionStore>,
    ledger: Arc<RewardLedger>,
    journal: Arc<dyn EventJournal>,
    content: Arc<dyn ContentStorage>,
    /// Held from id assignment to insert, and around status changes, so the
    /// journal order matches the order the store applies them in.
    writes: Arc<Mutex<()>>,
}

impl StoryService {
    pub fn new(
        store: Arc<dyn ContributionStore>,
        ledger: Arc<RewardLedger>,
        journal: Arc<dyn EventJournal>,
        content: Arc<dyn ContentStorage>,
    ) -> Self {
        Self {
            store,
            ledger,
            journal,
            content,
            writes: Arc::new(Mutex::new(())),
        }
    }

    /// Everything in process: memory store, memory journal, memory content.
    pub fn in_memory(rewards: &RewardConfig, payouts: Arc<dyn FundsTransfer>) -> Self {
        Self::with_journal(rewards, payouts, Arc::new(MemoryEventJournal::new()))
    }

    pub fn with_journal(
        rewards: &RewardConfig,
        payouts: Arc<dyn FundsTransfer>,
        journal: Arc<dyn EventJournal>,
    ) -> Self {
        let store: Arc<dyn ContributionStore> = Arc::new(MemoryContributionStore::new());
        let ledger = RewardLedger::new(
            Arc::clone(&store),
            rewards.policy(),
            PoolRegistry::new(rewards.platform_pool),
            payouts,
        );
        Self::new(
            store,
            Arc::new(ledger),
            journal,
            Arc::new(MemoryContentStorage::new()),
        )
    }

    pub fn store(&self) -> &Arc<dyn ContributionStore> {
        &self.store
    }

    pub fn ledger(&self) -> &Arc<RewardLedger> {
        &self.ledger
    }

    pub fn submit_contribution(&self, input: SubmitContributionInput) -> CoreResult<Contribution> {
        let draft = self.validate(input)?;
        let _gate = self.writes.lock()?;
        let contribution = draft.into_contribution(self.store.next_id()?);
        self.journal.append(&LedgerEvent::ContributionSubmitted {
            contribution: contribution.clone(),
        })?;
        self.store.add(contribution.clone())?;
        tracing::info!(
            contribution_id = contribution.id,
            story_id = contribution.story_id,
            parent_id = contribution.parent_id,
            contributor = %contribution.contributor,
            is_branch = contribution.is_branch,
            "contribution submitted"
        );
        Ok(contribution)
    }

    /// Stores `body` first and submits with the returned content reference.
    pub fn submit_with_content(
        &self,
        mut input: SubmitContributionInput,
        body: Bytes,
        content_type: &str,
    ) -> CoreResult<Contribution> {
        input.content_ref = self.content.store(body, content_type)?;
        self.submit_contribution(input)
    }

    pub fn fetch_content(&self, content_ref: &str) -> CoreResult<Option<Bytes>> {
        self.content.fetch(content_ref)
    }

    pub fn vote(&self, contribution_id: ContributionId, is_upvote: bool) -> CoreResult<()> {
        self.store.get(contribution_id)?;
        self.journal.append(&LedgerEvent::VoteRecorded {
            contribution_id,
            is_upvote,
        })?;
        self.store.record_vote(contribution_id, is_upvote)?;
        tracing::debug!(contribution_id, is_upvote, "vote recorded");
        Ok(())
    }

    pub fn set_status(
        &self,
        contribution_id: ContributionId,
        status: ContributionStatus,
    ) -> CoreResult<()> {
        let _gate = self.writes.lock()?;
        self.store.get(contribution_id)?;
        self.journal.append(&LedgerEvent::StatusChanged {
            contribution_id,
            status,
        })?;
        self.store.set_status(contribution_id, status)?;
        tracing::info!(contribution_id, status = status.as_str(), "status changed");
        Ok(())
    }

    pub fn fund_pool(&self, pool: PoolId, amount: Amount) -> CoreResult<Amount> {
        self.journal
            .append(&LedgerEvent::PoolFunded { pool, amount })?;
        self.ledger.fund(pool, amount)
    }

    pub fn calculate_reward(
        &self,
        contribution_id: ContributionId,
        view_count: u64,
    ) -> CoreResult<RewardAllocation> {
        self.ledger
            .calculate_reward_with(contribution_id, view_count, now_unix(), |reward| {
                self.journal.append(&LedgerEvent::RewardCalculated {
                    reward: reward.clone(),
                })?;
                Ok(())
            })
    }

    /// Same as [`StoryService::calculate_reward`] with the view count taken
    /// from an analytics source.
    pub fn calculate_reward_from(
        &self,
        contribution_id: ContributionId,
        views: &dyn ViewCountSource,
    ) -> CoreResult<RewardAllocation> {
        self.calculate_reward(contribution_id, views.view_count(contribution_id))
    }

    pub fn claim(&self, reward_id: RewardId, claimant: &str) -> CoreResult<PendingReward> {
        self.ledger
            .claim_with(reward_id, claimant, |reward| self.journal_claim(reward))
    }

    /// Claims each id in turn. A reward whose claim event could not be
    /// journaled is reported in both lists of the report.
    pub fn batch_claim(&self, reward_ids: &[RewardId], claimant: &str) -> BatchClaimReport {
        self.ledger
            .batch_claim_with(reward_ids, claimant, |reward| self.journal_claim(reward))
    }

    pub fn claimable_amount(&self, contributor: &str) -> CoreResult<Amount> {
        self.ledger.get_claimable_amount(contributor)
    }

    pub fn contributor_stats(&self, contributor: &str) -> CoreResult<ContributorStats> {
        self.ledger.get_contributor_stats(contributor)
    }

    pub fn story_forest(&self, story_id: StoryId) -> CoreResult<Forest> {
        ContributionTreeBuilder::build(self.store.list_for_story(story_id)?)
    }

    pub fn story_metrics(&self, story_id: StoryId) -> CoreResult<TreeMetrics> {
        Ok(TreeMetrics::from_forest(&self.story_forest(story_id)?))
    }

    /// Applies journaled events in order. Nothing is re-journaled, no payout
    /// runs and reward amounts are taken as recorded.
    pub fn replay<I>(&self, events: I) -> CoreResult<ReplaySummary>
    where
        I: IntoIterator<Item = LedgerEvent>,
    {
        let mut summary = ReplaySummary::default();
        for event in events {
            match event {
                LedgerEvent::ContributionSubmitted { contribution } => {
                    self.store.add(contribution)?;
                    summary.contributions += 1;
                }
                LedgerEvent::VoteRecorded {
                    contribution_id,
                    is_upvote,
                } => self.store.record_vote(contribution_id, is_upvote)?,
                LedgerEvent::StatusChanged {
                    contribution_id,
                    status,
                } => self.store.set_status(contribution_id, status)?,
                LedgerEvent::PoolFunded { pool, amount } => {
                    self.ledger.fund(pool, amount)?;
                }
                LedgerEvent::RewardCalculated { reward } => {
                    self.ledger.restore_reward(reward)?;
                    summary.rewards += 1;
                }
                LedgerEvent::RewardClaimed {
                    reward_id,
                    contributor,
                    ..
                } => {
                    self.ledger.restore_claim(reward_id, &contributor)?;
                    summary.claims += 1;
                }
            }
            summary.applied += 1;
        }
        tracing::info!(
            applied = summary.applied,
            contributions = summary.contributions,
            rewards = summary.rewards,
            claims = summary.claims,
            "replay finished"
        );
        Ok(summary)
    }

    fn journal_claim(&self, reward: &PendingReward) -> CoreResult<()> {
        self.journal.append(&LedgerEvent::RewardClaimed {
            reward_id: reward.id,
            contributor: reward.contributor.clone(),
            amount: reward.amount,
        })?;
        Ok(())
    }

    fn validate(&self, input: SubmitContributionInput) -> CoreResult<ContributionDraft> {
        if input.contributor.trim().is_empty() {
            return Err(CoreError::InvalidContribution(
                "contributor may not be empty".into(),
            ));
        }
        if input.parent_id != ROOT_PARENT {
            let parent = self.store.get(input.parent_id)?;
            if parent.story_id != input.story_id {
                return Err(CoreError::contribution_not_found(input.parent_id));
            }
        }
        let branch_title = if input.is_branch {
            match input.branch_title.as_deref().map(str::trim) {
                Some(title) if !title.is_empty() => Some(title.to_string()),
                _ => {
                    return Err(CoreError::InvalidContribution(
                        "a branch needs a title".into(),
                    ))
                }
            }
        } else {
            None
        };
        Ok(ContributionDraft {
            story_id: input.story_id,
            parent_id: input.parent_id,
            contributor: input.contributor,
            content_ref: input.content_ref,
            created_at: input.created_at.unwrap_or_else(now_unix),
            is_branch: input.is_branch,
            branch_title,
        })
    }
}
