//! Reward allocation and claim tracking.
//!
//! A calculation draws from a funding pool and records a [`PendingReward`]
//! in one step; a claim pays out through the [`FundsTransfer`] collaborator
//! and only then marks the reward claimed. Each reward sits behind its own
//! lock, so claims on the same id are serialised while claims on different
//! ids proceed independently.

pub mod policy;
pub mod pool;

pub use policy::{RewardPolicy, ViewWeighting};
pub use pool::{Draw, FundingPool, InsufficientPool, PoolId, PoolRegistry};

use crate::collaborators::FundsTransfer;
use crate::database::models::{Amount, ContributionId, PendingReward, RewardId, StoryId};
use crate::error::{CoreError, CoreResult, Entity};
use crate::store::ContributionStore;
use crate::utils::now_unix;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardAllocation {
    pub reward: PendingReward,
    pub pool: PoolId,
    /// Present only when the pool could not cover the computed amount.
    pub shortfall: Option<InsufficientPool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorStats {
    pub contributor: String,
    pub total_contributions: usize,
    /// Sum of claimed amounts; pending rewards are not counted.
    pub total_rewards_earned: Amount,
    pub total_upvotes: u64,
    /// Upvotes as a whole percentage of all votes received, 0 with no votes.
    pub average_rating: u32,
    pub last_contribution_time: Option<i64>,
}

#[derive(Debug)]
pub struct ClaimFailure {
    pub reward_id: RewardId,
    pub error: CoreError,
}

/// Outcome of [`RewardLedger::batch_claim`]. Claims are applied one at a
/// time; earlier successes stand when a later id fails. A reward that was
/// paid but not journaled is listed in both `claimed` and `failures`.
#[derive(Debug, Default)]
pub struct BatchClaimReport {
    pub claimed: Vec<PendingReward>,
    pub failures: Vec<ClaimFailure>,
}

impl BatchClaimReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn total_claimed(&self) -> Amount {
        self.claimed
            .iter()
            .fold(0, |sum: Amount, reward| sum.saturating_add(reward.amount))
    }
}

#[derive(Default)]
struct RewardBook {
    rewards: BTreeMap<RewardId, Arc<Mutex<PendingReward>>>,
    by_contributor: HashMap<String, Vec<RewardId>>,
}

impl RewardBook {
    fn insert(&mut self, reward: PendingReward) {
        self.by_contributor
            .entry(reward.contributor.clone())
            .or_default()
            .push(reward.id);
        self.rewards.insert(reward.id, Arc::new(Mutex::new(reward)));
    }

    fn cells_for(&self, contributor: &str) -> Vec<Arc<Mutex<PendingReward>>> {
        self.by_contributor
            .get(contributor)
            .into_iter()
            .flatten()
            .filter_map(|id| self.rewards.get(id).cloned())
            .collect()
    }
}

pub struct RewardLedger {
    store: Arc<dyn ContributionStore>,
    policy: RewardPolicy,
    pools: PoolRegistry,
    payouts: Arc<dyn FundsTransfer>,
    book: RwLock<RewardBook>,
    next_reward_id: AtomicU64,
}

impl RewardLedger {
    pub fn new(
        store: Arc<dyn ContributionStore>,
        policy: RewardPolicy,
        pools: PoolRegistry,
        payouts: Arc<dyn FundsTransfer>,
    ) -> Self {
        Self {
            store,
            policy,
            pools,
            payouts,
            book: RwLock::new(RewardBook::default()),
            next_reward_id: AtomicU64::new(1),
        }
    }

    pub fn fund_story_pool(&self, story_id: StoryId, amount: Amount) -> CoreResult<Amount> {
        let balance = self.pools.fund(PoolId::Story(story_id), amount)?;
        tracing::info!(story_id, amount = %amount, balance = %balance, "story pool funded");
        Ok(balance)
    }

    pub fn fund_platform_pool(&self, amount: Amount) -> CoreResult<Amount> {
        let balance = self.pools.fund(PoolId::Platform, amount)?;
        tracing::info!(amount = %amount, balance = %balance, "platform pool funded");
        Ok(balance)
    }

    pub fn fund(&self, pool: PoolId, amount: Amount) -> CoreResult<Amount> {
        match pool {
            PoolId::Platform => self.fund_platform_pool(amount),
            PoolId::Story(story_id) => self.fund_story_pool(story_id, amount),
        }
    }

    pub fn pool_balance(&self, pool: PoolId) -> CoreResult<Option<Amount>> {
        self.pools.balance(pool)
    }

    pub fn calculate_reward(
        &self,
        contribution_id: ContributionId,
        view_count: u64,
    ) -> CoreResult<RewardAllocation> {
        self.calculate_reward_at(contribution_id, view_count, now_unix())
    }

    pub fn calculate_reward_at(
        &self,
        contribution_id: ContributionId,
        view_count: u64,
        timestamp: i64,
    ) -> CoreResult<RewardAllocation> {
        self.calculate_reward_with(contribution_id, view_count, timestamp, |_| Ok(()))
    }

    /// Allocates a new reward for the contribution's current votes.
    ///
    /// Every call creates a fresh reward, even for identical inputs: each
    /// call is a separate engagement measurement. `record` runs while the
    /// pool is still locked; if it fails, neither the pool nor the book
    /// changes.
    pub fn calculate_reward_with<F>(
        &self,
        contribution_id: ContributionId,
        view_count: u64,
        timestamp: i64,
        record: F,
    ) -> CoreResult<RewardAllocation>
    where
        F: FnOnce(&PendingReward) -> CoreResult<()>,
    {
        let contribution = self.store.get(contribution_id)?;
        let requested =
            self.policy
                .naive_amount(contribution.upvotes, contribution.downvotes, view_count);
        let (pool_id, pool) = self.pools.pool_for(contribution.story_id)?;

        let allocation = pool.draw_with(requested, |draw| {
            let reward = PendingReward {
                id: self.allocate_reward_id()?,
                contributor: contribution.contributor.clone(),
                amount: draw.granted,
                story_id: contribution.story_id,
                contribution_id,
                timestamp,
                claimed: false,
            };
            record(&reward)?;
            self.book.write()?.insert(reward.clone());
            Ok(RewardAllocation {
                reward,
                pool: pool_id,
                shortfall: draw.was_clamped().then_some(InsufficientPool {
                    pool: pool_id,
                    requested: draw.requested,
                    granted: draw.granted,
                }),
            })
        })?;

        tracing::info!(
            reward_id = allocation.reward.id,
            contribution_id,
            view_count,
            pool = %pool_id,
            amount = %allocation.reward.amount,
            clamped = allocation.shortfall.is_some(),
            "reward calculated"
        );
        Ok(allocation)
    }

    pub fn claim(&self, reward_id: RewardId, claimant: &str) -> CoreResult<PendingReward> {
        self.claim_with(reward_id, claimant, |_| Ok(()))
    }

    /// Pays out and marks the reward claimed. The reward stays unclaimed if
    /// the transfer is not confirmed.
    ///
    /// `record` runs after the payout, with the reward still locked. A
    /// payout cannot be undone, so the reward stays claimed when `record`
    /// fails and the failure comes back as `ClaimNotJournaled`.
    pub fn claim_with<F>(
        &self,
        reward_id: RewardId,
        claimant: &str,
        record: F,
    ) -> CoreResult<PendingReward>
    where
        F: FnOnce(&PendingReward) -> CoreResult<()>,
    {
        let cell = self.reward_cell(reward_id)?;
        let mut reward = cell.lock()?;
        check_claimable(&reward, claimant)?;

        // Nothing to move for a zero allocation.
        if reward.amount > 0 {
            if let Err(failure) = self
                .payouts
                .transfer(reward.id, &reward.contributor, reward.amount)
            {
                tracing::warn!(reward_id, claimant, reason = %failure, "payout not confirmed");
                return Err(CoreError::PayoutNotConfirmed {
                    id: reward_id,
                    reason: failure.reason,
                });
            }
        }

        reward.claimed = true;
        let claimed = reward.clone();
        if let Err(error) = record(&claimed) {
            tracing::warn!(reward_id, claimant, error = %error, "claim paid but not journaled");
            return Err(CoreError::ClaimNotJournaled {
                id: reward_id,
                source: Box::new(error),
            });
        }
        tracing::info!(reward_id, claimant, amount = %claimed.amount, "reward claimed");
        Ok(claimed)
    }

    pub fn batch_claim(&self, reward_ids: &[RewardId], claimant: &str) -> BatchClaimReport {
        self.batch_claim_with(reward_ids, claimant, |_| Ok(()))
    }

    pub fn batch_claim_with<F>(
        &self,
        reward_ids: &[RewardId],
        claimant: &str,
        record: F,
    ) -> BatchClaimReport
    where
        F: Fn(&PendingReward) -> CoreResult<()>,
    {
        let mut report = BatchClaimReport::default();
        for &reward_id in reward_ids {
            match self.claim_with(reward_id, claimant, &record) {
                Ok(reward) => report.claimed.push(reward),
                Err(error) => {
                    if matches!(error, CoreError::ClaimNotJournaled { .. }) {
                        if let Ok(reward) = self.get_reward(reward_id) {
                            report.claimed.push(reward);
                        }
                    }
                    report.failures.push(ClaimFailure { reward_id, error });
                }
            }
        }
        if !report.is_complete() {
            tracing::warn!(
                claimant,
                claimed = report.claimed.len(),
                failed = report.failures.len(),
                "batch claim partially failed"
            );
        }
        report
    }

    pub fn get_reward(&self, reward_id: RewardId) -> CoreResult<PendingReward> {
        let cell = self.reward_cell(reward_id)?;
        let reward = cell.lock()?;
        Ok(reward.clone())
    }

    /// Every reward ever allocated to `contributor`, claimed or not, in id order.
    pub fn rewards_for(&self, contributor: &str) -> CoreResult<Vec<PendingReward>> {
        let cells = self.book.read()?.cells_for(contributor);
        let mut rewards = Vec::with_capacity(cells.len());
        for cell in cells {
            rewards.push(cell.lock()?.clone());
        }
        rewards.sort_by_key(|reward| reward.id);
        Ok(rewards)
    }

    pub fn get_claimable_amount(&self, contributor: &str) -> CoreResult<Amount> {
        Ok(self
            .rewards_for(contributor)?
            .iter()
            .filter(|reward| !reward.claimed)
            .fold(0, |sum: Amount, reward| sum.saturating_add(reward.amount)))
    }

    pub fn get_contributor_stats(&self, contributor: &str) -> CoreResult<ContributorStats> {
        let contributions = self.store.list_for_contributor(contributor)?;
        let total_upvotes: u64 = contributions.iter().map(|c| c.upvotes).sum();
        let total_downvotes: u64 = contributions.iter().map(|c| c.downvotes).sum();
        let total_votes = u128::from(total_upvotes) + u128::from(total_downvotes);
        let average_rating = if total_votes == 0 {
            0
        } else {
            (u128::from(total_upvotes) * 100 / total_votes) as u32
        };
        let total_rewards_earned = self
            .rewards_for(contributor)?
            .iter()
            .filter(|reward| reward.claimed)
            .fold(0, |sum: Amount, reward| sum.saturating_add(reward.amount));

        Ok(ContributorStats {
            contributor: contributor.to_string(),
            total_contributions: contributions.len(),
            total_rewards_earned,
            total_upvotes,
            average_rating,
            last_contribution_time: contributions.iter().map(|c| c.created_at).max(),
        })
    }

    /// Re-inserts a reward read back from the event journal, drawing its
    /// recorded amount again. No amount is recomputed.
    ///
    /// The reward must name an existing contribution with the same
    /// contributor and story, and its pool must still cover the full amount.
    pub fn restore_reward(&self, reward: PendingReward) -> CoreResult<()> {
        let contribution = self.store.get(reward.contribution_id)?;
        if contribution.contributor != reward.contributor
            || contribution.story_id != reward.story_id
        {
            return Err(CoreError::InvalidReward {
                id: reward.id,
                reason: format!(
                    "contribution {} belongs to {} in story {}",
                    contribution.id, contribution.contributor, contribution.story_id
                ),
            });
        }
        let next_id = reward.id.checked_add(1).ok_or(CoreError::IdSpaceExhausted {
            entity: Entity::Reward,
        })?;

        let (pool_id, pool) = self.pools.pool_for(reward.story_id)?;
        pool.draw_with(reward.amount, |draw| {
            if draw.was_clamped() {
                return Err(CoreError::InvalidReward {
                    id: reward.id,
                    reason: format!(
                        "pool {pool_id} covers {} of {}",
                        draw.granted, draw.requested
                    ),
                });
            }
            let mut book = self.book.write()?;
            if book.rewards.contains_key(&reward.id) {
                return Err(CoreError::DuplicateId {
                    entity: Entity::Reward,
                    id: reward.id,
                });
            }
            self.next_reward_id.fetch_max(next_id, Ordering::SeqCst);
            book.insert(reward);
            Ok(())
        })
    }

    /// Marks a journaled claim without paying out again.
    pub fn restore_claim(&self, reward_id: RewardId, claimant: &str) -> CoreResult<()> {
        let cell = self.reward_cell(reward_id)?;
        let mut reward = cell.lock()?;
        check_claimable(&reward, claimant)?;
        reward.claimed = true;
        Ok(())
    }

    fn allocate_reward_id(&self) -> CoreResult<RewardId> {
        self.next_reward_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| id.checked_add(1))
            .map_err(|_| CoreError::IdSpaceExhausted {
                entity: Entity::Reward,
            })
    }

    fn reward_cell(&self, reward_id: RewardId) -> CoreResult<Arc<Mutex<PendingReward>>> {
        self.book
            .read()?
            .rewards
            .get(&reward_id)
            .cloned()
            .ok_or_else(|| CoreError::reward_not_found(reward_id))
    }
}

fn check_claimable(reward: &PendingReward, claimant: &str) -> CoreResult<()> {
    if reward.claimed {
        return Err(CoreError::AlreadyClaimed { id: reward.id });
    }
    if reward.contributor != claimant {
        return Err(CoreError::UnauthorizedClaimant {
            id: reward.id,
            claimant: claimant.to_string(),
        });
    }
    Ok(())
}
