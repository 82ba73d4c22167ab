use crate::database::models::{Amount, StoryId};
use crate::error::CoreResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolId {
    Platform,
    Story(StoryId),
}

impl std::fmt::Display for PoolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolId::Platform => f.write_str("platform"),
            PoolId::Story(story_id) => write!(f, "story:{story_id}"),
        }
    }
}

/// Reported, never returned as a failure: the pool covered less than the
/// computed reward and the allocation was clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("pool {pool} covered {granted} of {requested}")]
pub struct InsufficientPool {
    pub pool: PoolId,
    pub requested: Amount,
    pub granted: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Draw {
    pub requested: Amount,
    pub granted: Amount,
}

impl Draw {
    pub fn was_clamped(&self) -> bool {
        self.granted < self.requested
    }
}

/// One shared balance. Every decrement goes through [`FundingPool::draw_with`].
#[derive(Debug, Default)]
pub struct FundingPool {
    balance: Mutex<Amount>,
}

impl FundingPool {
    pub fn new(initial: Amount) -> Self {
        Self {
            balance: Mutex::new(initial),
        }
    }

    pub fn balance(&self) -> CoreResult<Amount> {
        Ok(*self.balance.lock()?)
    }

    pub fn deposit(&self, amount: Amount) -> CoreResult<Amount> {
        let mut balance = self.balance.lock()?;
        *balance = balance.saturating_add(amount);
        Ok(*balance)
    }

    /// Grants `min(requested, balance)` and runs `commit` with the balance
    /// still locked. The balance is only reduced if `commit` succeeds.
    pub fn draw_with<T, F>(&self, requested: Amount, commit: F) -> CoreResult<T>
    where
        F: FnOnce(Draw) -> CoreResult<T>,
    {
        let mut balance = self.balance.lock()?;
        let draw = Draw {
            requested,
            granted: requested.min(*balance),
        };
        let outcome = commit(draw)?;
        *balance -= draw.granted;
        Ok(outcome)
    }

    pub fn draw(&self, requested: Amount) -> CoreResult<Draw> {
        self.draw_with(requested, Ok)
    }
}

/// Story pools plus the platform-wide fallback. A story draws from its own
/// pool once one has been funded, otherwise from the platform pool.
#[derive(Debug)]
pub struct PoolRegistry {
    platform: Arc<FundingPool>,
    stories: RwLock<HashMap<StoryId, Arc<FundingPool>>>,
}

impl PoolRegistry {
    pub fn new(platform_balance: Amount) -> Self {
        Self {
            platform: Arc::new(FundingPool::new(platform_balance)),
            stories: RwLock::new(HashMap::new()),
        }
    }

    pub fn pool_for(&self, story_id: StoryId) -> CoreResult<(PoolId, Arc<FundingPool>)> {
        let stories = self.stories.read()?;
        Ok(match stories.get(&story_id) {
            Some(pool) => (PoolId::Story(story_id), Arc::clone(pool)),
            None => (PoolId::Platform, Arc::clone(&self.platform)),
        })
    }

    /// Adds `amount` to a pool, creating the story pool on first funding.
    pub fn fund(&self, pool: PoolId, amount: Amount) -> CoreResult<Amount> {
        match pool {
            PoolId::Platform => self.platform.deposit(amount),
            PoolId::Story(story_id) => {
                let target = Arc::clone(
                    self.stories
                        .write()?
                        .entry(story_id)
                        .or_insert_with(|| Arc::new(FundingPool::default())),
                );
                target.deposit(amount)
            }
        }
    }

    /// Balance of `pool`; `None` for a story that has no dedicated pool.
    pub fn balance(&self, pool: PoolId) -> CoreResult<Option<Amount>> {
        match pool {
            PoolId::Platform => self.platform.balance().map(Some),
            PoolId::Story(story_id) => match self.stories.read()?.get(&story_id) {
                Some(pool) => pool.balance().map(Some),
                None => Ok(None),
            },
        }
    }
}
