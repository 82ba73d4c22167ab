//! Typed ledger events and the journal they are appended to.
//!
//! One event is written per committed transition. Replaying the journal in
//! order rebuilds contribution and reward state without paying anything out
//! again.

use crate::database::models::{
    Amount, Contribution, ContributionId, ContributionStatus, PendingReward, RewardId,
};
use crate::database::repositories::EventRepository;
use crate::database::Database;
use crate::error::CoreResult;
use crate::rewards::PoolId;
use crate::utils::now_unix;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEvent {
    ContributionSubmitted {
        contribution: Contribution,
    },
    VoteRecorded {
        contribution_id: ContributionId,
        is_upvote: bool,
    },
    StatusChanged {
        contribution_id: ContributionId,
        status: ContributionStatus,
    },
    PoolFunded {
        pool: PoolId,
        amount: Amount,
    },
    RewardCalculated {
        reward: PendingReward,
    },
    RewardClaimed {
        reward_id: RewardId,
        contributor: String,
        amount: Amount,
    },
}

impl LedgerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerEvent::ContributionSubmitted { .. } => "contribution_submitted",
            LedgerEvent::VoteRecorded { .. } => "vote_recorded",
            LedgerEvent::StatusChanged { .. } => "status_changed",
            LedgerEvent::PoolFunded { .. } => "pool_funded",
            LedgerEvent::RewardCalculated { .. } => "reward_calculated",
            LedgerEvent::RewardClaimed { .. } => "reward_claimed",
        }
    }
}

pub trait EventJournal: Send + Sync {
    /// Appends one event and returns its sequence number.
    fn append(&self, event: &LedgerEvent) -> CoreResult<i64>;
    /// Every event, oldest first.
    fn load(&self) -> CoreResult<Vec<LedgerEvent>>;
}

/// Journal stored in the `ledger_events` table as JSON payloads.
#[derive(Clone)]
pub struct SqliteEventJournal {
    database: Database,
}

impl SqliteEventJournal {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub fn len(&self) -> CoreResult<usize> {
        self.database.with_repositories(|repos| repos.events().count())
    }

    pub fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl EventJournal for SqliteEventJournal {
    fn append(&self, event: &LedgerEvent) -> CoreResult<i64> {
        let payload = serde_json::to_string(event)?;
        self.database.with_repositories(|repos| {
            repos
                .events()
                .append(event.kind(), &payload, now_unix())
        })
    }

    fn load(&self) -> CoreResult<Vec<LedgerEvent>> {
        let records = self
            .database
            .with_repositories(|repos| repos.events().list_all())?;
        let mut events = Vec::with_capacity(records.len());
        for record in records {
            events.push(serde_json::from_str(&record.payload)?);
        }
        Ok(events)
    }
}

/// In-process journal for hosts that persist elsewhere, and for tests.
#[derive(Default)]
pub struct MemoryEventJournal {
    events: Mutex<Vec<LedgerEvent>>,
}

impl MemoryEventJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventJournal for MemoryEventJournal {
    fn append(&self, event: &LedgerEvent) -> CoreResult<i64> {
        let mut events = self.events.lock()?;
        events.push(event.clone());
        Ok(events.len() as i64)
    }

    fn load(&self) -> CoreResult<Vec<LedgerEvent>> {
        Ok(self.events.lock()?.clone())
    }
}
