//! Interfaces to the systems the core calls out to but never implements:
//! content pinning, fund transfers and view analytics.

use crate::database::models::{Amount, ContributionId, RewardId};
use crate::error::CoreResult;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};
use thiserror::Error;

/// Stores opaque content and hands back a reference the core passes along.
pub trait ContentStorage: Send + Sync {
    fn store(&self, bytes: Bytes, content_type: &str) -> CoreResult<String>;
    fn fetch(&self, content_ref: &str) -> CoreResult<Option<Bytes>>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct PayoutFailure {
    pub reason: String,
}

impl PayoutFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Moves a claimed amount from the pool to the contributor. Anything but
/// `Ok` aborts the claim.
pub trait FundsTransfer: Send + Sync {
    fn transfer(
        &self,
        reward_id: RewardId,
        contributor: &str,
        amount: Amount,
    ) -> Result<(), PayoutFailure>;
}

/// Supplies engagement counts. Values are taken as given.
pub trait ViewCountSource: Send + Sync {
    fn view_count(&self, contribution_id: ContributionId) -> u64;
}

impl ViewCountSource for HashMap<ContributionId, u64> {
    fn view_count(&self, contribution_id: ContributionId) -> u64 {
        self.get(&contribution_id).copied().unwrap_or(0)
    }
}

/// Content-addressed in-process storage; refs are `blake3:<hex>`.
#[derive(Default)]
pub struct MemoryContentStorage {
    blobs: RwLock<HashMap<String, StoredContent>>,
}

#[derive(Clone)]
struct StoredContent {
    content_type: String,
    bytes: Bytes,
}

impl MemoryContentStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content_type(&self, content_ref: &str) -> CoreResult<Option<String>> {
        Ok(self
            .blobs
            .read()?
            .get(content_ref)
            .map(|stored| stored.content_type.clone()))
    }
}

impl ContentStorage for MemoryContentStorage {
    fn store(&self, bytes: Bytes, content_type: &str) -> CoreResult<String> {
        let content_ref = format!("blake3:{}", blake3::hash(&bytes).to_hex());
        self.blobs.write()?.insert(
            content_ref.clone(),
            StoredContent {
                content_type: content_type.to_string(),
                bytes,
            },
        );
        Ok(content_ref)
    }

    fn fetch(&self, content_ref: &str) -> CoreResult<Option<Bytes>> {
        Ok(self
            .blobs
            .read()?
            .get(content_ref)
            .map(|stored| stored.bytes.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub reward_id: RewardId,
    pub contributor: String,
    pub amount: Amount,
}

/// Transfer that only records what it was asked to pay. Can be switched to
/// refuse payouts, which is how hosts rehearse failure handling.
#[derive(Default)]
pub struct DryRunTransfer {
    payouts: Mutex<Vec<Payout>>,
    refusing: AtomicBool,
}

impl DryRunTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }

    pub fn payouts(&self) -> Vec<Payout> {
        self.payouts
            .lock()
            .map(|payouts| payouts.clone())
            .unwrap_or_default()
    }
}

impl FundsTransfer for DryRunTransfer {
    fn transfer(
        &self,
        reward_id: RewardId,
        contributor: &str,
        amount: Amount,
    ) -> Result<(), PayoutFailure> {
        if self.refusing.load(Ordering::SeqCst) {
            return Err(PayoutFailure::new("transfer refused"));
        }
        let mut payouts = self
            .payouts
            .lock()
            .map_err(|_| PayoutFailure::new("payout log poisoned"))?;
        payouts.push(Payout {
            reward_id,
            contributor: contributor.to_string(),
            amount,
        });
        tracing::info!(reward_id, contributor, amount = %amount, "dry-run payout recorded");
        Ok(())
    }
}
