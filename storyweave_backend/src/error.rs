use thiserror::Error;

/// What kind of record a lookup failed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Contribution,
    Reward,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entity::Contribution => f.write_str("contribution"),
            Entity::Reward => f.write_str("reward"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: u64 },
    #[error("duplicate {entity} id {id}")]
    DuplicateId { entity: Entity, id: u64 },
    #[error("contribution {id} is its own ancestor")]
    CyclicContributionGraph { id: u64 },
    #[error("reward {id} has already been claimed")]
    AlreadyClaimed { id: u64 },
    #[error("reward {id} does not belong to {claimant}")]
    UnauthorizedClaimant { id: u64, claimant: String },
    #[error("payout for reward {id} was not confirmed: {reason}")]
    PayoutNotConfirmed { id: u64, reason: String },
    #[error("invalid contribution: {0}")]
    InvalidContribution(String),
    #[error("reward {id} cannot be restored: {reason}")]
    InvalidReward { id: u64, reason: String },
    #[error("no {entity} ids left to assign")]
    IdSpaceExhausted { entity: Entity },
    /// The payout went through and the reward is claimed, but the claim
    /// event was not journaled.
    #[error("reward {id} was paid but its claim was not journaled: {source}")]
    ClaimNotJournaled {
        id: u64,
        #[source]
        source: Box<CoreError>,
    },
    #[error("sqlite error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("event codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("lock poisoned")]
    Poisoned,
}

impl CoreError {
    pub fn contribution_not_found(id: u64) -> Self {
        CoreError::NotFound {
            entity: Entity::Contribution,
            id,
        }
    }

    pub fn reward_not_found(id: u64) -> Self {
        CoreError::NotFound {
            entity: Entity::Reward,
            id,
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for CoreError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        CoreError::Poisoned
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
