use serde::{Deserialize, Serialize};

pub type ContributionId = u64;
pub type StoryId = u64;
pub type RewardId = u64;
/// Base reward units. Never a float.
pub type Amount = u128;

/// `parent_id` value marking a contribution as a root.
pub const ROOT_PARENT: ContributionId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContributionStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ContributionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContributionStatus::Pending => "pending",
            ContributionStatus::Approved => "approved",
            ContributionStatus::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(ContributionStatus::Pending),
            "approved" => Some(ContributionStatus::Approved),
            "rejected" => Some(ContributionStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub id: ContributionId,
    pub story_id: StoryId,
    pub parent_id: ContributionId,
    pub contributor: String,
    pub content_ref: String,
    #[serde(default)]
    pub status: ContributionStatus,
    pub created_at: i64,
    #[serde(default)]
    pub upvotes: u64,
    #[serde(default)]
    pub downvotes: u64,
    #[serde(default)]
    pub is_branch: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_title: Option<String>,
}

impl Contribution {
    pub fn is_root(&self) -> bool {
        self.parent_id == ROOT_PARENT
    }

    /// Canonical sibling order: `created_at` ascending, then id.
    pub fn sibling_key(&self) -> (i64, ContributionId) {
        (self.created_at, self.id)
    }
}

/// A contribution before the store has assigned its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionDraft {
    pub story_id: StoryId,
    pub parent_id: ContributionId,
    pub contributor: String,
    pub content_ref: String,
    pub created_at: i64,
    pub is_branch: bool,
    pub branch_title: Option<String>,
}

impl ContributionDraft {
    pub fn into_contribution(self, id: ContributionId) -> Contribution {
        Contribution {
            id,
            story_id: self.story_id,
            parent_id: self.parent_id,
            contributor: self.contributor,
            content_ref: self.content_ref,
            status: ContributionStatus::Pending,
            created_at: self.created_at,
            upvotes: 0,
            downvotes: 0,
            is_branch: self.is_branch,
            branch_title: self.branch_title,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingReward {
    pub id: RewardId,
    pub contributor: String,
    pub amount: Amount,
    pub story_id: StoryId,
    pub contribution_id: ContributionId,
    pub timestamp: i64,
    pub claimed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEventRecord {
    pub sequence: i64,
    pub kind: String,
    pub payload: String,
    pub recorded_at: i64,
}
