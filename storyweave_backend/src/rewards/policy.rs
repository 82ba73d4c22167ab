use crate::database::models::Amount;
use serde::{Deserialize, Serialize};

/// How the supplied view count scales a reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewWeighting {
    /// Factor equals the view count.
    Linear,
    /// Factor is `1 + floor(log2(views + 1))`.
    Logarithmic,
    /// Views are ignored.
    Flat,
}

impl ViewWeighting {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "linear" => Some(ViewWeighting::Linear),
            "log" | "logarithmic" => Some(ViewWeighting::Logarithmic),
            "flat" | "none" => Some(ViewWeighting::Flat),
            _ => None,
        }
    }

    pub fn factor(self, view_count: u64) -> Amount {
        match self {
            ViewWeighting::Linear => Amount::from(view_count),
            ViewWeighting::Logarithmic => 1 + Amount::from(view_count.saturating_add(1).ilog2()),
            ViewWeighting::Flat => 1,
        }
    }
}

/// `base_rate * max(upvotes - downvotes, 0) * view_factor`, saturating, so
/// the amount never falls as upvotes grow or rises as downvotes grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardPolicy {
    base_rate: Amount,
    view_weighting: ViewWeighting,
}

impl RewardPolicy {
    pub fn new(base_rate: Amount, view_weighting: ViewWeighting) -> Self {
        Self {
            base_rate,
            view_weighting,
        }
    }

    pub fn base_rate(&self) -> Amount {
        self.base_rate
    }

    pub fn naive_amount(&self, upvotes: u64, downvotes: u64, view_count: u64) -> Amount {
        let net = Amount::from(upvotes.saturating_sub(downvotes));
        self.base_rate
            .saturating_mul(net)
            .saturating_mul(self.view_weighting.factor(view_count))
    }
}
