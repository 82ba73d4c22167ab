use crate::database::models::Amount;
use crate::rewards::policy::{RewardPolicy, ViewWeighting};
use anyhow::{anyhow, Result};
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct StoryweaveConfig {
    pub paths: StoryweavePaths,
    pub rewards: RewardConfig,
}

impl StoryweaveConfig {
    pub fn from_env() -> Result<Self> {
        let paths = match env::var("STORYWEAVE_HOME") {
            Ok(raw) if !raw.trim().is_empty() => StoryweavePaths::from_base_dir(raw.trim())?,
            _ => StoryweavePaths::discover()?,
        };
        Ok(Self {
            paths,
            rewards: RewardConfig::from_env(),
        })
    }

    pub fn new(paths: StoryweavePaths, rewards: RewardConfig) -> Self {
        Self { paths, rewards }
    }
}

#[derive(Debug, Clone)]
pub struct RewardConfig {
    /// Base reward units paid per net upvote, before view weighting.
    pub base_rate: Amount,
    pub view_weighting: ViewWeighting,
    /// Balance the platform-wide fallback pool starts with.
    pub platform_pool: Amount,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            base_rate: 10,
            view_weighting: ViewWeighting::Logarithmic,
            platform_pool: 0,
        }
    }
}

impl RewardConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let base_rate = env::var("STORYWEAVE_BASE_RATE")
            .ok()
            .and_then(|raw| raw.trim().parse::<Amount>().ok())
            .unwrap_or(defaults.base_rate);
        let view_weighting = env::var("STORYWEAVE_VIEW_WEIGHTING")
            .ok()
            .and_then(|raw| ViewWeighting::parse(&raw))
            .unwrap_or(defaults.view_weighting);
        let platform_pool = env::var("STORYWEAVE_PLATFORM_POOL")
            .ok()
            .and_then(|raw| raw.trim().parse::<Amount>().ok())
            .unwrap_or(defaults.platform_pool);
        Self {
            base_rate,
            view_weighting,
            platform_pool,
        }
    }

    pub fn policy(&self) -> RewardPolicy {
        RewardPolicy::new(self.base_rate, self.view_weighting)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StoryweavePaths {
    pub base: PathBuf,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
}

impl StoryweavePaths {
    pub fn discover() -> Result<Self> {
        let exe_path = std::env::current_exe()
            .map_err(|err| anyhow!("failed to resolve current executable: {err}"))?;
        let base = exe_path
            .parent()
            .ok_or_else(|| anyhow!("executable path missing parent"))?
            .to_path_buf();
        Self::from_base_dir(base)
    }

    pub fn from_base_dir<P: AsRef<Path>>(base: P) -> Result<Self> {
        let base = base.as_ref().to_path_buf();
        let data_dir = base.join("data");
        let db_path = data_dir.join("storyweave.db");
        Ok(Self {
            base,
            data_dir,
            db_path,
        })
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_hang_off_base_dir() {
        let paths = StoryweavePaths::from_base_dir("/tmp/sw").unwrap();
        assert_eq!(paths.db_path, PathBuf::from("/tmp/sw/data/storyweave.db"));
    }

    #[test]
    fn default_policy_is_logarithmic() {
        let config = RewardConfig::default();
        assert_eq!(config.view_weighting, ViewWeighting::Logarithmic);
        assert_eq!(config.policy().base_rate(), 10);
    }
}
