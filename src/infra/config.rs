use std::env;
use std::error::Error;
use std::fmt;
use std::str::FromStr;

use crate::planners::lookahead::{LookaheadConfig, RetryStrategy};
use crate::state::{WarehouseLayout, WarehouseRewards};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid { key: String, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Invalid { key, value } => {
                write!(formatter, "Invalid value '{}' for {}", value, key)
            }
        }
    }
}

impl Error for ConfigError {}

/// Everything the generator binary needs, read from `ROLLBOT_*` variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub layout: WarehouseLayout,
    pub rewards: WarehouseRewards,
    pub lookahead: LookaheadConfig,
    pub seed: Option<u64>,
    /// Episodes to play; unlimited when absent
    pub episodes: Option<usize>,
    pub min_reward: Option<f32>,
    pub dataset_folder: String,
    /// Accepted episodes per dataset file
    pub flush_interval: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            layout: WarehouseLayout::default(),
            rewards: WarehouseRewards::default(),
            lookahead: LookaheadConfig::default(),
            seed: None,
            episodes: None,
            min_reward: None,
            dataset_folder: "dataset".to_string(),
            flush_interval: 5,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from `lookup`, falling back to defaults for missing keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let layout = WarehouseLayout {
            agents: parse_or(&get, "ROLLBOT_AGENTS", defaults.layout.agents)?,
            blocks: parse_or(&get, "ROLLBOT_BLOCKS", defaults.layout.blocks)?,
            wall_offset: parse_or(&get, "ROLLBOT_WALL_OFFSET", defaults.layout.wall_offset)?,
            box_offset: parse_or(&get, "ROLLBOT_BOX_OFFSET", defaults.layout.box_offset)?,
            max_steps: parse_or(&get, "ROLLBOT_MAX_STEPS", defaults.layout.max_steps)?,
        };

        let retry_strategy = match get("ROLLBOT_RETRY") {
            Some(value) => RetryStrategy::parse(&value).ok_or_else(|| ConfigError::Invalid {
                key: "ROLLBOT_RETRY".to_string(),
                value,
            })?,
            None => defaults.lookahead.retry_strategy,
        };

        let lookahead = LookaheadConfig {
            horizon: parse_or(&get, "ROLLBOT_HORIZON", defaults.lookahead.horizon)?,
            parallel_rollouts: parse_or(
                &get,
                "ROLLBOT_PARALLEL",
                defaults.lookahead.parallel_rollouts,
            )?,
            max_attempts: parse_or(&get, "ROLLBOT_MAX_ATTEMPTS", defaults.lookahead.max_attempts)?,
            retry_strategy,
            collision_factor: parse_or(
                &get,
                "ROLLBOT_COLLISION_FACTOR",
                defaults.lookahead.collision_factor,
            )?,
        };

        let flush_interval = parse_or(&get, "ROLLBOT_FLUSH_INTERVAL", defaults.flush_interval)?;
        if flush_interval == 0 {
            return Err(ConfigError::Invalid {
                key: "ROLLBOT_FLUSH_INTERVAL".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(Settings {
            layout,
            rewards: defaults.rewards,
            lookahead,
            seed: parse_opt(&get, "ROLLBOT_SEED")?,
            episodes: parse_opt(&get, "ROLLBOT_EPISODES")?,
            min_reward: parse_opt(&get, "ROLLBOT_MIN_REWARD")?,
            dataset_folder: get("ROLLBOT_DATASET_FOLDER").unwrap_or(defaults.dataset_folder),
            flush_interval,
        })
    }
}

fn parse_opt<T, G>(get: &G, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid {
                key: key.to_string(),
                value,
            }),
        None => Ok(None),
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    Ok(parse_opt(get, key)?.unwrap_or(default))
}
