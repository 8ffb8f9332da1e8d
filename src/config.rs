use std::env;
use std::str::FromStr;

use log::warn;
use uuid::Uuid;

use crate::blockchain::{DEFAULT_DIFFICULTY, GENESIS_PREVIOUS_HASH, GENESIS_PROOF};

/// Amount recorded on the reward transaction of each mined block.
pub const DEFAULT_MINING_REWARD: u64 = 1;

/// Blocks mined by the binary when `MINE_BLOCKS` is not set.
pub const DEFAULT_MINE_BLOCKS: usize = 1;

/// Runtime settings, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub difficulty: u32,
    pub genesis_proof: u64,
    pub genesis_previous_hash: String,
    pub mining_reward: u64,
    /// Recipient of mining rewards.
    pub node_id: String,
    pub peers: Vec<String>,
    pub mine_blocks: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            genesis_proof: GENESIS_PROOF,
            genesis_previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
            mining_reward: DEFAULT_MINING_REWARD,
            node_id: Uuid::new_v4().simple().to_string(),
            peers: Vec::new(),
            mine_blocks: DEFAULT_MINE_BLOCKS,
        }
    }
}

impl Config {
    /// Build from process environment variables. Call `dotenvy::dotenv()`
    /// first to pick up a `.env` file.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            difficulty: parsed(&lookup, "LEDGER_DIFFICULTY", defaults.difficulty),
            genesis_proof: parsed(&lookup, "LEDGER_GENESIS_PROOF", defaults.genesis_proof),
            genesis_previous_hash: lookup("LEDGER_GENESIS_PREVIOUS_HASH")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.genesis_previous_hash),
            mining_reward: parsed(&lookup, "MINING_REWARD", defaults.mining_reward),
            node_id: lookup("NODE_ID")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.node_id),
            peers: lookup("PEERS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            mine_blocks: parsed(&lookup, "MINE_BLOCKS", defaults.mine_blocks),
        }
    }
}

fn parsed<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("ignoring invalid {}={:?}, using {}", key, raw, default);
            default
        }),
        None => default,
    }
}
