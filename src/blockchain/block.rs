use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::hash;
use crate::error::Result;
use crate::transaction::Transaction;

/// A sealed block. Read-only once it is part of a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// 1-based position in the chain.
    pub index: u64,
    pub timestamp: f64, // Unix seconds (UTC), microsecond resolution
    pub transactions: Vec<Transaction>,
    pub proof: u64,
    pub previous_hash: String,
}

impl Block {
    /// Build a block stamped with the current time.
    pub fn new(
        index: u64,
        transactions: Vec<Transaction>,
        proof: u64,
        previous_hash: String,
    ) -> Self {
        Self {
            index,
            timestamp: now(),
            transactions,
            proof,
            previous_hash,
        }
    }

    /// Canonical digest of this block, used as the next block's `previous_hash`.
    pub fn hash(&self) -> Result<String> {
        hash::hash(self)
    }
}

fn now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
