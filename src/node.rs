//! Thread-safe node state around a single [`Blockchain`].
//!
//! Staging a transaction and sealing a block share one lock, so a
//! transaction staged while a proof is being searched waits for the seal
//! and lands in the following block instead of being lost.
//!
//! Cancellation only reaches a search that is actually running: each
//! `mine` call gets its own flag, published while the search is in
//! progress. A pending chain replacement also makes queued miners step
//! aside instead of starting a fresh search in front of it.

use std::sync::{Mutex, MutexGuard};

use log::{debug, info};

use crate::blockchain::{Block, Blockchain, CancelFlag};
use crate::config::Config;
use crate::error::{LedgerError, Result};
use crate::sync::{PeerChainSource, longest_valid_chain};

#[derive(Debug, Default)]
struct SearchState {
    /// Flag of the search in progress, if any.
    active: Option<CancelFlag>,
    /// Chain replacements waiting for the ledger lock.
    replacements_waiting: usize,
}

pub struct NodeState {
    ledger: Mutex<Blockchain>,
    search: Mutex<SearchState>,
    node_id: String,
    mining_reward: u64,
}

impl NodeState {
    pub fn new(config: &Config) -> Self {
        let ledger = Blockchain::with_genesis(
            config.difficulty,
            config.genesis_proof,
            config.genesis_previous_hash.clone(),
        );
        Self {
            ledger: Mutex::new(ledger),
            search: Mutex::new(SearchState::default()),
            node_id: config.node_id.clone(),
            mining_reward: config.mining_reward,
        }
    }

    fn ledger(&self) -> Result<MutexGuard<'_, Blockchain>> {
        self.ledger.lock().map_err(|_| LedgerError::LockPoisoned)
    }

    // Never held while waiting for the ledger lock.
    fn search(&self) -> Result<MutexGuard<'_, SearchState>> {
        self.search.lock().map_err(|_| LedgerError::LockPoisoned)
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Stage a transaction; returns the index of the block that will hold it.
    pub fn submit_transaction(&self, sender: &str, recipient: &str, amount: u64) -> Result<u64> {
        let mut bc = self.ledger()?;
        Ok(bc.new_transaction(sender, recipient, amount))
    }

    /// Search the next proof, record this node's reward and seal everything
    /// staged, all under the ledger lock.
    ///
    /// Fails with `SearchAborted` when cancelled mid-search, or right away
    /// when a chain replacement is waiting for the lock.
    pub fn mine(&self) -> Result<Block> {
        let mut bc = self.ledger()?;
        let cancel = CancelFlag::new();
        {
            let mut search = self.search()?;
            if search.replacements_waiting > 0 {
                debug!("node {} yields to a pending chain replacement", self.node_id);
                return Err(LedgerError::SearchAborted);
            }
            search.active = Some(cancel.clone());
        }

        let mined = bc
            .mine(Some(&self.node_id), self.mining_reward, &cancel)
            .cloned();
        self.search()?.active = None;

        let block = mined?;
        info!("node {} mined block #{}", self.node_id, block.index);
        Ok(block)
    }

    /// Abandon the search in progress, if any; that `mine` call then fails
    /// with `SearchAborted`. Returns whether a search was cancelled. Has no
    /// effect on later `mine` calls.
    pub fn cancel_mining(&self) -> Result<bool> {
        let search = self.search()?;
        match &search.active {
            Some(flag) => {
                flag.cancel();
                Ok(true)
            }
            None => {
                debug!("no proof search to cancel");
                Ok(false)
            }
        }
    }

    pub fn is_mining(&self) -> Result<bool> {
        Ok(self.search()?.active.is_some())
    }

    pub fn chain_snapshot(&self) -> Result<Vec<Block>> {
        Ok(self.ledger()?.chain().to_vec())
    }

    pub fn is_chain_valid(&self) -> Result<bool> {
        let bc = self.ledger()?;
        bc.is_valid_chain(bc.chain())
    }

    pub fn register_node(&self, address: &str) -> Result<String> {
        self.ledger()?.register_node(address)
    }

    /// Fetch peer chains without holding the lock, then adopt the longest
    /// valid one if it still beats the local chain. A running search is
    /// cancelled and queued miners step aside until the replacement is done.
    pub fn resolve_conflicts<S>(&self, source: &S) -> Result<bool>
    where
        S: PeerChainSource + ?Sized,
    {
        let (nodes, local_len, difficulty) = {
            let bc = self.ledger()?;
            (bc.nodes().clone(), bc.len(), bc.difficulty())
        };

        let Some(candidate) = longest_valid_chain(&nodes, local_len, difficulty, source) else {
            debug!("no peer chain longer than local ({})", local_len);
            return Ok(false);
        };

        {
            let mut search = self.search()?;
            search.replacements_waiting += 1;
            if let Some(flag) = &search.active {
                flag.cancel();
            }
        }
        let replaced = self.ledger().and_then(|mut bc| bc.replace_chain(candidate));
        self.search()?.replacements_waiting -= 1;
        replaced
    }
}
