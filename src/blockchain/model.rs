use std::collections::{HashMap, HashSet};

use http::Uri;
use log::{debug, info, warn};

use super::pow::{self, CancelFlag};
use super::validate;
use super::{Block, GENESIS_PREVIOUS_HASH, GENESIS_PROOF, REWARD_SENDER};
use crate::error::{LedgerError, Result};
use crate::transaction::Transaction;

/// In-memory ledger: the sealed chain, the staged transactions waiting for
/// the next block and the peers known to this node.
#[derive(Debug)]
pub struct Blockchain {
    pub(crate) chain: Vec<Block>,
    current_transactions: Vec<Transaction>,
    nodes: HashSet<String>,
    difficulty: u32,
}

impl Blockchain {
    /// Initialize a new ledger with the default genesis block.
    pub fn new(difficulty: u32) -> Self {
        Self::with_genesis(difficulty, GENESIS_PROOF, GENESIS_PREVIOUS_HASH)
    }

    /// Initialize a new ledger whose genesis block carries `proof` and the
    /// `previous_hash` sentinel.
    pub fn with_genesis(difficulty: u32, proof: u64, previous_hash: impl Into<String>) -> Self {
        let mut bc = Self {
            chain: Vec::new(),
            current_transactions: Vec::new(),
            nodes: HashSet::new(),
            difficulty,
        };
        bc.seal(proof, previous_hash.into());
        bc
    }

    /// The sealed blocks, genesis first.
    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    /// Return the last block in the chain.
    pub fn last_block(&self) -> &Block {
        self.chain
            .last()
            .expect("Blockchain should always have at least the genesis block")
    }

    /// Stage a transaction for the next block. Returns the index of the block
    /// that will hold it.
    pub fn new_transaction(
        &mut self,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: u64,
    ) -> u64 {
        let tx = Transaction::new(sender, recipient, amount);
        debug!(
            "staged tx {} -> {} ({}), pending={}",
            tx.sender,
            tx.recipient,
            tx.amount,
            self.current_transactions.len() + 1
        );
        self.current_transactions.push(tx);
        // Same numbering `seal` uses; peer chains may carry arbitrary indexes.
        self.chain.len() as u64 + 1
    }

    /// Seal every staged transaction into a new block and append it.
    ///
    /// `previous_hash` defaults to the hash of the current last block; an
    /// explicit value is only meaningful for a genesis block.
    pub fn new_block(&mut self, proof: u64, previous_hash: Option<String>) -> Result<&Block> {
        let previous_hash = match previous_hash {
            Some(h) => h,
            None => self.last_block().hash()?,
        };
        Ok(self.seal(proof, previous_hash))
    }

    fn seal(&mut self, proof: u64, previous_hash: String) -> &Block {
        let index = self.chain.len() as u64 + 1;
        // Staging is emptied in the same step the block takes ownership of it.
        let transactions = std::mem::take(&mut self.current_transactions);
        let block = Block::new(index, transactions, proof, previous_hash);
        info!(
            "sealed block #{} (proof={}, txs={})",
            block.index,
            block.proof,
            block.transactions.len()
        );
        self.chain.push(block);
        self.last_block()
    }

    /// Search for the proof of the next block and seal it.
    ///
    /// When `reward_recipient` is set, a reward record from
    /// [`REWARD_SENDER`] is staged once the proof is found. A cancelled
    /// search leaves the staging list untouched.
    pub fn mine(
        &mut self,
        reward_recipient: Option<&str>,
        reward: u64,
        cancel: &CancelFlag,
    ) -> Result<&Block> {
        let previous_proof = self.last_block().proof;
        let proof = pow::proof_of_work_cancellable(previous_proof, self.difficulty, cancel)
            .inspect_err(|_| warn!("proof search on top of block #{} aborted", self.len()))?;

        if let Some(recipient) = reward_recipient {
            self.new_transaction(REWARD_SENDER, recipient, reward);
        }
        self.new_block(proof, None)
    }

    /// Search for a proof following `previous_proof` at this ledger's difficulty.
    pub fn proof_of_work(&self, previous_proof: u64) -> u64 {
        pow::proof_of_work(previous_proof, self.difficulty)
    }

    pub fn is_valid_proof(&self, previous_proof: u64, proof: u64) -> bool {
        pow::is_valid_proof(previous_proof, proof, self.difficulty)
    }

    /// Validate any candidate chain at this ledger's difficulty.
    pub fn is_valid_chain(&self, chain: &[Block]) -> Result<bool> {
        validate::is_valid_chain(chain, self.difficulty)
    }

    /// Validate the local chain end to end.
    pub fn validate(&self) -> Result<()> {
        validate::validate_chain(&self.chain, self.difficulty)
    }

    /// Register a peer by URI (`http://host:port/...` or bare `host:port`).
    /// Stores and returns its `host:port` part.
    pub fn register_node(&mut self, address: &str) -> Result<String> {
        let uri: Uri = address
            .parse()
            .map_err(|e: http::uri::InvalidUri| {
                LedgerError::InvalidAddress(address.to_string(), e.to_string())
            })?;
        let node = match uri.authority() {
            Some(authority) if !authority.host().is_empty() => authority.as_str().to_string(),
            _ => {
                return Err(LedgerError::InvalidAddress(
                    address.to_string(),
                    "missing host".to_string(),
                ));
            }
        };

        if self.nodes.insert(node.clone()) {
            info!("registered node {} (known nodes: {})", node, self.nodes.len());
        } else {
            debug!("node {} already registered", node);
        }
        Ok(node)
    }

    pub fn nodes(&self) -> &HashSet<String> {
        &self.nodes
    }

    /// Adopt `candidate` if it is strictly longer than the local chain and
    /// valid.
    ///
    /// On adoption the staging list is reconciled so every transaction still
    /// ends up in exactly one block: staged transactions the candidate already
    /// seals are dropped, and transactions sealed only in the abandoned local
    /// blocks are staged again ahead of the pending ones. Mining rewards of
    /// abandoned blocks are not carried over.
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> Result<bool> {
        if candidate.len() <= self.chain.len() {
            debug!(
                "candidate chain ({}) not longer than local ({})",
                candidate.len(),
                self.chain.len()
            );
            return Ok(false);
        }
        if !self.is_valid_chain(&candidate)? {
            warn!("rejected invalid candidate chain of {} blocks", candidate.len());
            return Ok(false);
        }

        info!(
            "replacing local chain ({} blocks) with candidate ({} blocks)",
            self.chain.len(),
            candidate.len()
        );
        let abandoned = std::mem::replace(&mut self.chain, candidate);
        self.reconcile_staging(&abandoned);
        Ok(true)
    }

    fn reconcile_staging(&mut self, abandoned: &[Block]) {
        // Multiset of transactions sealed in the adopted chain, minus those
        // the abandoned chain already accounted for.
        let mut unmatched: HashMap<&Transaction, usize> = HashMap::new();
        for tx in self.chain.iter().flat_map(|b| &b.transactions) {
            *unmatched.entry(tx).or_default() += 1;
        }

        let mut restaged = Vec::new();
        for tx in abandoned.iter().flat_map(|b| &b.transactions) {
            match unmatched.get_mut(tx) {
                Some(n) if *n > 0 => *n -= 1,
                _ if tx.sender == REWARD_SENDER => {}
                _ => restaged.push(tx.clone()),
            }
        }
        let orphaned = restaged.len();

        let pending = std::mem::take(&mut self.current_transactions);
        let mut dropped = 0;
        for tx in pending {
            match unmatched.get_mut(&tx) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    dropped += 1;
                }
                _ => restaged.push(tx),
            }
        }

        if orphaned > 0 || dropped > 0 {
            info!(
                "staging reconciled: {} restaged from abandoned blocks, {} already sealed",
                orphaned, dropped
            );
        }
        self.current_transactions = restaged;
    }

    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.current_transactions
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIFFICULTY: u32 = 2;

    #[test]
    fn genesis_invariant() {
        let bc = Blockchain::new(DIFFICULTY);
        assert_eq!(bc.len(), 1);
        let genesis = bc.last_block();
        assert_eq!(genesis.index, 1);
        assert_eq!(genesis.proof, GENESIS_PROOF);
        assert_eq!(genesis.previous_hash, GENESIS_PREVIOUS_HASH);
        assert!(genesis.transactions.is_empty());
    }

    #[test]
    fn custom_genesis_uses_caller_sentinel() {
        let bc = Blockchain::with_genesis(DIFFICULTY, 7, "genesis");
        assert_eq!(bc.chain[0].proof, 7);
        assert_eq!(bc.chain[0].previous_hash, "genesis");
    }

    #[test]
    fn new_transaction_returns_next_block_index() {
        let mut bc = Blockchain::new(DIFFICULTY);
        assert_eq!(bc.new_transaction("A", "B", 10), 2);
        assert_eq!(bc.new_transaction("B", "C", 5), 2);
        assert_eq!(bc.pending_transactions().len(), 2);
    }

    #[test]
    fn new_block_seals_staging_in_order() {
        let mut bc = Blockchain::new(DIFFICULTY);
        bc.new_transaction("A", "B", 10);
        bc.new_transaction("B", "C", 5);

        let proof = bc.proof_of_work(bc.last_block().proof);
        let expected_prev = bc.last_block().hash().unwrap();
        let block = bc.new_block(proof, None).unwrap().clone();

        assert_eq!(block.index, 2);
        assert_eq!(block.previous_hash, expected_prev);
        assert_eq!(
            block.transactions,
            vec![Transaction::new("A", "B", 10), Transaction::new("B", "C", 5)]
        );
        assert!(bc.pending_transactions().is_empty());
        assert!(bc.validate().is_ok());
    }

    #[test]
    fn sealed_block_is_a_snapshot_of_staging() {
        let mut bc = Blockchain::new(DIFFICULTY);
        bc.new_transaction("A", "B", 1);
        let proof = bc.proof_of_work(bc.last_block().proof);
        bc.new_block(proof, None).unwrap();

        bc.new_transaction("C", "D", 2);
        assert_eq!(bc.chain[1].transactions.len(), 1);
        assert_eq!(bc.pending_transactions().len(), 1);
    }

    #[test]
    fn explicit_previous_hash_overrides_default() {
        let mut bc = Blockchain::new(DIFFICULTY);
        let block = bc.new_block(5, Some("override".into())).unwrap();
        assert_eq!(block.previous_hash, "override");
        assert!(!bc.is_valid_chain(&bc.chain).unwrap());
    }

    #[test]
    fn mine_records_reward_after_staged_transactions() {
        let mut bc = Blockchain::new(DIFFICULTY);
        bc.new_transaction("A", "B", 10);
        let block = bc.mine(Some("miner"), 1, &CancelFlag::new()).unwrap().clone();

        assert_eq!(block.transactions.len(), 2);
        assert_eq!(block.transactions[1], Transaction::new(REWARD_SENDER, "miner", 1));
        assert!(bc.is_valid_proof(bc.chain[0].proof, block.proof));
        assert!(bc.validate().is_ok());
    }

    #[test]
    fn aborted_mine_leaves_staging_untouched() {
        let mut bc = Blockchain::new(64);
        bc.new_transaction("A", "B", 10);
        let cancel = CancelFlag::new();
        cancel.cancel();

        let err = bc.mine(Some("miner"), 1, &cancel).unwrap_err();
        assert!(matches!(err, LedgerError::SearchAborted));
        assert_eq!(bc.len(), 1);
        assert_eq!(bc.pending_transactions(), &[Transaction::new("A", "B", 10)]);
    }

    #[test]
    fn register_node_keeps_host_and_port() {
        let mut bc = Blockchain::new(DIFFICULTY);
        assert_eq!(
            bc.register_node("http://192.168.0.5:5000").unwrap(),
            "192.168.0.5:5000"
        );
        assert_eq!(
            bc.register_node("http://192.168.0.5:5000/chain").unwrap(),
            "192.168.0.5:5000"
        );
        assert_eq!(bc.register_node("peer.local:5001").unwrap(), "peer.local:5001");
        assert_eq!(bc.nodes().len(), 2);
        assert!(bc.nodes().contains("192.168.0.5:5000"));
    }

    #[test]
    fn register_node_rejects_malformed_addresses() {
        let mut bc = Blockchain::new(DIFFICULTY);
        for bad in ["", "not a url", "/only/a/path"] {
            assert!(
                matches!(bc.register_node(bad), Err(LedgerError::InvalidAddress(..))),
                "{bad:?} should be rejected"
            );
        }
        assert!(bc.nodes().is_empty());
    }

    #[test]
    fn replace_chain_adopts_only_longer_valid_chains() {
        let mut local = Blockchain::new(DIFFICULTY);
        let mut peer = Blockchain::new(DIFFICULTY);
        // Share the genesis block so both chains start identically.
        peer.chain = local.chain.clone();
        for _ in 0..2 {
            peer.mine(None, 0, &CancelFlag::new()).unwrap();
        }

        assert!(!local.replace_chain(local.chain.clone()).unwrap());

        let mut forged = peer.chain.clone();
        forged[2].proof += 1;
        assert!(!local.replace_chain(forged).unwrap());
        assert_eq!(local.len(), 1);

        local.new_transaction("A", "B", 3);
        assert!(local.replace_chain(peer.chain.clone()).unwrap());
        assert_eq!(local.len(), 3);
        assert_eq!(local.pending_transactions().len(), 1);
    }

    fn peer_of(local: &Blockchain) -> Blockchain {
        let mut peer = Blockchain::new(DIFFICULTY);
        peer.chain = local.chain.clone();
        peer
    }

    #[test]
    fn promised_index_follows_chain_length_after_adoption() {
        let mut local = Blockchain::new(DIFFICULTY);
        let mut peer = peer_of(&local);
        peer.mine(None, 0, &CancelFlag::new()).unwrap();

        // The validator does not look at `index`, so a peer may number freely.
        let mut renumbered = peer.chain.clone();
        renumbered[1].index = 7;
        assert!(local.replace_chain(renumbered).unwrap());

        let promised = local.new_transaction("A", "B", 1);
        let proof = local.proof_of_work(local.last_block().proof);
        let sealed = local.new_block(proof, None).unwrap().index;
        assert_eq!(promised, 3);
        assert_eq!(promised, sealed);
    }

    #[test]
    fn new_transaction_does_not_overflow_on_foreign_index() {
        let mut local = Blockchain::new(DIFFICULTY);
        let mut peer = peer_of(&local);
        peer.mine(None, 0, &CancelFlag::new()).unwrap();
        let mut renumbered = peer.chain.clone();
        renumbered[1].index = u64::MAX;
        assert!(local.replace_chain(renumbered).unwrap());

        assert_eq!(local.new_transaction("A", "B", 1), 3);
    }

    #[test]
    fn adoption_drops_staged_transactions_the_candidate_already_sealed() {
        let mut local = Blockchain::new(DIFFICULTY);
        let mut peer = peer_of(&local);
        peer.new_transaction("A", "B", 10);
        peer.mine(None, 0, &CancelFlag::new()).unwrap();

        local.new_transaction("A", "B", 10);
        local.new_transaction("A", "B", 10);
        local.new_transaction("C", "D", 1);
        assert!(local.replace_chain(peer.chain.clone()).unwrap());

        // One copy is sealed by the peer; the second transfer is still pending.
        assert_eq!(
            local.pending_transactions(),
            &[Transaction::new("A", "B", 10), Transaction::new("C", "D", 1)]
        );

        local.mine(None, 0, &CancelFlag::new()).unwrap();
        let sealed = local
            .chain
            .iter()
            .flat_map(|b| &b.transactions)
            .filter(|tx| **tx == Transaction::new("A", "B", 10))
            .count();
        assert_eq!(sealed, 2);
    }

    #[test]
    fn adoption_restages_transactions_of_abandoned_blocks() {
        let mut local = Blockchain::new(DIFFICULTY);
        let mut peer = peer_of(&local);
        for _ in 0..2 {
            peer.mine(None, 0, &CancelFlag::new()).unwrap();
        }

        local.new_transaction("E", "F", 2);
        local.mine(Some("miner"), 1, &CancelFlag::new()).unwrap();
        local.new_transaction("G", "H", 3);
        assert!(local.replace_chain(peer.chain.clone()).unwrap());

        assert_eq!(
            local.pending_transactions(),
            &[Transaction::new("E", "F", 2), Transaction::new("G", "H", 3)]
        );
    }

    #[test]
    fn replace_chain_rejects_empty_candidate_as_not_longer() {
        let mut local = Blockchain::new(DIFFICULTY);
        assert!(!local.replace_chain(Vec::new()).unwrap());
    }
}
