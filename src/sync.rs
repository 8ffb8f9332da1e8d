//! Conflict resolution: adopt the longest valid chain known to any peer.
//!
//! Fetching a peer's chain is the transport's job; it plugs in through
//! [`PeerChainSource`].

use std::collections::HashSet;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::blockchain::{Block, Blockchain, is_valid_chain};
use crate::error::Result;

/// What a peer reports about its chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerChain {
    pub length: usize,
    pub chain: Vec<Block>,
}

/// Supplies the current chain of a registered node (`host:port`).
pub trait PeerChainSource {
    fn fetch_chain(&self, node: &str) -> Result<PeerChain>;
}

/// Among `nodes`, pick the longest chain that is strictly longer than
/// `local_len` and valid at `difficulty`.
///
/// Unreachable peers and peers whose reported length disagrees with the
/// chain they sent are skipped. Ties keep the first candidate seen.
pub fn longest_valid_chain<S>(
    nodes: &HashSet<String>,
    local_len: usize,
    difficulty: u32,
    source: &S,
) -> Option<Vec<Block>>
where
    S: PeerChainSource + ?Sized,
{
    let mut max_length = local_len;
    let mut best = None;

    // Visit peers in a stable order so ties resolve the same way every run.
    let mut nodes: Vec<&String> = nodes.iter().collect();
    nodes.sort();

    for node in nodes {
        let peer = match source.fetch_chain(node) {
            Ok(peer) => peer,
            Err(e) => {
                warn!("skipping node {}: {}", node, e);
                continue;
            }
        };
        if peer.length != peer.chain.len() {
            warn!(
                "skipping node {}: reported length {} but sent {} blocks",
                node,
                peer.length,
                peer.chain.len()
            );
            continue;
        }
        if peer.length <= max_length {
            debug!("node {} chain ({}) not longer than {}", node, peer.length, max_length);
            continue;
        }
        match is_valid_chain(&peer.chain, difficulty) {
            Ok(true) => {
                max_length = peer.length;
                best = Some(peer.chain);
            }
            Ok(false) => warn!("node {} sent an invalid chain", node),
            Err(e) => warn!("node {} sent an unusable chain: {}", node, e),
        }
    }

    best
}

impl Blockchain {
    /// Replace the local chain with the longest valid chain among known
    /// nodes. Returns true iff the local chain was replaced.
    pub fn resolve_conflicts<S>(&mut self, source: &S) -> Result<bool>
    where
        S: PeerChainSource + ?Sized,
    {
        match longest_valid_chain(self.nodes(), self.len(), self.difficulty(), source) {
            Some(chain) => self.replace_chain(chain),
            None => {
                info!("local chain ({} blocks) is authoritative", self.len());
                Ok(false)
            }
        }
    }
}
