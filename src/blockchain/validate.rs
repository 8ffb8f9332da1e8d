use log::debug;

use super::Block;
use super::pow::is_valid_proof;
use crate::error::{LedgerError, Result};

/// Walk `chain` from its second block, checking every consecutive pair for
/// hash linkage and puzzle validity. Stops at the first failure.
///
/// A chain holding only its genesis block is valid. An empty chain is a
/// precondition violation and reported as `EmptyChain`.
pub fn validate_chain(chain: &[Block], difficulty: u32) -> Result<()> {
    let Some(genesis) = chain.first() else {
        return Err(LedgerError::EmptyChain);
    };

    let mut last_block = genesis;
    for (index, block) in chain.iter().enumerate().skip(1) {
        if block.previous_hash != last_block.hash()? {
            return Err(LedgerError::BrokenLink { index });
        }
        if !is_valid_proof(last_block.proof, block.proof, difficulty) {
            return Err(LedgerError::InvalidProof { index });
        }
        last_block = block;
    }

    Ok(())
}

/// Boolean view of [`validate_chain`]. Only an empty chain is an error.
pub fn is_valid_chain(chain: &[Block], difficulty: u32) -> Result<bool> {
    match validate_chain(chain, difficulty) {
        Ok(()) => Ok(true),
        Err(e @ (LedgerError::BrokenLink { .. } | LedgerError::InvalidProof { .. })) => {
            debug!("chain of {} blocks rejected: {}", chain.len(), e);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
