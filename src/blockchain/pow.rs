//! Proof-of-Work puzzle.
//!
//! A proof is valid for its predecessor's proof when SHA-256 of the two
//! decimal numbers written back to back (`"{previous_proof}{proof}"`) starts
//! with `difficulty` hex zeros. Search is a plain linear scan from 0, so the
//! proof found for a given predecessor and difficulty is always the same.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::hash::sha256_hex;
use crate::error::{LedgerError, Result};

/// Candidates tried between two looks at the cancel flag.
pub const CANCEL_CHECK_INTERVAL: u64 = 4096;

/// Shared flag used to abandon an in-flight proof search.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Check whether `proof` solves the puzzle seeded by `previous_proof`.
pub fn is_valid_proof(previous_proof: u64, proof: u64, difficulty: u32) -> bool {
    let digest = sha256_hex(format!("{previous_proof}{proof}").as_bytes());
    let difficulty = difficulty as usize;
    difficulty <= digest.len() && digest.bytes().take(difficulty).all(|c| c == b'0')
}

/// Find the smallest proof satisfying `is_valid_proof`. Unbounded.
pub fn proof_of_work(previous_proof: u64, difficulty: u32) -> u64 {
    let mut proof = 0;
    while !is_valid_proof(previous_proof, proof, difficulty) {
        proof += 1;
    }
    proof
}

/// Same scan as [`proof_of_work`], abandoned with `SearchAborted` once
/// `cancel` is raised.
pub fn proof_of_work_cancellable(
    previous_proof: u64,
    difficulty: u32,
    cancel: &CancelFlag,
) -> Result<u64> {
    let mut proof = 0;
    loop {
        if proof % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            return Err(LedgerError::SearchAborted);
        }
        if is_valid_proof(previous_proof, proof, difficulty) {
            return Ok(proof);
        }
        proof += 1;
    }
}
