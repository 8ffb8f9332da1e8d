use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid node address {0:?}: {1}")]
    InvalidAddress(String, String),
    #[error("invalid chain: empty")]
    EmptyChain,
    #[error("invalid chain: block {index} does not link to its predecessor")]
    BrokenLink { index: usize },
    #[error("invalid chain: block {index} carries an invalid proof")]
    InvalidProof { index: usize },
    #[error("proof search aborted")]
    SearchAborted,
    #[error("block serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("peer {0} unavailable: {1}")]
    PeerUnavailable(String, String),
    #[error("ledger lock poisoned")]
    LockPoisoned,
}
