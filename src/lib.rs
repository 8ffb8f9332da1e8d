//! Minimal proof-of-work ledger: hash-linked blocks sealed by a SHA-256
//! puzzle, chain validation and longest-valid-chain conflict resolution.

pub mod blockchain;
pub mod config;
pub mod error;
pub mod node;
pub mod sync;
pub mod transaction;

pub use blockchain::{Block, Blockchain, CancelFlag};
pub use config::Config;
pub use error::{LedgerError, Result};
pub use node::NodeState;
pub use sync::{PeerChain, PeerChainSource};
pub use transaction::Transaction;
