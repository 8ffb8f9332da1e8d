pub mod block;
pub mod hash;
pub mod model;
pub mod pow;
pub mod validate;

pub use block::Block;
pub use hash::hash;
pub use model::Blockchain;
pub use pow::{CancelFlag, is_valid_proof, proof_of_work, proof_of_work_cancellable};
pub use validate::{is_valid_chain, validate_chain};

/// Default Proof-of-Work difficulty (number of leading hex zeros).
pub const DEFAULT_DIFFICULTY: u32 = 4;

/// Proof sealed into the genesis block.
pub const GENESIS_PROOF: u64 = 100;

/// Stand-in `previous_hash` of the genesis block, which has no predecessor.
pub const GENESIS_PREVIOUS_HASH: &str = "1";

/// Sender recorded on mining reward transactions.
pub const REWARD_SENDER: &str = "0";
