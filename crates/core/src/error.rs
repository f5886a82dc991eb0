//! Error types for compilation and deployment

use ethers::types::H256;
use std::time::Duration;

/// Error type covering every fallible deployment step
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("solc failed:\n{0}")]
    Compiler(String),

    #[error("contract `{0}` is not present in the compiled output")]
    UnknownContract(String),

    #[error("abi encoding failed: {0}")]
    Abi(String),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("transaction {hash:#x} not confirmed after {waited:?}")]
    ConfirmationTimeout { hash: H256, waited: Duration },

    #[error("creation receipt for {hash:#x} carries no contract address")]
    MissingContractAddress { hash: H256 },

    #[error("transaction {hash:#x} reverted")]
    Reverted { hash: H256 },

    #[error("linking call `{description}` (call {index} of {total}) failed after {completed} confirmed calls: {source}")]
    LinkFailed {
        description: String,
        index: usize,
        total: usize,
        completed: usize,
        #[source]
        source: Box<DeployError>,
    },

    #[error("invalid deployment plan: {0}")]
    InvalidPlan(String),

    #[error("signing key resolves to {derived:#x}, but the configured deployer is {configured:#x}")]
    KeyMismatch {
        derived: ethers::types::Address,
        configured: ethers::types::Address,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wallet error: {0}")]
    Wallet(#[from] ethers::signers::WalletError),

    #[error(transparent)]
    Other(#[from] eyre::Error),
}

impl DeployError {
    /// True for failures that leave already-confirmed transactions behind
    /// (a partially wired contract set the operator must finish by hand).
    pub fn is_partial(&self) -> bool {
        matches!(self, DeployError::LinkFailed { completed, .. } if *completed > 0)
    }
}
