//! Single-contract deployment against the compiled registry

use crate::chain::{ChainRpc, DeployedContract, TxReceipt};
use crate::compiler::ContractRegistry;
use crate::error::DeployError;
use crate::submitter::TxSubmitter;
use ethers::abi::Token;

/// Deploys one named contract from the compiled registry
pub struct ContractDeployer<'a, C: ChainRpc> {
    registry: &'a ContractRegistry,
    submitter: &'a TxSubmitter<'a, C>,
    gas_limit: u64,
}

impl<'a, C: ChainRpc> ContractDeployer<'a, C> {
    pub fn new(
        registry: &'a ContractRegistry,
        submitter: &'a TxSubmitter<'a, C>,
        gas_limit: u64,
    ) -> Self {
        Self {
            registry,
            submitter,
            gas_limit,
        }
    }

    /// Deploy the named contract with the given constructor arguments
    ///
    /// The name must exist in the compiled registry; a missing name fails
    /// loudly rather than deploying anything else. Argument arity and types
    /// are not validated here; a mismatch surfaces from ABI encoding.
    pub async fn deploy(
        &self,
        name: &str,
        ctor_args: &[Token],
    ) -> Result<(DeployedContract, TxReceipt), DeployError> {
        let contract = self
            .registry
            .get(name)
            .ok_or_else(|| DeployError::UnknownContract(name.to_string()))?;

        tracing::info!(
            "deploying {} (bytecode hash {}) with constructor args {:?}",
            name,
            contract.bytecode_hash(),
            ctor_args
        );

        let (deployed, receipt) = self
            .submitter
            .deploy_contract(contract, ctor_args, self.gas_limit)
            .await?;

        tracing::info!(
            "{} deployed to {:#x} in transaction {:#x}",
            name,
            deployed.address,
            receipt.transaction_hash
        );
        Ok((deployed, receipt))
    }
}
