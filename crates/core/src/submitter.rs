//! Transaction signing, broadcast, and confirmation tracking

use crate::chain::{ChainRpc, DeployedContract, Identity, TxReceipt};
use crate::compiler::CompiledContract;
use crate::config::DeployConfig;
use crate::error::DeployError;
use crate::linker::LinkCall;
use ethers::abi::Token;
use ethers::signers::Signer;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Bytes, TransactionRequest, H256, U256};
use std::time::{Duration, Instant};

/// Signs, broadcasts, and confirms transactions for a single deployer
/// account
///
/// Submission is strictly sequential: each transaction's nonce is read
/// from the account's transaction count at construction time, so a
/// transaction must confirm before the next one is built.
pub struct TxSubmitter<'a, C: ChainRpc> {
    chain: &'a C,
    identity: &'a Identity,
    gas_price: U256,
    chain_id: u64,
    poll_interval: Duration,
    confirm_timeout: Duration,
}

impl<'a, C: ChainRpc> TxSubmitter<'a, C> {
    pub fn new(chain: &'a C, identity: &'a Identity, config: &DeployConfig) -> Self {
        Self {
            chain,
            identity,
            gas_price: config.gas_price_wei(),
            chain_id: config.chain_id,
            poll_interval: config.poll_interval(),
            confirm_timeout: config.confirm_timeout(),
        }
    }

    /// Deploy one compiled contract and block until its creation confirms
    ///
    /// Returns the handle bound to the receipt's contract address, plus the
    /// receipt itself.
    pub async fn deploy_contract(
        &self,
        contract: &CompiledContract,
        ctor_args: &[Token],
        gas_limit: u64,
    ) -> Result<(DeployedContract, TxReceipt), DeployError> {
        let data = encode_constructor(contract, ctor_args)?;

        // Creation nonces are read from the confirmed count
        let nonce = self
            .chain
            .transaction_count(self.identity.address(), false)
            .await?;

        // No recipient marks the transaction as a contract creation
        let tx = self.base_transaction(nonce, gas_limit).data(data);
        let receipt = self.sign_and_confirm(tx.into()).await?;

        let address = receipt
            .contract_address
            .ok_or(DeployError::MissingContractAddress {
                hash: receipt.transaction_hash,
            })?;

        Ok((
            DeployedContract {
                name: contract.name.clone(),
                address,
                abi: contract.abi.clone(),
            },
            receipt,
        ))
    }

    /// Submit one pre-encoded call and block until it confirms
    pub async fn submit_call(
        &self,
        call: &LinkCall,
        gas_limit: u64,
    ) -> Result<TxReceipt, DeployError> {
        // Call nonces are read from the pending count
        let nonce = self
            .chain
            .transaction_count(self.identity.address(), true)
            .await?;

        let tx = self
            .base_transaction(nonce, gas_limit)
            .to(call.to)
            .data(call.data.clone());
        self.sign_and_confirm(tx.into()).await
    }

    fn base_transaction(&self, nonce: U256, gas_limit: u64) -> TransactionRequest {
        TransactionRequest::new()
            .from(self.identity.address())
            .gas(gas_limit)
            .gas_price(self.gas_price)
            .nonce(nonce)
            .chain_id(self.chain_id)
    }

    async fn sign_and_confirm(&self, tx: TypedTransaction) -> Result<TxReceipt, DeployError> {
        let signature = self.identity.wallet().sign_transaction(&tx).await?;
        let raw = tx.rlp_signed(&signature);

        let hash = self.chain.send_raw_transaction(raw).await?;
        tracing::info!("transaction hash: {hash:#x}");

        let receipt = self.wait_for_receipt(hash).await?;
        if !receipt.succeeded {
            return Err(DeployError::Reverted { hash });
        }

        tracing::debug!(
            "transaction {:#x} confirmed in block {:?}",
            hash,
            receipt.block_number
        );
        Ok(receipt)
    }

    /// Poll for the receipt under a hard deadline
    ///
    /// The poll interval backs off exponentially, capped at 10x the base
    /// interval.
    async fn wait_for_receipt(&self, hash: H256) -> Result<TxReceipt, DeployError> {
        let started = Instant::now();
        let mut delay = self.poll_interval;

        loop {
            if let Some(receipt) = self.chain.transaction_receipt(hash).await? {
                return Ok(receipt);
            }
            if started.elapsed() >= self.confirm_timeout {
                return Err(DeployError::ConfirmationTimeout {
                    hash,
                    waited: started.elapsed(),
                });
            }
            tokio::time::sleep(delay).await;
            delay = std::cmp::min(delay * 2, self.poll_interval * 10);
        }
    }
}

/// Constructor arguments are ABI-encoded and appended to the creation
/// bytecode
fn encode_constructor(
    contract: &CompiledContract,
    ctor_args: &[Token],
) -> Result<Bytes, DeployError> {
    let code = contract.bytecode.to_vec();
    let data = match contract.abi.constructor() {
        Some(constructor) => constructor.encode_input(code, ctor_args).map_err(|e| {
            DeployError::Abi(format!("constructor of `{}`: {}", contract.name, e))
        })?,
        None if ctor_args.is_empty() => code,
        None => {
            return Err(DeployError::Abi(format!(
                "`{}` declares no constructor but {} arguments were supplied",
                contract.name,
                ctor_args.len()
            )))
        }
    };
    Ok(data.into())
}
