//! Narrow interface over the JSON-RPC node used for deployment

use crate::error::DeployError;
use crate::linker::LinkCall;
use async_trait::async_trait;
use ethers::{
    abi::{Abi, Token},
    providers::{Http, Middleware, Provider},
    signers::{LocalWallet, Signer},
    types::{Address, BlockId, BlockNumber, Bytes, H256, U256},
};

/// The deployer account: chain address plus local signing material
///
/// The key never leaves the process; transactions are signed locally and
/// broadcast as raw bytes.
pub struct Identity {
    address: Address,
    wallet: LocalWallet,
}

impl Identity {
    /// Build an identity from hex-encoded private key material
    ///
    /// The chain id is baked into the wallet for EIP-155 replay protection.
    pub fn from_private_key(key: &str, chain_id: u64) -> Result<Self, DeployError> {
        let wallet: LocalWallet = key.trim().trim_start_matches("0x").parse()?;
        let wallet = wallet.with_chain_id(chain_id);
        Ok(Self {
            address: wallet.address(),
            wallet,
        })
    }

    /// The account every transaction is sent from
    pub fn address(&self) -> Address {
        self.address
    }

    pub(crate) fn wallet(&self) -> &LocalWallet {
        &self.wallet
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material is deliberately not printed
        f.debug_struct("Identity")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Network-confirmed record of a transaction's outcome
#[derive(Debug, Clone)]
pub struct TxReceipt {
    /// Hash of the confirmed transaction
    pub transaction_hash: H256,

    /// Address of the created contract; populated only for creations
    pub contract_address: Option<Address>,

    /// Whether the transaction executed without reverting
    pub succeeded: bool,

    /// Block the transaction was mined in
    pub block_number: Option<u64>,
}

/// Handle to a contract confirmed on-chain, bound to its deployed address
#[derive(Debug, Clone)]
pub struct DeployedContract {
    /// Contract name as it appeared in the compiled output
    pub name: String,

    /// Deployed address
    pub address: Address,

    /// Interface description used to encode calls against this contract
    pub abi: Abi,
}

impl DeployedContract {
    /// ABI-encode a call against this contract, for the linking batch
    pub fn call(&self, function: &str, args: &[Token]) -> Result<LinkCall, DeployError> {
        let function = self
            .abi
            .function(function)
            .map_err(|e| DeployError::Abi(format!("{}.{}: {}", self.name, function, e)))?;
        let data = function
            .encode_input(args)
            .map_err(|e| DeployError::Abi(format!("{}.{}: {}", self.name, function.name, e)))?;

        Ok(LinkCall {
            description: format!("{}.{}", self.name, function.name),
            to: self.address,
            data: data.into(),
        })
    }
}

/// The JSON-RPC operations deployment needs from a node
///
/// Kept narrow so the transaction pipeline can be exercised against an
/// in-memory implementation in tests.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Transaction count for an account; `pending` selects the pending block
    async fn transaction_count(&self, address: Address, pending: bool)
        -> Result<U256, DeployError>;

    /// Broadcast a signed raw transaction, returning its hash
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, DeployError>;

    /// Receipt for a transaction, if it has been mined
    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TxReceipt>, DeployError>;

    /// Chain id reported by the node
    async fn chain_id(&self) -> Result<u64, DeployError>;
}

/// Production implementation over an HTTP JSON-RPC endpoint
pub struct HttpChain {
    provider: Provider<Http>,
}

impl HttpChain {
    /// Connect to an HTTP JSON-RPC endpoint
    pub fn connect(rpc_url: &str) -> Result<Self, DeployError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| DeployError::Rpc(format!("invalid endpoint {rpc_url}: {e}")))?;
        Ok(Self { provider })
    }
}

#[async_trait]
impl ChainRpc for HttpChain {
    async fn transaction_count(
        &self,
        address: Address,
        pending: bool,
    ) -> Result<U256, DeployError> {
        let block = pending.then(|| BlockId::Number(BlockNumber::Pending));
        self.provider
            .get_transaction_count(address, block)
            .await
            .map_err(|e| DeployError::Rpc(e.to_string()))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, DeployError> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(|e| DeployError::Rpc(e.to_string()))?;
        Ok(pending.tx_hash())
    }

    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TxReceipt>, DeployError> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| DeployError::Rpc(e.to_string()))?;

        Ok(receipt.map(|r| TxReceipt {
            transaction_hash: r.transaction_hash,
            contract_address: r.contract_address,
            // Pre-Byzantium receipts carry no status field; treat as success
            succeeded: r.status.map(|s| s.as_u64() == 1).unwrap_or(true),
            block_number: r.block_number.map(|b| b.as_u64()),
        }))
    }

    async fn chain_id(&self) -> Result<u64, DeployError> {
        self.provider
            .get_chainid()
            .await
            .map(|id| id.as_u64())
            .map_err(|e| DeployError::Rpc(e.to_string()))
    }
}
