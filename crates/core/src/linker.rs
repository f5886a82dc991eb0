//! Post-deployment linking of contract cross-references

use crate::chain::{ChainRpc, TxReceipt};
use crate::error::DeployError;
use crate::submitter::TxSubmitter;
use ethers::types::{Address, Bytes};

/// A pre-encoded call against an already-deployed contract
///
/// Built via [`DeployedContract::call`](crate::chain::DeployedContract::call);
/// the payload stores one deployed address inside another contract's
/// persistent storage.
#[derive(Debug, Clone)]
pub struct LinkCall {
    /// Human-readable `Contract.function` label for logs and errors
    pub description: String,

    /// The deployed contract the call is addressed at
    pub to: Address,

    /// ABI-encoded call data
    pub data: Bytes,
}

/// Submits linking calls strictly in order, one confirmation at a time
///
/// Each transaction's nonce is derived from the pending count at
/// construction, so call k must confirm before call k+1 is built. A failure
/// partway through leaves a partially wired contract set; the error reports
/// how many calls were already confirmed so operators can finish the rest
/// by hand.
pub struct BatchLinker<'a, C: ChainRpc> {
    submitter: &'a TxSubmitter<'a, C>,
    gas_limit: u64,
}

impl<'a, C: ChainRpc> BatchLinker<'a, C> {
    pub fn new(submitter: &'a TxSubmitter<'a, C>, gas_limit: u64) -> Self {
        Self {
            submitter,
            gas_limit,
        }
    }

    /// Issue every call in order, waiting for each receipt before the next
    pub async fn link(&self, calls: &[LinkCall]) -> Result<Vec<TxReceipt>, DeployError> {
        let mut receipts = Vec::with_capacity(calls.len());

        for (index, call) in calls.iter().enumerate() {
            tracing::info!(
                "sending linking call {} ({}/{})",
                call.description,
                index + 1,
                calls.len()
            );

            match self.submitter.submit_call(call, self.gas_limit).await {
                Ok(receipt) => receipts.push(receipt),
                Err(source) => {
                    return Err(DeployError::LinkFailed {
                        description: call.description.clone(),
                        index,
                        total: calls.len(),
                        completed: receipts.len(),
                        source: Box::new(source),
                    });
                }
            }
        }

        Ok(receipts)
    }
}
