//! Configuration types for suite deployment

use crate::error::DeployError;
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for a deployment run
///
/// Passed into the orchestrator at construction; there is no process-wide
/// mutable state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeployConfig {
    /// JSON-RPC endpoint of the target node
    pub rpc_url: String,

    /// Chain id the node is expected to report (also used for EIP-155 signing)
    pub chain_id: u64,

    /// Account every transaction is sent from; must match the signing key
    pub deployer: Address,

    /// Solidity source files to compile, in compilation order
    pub sources: Vec<PathBuf>,

    /// Import remappings forwarded to solc (`prefix=path`)
    #[serde(default)]
    pub remappings: Vec<String>,

    /// Name of the solc executable to resolve on PATH
    #[serde(default = "default_solc")]
    pub solc: String,

    /// Gas settings
    #[serde(default)]
    pub gas: GasConfig,

    /// Confirmation-wait settings
    #[serde(default)]
    pub confirmations: ConfirmConfig,
}

/// Gas parameters for creation and linking transactions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GasConfig {
    /// Gas limit for contract-creation transactions
    pub deploy_gas_limit: u64,

    /// Gas limit for linking calls
    pub link_gas_limit: u64,

    /// Gas price in gwei
    pub gas_price_gwei: u64,
}

/// Receipt polling and timeout parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfirmConfig {
    /// Base interval between receipt polls, in milliseconds
    pub poll_interval_ms: u64,

    /// Hard deadline for a single transaction's confirmation, in seconds
    pub timeout_secs: u64,
}

fn default_solc() -> String {
    "solc".to_string()
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.harmony.one".to_string(),
            chain_id: 1_666_600_000,
            deployer: Address::zero(),
            sources: vec![],
            remappings: vec![],
            solc: default_solc(),
            gas: GasConfig::default(),
            confirmations: ConfirmConfig::default(),
        }
    }
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            deploy_gas_limit: 5_000_000,
            link_gas_limit: 30_000_000,
            gas_price_gwei: 100,
        }
    }
}

impl Default for ConfirmConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            timeout_secs: 120,
        }
    }
}

impl DeployConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, DeployError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| DeployError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the entire configuration
    pub fn validate(&self) -> Result<(), DeployError> {
        if self.rpc_url.is_empty() {
            return Err(DeployError::InvalidConfig("rpc_url is empty".to_string()));
        }
        if self.deployer == Address::zero() {
            return Err(DeployError::InvalidConfig(
                "deployer is the zero address".to_string(),
            ));
        }
        if self.sources.is_empty() {
            return Err(DeployError::InvalidConfig(
                "no Solidity sources configured".to_string(),
            ));
        }
        if self.gas.deploy_gas_limit == 0 || self.gas.link_gas_limit == 0 {
            return Err(DeployError::InvalidConfig(
                "gas limits must be non-zero".to_string(),
            ));
        }
        if self.confirmations.poll_interval_ms == 0 {
            return Err(DeployError::InvalidConfig(
                "poll_interval_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Gas price converted from gwei to the base unit
    pub fn gas_price_wei(&self) -> U256 {
        U256::from(self.gas.gas_price_gwei) * U256::exp10(9)
    }

    /// Base interval between receipt polls
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirmations.poll_interval_ms)
    }

    /// Hard deadline for a single confirmation wait
    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmations.timeout_secs)
    }

    /// Create a new builder for DeployConfig
    pub fn builder() -> DeployConfigBuilder {
        DeployConfigBuilder::default()
    }
}

/// Builder for creating DeployConfig with a fluent API
#[derive(Default)]
pub struct DeployConfigBuilder {
    config: DeployConfig,
}

impl DeployConfigBuilder {
    /// Set the RPC endpoint
    pub fn rpc_url(mut self, url: impl Into<String>) -> Self {
        self.config.rpc_url = url.into();
        self
    }

    /// Set the expected chain id
    pub fn chain_id(mut self, chain_id: u64) -> Self {
        self.config.chain_id = chain_id;
        self
    }

    /// Set the deployer account
    pub fn deployer(mut self, address: Address) -> Self {
        self.config.deployer = address;
        self
    }

    /// Set the Solidity source list
    pub fn sources(mut self, sources: Vec<PathBuf>) -> Self {
        self.config.sources = sources;
        self
    }

    /// Add a single source file
    pub fn source(mut self, source: PathBuf) -> Self {
        self.config.sources.push(source);
        self
    }

    /// Set solc import remappings
    pub fn remappings(mut self, remappings: Vec<String>) -> Self {
        self.config.remappings = remappings;
        self
    }

    /// Set the solc executable name
    pub fn solc(mut self, solc: impl Into<String>) -> Self {
        self.config.solc = solc.into();
        self
    }

    /// Configure gas parameters
    pub fn gas(mut self, configure: impl FnOnce(&mut GasConfig)) -> Self {
        configure(&mut self.config.gas);
        self
    }

    /// Configure confirmation-wait parameters
    pub fn confirmations(mut self, configure: impl FnOnce(&mut ConfirmConfig)) -> Self {
        configure(&mut self.config.confirmations);
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<DeployConfig, DeployError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
