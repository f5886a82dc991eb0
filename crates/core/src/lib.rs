//! Compilation and deployment library for the Havven contract suite
pub mod chain;
pub mod compiler;
pub mod config;
mod deployer;
pub mod error;
mod linker;
pub mod plan;
pub mod status;
mod submitter;

pub use chain::{ChainRpc, DeployedContract, HttpChain, Identity, TxReceipt};
pub use compiler::{parse_combined_json, CompiledContract, ContractRegistry, SolcCompiler, SourceCompiler};
pub use config::{ConfirmConfig, DeployConfig, GasConfig};
pub use deployer::ContractDeployer;
pub use error::DeployError;
pub use linker::{BatchLinker, LinkCall};
pub use plan::{
    havven_plan, DeployStep, Deployment, DeploymentPlan, DeploymentSummary, DeployedSet,
};
pub use status::StatusReporter;
pub use submitter::TxSubmitter;
