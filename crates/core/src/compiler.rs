//! Solidity compilation through the external solc toolchain

use crate::error::DeployError;
use ethers::abi::Abi;
use ethers::types::Bytes;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;

/// One compiled contract: interface description plus creation bytecode
#[derive(Debug, Clone)]
pub struct CompiledContract {
    /// Bare contract name, unique within a compilation run
    pub name: String,

    /// Interface description used for constructor and call encoding
    pub abi: Abi,

    /// Creation bytecode
    pub bytecode: Bytes,
}

impl CompiledContract {
    /// SHA256 hash of the creation bytecode
    pub fn bytecode_hash(&self) -> String {
        format!("{:x}", Sha256::digest(&self.bytecode))
    }
}

/// Mapping from bare contract name to its compiled interface
///
/// A BTreeMap keeps iteration deterministic across runs.
pub type ContractRegistry = BTreeMap<String, CompiledContract>;

/// Narrow interface over the compiler toolchain
pub trait SourceCompiler: Send + Sync {
    /// Compile the given source files into a contract registry
    fn compile(&self, sources: &[PathBuf]) -> Result<ContractRegistry, DeployError>;
}

/// Compiler adapter invoking the `solc` executable
pub struct SolcCompiler {
    executable: PathBuf,
    remappings: Vec<String>,
}

impl SolcCompiler {
    /// Resolve the executable on PATH and build the adapter
    ///
    /// Different environments install different names, e.g. `solc-0.4.24`.
    pub fn new(executable: &str, remappings: Vec<String>) -> Result<Self, DeployError> {
        let executable = which::which(executable).map_err(|e| {
            DeployError::Compiler(format!("`{executable}` not found in $PATH: {e}"))
        })?;
        Ok(Self {
            executable,
            remappings,
        })
    }

    /// Version string reported by the toolchain
    pub fn version(&self) -> Result<String, DeployError> {
        let output = Command::new(&self.executable).arg("--version").output()?;
        if !output.status.success() {
            return Err(DeployError::Compiler(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        // Last non-empty line carries "Version: 0.x.y+commit...."
        let version = stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or_default()
            .trim()
            .trim_start_matches("Version: ")
            .to_string();
        Ok(version)
    }
}

impl SourceCompiler for SolcCompiler {
    fn compile(&self, sources: &[PathBuf]) -> Result<ContractRegistry, DeployError> {
        let mut cmd = Command::new(&self.executable);
        cmd.args(["--combined-json", "abi,bin"]);
        for remapping in &self.remappings {
            cmd.arg(remapping);
        }
        for source in sources {
            cmd.arg(source);
        }

        tracing::debug!("running solc command: {:?}", cmd);

        let output = cmd.output()?;
        if !output.status.success() {
            // solc writes diagnostics (syntax errors, unresolved imports) to stderr
            return Err(DeployError::Compiler(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }

        let registry = parse_combined_json(&output.stdout)?;
        tracing::info!(
            "compiled {} contracts: {:?}",
            registry.len(),
            registry.keys().collect::<Vec<_>>()
        );
        Ok(registry)
    }
}

#[derive(Debug, Deserialize)]
struct CombinedJson {
    contracts: BTreeMap<String, RawContract>,
}

#[derive(Debug, Deserialize)]
struct RawContract {
    abi: serde_json::Value,
    bin: String,
}

/// Parse solc `--combined-json abi,bin` output into a registry
///
/// Fully qualified keys (`path:Name`) are reduced to the bare name. If two
/// sources declare contracts with the same bare name, one silently
/// overwrites the other; callers avoid that by construction.
pub fn parse_combined_json(raw: &[u8]) -> Result<ContractRegistry, DeployError> {
    let combined: CombinedJson = serde_json::from_slice(raw)
        .map_err(|e| DeployError::Compiler(format!("unparseable combined-json output: {e}")))?;

    let mut registry = ContractRegistry::new();
    for (key, contract) in combined.contracts {
        let name = key.rsplit(':').next().unwrap_or(&key).to_string();

        // solc 0.4.x emits the abi as a JSON-encoded string, later versions
        // as a plain array
        let abi: Abi = match &contract.abi {
            serde_json::Value::String(encoded) => serde_json::from_str(encoded),
            other => serde_json::from_value(other.clone()),
        }
        .map_err(|e| DeployError::Compiler(format!("invalid abi for `{name}`: {e}")))?;

        let bytecode = hex::decode(contract.bin.trim_start_matches("0x"))
            .map_err(|e| DeployError::Compiler(format!("invalid bytecode for `{name}`: {e}")))?;

        registry.insert(
            name.clone(),
            CompiledContract {
                name,
                abi,
                bytecode: bytecode.into(),
            },
        );
    }

    Ok(registry)
}
