//! CLI for the havven-deployer library
//!
//! Compiles the Havven contract suite and deploys it to an EVM chain,
//! wiring the deployed addresses into each other's storage.

use clap::{Parser, Subcommand};
use eyre::{Context, Result};
use havven_deployer::{
    havven_plan, ChainRpc, DeployConfig, DeployError, Deployment, HttpChain, Identity,
    SolcCompiler, SourceCompiler, StatusReporter,
};
use std::path::{Path, PathBuf};
use tracing::Level;

/// Environment variable consulted when no --key-file is given
const KEY_ENV_VAR: &str = "HAVVEN_DEPLOYER_KEY";

/// Havven contract suite compiler and deployer
#[derive(Parser, Debug)]
#[command(name = "havven-deployer")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all logging except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile the configured sources without deploying anything
    Compile {
        /// Path to the deployment configuration
        #[arg(short, long, default_value = "deploy.toml")]
        config: PathBuf,
    },

    /// Compile, deploy, and link the whole suite
    Deploy {
        /// Path to the deployment configuration
        #[arg(short, long, default_value = "deploy.toml")]
        config: PathBuf,

        /// File holding the deployer's hex-encoded private key
        ///
        /// Falls back to the HAVVEN_DEPLOYER_KEY environment variable.
        #[arg(long)]
        key_file: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        Level::ERROR
    } else if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Compile { config } => run_compile(config),
        Commands::Deploy { config, key_file } => {
            let runtime = tokio::runtime::Runtime::new().expect("Failed to create async runtime");
            runtime.block_on(run_deploy(config, key_file))
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run_compile(config_path: PathBuf) -> Result<()> {
    let config = DeployConfig::load(&config_path).context("Failed to load configuration")?;

    let compiler = SolcCompiler::new(&config.solc, config.remappings.clone())?;
    tracing::info!("using {}", compiler.version()?);

    let registry = compiler
        .compile(&config.sources)
        .context("Compilation failed")?;

    println!("Compiled {} contracts:", registry.len());
    for (name, contract) in &registry {
        println!(
            "  {name}: {} bytes, hash 0x{}",
            contract.bytecode.len(),
            contract.bytecode_hash()
        );
    }
    Ok(())
}

async fn run_deploy(config_path: PathBuf, key_file: Option<PathBuf>) -> Result<()> {
    let config = DeployConfig::load(&config_path).context("Failed to load configuration")?;

    let key = load_key(key_file.as_deref())?;
    let identity = Identity::from_private_key(&key, config.chain_id)?;
    if identity.address() != config.deployer {
        return Err(DeployError::KeyMismatch {
            derived: identity.address(),
            configured: config.deployer,
        }
        .into());
    }

    let chain = HttpChain::connect(&config.rpc_url)?;

    // Refuse to sign for a different network than the config names
    let node_chain_id = chain.chain_id().await.context("Failed to get chain ID")?;
    if node_chain_id != config.chain_id {
        return Err(eyre::eyre!(
            "Chain ID mismatch: expected {}, got {}",
            config.chain_id,
            node_chain_id
        ));
    }

    let compiler = SolcCompiler::new(&config.solc, config.remappings.clone())?;
    tracing::info!("using {}", compiler.version()?);

    println!("Deployment initiated...\n");

    let deployment = Deployment {
        config: &config,
        chain: &chain,
        identity: &identity,
        compiler: &compiler,
        reporter: StatusReporter::new(),
    };
    let summary = deployment.run(&havven_plan(identity.address())).await?;

    println!();
    println!("Addresses");
    println!("========\n");
    let width = summary
        .addresses
        .iter()
        .map(|(label, _)| label.len() + 1)
        .max()
        .unwrap_or(0);
    for (label, address) in &summary.addresses {
        println!("{:<width$} {address:#x}", format!("{label}:"));
    }
    println!("\nOwner: {:#x}", identity.address());
    println!(
        "\nDeployment complete at {}.\n",
        summary.finished_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(())
}

/// Key material comes from a file or the environment, never the config
fn load_key(key_file: Option<&Path>) -> Result<String> {
    if let Some(path) = key_file {
        let key = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read key file {}", path.display()))?;
        return Ok(key.trim().to_string());
    }
    std::env::var(KEY_ENV_VAR).with_context(|| {
        format!("No --key-file given and {KEY_ENV_VAR} is not set")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["havven-deployer", "compile"]);
        assert!(matches!(cli.command, Commands::Compile { .. }));

        let cli = Cli::parse_from([
            "havven-deployer",
            "deploy",
            "--config",
            "networks/local.toml",
            "--key-file",
            "deployer.key",
        ]);
        match cli.command {
            Commands::Deploy { config, key_file } => {
                assert_eq!(config, PathBuf::from("networks/local.toml"));
                assert_eq!(key_file, Some(PathBuf::from("deployer.key")));
            }
            other => panic!("expected deploy command, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_defaults_config_path() {
        let cli = Cli::parse_from(["havven-deployer", "deploy"]);
        if let Commands::Deploy { config, key_file } = cli.command {
            assert_eq!(config, PathBuf::from("deploy.toml"));
            assert_eq!(key_file, None);
        }
    }

    #[test]
    fn test_load_key_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deployer.key");
        std::fs::write(&path, "0xabc123\n").unwrap();

        let key = load_key(Some(&path)).unwrap();
        assert_eq!(key, "0xabc123");
    }

    #[test]
    fn test_load_key_missing_file_is_an_error() {
        let result = load_key(Some(Path::new("/nonexistent/deployer.key")));
        assert!(result.is_err());
    }
}
