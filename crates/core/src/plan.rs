//! Deployment plan: explicit dependency graph and run orchestration

use crate::chain::{ChainRpc, DeployedContract, Identity, TxReceipt};
use crate::compiler::SourceCompiler;
use crate::config::DeployConfig;
use crate::deployer::ContractDeployer;
use crate::error::DeployError;
use crate::linker::{BatchLinker, LinkCall};
use crate::status::StatusReporter;
use crate::submitter::TxSubmitter;
use chrono::{DateTime, Utc};
use ethers::abi::Token;
use ethers::types::{Address, U256};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

/// The number representing 1.0 in the contracts' fixed-point arithmetic
pub fn unit() -> U256 {
    U256::exp10(18)
}

/// Contracts deployed so far in a run, keyed by step id
pub type DeployedSet = BTreeMap<String, DeployedContract>;

/// Address of an earlier step's contract, as a constructor token
pub fn address_of(deployed: &DeployedSet, step: &str) -> Result<Token, DeployError> {
    handle(deployed, step).map(|contract| Token::Address(contract.address))
}

/// Handle of an earlier step's contract
pub fn handle<'d>(
    deployed: &'d DeployedSet,
    step: &str,
) -> Result<&'d DeployedContract, DeployError> {
    deployed.get(step).ok_or_else(|| {
        DeployError::InvalidPlan(format!("step `{step}` has not been deployed yet"))
    })
}

type ArgsFn = Box<dyn Fn(&DeployedSet) -> Result<Vec<Token>, DeployError> + Send + Sync>;
type LinksFn = Box<dyn Fn(&DeployedSet) -> Result<Vec<LinkCall>, DeployError> + Send + Sync>;

/// One contract deployment in the plan
pub struct DeployStep {
    /// Step id; also the key the deployed handle is stored under
    id: String,

    /// Display label for status lines and the final address listing
    label: String,

    /// Name of the compiled contract this step deploys
    contract: String,

    /// Step ids that must be deployed before this one
    depends_on: Vec<String>,

    /// Builds the constructor arguments from the already-deployed handles
    args: ArgsFn,
}

impl DeployStep {
    pub fn new(
        id: &str,
        label: &str,
        contract: &str,
        depends_on: &[&str],
        args: impl Fn(&DeployedSet) -> Result<Vec<Token>, DeployError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            contract: contract.to_string(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            args: Box::new(args),
        }
    }
}

/// An explicit directed acyclic graph of deployment steps plus the linking
/// calls issued once every step has confirmed
pub struct DeploymentPlan {
    steps: Vec<DeployStep>,
    links: LinksFn,
}

impl DeploymentPlan {
    pub fn new() -> Self {
        Self {
            steps: vec![],
            links: Box::new(|_| Ok(vec![])),
        }
    }

    pub fn add_step(&mut self, step: DeployStep) -> &mut Self {
        self.steps.push(step);
        self
    }

    /// Set the closure building the post-deployment linking calls
    pub fn set_links(
        &mut self,
        links: impl Fn(&DeployedSet) -> Result<Vec<LinkCall>, DeployError> + Send + Sync + 'static,
    ) -> &mut Self {
        self.links = Box::new(links);
        self
    }

    /// Topological execution order (Kahn), breaking ties by declaration
    /// order
    ///
    /// Duplicate ids, unknown dependencies, and cycles are graph
    /// construction errors, reported before any network traffic.
    pub fn execution_order(&self) -> Result<Vec<usize>, DeployError> {
        let mut index_of = BTreeMap::new();
        for (index, step) in self.steps.iter().enumerate() {
            if index_of.insert(step.id.as_str(), index).is_some() {
                return Err(DeployError::InvalidPlan(format!(
                    "duplicate step id `{}`",
                    step.id
                )));
            }
        }

        let n = self.steps.len();
        let mut indegree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![vec![]; n];
        for (index, step) in self.steps.iter().enumerate() {
            for dep in &step.depends_on {
                let &dep_index = index_of.get(dep.as_str()).ok_or_else(|| {
                    DeployError::InvalidPlan(format!(
                        "step `{}` depends on unknown step `{dep}`",
                        step.id
                    ))
                })?;
                dependents[dep_index].push(index);
                indegree[index] += 1;
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
            .filter(|&i| indegree[i] == 0)
            .map(Reverse)
            .collect();
        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(index)) = ready.pop() {
            order.push(index);
            for &dependent in &dependents[index] {
                indegree[dependent] -= 1;
                if indegree[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        if order.len() != n {
            let stuck: Vec<&str> = (0..n)
                .filter(|&i| indegree[i] > 0)
                .map(|i| self.steps[i].id.as_str())
                .collect();
            return Err(DeployError::InvalidPlan(format!(
                "dependency cycle involving steps {stuck:?}"
            )));
        }
        Ok(order)
    }
}

impl Default for DeploymentPlan {
    fn default() -> Self {
        Self::new()
    }
}

/// Final addresses and receipts of a completed run
#[derive(Debug, Clone)]
pub struct DeploymentSummary {
    /// Deployed (label, address) pairs, in deployment order
    pub addresses: Vec<(String, Address)>,

    /// Receipts of the linking calls, in submission order
    pub link_receipts: Vec<TxReceipt>,

    /// When the run finished
    pub finished_at: DateTime<Utc>,
}

impl DeploymentSummary {
    pub fn address_of(&self, label: &str) -> Option<Address> {
        self.addresses
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, address)| *address)
    }
}

/// Everything a run needs, passed in at construction
pub struct Deployment<'a, C: ChainRpc> {
    pub config: &'a DeployConfig,
    pub chain: &'a C,
    pub identity: &'a Identity,
    pub compiler: &'a dyn SourceCompiler,
    pub reporter: StatusReporter,
}

impl<'a, C: ChainRpc> Deployment<'a, C> {
    /// Run the plan: compile, deploy in dependency order, link, summarize
    ///
    /// The first failed step aborts the remainder of the run; contracts
    /// already confirmed on-chain stay deployed.
    pub async fn run(&self, plan: &DeploymentPlan) -> Result<DeploymentSummary, DeployError> {
        let order = plan.execution_order()?;

        let registry = self
            .reporter
            .run("Compiling contracts... ", async {
                self.compiler.compile(&self.config.sources)
            })
            .await?;

        let submitter = TxSubmitter::new(self.chain, self.identity, self.config);
        let deployer =
            ContractDeployer::new(&registry, &submitter, self.config.gas.deploy_gas_limit);

        let mut deployed = DeployedSet::new();
        let mut addresses = Vec::with_capacity(order.len());
        for index in order {
            let step = &plan.steps[index];
            let args = (step.args)(&deployed)?;
            let (contract, _receipt) = self
                .reporter
                .run(
                    &format!("Deploying {}... ", step.label),
                    deployer.deploy(&step.contract, &args),
                )
                .await?;
            addresses.push((step.label.clone(), contract.address));
            deployed.insert(step.id.clone(), contract);
        }

        let calls = (plan.links)(&deployed)?;
        let linker = BatchLinker::new(&submitter, self.config.gas.link_gas_limit);
        let link_receipts = self
            .reporter
            .run("Linking contracts... ", linker.link(&calls))
            .await?;

        Ok(DeploymentSummary {
            addresses,
            link_receipts,
            finished_at: Utc::now(),
        })
    }
}

/// The fixed Havven suite
///
/// Proxies carry no dependencies; Havven references its proxy; Nomin its
/// proxy and Havven; Court references Havven and Nomin; the escrow
/// references Havven. Six linking calls wire the deployed addresses into
/// each other's storage.
pub fn havven_plan(owner: Address) -> DeploymentPlan {
    let mut plan = DeploymentPlan::new();

    plan.add_step(DeployStep::new(
        "havven_proxy",
        "Havven Proxy",
        "Proxy",
        &[],
        move |_| Ok(vec![Token::Address(owner)]),
    ));
    plan.add_step(DeployStep::new(
        "nomin_proxy",
        "Nomin Proxy",
        "Proxy",
        &[],
        move |_| Ok(vec![Token::Address(owner)]),
    ));
    plan.add_step(DeployStep::new(
        "havven",
        "Havven",
        "Havven",
        &["havven_proxy"],
        move |d| {
            Ok(vec![
                address_of(d, "havven_proxy")?,
                Token::Address(Address::zero()),
                Token::Address(owner),
                Token::Address(owner),
                // Half of all value may be issued
                Token::Uint(unit() / U256::from(2)),
                Token::Array(vec![Token::Address(owner)]),
                Token::Address(Address::zero()),
            ])
        },
    ));
    plan.add_step(DeployStep::new(
        "nomin",
        "Nomin",
        "Nomin",
        &["nomin_proxy", "havven"],
        move |d| {
            Ok(vec![
                address_of(d, "nomin_proxy")?,
                Token::Address(owner),
                address_of(d, "havven")?,
                Token::Uint(1_000_000_000u64.into()),
                Token::Address(owner),
            ])
        },
    ));
    plan.add_step(DeployStep::new(
        "court",
        "Court",
        "Court",
        &["havven", "nomin"],
        move |d| {
            Ok(vec![
                address_of(d, "havven")?,
                address_of(d, "nomin")?,
                Token::Address(owner),
            ])
        },
    ));
    plan.add_step(DeployStep::new(
        "escrow",
        "Escrow",
        "HavvenEscrow",
        &["havven"],
        move |d| Ok(vec![Token::Address(owner), address_of(d, "havven")?]),
    ));

    plan.set_links(|d| {
        Ok(vec![
            handle(d, "havven_proxy")?.call("setTarget", &[address_of(d, "havven")?])?,
            handle(d, "nomin_proxy")?.call("setTarget", &[address_of(d, "nomin")?])?,
            handle(d, "havven")?.call("setNomin", &[address_of(d, "nomin")?])?,
            handle(d, "nomin")?.call("setCourt", &[address_of(d, "court")?])?,
            handle(d, "nomin")?.call("setHavven", &[address_of(d, "havven")?])?,
            handle(d, "havven")?.call("setEscrow", &[address_of(d, "escrow")?])?,
        ])
    });

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{MockChain, TEST_KEY};
    use crate::compiler::{CompiledContract, ContractRegistry};
    use ethers::abi::Abi;

    fn abi(json: &str) -> Abi {
        serde_json::from_str(json).unwrap()
    }

    fn compiled(name: &str, abi_json: &str, bytecode: Vec<u8>) -> CompiledContract {
        CompiledContract {
            name: name.to_string(),
            abi: abi(abi_json),
            bytecode: bytecode.into(),
        }
    }

    /// Registry with the whole Havven suite, minimal ABIs
    fn havven_registry() -> ContractRegistry {
        let mut registry = ContractRegistry::new();
        registry.insert(
            "Proxy".to_string(),
            compiled(
                "Proxy",
                r#"[
                    {"type":"constructor","inputs":[{"name":"_owner","type":"address"}],"stateMutability":"nonpayable"},
                    {"type":"function","name":"setTarget","inputs":[{"name":"_target","type":"address"}],"outputs":[],"stateMutability":"nonpayable"}
                ]"#,
                vec![0x01],
            ),
        );
        registry.insert(
            "Havven".to_string(),
            compiled(
                "Havven",
                r#"[
                    {"type":"constructor","inputs":[
                        {"name":"_proxy","type":"address"},
                        {"name":"_tokenState","type":"address"},
                        {"name":"_owner","type":"address"},
                        {"name":"_oracle","type":"address"},
                        {"name":"_price","type":"uint256"},
                        {"name":"_issuers","type":"address[]"},
                        {"name":"_oldHavven","type":"address"}
                    ],"stateMutability":"nonpayable"},
                    {"type":"function","name":"setNomin","inputs":[{"name":"_nomin","type":"address"}],"outputs":[],"stateMutability":"nonpayable"},
                    {"type":"function","name":"setEscrow","inputs":[{"name":"_escrow","type":"address"}],"outputs":[],"stateMutability":"nonpayable"}
                ]"#,
                vec![0x02],
            ),
        );
        registry.insert(
            "Nomin".to_string(),
            compiled(
                "Nomin",
                r#"[
                    {"type":"constructor","inputs":[
                        {"name":"_proxy","type":"address"},
                        {"name":"_owner","type":"address"},
                        {"name":"_havven","type":"address"},
                        {"name":"_initialPool","type":"uint256"},
                        {"name":"_beneficiary","type":"address"}
                    ],"stateMutability":"nonpayable"},
                    {"type":"function","name":"setCourt","inputs":[{"name":"_court","type":"address"}],"outputs":[],"stateMutability":"nonpayable"},
                    {"type":"function","name":"setHavven","inputs":[{"name":"_havven","type":"address"}],"outputs":[],"stateMutability":"nonpayable"}
                ]"#,
                vec![0x03],
            ),
        );
        registry.insert(
            "Court".to_string(),
            compiled(
                "Court",
                r#"[{"type":"constructor","inputs":[
                    {"name":"_havven","type":"address"},
                    {"name":"_nomin","type":"address"},
                    {"name":"_owner","type":"address"}
                ],"stateMutability":"nonpayable"}]"#,
                vec![0x04],
            ),
        );
        registry.insert(
            "HavvenEscrow".to_string(),
            compiled(
                "HavvenEscrow",
                r#"[{"type":"constructor","inputs":[
                    {"name":"_owner","type":"address"},
                    {"name":"_havven","type":"address"}
                ],"stateMutability":"nonpayable"}]"#,
                vec![0x05],
            ),
        );
        registry
    }

    /// Compiler stub handing out a pre-built registry
    struct FixtureCompiler(ContractRegistry);

    impl SourceCompiler for FixtureCompiler {
        fn compile(&self, _sources: &[std::path::PathBuf]) -> Result<ContractRegistry, DeployError> {
            Ok(self.0.clone())
        }
    }

    /// Compiler stub that always reports a diagnostic
    struct FailingCompiler;

    impl SourceCompiler for FailingCompiler {
        fn compile(&self, _sources: &[std::path::PathBuf]) -> Result<ContractRegistry, DeployError> {
            Err(DeployError::Compiler(
                "ParserError: Expected ';' but got '}'".to_string(),
            ))
        }
    }

    fn test_identity() -> Identity {
        Identity::from_private_key(TEST_KEY, 1337).unwrap()
    }

    fn test_config(deployer: Address) -> DeployConfig {
        DeployConfig::builder()
            .rpc_url("http://localhost:8545")
            .chain_id(1337)
            .deployer(deployer)
            .source("contracts/Havven.sol".into())
            .confirmations(|c| {
                c.poll_interval_ms = 1;
                c.timeout_secs = 1;
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_havven_plan_orders_steps_as_declared() {
        let plan = havven_plan(Address::repeat_byte(0x01));
        let order = plan.execution_order().unwrap();
        let ids: Vec<&str> = order.iter().map(|&i| plan.steps[i].id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["havven_proxy", "nomin_proxy", "havven", "nomin", "court", "escrow"]
        );
    }

    #[test]
    fn test_execution_order_rejects_unknown_dependency() {
        let mut plan = DeploymentPlan::new();
        plan.add_step(DeployStep::new("a", "A", "A", &["ghost"], |_| Ok(vec![])));

        let result = plan.execution_order();
        assert!(
            matches!(result, Err(DeployError::InvalidPlan(ref msg)) if msg.contains("ghost"))
        );
    }

    #[test]
    fn test_execution_order_rejects_cycle() {
        let mut plan = DeploymentPlan::new();
        plan.add_step(DeployStep::new("a", "A", "A", &["b"], |_| Ok(vec![])));
        plan.add_step(DeployStep::new("b", "B", "B", &["a"], |_| Ok(vec![])));

        let result = plan.execution_order();
        assert!(matches!(result, Err(DeployError::InvalidPlan(ref msg)) if msg.contains("cycle")));
    }

    #[test]
    fn test_execution_order_rejects_duplicate_id() {
        let mut plan = DeploymentPlan::new();
        plan.add_step(DeployStep::new("a", "A", "A", &[], |_| Ok(vec![])));
        plan.add_step(DeployStep::new("a", "A again", "A", &[], |_| Ok(vec![])));

        let result = plan.execution_order();
        assert!(
            matches!(result, Err(DeployError::InvalidPlan(ref msg)) if msg.contains("duplicate"))
        );
    }

    #[tokio::test]
    async fn test_failed_compile_performs_zero_submissions() {
        let identity = test_identity();
        let chain = MockChain::new(identity.address(), 1337, 0);
        let config = test_config(identity.address());
        let deployment = Deployment {
            config: &config,
            chain: &chain,
            identity: &identity,
            compiler: &FailingCompiler,
            reporter: StatusReporter::silent(),
        };

        let result = deployment.run(&havven_plan(identity.address())).await;

        assert!(matches!(result, Err(DeployError::Compiler(_))));
        assert!(chain.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_missing_contract_aborts_remaining_steps() {
        let identity = test_identity();
        let chain = MockChain::new(identity.address(), 1337, 0);
        let config = test_config(identity.address());
        let mut registry = havven_registry();
        registry.remove("Court");
        let compiler = FixtureCompiler(registry);
        let deployment = Deployment {
            config: &config,
            chain: &chain,
            identity: &identity,
            compiler: &compiler,
            reporter: StatusReporter::silent(),
        };

        let result = deployment.run(&havven_plan(identity.address())).await;

        assert!(matches!(
            result,
            Err(DeployError::UnknownContract(ref name)) if name == "Court"
        ));
        // The four earlier creations confirmed; the escrow was never
        // attempted and no linking call went out.
        assert_eq!(chain.mined().len(), 4);
        assert!(chain.mined().iter().all(|tx| tx.to.is_none()));
    }

    #[tokio::test]
    async fn test_havven_suite_end_to_end() {
        let identity = test_identity();
        let chain = MockChain::new(identity.address(), 1337, 0);
        let config = test_config(identity.address());
        let compiler = FixtureCompiler(havven_registry());
        let deployment = Deployment {
            config: &config,
            chain: &chain,
            identity: &identity,
            compiler: &compiler,
            reporter: StatusReporter::silent(),
        };

        let summary = deployment.run(&havven_plan(identity.address())).await.unwrap();

        assert_eq!(summary.addresses.len(), 6);
        assert_eq!(summary.link_receipts.len(), 6);

        let mined = chain.mined();
        assert_eq!(mined.len(), 12);
        // Six creations followed by six calls, nonces strictly increasing
        let nonces: Vec<u64> = mined.iter().map(|tx| tx.nonce).collect();
        assert_eq!(nonces, (0..12).collect::<Vec<u64>>());
        assert!(mined[..6].iter().all(|tx| tx.to.is_none()));
        assert!(mined[6..].iter().all(|tx| tx.to.is_some()));

        // The first linking call points the Havven proxy at Havven
        let havven_proxy = summary.address_of("Havven Proxy").unwrap();
        let havven = summary.address_of("Havven").unwrap();
        assert_eq!(mined[6].to, Some(havven_proxy));
        assert_eq!(&mined[6].input[16..36], havven.as_bytes());

        // Nomin's constructor received the deployed Havven address
        let nomin_creation = &mined[3];
        let words = &nomin_creation.input[1..]; // single-byte fixture bytecode
        assert_eq!(&words[32 * 2 + 12..32 * 3], havven.as_bytes());
    }

    #[tokio::test]
    async fn test_three_contract_chain_wires_expected_addresses() {
        // A has no dependencies; B references A; C references A and B.
        let a_abi = r#"[]"#;
        let b_abi = r#"[
            {"type":"constructor","inputs":[{"name":"_a","type":"address"}],"stateMutability":"nonpayable"},
            {"type":"function","name":"setA","inputs":[{"name":"_a","type":"address"}],"outputs":[],"stateMutability":"nonpayable"}
        ]"#;
        let c_abi = r#"[
            {"type":"constructor","inputs":[{"name":"_a","type":"address"},{"name":"_b","type":"address"}],"stateMutability":"nonpayable"},
            {"type":"function","name":"setA","inputs":[{"name":"_a","type":"address"}],"outputs":[],"stateMutability":"nonpayable"},
            {"type":"function","name":"setB","inputs":[{"name":"_b","type":"address"}],"outputs":[],"stateMutability":"nonpayable"}
        ]"#;

        let mut registry = ContractRegistry::new();
        registry.insert("A".to_string(), compiled("A", a_abi, vec![0x0a]));
        registry.insert("B".to_string(), compiled("B", b_abi, vec![0x0b]));
        registry.insert("C".to_string(), compiled("C", c_abi, vec![0x0c]));

        let mut plan = DeploymentPlan::new();
        plan.add_step(DeployStep::new("a", "A", "A", &[], |_| Ok(vec![])));
        plan.add_step(DeployStep::new("b", "B", "B", &["a"], |d| {
            Ok(vec![address_of(d, "a")?])
        }));
        plan.add_step(DeployStep::new("c", "C", "C", &["a", "b"], |d| {
            Ok(vec![address_of(d, "a")?, address_of(d, "b")?])
        }));
        plan.set_links(|d| {
            Ok(vec![
                handle(d, "b")?.call("setA", &[address_of(d, "a")?])?,
                handle(d, "c")?.call("setA", &[address_of(d, "a")?])?,
                handle(d, "c")?.call("setB", &[address_of(d, "b")?])?,
            ])
        });

        let identity = test_identity();
        let chain = MockChain::new(identity.address(), 1337, 0);
        let config = test_config(identity.address());
        let compiler = FixtureCompiler(registry);
        let deployment = Deployment {
            config: &config,
            chain: &chain,
            identity: &identity,
            compiler: &compiler,
            reporter: StatusReporter::silent(),
        };

        let summary = deployment.run(&plan).await.unwrap();
        let a = summary.address_of("A").unwrap();
        let b = summary.address_of("B").unwrap();
        let c = summary.address_of("C").unwrap();

        let mined = chain.mined();
        assert_eq!(mined.len(), 6);

        // B's stored A-reference: the call addressed at B carries A's address
        assert_eq!(mined[3].to, Some(b));
        assert_eq!(&mined[3].input[16..36], a.as_bytes());

        // C's stored references carry A's and B's addresses, respectively
        assert_eq!(mined[4].to, Some(c));
        assert_eq!(&mined[4].input[16..36], a.as_bytes());
        assert_eq!(mined[5].to, Some(c));
        assert_eq!(&mined[5].input[16..36], b.as_bytes());
    }
}
