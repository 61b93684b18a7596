// deployer/tests/deploy.rs

use deployer::{
    Account, ContractArtifact, DeployError, ExecutionMode, GasSetting, Network, NetworkSettings,
    RpcError, SharedSettings, TxOverrides,
};
use devchain::{fixtures, LocalChain, LocalChainConfig};
use ethers_core::abi::Token;
use ethers_core::types::{Address, U256};
use std::sync::Arc;

const NODE_GAS_PRICE: u64 = 20_000_000_000;

struct Setup {
    chain: Arc<LocalChain>,
    network: Network,
    account: Account,
}

async fn setup_with(config: LocalChainConfig, settings: NetworkSettings, mode: ExecutionMode) -> Setup {
    let chain = Arc::new(LocalChain::new(config));
    let network = Network::connect("development", chain.clone(), SharedSettings::new(settings))
        .await
        .unwrap()
        .with_mode(mode);
    let account = network.account(chain.accounts()[0].secret).unwrap();
    Setup {
        chain,
        network,
        account,
    }
}

async fn setup(mode: ExecutionMode) -> Setup {
    setup_with(LocalChainConfig::default(), NetworkSettings::development(), mode).await
}

fn tester() -> ContractArtifact {
    ContractArtifact::from_value(fixtures::tester().unwrap().artifact_json()).unwrap()
}

#[tokio::test]
async fn test_deploy_returns_contract() {
    let s = setup(ExecutionMode::Script).await;

    let deployment = s
        .account
        .deploy(&tester(), &[Token::Bool(true)], TxOverrides::default())
        .await
        .unwrap();

    let contract = deployment.contract().unwrap();
    assert_eq!(contract.name(), "Tester");
    assert_eq!(contract.tx().status, 1);
    assert_eq!(contract.tx().contract_address, Some(contract.address()));
    assert!(!s.chain.code(contract.address()).await.is_empty());
    assert_eq!(
        contract.call("value", &[]).await.unwrap(),
        vec![Token::Uint(U256::from(fixtures::TESTER_INITIAL_VALUE))]
    );
}

#[tokio::test]
async fn test_revert_raises_in_script_mode() {
    let s = setup(ExecutionMode::Script).await;

    let err = s
        .account
        .deploy(&tester(), &[Token::Bool(false)], TxOverrides::default())
        .await
        .unwrap_err();

    match err {
        DeployError::VirtualMachine(vm) => {
            assert_eq!(vm.revert_reason.as_deref(), Some(fixtures::TESTER_REJECTED));
            assert_eq!(vm.receipt.status, 0);
            assert_eq!(vm.gas_used, vm.receipt.gas_used);
        }
        other => panic!("expected VirtualMachineError, got {:?}", other),
    }
    // The reverted transaction was still mined
    assert_eq!(s.account.nonce().await.unwrap(), 1);
}

#[tokio::test]
async fn test_revert_returns_receipt_in_interactive_mode() {
    let s = setup(ExecutionMode::Interactive).await;

    let deployment = s
        .account
        .deploy(&tester(), &[Token::Bool(false)], TxOverrides::default())
        .await
        .unwrap();

    assert!(deployment.is_reverted());
    let receipt = deployment.receipt();
    assert_eq!(receipt.status, 0);
    assert_eq!(receipt.contract_address, None);
    assert_eq!(receipt.revert_reason.as_deref(), Some(fixtures::TESTER_REJECTED));
}

#[tokio::test]
async fn test_failed_estimate_without_fallback_sends_nothing() {
    let s = setup_with(
        LocalChainConfig::default(),
        NetworkSettings::default(),
        ExecutionMode::Interactive,
    )
    .await;

    let err = s
        .account
        .deploy(&tester(), &[Token::Bool(false)], TxOverrides::default())
        .await
        .unwrap_err();

    match err {
        DeployError::Rpc(e) => assert!(e.is_execution_failure()),
        other => panic!("expected an estimation failure, got {:?}", other),
    }
    assert_eq!(s.account.nonce().await.unwrap(), 0);
    assert_eq!(s.chain.block_number().await, 0);
}

#[tokio::test]
async fn test_nonce_advances_and_resets() {
    let s = setup(ExecutionMode::Script).await;
    assert_eq!(s.account.nonce().await.unwrap(), 0);

    s.account
        .deploy(&tester(), &[Token::Bool(true)], TxOverrides::default())
        .await
        .unwrap();
    assert_eq!(s.account.nonce().await.unwrap(), 1);

    s.network.reset().await.unwrap();
    assert_eq!(s.account.nonce().await.unwrap(), 0);
}

#[tokio::test]
async fn test_sequential_deploys_use_consecutive_nonces() {
    let s = setup(ExecutionMode::Script).await;

    let mut nonces = Vec::new();
    for _ in 0..2 {
        let deployment = s
            .account
            .deploy(&tester(), &[Token::Bool(true)], TxOverrides::default())
            .await
            .unwrap();
        nonces.push(deployment.receipt().nonce);
    }
    assert_eq!(nonces, vec![0, 1]);
}

#[tokio::test]
async fn test_concurrent_deploys_get_distinct_nonces() {
    let s = setup(ExecutionMode::Script).await;
    let artifact = tester();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let account = s.account.clone();
            let artifact = artifact.clone();
            tokio::spawn(async move {
                account
                    .deploy(&artifact, &[Token::Bool(true)], TxOverrides::default())
                    .await
                    .map(|d| d.receipt().nonce)
            })
        })
        .collect();

    let mut nonces = Vec::new();
    for handle in handles {
        nonces.push(handle.await.unwrap().unwrap());
    }
    nonces.sort_unstable();
    assert_eq!(nonces, vec![0, 1, 2, 3]);
    assert_eq!(s.account.nonce().await.unwrap(), 4);
}

#[tokio::test]
async fn test_explicit_gas_price() {
    let s = setup(ExecutionMode::Script).await;
    let before = s.account.balance().await.unwrap();

    let deployment = s
        .account
        .deploy(
            &tester(),
            &[Token::Bool(true)],
            TxOverrides::default().gas_price(100u64),
        )
        .await
        .unwrap();

    let receipt = deployment.receipt();
    assert_eq!(receipt.gas_price, U256::from(100));
    assert_eq!(
        s.account.balance().await.unwrap(),
        before - receipt.gas_used * U256::from(100)
    );
}

#[tokio::test]
async fn test_auto_gas_price_uses_node() {
    for setting in ["auto", "true", "false", "none"] {
        let s = setup(ExecutionMode::Script).await;
        s.network
            .settings()
            .set_gas_price(setting.parse::<GasSetting>().unwrap())
            .await;

        let before = s.account.balance().await.unwrap();

        let deployment = s
            .account
            .deploy(&tester(), &[Token::Bool(true)], TxOverrides::default())
            .await
            .unwrap();
        let receipt = deployment.receipt();
        assert_eq!(
            receipt.gas_price,
            U256::from(NODE_GAS_PRICE),
            "setting {:?}",
            setting
        );
        assert_eq!(
            s.account.balance().await.unwrap(),
            before - receipt.gas_used * U256::from(NODE_GAS_PRICE),
            "setting {:?}",
            setting
        );
    }
}

#[tokio::test]
async fn test_configured_gas_price() {
    let s = setup(ExecutionMode::Script).await;
    s.network.settings().set_gas_price(GasSetting::fixed(50u64)).await;
    let before = s.account.balance().await.unwrap();

    let deployment = s
        .account
        .deploy(&tester(), &[Token::Bool(true)], TxOverrides::default())
        .await
        .unwrap();

    let receipt = deployment.receipt();
    assert_eq!(receipt.gas_price, U256::from(50));
    assert_eq!(
        s.account.balance().await.unwrap(),
        before - receipt.gas_used * U256::from(50)
    );
}

#[tokio::test]
async fn test_zero_gas_price_is_free() {
    let s = setup(ExecutionMode::Script).await;
    s.network.settings().set_gas_price(GasSetting::fixed(0u64)).await;
    let before = s.account.balance().await.unwrap();

    let deployment = s
        .account
        .deploy(&tester(), &[Token::Bool(true)], TxOverrides::default())
        .await
        .unwrap();

    assert_eq!(deployment.receipt().gas_price, U256::zero());
    assert_eq!(s.account.balance().await.unwrap(), before);
}

#[tokio::test]
async fn test_explicit_gas_limit() {
    let s = setup(ExecutionMode::Script).await;

    let deployment = s
        .account
        .deploy(
            &tester(),
            &[Token::Bool(true)],
            TxOverrides::default().gas_limit(3_000_000u64),
        )
        .await
        .unwrap();
    assert_eq!(deployment.receipt().gas_limit, U256::from(3_000_000));
}

#[tokio::test]
async fn test_auto_gas_limit_matches_gas_used() {
    for setting in ["auto", "true", "false", "none"] {
        let s = setup(ExecutionMode::Script).await;
        s.network
            .settings()
            .set_gas_limit(setting.parse::<GasSetting>().unwrap())
            .await;

        let deployment = s
            .account
            .deploy(&tester(), &[Token::Bool(true)], TxOverrides::default())
            .await
            .unwrap();

        let receipt = deployment.receipt();
        assert_eq!(receipt.gas_limit, receipt.gas_used, "setting {:?}", setting);
    }
}

#[tokio::test]
async fn test_configured_gas_limit() {
    let s = setup(ExecutionMode::Script).await;
    s.network
        .settings()
        .set_gas_limit(GasSetting::fixed(5_000_000u64))
        .await;

    let deployment = s
        .account
        .deploy(&tester(), &[Token::Bool(true)], TxOverrides::default())
        .await
        .unwrap();
    assert_eq!(deployment.receipt().gas_limit, U256::from(5_000_000));
}

#[tokio::test]
async fn test_incompatible_node_is_rejected_before_sending() {
    let s = setup_with(
        LocalChainConfig {
            hardfork: deployer::EvmVersion::Byzantium,
            ..Default::default()
        },
        NetworkSettings::development(),
        ExecutionMode::Script,
    )
    .await;

    let err = s
        .account
        .deploy(&tester(), &[Token::Bool(true)], TxOverrides::default())
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::IncompatibleEvmVersion { .. }));
    assert_eq!(s.account.nonce().await.unwrap(), 0);
    assert_eq!(s.chain.block_number().await, 0);
}

#[tokio::test]
async fn test_artifact_evm_version_overrides_network_target() {
    let artifact = ContractArtifact::from_value(fixtures::shanghai_only().artifact_json()).unwrap();

    let istanbul = setup(ExecutionMode::Interactive).await;
    let err = istanbul
        .account
        .deploy(&artifact, &[], TxOverrides::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DeployError::IncompatibleEvmVersion {
            target: deployer::EvmVersion::Shanghai,
            ..
        }
    ));

    let shanghai = setup_with(
        LocalChainConfig {
            hardfork: deployer::EvmVersion::Shanghai,
            ..Default::default()
        },
        NetworkSettings::development(),
        ExecutionMode::Script,
    )
    .await;
    let deployment = shanghai
        .account
        .deploy(&artifact, &[], TxOverrides::default())
        .await
        .unwrap();
    assert!(deployment.contract().is_some());
}

#[tokio::test]
async fn test_transact_and_call() {
    let s = setup(ExecutionMode::Script).await;
    let deployment = s
        .account
        .deploy(&tester(), &[Token::Bool(true)], TxOverrides::default())
        .await
        .unwrap();
    let contract = deployment.contract().unwrap();

    let receipt = contract
        .transact(
            &s.account,
            "set",
            &[Token::Uint(U256::from(7))],
            TxOverrides::default(),
        )
        .await
        .unwrap();
    assert!(receipt.is_success());
    assert_eq!(receipt.receiver, Some(contract.address()));
    assert_eq!(receipt.logs.len(), 1);
    assert_eq!(
        contract.call("value", &[]).await.unwrap(),
        vec![Token::Uint(U256::from(7))]
    );
}

#[tokio::test]
async fn test_failing_transact_follows_mode() {
    let script = setup(ExecutionMode::Script).await;
    let deployment = script
        .account
        .deploy(&tester(), &[Token::Bool(true)], TxOverrides::default())
        .await
        .unwrap();
    let err = deployment
        .contract()
        .unwrap()
        .transact(&script.account, "fail", &[], TxOverrides::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::VirtualMachine(_)));

    let console = setup(ExecutionMode::Interactive).await;
    let deployment = console
        .account
        .deploy(&tester(), &[Token::Bool(true)], TxOverrides::default())
        .await
        .unwrap();
    let receipt = deployment
        .contract()
        .unwrap()
        .transact(&console.account, "fail", &[], TxOverrides::default())
        .await
        .unwrap();
    assert_eq!(receipt.status, 0);
    assert_eq!(receipt.revert_reason.as_deref(), Some(fixtures::TESTER_FAILED));
}

#[tokio::test]
async fn test_insufficient_funds_is_a_node_error() {
    let s = setup(ExecutionMode::Script).await;
    let balance = s.account.balance().await.unwrap();

    let err = s
        .account
        .transfer(Address::repeat_byte(1), balance, TxOverrides::default())
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Rpc(RpcError::Node { .. })));
    assert_eq!(s.account.nonce().await.unwrap(), 0);
}
