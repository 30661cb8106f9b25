//! 钱包发现集成测试
//!
//! 覆盖：候选筛选与排序、平局裁决、网络失败时的确定性降级

mod common;

use std::sync::Arc;

use common::{discovered, test_public_key, test_wallet, MockNetworkApi, MockStore};
use tonforge::domain::wallet::AuthKind;
use tonforge::domain::{derive_address, ContractVersion, Network, TonAddress};
use tonforge::service::WalletService;

fn service(api: MockNetworkApi) -> WalletService {
    WalletService::new(Arc::new(api), Network::Mainnet)
}

#[tokio::test]
async fn test_network_failure_falls_back_to_stable_default() {
    let svc = service(MockNetworkApi::offline());
    let pk = test_public_key(0x51);

    let wallet = svc.discover_active_wallet(&pk, true).await;
    assert_eq!(wallet.version, ContractVersion::V4R2);
    assert_eq!(
        wallet,
        derive_address(&pk, ContractVersion::V4R2, Network::Mainnet)
    );

    // 失败是纯的：重复调用得到同一地址
    let again = svc.discover_active_wallet(&pk, true).await;
    assert_eq!(wallet, again);
}

#[tokio::test]
async fn test_network_failure_with_newest_preference() {
    let svc = service(MockNetworkApi::offline());
    let pk = test_public_key(0x52);

    let wallet = svc.discover_active_wallet(&pk, false).await;
    assert_eq!(wallet.version, ContractVersion::V5R1);
    assert_eq!(
        wallet,
        derive_address(&pk, ContractVersion::V5R1, Network::Mainnet)
    );
}

#[tokio::test]
async fn test_no_candidates_falls_back() {
    // 场景：公钥 P1 名下无链上账户
    let svc = service(MockNetworkApi::with_accounts(vec![]));
    let p1 = test_public_key(0x01);
    let wallet = svc.discover_active_wallet(&p1, true).await;
    assert_eq!(
        wallet,
        derive_address(&p1, ContractVersion::V4R2, Network::Mainnet)
    );
}

#[tokio::test]
async fn test_picks_highest_balance() {
    let small = TonAddress::new(0, [1; 32]);
    let large = TonAddress::new(0, [2; 32]);
    let svc = service(MockNetworkApi::with_accounts(vec![
        discovered(&small, 10, true, "wallet_v3r2"),
        discovered(&large, 5_000, true, "wallet_v4r2"),
    ]));

    let wallet = svc.discover_active_wallet(&test_public_key(3), true).await;
    assert_eq!(wallet.raw_address, large);
    assert_eq!(wallet.version, ContractVersion::V4R2);
}

#[tokio::test]
async fn test_filters_unknown_interfaces_and_dormant_accounts() {
    let unknown = TonAddress::new(0, [1; 32]);
    let dormant = TonAddress::new(0, [2; 32]);
    let active_zero = TonAddress::new(0, [3; 32]);
    let svc = service(MockNetworkApi::with_accounts(vec![
        // 接口未知：余额再高也不是钱包候选
        discovered(&unknown, 9_000_000, true, "nft_collection"),
        // 零余额且未激活：跳过
        discovered(&dormant, 0, false, "wallet_v4r2"),
        // 零余额但已激活：保留
        discovered(&active_zero, 0, true, "wallet_v3r1"),
    ]));

    let wallet = svc.discover_active_wallet(&test_public_key(4), true).await;
    assert_eq!(wallet.raw_address, active_zero);
    assert_eq!(wallet.version, ContractVersion::V3R1);
}

#[tokio::test]
async fn test_balance_tie_resolved_by_version_order() {
    let newer = TonAddress::new(0, [7; 32]);
    let older = TonAddress::new(0, [8; 32]);
    // 故意把新版本放在列表前面：平局时按版本枚举序取更早的版本
    let svc = service(MockNetworkApi::with_accounts(vec![
        discovered(&newer, 1_000, true, "wallet_v5r1"),
        discovered(&older, 1_000, true, "wallet_v3r2"),
    ]));

    let wallet = svc.discover_active_wallet(&test_public_key(5), true).await;
    assert_eq!(wallet.version, ContractVersion::V3R2);
    assert_eq!(wallet.raw_address, older);
}

#[tokio::test]
async fn test_version_switch_persists_with_bumped_revision() {
    let svc = service(MockNetworkApi::with_accounts(vec![]));
    let store = MockStore::default();
    let wallet = test_wallet(0x41, AuthKind::Password);
    assert_eq!(wallet.active.version, ContractVersion::V4R2);

    let updated = svc
        .update_wallet_version(&store, &wallet, ContractVersion::V5R1)
        .await
        .unwrap();
    assert_eq!(updated.revision, wallet.revision + 1);
    assert_eq!(updated.active.version, ContractVersion::V5R1);
    assert_ne!(updated.active.raw_address, wallet.active.raw_address);
    // 新状态已写入持久化层
    let saved = store.saved.lock().unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0], updated);
}

#[tokio::test]
async fn test_discovered_display_address_is_friendly() {
    let raw = TonAddress::new(0, [9; 32]);
    let svc = service(MockNetworkApi::with_accounts(vec![discovered(
        &raw,
        100,
        true,
        "wallet_v4r2",
    )]));

    let wallet = svc.discover_active_wallet(&test_public_key(6), true).await;
    let (parsed, flags) = TonAddress::from_friendly(&wallet.display_address).unwrap();
    assert_eq!(parsed, raw);
    assert!(!flags.bounceable);
}
