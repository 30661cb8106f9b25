//! 地址派生集成测试
//!
//! 覆盖：派生纯度、版本区分、展示格式与全版本枚举

mod common;

use common::test_public_key;
use tonforge::domain::{
    derive_address, derive_all_addresses, ContractVersion, Network, TonAddress,
};

#[test]
fn test_derivation_is_pure() {
    for version in ContractVersion::ALL {
        for network in [Network::Mainnet, Network::Testnet] {
            let first = derive_address(&test_public_key(0x21), version, network);
            let second = derive_address(&test_public_key(0x21), version, network);
            assert_eq!(first, second, "{} on {:?}", version, network);
        }
    }
}

#[test]
fn test_versions_yield_distinct_addresses() {
    let addresses = derive_all_addresses(&test_public_key(0x21), Network::Mainnet);
    assert_eq!(addresses.len(), ContractVersion::ALL.len());
    for i in 0..addresses.len() {
        assert_eq!(addresses[i].version, ContractVersion::ALL[i]);
        for j in i + 1..addresses.len() {
            assert_ne!(
                addresses[i].raw_address, addresses[j].raw_address,
                "{} vs {}",
                addresses[i].version, addresses[j].version
            );
        }
    }
}

#[test]
fn test_keys_yield_distinct_addresses() {
    let a = derive_address(&test_public_key(1), ContractVersion::V5R1, Network::Mainnet);
    let b = derive_address(&test_public_key(2), ContractVersion::V5R1, Network::Mainnet);
    assert_ne!(a.raw_address, b.raw_address);
}

#[test]
fn test_display_address_roundtrips_to_raw() {
    let wallet = derive_address(&test_public_key(0x33), ContractVersion::V4R2, Network::Mainnet);
    let (parsed, flags) = TonAddress::from_friendly(&wallet.display_address).unwrap();
    assert_eq!(parsed, wallet.raw_address);
    // 展示地址为非弹回格式，主网无 test-only 标记
    assert!(!flags.bounceable);
    assert!(!flags.test_only);
}

#[test]
fn test_testnet_display_address_carries_test_flag() {
    let wallet = derive_address(&test_public_key(0x33), ContractVersion::V4R2, Network::Testnet);
    let (_, flags) = TonAddress::from_friendly(&wallet.display_address).unwrap();
    assert!(flags.test_only);
}

#[test]
fn test_network_changes_v5_addresses_only_via_wallet_id() {
    // v5 系列 wallet id 含网络全局 ID，地址随网络变化
    let mainnet = derive_address(&test_public_key(4), ContractVersion::W5, Network::Mainnet);
    let testnet = derive_address(&test_public_key(4), ContractVersion::W5, Network::Testnet);
    assert_ne!(mainnet.raw_address, testnet.raw_address);

    // v4 数据布局与网络无关，原始地址一致（仅展示标记不同）
    let mainnet = derive_address(&test_public_key(4), ContractVersion::V4R2, Network::Mainnet);
    let testnet = derive_address(&test_public_key(4), ContractVersion::V4R2, Network::Testnet);
    assert_eq!(mainnet.raw_address, testnet.raw_address);
    assert_ne!(mainnet.display_address, testnet.display_address);
}
