//! 钱包服务
//!
//! 链上钱包发现与各导入路径的钱包状态构造。发现流程绝不向调用方
//! 透传瞬时网络错误：查询失败或无候选时确定性降级到默认版本地址。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::contract;
use crate::domain::wallet::{
    fallback_wallet_emoji, AuthKind, ContractVersion, Network, PublicKey, WalletAddress,
    WalletPreferences, WalletState,
};
use crate::domain::TonAddress;
use crate::error::CoreError;
use crate::infrastructure::collaborators::{AccountStatus, NetworkApi, WalletStore};

/// 隔离签名器配对深链接的 scheme
const SIGNER_LINK_SCHEME: &str = "tonsign://";

/// 扫码导入的账户描述符（结构化 blob）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountDescriptor {
    /// 公钥（hex）
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// 硬件设备返回的钱包信息
#[derive(Debug, Clone)]
pub struct LedgerWalletInfo {
    pub address: String,
    pub public_key: PublicKey,
    pub account_index: u16,
}

pub struct WalletService {
    api: Arc<dyn NetworkApi>,
    network: Network,
}

impl WalletService {
    pub fn new(api: Arc<dyn NetworkApi>, network: Network) -> Self {
        Self { api, network }
    }

    /// 发现公钥当前活跃的链上钱包。
    ///
    /// 算法：查询声明了已知版本接口、且已激活或余额为正的账户，
    /// 按（余额降序，版本枚举序）的全序取第一个。查询失败或无候选时
    /// 确定性降级：`prefer_disable_newest` 为 true 取长期稳定版本，
    /// 否则取最新稳定版本。永不返回错误。
    pub async fn discover_active_wallet(
        &self,
        public_key: &PublicKey,
        prefer_disable_newest: bool,
    ) -> WalletAddress {
        match self.api.wallets_by_public_key(public_key).await {
            Ok(accounts) => {
                if let Some(found) = self.pick_active_candidate(accounts) {
                    return found;
                }
            }
            Err(e) => {
                // 瞬时网络错误在此消化，降级到确定性默认地址
                tracing::warn!(
                    error = %e,
                    public_key = %public_key.to_hex(),
                    "Wallet discovery query failed, falling back to default version"
                );
            }
        }

        let version = if prefer_disable_newest {
            ContractVersion::STABLE_DEFAULT
        } else {
            ContractVersion::NEWEST_DEFAULT
        };
        contract::derive_address(public_key, version, self.network)
    }

    fn pick_active_candidate(
        &self,
        accounts: Vec<crate::infrastructure::collaborators::DiscoveredAccount>,
    ) -> Option<WalletAddress> {
        let mut candidates: Vec<(i64, usize, TonAddress, ContractVersion)> = accounts
            .iter()
            .filter_map(|account| {
                let version = account
                    .interfaces
                    .iter()
                    .find_map(|name| ContractVersion::from_interface(name))?;
                if account.balance <= 0 && account.status != AccountStatus::Active {
                    return None;
                }
                let address = match TonAddress::parse(&account.address) {
                    Ok(addr) => addr,
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            address = %account.address,
                            "Skipping discovered account with malformed address"
                        );
                        return None;
                    }
                };
                let order = ContractVersion::ALL
                    .iter()
                    .position(|&v| v == version)
                    .expect("version comes from the closed enumeration");
                Some((account.balance, order, address, version))
            })
            .collect();

        // 全序：余额降序，余额相同时按版本枚举序（稳定且有文档的平局裁决）
        candidates.sort_by_key(|(balance, order, _, _)| (std::cmp::Reverse(*balance), *order));

        candidates
            .into_iter()
            .next()
            .map(|(_, _, raw_address, version)| WalletAddress {
                display_address: raw_address.to_friendly(false, self.network.is_testnet()),
                raw_address,
                version,
            })
    }

    /// 新建钱包状态（本地密钥，口令认证）
    pub async fn create_wallet_state(
        &self,
        public_key: PublicKey,
        name: Option<String>,
        prefer_disable_newest: bool,
    ) -> WalletState {
        let active = self
            .discover_active_wallet(&public_key, prefer_disable_newest)
            .await;
        self.assemble_state(public_key, active, AuthKind::Password, name)
    }

    /// 从隔离签名器配对二维码构造钱包状态
    ///
    /// 链接格式：`tonsign://?pk=<hex>&name=<label>`
    pub async fn wallet_state_from_signer_qr(
        &self,
        qr_code: &str,
        prefer_disable_newest: bool,
    ) -> Result<WalletState, CoreError> {
        let query = qr_code
            .strip_prefix(SIGNER_LINK_SCHEME)
            .and_then(|rest| rest.split_once('?'))
            .map(|(_, query)| query)
            .ok_or_else(|| CoreError::unexpected_format("unexpected signer QR code"))?;

        let mut pk = None;
        let mut name = None;
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("pk", value)) => pk = Some(value.to_string()),
                Some(("name", value)) => name = Some(value.to_string()),
                _ => {}
            }
        }
        let pk = pk.ok_or_else(|| CoreError::unexpected_format("signer QR code missing pk"))?;
        let name =
            name.ok_or_else(|| CoreError::unexpected_format("signer QR code missing name"))?;

        let public_key = PublicKey::from_hex(&pk)?;
        let active = self
            .discover_active_wallet(&public_key, prefer_disable_newest)
            .await;
        Ok(self.assemble_state(
            public_key,
            active,
            AuthKind::Signer,
            (!name.is_empty()).then_some(name),
        ))
    }

    /// 从隔离签名器深链接配对构造钱包状态
    pub async fn wallet_state_from_signer_deep_link(
        &self,
        public_key_hex: &str,
        name: Option<String>,
        prefer_disable_newest: bool,
    ) -> Result<WalletState, CoreError> {
        let public_key = PublicKey::from_hex(public_key_hex)?;
        let active = self
            .discover_active_wallet(&public_key, prefer_disable_newest)
            .await;
        Ok(self.assemble_state(public_key, active, AuthKind::SignerDeepLink, name))
    }

    /// 从硬件设备账户信息构造钱包状态（设备账户固定使用 v4r2）
    pub fn wallet_state_from_ledger(
        &self,
        info: &LedgerWalletInfo,
    ) -> Result<WalletState, CoreError> {
        let raw_address = TonAddress::parse(&info.address)?;
        let active = WalletAddress {
            display_address: raw_address.to_friendly(false, self.network.is_testnet()),
            raw_address,
            version: ContractVersion::V4R2,
        };
        Ok(self.assemble_state(
            info.public_key,
            active,
            AuthKind::Ledger {
                account_index: info.account_index,
            },
            Some(format!("Ledger {}", info.account_index + 1)),
        ))
    }

    /// 从扫码导入的账户描述符构造钱包状态。
    /// 只产出钱包身份：该认证方式的转账签名委托给外部伴侣流程。
    pub fn wallet_state_from_descriptor(&self, blob: &str) -> Result<WalletState, CoreError> {
        let descriptor: AccountDescriptor = serde_json::from_str(blob)?;
        let public_key = PublicKey::from_hex(&descriptor.public_key)?;
        let active = contract::derive_address(&public_key, ContractVersion::V4R2, self.network);
        Ok(self.assemble_state(
            public_key,
            active,
            AuthKind::Keystone {
                path: descriptor.path,
                fingerprint: descriptor.fingerprint,
            },
            descriptor.name.or_else(|| Some("Keystone".to_string())),
        ))
    }

    /// 所有版本的派生地址（版本切换界面使用）
    pub fn wallet_addresses_for_all_versions(&self, public_key: &PublicKey) -> Vec<WalletAddress> {
        contract::derive_all_addresses(public_key, self.network)
    }

    /// 切换钱包合约版本：重新派生地址并持久化（revision + 1）
    pub async fn update_wallet_version(
        &self,
        store: &dyn WalletStore,
        state: &WalletState,
        version: ContractVersion,
    ) -> Result<WalletState, CoreError> {
        let active = contract::derive_address(&state.public_key, version, state.network());
        let updated = state.with_active(active);
        store.save(&updated).await?;
        Ok(updated)
    }

    /// 更新钱包展示属性并持久化（revision + 1）
    pub async fn update_wallet_props(
        &self,
        store: &dyn WalletStore,
        state: &WalletState,
        name: Option<String>,
        preferences: Option<WalletPreferences>,
    ) -> Result<WalletState, CoreError> {
        let updated = state.with_props(name, preferences);
        store.save(&updated).await?;
        Ok(updated)
    }

    fn assemble_state(
        &self,
        public_key: PublicKey,
        active: WalletAddress,
        auth: AuthKind,
        name: Option<String>,
    ) -> WalletState {
        WalletState {
            emoji: fallback_wallet_emoji(&public_key),
            public_key,
            active,
            revision: 0,
            auth,
            network: Some(self.network),
            name,
            preferences: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::infrastructure::collaborators::{
        DiscoveredAccount, SubmitReceipt, TransferEstimate,
    };

    struct OfflineApi;

    #[async_trait]
    impl NetworkApi for OfflineApi {
        async fn wallets_by_public_key(
            &self,
            _public_key: &PublicKey,
        ) -> Result<Vec<DiscoveredAccount>, CoreError> {
            Err(CoreError::network("offline"))
        }

        async fn account_seqno(&self, _address: &TonAddress) -> Result<u32, CoreError> {
            Err(CoreError::network("offline"))
        }

        async fn simulate_transfer(
            &self,
            _address: &TonAddress,
            _message_boc: &[u8],
        ) -> Result<TransferEstimate, CoreError> {
            Err(CoreError::network("offline"))
        }

        async fn submit(&self, _message_boc: &[u8]) -> Result<SubmitReceipt, CoreError> {
            Err(CoreError::network("offline"))
        }
    }

    fn service() -> WalletService {
        WalletService::new(Arc::new(OfflineApi), Network::Mainnet)
    }

    #[tokio::test]
    async fn test_signer_qr_parsing() {
        let svc = service();
        let pk_hex = hex::encode([5u8; 32]);
        let qr = format!("tonsign://v1?pk={}&name=cold", pk_hex);
        let state = svc.wallet_state_from_signer_qr(&qr, true).await.unwrap();
        assert_eq!(state.auth, AuthKind::Signer);
        assert_eq!(state.name.as_deref(), Some("cold"));
        assert_eq!(state.revision, 0);
    }

    #[tokio::test]
    async fn test_signer_qr_rejects_malformed() {
        let svc = service();
        for qr in [
            "https://example.com/?pk=00",
            "tonsign://v1",
            "tonsign://v1?name=only",
        ] {
            let err = svc.wallet_state_from_signer_qr(qr, true).await.unwrap_err();
            assert_eq!(err.code(), "unexpected_format", "qr: {}", qr);
        }
    }

    #[test]
    fn test_descriptor_parsing_and_fallback_name() {
        let svc = service();
        let blob = format!(
            r#"{{"public_key": "{}", "path": "m/44'/607'/0'", "fingerprint": "f00dbabe"}}"#,
            hex::encode([6u8; 32])
        );
        let state = svc.wallet_state_from_descriptor(&blob).unwrap();
        assert_eq!(state.name.as_deref(), Some("Keystone"));
        assert_eq!(state.active.version, ContractVersion::V4R2);
        match state.auth {
            AuthKind::Keystone { path, fingerprint } => {
                assert_eq!(path.as_deref(), Some("m/44'/607'/0'"));
                assert_eq!(fingerprint.as_deref(), Some("f00dbabe"));
            }
            other => panic!("unexpected auth kind: {:?}", other),
        }
    }

    #[test]
    fn test_descriptor_rejects_garbage() {
        let svc = service();
        assert_eq!(
            svc.wallet_state_from_descriptor("not json").unwrap_err().code(),
            "unexpected_format"
        );
        assert_eq!(
            svc.wallet_state_from_descriptor(r#"{"public_key": "zz"}"#)
                .unwrap_err()
                .code(),
            "unexpected_format"
        );
    }

    #[test]
    fn test_ledger_state_defaults() {
        let svc = service();
        let raw = TonAddress::new(0, [9; 32]).to_raw_string();
        let state = svc
            .wallet_state_from_ledger(&LedgerWalletInfo {
                address: raw,
                public_key: PublicKey([9; 32]),
                account_index: 2,
            })
            .unwrap();
        assert_eq!(state.name.as_deref(), Some("Ledger 3"));
        assert_eq!(state.active.version, ContractVersion::V4R2);
        assert_eq!(state.auth, AuthKind::Ledger { account_index: 2 });
    }
}
