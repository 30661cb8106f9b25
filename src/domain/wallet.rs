//! 钱包领域模型
//!
//! 公钥标识一个钱包在所有合约版本下的身份；合约版本与认证方式是封闭
//! 枚举，每个版本/方式对应唯一的派生、包装与签名规则，新增变体时
//! 编译器强制更新全部分发表。

use serde::{Deserialize, Serialize};

use crate::domain::address::TonAddress;
use crate::error::CoreError;

/// Ed25519 公钥，跨所有合约版本标识同一钱包
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(#[serde(with = "hex_bytes")] pub [u8; 32]);

impl PublicKey {
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(s)
            .map_err(|_| CoreError::unexpected_format(format!("invalid public key hex: {}", s)))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::unexpected_format("public key must be 32 bytes"))?;
        Ok(Self(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("public key must be 32 bytes"))
    }
}

/// 网络标识（全局 ID）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub fn global_id(&self) -> i32 {
        match self {
            Network::Mainnet => -239,
            Network::Testnet => -3,
        }
    }

    pub fn is_testnet(&self) -> bool {
        matches!(self, Network::Testnet)
    }
}

impl Default for Network {
    fn default() -> Self {
        Network::Mainnet
    }
}

/// 钱包合约版本（封闭枚举）
///
/// 每个版本有且仅有一条地址派生规则与一条消息包装规则，
/// 同一公钥在不同版本下派生出不同地址（版本迁移即链上转账）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractVersion {
    V3R1,
    V3R2,
    V4R2,
    V5Beta,
    V5R1,
    W5,
}

impl ContractVersion {
    /// 枚举序即版本的稳定全序（发现流程平局裁决使用）
    pub const ALL: [ContractVersion; 6] = [
        ContractVersion::V3R1,
        ContractVersion::V3R2,
        ContractVersion::V4R2,
        ContractVersion::V5Beta,
        ContractVersion::V5R1,
        ContractVersion::W5,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractVersion::V3R1 => "v3r1",
            ContractVersion::V3R2 => "v3r2",
            ContractVersion::V4R2 => "v4r2",
            ContractVersion::V5Beta => "v5beta",
            ContractVersion::V5R1 => "v5r1",
            ContractVersion::W5 => "w5",
        }
    }

    /// 网络接口名 → 版本（发现流程匹配链上账户 interfaces 字段）
    pub fn from_interface(name: &str) -> Option<Self> {
        match name {
            "wallet_v3r1" => Some(ContractVersion::V3R1),
            "wallet_v3r2" => Some(ContractVersion::V3R2),
            "wallet_v4r2" => Some(ContractVersion::V4R2),
            "wallet_v5_beta" => Some(ContractVersion::V5Beta),
            "wallet_v5r1" => Some(ContractVersion::V5R1),
            "wallet_w5" => Some(ContractVersion::W5),
            _ => None,
        }
    }

    /// 长期稳定版本（发现降级时 `prefer_disable_newest = true` 的默认值）
    pub const STABLE_DEFAULT: ContractVersion = ContractVersion::V4R2;
    /// 最新稳定版本（`prefer_disable_newest = false` 的默认值）
    pub const NEWEST_DEFAULT: ContractVersion = ContractVersion::V5R1;
}

impl std::fmt::Display for ContractVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 派生出的钱包地址：原始地址 + 展示地址 + 版本，只读
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAddress {
    pub raw_address: TonAddress,
    pub display_address: String,
    pub version: ContractVersion,
}

/// 认证方式：决定该钱包可构造哪种签名器（封闭枚举，映射全覆盖）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthKind {
    /// 口令解锁的本地密钥材料
    Password,
    /// 系统钥匙串解锁的本地密钥材料
    Keychain,
    /// 硬件设备（按账户索引派生）
    Ledger { account_index: u16 },
    /// 隔离签名器（扫码配对）
    Signer,
    /// 隔离签名器（深链接配对）
    SignerDeepLink,
    /// 扫码导入的账户描述符（签名委托给外部伴侣流程）
    Keystone {
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        fingerprint: Option<String>,
    },
}

/// 硬件设备派生路径：44'/607'/account'/0'/0'（全部硬化）
pub fn ledger_account_path(account_index: u16) -> [u32; 5] {
    [44, 607, account_index as u32, 0, 0]
}

/// 每钱包偏好设置（资产排序与隐藏列表）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletPreferences {
    #[serde(default)]
    pub hidden_jettons: Vec<String>,
    #[serde(default)]
    pub shown_jettons: Vec<String>,
    #[serde(default)]
    pub order_jettons: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

/// 钱包状态：仅由外部持久化层保存，本核心只产出新值从不原地修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletState {
    pub public_key: PublicKey,
    pub active: WalletAddress,
    /// 每次持久化变更严格递增，用于检测陈旧读取
    pub revision: u32,
    pub auth: AuthKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub emoji: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<WalletPreferences>,
}

impl WalletState {
    pub fn network(&self) -> Network {
        self.network.unwrap_or_default()
    }

    /// 切换活动地址（版本迁移 / 网络切换），revision + 1
    pub fn with_active(&self, active: WalletAddress) -> Self {
        let mut next = self.clone();
        next.active = active;
        next.revision += 1;
        next
    }

    /// 更新名称与偏好，revision + 1
    pub fn with_props(
        &self,
        name: Option<String>,
        preferences: Option<WalletPreferences>,
    ) -> Self {
        let mut next = self.clone();
        if name.is_some() {
            next.name = name;
        }
        if preferences.is_some() {
            next.preferences = preferences;
        }
        next.revision += 1;
        next
    }
}

const FALLBACK_EMOJIS: [&str; 16] = [
    "🐻", "🐼", "🦊", "🦁", "🐨", "🐯", "🦉", "🐳", "🐙", "🦄", "🐝", "🐢", "🦜", "🐞", "🦕",
    "🐬",
];

/// 公钥到默认表情的确定性映射（未命名钱包的展示用）
pub fn fallback_wallet_emoji(public_key: &PublicKey) -> String {
    let sum: u32 = public_key.0.iter().map(|&b| b as u32).sum();
    FALLBACK_EMOJIS[sum as usize % FALLBACK_EMOJIS.len()].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_hex_roundtrip() {
        let pk = PublicKey([7; 32]);
        let parsed = PublicKey::from_hex(&pk.to_hex()).unwrap();
        assert_eq!(pk, parsed);
        assert!(PublicKey::from_hex("abcd").is_err());
    }

    #[test]
    fn test_interface_mapping_total_over_versions() {
        let pairs = [
            ("wallet_v3r1", ContractVersion::V3R1),
            ("wallet_v3r2", ContractVersion::V3R2),
            ("wallet_v4r2", ContractVersion::V4R2),
            ("wallet_v5_beta", ContractVersion::V5Beta),
            ("wallet_v5r1", ContractVersion::V5R1),
            ("wallet_w5", ContractVersion::W5),
        ];
        assert_eq!(pairs.len(), ContractVersion::ALL.len());
        for (interface, version) in pairs {
            assert_eq!(ContractVersion::from_interface(interface), Some(version));
        }
        assert_eq!(ContractVersion::from_interface("wallet_unknown"), None);
    }

    #[test]
    fn test_fallback_emoji_deterministic() {
        let pk = PublicKey([42; 32]);
        assert_eq!(fallback_wallet_emoji(&pk), fallback_wallet_emoji(&pk));
    }

    #[test]
    fn test_revision_increments() {
        let pk = PublicKey([1; 32]);
        let state = WalletState {
            public_key: pk,
            active: WalletAddress {
                raw_address: crate::domain::address::TonAddress::new(0, [0; 32]),
                display_address: "x".into(),
                version: ContractVersion::V4R2,
            },
            revision: 0,
            auth: AuthKind::Password,
            network: None,
            name: None,
            emoji: fallback_wallet_emoji(&pk),
            preferences: None,
        };
        let updated = state.with_props(Some("main".into()), None);
        assert_eq!(updated.revision, 1);
        assert_eq!(updated.name.as_deref(), Some("main"));
        let again = updated.with_props(None, Some(WalletPreferences::default()));
        assert_eq!(again.revision, 2);
    }

    #[test]
    fn test_auth_kind_serde_tagged() {
        let auth = AuthKind::Ledger { account_index: 3 };
        let json = serde_json::to_string(&auth).unwrap();
        assert!(json.contains("ledger"));
        let parsed: AuthKind = serde_json::from_str(&json).unwrap();
        assert_eq!(auth, parsed);
    }
}
