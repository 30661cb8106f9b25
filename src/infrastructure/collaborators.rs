//! 外部协作方接口
//!
//! 本核心不直接持有网络客户端、密钥存储、设备通道、缓存与持久化的
//! 实现，只消费这里定义的接口；实现由宿主应用注入，测试中以内存
//! mock 替代。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::domain::address::TonAddress;
use crate::domain::message::{Signature, TransferDescription};
use crate::domain::wallet::{PublicKey, WalletState};
use crate::error::CoreError;

/// 链上账户状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Uninit,
    Active,
    Frozen,
    Nonexist,
}

/// 发现流程返回的链上账户
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredAccount {
    /// 原始格式地址
    pub address: String,
    /// 余额（nanoton）
    pub balance: i64,
    pub status: AccountStatus,
    /// 账户合约声明的接口名（如 `wallet_v4r2`）
    #[serde(default)]
    pub interfaces: Vec<String>,
}

/// 费用模拟结果（仅供展示，失败不阻断转账）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEstimate {
    /// 预估总费用（nanoton）
    pub total_fee: i64,
}

/// 提交回执
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    /// 已提交外部消息的根哈希（hex）
    pub message_hash: String,
}

/// 链状态查询与消息提交服务
#[async_trait]
pub trait NetworkApi: Send + Sync {
    /// 查询公钥名下的所有链上钱包账户
    async fn wallets_by_public_key(
        &self,
        public_key: &PublicKey,
    ) -> Result<Vec<DiscoveredAccount>, CoreError>;

    /// 查询账户当前 seqno（未部署账户返回 0）
    async fn account_seqno(&self, address: &TonAddress) -> Result<u32, CoreError>;

    /// 模拟执行外部消息，返回费用估计
    async fn simulate_transfer(
        &self,
        address: &TonAddress,
        message_boc: &[u8],
    ) -> Result<TransferEstimate, CoreError>;

    /// 提交外部消息
    async fn submit(&self, message_boc: &[u8]) -> Result<SubmitReceipt, CoreError>;
}

/// 本地签名密钥材料，离开作用域即清零
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SigningKeyMaterial(pub [u8; 32]);

/// 已解锁密钥材料的提供方（解锁流程本身在核心之外）
pub trait SecretVault: Send + Sync {
    fn is_unlocked(&self) -> bool;

    /// 派生签名密钥；未解锁时返回 `AuthRequired`
    fn derive_signing_key(&self) -> Result<SigningKeyMaterial, CoreError>;
}

/// 硬件设备通信通道
///
/// 调用会挂起直到设备持有者物理确认/拒绝，或通信超时。
#[async_trait]
pub trait DeviceChannel: Send + Sync {
    async fn send_for_signature(
        &self,
        path: &[u32; 5],
        description: &TransferDescription,
        body_hash: [u8; 32],
    ) -> Result<Signature, CoreError>;
}

/// 缓存失效信号：提交成功后针对活动地址触发一次，
/// 由外部缓存层据此刷新余额与历史
pub trait CacheInvalidator: Send + Sync {
    fn invalidate(&self, address_key: &str);
}

/// 钱包状态持久化（外部 KV 存储）
#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn load(&self, public_key: &PublicKey) -> Result<Option<WalletState>, CoreError>;

    async fn save(&self, state: &WalletState) -> Result<(), CoreError>;
}
