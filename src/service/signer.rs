//! 签名器抽象
//!
//! 四种签名后端实现同一能力接口：本地密钥、硬件设备、隔离签名器、
//! 扫码导入。每个钱包依据其认证方式恰好对应一种签名器，映射对封闭
//! 枚举全覆盖——未映射的认证方式是编程错误而非运行时分支。

use std::sync::Arc;

use async_trait::async_trait;
use ed25519_dalek::{Signer as _, SigningKey};

use crate::domain::message::{Signature, TransferDescription, UnsignedBody};
use crate::domain::wallet::{ledger_account_path, AuthKind};
use crate::error::CoreError;
use crate::infrastructure::collaborators::{DeviceChannel, SecretVault};

/// 签名能力接口：把未签名消息体变成签名产物
#[async_trait]
pub trait TransferSigner: Send + Sync {
    /// 该签名器能否处理此请求形状（编排层在任何 I/O 之前检查）
    fn can_sign(&self, description: &TransferDescription) -> bool;

    async fn sign(&self, unsigned: &UnsignedBody) -> Result<Signature, CoreError>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 本地密钥签名器（口令 / 钥匙串解锁）
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct LocalSigner {
    vault: Arc<dyn SecretVault>,
}

impl LocalSigner {
    pub fn new(vault: Arc<dyn SecretVault>) -> Self {
        Self { vault }
    }
}

#[async_trait]
impl TransferSigner for LocalSigner {
    fn can_sign(&self, _description: &TransferDescription) -> bool {
        // 本地密钥可签任意形状，包括外部会话的复合载荷
        true
    }

    async fn sign(&self, unsigned: &UnsignedBody) -> Result<Signature, CoreError> {
        if !self.vault.is_unlocked() {
            return Err(CoreError::auth_required("secret store is locked"));
        }
        let material = self.vault.derive_signing_key()?;
        let signing_key = SigningKey::from_bytes(&material.0);
        let signature = signing_key.sign(&unsigned.body.repr_hash());
        Ok(Signature(signature.to_bytes()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 硬件设备签名器
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct LedgerSigner {
    channel: Arc<dyn DeviceChannel>,
    account_index: u16,
}

impl LedgerSigner {
    pub fn new(channel: Arc<dyn DeviceChannel>, account_index: u16) -> Self {
        Self {
            channel,
            account_index,
        }
    }
}

#[async_trait]
impl TransferSigner for LedgerSigner {
    fn can_sign(&self, description: &TransferDescription) -> bool {
        // 设备只能展示原生 / 代币 / NFT 三种形状
        !matches!(description, TransferDescription::External)
    }

    async fn sign(&self, unsigned: &UnsignedBody) -> Result<Signature, CoreError> {
        if !self.can_sign(&unsigned.description) {
            return Err(CoreError::operation_not_supported(
                "hardware device cannot represent this payload",
            ));
        }
        let path = ledger_account_path(self.account_index);
        tracing::debug!(
            account_index = self.account_index,
            "Sending transfer to hardware device for approval"
        );
        // 挂起直到设备持有者确认、拒绝或超时
        self.channel
            .send_for_signature(&path, &unsigned.description, unsigned.body.repr_hash())
            .await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 隔离签名器（扫码 / 深链接）
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 隔离签名器不在本核心内产生签名：直接签名契约对其不可用，
/// 签名经由扫码 / 深链接的外部交换流程完成
pub struct AirGappedSigner {
    pub deep_link: bool,
}

#[async_trait]
impl TransferSigner for AirGappedSigner {
    fn can_sign(&self, _description: &TransferDescription) -> bool {
        false
    }

    async fn sign(&self, _unsigned: &UnsignedBody) -> Result<Signature, CoreError> {
        Err(CoreError::operation_not_supported(if self.deep_link {
            "air-gapped signer requires the deep-link exchange flow"
        } else {
            "air-gapped signer requires the QR exchange flow"
        }))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 扫码导入签名器
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 扫码导入的账户只产出钱包身份；转账签名委托给外部伴侣流程，
/// 本核心负责构造好待签的未签名消息
pub struct ScanImportSigner;

#[async_trait]
impl TransferSigner for ScanImportSigner {
    fn can_sign(&self, _description: &TransferDescription) -> bool {
        false
    }

    async fn sign(&self, _unsigned: &UnsignedBody) -> Result<Signature, CoreError> {
        Err(CoreError::operation_not_supported(
            "scan-imported account signs through the companion flow",
        ))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 签名器工厂
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 按认证方式选择签名器，每个钱包构造一次后注入管线
pub struct SignerFactory {
    vault: Arc<dyn SecretVault>,
    device: Arc<dyn DeviceChannel>,
}

impl SignerFactory {
    pub fn new(vault: Arc<dyn SecretVault>, device: Arc<dyn DeviceChannel>) -> Self {
        Self { vault, device }
    }

    /// 认证方式 → 签名器的全覆盖映射
    pub fn create(&self, auth: &AuthKind) -> Arc<dyn TransferSigner> {
        match auth {
            AuthKind::Password | AuthKind::Keychain => {
                Arc::new(LocalSigner::new(self.vault.clone()))
            }
            AuthKind::Ledger { account_index } => {
                Arc::new(LedgerSigner::new(self.device.clone(), *account_index))
            }
            AuthKind::Signer => Arc::new(AirGappedSigner { deep_link: false }),
            AuthKind::SignerDeepLink => Arc::new(AirGappedSigner { deep_link: true }),
            AuthKind::Keystone { .. } => Arc::new(ScanImportSigner),
        }
    }
}
