//! TonForge - 钱包转账构建与多后端签名核心
//!
//! 确定性地址派生、链上钱包发现、四种签名后端抽象、二进制外部消息
//! 构建与单发安全的转账管线。UI、本地加密存储与原始网络客户端均为
//! 外部协作方，本核心只消费其接口。

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod service;
pub mod utils;

// 重新导出常用类型
pub use config::CoreConfig;
pub use error::CoreError;

// 统一模块导出
pub mod prelude {
    pub use crate::{
        config::CoreConfig,
        domain::{
            derive_address, derive_all_addresses, AuthKind, ContractVersion, Network, PublicKey,
            SequenceContext, SignedMessage, TonAddress, TransferAmount, TransferAsset,
            TransferIntent, TransferRequest, WalletAddress, WalletState,
        },
        error::CoreError,
        infrastructure::{CacheInvalidator, DeviceChannel, NetworkApi, SecretVault, WalletStore},
        service::{
            MessageBuilder, SignerFactory, TransferPipeline, TransferSigner, TransferStage,
            WalletService,
        },
    };
}
