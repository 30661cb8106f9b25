//! Infrastructure 模块
//!
//! 协作方接口定义与日志初始化

pub mod collaborators;
pub mod logging;

pub use collaborators::{
    AccountStatus, CacheInvalidator, DeviceChannel, DiscoveredAccount, NetworkApi, SecretVault,
    SigningKeyMaterial, SubmitReceipt, TransferEstimate, WalletStore,
};
