//! Service 模块
//!
//! 钱包发现、签名器抽象、消息构建与转账管线

pub mod signer;
pub mod transfer_pipeline;
pub mod transfer_service;
pub mod wallet_service;

// 重新导出常用类型
pub use signer::{
    AirGappedSigner, LedgerSigner, LocalSigner, ScanImportSigner, SignerFactory, TransferSigner,
};
pub use transfer_pipeline::{TransferAttempt, TransferPipeline, TransferStage};
pub use transfer_service::MessageBuilder;
pub use wallet_service::{AccountDescriptor, LedgerWalletInfo, WalletService};
