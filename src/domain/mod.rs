//! Domain 模块
//!
//! 核心领域模型：地址、Cell 与 BOC 编码、合约注册表、钱包状态与转账消息

pub mod address;
pub mod boc;
pub mod cell;
pub mod contract;
pub mod message;
pub mod wallet;

// 重新导出常用类型
pub use address::{AddressFlags, TonAddress};
pub use cell::{Cell, CellBuilder};
pub use contract::{derive_address, derive_all_addresses};
pub use message::{
    QueryId, SequenceContext, SignedMessage, TransferAmount, TransferAsset, TransferIntent,
    TransferRequest,
};
pub use wallet::{AuthKind, ContractVersion, Network, PublicKey, WalletAddress, WalletState};
