//! 转账消息模型
//!
//! 转账意图、序列上下文、查询 ID 与最终签名产物。意图一经构造不可变；
//! 序列上下文与查询 ID 每次构建前新取，绝不复用。

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::domain::address::TonAddress;
use crate::domain::cell::Cell;
use crate::utils::time_utils;

/// 转账金额：精确值（nanoton / 最小资产单位）或"全部可用余额"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferAmount {
    Exact(u128),
    Max,
}

impl TransferAmount {
    pub fn is_max(&self) -> bool {
        matches!(self, TransferAmount::Max)
    }
}

/// 资产类别
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferAsset {
    /// 原生代币
    Ton,
    /// 同质化代币：金额以最小单位计，消息发往持有者的代币钱包合约
    Jetton { jetton_wallet: TonAddress },
    /// 非同质化资产：消息发往资产合约本身
    Nft { nft_address: TonAddress },
}

/// 转账意图：构建消息的唯一输入，构造后不可变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferIntent {
    pub recipient: TonAddress,
    pub bounce: bool,
    pub amount: TransferAmount,
    pub asset: TransferAsset,
    /// 附带给接收合约的转发载荷
    pub forward_payload: Option<Cell>,
    pub comment: Option<String>,
}

/// 外部会话提交的单条原始消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSessionMessage {
    pub address: String,
    /// nanoton，十进制字符串（外部会话的线格式）
    pub amount: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(default, rename = "stateInit", skip_serializing_if = "Option::is_none")]
    pub state_init: Option<String>,
}

/// 外部会话转账请求：原始多消息载荷，仅本地密钥签名器可执行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSessionRequest {
    #[serde(default, rename = "validUntil", skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<i64>,
    pub messages: Vec<ExternalSessionMessage>,
}

/// 管线处理的转账请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferRequest {
    Simple(TransferIntent),
    ExternalSession(ExternalSessionRequest),
}

/// 签名器可理解的请求形状（硬件设备只支持受限子集）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferDescription {
    Native {
        to: TonAddress,
        amount: TransferAmount,
        comment: Option<String>,
    },
    Jetton {
        to: TonAddress,
        jetton_amount: u128,
    },
    Nft {
        to: TonAddress,
    },
    /// 外部会话的复合原始载荷，仅本地密钥签名器可处理
    External,
}

impl TransferDescription {
    pub fn from_intent(intent: &TransferIntent) -> Self {
        match &intent.asset {
            TransferAsset::Ton => TransferDescription::Native {
                to: intent.recipient,
                amount: intent.amount,
                comment: intent.comment.clone(),
            },
            TransferAsset::Jetton { .. } => TransferDescription::Jetton {
                to: intent.recipient,
                jetton_amount: match intent.amount {
                    TransferAmount::Exact(v) => v,
                    TransferAmount::Max => 0,
                },
            },
            TransferAsset::Nft { .. } => TransferDescription::Nft {
                to: intent.recipient,
            },
        }
    }

    pub fn from_request(request: &TransferRequest) -> Self {
        match request {
            TransferRequest::Simple(intent) => Self::from_intent(intent),
            TransferRequest::ExternalSession(_) => TransferDescription::External,
        }
    }
}

/// 序列上下文：构建前即时获取的链上 seqno + 本地时间戳。
/// 本核心唯一的义务是绝不让同一个上下文跨两次提交复用；
/// 新鲜度由网络侧拒绝保证，不在本地检测。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceContext {
    pub seqno: u32,
    pub timestamp: i64,
}

impl SequenceContext {
    /// 以刚查询到的链上 seqno 和当前时间构造
    pub fn new(seqno: u32) -> Self {
        Self {
            seqno,
            timestamp: time_utils::current_timestamp(),
        }
    }

    pub fn at(seqno: u32, timestamp: i64) -> Self {
        Self { seqno, timestamp }
    }
}

/// 资产转账载荷的查询 ID：同一有效期窗口内必须唯一，
/// 每次构建新取，从不持久化
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryId(pub u64);

impl QueryId {
    pub fn fresh() -> Self {
        Self(rand::random())
    }
}

/// Ed25519 签名产物
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({}…)", hex::encode(&self.0[..8]))
    }
}

impl Signature {
    /// 费用模拟时使用的占位签名
    pub fn zero() -> Self {
        Self([0u8; 64])
    }
}

/// 待签名消息体 + 其结构化描述（硬件签名器展示与能力检查使用）
#[derive(Debug, Clone)]
pub struct UnsignedBody {
    pub body: Cell,
    pub description: TransferDescription,
}

/// 最终可提交的外部消息：不可变、单次使用。
/// 同一产物的二次提交是调用方错误，由编排层依据根哈希拒绝。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedMessage {
    boc: Vec<u8>,
    root_hash: [u8; 32],
}

impl SignedMessage {
    pub fn new(boc: Vec<u8>, root_hash: [u8; 32]) -> Self {
        Self { boc, root_hash }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.boc
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.boc)
    }

    /// 外部消息根 Cell 哈希（提交去重与回执关联使用）
    pub fn root_hash(&self) -> [u8; 32] {
        self.root_hash
    }
}
