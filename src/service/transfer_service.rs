//! 转账消息构建器
//!
//! 把不可变的转账意图装配成最终可提交的外部消息：发送模式、有效期、
//! 资产载荷编码、版本专属包装与签名挂接。构建过程绝不复用序列上下文
//! 或查询 ID，同一上下文重复构建得到的消息除查询 ID 外结构一致。

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::config::TransferConfig;
use crate::domain::address::TonAddress;
use crate::domain::boc;
use crate::domain::cell::{Cell, CellBuilder};
use crate::domain::contract::{self, WalletTransfer};
use crate::domain::message::{
    ExternalSessionRequest, QueryId, SequenceContext, Signature, SignedMessage, TransferAmount,
    TransferAsset, TransferDescription, TransferIntent, TransferRequest, UnsignedBody,
};
use crate::domain::wallet::WalletState;
use crate::error::CoreError;
use crate::service::signer::TransferSigner;
use crate::utils::time_utils;

// 发送模式标志位
pub const SEND_MODE_PAY_GAS_SEPARATELY: u8 = 1;
pub const SEND_MODE_IGNORE_ERRORS: u8 = 2;
pub const SEND_MODE_CARRY_ALL_REMAINING_BALANCE: u8 = 128;

// 资产转账操作码
pub const JETTON_TRANSFER_OP: u32 = 0x0f8a_7ea5;
pub const NFT_TRANSFER_OP: u32 = 0x5fcc_3d14;

/// 代币转账随消息附带的 TON（覆盖代币钱包合约的执行费用）
pub const JETTON_TRANSFER_AMOUNT: u128 = 640_000_000; // 0.64 TON
/// 代币转账的转发金额常量（接收方通知消息的最低预留）
pub const JETTON_TRANSFER_FORWARD_AMOUNT: u128 = 1; // 1 nanoton
/// NFT 转账随消息附带的 TON
pub const NFT_TRANSFER_AMOUNT: u128 = 1_000_000_000; // 1 TON
/// NFT 转账的转发金额常量（与代币转账不同的独立预留值）
pub const NFT_TRANSFER_FORWARD_AMOUNT: u128 = 100_000; // 0.0001 TON

/// 金额模式 → 发送模式标志。二选一、无第三种模式：
/// "全部可用余额" 携带余额并忽略错误，精确金额单独支付 gas 并忽略错误。
pub fn send_mode_for(amount: TransferAmount) -> u8 {
    match amount {
        TransferAmount::Max => SEND_MODE_CARRY_ALL_REMAINING_BALANCE | SEND_MODE_IGNORE_ERRORS,
        TransferAmount::Exact(_) => SEND_MODE_PAY_GAS_SEPARATELY | SEND_MODE_IGNORE_ERRORS,
    }
}

/// 纯文本注释载荷：op 0 + snake 编码的 UTF-8
pub fn comment_cell(text: &str) -> Result<Cell, CoreError> {
    let mut b = CellBuilder::new();
    b.store_u32(0)?;
    store_snake_bytes(&mut b, text.as_bytes())?;
    b.build()
}

/// snake 编码：当前 Cell 放不下的字节顺延到链式引用
fn store_snake_bytes(builder: &mut CellBuilder, bytes: &[u8]) -> Result<(), CoreError> {
    let capacity = builder.remaining_bits() / 8;
    let (head, tail) = bytes.split_at(capacity.min(bytes.len()));
    builder.store_slice(head)?;
    if !tail.is_empty() {
        let mut child = CellBuilder::new();
        store_snake_bytes(&mut child, tail)?;
        builder.store_ref(Arc::new(child.build()?))?;
    }
    Ok(())
}

/// 代币转账载荷
pub fn jetton_transfer_body(
    query_id: QueryId,
    jetton_amount: u128,
    destination: &TonAddress,
    response_destination: &TonAddress,
    forward_payload: Option<Arc<Cell>>,
) -> Result<Cell, CoreError> {
    let mut b = CellBuilder::new();
    b.store_u32(JETTON_TRANSFER_OP)?;
    b.store_u64(query_id.0)?;
    b.store_coins(jetton_amount)?;
    b.store_address(destination)?;
    b.store_address(response_destination)?;
    b.store_bit(false)?; // 无 custom payload
    b.store_coins(JETTON_TRANSFER_FORWARD_AMOUNT)?;
    store_forward_payload(&mut b, forward_payload)?;
    b.build()
}

/// NFT 转账载荷：形状与代币转账一致，destination 换成 new_owner，
/// 转发金额使用独立常量
pub fn nft_transfer_body(
    query_id: QueryId,
    new_owner: &TonAddress,
    response_destination: &TonAddress,
    forward_payload: Option<Arc<Cell>>,
) -> Result<Cell, CoreError> {
    let mut b = CellBuilder::new();
    b.store_u32(NFT_TRANSFER_OP)?;
    b.store_u64(query_id.0)?;
    b.store_address(new_owner)?;
    b.store_address(response_destination)?;
    b.store_bit(false)?; // 无 custom payload
    b.store_coins(NFT_TRANSFER_FORWARD_AMOUNT)?;
    store_forward_payload(&mut b, forward_payload)?;
    b.build()
}

fn store_forward_payload(
    builder: &mut CellBuilder,
    forward_payload: Option<Arc<Cell>>,
) -> Result<(), CoreError> {
    match forward_payload {
        Some(payload) => {
            builder.store_bit(true)?;
            builder.store_ref(payload)?;
        }
        None => {
            builder.store_bit(false)?;
        }
    }
    Ok(())
}

/// 内部消息（int_msg_info$0）
pub fn internal_message(
    dest: &TonAddress,
    value: u128,
    bounce: bool,
    state_init: Option<Arc<Cell>>,
    body: Option<Arc<Cell>>,
) -> Result<Cell, CoreError> {
    let mut b = CellBuilder::new();
    b.store_bit(false)?; // int_msg_info
    b.store_bit(true)?; // ihr_disabled
    b.store_bit(bounce)?;
    b.store_bit(false)?; // bounced
    b.store_address_none()?; // src：由验证器填充
    b.store_address(dest)?;
    b.store_coins(value)?;
    b.store_bit(false)?; // 无附加货币
    b.store_coins(0)?; // ihr_fee
    b.store_coins(0)?; // fwd_fee
    b.store_uint(0, 64)?; // created_lt
    b.store_uint(0, 32)?; // created_at
    match state_init {
        Some(init) => {
            b.store_bit(true)?;
            b.store_bit(true)?; // 以引用存放
            b.store_ref(init)?;
        }
        None => {
            b.store_bit(false)?;
        }
    }
    match body {
        Some(body) => {
            b.store_bit(true)?;
            b.store_ref(body)?;
        }
        None => {
            b.store_bit(false)?;
        }
    }
    b.build()
}

/// 外部消息（ext_in_msg_info$10）：首次使用（seqno 0）附带 StateInit
pub fn external_message(
    dest: &TonAddress,
    state_init: Option<Cell>,
    signed_body: Cell,
) -> Result<Cell, CoreError> {
    let mut b = CellBuilder::new();
    b.store_uint(0b10, 2)?;
    b.store_address_none()?; // src
    b.store_address(dest)?;
    b.store_coins(0)?; // import_fee
    match state_init {
        Some(init) => {
            b.store_bit(true)?;
            b.store_bit(true)?; // 以引用存放
            b.store_ref(Arc::new(init))?;
        }
        None => {
            b.store_bit(false)?;
        }
    }
    b.store_bit(true)?; // body 以引用存放
    b.store_ref(Arc::new(signed_body))?;
    b.build()
}

/// 消息构建器
pub struct MessageBuilder {
    ttl_secs: i64,
}

impl MessageBuilder {
    pub fn new(config: &TransferConfig) -> Self {
        Self {
            ttl_secs: config.ttl_secs,
        }
    }

    /// 有效期：时间戳 + 固定 TTL 窗口，所有消息类别共用
    fn expire_at(&self, sequence: &SequenceContext) -> u32 {
        (sequence.timestamp + self.ttl_secs) as u32
    }

    /// 装配未签名消息体（扫码导入路径将其导出给外部伴侣流程签名）
    pub fn build_unsigned(
        &self,
        wallet: &WalletState,
        request: &TransferRequest,
        sequence: &SequenceContext,
    ) -> Result<UnsignedBody, CoreError> {
        let transfers = self.plan_transfers(wallet, request)?;
        let body = contract::unsigned_transfer_body(
            wallet.active.version,
            wallet.network(),
            sequence.seqno,
            self.expire_at(sequence),
            &transfers,
        )?;
        Ok(UnsignedBody {
            body,
            description: TransferDescription::from_request(request),
        })
    }

    /// 构建并签名最终外部消息。
    /// 签名器错误原样透传；序列上下文新鲜度不在此检测（网络侧拒绝），
    /// 本函数只保证单次构建内不复用上下文与查询 ID。
    pub async fn build_transfer_message(
        &self,
        wallet: &WalletState,
        request: &TransferRequest,
        sequence: &SequenceContext,
        signer: &dyn TransferSigner,
    ) -> Result<SignedMessage, CoreError> {
        let unsigned = self.build_unsigned(wallet, request, sequence)?;
        if !signer.can_sign(&unsigned.description) {
            return Err(CoreError::operation_not_supported(
                "selected signer cannot execute this transfer shape",
            ));
        }
        let signature = signer.sign(&unsigned).await?;
        self.finalize(wallet, sequence, &unsigned.body, &signature)
    }

    /// 费用模拟用消息：占位签名，结构与真实消息一致
    pub fn build_estimation_message(
        &self,
        wallet: &WalletState,
        request: &TransferRequest,
        sequence: &SequenceContext,
    ) -> Result<SignedMessage, CoreError> {
        let unsigned = self.build_unsigned(wallet, request, sequence)?;
        self.finalize(wallet, sequence, &unsigned.body, &Signature::zero())
    }

    /// 签名挂接 + 外部消息封装 + BOC 序列化
    pub fn finalize(
        &self,
        wallet: &WalletState,
        sequence: &SequenceContext,
        body: &Cell,
        signature: &Signature,
    ) -> Result<SignedMessage, CoreError> {
        let version = wallet.active.version;
        let signed_body = contract::attach_signature(version, body, signature)?;
        // 账户尚未部署时（seqno 0）附带 StateInit
        let state_init = if sequence.seqno == 0 {
            Some(contract::state_init_cell(
                version,
                &wallet.public_key,
                wallet.network(),
            )?)
        } else {
            None
        };
        let message = external_message(&wallet.active.raw_address, state_init, signed_body)?;
        Ok(SignedMessage::new(
            boc::serialize(&message),
            message.repr_hash(),
        ))
    }

    /// 意图 → 外发消息列表（查询 ID 在此新取）
    fn plan_transfers(
        &self,
        wallet: &WalletState,
        request: &TransferRequest,
    ) -> Result<Vec<WalletTransfer>, CoreError> {
        match request {
            TransferRequest::Simple(intent) => {
                Ok(vec![self.plan_simple_transfer(wallet, intent)?])
            }
            TransferRequest::ExternalSession(session) => {
                self.plan_session_transfers(session)
            }
        }
    }

    fn plan_simple_transfer(
        &self,
        wallet: &WalletState,
        intent: &TransferIntent,
    ) -> Result<WalletTransfer, CoreError> {
        let forward_payload = intent.forward_payload.clone().map(Arc::new);
        match &intent.asset {
            TransferAsset::Ton => {
                let value = match intent.amount {
                    TransferAmount::Exact(v) => v,
                    // 全部余额由发送模式携带，消息面值为零
                    TransferAmount::Max => 0,
                };
                let body = intent
                    .comment
                    .as_deref()
                    .filter(|c| !c.is_empty())
                    .map(comment_cell)
                    .transpose()?
                    .map(Arc::new);
                let message =
                    internal_message(&intent.recipient, value, intent.bounce, None, body)?;
                Ok(WalletTransfer {
                    message: Arc::new(message),
                    send_mode: send_mode_for(intent.amount),
                })
            }
            TransferAsset::Jetton { jetton_wallet } => {
                let jetton_amount = match intent.amount {
                    TransferAmount::Exact(v) => v,
                    TransferAmount::Max => {
                        return Err(CoreError::unexpected_format(
                            "token transfers require an exact amount",
                        ))
                    }
                };
                let body = jetton_transfer_body(
                    QueryId::fresh(),
                    jetton_amount,
                    &intent.recipient,
                    &wallet.active.raw_address,
                    forward_payload,
                )?;
                let message = internal_message(
                    jetton_wallet,
                    JETTON_TRANSFER_AMOUNT,
                    true,
                    None,
                    Some(Arc::new(body)),
                )?;
                Ok(WalletTransfer {
                    message: Arc::new(message),
                    send_mode: SEND_MODE_PAY_GAS_SEPARATELY | SEND_MODE_IGNORE_ERRORS,
                })
            }
            TransferAsset::Nft { nft_address } => {
                if intent.amount.is_max() {
                    return Err(CoreError::unexpected_format(
                        "non-fungible transfers require an exact amount",
                    ));
                }
                let body = nft_transfer_body(
                    QueryId::fresh(),
                    &intent.recipient,
                    &wallet.active.raw_address,
                    forward_payload,
                )?;
                let message = internal_message(
                    nft_address,
                    NFT_TRANSFER_AMOUNT,
                    true,
                    None,
                    Some(Arc::new(body)),
                )?;
                Ok(WalletTransfer {
                    message: Arc::new(message),
                    send_mode: SEND_MODE_PAY_GAS_SEPARATELY | SEND_MODE_IGNORE_ERRORS,
                })
            }
        }
    }

    fn plan_session_transfers(
        &self,
        session: &ExternalSessionRequest,
    ) -> Result<Vec<WalletTransfer>, CoreError> {
        if session.messages.is_empty() {
            return Err(CoreError::unexpected_format(
                "session request contains no messages",
            ));
        }
        if let Some(valid_until) = session.valid_until {
            if valid_until < time_utils::current_timestamp() {
                return Err(CoreError::unexpected_format("session request expired"));
            }
        }
        session
            .messages
            .iter()
            .map(|msg| {
                let (dest, bounce) = parse_session_address(&msg.address)?;
                let amount: u128 = msg.amount.parse().map_err(|_| {
                    CoreError::unexpected_format(format!("invalid amount: {}", msg.amount))
                })?;
                let body = msg.payload.as_deref().map(parse_boc_base64).transpose()?;
                let state_init = msg
                    .state_init
                    .as_deref()
                    .map(parse_boc_base64)
                    .transpose()?;
                let message = internal_message(&dest, amount, bounce, state_init, body)?;
                Ok(WalletTransfer {
                    message: Arc::new(message),
                    send_mode: SEND_MODE_PAY_GAS_SEPARATELY | SEND_MODE_IGNORE_ERRORS,
                })
            })
            .collect()
    }
}

/// 会话消息地址：友好格式按其弹回标志，原始格式默认可弹回
fn parse_session_address(s: &str) -> Result<(TonAddress, bool), CoreError> {
    if s.contains(':') {
        Ok((TonAddress::from_raw(s)?, true))
    } else {
        let (addr, flags) = TonAddress::from_friendly(s)?;
        Ok((addr, flags.bounceable))
    }
}

fn parse_boc_base64(encoded: &str) -> Result<Arc<Cell>, CoreError> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|_| CoreError::unexpected_format("invalid base64 BOC"))?;
    boc::parse(&bytes)
}
