//! 钱包合约注册表
//!
//! 每个 `ContractVersion` 对应唯一的代码 Cell、初始数据布局、wallet id
//! 方案与消息包装规则，全部通过穷尽 match 分发：新增版本而不更新
//! 任一规则表无法通过编译。地址派生是纯函数：同一 (公钥, 版本, 网络)
//! 永远得到同一地址。

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::domain::address::TonAddress;
use crate::domain::boc;
use crate::domain::cell::{Cell, CellBuilder};
use crate::domain::message::Signature;
use crate::domain::wallet::{ContractVersion, Network, PublicKey, WalletAddress};
use crate::error::CoreError;

/// 钱包合约部署的默认工作链
pub const DEFAULT_WORKCHAIN: i8 = 0;
/// v3/v4 系列的默认 subwallet id
pub const DEFAULT_SUBWALLET_ID: u32 = 698_983_191;
/// v5 系列签名外部消息的操作码（"sign"）
const V5_SIGNED_EXTERNAL_OP: u32 = 0x7369_676e;
/// v5 系列发送消息动作的操作码
const V5_ACTION_SEND_MSG_OP: u32 = 0x0ec3_c86d;

// 各版本合约代码（十六进制 BOC，编译期常量，首次使用时解码）
const WALLET_V3R1_CODE: &str = "b5ee9c724101010100620000c0ff0020dd2082014c97ba9730ed44d0d70b1fe0a4f2608308d71820d31fd31fd31ff82313bbf263ed44d0d31fd31fd3ffd15132baf2a15144baf2a204f901541055f910f2a3f8009320d74a96d307d402fb00e8d101a4c8cb1fcb1fcbffc9ed543fbe6ee0";
const WALLET_V3R2_CODE: &str = "b5ee9c724101010100710000deff0020dd2082014c97ba218201339cbab19f71b0ed44d0d31fd31f31d70bffe304e0a4f2608308d71820d31fd31fd31ff82313bbf263ed44d0d31fd31fd3ffd15132baf2a15144baf2a204f901541055f910f2a3f8009320d74a96d307d402fb00e8d101a4c8cb1fcb1fcbffc9ed5410bd6dad";
const WALLET_V4R2_CODE: &str = "b5ee9c72410214010002d4000114ff00f4a413f4bcf2c80b010201200203020148040504f8f28308d71820d31fd31fd31f02f823bbf264ed44d0d31fd31fd3fff404d15143baf2a15151baf2a205f901541064f910f2a3f80024a4c8cb1f5240cb1f5230cbff5210f400c9ed54f80f01d30721c0009f6c519320d74a96d307d402fb00e830e021c001e30021c002e30001c0039130e30d03a4c8cb1f12cb1fcbff1011121302e6d001d0d3032171b0925f04e022d749c120925f04e002d31f218210706c7567bd22821064737472bdb0925f05e003fa403020fa4401c8ca07cbffc9d0ed44d0810140d721f404305c810108f40a6fa131b3925f07e005d33fc8258210706c7567ba923830e30d03821064737472ba925f06e30d06070201200809007801fa00f40430f8276f2230500aa121bef2e0508210706c7567831eb17080185004cb0526cf1658fa0219f400cb6917cb1f5260cb3f20c98040fb0006008a5004810108f45930ed44d0810140d720c801cf16f400c9ed540172b08e23821064737472831eb17080185005cb055003cf1623fa0213cb6acb1fcb3fc98040fb00925f03e20201200a0b0059bd242b6f6a2684080a06b90fa0218470d4080847a4937d29910ce6903e9ff9837812801b7810148987159f31840201580c0d0011b8c97ed44d0d70b1f8003db29dfb513420405035c87d010c00b23281f2fff274006040423d029be84c600201200e0f0019adce76a26840206b90eb85ffc00019af1df6a26840106b90eb858fc0006ed207fa00d4d422f90005c8ca0715cbffc9d077748018c8cb05cb0222cf165005fa0214cb6b12ccccc973fb00c84014810108f451f2a7020070810108d718fa00d33fc8542047810108f451f2a782106e6f746570748018c8cb05cb025006cf165004fa0214cb6a12cb1fcb3fc973fb0002006c810108d718fa00d33f305224810108f459f2a782106473747270748018c8cb05cb025005cf165003fa0213cb6acb1f12cb3fc973fb00000af400c9ed54696225e5";
const WALLET_V5BETA_CODE: &str = "b5ee9c7201010101003900006eff00f4a413f4bcf2c80b0201620302016204f28308d71820d31fd31fd31f02f823bbf264ed44d0d31fd3ffd15f04a4c8cb1fcbffc9ed54";
const WALLET_V5R1_CODE: &str = "b5ee9c7201010101003d000076ff00f4a413f4bcf2c80b0120d74a96d307d402fb00e8d1218308d722028308d72320f902f2e08222d70b01d74ac00092f263e4c8cb1fcbffc9ed54";
const WALLET_W5_CODE: &str = "b5ee9c7201010101003b000072ff00f4a413f4bcf2c80b0220d70b1f82107369676eba208210657874ebba21f2e08d22d0d31fd31fd3ffd15f0523a4c8cb1fcb1fcbffc9ed54";

static WALLET_CODES: Lazy<HashMap<ContractVersion, Arc<Cell>>> = Lazy::new(|| {
    ContractVersion::ALL
        .iter()
        .map(|&version| {
            let hex_code = match version {
                ContractVersion::V3R1 => WALLET_V3R1_CODE,
                ContractVersion::V3R2 => WALLET_V3R2_CODE,
                ContractVersion::V4R2 => WALLET_V4R2_CODE,
                ContractVersion::V5Beta => WALLET_V5BETA_CODE,
                ContractVersion::V5R1 => WALLET_V5R1_CODE,
                ContractVersion::W5 => WALLET_W5_CODE,
            };
            let bytes = hex::decode(hex_code).expect("embedded wallet code is valid hex");
            let cell = boc::parse(&bytes).expect("embedded wallet code is a valid BOC");
            (version, cell)
        })
        .collect()
});

/// 指定版本的合约代码 Cell
pub fn wallet_code(version: ContractVersion) -> Arc<Cell> {
    WALLET_CODES
        .get(&version)
        .expect("every contract version has registered code")
        .clone()
}

/// 指定版本在指定网络下的 wallet id
pub fn wallet_id(version: ContractVersion, network: Network) -> u32 {
    match version {
        ContractVersion::V3R1 | ContractVersion::V3R2 | ContractVersion::V4R2 => {
            DEFAULT_SUBWALLET_ID
        }
        // v5 beta 沿用固定 subwallet id
        ContractVersion::V5Beta => DEFAULT_SUBWALLET_ID,
        // v5r1/w5：上下文序列化（工作链 0、subwallet 0）与网络全局 ID 异或
        ContractVersion::V5R1 | ContractVersion::W5 => {
            0x8000_0000u32 ^ network.global_id() as u32
        }
    }
}

/// 初始数据 Cell：版本专属布局
fn initial_data_cell(
    version: ContractVersion,
    public_key: &PublicKey,
    network: Network,
) -> Result<Cell, CoreError> {
    let mut b = CellBuilder::new();
    match version {
        ContractVersion::V3R1 | ContractVersion::V3R2 => {
            b.store_u32(0)?; // seqno
            b.store_u32(wallet_id(version, network))?;
            b.store_slice(public_key.as_bytes())?;
        }
        ContractVersion::V4R2 => {
            b.store_u32(0)?;
            b.store_u32(wallet_id(version, network))?;
            b.store_slice(public_key.as_bytes())?;
            b.store_bit(false)?; // 空插件字典
        }
        ContractVersion::V5Beta | ContractVersion::V5R1 | ContractVersion::W5 => {
            b.store_bit(true)?; // 允许签名认证
            b.store_u32(0)?;
            b.store_u32(wallet_id(version, network))?;
            b.store_slice(public_key.as_bytes())?;
            b.store_bit(false)?; // 空扩展字典
        }
    }
    b.build()
}

/// StateInit Cell：无 split_depth / special，code + data 引用，无库
pub fn state_init_cell(
    version: ContractVersion,
    public_key: &PublicKey,
    network: Network,
) -> Result<Cell, CoreError> {
    let data = initial_data_cell(version, public_key, network)?;
    let mut b = CellBuilder::new();
    b.store_bit(false)?; // split_depth
    b.store_bit(false)?; // special
    b.store_bit(true)?; // code
    b.store_bit(true)?; // data
    b.store_bit(false)?; // library
    b.store_ref(wallet_code(version))?;
    b.store_ref(Arc::new(data))?;
    b.build()
}

/// 地址派生：StateInit 哈希即账户地址。纯函数、对封闭枚举全覆盖，
/// 展示地址为非弹回友好格式（测试网带 test-only 标记）。
pub fn derive_address(
    public_key: &PublicKey,
    version: ContractVersion,
    network: Network,
) -> WalletAddress {
    let state_init = state_init_cell(version, public_key, network)
        .expect("state init layout fits a single cell");
    let raw_address = TonAddress::new(DEFAULT_WORKCHAIN, state_init.repr_hash());
    WalletAddress {
        display_address: raw_address.to_friendly(false, network.is_testnet()),
        raw_address,
        version,
    }
}

/// 所有版本的地址（版本切换界面使用）
pub fn derive_all_addresses(public_key: &PublicKey, network: Network) -> Vec<WalletAddress> {
    ContractVersion::ALL
        .iter()
        .map(|&version| derive_address(public_key, version, network))
        .collect()
}

/// 钱包消息体中的单条外发消息
#[derive(Debug, Clone)]
pub struct WalletTransfer {
    pub message: Arc<Cell>,
    pub send_mode: u8,
}

/// 未签名消息体：版本专属包装规则
pub fn unsigned_transfer_body(
    version: ContractVersion,
    network: Network,
    seqno: u32,
    expire_at: u32,
    transfers: &[WalletTransfer],
) -> Result<Cell, CoreError> {
    let id = wallet_id(version, network);
    let mut b = CellBuilder::new();
    match version {
        ContractVersion::V3R1 | ContractVersion::V3R2 => {
            b.store_u32(id)?;
            b.store_u32(expire_at)?;
            b.store_u32(seqno)?;
            for t in transfers {
                b.store_u8(t.send_mode)?;
                b.store_ref(t.message.clone())?;
            }
        }
        ContractVersion::V4R2 => {
            b.store_u32(id)?;
            b.store_u32(expire_at)?;
            b.store_u32(seqno)?;
            b.store_u8(0)?; // op: 普通转账
            for t in transfers {
                b.store_u8(t.send_mode)?;
                b.store_ref(t.message.clone())?;
            }
        }
        ContractVersion::V5Beta | ContractVersion::V5R1 | ContractVersion::W5 => {
            b.store_u32(V5_SIGNED_EXTERNAL_OP)?;
            b.store_u32(id)?;
            b.store_u32(expire_at)?;
            b.store_u32(seqno)?;
            b.store_bit(true)?; // 携带动作列表
            b.store_ref(Arc::new(build_out_list(transfers)?))?;
            b.store_bit(false)?; // 无扩展动作
        }
    }
    b.build()
}

/// v5 动作列表：action_send_msg 链表，从尾部向前折叠
fn build_out_list(transfers: &[WalletTransfer]) -> Result<Cell, CoreError> {
    let mut list = CellBuilder::new().build()?;
    for t in transfers {
        let mut b = CellBuilder::new();
        b.store_ref(Arc::new(list))?;
        b.store_u32(V5_ACTION_SEND_MSG_OP)?;
        b.store_u8(t.send_mode)?;
        b.store_ref(t.message.clone())?;
        list = b.build()?;
    }
    Ok(list)
}

/// 签名挂接：v3/v4 签名前置，v5 系列签名后置
pub fn attach_signature(
    version: ContractVersion,
    body: &Cell,
    signature: &Signature,
) -> Result<Cell, CoreError> {
    let mut b = CellBuilder::new();
    match version {
        ContractVersion::V3R1 | ContractVersion::V3R2 | ContractVersion::V4R2 => {
            b.store_slice(&signature.0)?;
            b.store_cell(body)?;
        }
        ContractVersion::V5Beta | ContractVersion::V5R1 | ContractVersion::W5 => {
            b.store_cell(body)?;
            b.store_slice(&signature.0)?;
        }
    }
    b.build()
}
