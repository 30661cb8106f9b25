//! Cell 数据模型
//!
//! Cell 是链上消息的基本构造单元：最多 1023 位数据与 4 个引用。
//! 外部消息、钱包状态初始化与资产转账载荷全部由 Cell 树组成，
//! 哈希按标准表示计算（descriptor 字节 + 补齐数据 + 引用深度 + 引用哈希）。

use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::domain::address::TonAddress;
use crate::error::CoreError;

/// 单个 Cell 的最大数据位数
pub const MAX_CELL_BITS: usize = 1023;
/// 单个 Cell 的最大引用数
pub const MAX_CELL_REFS: usize = 4;

/// 普通 Cell（不支持特殊类型：本核心只构造 level 0 的普通 Cell）
#[derive(Clone, PartialEq, Eq)]
pub struct Cell {
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<Arc<Cell>>,
}

impl Cell {
    /// 从原始位数据与引用构造（BOC 解析使用）
    pub(crate) fn from_parts(data: Vec<u8>, bit_len: usize, refs: Vec<Arc<Cell>>) -> Self {
        Self {
            data,
            bit_len,
            refs,
        }
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn refs(&self) -> &[Arc<Cell>] {
        &self.refs
    }

    /// 树深度：无引用为 0，否则为 1 + 最大子树深度
    pub fn depth(&self) -> u16 {
        self.refs
            .iter()
            .map(|r| r.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    /// 读取指定位（用于签名包装时的逐位拷贝）
    pub fn bit(&self, index: usize) -> bool {
        let byte = self.data[index / 8];
        byte & (1 << (7 - index % 8)) != 0
    }

    /// 补齐后的数据字节：非整字节时在数据尾部追加结束标记位
    pub fn padded_data(&self) -> Vec<u8> {
        let byte_len = (self.bit_len + 7) / 8;
        let mut out = self.data[..byte_len].to_vec();
        if self.bit_len % 8 != 0 {
            out[byte_len - 1] |= 1 << (7 - self.bit_len % 8);
        }
        out
    }

    /// descriptor 字节 d1：引用数（普通 Cell，level 0）
    pub fn d1(&self) -> u8 {
        self.refs.len() as u8
    }

    /// descriptor 字节 d2：⌊bits/8⌋ + ⌈bits/8⌉
    pub fn d2(&self) -> u8 {
        (self.bit_len / 8 + (self.bit_len + 7) / 8) as u8
    }

    /// 标准表示哈希（SHA-256），即链上使用的 Cell 哈希
    pub fn repr_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update([self.d1(), self.d2()]);
        hasher.update(self.padded_data());
        for r in &self.refs {
            hasher.update(r.depth().to_be_bytes());
        }
        for r in &self.refs {
            hasher.update(r.repr_hash());
        }
        hasher.finalize().into()
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cell{{bits={}, refs={}, hash={}}}",
            self.bit_len,
            self.refs.len(),
            hex::encode(&self.repr_hash()[..8])
        )
    }
}

/// Cell 构建器：所有写入都做容量检查
#[derive(Default)]
pub struct CellBuilder {
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<Arc<Cell>>,
}

impl CellBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// 剩余可写位数
    pub fn remaining_bits(&self) -> usize {
        MAX_CELL_BITS - self.bit_len
    }

    pub fn store_bit(&mut self, bit: bool) -> Result<&mut Self, CoreError> {
        if self.bit_len >= MAX_CELL_BITS {
            return Err(CoreError::configuration(format!(
                "cell overflow: cannot store bit at {}",
                self.bit_len
            )));
        }
        if self.bit_len % 8 == 0 {
            self.data.push(0);
        }
        if bit {
            let idx = self.bit_len / 8;
            self.data[idx] |= 1 << (7 - self.bit_len % 8);
        }
        self.bit_len += 1;
        Ok(self)
    }

    /// 大端序写入无符号整数的低 `bits` 位
    pub fn store_uint(&mut self, value: u64, bits: usize) -> Result<&mut Self, CoreError> {
        debug_assert!(bits <= 64);
        for i in (0..bits).rev() {
            self.store_bit((value >> i) & 1 == 1)?;
        }
        Ok(self)
    }

    pub fn store_u8(&mut self, value: u8) -> Result<&mut Self, CoreError> {
        self.store_uint(value as u64, 8)
    }

    pub fn store_u32(&mut self, value: u32) -> Result<&mut Self, CoreError> {
        self.store_uint(value as u64, 32)
    }

    pub fn store_u64(&mut self, value: u64) -> Result<&mut Self, CoreError> {
        self.store_uint(value, 64)
    }

    pub fn store_i8(&mut self, value: i8) -> Result<&mut Self, CoreError> {
        self.store_uint(value as u8 as u64, 8)
    }

    /// 按字节写入切片
    pub fn store_slice(&mut self, bytes: &[u8]) -> Result<&mut Self, CoreError> {
        for &b in bytes {
            self.store_u8(b)?;
        }
        Ok(self)
    }

    /// VarUInteger 16 金额编码：4 位字节长度 + 大端序数值
    pub fn store_coins(&mut self, amount: u128) -> Result<&mut Self, CoreError> {
        let byte_len = if amount == 0 {
            0
        } else {
            16 - amount.leading_zeros() as usize / 8
        };
        if byte_len > 15 {
            return Err(CoreError::configuration(
                "coin amount exceeds VarUInteger 16 range",
            ));
        }
        self.store_uint(byte_len as u64, 4)?;
        for i in (0..byte_len).rev() {
            self.store_u8((amount >> (i * 8)) as u8)?;
        }
        Ok(self)
    }

    /// MsgAddressInt addr_std$10：'10' + 无 anycast + workchain + 256 位地址
    pub fn store_address(&mut self, address: &TonAddress) -> Result<&mut Self, CoreError> {
        self.store_uint(0b100, 3)?;
        self.store_i8(address.workchain)?;
        self.store_slice(&address.hash)?;
        Ok(self)
    }

    /// MsgAddressExt addr_none$00
    pub fn store_address_none(&mut self) -> Result<&mut Self, CoreError> {
        self.store_uint(0b00, 2)
    }

    pub fn store_ref(&mut self, cell: Arc<Cell>) -> Result<&mut Self, CoreError> {
        if self.refs.len() >= MAX_CELL_REFS {
            return Err(CoreError::configuration(
                "cell overflow: reference limit exceeded",
            ));
        }
        self.refs.push(cell);
        Ok(self)
    }

    /// 拷贝另一个 Cell 的全部位与引用（签名包装时拼接消息体）
    pub fn store_cell(&mut self, cell: &Cell) -> Result<&mut Self, CoreError> {
        for i in 0..cell.bit_len() {
            self.store_bit(cell.bit(i))?;
        }
        for r in cell.refs() {
            self.store_ref(r.clone())?;
        }
        Ok(self)
    }

    pub fn build(self) -> Result<Cell, CoreError> {
        Ok(Cell {
            data: self.data,
            bit_len: self.bit_len,
            refs: self.refs,
        })
    }
}
