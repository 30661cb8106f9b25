//! 地址类型
//!
//! 原始格式 `workchain:hex64` 与友好格式（base64url，tag + workchain +
//! 哈希 + CRC16 校验）之间的互转。展示地址一律使用非弹回（non-bounceable）
//! 友好格式，与客户端既有行为一致。

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::utils::crc16_xmodem;

const TAG_BOUNCEABLE: u8 = 0x11;
const TAG_NON_BOUNCEABLE: u8 = 0x51;
const TAG_TEST_ONLY: u8 = 0x80;

/// 链上账户地址：工作链 + 256 位账户哈希
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TonAddress {
    pub workchain: i8,
    pub hash: [u8; 32],
}

/// 友好地址携带的标志位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressFlags {
    pub bounceable: bool,
    pub test_only: bool,
}

impl TonAddress {
    pub fn new(workchain: i8, hash: [u8; 32]) -> Self {
        Self { workchain, hash }
    }

    /// 原始格式：`0:abcd…`
    pub fn to_raw_string(&self) -> String {
        format!("{}:{}", self.workchain, hex::encode(self.hash))
    }

    /// 友好格式：base64url(tag ‖ workchain ‖ hash ‖ crc16)
    pub fn to_friendly(&self, bounceable: bool, test_only: bool) -> String {
        let mut tag = if bounceable {
            TAG_BOUNCEABLE
        } else {
            TAG_NON_BOUNCEABLE
        };
        if test_only {
            tag |= TAG_TEST_ONLY;
        }
        let mut bytes = Vec::with_capacity(36);
        bytes.push(tag);
        bytes.push(self.workchain as u8);
        bytes.extend_from_slice(&self.hash);
        let crc = crc16_xmodem(&bytes);
        bytes.extend_from_slice(&crc.to_be_bytes());
        URL_SAFE.encode(bytes)
    }

    /// 解析原始格式
    pub fn from_raw(s: &str) -> Result<Self, CoreError> {
        let (wc, hash_hex) = s
            .split_once(':')
            .ok_or_else(|| CoreError::unexpected_format(format!("invalid raw address: {}", s)))?;
        let workchain: i8 = wc
            .parse()
            .map_err(|_| CoreError::unexpected_format(format!("invalid workchain: {}", wc)))?;
        let bytes = hex::decode(hash_hex)
            .map_err(|_| CoreError::unexpected_format(format!("invalid address hex: {}", s)))?;
        let hash: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::unexpected_format("address hash must be 32 bytes"))?;
        Ok(Self { workchain, hash })
    }

    /// 解析友好格式，返回地址与标志位
    pub fn from_friendly(s: &str) -> Result<(Self, AddressFlags), CoreError> {
        if s.len() != 48 {
            return Err(CoreError::unexpected_format(format!(
                "friendly address must be 48 characters: {}",
                s
            )));
        }
        // 同时接受 url-safe 与标准 base64 字母表
        let bytes = URL_SAFE
            .decode(s)
            .or_else(|_| STANDARD.decode(s))
            .map_err(|_| CoreError::unexpected_format(format!("invalid base64 address: {}", s)))?;
        if bytes.len() != 36 {
            return Err(CoreError::unexpected_format(
                "friendly address must decode to 36 bytes",
            ));
        }
        let crc_expected = crc16_xmodem(&bytes[..34]);
        let crc_actual = u16::from_be_bytes([bytes[34], bytes[35]]);
        if crc_expected != crc_actual {
            return Err(CoreError::unexpected_format("address checksum mismatch"));
        }
        let mut tag = bytes[0];
        let test_only = tag & TAG_TEST_ONLY != 0;
        tag &= !TAG_TEST_ONLY;
        let bounceable = match tag {
            TAG_BOUNCEABLE => true,
            TAG_NON_BOUNCEABLE => false,
            _ => {
                return Err(CoreError::unexpected_format(format!(
                    "unknown address tag: 0x{:02x}",
                    tag
                )))
            }
        };
        let workchain = bytes[1] as i8;
        let hash: [u8; 32] = bytes[2..34].try_into().expect("length checked above");
        Ok((
            Self { workchain, hash },
            AddressFlags {
                bounceable,
                test_only,
            },
        ))
    }

    /// 解析任意已知格式（原始或友好）
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        if s.contains(':') {
            Self::from_raw(s)
        } else {
            Self::from_friendly(s).map(|(addr, _)| addr)
        }
    }
}

impl fmt::Display for TonAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_raw_string())
    }
}

impl fmt::Debug for TonAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TonAddress({})", self.to_raw_string())
    }
}

impl FromStr for TonAddress {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for TonAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_raw_string())
    }
}

impl<'de> Deserialize<'de> for TonAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
