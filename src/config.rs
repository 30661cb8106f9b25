//! 配置管理模块
//! 支持从环境变量和配置文件加载配置

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::wallet::Network;

/// 核心配置结构体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub network: NetworkConfig,
    pub transfer: TransferConfig,
    pub discovery: DiscoveryConfig,
    pub logging: LoggingConfig,
}

/// 网络配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// "mainnet" 或 "testnet"
    pub network: String,
}

/// 转账配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// 消息有效期窗口（秒），所有消息类别共用
    pub ttl_secs: i64,
    /// 本地余额校验时预留的费用（nanoton）
    pub fee_reserve_nanoton: u64,
}

/// 钱包发现配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// 降级时偏好长期稳定版本而非最新稳定版本
    pub prefer_disable_newest_version: bool,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            network: std::env::var("TONFORGE_NETWORK").unwrap_or_else(|_| "mainnet".into()),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            ttl_secs: std::env::var("TRANSFER_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
            fee_reserve_nanoton: std::env::var("TRANSFER_FEE_RESERVE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10_000_000), // 0.01 TON
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            prefer_disable_newest_version: std::env::var("DISCOVERY_DISABLE_NEWEST")
                .ok()
                .map(|v| v == "1")
                .unwrap_or(true),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".into()),
        }
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            transfer: TransferConfig::default(),
            discovery: DiscoveryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl CoreConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Ok(Self::default())
    }

    /// 从配置文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: CoreConfig =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// 从环境变量和配置文件合并加载（配置文件优先级更高）
    pub fn from_env_and_file<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = Self::from_env()?;

        if let Some(path) = path {
            if path.as_ref().exists() {
                config = Self::from_file(path)?;
            }
        }

        Ok(config)
    }

    /// 解析网络标识
    pub fn resolved_network(&self) -> Result<Network> {
        match self.network.network.to_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            other => anyhow::bail!("TONFORGE_NETWORK must be mainnet or testnet, got: {}", other),
        }
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        self.resolved_network()?;

        if self.transfer.ttl_secs <= 0 {
            anyhow::bail!("TRANSFER_TTL_SECS must be positive");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("LOG_LEVEL must be one of: {:?}", valid_levels);
        }

        if self.logging.format != "json" && self.logging.format != "text" {
            anyhow::bail!("LOG_FORMAT must be 'json' or 'text'");
        }

        Ok(())
    }
}
