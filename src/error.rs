//! 错误类型定义
//!
//! 核心库的统一错误分类：所有公开 API 返回 `Result<_, CoreError>`，
//! 调用方根据错误类别决定展示与重试策略，核心层从不抛出非结构化错误。

use thiserror::Error;

/// 核心错误分类
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// 配置错误：未注册的合约版本 / 认证方式等编程性错误，不可恢复
    #[error("configuration error: {0}")]
    Configuration(String),

    /// 密钥材料未解锁，调用方重新认证后可重试
    #[error("authentication required: {0}")]
    AuthRequired(String),

    /// 硬件设备拒绝签名
    #[error("device rejected the signing request")]
    DeviceRejected,

    /// 硬件设备通信超时
    #[error("device communication timed out")]
    DeviceTimeout,

    /// 硬件设备连接断开
    #[error("device disconnected")]
    DeviceDisconnected,

    /// 签名器与请求形状不匹配（应在编排层提前拦截）
    #[error("operation not supported: {0}")]
    OperationNotSupported(String),

    /// 余额不足（本地校验，未触达网络）
    #[error("insufficient balance: required {required} nanoton, available {available} nanoton")]
    InsufficientBalance { required: u128, available: u128 },

    /// 费用模拟失败（仅影响展示，不阻断后续确认）
    #[error("fee estimation failed: {0}")]
    EstimationFailed(String),

    /// 消息提交失败，本次尝试终止；重试需要全新的序列上下文
    #[error("submission failed: {0}")]
    SubmissionError(String),

    /// 外部输入格式错误（账户描述符、深链接、地址、BOC 等）
    #[error("unexpected format: {0}")]
    UnexpectedFormat(String),

    /// 网络查询失败（发现流程内部消化，其余场景透传）
    #[error("network error: {0}")]
    Network(String),
}

impl CoreError {
    /// 稳定的错误码字符串（用于日志与上层映射）
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Configuration(_) => "configuration_error",
            CoreError::AuthRequired(_) => "auth_required",
            CoreError::DeviceRejected => "device_rejected",
            CoreError::DeviceTimeout => "device_timeout",
            CoreError::DeviceDisconnected => "device_disconnected",
            CoreError::OperationNotSupported(_) => "operation_not_supported",
            CoreError::InsufficientBalance { .. } => "insufficient_balance",
            CoreError::EstimationFailed(_) => "estimation_failed",
            CoreError::SubmissionError(_) => "submission_error",
            CoreError::UnexpectedFormat(_) => "unexpected_format",
            CoreError::Network(_) => "network_error",
        }
    }

    /// 调用方从 `Idle` 重新发起一次尝试是否有意义
    pub fn is_recoverable(&self) -> bool {
        match self {
            CoreError::Configuration(_) => false,
            CoreError::AuthRequired(_) => true,
            CoreError::DeviceRejected | CoreError::DeviceTimeout | CoreError::DeviceDisconnected => {
                true
            }
            CoreError::OperationNotSupported(_) => false,
            CoreError::InsufficientBalance { .. } => false,
            CoreError::EstimationFailed(_) => true,
            CoreError::SubmissionError(_) => true,
            CoreError::Network(_) => true,
            CoreError::UnexpectedFormat(_) => false,
        }
    }

    // 构造辅助函数
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn auth_required(msg: impl Into<String>) -> Self {
        Self::AuthRequired(msg.into())
    }

    pub fn operation_not_supported(msg: impl Into<String>) -> Self {
        Self::OperationNotSupported(msg.into())
    }

    pub fn submission(msg: impl Into<String>) -> Self {
        Self::SubmissionError(msg.into())
    }

    pub fn unexpected_format(msg: impl Into<String>) -> Self {
        Self::UnexpectedFormat(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }
}

// 账户描述符等外部 JSON 输入的解析错误
impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::unexpected_format(format!("invalid JSON: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_stable() {
        assert_eq!(CoreError::DeviceRejected.code(), "device_rejected");
        assert_eq!(
            CoreError::InsufficientBalance {
                required: 10,
                available: 1
            }
            .code(),
            "insufficient_balance"
        );
        assert_eq!(
            CoreError::unexpected_format("bad").code(),
            "unexpected_format"
        );
    }

    #[test]
    fn test_recoverability() {
        assert!(CoreError::DeviceTimeout.is_recoverable());
        assert!(CoreError::auth_required("locked").is_recoverable());
        assert!(!CoreError::configuration("unmapped").is_recoverable());
        assert!(!CoreError::InsufficientBalance {
            required: 2,
            available: 1
        }
        .is_recoverable());
    }
}
