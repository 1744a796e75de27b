//! # Error 模块
//!
//! 定义 vn-message 中使用的错误类型。
//!
//! 渲染器本身的操作不会失败（查找失败静默跳过、标记错误尽力降级），
//! 只有存档包和配置文件这两个与外部数据打交道的边界会返回错误。

use thiserror::Error;

/// 存档包错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BundleError {
    /// 序列化失败
    #[error("存档包序列化失败: {0}")]
    SerializationFailed(String),

    /// 反序列化失败
    #[error("存档包反序列化失败: {0}")]
    DeserializationFailed(String),

    /// 版本不兼容
    #[error("存档包版本不兼容: 存档版本 {bundle_version} vs 当前版本 {current_version}")]
    IncompatibleVersion {
        bundle_version: String,
        current_version: String,
    },
}

/// 配置错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// IO 错误
    #[error("配置 IO 错误: {0}")]
    Io(String),

    /// 解析失败
    #[error("配置解析失败: {0}")]
    Parse(String),

    /// 验证失败
    #[error("配置验证失败: {0}")]
    ValidationFailed(String),
}

/// vn-message 统一错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MessageError {
    /// 存档包错误
    #[error("存档包错误: {0}")]
    Bundle(#[from] BundleError),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// Result 类型别名
pub type MessageResult<T> = Result<T, MessageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let err: MessageError = ConfigError::ValidationFailed("消息速度越界".to_string()).into();
        assert!(matches!(err, MessageError::Config(_)));
        assert!(err.to_string().contains("消息速度越界"));

        let err: MessageError = BundleError::IncompatibleVersion {
            bundle_version: "2.0".to_string(),
            current_version: "1.0".to_string(),
        }
        .into();
        assert!(err.to_string().contains("2.0"));
    }
}
