//! 错误类型定义模块
//!
//! 定义公共层的错误类型 MikuError 和 Result 别名。

use thiserror::Error;

/// 公共层错误类型
///
/// 覆盖配置加载与平台信息探测中可能出现的错误。
#[derive(Error, Debug)]
pub enum MikuError {
    /// I/O 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 配置错误
    #[error("Config error: {0}")]
    Config(String),

    /// 平台相关错误
    #[error("Platform error: {0}")]
    Platform(String),
}

/// 公共层 Result 类型别名
pub type MikuResult<T> = Result<T, MikuError>;
