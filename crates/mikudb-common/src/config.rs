//! 编解码器配置模块
//!
//! 定义 BSON 编解码器的可调参数:
//! - 文档体积上限(通常由连接握手协商得到,这里只提供初始值)
//! - 嵌套深度上限
//!
//! 支持从 TOML 文件加载配置。

use crate::error::{MikuError, MikuResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 默认文档体积上限 (4 MiB)
pub const DEFAULT_MAX_BSON_SIZE: usize = 4 * 1024 * 1024;

/// 默认嵌套深度上限
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 100;

/// BSON 编解码器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BsonConfig {
    /// 单个文档编码后的最大字节数 (默认: 4 MiB)
    #[serde(default = "default_max_bson_size")]
    pub max_bson_size: usize,

    /// 文档/数组最大嵌套层数 (默认: 100)
    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: usize,
}

fn default_max_bson_size() -> usize { DEFAULT_MAX_BSON_SIZE }
fn default_max_nesting_depth() -> usize { DEFAULT_MAX_NESTING_DEPTH }

impl Default for BsonConfig {
    fn default() -> Self {
        Self {
            max_bson_size: default_max_bson_size(),
            max_nesting_depth: default_max_nesting_depth(),
        }
    }
}

impl BsonConfig {
    /// # Brief
    /// 从 TOML 字符串解析配置
    ///
    /// # Arguments
    /// * `content` - TOML 文本,缺省字段使用默认值
    ///
    /// # Returns
    /// 解析并校验通过的配置
    pub fn from_toml_str(content: &str) -> MikuResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| MikuError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// # Brief
    /// 从 TOML 文件加载配置
    ///
    /// # Arguments
    /// * `path` - 配置文件路径
    pub fn from_file(path: &Path) -> MikuResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 序列化为格式化的 TOML 文本
    pub fn to_toml(&self) -> MikuResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| MikuError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// 校验配置取值
    ///
    /// 体积上限至少要能容纳一个空文档(5 字节),嵌套深度不能为 0。
    pub fn validate(&self) -> MikuResult<()> {
        if self.max_bson_size < 5 {
            return Err(MikuError::Config(format!(
                "max_bson_size must be at least 5 bytes, got {}",
                self.max_bson_size
            )));
        }
        if self.max_bson_size > i32::MAX as usize {
            return Err(MikuError::Config(format!(
                "max_bson_size cannot exceed {}, got {}",
                i32::MAX,
                self.max_bson_size
            )));
        }
        if self.max_nesting_depth == 0 {
            return Err(MikuError::Config(
                "max_nesting_depth must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_when_fields_missing() {
        let config = BsonConfig::from_toml_str("").unwrap();
        assert_eq!(config, BsonConfig::default());
        assert_eq!(config.max_bson_size, 4 * 1024 * 1024);
    }

    #[test]
    fn test_partial_override() {
        let config = BsonConfig::from_toml_str("max_bson_size = 16777216").unwrap();
        assert_eq!(config.max_bson_size, 16 * 1024 * 1024);
        assert_eq!(config.max_nesting_depth, DEFAULT_MAX_NESTING_DEPTH);
    }

    #[test]
    fn test_rejects_tiny_ceiling() {
        let result = BsonConfig::from_toml_str("max_bson_size = 4");
        assert!(matches!(result, Err(MikuError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_depth() {
        let result = BsonConfig::from_toml_str("max_nesting_depth = 0");
        assert!(result.is_err());
    }

    #[test]
    fn test_from_file_roundtrip() {
        let config = BsonConfig {
            max_bson_size: 7 * 1024 * 1024,
            max_nesting_depth: 32,
        };
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_toml().unwrap().as_bytes()).unwrap();

        let loaded = BsonConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = BsonConfig::from_file(Path::new("/nonexistent/mikudb-bson.toml"));
        assert!(matches!(result, Err(MikuError::Io(_))));
    }
}
