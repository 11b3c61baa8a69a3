//! # mikudb-bson
//!
//! MikuDB 客户端驱动使用的 BSON 编解码器。所有写入或查询的值都要经过这里:
//! 把有序的键值文档编码成带类型标记的紧凑字节流,再逐字节还原回来。
//!
//! - **严格校验**: 键名合法性、UTF-8、64 位整数范围、文档体积上限
//! - **`_id` 前置**: 可选地把主键移到首位,并消除重复的主键表示
//! - **扩展类型**: ObjectId、Binary、Regex、Code、Timestamp、MinKey/MaxKey、DBRef、Symbol
//! - **Serde 集成**: 任意 `Serialize` 结构体可直接编码
//!
//! ## 快速开始
//!
//! ```rust,ignore
//! use mikudb_bson::{doc, Codec};
//!
//! let codec = Codec::new();
//! let doc = doc! { "name": "MikuDB", "version": 1 };
//!
//! let bytes = codec.serialize(&doc, false, true).unwrap();
//! let restored = codec.deserialize(&bytes).unwrap();
//! assert_eq!(doc, restored);
//! ```

pub mod spec;
pub mod oid;
pub mod types;
pub mod value;
pub mod document;
pub mod validate;
pub mod size;
pub mod codec;
pub mod ser;
pub mod de;
pub mod json;

pub use codec::{deserialize, max_size, serialize, update_max_size, Codec};
pub use de::{from_document, from_slice};
pub use document::{Document, Key};
pub use oid::{ObjectId, ObjectIdGenerator};
pub use ser::{to_document, to_vec};
pub use size::{MaxSizeSource, SizeGuard};
pub use spec::{BinarySubtype, ElementType};
pub use types::{Binary, Code, DateTime, DbRef, Regex, Timestamp};
pub use validate::SourceEncoding;
pub use value::Value;

use thiserror::Error;

/// BSON 操作的错误类型
///
/// 编码期错误都是整体失败:出错时调用方拿不到任何部分缓冲区。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BsonError {
    /// 输入不是文档形状、值没有线格式表示、键含 NUL 或体积超限
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// 开启 check_keys 时键以 `$` 开头或包含 `.`
    #[error("Invalid key name: {0}")]
    InvalidKeyName(String),

    /// 字符串不是合法 UTF-8,或无法从声明的源编码转换
    #[error("Invalid string encoding: {0}")]
    InvalidStringEncoding(String),

    /// 整数超出有符号 64 位范围
    #[error("Range error: {0}")]
    Range(String),

    /// 扩展类型构造参数形状不对
    #[error("Argument error: {0}")]
    Argument(String),

    /// 未知的元素类型标记
    #[error("Invalid type marker: {0:#04x}")]
    InvalidTypeMarker(u8),

    /// 意外的输入结束
    #[error("Unexpected end of input")]
    UnexpectedEof,

    /// 长度前缀、终止符等结构性错误
    #[error("Malformed BSON: {0}")]
    Malformed(String),

    /// 嵌套层级过深
    #[error("Nesting too deep: max {0}")]
    NestingTooDeep(usize),

    /// Serde 序列化过程错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Serde 反序列化过程错误
    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidDocument,
    InvalidKeyName,
    InvalidStringEncoding,
    Range,
    Argument,
    Decode,
    Serde,
}

impl BsonError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BsonError::InvalidDocument(_) | BsonError::NestingTooDeep(_) => ErrorKind::InvalidDocument,
            BsonError::InvalidKeyName(_) => ErrorKind::InvalidKeyName,
            BsonError::InvalidStringEncoding(_) => ErrorKind::InvalidStringEncoding,
            BsonError::Range(_) => ErrorKind::Range,
            BsonError::Argument(_) => ErrorKind::Argument,
            BsonError::InvalidTypeMarker(_) | BsonError::UnexpectedEof | BsonError::Malformed(_) => {
                ErrorKind::Decode
            }
            BsonError::Serialization(_) | BsonError::Deserialization(_) => ErrorKind::Serde,
        }
    }
}

/// BSON 操作的 Result 类型别名
pub type BsonResult<T> = Result<T, BsonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(BsonError::InvalidKeyName("$a".into()).kind(), ErrorKind::InvalidKeyName);
        assert_eq!(BsonError::NestingTooDeep(100).kind(), ErrorKind::InvalidDocument);
        assert_eq!(BsonError::UnexpectedEof.kind(), ErrorKind::Decode);
        assert_eq!(BsonError::InvalidTypeMarker(0x13).kind(), ErrorKind::Decode);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            BsonError::InvalidTypeMarker(0x13).to_string(),
            "Invalid type marker: 0x13"
        );
    }
}
