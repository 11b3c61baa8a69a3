//! BSON 线格式常量
//!
//! 元素类型标记与二进制子类型的取值均来自外部 BSON 规范,
//! 必须与其它实现逐字节兼容。

pub use mikudb_common::config::{DEFAULT_MAX_BSON_SIZE, DEFAULT_MAX_NESTING_DEPTH};

/// 最小文档: 4 字节长度头 + 结尾 NUL
pub const MIN_DOCUMENT_SIZE: usize = 5;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Double = 0x01,
    String = 0x02,
    Document = 0x03,
    Array = 0x04,
    Binary = 0x05,
    Undefined = 0x06,
    ObjectId = 0x07,
    Boolean = 0x08,
    DateTime = 0x09,
    Null = 0x0A,
    Regex = 0x0B,
    DbPointer = 0x0C,
    JavaScriptCode = 0x0D,
    Symbol = 0x0E,
    JavaScriptCodeWithScope = 0x0F,
    Int32 = 0x10,
    Timestamp = 0x11,
    Int64 = 0x12,
    MaxKey = 0x7F,
    MinKey = 0xFF,
}

impl ElementType {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Double),
            0x02 => Some(Self::String),
            0x03 => Some(Self::Document),
            0x04 => Some(Self::Array),
            0x05 => Some(Self::Binary),
            0x06 => Some(Self::Undefined),
            0x07 => Some(Self::ObjectId),
            0x08 => Some(Self::Boolean),
            0x09 => Some(Self::DateTime),
            0x0A => Some(Self::Null),
            0x0B => Some(Self::Regex),
            0x0C => Some(Self::DbPointer),
            0x0D => Some(Self::JavaScriptCode),
            0x0E => Some(Self::Symbol),
            0x0F => Some(Self::JavaScriptCodeWithScope),
            0x10 => Some(Self::Int32),
            0x11 => Some(Self::Timestamp),
            0x12 => Some(Self::Int64),
            0x7F => Some(Self::MaxKey),
            0xFF => Some(Self::MinKey),
            _ => None,
        }
    }
}

/// 二进制子类型
///
/// `BinaryOld` (0x02) 在线格式上多带一个内层长度,只为兼容旧数据而保留。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinarySubtype {
    Generic,
    Function,
    BinaryOld,
    UuidOld,
    Uuid,
    Md5,
    /// 0x80..=0xFF 用户自定义
    UserDefined(u8),
    /// 规范保留的其余取值,解码时原样保留
    Reserved(u8),
}

impl BinarySubtype {
    pub fn from_u8(byte: u8) -> Self {
        match byte {
            0x00 => Self::Generic,
            0x01 => Self::Function,
            0x02 => Self::BinaryOld,
            0x03 => Self::UuidOld,
            0x04 => Self::Uuid,
            0x05 => Self::Md5,
            b if b >= 0x80 => Self::UserDefined(b),
            b => Self::Reserved(b),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::Generic => 0x00,
            Self::Function => 0x01,
            Self::BinaryOld => 0x02,
            Self::UuidOld => 0x03,
            Self::Uuid => 0x04,
            Self::Md5 => 0x05,
            Self::UserDefined(b) | Self::Reserved(b) => b,
        }
    }
}

impl Default for BinarySubtype {
    fn default() -> Self {
        Self::Generic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_type_tags() {
        assert_eq!(ElementType::from_u8(0x10), Some(ElementType::Int32));
        assert_eq!(ElementType::from_u8(0xFF), Some(ElementType::MinKey));
        assert_eq!(ElementType::from_u8(0x7F), Some(ElementType::MaxKey));
        assert_eq!(ElementType::from_u8(0x13), None);
        assert_eq!(ElementType::from_u8(0x00), None);
    }

    #[test]
    fn test_binary_subtype_mapping() {
        for byte in [0x00u8, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x7F, 0x80, 0xFF] {
            assert_eq!(BinarySubtype::from_u8(byte).to_u8(), byte);
        }
        assert_eq!(BinarySubtype::from_u8(0x80), BinarySubtype::UserDefined(0x80));
        assert_eq!(BinarySubtype::from_u8(0x07), BinarySubtype::Reserved(0x07));
    }
}
