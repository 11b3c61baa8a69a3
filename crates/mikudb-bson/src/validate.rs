//! 校验器
//!
//! 纯函数,不持有状态:
//! - 键名合法性(NUL 总是非法;`$` 开头、含 `.` 仅在 check_keys 时非法)
//! - 字符串 UTF-8 合法性,以及从声明的源编码转换
//! - 整数是否落在有符号 64 位范围内

use crate::{BsonError, BsonResult};

/// 字节串声明的源编码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceEncoding {
    #[default]
    Utf8,
    Ascii,
    /// ISO-8859-1,每个字节对应同值码点
    Latin1,
    Utf16Le,
}

/// # Brief
/// check_keys 模式下的键名校验
///
/// # Returns
/// - 含 NUL: `BsonError::InvalidDocument`(与模式无关的文档级错误)
/// - `$` 开头或含 `.`: `BsonError::InvalidKeyName`
pub fn validate_key(key: &str) -> BsonResult<()> {
    validate_cstring(key, "key")?;
    if key.starts_with('$') {
        return Err(BsonError::InvalidKeyName(format!(
            "key {:?} must not start with '$'",
            key
        )));
    }
    if key.contains('.') {
        return Err(BsonError::InvalidKeyName(format!(
            "key {:?} must not contain '.'",
            key
        )));
    }
    Ok(())
}

/// 以 NUL 结尾写出的字符串(键名、正则)内部不能再含 NUL
pub fn validate_cstring(s: &str, what: &str) -> BsonResult<()> {
    if s.as_bytes().contains(&0) {
        return Err(BsonError::InvalidDocument(format!(
            "{} {:?} must not contain null bytes",
            what, s
        )));
    }
    Ok(())
}

/// # Brief
/// 把声明了源编码的字节转换为合法的 UTF-8 字符串
///
/// 非法输入直接失败,不做替换或截断。
///
/// # Arguments
/// * `bytes` - 原始字节
/// * `encoding` - 源编码
///
/// # Returns
/// 转换失败时返回 `BsonError::InvalidStringEncoding`
pub fn validate_string(bytes: &[u8], encoding: SourceEncoding) -> BsonResult<String> {
    match encoding {
        SourceEncoding::Utf8 => validate_utf8(bytes).map(str::to_owned),
        SourceEncoding::Ascii => match bytes.iter().position(|b| !b.is_ascii()) {
            Some(pos) => Err(BsonError::InvalidStringEncoding(format!(
                "byte {:#04x} at offset {} is not ASCII",
                bytes[pos], pos
            ))),
            None => validate_utf8(bytes).map(str::to_owned),
        },
        SourceEncoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
        SourceEncoding::Utf16Le => {
            if bytes.len() % 2 != 0 {
                return Err(BsonError::InvalidStringEncoding(format!(
                    "UTF-16 input has odd length {}",
                    bytes.len()
                )));
            }
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16(&units)
                .map_err(|e| BsonError::InvalidStringEncoding(format!("invalid UTF-16: {}", e)))
        }
    }
}

/// 借用形式的 UTF-8 校验,解码器读取线格式字符串时使用
pub fn validate_utf8(bytes: &[u8]) -> BsonResult<&str> {
    std::str::from_utf8(bytes).map_err(|e| {
        BsonError::InvalidStringEncoding(format!(
            "invalid UTF-8 sequence after {} valid bytes",
            e.valid_up_to()
        ))
    })
}

/// # Brief
/// 检查整数是否在 `-2^63 ..= 2^63 - 1` 内
///
/// 在选择 32/64 位线格式表示之前调用。
pub fn validate_integer(n: i128) -> BsonResult<i64> {
    i64::try_from(n).map_err(|_| {
        BsonError::Range(format!("{} is out of the signed 64-bit range", n))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_keys() {
        for key in ["hello", "he$llo", "hell$o", "_id", "aé", ""] {
            assert!(validate_key(key).is_ok(), "{:?} should be valid", key);
        }
    }

    #[test]
    fn test_invalid_key_names() {
        for key in ["$hello", ".hello", "hello.", "hel.lo"] {
            assert!(
                matches!(validate_key(key), Err(BsonError::InvalidKeyName(_))),
                "{:?} should be rejected",
                key
            );
        }
    }

    #[test]
    fn test_nul_key_is_document_error() {
        assert!(matches!(
            validate_key("he\0llo"),
            Err(BsonError::InvalidDocument(_))
        ));
        // NUL 优先于 `$` 规则
        assert!(matches!(
            validate_key("$\0"),
            Err(BsonError::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_utf8_validation() {
        assert_eq!(validate_string("aé".as_bytes(), SourceEncoding::Utf8).unwrap(), "aé");
        assert!(matches!(
            validate_string(b"123\xD9", SourceEncoding::Utf8),
            Err(BsonError::InvalidStringEncoding(_))
        ));
        // ISO-8859-1 编码的 "aé" 不是合法 UTF-8
        assert!(matches!(
            validate_string(b"a\xE9", SourceEncoding::Utf8),
            Err(BsonError::InvalidStringEncoding(_))
        ));
    }

    #[test]
    fn test_source_encoding_conversion() {
        assert_eq!(validate_string(b"a\xE9", SourceEncoding::Latin1).unwrap(), "aé");
        assert_eq!(validate_string(b"abc", SourceEncoding::Ascii).unwrap(), "abc");
        assert!(matches!(
            validate_string(b"a\xE9", SourceEncoding::Ascii),
            Err(BsonError::InvalidStringEncoding(_))
        ));

        let utf16: Vec<u8> = "壁に耳".encode_utf16().flat_map(u16::to_le_bytes).collect();
        assert_eq!(validate_string(&utf16, SourceEncoding::Utf16Le).unwrap(), "壁に耳");
        // 孤立的高位代理项
        assert!(matches!(
            validate_string(&[0x00, 0xD8], SourceEncoding::Utf16Le),
            Err(BsonError::InvalidStringEncoding(_))
        ));
        assert!(validate_string(&[0x61], SourceEncoding::Utf16Le).is_err());
    }

    #[test]
    fn test_integer_bounds() {
        assert_eq!(validate_integer(9223372036854775807).unwrap(), i64::MAX);
        assert_eq!(validate_integer(-9223372036854775808).unwrap(), i64::MIN);
        assert!(matches!(
            validate_integer(9223372036854775808),
            Err(BsonError::Range(_))
        ));
        assert!(matches!(
            validate_integer(-9223372036854775809),
            Err(BsonError::Range(_))
        ));
        assert!(validate_integer(1i128 << 75).is_err());
    }
}
