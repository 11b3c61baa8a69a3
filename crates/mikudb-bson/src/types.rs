//! 扩展类型
//!
//! 没有原生标量对应物的值类型,每种都有自己固定或带标记的线格式布局:
//! Binary、Regex、Code/CodeWithScope、DateTime、Timestamp、DbRef。
//! ObjectId 单独位于 `oid` 模块。

use crate::document::Document;
use crate::oid::ObjectId;
use crate::spec::BinarySubtype;
use crate::value::Value;
use crate::{BsonError, BsonResult};
use chrono::{FixedOffset, SecondsFormat, TimeZone, Utc};
use std::fmt;
use std::time::SystemTime;
use uuid::Uuid;

/// 带子类型标记的二进制数据
///
/// 序列化之前是只追加的缓冲区。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Binary {
    subtype: BinarySubtype,
    bytes: Vec<u8>,
}

impl Binary {
    /// 创建空的通用子类型缓冲区
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subtype(bytes: impl Into<Vec<u8>>, subtype: BinarySubtype) -> Self {
        Self {
            subtype,
            bytes: bytes.into(),
        }
    }

    /// 追加一个字节
    pub fn put(&mut self, byte: u8) {
        self.bytes.push(byte);
    }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    pub fn subtype(&self) -> BinarySubtype {
        self.subtype
    }

    pub fn set_subtype(&mut self, subtype: BinarySubtype) {
        self.subtype = subtype;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self::with_subtype(uuid.as_bytes().to_vec(), BinarySubtype::Uuid)
    }

    /// # Brief
    /// 按 UUID 解释内容
    ///
    /// # Returns
    /// 子类型不是 UUID(新旧两种)或长度不是 16 时返回 `BsonError::Argument`
    pub fn to_uuid(&self) -> BsonResult<Uuid> {
        if !matches!(self.subtype, BinarySubtype::Uuid | BinarySubtype::UuidOld) {
            return Err(BsonError::Argument(format!(
                "Binary subtype {:#04x} is not a UUID",
                self.subtype.to_u8()
            )));
        }
        Uuid::from_slice(&self.bytes)
            .map_err(|e| BsonError::Argument(format!("Invalid UUID binary: {}", e)))
    }
}

impl From<Vec<u8>> for Binary {
    fn from(bytes: Vec<u8>) -> Self {
        Self::with_subtype(bytes, BinarySubtype::Generic)
    }
}

impl From<&[u8]> for Binary {
    fn from(bytes: &[u8]) -> Self {
        Self::with_subtype(bytes.to_vec(), BinarySubtype::Generic)
    }
}

/// 正则表达式 (pattern + flags)
///
/// flags 按字符排序并去重保存,不论构造时的顺序如何,线格式都一致。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Regex {
    pattern: String,
    flags: String,
}

impl Regex {
    pub fn new(pattern: impl Into<String>, flags: &str) -> Self {
        Self {
            pattern: pattern.into(),
            flags: canonical_flags(flags),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn flags(&self) -> &str {
        &self.flags
    }

    /// # Brief
    /// 编译为 `regex::Regex`
    ///
    /// 识别 i/m/s/x 四个标志,其余标志(l、u)对 Rust 正则引擎没有意义,直接忽略。
    ///
    /// # Returns
    /// 模式无法编译时返回 `BsonError::Argument`
    pub fn to_regex(&self) -> BsonResult<regex::Regex> {
        let inline: String = self
            .flags
            .chars()
            .filter(|c| matches!(c, 'i' | 'm' | 's' | 'x'))
            .collect();
        let source = if inline.is_empty() {
            self.pattern.clone()
        } else {
            format!("(?{}){}", inline, self.pattern)
        };
        regex::Regex::new(&source)
            .map_err(|e| BsonError::Argument(format!("Invalid regex /{}/: {}", self.pattern, e)))
    }
}

fn canonical_flags(flags: &str) -> String {
    let mut chars: Vec<char> = flags.chars().collect();
    chars.sort_unstable();
    chars.dedup();
    chars.into_iter().collect()
}

impl fmt::Display for Regex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.pattern, self.flags)
    }
}

/// JavaScript 代码,可带作用域
///
/// 没有作用域时编码为 Code (0x0D),有作用域时编码为 CodeWithScope (0x0F)。
#[derive(Debug, Clone, PartialEq)]
pub struct Code {
    code: String,
    scope: Option<Document>,
}

impl Code {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            scope: None,
        }
    }

    pub fn with_scope(code: impl Into<String>, scope: Document) -> Self {
        Self {
            code: code.into(),
            scope: Some(scope),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn scope(&self) -> Option<&Document> {
        self.scope.as_ref()
    }
}

impl TryFrom<Value> for Code {
    type Error = BsonError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) => Ok(Code::new(s.as_str())),
            Value::Code(code) => Ok(code),
            other => Err(BsonError::Argument(format!(
                "Code must be in the form of a String, got {}",
                other.type_name()
            ))),
        }
    }
}

/// UTC 日期,自 Unix 纪元起的有符号毫秒数
///
/// # Brief
/// 直接保存线格式上的 int64,任意取值都能原样往返,
/// 包括超出 chrono 可表示范围的 `i64::MIN` / `i64::MAX` 哨兵。
/// 需要日历运算时通过 [`DateTime::to_chrono`] 转换。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DateTime(i64);

impl DateTime {
    pub const MIN: Self = Self(i64::MIN);
    pub const MAX: Self = Self(i64::MAX);

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn now() -> Self {
        Utc::now().into()
    }

    pub const fn timestamp_millis(self) -> i64 {
        self.0
    }

    /// # Brief
    /// 转换为 chrono 时间
    ///
    /// # Returns
    /// 超出 chrono 范围时返回 None
    pub fn to_chrono(self) -> Option<chrono::DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.0).single()
    }

    pub fn try_to_chrono(self) -> BsonResult<chrono::DateTime<Utc>> {
        self.to_chrono().ok_or_else(|| {
            BsonError::Range(format!("datetime {} ms is outside the representable range", self.0))
        })
    }
}

/// 亚毫秒部分向下截断,不做四舍五入
impl From<chrono::DateTime<Utc>> for DateTime {
    fn from(v: chrono::DateTime<Utc>) -> Self {
        Self(v.timestamp_millis())
    }
}

impl From<chrono::DateTime<FixedOffset>> for DateTime {
    fn from(v: chrono::DateTime<FixedOffset>) -> Self {
        Self(v.timestamp_millis())
    }
}

impl From<SystemTime> for DateTime {
    fn from(v: SystemTime) -> Self {
        chrono::DateTime::<Utc>::from(v).into()
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_chrono() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => write!(f, "{} ms", self.0),
        }
    }
}

/// 复制协议内部使用的时间戳 (seconds, increment)
///
/// 与 UTC 日期是不同的线类型。排序先比较秒,再比较自增量;
/// 线格式上先写 increment 再写 seconds。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp {
    pub seconds: u32,
    pub increment: u32,
}

impl Timestamp {
    pub fn new(seconds: u32, increment: u32) -> Self {
        Self { seconds, increment }
    }
}

/// 数据库引用,编码为 `{ "$ref": namespace, "$id": id }`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DbRef {
    pub namespace: String,
    pub id: ObjectId,
}

impl DbRef {
    pub fn new(namespace: impl Into<String>, id: ObjectId) -> Self {
        Self {
            namespace: namespace.into(),
            id,
        }
    }

    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert("$ref", self.namespace.as_str());
        doc.insert("$id", self.id);
        doc
    }
}
