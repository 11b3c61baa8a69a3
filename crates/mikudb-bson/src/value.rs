//! BSON 值类型定义模块
//!
//! `Value` 是覆盖全部线类型的封闭枚举,编码器和解码器都对它做穷尽匹配,
//! 新增类型时编译器会指出所有遗漏的分支。

use crate::document::Document;
use crate::oid::ObjectId;
use crate::spec::ElementType;
use crate::types::{Binary, Code, DateTime, DbRef, Regex, Timestamp};
use crate::validate::{self, SourceEncoding};
use crate::BsonResult;
use chrono::{FixedOffset, Utc};
use compact_str::CompactString;
use std::fmt;
use std::time::SystemTime;
use uuid::Uuid;

/// BSON 值的枚举类型
///
/// # 支持的类型
///
/// - **标量**: Double, String, Boolean, Null, Int32, Int64, DateTime
/// - **复合类型**: Document, Array
/// - **扩展类型**: Binary, ObjectId, Regex, Code, Symbol, Timestamp, MinKey, MaxKey, DbRef
///
/// # 示例
///
/// ```rust,ignore
/// use mikudb_bson::Value;
///
/// let value = Value::from("hello");
/// assert_eq!(value.type_name(), "string");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 64 位 IEEE-754 浮点数
    Double(f64),
    /// UTF-8 字符串
    String(CompactString),
    /// 嵌入文档
    Document(Document),
    /// 有序数组,线格式上以 "0","1",... 为键
    Array(Vec<Value>),
    /// 带子类型的二进制数据
    Binary(Binary),
    /// 12 字节对象标识符
    ObjectId(ObjectId),
    /// 布尔值
    Boolean(bool),
    /// UTC 时间,线格式精度为毫秒
    DateTime(DateTime),
    /// 空值
    Null,
    /// 正则表达式
    Regex(Regex),
    /// JavaScript 代码(可带作用域)
    Code(Code),
    /// 符号
    Symbol(CompactString),
    /// 32 位有符号整数
    Int32(i32),
    /// 复制时间戳
    Timestamp(Timestamp),
    /// 64 位有符号整数
    Int64(i64),
    /// 比任何值都小的哨兵
    MinKey,
    /// 比任何值都大的哨兵
    MaxKey,
    /// 数据库引用
    DbRef(DbRef),
}

impl Value {
    /// # Brief
    /// 从任意宽度的整数构造,自动选择 Int32 或 Int64
    ///
    /// # Returns
    /// 超出有符号 64 位范围时返回 `BsonError::Range`
    pub fn from_integer(n: i128) -> BsonResult<Value> {
        let n = validate::validate_integer(n)?;
        Ok(match i32::try_from(n) {
            Ok(small) => Value::Int32(small),
            Err(_) => Value::Int64(n),
        })
    }

    /// # Brief
    /// 从声明了源编码的字节构造字符串值
    ///
    /// # Arguments
    /// * `bytes` - 原始字节
    /// * `encoding` - 字节的源编码,非 UTF-8 时先转换
    ///
    /// # Returns
    /// 无法转换为合法 UTF-8 时返回 `BsonError::InvalidStringEncoding`
    pub fn string_from_encoded(bytes: &[u8], encoding: SourceEncoding) -> BsonResult<Value> {
        let s = validate::validate_string(bytes, encoding)?;
        Ok(Value::String(CompactString::from(s)))
    }

    /// 该值对应的线格式类型标记
    pub fn element_type(&self) -> ElementType {
        match self {
            Value::Double(_) => ElementType::Double,
            Value::String(_) => ElementType::String,
            Value::Document(_) | Value::DbRef(_) => ElementType::Document,
            Value::Array(_) => ElementType::Array,
            Value::Binary(_) => ElementType::Binary,
            Value::ObjectId(_) => ElementType::ObjectId,
            Value::Boolean(_) => ElementType::Boolean,
            Value::DateTime(_) => ElementType::DateTime,
            Value::Null => ElementType::Null,
            Value::Regex(_) => ElementType::Regex,
            Value::Code(code) if code.scope().is_some() => ElementType::JavaScriptCodeWithScope,
            Value::Code(_) => ElementType::JavaScriptCode,
            Value::Symbol(_) => ElementType::Symbol,
            Value::Int32(_) => ElementType::Int32,
            Value::Timestamp(_) => ElementType::Timestamp,
            Value::Int64(_) => ElementType::Int64,
            Value::MinKey => ElementType::MinKey,
            Value::MaxKey => ElementType::MaxKey,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Document(_) => "document",
            Value::Array(_) => "array",
            Value::Binary(_) => "binary",
            Value::ObjectId(_) => "objectId",
            Value::Boolean(_) => "boolean",
            Value::DateTime(_) => "dateTime",
            Value::Null => "null",
            Value::Regex(_) => "regex",
            Value::Code(_) => "javascript",
            Value::Symbol(_) => "symbol",
            Value::Int32(_) => "int32",
            Value::Timestamp(_) => "timestamp",
            Value::Int64(_) => "int64",
            Value::MinKey => "minKey",
            Value::MaxKey => "maxKey",
            Value::DbRef(_) => "dbRef",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(n) => Some(*n),
            _ => None,
        }
    }

    /// Int32 与 Int64 都可取出为 i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(n) => Some(*n as i64),
            Value::Int64(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(n) => Some(*n),
            Value::Int32(n) => Some(*n as f64),
            Value::Int64(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn as_object_id(&self) -> Option<ObjectId> {
        match self {
            Value::ObjectId(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// # Brief
    /// 从文档中按键取值,或从数组中按下标字符串取值
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Document(doc) => doc.get(key),
            Value::Array(arr) => key.parse::<usize>().ok().and_then(|i| arr.get(i)),
            _ => None,
        }
    }

    /// # Brief
    /// 使用点分隔的路径访问嵌套值
    ///
    /// # Example
    /// ```rust,ignore
    /// let city = value.get_path("user.address.city");
    /// ```
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut current = self;
        for part in path.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Double(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Document(doc) => write!(f, "{}", doc),
            Value::Array(arr) => {
                write!(f, "[")?;
                for (i, v) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Binary(b) => write!(f, "Binary({:#04x}, {} bytes)", b.subtype().to_u8(), b.len()),
            Value::ObjectId(id) => write!(f, "ObjectId(\"{}\")", id),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::DateTime(dt) => write!(f, "DateTime(\"{}\")", dt),
            Value::Null => write!(f, "null"),
            Value::Regex(r) => write!(f, "{}", r),
            Value::Code(code) => match code.scope() {
                Some(scope) => write!(f, "Code({:?}, scope: {})", code.code(), scope),
                None => write!(f, "Code({:?})", code.code()),
            },
            Value::Symbol(s) => write!(f, ":{}", s),
            Value::Int32(n) => write!(f, "{}", n),
            Value::Timestamp(ts) => write!(f, "Timestamp({}, {})", ts.seconds, ts.increment),
            Value::Int64(n) => write!(f, "{}", n),
            Value::MinKey => write!(f, "MinKey"),
            Value::MaxKey => write!(f, "MaxKey"),
            Value::DbRef(r) => write!(f, "DBRef(\"{}\", {})", r.namespace, r.id),
        }
    }
}

// ============================================================================
// From 特征实现 - 支持从各种 Rust 类型转换为 Value
// ============================================================================

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        match i32::try_from(v) {
            Ok(n) => Value::Int32(n),
            Err(_) => Value::Int64(v as i64),
        }
    }
}

impl TryFrom<u64> for Value {
    type Error = crate::BsonError;

    fn try_from(v: u64) -> Result<Self, Self::Error> {
        Value::from_integer(v as i128)
    }
}

impl TryFrom<i128> for Value {
    type Error = crate::BsonError;

    fn try_from(v: i128) -> Result<Self, Self::Error> {
        Value::from_integer(v)
    }
}

impl TryFrom<u128> for Value {
    type Error = crate::BsonError;

    fn try_from(v: u128) -> Result<Self, Self::Error> {
        let n = i128::try_from(v).map_err(|_| {
            crate::BsonError::Range(format!("{} is out of the signed 64-bit range", v))
        })?;
        Value::from_integer(n)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Double(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(CompactString::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(CompactString::from(v))
    }
}

impl From<CompactString> for Value {
    fn from(v: CompactString) -> Self {
        Value::String(v)
    }
}

impl From<Document> for Value {
    fn from(v: Document) -> Self {
        Value::Document(v)
    }
}

impl From<ObjectId> for Value {
    fn from(v: ObjectId) -> Self {
        Value::ObjectId(v)
    }
}

impl From<Binary> for Value {
    fn from(v: Binary) -> Self {
        Value::Binary(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Binary(Binary::from_uuid(v))
    }
}

impl From<Regex> for Value {
    fn from(v: Regex) -> Self {
        Value::Regex(v)
    }
}

impl From<Code> for Value {
    fn from(v: Code) -> Self {
        Value::Code(v)
    }
}

impl From<Timestamp> for Value {
    fn from(v: Timestamp) -> Self {
        Value::Timestamp(v)
    }
}

impl From<DbRef> for Value {
    fn from(v: DbRef) -> Self {
        Value::DbRef(v)
    }
}

impl From<DateTime> for Value {
    fn from(v: DateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<chrono::DateTime<Utc>> for Value {
    fn from(v: chrono::DateTime<Utc>) -> Self {
        Value::DateTime(v.into())
    }
}

/// 带时区偏移的时间按同一时刻换算成 UTC 毫秒
impl From<chrono::DateTime<FixedOffset>> for Value {
    fn from(v: chrono::DateTime<FixedOffset>) -> Self {
        Value::DateTime(v.into())
    }
}

impl From<SystemTime> for Value {
    fn from(v: SystemTime) -> Self {
        Value::DateTime(v.into())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

/// 构造 Value 的便捷宏
///
/// # 示例
///
/// ```rust,ignore
/// use mikudb_bson::bson;
///
/// let null = bson!(null);
/// let number = bson!(42);
/// let array = bson!([1, "two", 3.0]);
/// let doc = bson!({ "name": "test", "value": 123 });
/// ```
#[macro_export]
macro_rules! bson {
    (null) => {
        $crate::Value::Null
    };
    ([ $($elem:tt),* $(,)? ]) => {
        $crate::Value::Array(vec![ $($crate::bson!($elem)),* ])
    };
    ({}) => {
        $crate::Value::Document($crate::Document::new())
    };
    ({ $($key:literal : $value:tt),+ $(,)? }) => {
        $crate::Value::Document($crate::doc! { $($key : $value),+ })
    };
    ($e:expr) => {
        $crate::Value::from($e)
    };
}
