//! Serde 反序列化模块
//!
//! 实现 Serde Deserializer trait,将 `Value` 反序列化为 Rust 数据结构。
//!
//! - 整数: Int32 与 Int64 可互相转换,超出目标类型范围时报错
//! - ObjectId: 以十六进制字符串交给访问者
//! - DateTime: 以 RFC 3339 字符串交给访问者,`chrono::DateTime<Utc>` 字段可直接解析;
//!   超出 chrono 范围的日期改为交出毫秒整数
//! - 正则、代码、时间戳等扩展类型按扩展 JSON 的结构交给访问者

use crate::document::Document;
use crate::oid::ObjectId;
use crate::ser::{DATETIME_NEWTYPE, OBJECT_ID_NEWTYPE};
use crate::types::DateTime;
use crate::value::Value;
use crate::{BsonError, BsonResult};
use chrono::SecondsFormat;
use serde::de::{self, DeserializeOwned, DeserializeSeed, IntoDeserializer, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use std::fmt;

pub struct Deserializer<'de> {
    input: &'de Value,
}

impl<'de> Deserializer<'de> {
    pub fn new(input: &'de Value) -> Self {
        Deserializer { input }
    }

    fn unexpected(&self, expected: &str) -> BsonError {
        BsonError::Deserialization(format!(
            "Expected {}, got {}",
            expected,
            self.input.type_name()
        ))
    }

    /// 扩展类型借道 serde_json 的数据模型
    fn extended_json<V: Visitor<'de>>(&self, visitor: V) -> BsonResult<V::Value> {
        use serde::Deserializer as _;
        crate::json::to_json(self.input)
            .deserialize_any(visitor)
            .map_err(|e| BsonError::Deserialization(e.to_string()))
    }
}

pub fn from_value<'de, T: Deserialize<'de>>(value: &'de Value) -> BsonResult<T> {
    T::deserialize(Deserializer::new(value))
}

/// # Brief
/// 把文档转换为 Rust 值
///
/// 文档只被读取,调用后仍可继续使用。需要借用字符串的类型请用 `from_value`。
pub fn from_document<T: DeserializeOwned>(doc: &Document) -> BsonResult<T> {
    T::deserialize(DocumentDeserializer { doc })
}

/// 解码字节流后转换为 Rust 值
pub fn from_slice<T: DeserializeOwned>(bytes: &[u8]) -> BsonResult<T> {
    let doc = crate::codec::deserialize(bytes)?;
    from_document(&doc)
}

impl de::Error for BsonError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        BsonError::Deserialization(msg.to_string())
    }
}

impl<'de> de::Deserializer<'de> for Deserializer<'de> {
    type Error = BsonError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.input {
            Value::Null => visitor.visit_unit(),
            Value::Boolean(b) => visitor.visit_bool(*b),
            Value::Int32(n) => visitor.visit_i32(*n),
            Value::Int64(n) => visitor.visit_i64(*n),
            Value::Double(n) => visitor.visit_f64(*n),
            Value::String(s) | Value::Symbol(s) => visitor.visit_borrowed_str(s.as_str()),
            Value::Binary(b) => visitor.visit_borrowed_bytes(b.as_bytes()),
            Value::ObjectId(id) => visitor.visit_string(id.to_hex()),
            Value::DateTime(dt) => match dt.to_chrono() {
                Some(dt) => visitor.visit_string(dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
                None => visitor.visit_i64(dt.timestamp_millis()),
            },
            Value::Array(arr) => visitor.visit_seq(SeqDeserializer::new(arr.iter())),
            Value::Document(doc) => visitor.visit_map(MapDeserializer::new(doc.iter())),
            Value::DbRef(_)
            | Value::Regex(_)
            | Value::Code(_)
            | Value::Timestamp(_)
            | Value::MinKey
            | Value::MaxKey => self.extended_json(visitor),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.input {
            Value::Boolean(b) => visitor.visit_bool(*b),
            _ => Err(self.unexpected("boolean")),
        }
    }

    fn deserialize_i8<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_i64(visitor)
    }

    fn deserialize_i16<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_i64(visitor)
    }

    fn deserialize_i32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_i64(visitor)
    }

    // 访问者自己负责目标类型的范围检查
    fn deserialize_i64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.input.as_i64() {
            Some(n) => visitor.visit_i64(n),
            None => Err(self.unexpected("integer")),
        }
    }

    fn deserialize_u8<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_i64(visitor)
    }

    fn deserialize_u16<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_i64(visitor)
    }

    fn deserialize_u32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_i64(visitor)
    }

    fn deserialize_u64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_i64(visitor)
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_f64(visitor)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.input {
            Value::Double(n) => visitor.visit_f64(*n),
            Value::Int32(n) => visitor.visit_f64(*n as f64),
            Value::Int64(n) => visitor.visit_f64(*n as f64),
            _ => Err(self.unexpected("double")),
        }
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_str(visitor)
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.input {
            Value::String(s) | Value::Symbol(s) => visitor.visit_borrowed_str(s.as_str()),
            Value::ObjectId(_) | Value::DateTime(_) => self.deserialize_any(visitor),
            _ => Err(self.unexpected("string")),
        }
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_str(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.input {
            Value::Binary(b) => visitor.visit_borrowed_bytes(b.as_bytes()),
            Value::Array(arr) => visitor.visit_seq(SeqDeserializer::new(arr.iter())),
            _ => Err(self.unexpected("binary")),
        }
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_bytes(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.input {
            Value::Null => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.input {
            Value::Null => visitor.visit_unit(),
            _ => Err(self.unexpected("null")),
        }
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        match (name, self.input) {
            (OBJECT_ID_NEWTYPE, Value::ObjectId(id)) => visitor.visit_string(id.to_hex()),
            (DATETIME_NEWTYPE, Value::DateTime(dt)) => visitor.visit_i64(dt.timestamp_millis()),
            _ => visitor.visit_newtype_struct(self),
        }
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.input {
            Value::Array(arr) => visitor.visit_seq(SeqDeserializer::new(arr.iter())),
            _ => Err(self.unexpected("array")),
        }
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.input {
            Value::Document(doc) => visitor.visit_map(MapDeserializer::new(doc.iter())),
            Value::DbRef(_) => self.extended_json(visitor),
            _ => Err(self.unexpected("document")),
        }
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_map(visitor)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        match self.input {
            Value::String(s) => visitor.visit_enum(s.as_str().into_deserializer()),
            Value::Document(doc) if doc.len() == 1 => {
                let Some((key, value)) = doc.iter().next() else {
                    return Err(self.unexpected("single-key document"));
                };
                visitor.visit_enum(EnumDeserializer {
                    variant: key.as_str(),
                    value,
                })
            }
            _ => Err(self.unexpected("string or single-key document for enum")),
        }
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_str(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }

    serde::forward_to_deserialize_any! { i128 u128 }
}

/// 顶层文档的反序列化入口
struct DocumentDeserializer<'de> {
    doc: &'de Document,
}

impl<'de> de::Deserializer<'de> for DocumentDeserializer<'de> {
    type Error = BsonError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_map(MapDeserializer::new(self.doc.iter()))
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct map struct enum identifier ignored_any
    }
}

struct SeqDeserializer<'de, I> {
    iter: I,
    _marker: std::marker::PhantomData<&'de ()>,
}

impl<'de, I: Iterator<Item = &'de Value>> SeqDeserializer<'de, I> {
    fn new(iter: I) -> Self {
        Self {
            iter,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<'de, I: Iterator<Item = &'de Value>> SeqAccess<'de> for SeqDeserializer<'de, I> {
    type Error = BsonError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, Self::Error> {
        match self.iter.next() {
            Some(value) => seed.deserialize(Deserializer::new(value)).map(Some),
            None => Ok(None),
        }
    }
}

struct MapDeserializer<'de, I> {
    iter: I,
    value: Option<&'de Value>,
}

impl<'de, I: Iterator<Item = (&'de crate::Key, &'de Value)>> MapDeserializer<'de, I> {
    fn new(iter: I) -> Self {
        Self { iter, value: None }
    }
}

impl<'de, I: Iterator<Item = (&'de crate::Key, &'de Value)>> MapAccess<'de>
    for MapDeserializer<'de, I>
{
    type Error = BsonError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, Self::Error> {
        match self.iter.next() {
            Some((key, value)) => {
                self.value = Some(value);
                let key: de::value::BorrowedStrDeserializer<'de, BsonError> =
                    de::value::BorrowedStrDeserializer::new(key.as_str());
                seed.deserialize(key).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(
        &mut self,
        seed: V,
    ) -> Result<V::Value, Self::Error> {
        let value = self
            .value
            .take()
            .ok_or_else(|| BsonError::Deserialization("No value".to_string()))?;
        seed.deserialize(Deserializer::new(value))
    }
}

struct EnumDeserializer<'de> {
    variant: &'de str,
    value: &'de Value,
}

impl<'de> de::EnumAccess<'de> for EnumDeserializer<'de> {
    type Error = BsonError;
    type Variant = VariantDeserializer<'de>;

    fn variant_seed<V: DeserializeSeed<'de>>(
        self,
        seed: V,
    ) -> Result<(V::Value, Self::Variant), Self::Error> {
        let deserializer: de::value::BorrowedStrDeserializer<'de, BsonError> =
            de::value::BorrowedStrDeserializer::new(self.variant);
        let variant = seed.deserialize(deserializer)?;
        Ok((variant, VariantDeserializer { value: self.value }))
    }
}

struct VariantDeserializer<'de> {
    value: &'de Value,
}

impl<'de> de::VariantAccess<'de> for VariantDeserializer<'de> {
    type Error = BsonError;

    fn unit_variant(self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(
        self,
        seed: T,
    ) -> Result<T::Value, Self::Error> {
        seed.deserialize(Deserializer::new(self.value))
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, Self::Error> {
        de::Deserializer::deserialize_seq(Deserializer::new(self.value), visitor)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        de::Deserializer::deserialize_map(Deserializer::new(self.value), visitor)
    }
}

struct ObjectIdVisitor;

impl<'de> Visitor<'de> for ObjectIdVisitor {
    type Value = ObjectId;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a 24-character hex ObjectId")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<ObjectId, E> {
        ObjectId::from_hex(v).map_err(E::custom)
    }

    fn visit_newtype_struct<D: de::Deserializer<'de>>(self, d: D) -> Result<ObjectId, D::Error> {
        d.deserialize_str(self)
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: de::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_newtype_struct(OBJECT_ID_NEWTYPE, ObjectIdVisitor)
    }
}

struct DateTimeVisitor;

impl<'de> Visitor<'de> for DateTimeVisitor {
    type Value = DateTime;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Unix milliseconds or an RFC 3339 datetime")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<DateTime, E> {
        Ok(DateTime::from_millis(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<DateTime, E> {
        i64::try_from(v)
            .map(DateTime::from_millis)
            .map_err(|_| E::custom(format!("datetime {} ms is out of range", v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<DateTime, E> {
        chrono::DateTime::parse_from_rfc3339(v)
            .map(DateTime::from)
            .map_err(E::custom)
    }

    fn visit_newtype_struct<D: de::Deserializer<'de>>(self, d: D) -> Result<DateTime, D::Error> {
        d.deserialize_any(self)
    }
}

impl<'de> Deserialize<'de> for DateTime {
    fn deserialize<D: de::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_newtype_struct(DATETIME_NEWTYPE, DateTimeVisitor)
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any BSON value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Boolean(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        Value::from_integer(v as i128).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        Value::from_integer(v as i128).map_err(E::custom)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(Value::Double(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::from(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Value, E> {
        Ok(Value::Binary(v.into()))
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: de::Deserializer<'de>>(self, d: D) -> Result<Value, D::Error> {
        Value::deserialize(d)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut arr = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            arr.push(item);
        }
        Ok(Value::Array(arr))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
        let mut doc = Document::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, value)) = map.next_entry::<String, Value>()? {
            doc.insert(key, value);
        }
        Ok(Value::Document(doc))
    }
}

/// 从通用数据模型还原,ObjectId 与 DateTime 之外的扩展类型不保留
impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: de::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: de::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Document(doc) => Ok(doc),
            other => Err(de::Error::custom(format!(
                "Expected document, got {}",
                other.type_name()
            ))),
        }
    }
}
