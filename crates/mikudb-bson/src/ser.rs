//! Serde 序列化模块
//!
//! 把实现了 `Serialize` 的 Rust 值转换为 `Value`,再交给编码器写出。
//!
//! - 整数按数值选择 Int32 或 Int64,超出有符号 64 位范围返回 `BsonError::Range`
//! - 顶层必须是结构体或映射,否则 `to_document` 返回 `BsonError::InvalidDocument`
//! - 映射的键必须序列化为字符串

use crate::document::Document;
use crate::oid::ObjectId;
use crate::types::DateTime;
use crate::value::Value;
use crate::{BsonError, BsonResult};
use compact_str::CompactString;
use serde::ser::{self, Serialize, SerializeMap};

/// ObjectId 经由 newtype 传递,其它序列化器只会看到十六进制字符串
pub(crate) const OBJECT_ID_NEWTYPE: &str = "$__bson_object_id";
/// 日期经由 newtype 传递,载荷为 Unix 毫秒
pub(crate) const DATETIME_NEWTYPE: &str = "$__bson_datetime";

pub struct Serializer {
    output: Value,
}

impl Serializer {
    pub fn new() -> Self {
        Self {
            output: Value::Null,
        }
    }

    pub fn into_value(self) -> Value {
        self.output
    }
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new()
    }
}

pub fn to_value<T: Serialize + ?Sized>(value: &T) -> BsonResult<Value> {
    let mut serializer = Serializer::new();
    value.serialize(&mut serializer)?;
    Ok(serializer.into_value())
}

/// # Brief
/// 把 Rust 值转换为文档
///
/// # Returns
/// 顶层值不是文档形状时返回 `BsonError::InvalidDocument`
pub fn to_document<T: Serialize + ?Sized>(value: &T) -> BsonResult<Document> {
    match to_value(value)? {
        Value::Document(doc) => Ok(doc),
        other => Err(BsonError::InvalidDocument(format!(
            "top-level value must serialize to a document, got {}",
            other.type_name()
        ))),
    }
}

/// 转换为文档后用默认编解码器编码
pub fn to_vec<T: Serialize + ?Sized>(value: &T, check_keys: bool, move_id: bool) -> BsonResult<Vec<u8>> {
    let doc = to_document(value)?;
    Ok(crate::codec::serialize(&doc, check_keys, move_id)?.to_vec())
}

impl<'a> ser::Serializer for &'a mut Serializer {
    type Ok = ();
    type Error = BsonError;
    type SerializeSeq = SeqSerializer<'a>;
    type SerializeTuple = SeqSerializer<'a>;
    type SerializeTupleStruct = SeqSerializer<'a>;
    type SerializeTupleVariant = SeqSerializer<'a>;
    type SerializeMap = MapSerializer<'a>;
    type SerializeStruct = MapSerializer<'a>;
    type SerializeStructVariant = MapSerializer<'a>;

    fn serialize_bool(self, v: bool) -> Result<Self::Ok, Self::Error> {
        self.output = Value::Boolean(v);
        Ok(())
    }

    fn serialize_i8(self, v: i8) -> Result<Self::Ok, Self::Error> {
        self.serialize_i32(v as i32)
    }

    fn serialize_i16(self, v: i16) -> Result<Self::Ok, Self::Error> {
        self.serialize_i32(v as i32)
    }

    fn serialize_i32(self, v: i32) -> Result<Self::Ok, Self::Error> {
        self.output = Value::Int32(v);
        Ok(())
    }

    fn serialize_i64(self, v: i64) -> Result<Self::Ok, Self::Error> {
        self.serialize_i128(v as i128)
    }

    fn serialize_i128(self, v: i128) -> Result<Self::Ok, Self::Error> {
        self.output = Value::from_integer(v)?;
        Ok(())
    }

    fn serialize_u8(self, v: u8) -> Result<Self::Ok, Self::Error> {
        self.serialize_i32(v as i32)
    }

    fn serialize_u16(self, v: u16) -> Result<Self::Ok, Self::Error> {
        self.serialize_i32(v as i32)
    }

    fn serialize_u32(self, v: u32) -> Result<Self::Ok, Self::Error> {
        self.output = Value::from(v);
        Ok(())
    }

    fn serialize_u64(self, v: u64) -> Result<Self::Ok, Self::Error> {
        self.serialize_i128(v as i128)
    }

    fn serialize_u128(self, v: u128) -> Result<Self::Ok, Self::Error> {
        self.output = Value::try_from(v)?;
        Ok(())
    }

    fn serialize_f32(self, v: f32) -> Result<Self::Ok, Self::Error> {
        self.serialize_f64(v as f64)
    }

    fn serialize_f64(self, v: f64) -> Result<Self::Ok, Self::Error> {
        self.output = Value::Double(v);
        Ok(())
    }

    fn serialize_char(self, v: char) -> Result<Self::Ok, Self::Error> {
        self.serialize_str(v.encode_utf8(&mut [0u8; 4]))
    }

    fn serialize_str(self, v: &str) -> Result<Self::Ok, Self::Error> {
        self.output = Value::String(CompactString::from(v));
        Ok(())
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Self::Ok, Self::Error> {
        self.output = Value::Binary(v.into());
        Ok(())
    }

    fn serialize_none(self) -> Result<Self::Ok, Self::Error> {
        self.serialize_unit()
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Self::Ok, Self::Error> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Self::Ok, Self::Error> {
        self.output = Value::Null;
        Ok(())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Self::Ok, Self::Error> {
        self.serialize_unit()
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Self::Ok, Self::Error> {
        self.serialize_str(variant)
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        name: &'static str,
        value: &T,
    ) -> Result<Self::Ok, Self::Error> {
        let inner = to_value(value)?;
        self.output = match (name, inner) {
            (OBJECT_ID_NEWTYPE, Value::String(hex)) => Value::ObjectId(ObjectId::from_hex(&hex)?),
            (DATETIME_NEWTYPE, millis) => {
                let millis = millis.as_i64().ok_or_else(|| {
                    BsonError::Serialization(format!("datetime must be millis, got {}", millis.type_name()))
                })?;
                Value::DateTime(DateTime::from_millis(millis))
            }
            (_, inner) => inner,
        };
        Ok(())
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Self::Ok, Self::Error> {
        let mut doc = Document::new();
        doc.insert(variant, to_value(value)?);
        self.output = Value::Document(doc);
        Ok(())
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<Self::SerializeSeq, Self::Error> {
        Ok(SeqSerializer {
            serializer: self,
            elements: Vec::with_capacity(len.unwrap_or(0)),
            variant: None,
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple, Self::Error> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleStruct, Self::Error> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleVariant, Self::Error> {
        let mut seq = self.serialize_seq(Some(len))?;
        seq.variant = Some(variant);
        Ok(seq)
    }

    fn serialize_map(self, len: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        Ok(MapSerializer {
            serializer: self,
            doc: Document::with_capacity(len.unwrap_or(0)),
            current_key: None,
            variant: None,
        })
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeStruct, Self::Error> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeStructVariant, Self::Error> {
        let mut map = self.serialize_map(Some(len))?;
        map.variant = Some(variant);
        Ok(map)
    }
}

/// 外部标记的枚举变体包成 `{ variant: value }`
fn wrap_variant(variant: Option<&'static str>, value: Value) -> Value {
    match variant {
        Some(name) => {
            let mut doc = Document::new();
            doc.insert(name, value);
            Value::Document(doc)
        }
        None => value,
    }
}

pub struct SeqSerializer<'a> {
    serializer: &'a mut Serializer,
    elements: Vec<Value>,
    variant: Option<&'static str>,
}

impl<'a> ser::SerializeSeq for SeqSerializer<'a> {
    type Ok = ();
    type Error = BsonError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        self.elements.push(to_value(value)?);
        Ok(())
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        self.serializer.output = wrap_variant(self.variant, Value::Array(self.elements));
        Ok(())
    }
}

impl<'a> ser::SerializeTuple for SeqSerializer<'a> {
    type Ok = ();
    type Error = BsonError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        ser::SerializeSeq::end(self)
    }
}

impl<'a> ser::SerializeTupleStruct for SeqSerializer<'a> {
    type Ok = ();
    type Error = BsonError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        ser::SerializeSeq::end(self)
    }
}

impl<'a> ser::SerializeTupleVariant for SeqSerializer<'a> {
    type Ok = ();
    type Error = BsonError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        ser::SerializeSeq::end(self)
    }
}

pub struct MapSerializer<'a> {
    serializer: &'a mut Serializer,
    doc: Document,
    current_key: Option<CompactString>,
    variant: Option<&'static str>,
}

impl<'a> ser::SerializeMap for MapSerializer<'a> {
    type Ok = ();
    type Error = BsonError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), Self::Error> {
        self.current_key = match to_value(key)? {
            Value::String(s) => Some(s),
            other => {
                return Err(BsonError::Serialization(format!(
                    "Map key must be a string, got {}",
                    other.type_name()
                )));
            }
        };
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        let key = self
            .current_key
            .take()
            .ok_or_else(|| BsonError::Serialization("No key for value".to_string()))?;
        self.doc.insert(key, to_value(value)?);
        Ok(())
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        self.serializer.output = wrap_variant(self.variant, Value::Document(self.doc));
        Ok(())
    }
}

impl<'a> ser::SerializeStruct for MapSerializer<'a> {
    type Ok = ();
    type Error = BsonError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        self.doc.insert(key, to_value(value)?);
        Ok(())
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        ser::SerializeMap::end(self)
    }
}

impl<'a> ser::SerializeStructVariant for MapSerializer<'a> {
    type Ok = ();
    type Error = BsonError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        ser::SerializeStruct::serialize_field(self, key, value)
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        ser::SerializeMap::end(self)
    }
}

impl ser::Error for BsonError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        BsonError::Serialization(msg.to_string())
    }
}

impl Serialize for ObjectId {
    fn serialize<S: ser::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_newtype_struct(OBJECT_ID_NEWTYPE, &self.to_hex())
    }
}

impl Serialize for DateTime {
    fn serialize<S: ser::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_newtype_struct(DATETIME_NEWTYPE, &self.timestamp_millis())
    }
}

impl Serialize for Document {
    fn serialize<S: ser::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self {
            map.serialize_entry(key.as_str(), value)?;
        }
        map.end()
    }
}

/// 没有 serde 数据模型对应物的类型(正则、代码、时间戳、MinKey/MaxKey)
/// 以扩展 JSON 的形式输出
impl Serialize for Value {
    fn serialize<S: ser::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Double(n) => serializer.serialize_f64(*n),
            Value::String(s) | Value::Symbol(s) => serializer.serialize_str(s),
            Value::Document(doc) => doc.serialize(serializer),
            Value::Array(arr) => arr.serialize(serializer),
            Value::Binary(bin) => serializer.serialize_bytes(bin.as_bytes()),
            Value::ObjectId(id) => id.serialize(serializer),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::DateTime(dt) => dt.serialize(serializer),
            Value::Null => serializer.serialize_unit(),
            Value::Int32(n) => serializer.serialize_i32(*n),
            Value::Int64(n) => serializer.serialize_i64(*n),
            Value::DbRef(dbref) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("$ref", &dbref.namespace)?;
                map.serialize_entry("$id", &dbref.id)?;
                map.end()
            }
            Value::Regex(_)
            | Value::Code(_)
            | Value::Timestamp(_)
            | Value::MinKey
            | Value::MaxKey => crate::json::to_json(self).serialize(serializer),
        }
    }
}
