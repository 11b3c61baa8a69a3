//! 扩展 JSON 导出
//!
//! 没有 JSON 原生对应物的类型输出为扩展 JSON 结构,便于日志和调试查看。
//! 只负责导出,不从 JSON 解析回 `Value`。

use crate::document::Document;
use crate::value::Value;
use crate::{BsonError, BsonResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Map, Number, Value as JsonValue};

/// 将 Value 转换为 JSON
///
/// # Brief
/// 标量直接映射,复杂类型使用扩展 JSON 格式
///
/// # 扩展 JSON 格式
/// - ObjectId: `{"$oid": "507f1f77bcf86cd799439011"}`
/// - DateTime: `{"$date": 1234567890000}`
/// - Binary: `{"$binary": "base64", "$type": "00"}`
/// - Regex: `{"$regex": "pattern", "$options": "i"}`
/// - Code: `{"$code": "..."}`,带作用域时另有 `"$scope"`
/// - Timestamp: `{"$timestamp": {"t": 秒, "i": 自增量}}`
/// - Symbol: `{"$symbol": "..."}`
/// - MinKey / MaxKey: `{"$minKey": 1}` / `{"$maxKey": 1}`
/// - DbRef: `{"$ref": "ns", "$id": {"$oid": "..."}}`
///
/// # Arguments
/// * `value` - 要转换的值
///
/// # Returns
/// JSON 值;NaN 与无穷大输出为字符串
pub fn to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Boolean(b) => JsonValue::Bool(*b),
        Value::Int32(n) => json!(*n),
        Value::Int64(n) => json!(*n),
        Value::Double(f) => match Number::from_f64(*f) {
            Some(n) => JsonValue::Number(n),
            None => json!(f.to_string()),
        },
        Value::String(s) => JsonValue::String(s.to_string()),
        Value::Symbol(s) => json!({ "$symbol": s.as_str() }),
        Value::Binary(b) => json!({
            "$binary": STANDARD.encode(b.as_bytes()),
            "$type": format!("{:02x}", b.subtype().to_u8())
        }),
        Value::ObjectId(oid) => json!({ "$oid": oid.to_hex() }),
        Value::DateTime(dt) => json!({ "$date": dt.timestamp_millis() }),
        Value::Timestamp(ts) => json!({ "$timestamp": { "t": ts.seconds, "i": ts.increment } }),
        Value::Array(arr) => JsonValue::Array(arr.iter().map(to_json).collect()),
        Value::Document(doc) => document_to_json(doc),
        Value::Regex(r) => json!({ "$regex": r.pattern(), "$options": r.flags() }),
        Value::Code(code) => match code.scope() {
            Some(scope) => json!({ "$code": code.code(), "$scope": document_to_json(scope) }),
            None => json!({ "$code": code.code() }),
        },
        Value::MinKey => json!({ "$minKey": 1 }),
        Value::MaxKey => json!({ "$maxKey": 1 }),
        Value::DbRef(dbref) => json!({
            "$ref": dbref.namespace.as_str(),
            "$id": { "$oid": dbref.id.to_hex() }
        }),
    }
}

fn document_to_json(doc: &Document) -> JsonValue {
    let mut obj = Map::with_capacity(doc.len());
    for (key, value) in doc {
        obj.insert(key.as_str().to_string(), to_json(value));
    }
    JsonValue::Object(obj)
}

/// 将值序列化为美化的 JSON 字符串
pub fn to_json_string(value: &Value) -> BsonResult<String> {
    serde_json::to_string_pretty(&to_json(value))
        .map_err(|e| BsonError::Serialization(format!("JSON serialization failed: {}", e)))
}

impl Document {
    pub fn to_json(&self) -> JsonValue {
        document_to_json(self)
    }

    pub fn to_json_pretty(&self) -> BsonResult<String> {
        serde_json::to_string_pretty(&self.to_json())
            .map_err(|e| BsonError::Serialization(format!("JSON serialization failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::oid::ObjectId;
    use crate::spec::BinarySubtype;
    use crate::types::{Binary, Code, DbRef, Regex, Timestamp};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_basic_types() {
        assert_eq!(to_json(&Value::Null), JsonValue::Null);
        assert_eq!(to_json(&Value::Boolean(true)), JsonValue::Bool(true));
        assert_eq!(to_json(&Value::Int32(42)), json!(42));
        assert_eq!(to_json(&Value::Int64(1 << 40)), json!(1i64 << 40));
        assert_eq!(to_json(&Value::from("hello")), json!("hello"));
        assert_eq!(to_json(&Value::Double(f64::NAN)), json!("NaN"));
    }

    #[test]
    fn test_array() {
        let arr = Value::Array(vec![Value::Int32(1), Value::Int32(2), Value::Int32(3)]);
        assert_eq!(to_json(&arr), json!([1, 2, 3]));
    }

    #[test]
    fn test_document() {
        let doc = doc! { "name": "Alice", "age": 30 };
        assert_eq!(doc.to_json(), json!({"name": "Alice", "age": 30}));
        assert!(doc.to_json_pretty().unwrap().contains("\"Alice\""));
    }

    #[test]
    fn test_document_keeps_field_order() {
        let doc = doc! { "b": 1, "a": 2 };
        assert_eq!(doc.to_json().to_string(), r#"{"b":1,"a":2}"#);

        let keys: Vec<String> = match doc.to_json() {
            JsonValue::Object(obj) => obj.keys().cloned().collect(),
            other => panic!("expected object, got {}", other),
        };
        assert_eq!(keys, vec!["b", "a"]);

        let code = Value::Code(Code::with_scope("f()", doc! { "z": 1, "y": 2 }));
        assert_eq!(
            to_json(&code).to_string(),
            r#"{"$code":"f()","$scope":{"z":1,"y":2}}"#
        );
    }

    #[test]
    fn test_extended_types() {
        let oid = ObjectId::from_hex("507f1f77bcf86cd799439011").unwrap();
        let doc = doc! {
            "oid": oid,
            "date": (Utc.timestamp_millis_opt(1_234_567_890_000).unwrap()),
            "bin": (Binary::with_subtype(vec![1, 2, 3], BinarySubtype::Md5)),
            "re": (Regex::new("^a", "xi")),
            "code": (Code::with_scope("x", doc! { "y": 1 })),
            "ts": (Timestamp::new(20, 4)),
            "sym": (Value::Symbol("s".into())),
            "min": (Value::MinKey),
            "ref": (DbRef::new("users", oid))
        };
        assert_eq!(
            doc.to_json(),
            json!({
                "oid": { "$oid": "507f1f77bcf86cd799439011" },
                "date": { "$date": 1_234_567_890_000i64 },
                "bin": { "$binary": "AQID", "$type": "05" },
                "re": { "$regex": "^a", "$options": "ix" },
                "code": { "$code": "x", "$scope": { "y": 1 } },
                "ts": { "$timestamp": { "t": 20, "i": 4 } },
                "sym": { "$symbol": "s" },
                "min": { "$minKey": 1 },
                "ref": { "$ref": "users", "$id": { "$oid": "507f1f77bcf86cd799439011" } }
            })
        );
    }

    #[test]
    fn test_json_string() {
        let s = to_json_string(&Value::Array(vec![Value::Null])).unwrap();
        assert_eq!(s.replace([' ', '\n'], ""), "[null]");
    }
}
