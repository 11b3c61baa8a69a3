//! BSON 文档结构模块
//!
//! 有序的字符串键映射,插入顺序即线格式上的字段顺序。
//! 底层使用 `IndexMap`(插入顺序向量 + 哈希索引)。
//!
//! 键分两种表示:普通字符串键与符号键。两者在映射层面互不相同,
//! 但编码器会把符号形式的 `_id` 与字符串形式的 `_id` 视为同一个主键,
//! 不会在线格式上重复写出。

use crate::oid::ObjectId;
use crate::validate::{self, SourceEncoding};
use crate::value::Value;
use crate::BsonResult;
use compact_str::CompactString;
use indexmap::{Equivalent, IndexMap};
use std::fmt;
use std::hash::{Hash, Hasher};

/// 主键字段名
pub const ID_KEY: &str = "_id";

/// 文档键
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Key {
    /// 普通字符串键
    Str(CompactString),
    /// 符号键,序列化时写出同名字符串
    Symbol(CompactString),
}

impl Key {
    pub fn symbol(name: impl Into<CompactString>) -> Self {
        Key::Symbol(name.into())
    }

    /// # Brief
    /// 从声明了源编码的字节构造字符串键
    ///
    /// # Returns
    /// 无法转换为合法 UTF-8 时返回 `BsonError::InvalidStringEncoding`
    pub fn from_encoded(bytes: &[u8], encoding: SourceEncoding) -> BsonResult<Self> {
        let s = validate::validate_string(bytes, encoding)?;
        Ok(Key::Str(CompactString::from(s)))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Key::Str(s) | Key::Symbol(s) => s.as_str(),
        }
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self, Key::Symbol(_))
    }

    /// 是否为主键 `_id`(任一表示)
    pub fn is_id(&self) -> bool {
        self.as_str() == ID_KEY
    }
}

// 手写 Hash,使 `StrKey` 与 `Key::Str` 的哈希一致
impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Key::Str(s) => {
                0u8.hash(state);
                s.as_str().hash(state);
            }
            Key::Symbol(s) => {
                1u8.hash(state);
                s.as_str().hash(state);
            }
        }
    }
}

/// 按 `&str` 查找字符串键,避免构造临时 `Key`
struct StrKey<'a>(&'a str);

impl Hash for StrKey<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        0u8.hash(state);
        self.0.hash(state);
    }
}

impl Equivalent<Key> for StrKey<'_> {
    fn equivalent(&self, key: &Key) -> bool {
        matches!(key, Key::Str(s) if s.as_str() == self.0)
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key::Str(CompactString::from(v))
    }
}

impl From<String> for Key {
    fn from(v: String) -> Self {
        Key::Str(CompactString::from(v))
    }
}

impl From<&String> for Key {
    fn from(v: &String) -> Self {
        Key::Str(CompactString::from(v.as_str()))
    }
}

impl From<CompactString> for Key {
    fn from(v: CompactString) -> Self {
        Key::Str(v)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Str(s) => write!(f, "{}", s),
            Key::Symbol(s) => write!(f, ":{}", s),
        }
    }
}

/// BSON 文档
///
/// 相等性比较区分字段顺序:两个字段相同但顺序不同的文档不相等,
/// 因为它们的线格式不同。
#[derive(Debug, Clone, Default)]
pub struct Document {
    fields: IndexMap<Key, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self {
            fields: IndexMap::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: IndexMap::with_capacity(capacity),
        }
    }

    /// 插入字段
    ///
    /// # Brief
    /// 插入或更新一个字段。键已存在时保留原位置,只替换值
    ///
    /// # Arguments
    /// * `key` - 字段名,`&str`/`String` 为字符串键,`Key::symbol` 为符号键
    /// * `value` - 字段值
    ///
    /// # Returns
    /// 被替换的旧值
    pub fn insert(&mut self, key: impl Into<Key>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    /// 按字符串键取值(不匹配同名符号键)
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(&StrKey(key))
    }

    pub fn get_key(&self, key: &Key) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.fields.get_mut(&StrKey(key))
    }

    /// 移除字段
    ///
    /// # Brief
    /// 移除字符串键并返回其值,其余字段保持原有顺序
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.shift_remove(&StrKey(key))
    }

    pub fn remove_key(&mut self, key: &Key) -> Option<Value> {
        self.fields.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(&StrKey(key))
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.fields.contains_key(key)
    }

    /// # Brief
    /// 返回作为主键的那个键
    ///
    /// 字符串 `_id` 优先,其次是符号 `_id`;都不存在时返回 `None`
    pub fn primary_key(&self) -> Option<&Key> {
        self.fields
            .get_key_value(&StrKey(ID_KEY))
            .or_else(|| self.fields.get_key_value(&Key::symbol(ID_KEY)))
            .map(|(k, _)| k)
    }

    pub fn has_id(&self) -> bool {
        self.primary_key().is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.fields.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_str())
    }

    pub fn get_i32(&self, key: &str) -> Option<i32> {
        self.get(key).and_then(|v| v.as_i32())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.as_f64())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    pub fn get_array(&self, key: &str) -> Option<&Vec<Value>> {
        self.get(key).and_then(|v| v.as_array())
    }

    pub fn get_document(&self, key: &str) -> Option<&Document> {
        self.get(key).and_then(|v| v.as_document())
    }

    pub fn get_object_id(&self, key: &str) -> Option<ObjectId> {
        self.get(key).and_then(|v| v.as_object_id())
    }

    /// 按路径获取嵌套值
    ///
    /// # Brief
    /// 使用点分隔的路径访问嵌套文档或数组中的值
    ///
    /// # Arguments
    /// * `path` - 点分隔的路径,如 "user.address.city" 或 "tags.0"
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current)
    }

    /// 合并另一个文档,同名字段以 `other` 为准
    pub fn merge(&mut self, other: Document) {
        for (k, v) in other.fields {
            self.fields.insert(k, v);
        }
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "\"{}\": {}", k, v)?;
        }
        write!(f, "}}")
    }
}

impl<K: Into<Key>, V: Into<Value>> FromIterator<(K, V)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut doc = Document::new();
        for (k, v) in iter {
            doc.insert(k, v);
        }
        doc
    }
}

impl IntoIterator for Document {
    type Item = (Key, Value);
    type IntoIter = indexmap::map::IntoIter<Key, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = (&'a Key, &'a Value);
    type IntoIter = indexmap::map::Iter<'a, Key, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

/// 构造 Document 的便捷宏
///
/// 值位置接受单个 token 树:字面量、标识符、括号表达式、`null`、
/// 嵌套 `[...]` 与 `{...}`。负数需要加括号,如 `(-1)`。
///
/// # 示例
///
/// ```rust,ignore
/// use mikudb_bson::doc;
///
/// let empty = doc!();
/// let doc = doc! {
///     "name": "test",
///     "tags": ["a", "b"],
///     "meta": { "version": 1 }
/// };
/// ```
#[macro_export]
macro_rules! doc {
    () => {
        $crate::Document::new()
    };
    ($($key:literal : $value:tt),+ $(,)?) => {
        {
            let mut doc = $crate::Document::new();
            $(
                doc.insert($key, $crate::bson!($value));
            )+
            doc
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_preserved() {
        let mut doc = Document::new();
        doc.insert("b", 1);
        doc.insert("a", 2);
        doc.insert("c", 3);
        let keys: Vec<&str> = doc.keys().map(Key::as_str).collect();
        assert_eq!(keys, ["b", "a", "c"]);
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let mut doc = Document::new();
        doc.insert("a", 1);
        doc.insert("b", 2);
        assert_eq!(doc.insert("a", 3), Some(Value::Int32(1)));
        let keys: Vec<&str> = doc.keys().map(Key::as_str).collect();
        assert_eq!(keys, ["a", "b"]);
        assert_eq!(doc.get_i32("a"), Some(3));
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut doc: Document = vec![("a", 1), ("b", 2), ("c", 3)].into_iter().collect();
        assert_eq!(doc.remove("b"), Some(Value::Int32(2)));
        let keys: Vec<&str> = doc.keys().map(Key::as_str).collect();
        assert_eq!(keys, ["a", "c"]);
        assert!(!doc.contains_key("b"));
    }

    #[test]
    fn test_symbol_and_string_keys_are_distinct() {
        let mut doc = Document::new();
        doc.insert("_id", "foo");
        doc.insert(Key::symbol("_id"), "bar");
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.get_str("_id"), Some("foo"));
        assert_eq!(
            doc.get_key(&Key::symbol("_id")).and_then(|v| v.as_str()),
            Some("bar")
        );
    }

    #[test]
    fn test_primary_key_prefers_string() {
        let mut doc = Document::new();
        doc.insert(Key::symbol("_id"), 1);
        assert_eq!(doc.primary_key(), Some(&Key::symbol("_id")));

        doc.insert("_id", 2);
        assert_eq!(doc.primary_key(), Some(&Key::from("_id")));

        let empty = Document::new();
        assert!(!empty.has_id());
    }

    #[test]
    fn test_equality_is_order_sensitive() {
        let ab: Document = vec![("a", 1), ("b", 2)].into_iter().collect();
        let ba: Document = vec![("b", 2), ("a", 1)].into_iter().collect();
        let ab2: Document = vec![("a", 1), ("b", 2)].into_iter().collect();
        assert_ne!(ab, ba);
        assert_eq!(ab, ab2);
    }

    #[test]
    fn test_doc_macro() {
        let doc = doc! {
            "name": "miku",
            "age": 16,
            "nothing": null,
            "tags": ["a", "b"],
            "meta": { "level": (-1) }
        };
        assert_eq!(doc.get_str("name"), Some("miku"));
        assert_eq!(doc.get_i32("age"), Some(16));
        assert!(doc.get("nothing").unwrap().is_null());
        assert_eq!(doc.get_array("tags").map(|a| a.len()), Some(2));
        assert_eq!(doc.get_path("meta.level").and_then(|v| v.as_i32()), Some(-1));
        assert!(doc!().is_empty());
    }

    #[test]
    fn test_display() {
        let doc = doc! { "a": 1, "b": "x" };
        assert_eq!(doc.to_string(), "{\"a\": 1, \"b\": \"x\"}");
    }
}
