//! BSON 编解码模块
//!
//! 线格式(小端):
//! - 文档 = `int32 总长度` `元素*` `0x00`
//! - 元素 = `类型标记` `cstring 键名` `载荷`
//!
//! 编码器向可增长的 `BytesMut` 追加字段,结束后回填长度头;
//! 任何校验失败都会放弃整个缓冲区,调用方拿不到部分结果。
//! 解码器按相同布局反向读取,嵌入文档在由其长度前缀界定的子切片上递归。

use crate::document::{Document, Key};
use crate::oid::ObjectId;
use crate::size::{MaxSizeSource, SizeGuard};
use crate::spec::*;
use crate::types::{Binary, Code, DateTime, DbRef, Regex, Timestamp};
use crate::validate;
use crate::value::Value;
use crate::{BsonError, BsonResult};
use bytes::{BufMut, Bytes, BytesMut};
use compact_str::CompactString;
use mikudb_common::BsonConfig;
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace, warn};

/// 编解码器
///
/// 持有共享的体积上限,可以在多个线程间通过引用或 `Arc` 共享。
#[derive(Debug, Clone)]
pub struct Codec {
    size_guard: Arc<SizeGuard>,
    max_depth: usize,
}

impl Codec {
    pub fn new() -> Self {
        Self::with_config(&BsonConfig::default())
    }

    /// # Brief
    /// 按配置创建编解码器
    ///
    /// 嵌套深度至少为 1,顶层文档本身占一层;体积上限的下限由 `SizeGuard` 保证。
    pub fn with_config(config: &BsonConfig) -> Self {
        if config.max_nesting_depth == 0 {
            warn!("max_nesting_depth 0 cannot hold a top-level document, using 1");
        }
        Self {
            size_guard: Arc::new(SizeGuard::new(config.max_bson_size)),
            max_depth: config.max_nesting_depth.max(1),
        }
    }

    /// 与其它组件共享同一个体积上限
    pub fn with_size_guard(size_guard: Arc<SizeGuard>) -> Self {
        Self {
            size_guard,
            max_depth: DEFAULT_MAX_NESTING_DEPTH,
        }
    }

    pub fn size_guard(&self) -> &Arc<SizeGuard> {
        &self.size_guard
    }

    pub fn max_size(&self) -> usize {
        self.size_guard.current()
    }

    pub fn update_max_size(&self, new_max: usize) -> usize {
        self.size_guard.update(new_max)
    }

    pub fn update_max_size_from<S: MaxSizeSource + ?Sized>(&self, source: &S) -> usize {
        self.size_guard.update_from(source)
    }

    /// 编码文档
    ///
    /// # Brief
    /// 把文档编码为完整的 BSON 字节流
    ///
    /// # Arguments
    /// * `doc` - 要编码的文档,不会被修改
    /// * `check_keys` - 是否校验键名(`$` 开头、含 `.`),递归作用于嵌入文档
    /// * `move_id` - 是否把顶层 `_id` 移到首位
    ///
    /// # Returns
    /// 成功返回字节流;任何校验失败或超出体积上限都返回错误且不产生输出
    pub fn serialize(&self, doc: &Document, check_keys: bool, move_id: bool) -> BsonResult<Bytes> {
        let max_size = self.size_guard.current();
        let mut buf = BytesMut::with_capacity(256);
        Encoder::new(&mut buf, check_keys, self.max_depth).encode_document(doc, move_id)?;

        if buf.len() > max_size {
            debug!(size = buf.len(), max = max_size, "rejecting oversized document");
            return Err(BsonError::InvalidDocument(format!(
                "Document is too large ({} bytes), max BSON size is {} bytes",
                buf.len(),
                max_size
            )));
        }
        trace!(bytes = buf.len(), fields = doc.len(), "serialized document");
        Ok(buf.freeze())
    }

    /// 解码文档
    ///
    /// # Brief
    /// 从字节流还原一个完整文档,缓冲区长度必须与长度头完全一致
    ///
    /// # Returns
    /// 长度前缀错误、未知类型标记、截断输入都会使本次解码失败
    pub fn deserialize(&self, data: &[u8]) -> BsonResult<Document> {
        let doc = Decoder::new(data, self.max_depth).decode_root()?;
        trace!(bytes = data.len(), fields = doc.len(), "deserialized document");
        Ok(doc)
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

fn default_codec() -> &'static Codec {
    static CODEC: OnceLock<Codec> = OnceLock::new();
    CODEC.get_or_init(Codec::new)
}

/// 使用进程级默认编解码器编码
pub fn serialize(doc: &Document, check_keys: bool, move_id: bool) -> BsonResult<Bytes> {
    default_codec().serialize(doc, check_keys, move_id)
}

/// 使用进程级默认编解码器解码
pub fn deserialize(data: &[u8]) -> BsonResult<Document> {
    default_codec().deserialize(data)
}

/// 进程级默认体积上限
pub fn max_size() -> usize {
    default_codec().max_size()
}

/// 更新进程级默认体积上限,返回新值
pub fn update_max_size(new_max: usize) -> usize {
    default_codec().update_max_size(new_max)
}

/// # Brief
/// 计算字段的写出顺序
///
/// 同名的字符串键与符号键只写一次,字符串键优先,主键 `_id` 也遵循这一规则。
/// `move_id` 为真时主键排在最前,其余字段保持原顺序。
/// 只生成派生的顺序列表,不改动文档本身。
fn ordered_fields(doc: &Document, move_id: bool) -> Vec<(&Key, &Value)> {
    let primary = doc.primary_key();
    let mut fields = Vec::with_capacity(doc.len());
    if move_id {
        if let Some(key) = primary {
            if let Some(value) = doc.get_key(key) {
                fields.push((key, value));
            }
        }
    }
    for (key, value) in doc.iter() {
        if key.is_id() && (move_id || Some(key) != primary) {
            continue;
        }
        if key.is_symbol() && doc.contains_key(key.as_str()) {
            continue;
        }
        fields.push((key, value));
    }
    fields
}

fn len_i32(len: usize, what: &str) -> BsonResult<i32> {
    i32::try_from(len).map_err(|_| {
        BsonError::InvalidDocument(format!("{} of {} bytes exceeds the int32 length field", what, len))
    })
}

/// BSON 编码器
struct Encoder<'a> {
    buf: &'a mut BytesMut,
    check_keys: bool,
    max_depth: usize,
    depth: usize,
}

impl<'a> Encoder<'a> {
    fn new(buf: &'a mut BytesMut, check_keys: bool, max_depth: usize) -> Self {
        Self {
            buf,
            check_keys,
            max_depth,
            depth: 0,
        }
    }

    fn enter(&mut self) -> BsonResult<()> {
        if self.depth >= self.max_depth {
            return Err(BsonError::NestingTooDeep(self.max_depth));
        }
        self.depth += 1;
        Ok(())
    }

    // 只有顶层文档会按 move_id 重排,嵌入文档保持原顺序
    fn encode_document(&mut self, doc: &Document, move_id: bool) -> BsonResult<()> {
        self.enter()?;
        let start = self.buf.len();
        self.buf.put_i32_le(0);
        for (key, value) in ordered_fields(doc, move_id) {
            self.encode_element(key.as_str(), value)?;
        }
        self.buf.put_u8(0);
        self.backpatch(start)?;
        self.depth -= 1;
        Ok(())
    }

    fn encode_array(&mut self, arr: &[Value]) -> BsonResult<()> {
        self.enter()?;
        let start = self.buf.len();
        self.buf.put_i32_le(0);
        for (index, item) in arr.iter().enumerate() {
            self.buf.put_u8(item.element_type() as u8);
            self.write_cstring(&index.to_string());
            self.encode_payload(item)?;
        }
        self.buf.put_u8(0);
        self.backpatch(start)?;
        self.depth -= 1;
        Ok(())
    }

    fn encode_element(&mut self, key: &str, value: &Value) -> BsonResult<()> {
        if self.check_keys {
            validate::validate_key(key)?;
        } else {
            validate::validate_cstring(key, "key")?;
        }
        self.buf.put_u8(value.element_type() as u8);
        self.write_cstring(key);
        self.encode_payload(value)
    }

    fn encode_payload(&mut self, value: &Value) -> BsonResult<()> {
        match value {
            Value::Double(n) => self.buf.put_f64_le(*n),
            Value::String(s) | Value::Symbol(s) => self.write_string(s)?,
            Value::Document(doc) => self.encode_document(doc, false)?,
            Value::Array(arr) => self.encode_array(arr)?,
            Value::Binary(bin) => self.encode_binary(bin)?,
            Value::ObjectId(id) => self.buf.put_slice(id.as_bytes()),
            Value::Boolean(b) => self.buf.put_u8(*b as u8),
            Value::DateTime(dt) => self.buf.put_i64_le(dt.timestamp_millis()),
            Value::Null | Value::MinKey | Value::MaxKey => {}
            Value::Regex(re) => self.encode_regex(re)?,
            Value::Code(code) => self.encode_code(code)?,
            Value::Int32(n) => self.buf.put_i32_le(*n),
            Value::Timestamp(ts) => {
                self.buf.put_u32_le(ts.increment);
                self.buf.put_u32_le(ts.seconds);
            }
            Value::Int64(n) => self.buf.put_i64_le(*n),
            Value::DbRef(dbref) => self.encode_dbref(dbref)?,
        }
        Ok(())
    }

    fn encode_binary(&mut self, bin: &Binary) -> BsonResult<()> {
        let len = len_i32(bin.len(), "binary")?;
        if bin.subtype() == BinarySubtype::BinaryOld {
            let outer = len.checked_add(4).ok_or_else(|| {
                BsonError::InvalidDocument("binary exceeds the int32 length field".to_string())
            })?;
            self.buf.put_i32_le(outer);
            self.buf.put_u8(bin.subtype().to_u8());
            self.buf.put_i32_le(len);
        } else {
            self.buf.put_i32_le(len);
            self.buf.put_u8(bin.subtype().to_u8());
        }
        self.buf.put_slice(bin.as_bytes());
        Ok(())
    }

    fn encode_regex(&mut self, re: &Regex) -> BsonResult<()> {
        validate::validate_cstring(re.pattern(), "regex pattern")?;
        validate::validate_cstring(re.flags(), "regex flags")?;
        self.write_cstring(re.pattern());
        self.write_cstring(re.flags());
        Ok(())
    }

    // 作用域文档不做键名校验
    fn encode_code(&mut self, code: &Code) -> BsonResult<()> {
        let Some(scope) = code.scope() else {
            return self.write_string(code.code());
        };
        let start = self.buf.len();
        self.buf.put_i32_le(0);
        self.write_string(code.code())?;
        let check_keys = std::mem::replace(&mut self.check_keys, false);
        let result = self.encode_document(scope, false);
        self.check_keys = check_keys;
        result?;
        self.backpatch(start)
    }

    fn encode_dbref(&mut self, dbref: &DbRef) -> BsonResult<()> {
        self.enter()?;
        let start = self.buf.len();
        self.buf.put_i32_le(0);
        self.buf.put_u8(ElementType::String as u8);
        self.write_cstring("$ref");
        self.write_string(&dbref.namespace)?;
        self.buf.put_u8(ElementType::ObjectId as u8);
        self.write_cstring("$id");
        self.buf.put_slice(dbref.id.as_bytes());
        self.buf.put_u8(0);
        self.backpatch(start)?;
        self.depth -= 1;
        Ok(())
    }

    fn write_cstring(&mut self, s: &str) {
        self.buf.put_slice(s.as_bytes());
        self.buf.put_u8(0);
    }

    fn write_string(&mut self, s: &str) -> BsonResult<()> {
        let len = len_i32(s.len() + 1, "string")?;
        self.buf.put_i32_le(len);
        self.buf.put_slice(s.as_bytes());
        self.buf.put_u8(0);
        Ok(())
    }

    fn backpatch(&mut self, start: usize) -> BsonResult<()> {
        let len = len_i32(self.buf.len() - start, "document")?;
        self.buf[start..start + 4].copy_from_slice(&len.to_le_bytes());
        Ok(())
    }
}

/// BSON 解码器
///
/// 每层嵌入文档都使用一个新的解码器,其数据范围由该文档的长度前缀界定。
struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl<'a> Decoder<'a> {
    fn new(data: &'a [u8], max_depth: usize) -> Self {
        Self {
            data,
            pos: 0,
            depth: 0,
            max_depth,
        }
    }

    fn decode_root(mut self) -> BsonResult<Document> {
        let doc = self.read_document()?;
        if self.pos != self.data.len() {
            return Err(BsonError::Malformed(format!(
                "{} trailing bytes after document",
                self.data.len() - self.pos
            )));
        }
        Ok(doc)
    }

    fn child(&self, body: &'a [u8]) -> BsonResult<Decoder<'a>> {
        if self.depth >= self.max_depth {
            return Err(BsonError::NestingTooDeep(self.max_depth));
        }
        Ok(Decoder {
            data: body,
            pos: 0,
            depth: self.depth + 1,
            max_depth: self.max_depth,
        })
    }

    fn is_done(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// 读取一个带长度头的文档帧,校验长度与结尾 NUL,返回整帧
    fn read_frame(&mut self) -> BsonResult<&'a [u8]> {
        let start = self.pos;
        let len = self.read_i32()?;
        if len < MIN_DOCUMENT_SIZE as i32 {
            return Err(BsonError::Malformed(format!(
                "document length {} is below the minimum of {}",
                len, MIN_DOCUMENT_SIZE
            )));
        }
        self.pos = start;
        let frame = self.read_slice(len as usize)?;
        if frame[frame.len() - 1] != 0 {
            return Err(BsonError::Malformed(
                "document is not NUL-terminated".to_string(),
            ));
        }
        Ok(frame)
    }

    fn read_document(&mut self) -> BsonResult<Document> {
        let frame = self.read_frame()?;
        let mut body = self.child(&frame[4..frame.len() - 1])?;
        let mut doc = Document::new();
        while !body.is_done() {
            let element_type = body.read_element_type()?;
            let key = body.read_cstring()?;
            let value = body.read_value(element_type)?;
            doc.insert(key, value);
        }
        Ok(doc)
    }

    // 数组键名按原样读出后丢弃,元素顺序即下标
    fn read_array(&mut self) -> BsonResult<Vec<Value>> {
        let frame = self.read_frame()?;
        let mut body = self.child(&frame[4..frame.len() - 1])?;
        let mut arr = Vec::new();
        while !body.is_done() {
            let element_type = body.read_element_type()?;
            body.read_cstring()?;
            arr.push(body.read_value(element_type)?);
        }
        Ok(arr)
    }

    fn read_element_type(&mut self) -> BsonResult<ElementType> {
        let marker = self.read_u8()?;
        ElementType::from_u8(marker).ok_or(BsonError::InvalidTypeMarker(marker))
    }

    fn read_value(&mut self, element_type: ElementType) -> BsonResult<Value> {
        let value = match element_type {
            ElementType::Double => Value::Double(f64::from_le_bytes(self.read_array_of()?)),
            ElementType::String => Value::String(self.read_string()?),
            ElementType::Document => embedded_document(self.read_document()?),
            ElementType::Array => Value::Array(self.read_array()?),
            ElementType::Binary => Value::Binary(self.read_binary()?),
            ElementType::Undefined => Value::Null,
            ElementType::ObjectId => Value::ObjectId(self.read_object_id()?),
            ElementType::Boolean => match self.read_u8()? {
                0 => Value::Boolean(false),
                1 => Value::Boolean(true),
                b => {
                    return Err(BsonError::Malformed(format!("invalid boolean byte {:#04x}", b)));
                }
            },
            ElementType::DateTime => Value::DateTime(DateTime::from_millis(self.read_i64()?)),
            ElementType::Null => Value::Null,
            ElementType::Regex => {
                let pattern = self.read_cstring()?;
                let flags = self.read_cstring()?;
                Value::Regex(Regex::new(pattern.as_str(), &flags))
            }
            ElementType::DbPointer => {
                let namespace = self.read_string()?;
                let id = self.read_object_id()?;
                Value::DbRef(DbRef::new(namespace.as_str(), id))
            }
            ElementType::JavaScriptCode => Value::Code(Code::new(self.read_string()?.as_str())),
            ElementType::Symbol => Value::Symbol(self.read_string()?),
            ElementType::JavaScriptCodeWithScope => Value::Code(self.read_code_with_scope()?),
            ElementType::Int32 => Value::Int32(self.read_i32()?),
            ElementType::Timestamp => {
                let increment = self.read_u32()?;
                let seconds = self.read_u32()?;
                Value::Timestamp(Timestamp::new(seconds, increment))
            }
            ElementType::Int64 => Value::Int64(self.read_i64()?),
            ElementType::MaxKey => Value::MaxKey,
            ElementType::MinKey => Value::MinKey,
        };
        Ok(value)
    }

    fn read_binary(&mut self) -> BsonResult<Binary> {
        let len = self.read_len()?;
        let subtype = BinarySubtype::from_u8(self.read_u8()?);
        let bytes = if subtype == BinarySubtype::BinaryOld {
            let inner = self.read_len()?;
            if inner + 4 != len {
                return Err(BsonError::Malformed(format!(
                    "old binary inner length {} does not match outer length {}",
                    inner, len
                )));
            }
            self.read_slice(inner)?
        } else {
            self.read_slice(len)?
        };
        Ok(Binary::with_subtype(bytes, subtype))
    }

    // int32 总长度 + string + document,末尾没有 NUL
    fn read_code_with_scope(&mut self) -> BsonResult<Code> {
        let start = self.pos;
        let total = self.read_len()?;
        if total < 4 + 5 + MIN_DOCUMENT_SIZE {
            return Err(BsonError::Malformed(format!(
                "code with scope length {} is too small",
                total
            )));
        }
        self.pos = start;
        let frame = self.read_slice(total)?;
        let mut inner = Decoder {
            data: &frame[4..],
            pos: 0,
            depth: self.depth,
            max_depth: self.max_depth,
        };
        let code = inner.read_string()?;
        let scope = inner.read_document()?;
        if !inner.is_done() {
            return Err(BsonError::Malformed(
                "code with scope length does not match its contents".to_string(),
            ));
        }
        Ok(Code::with_scope(code.as_str(), scope))
    }

    fn read_string(&mut self) -> BsonResult<CompactString> {
        let len = self.read_len()?;
        if len == 0 {
            return Err(BsonError::Malformed("string length must be at least 1".to_string()));
        }
        let bytes = self.read_slice(len)?;
        if bytes[len - 1] != 0 {
            return Err(BsonError::Malformed("string is not NUL-terminated".to_string()));
        }
        Ok(CompactString::from(validate::validate_utf8(&bytes[..len - 1])?))
    }

    fn read_cstring(&mut self) -> BsonResult<CompactString> {
        let rest = &self.data[self.pos..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| BsonError::Malformed("unterminated cstring".to_string()))?;
        let s = validate::validate_utf8(&rest[..nul])?;
        self.pos += nul + 1;
        Ok(CompactString::from(s))
    }

    fn read_object_id(&mut self) -> BsonResult<ObjectId> {
        Ok(ObjectId::from_bytes(self.read_array_of()?))
    }

    fn read_u8(&mut self) -> BsonResult<u8> {
        let [b] = self.read_array_of::<1>()?;
        Ok(b)
    }

    fn read_i32(&mut self) -> BsonResult<i32> {
        Ok(i32::from_le_bytes(self.read_array_of()?))
    }

    fn read_u32(&mut self) -> BsonResult<u32> {
        Ok(u32::from_le_bytes(self.read_array_of()?))
    }

    fn read_i64(&mut self) -> BsonResult<i64> {
        Ok(i64::from_le_bytes(self.read_array_of()?))
    }

    /// 非负的 int32 长度字段
    fn read_len(&mut self) -> BsonResult<usize> {
        let len = self.read_i32()?;
        usize::try_from(len)
            .map_err(|_| BsonError::Malformed(format!("negative length prefix {}", len)))
    }

    fn read_array_of<const N: usize>(&mut self) -> BsonResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_slice(N)?);
        Ok(out)
    }

    fn read_slice(&mut self, len: usize) -> BsonResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(BsonError::UnexpectedEof)?;
        if end > self.data.len() {
            return Err(BsonError::UnexpectedEof);
        }
        let data = self.data;
        let slice = &data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }
}

/// 恰好由 `$ref`(字符串)与 `$id`(ObjectId)两个字段组成的嵌入文档还原为 DbRef
fn embedded_document(doc: Document) -> Value {
    if doc.len() == 2 {
        let mut fields = doc.iter();
        if let (Some((ref_key, Value::String(namespace))), Some((id_key, Value::ObjectId(id)))) =
            (fields.next(), fields.next())
        {
            if ref_key.as_str() == "$ref" && id_key.as_str() == "$id" {
                return Value::DbRef(DbRef::new(namespace.as_str(), *id));
            }
        }
    }
    Value::Document(doc)
}
