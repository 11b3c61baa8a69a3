//! ObjectId 与其生成器
//!
//! 12 字节布局(全部大端):
//! - 4 字节: 秒级时间戳
//! - 3 字节: 机器标识(主机名的 xxHash3 前 3 字节)
//! - 2 字节: 进程号 (pid % 0xFFFF)
//! - 3 字节: 进程内自增计数器,到 2^24 回绕
//!
//! 同一秒内同一机器/进程生成的两个 ObjectId 只有在计数器回绕时才可能相同。

use crate::{BsonError, BsonResult};
use chrono::{DateTime, TimeZone, Utc};
use mikudb_common::HostIdentity;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

const COUNTER_MASK: u32 = 0x00FF_FFFF;

/// 12 字节对象标识符,相等性即字节相等
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    /// 使用进程级默认生成器创建新的 ObjectId
    pub fn new() -> Self {
        ObjectIdGenerator::global().generate()
    }

    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// # Brief
    /// 从任意字节切片构造,长度必须恰好为 12
    pub fn from_slice(bytes: &[u8]) -> BsonResult<Self> {
        let arr: [u8; 12] = bytes.try_into().map_err(|_| {
            BsonError::Argument(format!("ObjectId must be 12 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(arr))
    }

    /// # Brief
    /// 创建只含时间部分的 ObjectId,其余字节为 0
    ///
    /// 用于按生成时间做范围查询,不能当作唯一标识使用。
    ///
    /// # Returns
    /// 时间早于 1970 年或晚于 2106 年(超出 u32 秒)时返回 `BsonError::Argument`
    pub fn from_time(time: DateTime<Utc>) -> BsonResult<Self> {
        let secs = u32::try_from(time.timestamp()).map_err(|_| {
            BsonError::Argument(format!("{} does not fit a 32-bit ObjectId timestamp", time))
        })?;
        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&secs.to_be_bytes());
        Ok(Self(bytes))
    }

    /// # Brief
    /// 解析 24 位十六进制字符串
    ///
    /// # Returns
    /// 格式不对时返回 `BsonError::Argument`
    pub fn from_hex(s: &str) -> BsonResult<Self> {
        if s.len() != 24 {
            return Err(BsonError::Argument(format!(
                "ObjectId hex must be 24 characters, got {}",
                s.len()
            )));
        }
        let bytes = hex::decode(s)
            .map_err(|e| BsonError::Argument(format!("Invalid ObjectId hex {:?}: {}", s, e)))?;
        Self::from_slice(&bytes)
    }

    /// 判断字符串是否为合法的 ObjectId 十六进制表示
    pub fn is_legal(s: &str) -> bool {
        s.len() == 24 && s.bytes().all(|b| b.is_ascii_hexdigit())
    }

    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// 嵌入的秒级时间戳
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// 嵌入时间戳对应的 UTC 时间
    pub fn generation_time(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.timestamp() as i64, 0)
            .single()
            .unwrap_or_default()
    }

    pub fn counter(&self) -> u32 {
        u32::from_be_bytes([0, self.0[9], self.0[10], self.0[11]])
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = BsonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// ObjectId 生成器
///
/// 机器标识与进程号在构造时确定,计数器使用原子自增,可被任意线程共享。
#[derive(Debug)]
pub struct ObjectIdGenerator {
    machine: [u8; 3],
    process: [u8; 2],
    counter: AtomicU32,
}

impl ObjectIdGenerator {
    /// 根据当前主机身份创建生成器
    pub fn new() -> Self {
        Self::from_identity(&HostIdentity::current())
    }

    /// # Brief
    /// 根据给定主机身份创建生成器
    ///
    /// # Arguments
    /// * `identity` - 主机名与进程号
    pub fn from_identity(identity: &HostIdentity) -> Self {
        let hash = xxhash_rust::xxh3::xxh3_64(identity.hostname.as_bytes()).to_be_bytes();
        Self::with_parts(
            [hash[0], hash[1], hash[2]],
            (identity.process_id % 0xFFFF) as u16,
            0,
        )
    }

    pub fn with_parts(machine: [u8; 3], process: u16, counter_start: u32) -> Self {
        Self {
            machine,
            process: process.to_be_bytes(),
            counter: AtomicU32::new(counter_start & COUNTER_MASK),
        }
    }

    /// 进程级默认生成器,首次使用时构造
    pub fn global() -> &'static ObjectIdGenerator {
        static GENERATOR: OnceLock<ObjectIdGenerator> = OnceLock::new();
        GENERATOR.get_or_init(ObjectIdGenerator::new)
    }

    pub fn generate(&self) -> ObjectId {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        self.generate_at(secs)
    }

    /// 使用指定秒级时间戳生成 ObjectId
    pub fn generate_at(&self, secs: u32) -> ObjectId {
        let counter = self.next_counter();
        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..7].copy_from_slice(&self.machine);
        bytes[7..9].copy_from_slice(&self.process);
        bytes[9..12].copy_from_slice(&counter.to_be_bytes()[1..4]);
        ObjectId(bytes)
    }

    // u32 的自然回绕是 2^24 的整数倍,掩码后即为 24 位回绕
    fn next_counter(&self) -> u32 {
        self.counter.fetch_add(1, Ordering::Relaxed) & COUNTER_MASK
    }
}

impl Default for ObjectIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_layout() {
        let gen = ObjectIdGenerator::with_parts([0xAA, 0xBB, 0xCC], 0x1234, 7);
        let id = gen.generate_at(0x01020304);
        assert_eq!(
            id.as_bytes(),
            &[0x01, 0x02, 0x03, 0x04, 0xAA, 0xBB, 0xCC, 0x12, 0x34, 0x00, 0x00, 0x07]
        );
        assert_eq!(id.timestamp(), 0x01020304);
        assert_eq!(id.counter(), 7);
    }

    #[test]
    fn test_counter_wraps_at_24_bits() {
        let gen = ObjectIdGenerator::with_parts([0; 3], 1, COUNTER_MASK);
        let last = gen.generate_at(100);
        let wrapped = gen.generate_at(100);
        assert_eq!(last.counter(), 0x00FF_FFFF);
        assert_eq!(wrapped.counter(), 0);
    }

    #[test]
    fn test_concurrent_generation_unique() {
        let gen = Arc::new(ObjectIdGenerator::with_parts([1, 2, 3], 42, 0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gen = Arc::clone(&gen);
                thread::spawn(move || (0..1000).map(|_| gen.generate_at(1)).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 8000);
    }

    #[test]
    fn test_hex_roundtrip() {
        let id = ObjectId::new();
        let hex = id.to_hex();
        assert!(ObjectId::is_legal(&hex));
        assert_eq!(ObjectId::from_hex(&hex).unwrap(), id);
        assert_eq!(hex.parse::<ObjectId>().unwrap(), id);
    }

    #[test]
    fn test_illegal_hex() {
        assert!(!ObjectId::is_legal("4e4d66343b39b68407000001x"));
        assert!(!ObjectId::is_legal("zz4d66343b39b68407000001"));
        assert!(matches!(
            ObjectId::from_hex("1234"),
            Err(BsonError::Argument(_))
        ));
        assert!(matches!(
            ObjectId::from_hex("zz4d66343b39b68407000001"),
            Err(BsonError::Argument(_))
        ));
        assert!(matches!(
            ObjectId::from_slice(&[0u8; 11]),
            Err(BsonError::Argument(_))
        ));
    }

    #[test]
    fn test_from_time() {
        let time = Utc.with_ymd_and_hms(2011, 8, 1, 12, 0, 0).unwrap();
        let id = ObjectId::from_time(time).unwrap();
        assert_eq!(id.generation_time(), time);
        assert_eq!(&id.as_bytes()[4..], &[0u8; 8]);

        let last = Utc.timestamp_opt(u32::MAX as i64, 0).unwrap();
        assert_eq!(ObjectId::from_time(last).unwrap().timestamp(), u32::MAX);
    }

    #[test]
    fn test_from_time_out_of_range() {
        let before_epoch = Utc.with_ymd_and_hms(1969, 12, 31, 23, 59, 59).unwrap();
        assert!(matches!(ObjectId::from_time(before_epoch), Err(BsonError::Argument(_))));

        let after_2106 = Utc.timestamp_opt(u32::MAX as i64 + 1, 0).unwrap();
        assert!(matches!(ObjectId::from_time(after_2106), Err(BsonError::Argument(_))));
    }

    #[test]
    fn test_generation_time_is_recent() {
        let before = Utc::now().timestamp();
        let id = ObjectId::new();
        let generated = id.generation_time().timestamp();
        assert!(generated >= before - 1 && generated <= Utc::now().timestamp() + 1);
    }

    #[test]
    fn test_machine_id_from_hostname() {
        let identity = HostIdentity {
            hostname: "miku-node".to_string(),
            process_id: 0x1_0001,
        };
        let a = ObjectIdGenerator::from_identity(&identity).generate_at(5);
        let b = ObjectIdGenerator::from_identity(&identity).generate_at(5);
        assert_eq!(a.as_bytes()[4..9], b.as_bytes()[4..9]);
        // 0x10001 % 0xFFFF == 2
        assert_eq!(&a.as_bytes()[7..9], &[0x00, 0x02]);
    }
}
