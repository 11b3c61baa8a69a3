//! 文档体积上限
//!
//! 上限由连接握手协商得到,通过 `update` 写入;编码器每次调用只读取一次。
//! 读与写之间不加锁:并发更新最多让一次正在进行的编码使用旧上限。

use crate::spec::{DEFAULT_MAX_BSON_SIZE, MIN_DOCUMENT_SIZE};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// 协商出的最大文档体积的来源,通常是一个连接
pub trait MaxSizeSource {
    fn max_bson_size(&self) -> usize;
}

/// 可共享的体积上限
#[derive(Debug)]
pub struct SizeGuard {
    max: AtomicUsize,
}

impl SizeGuard {
    pub fn new(max: usize) -> Self {
        Self {
            max: AtomicUsize::new(max.max(MIN_DOCUMENT_SIZE)),
        }
    }

    pub fn current(&self) -> usize {
        self.max.load(Ordering::Relaxed)
    }

    /// # Brief
    /// 替换上限并返回新值
    ///
    /// 小于空文档体积(5 字节)的值会被抬升到 5。
    pub fn update(&self, new_max: usize) -> usize {
        let new_max = new_max.max(MIN_DOCUMENT_SIZE);
        let old = self.max.swap(new_max, Ordering::Relaxed);
        if old != new_max {
            debug!(old, new = new_max, "max BSON size updated");
        }
        new_max
    }

    pub fn update_from<S: MaxSizeSource + ?Sized>(&self, source: &S) -> usize {
        self.update(source.max_bson_size())
    }
}

impl Default for SizeGuard {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BSON_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    struct MockConnection {
        max_bson_size: usize,
    }

    impl MaxSizeSource for MockConnection {
        fn max_bson_size(&self) -> usize {
            self.max_bson_size
        }
    }

    #[test]
    fn test_default_ceiling() {
        assert_eq!(SizeGuard::default().current(), 4 * 1024 * 1024);
    }

    #[test]
    fn test_update_returns_new_value() {
        let guard = SizeGuard::default();
        let size = 7 * 1024 * 1024;
        assert_eq!(guard.update(size), size);
        assert_eq!(guard.current(), size);
    }

    #[test]
    fn test_update_from_connection() {
        let guard = SizeGuard::default();
        let conn = MockConnection {
            max_bson_size: 16 * 1024 * 1024,
        };
        assert_eq!(guard.update_from(&conn), 16 * 1024 * 1024);
        assert_eq!(guard.current(), 16 * 1024 * 1024);
    }

    #[test]
    fn test_floor_at_empty_document() {
        let guard = SizeGuard::new(0);
        assert_eq!(guard.current(), 5);
        assert_eq!(guard.update(1), 5);
    }

    #[test]
    fn test_concurrent_updates_settle() {
        let guard = Arc::new(SizeGuard::default());
        let handles: Vec<_> = (1..=4)
            .map(|i| {
                let guard = Arc::clone(&guard);
                thread::spawn(move || guard.update(i * 1024 * 1024))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let current = guard.current();
        assert!((1..=4).any(|i| current == i * 1024 * 1024));
    }
}
