//! 平台身份信息
//!
//! 为 ObjectId 生成器提供主机名与进程号。读取失败时退化为固定值,
//! 不会中断调用方。

use crate::error::{MikuError, MikuResult};
use tracing::warn;

const FALLBACK_HOSTNAME: &str = "localhost";

/// 当前进程所在主机的身份
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    pub hostname: String,
    pub process_id: u32,
}

impl HostIdentity {
    /// # Brief
    /// 探测当前主机名与进程号
    ///
    /// 主机名无法读取时记录一条 warn 日志并使用 `localhost`。
    pub fn current() -> Self {
        let hostname = match read_hostname() {
            Ok(name) => name,
            Err(e) => {
                warn!("hostname unavailable, falling back to {}: {}", FALLBACK_HOSTNAME, e);
                FALLBACK_HOSTNAME.to_string()
            }
        };
        Self {
            hostname,
            process_id: std::process::id(),
        }
    }
}

#[cfg(target_os = "linux")]
fn read_hostname() -> MikuResult<String> {
    let content = std::fs::read_to_string("/proc/sys/kernel/hostname")?;
    non_empty(content.trim())
}

#[cfg(not(target_os = "linux"))]
fn read_hostname() -> MikuResult<String> {
    let name = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .map_err(|e| MikuError::Platform(format!("hostname not set: {}", e)))?;
    non_empty(name.trim())
}

fn non_empty(name: &str) -> MikuResult<String> {
    if name.is_empty() {
        return Err(MikuError::Platform("hostname is empty".to_string()));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_identity() {
        let identity = HostIdentity::current();
        assert!(!identity.hostname.is_empty());
        assert_eq!(identity.process_id, std::process::id());
    }

    #[test]
    fn test_empty_hostname_rejected() {
        assert!(matches!(non_empty(""), Err(MikuError::Platform(_))));
        assert_eq!(non_empty("node-1").unwrap(), "node-1");
    }
}
