use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use super::keys::build_key;
use crate::store::StoreGate;

/// 一次缓存读取的结果
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T> {
    Hit(T),
    /// 没有条目，或者远程存储没有配置
    Miss,
    /// 远程存储出错或存储的值无法解析
    Degraded,
}

impl<T> CacheLookup<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            CacheLookup::Hit(value) => Some(value),
            CacheLookup::Miss | CacheLookup::Degraded => None,
        }
    }
}

/// 一次缓存写入的结果，调用方可以忽略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheWrite {
    Stored,
    Skipped,
    Degraded,
}

/// 哈希键 JSON 缓存
///
/// 任何失败都不会返回给调用方：读取失败视为未命中，写入失败只记日志。
#[derive(Debug, Clone)]
pub struct HashedCache {
    gate: StoreGate,
}

impl HashedCache {
    pub fn new(gate: StoreGate) -> Self {
        Self { gate }
    }

    pub async fn lookup<T: DeserializeOwned>(&self, prefix: &str, raw_key: &str) -> CacheLookup<T> {
        let Some(client) = self.gate.client() else {
            return CacheLookup::Miss;
        };

        let key = build_key(prefix, raw_key);
        match client.get_json(&key).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(value) => {
                    debug!("Cache hit for {}", key);
                    CacheLookup::Hit(value)
                }
                Err(e) => {
                    warn!("Cached value for {} has unexpected shape: {}", key, e);
                    CacheLookup::Degraded
                }
            },
            Ok(None) => CacheLookup::Miss,
            Err(e) => {
                warn!("Cache read for {} failed, treating as miss: {}", key, e);
                CacheLookup::Degraded
            }
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, prefix: &str, raw_key: &str) -> Option<T> {
        self.lookup(prefix, raw_key).await.into_option()
    }

    pub async fn set<T: Serialize + ?Sized>(
        &self,
        prefix: &str,
        raw_key: &str,
        value: &T,
        ttl: Duration,
    ) -> CacheWrite {
        let Some(client) = self.gate.client() else {
            return CacheWrite::Skipped;
        };

        let key = build_key(prefix, raw_key);
        // EX 0 会被存储拒绝
        let ttl_secs = ttl.as_secs().max(1);
        match client.set_json(&key, value, ttl_secs).await {
            Ok(()) => {
                debug!("Cached {} for {}s", key, ttl_secs);
                CacheWrite::Stored
            }
            Err(e) => {
                warn!("Cache write for {} failed: {}", key, e);
                CacheWrite::Degraded
            }
        }
    }
}
