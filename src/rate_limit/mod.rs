// 限流模块
// 每个受保护的操作类别一个固定窗口限流器，优先使用远程存储计数

pub mod local;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::store::{StoreError, StoreGate, WindowCount};
use local::LocalWindows;

pub const TRANSLATE_BUCKET: &str = "translate";
pub const ANALYZE_BUCKET: &str = "analyze";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub bucket: String,
    pub limit: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn new(bucket: &str, limit: u32, window: Duration) -> Self {
        Self {
            bucket: bucket.to_string(),
            limit,
            // 零长度窗口没有意义，至少一秒
            window: window.max(Duration::from_secs(1)),
        }
    }

    fn window_secs(&self) -> u64 {
        self.window.as_secs().max(1)
    }
}

/// 准入判断结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Allowed { limit: u32, remaining: u32 },
    Denied { limit: u32, retry_after_secs: u64 },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Remote,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketStats {
    pub active_identities: usize,
    pub limit: u32,
    pub window_secs: u64,
    pub backend: Backend,
    pub allowed: u64,
    pub denied: u64,
    pub degraded_checks: u64,
}

enum RemoteCount {
    Counted(WindowCount),
    Unavailable,
    Failed(StoreError),
}

/// 固定窗口限流器
///
/// 远程存储可用时用 INCR + EXPIRE NX 在存储端原子计数，多进程共享同一个计数；
/// 远程调用失败或未配置时退回进程内计数表，不会因为存储故障直接拒绝请求。
/// 多实例部署且远程存储不可用时，实际上限是 `limit × 实例数`。
///
/// 远程计数成功后会写回进程内计数表，这一步会短暂持有本地锁（不跨 `.await`），
/// 换来远程中途失效时从已知计数继续计数，以及统计里的活跃身份数。
/// 计数的正确性只依赖存储端的原子 INCR，与这把锁无关。
#[derive(Debug)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    gate: StoreGate,
    local: LocalWindows,
    allowed: AtomicU64,
    denied: AtomicU64,
    degraded: AtomicU64,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy, gate: StoreGate) -> Self {
        Self {
            local: LocalWindows::new(policy.window),
            policy,
            gate,
            allowed: AtomicU64::new(0),
            denied: AtomicU64::new(0),
            degraded: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    pub async fn check(&self, identity: &str) -> Decision {
        let decision = match self.remote_count(identity).await {
            RemoteCount::Counted(counted) => self.decide_remote(identity, counted),
            RemoteCount::Unavailable => self.check_local(identity, Instant::now()),
            RemoteCount::Failed(e) => {
                self.degraded.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Rate limit store failed for bucket {}, counting locally: {}",
                    self.policy.bucket, e
                );
                self.check_local(identity, Instant::now())
            }
        };

        self.record(identity, &decision);
        decision
    }

    /// 只使用进程内计数，`now` 由调用方给出
    pub fn check_local(&self, identity: &str, now: Instant) -> Decision {
        let window = self.local.hit(identity, now);
        self.decide(window.count, window.remaining(now, self.policy.window))
    }

    pub fn stats(&self) -> BucketStats {
        BucketStats {
            active_identities: self.local.len(),
            limit: self.policy.limit,
            window_secs: self.policy.window_secs(),
            backend: if self.gate.is_remote_available() {
                Backend::Remote
            } else {
                Backend::Local
            },
            allowed: self.allowed.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            degraded_checks: self.degraded.load(Ordering::Relaxed),
        }
    }

    async fn remote_count(&self, identity: &str) -> RemoteCount {
        let Some(client) = self.gate.client() else {
            return RemoteCount::Unavailable;
        };

        let key = format!("ratelimit:{}:{}", self.policy.bucket, identity);
        match client.incr_window(&key, self.policy.window_secs()).await {
            Ok(counted) => RemoteCount::Counted(counted),
            Err(e) => RemoteCount::Failed(e),
        }
    }

    fn decide_remote(&self, identity: &str, counted: WindowCount) -> Decision {
        let count = u32::try_from(counted.count.max(0)).unwrap_or(u32::MAX);
        let remaining = if counted.ttl_secs > 0 {
            Duration::from_secs(counted.ttl_secs as u64).min(self.policy.window)
        } else {
            self.policy.window
        };

        // 同步到本地，远程中途失效时从已知计数继续
        self.local.mirror(identity, count, remaining, Instant::now());
        self.decide(count, remaining)
    }

    fn decide(&self, count: u32, remaining: Duration) -> Decision {
        let limit = self.policy.limit;
        if count <= limit {
            Decision::Allowed {
                limit,
                remaining: limit - count,
            }
        } else {
            Decision::Denied {
                limit,
                retry_after_secs: retry_after_secs(remaining, self.policy.window_secs()),
            }
        }
    }

    fn record(&self, identity: &str, decision: &Decision) {
        match decision {
            Decision::Allowed { remaining, .. } => {
                self.allowed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Rate limit ok for {} in {} ({} remaining)",
                    identity, self.policy.bucket, remaining
                );
            }
            Decision::Denied {
                retry_after_secs, ..
            } => {
                self.denied.fetch_add(1, Ordering::Relaxed);
                info!(
                    "Rate limit exceeded for {} in {}, retry after {}s",
                    identity, self.policy.bucket, retry_after_secs
                );
            }
        }
    }
}

/// 向上取整到秒，范围 `[1, window_secs]`
fn retry_after_secs(remaining: Duration, window_secs: u64) -> u64 {
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    secs.clamp(1, window_secs)
}

/// 应用启动时构造的全部限流器
#[derive(Debug, Clone)]
pub struct Limiters {
    pub translate: Arc<RateLimiter>,
    pub analyze: Arc<RateLimiter>,
}

impl Limiters {
    pub fn from_config(config: &Config, gate: &StoreGate) -> Self {
        Self {
            translate: Arc::new(RateLimiter::new(
                RateLimitPolicy::new(
                    TRANSLATE_BUCKET,
                    config.translate_rate_limit,
                    config.translate_rate_window(),
                ),
                gate.clone(),
            )),
            analyze: Arc::new(RateLimiter::new(
                RateLimitPolicy::new(
                    ANALYZE_BUCKET,
                    config.analyze_rate_limit,
                    config.analyze_rate_window(),
                ),
                gate.clone(),
            )),
        }
    }

    pub fn stats(&self) -> BTreeMap<String, BucketStats> {
        [&self.translate, &self.analyze]
            .into_iter()
            .map(|limiter| (limiter.policy().bucket.clone(), limiter.stats()))
            .collect()
    }
}
