use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// 进程内的固定窗口计数
#[derive(Debug, Clone, Copy)]
pub struct Window {
    pub count: u32,
    pub started: Instant,
}

impl Window {
    fn is_expired(&self, now: Instant, length: Duration) -> bool {
        now.saturating_duration_since(self.started) >= length
    }

    /// 窗口剩余时间
    pub fn remaining(&self, now: Instant, length: Duration) -> Duration {
        length.saturating_sub(now.saturating_duration_since(self.started))
    }
}

#[derive(Debug)]
struct Inner {
    windows: HashMap<String, Window>,
    last_sweep: Instant,
}

/// 远程存储不可用时使用的计数表
///
/// 读写都在同一把锁里完成，所以单进程内计数是精确的。
/// 过期窗口在访问时惰性重置，每过一个窗口长度顺带清理一次整张表。
#[derive(Debug)]
pub struct LocalWindows {
    length: Duration,
    inner: Mutex<Inner>,
}

impl LocalWindows {
    pub fn new(length: Duration) -> Self {
        Self {
            length,
            inner: Mutex::new(Inner {
                windows: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    /// 计数加一，返回加一之后的窗口
    pub fn hit(&self, key: &str, now: Instant) -> Window {
        let mut inner = self.inner.lock();
        self.sweep_if_due(&mut inner, now);

        let length = self.length;
        let window = inner
            .windows
            .entry(key.to_string())
            .and_modify(|w| {
                if w.is_expired(now, length) {
                    *w = Window {
                        count: 1,
                        started: now,
                    };
                } else {
                    w.count = w.count.saturating_add(1);
                }
            })
            .or_insert(Window {
                count: 1,
                started: now,
            });

        *window
    }

    /// 用远程存储返回的计数覆盖本地窗口
    pub fn mirror(&self, key: &str, count: u32, remaining: Duration, now: Instant) {
        let elapsed = self.length.saturating_sub(remaining);
        let started = now.checked_sub(elapsed).unwrap_or(now);

        let mut inner = self.inner.lock();
        self.sweep_if_due(&mut inner, now);
        inner
            .windows
            .insert(key.to_string(), Window { count, started });
    }

    /// 当前跟踪的窗口数，包括尚未被清理的过期窗口
    ///
    /// 清理每个窗口长度至少做一次，所以最多多算一个窗口长度内过期的条目。
    pub fn len(&self) -> usize {
        self.inner.lock().windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sweep_if_due(&self, inner: &mut Inner, now: Instant) {
        if now.saturating_duration_since(inner.last_sweep) < self.length {
            return;
        }

        let length = self.length;
        let before = inner.windows.len();
        inner.windows.retain(|_, w| !w.is_expired(now, length));
        inner.last_sweep = now;

        let evicted = before - inner.windows.len();
        if evicted > 0 {
            tracing::debug!("Evicted {} expired rate limit windows", evicted);
        }
    }
}
