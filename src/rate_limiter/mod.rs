//! 按客户端键限制请求频率：每个键在一个时间窗口内最多放行一次。

use std::time::{Duration, Instant};

use dashmap::{DashMap, mapref::entry::Entry};

/// 并发安全的 键 -> 最近放行时间 存储
///
/// `admit` 必须对单个键原子地完成 读取-判断-写入，
/// 同一窗口内并发竞争同一个键时最多放行一个请求。
pub trait TimestampStore: Send + Sync {
    /// 若该键无记录或距上次放行已满 `window`，记录 `now` 并返回 true；否则不修改记录并返回 false
    fn admit(&self, key: &str, now: Instant, window: Duration) -> bool;

    /// 删除距 `now` 超过 `max_age` 的记录
    fn purge_before(&self, now: Instant, max_age: Duration);

    /// 撤销一次放行：仅当该键的记录仍是 `admitted_at` 时删除
    fn revoke(&self, key: &str, admitted_at: Instant);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 基于 DashMap 分片锁的实现，entry API 保证单键操作的原子性
#[derive(Debug, Default)]
pub struct DashMapStore {
    entries: DashMap<String, Instant>,
}

impl TimestampStore for DashMapStore {
    fn admit(&self, key: &str, now: Instant, window: Duration) -> bool {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if now.saturating_duration_since(*entry.get()) < window {
                    return false;
                }
                entry.insert(now);
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    fn purge_before(&self, now: Instant, max_age: Duration) {
        self.entries
            .retain(|_, last| now.saturating_duration_since(*last) <= max_age);
    }

    fn revoke(&self, key: &str, admitted_at: Instant) {
        self.entries.remove_if(key, |_, last| *last == admitted_at);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

pub struct RateLimiter {
    store: Box<dyn TimestampStore>,
    window: Duration,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self::with_store(window, DashMapStore::default())
    }

    pub fn with_store(window: Duration, store: impl TimestampStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_allowed(&self, key: &str) -> bool {
        self.is_allowed_at(key, Instant::now())
    }

    pub fn is_allowed_at(&self, key: &str, now: Instant) -> bool {
        // 顺带清理过期记录，避免表无限增长
        self.store.purge_before(now, self.window * 2);

        let allowed = self.store.admit(key, now, self.window);
        if !allowed {
            tracing::debug!(key, "rate limit denied");
        }
        allowed
    }

    /// 退还 `admitted_at` 时刻的放行，请求未被实际处理时使用
    pub fn revoke(&self, key: &str, admitted_at: Instant) {
        self.store.revoke(key, admitted_at);
    }

    /// 当前跟踪的键数量
    pub fn tracked_keys(&self) -> usize {
        self.store.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}
