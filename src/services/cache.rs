//! # TTL 읽기 캐시
//!
//! block_id를 키로 하는 짧은 수명의 캐시입니다.
//! 쓰기 경로는 성공을 반환하기 전에 해당 블록의 키를 반드시 무효화해야 합니다.
//!
//! 읽기 경로는 DB를 읽기 전에 `ticket()`을 받아 두고 그 티켓으로 `insert()`합니다.
//! 티켓을 받은 뒤 같은 키가 무효화됐거나 캐시가 비워졌다면 그 값은 이미 낡은 것이므로 버립니다.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// 무효화 기록이 이만큼 쌓이면 기록을 비우고 하한을 올린다
const MAX_INVALIDATION_MARKS: usize = 1024;

pub struct TtlCache<V> {
    ttl: Duration,
    inner: RwLock<Inner<V>>,
}

struct Inner<V> {
    entries: HashMap<String, (Instant, V)>,
    /// 무효화마다 1씩 증가
    generation: u64,
    /// 키별 마지막 무효화 세대
    invalidated: HashMap<String, u64>,
    /// 이보다 작은 티켓은 모든 키에 대해 낡음
    floor: u64,
}

impl<V> Inner<V> {
    fn is_stale(&self, key: &str, ticket: u64) -> bool {
        ticket < self.floor || self.invalidated.get(key).is_some_and(|mark| *mark > ticket)
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                generation: 0,
                invalidated: HashMap::new(),
                floor: 0,
            }),
        }
    }

    /// 만료되지 않은 값만 돌려줍니다.
    pub async fn get(&self, key: &str) -> Option<V> {
        let inner = self.inner.read().await;
        match inner.entries.get(key) {
            Some((stored_at, value)) if stored_at.elapsed() < self.ttl => Some(value.clone()),
            _ => None,
        }
    }

    /// 원본을 읽기 전에 받아 두는 티켓
    pub async fn ticket(&self) -> u64 {
        self.inner.read().await.generation
    }

    /// `ticket` 이후에 무효화가 있었다면 저장하지 않습니다.
    pub async fn insert(&self, key: &str, value: V, ticket: u64) {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        if inner.is_stale(key, ticket) {
            tracing::trace!(key, "Dropping stale cache fill");
            return;
        }

        // 만료된 항목은 쓰기 시점에 정리
        let ttl = self.ttl;
        inner
            .entries
            .retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
        inner
            .entries
            .insert(key.to_string(), (Instant::now(), value));
    }

    pub async fn invalidate(&self, key: &str) {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        inner.generation += 1;
        inner.entries.remove(key);

        if inner.invalidated.len() >= MAX_INVALIDATION_MARKS {
            inner.invalidated.clear();
            inner.floor = inner.generation;
        } else {
            inner.invalidated.insert(key.to_string(), inner.generation);
        }
    }

    pub async fn clear(&self) {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        inner.generation += 1;
        inner.floor = inner.generation;
        inner.entries.clear();
        inner.invalidated.clear();
    }
}
