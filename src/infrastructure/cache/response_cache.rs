use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone)]
struct CacheEntry<T> {
    data: T,
    expires_at: Instant,
}

/// 容量上限つきの TTL キャッシュ
///
/// ロックは持たないので、呼び出し側の同期プリミティブの内側で使う。
/// 容量を超えると最も長く参照されていないエントリから追い出される。
pub struct ResponseCache<T: Clone> {
    entries: LruCache<String, CacheEntry<T>>,
    ttl: Duration,
}

impl<T: Clone> ResponseCache<T> {
    /// 容量 0 は 1 として扱う
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn set(&mut self, key: String, value: T) {
        let entry = CacheEntry {
            data: value,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.put(key, entry);
    }

    /// 期限切れのエントリはその場で取り除く
    pub fn get(&mut self, key: &str) -> Option<T> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => return Some(entry.data.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.pop(key);
        }
        None
    }

    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.pop(key).is_some()
    }

    /// 前方一致するキーを削除し、削除件数を返す
    pub fn delete_prefix(&mut self, prefix: &str) -> usize {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            self.entries.pop(key);
        }
        keys.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// 期限切れのエントリを削除し、削除件数を返す
    pub fn cleanup_expired(&mut self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.entries.pop(key);
        }
        expired.len()
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }
}
