//! In-memory byte-bounded LRU caches: rendered PNGs (with TTL) and decoded
//! logo images.

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::DynamicImage;
use lru::LruCache;
use parking_lot::Mutex;

struct PngEntry {
    bytes: Vec<u8>,
    size: u64,
    expires: Option<Instant>,
}

struct PngInner {
    ll: LruCache<String, PngEntry>,
    cur_bytes: u64,
}

/// Fingerprint-keyed cache of rendered PNGs. LRU eviction under byte
/// pressure plus a per-entry TTL checked lazily on reads.
pub struct PngCache {
    max_bytes: u64,
    ttl: Duration,
    inner: Mutex<PngInner>,
}

impl PngCache {
    pub fn new(max_bytes: u64, ttl: Duration) -> Self {
        Self {
            max_bytes,
            ttl,
            inner: Mutex::new(PngInner {
                ll: LruCache::unbounded(),
                cur_bytes: 0,
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        if self.max_bytes == 0 {
            return None;
        }
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let expired = matches!(
            inner.ll.peek(key),
            Some(PngEntry {
                expires: Some(at), ..
            }) if now > *at
        );
        if expired {
            if let Some(ent) = inner.ll.pop(key) {
                inner.cur_bytes -= ent.size;
            }
            return None;
        }
        inner.ll.get(key).map(|ent| ent.bytes.clone())
    }

    pub fn set(&self, key: &str, bytes: Vec<u8>) {
        let size = bytes.len() as u64;
        if self.max_bytes == 0 || size == 0 || size > self.max_bytes {
            return;
        }
        let expires = if self.ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + self.ttl)
        };
        let mut inner = self.inner.lock();
        let entry = PngEntry {
            bytes,
            size,
            expires,
        };
        if let Some(old) = inner.ll.put(key.to_string(), entry) {
            inner.cur_bytes -= old.size;
        }
        inner.cur_bytes += size;
        while inner.cur_bytes > self.max_bytes {
            match inner.ll.pop_lru() {
                Some((_, ent)) => inner.cur_bytes -= ent.size,
                None => break,
            }
        }
    }

    #[cfg(test)]
    fn current_bytes(&self) -> u64 {
        self.inner.lock().cur_bytes
    }
}

struct LogoEntry {
    image: Arc<DynamicImage>,
    size: u64,
}

struct LogoInner {
    ll: LruCache<String, LogoEntry>,
    cur_bytes: u64,
}

/// Path-keyed cache of decoded logo images. Entry size is estimated as
/// width * height * 4. No TTL; logos only change on disk between restarts.
pub struct LogoCache {
    max_bytes: u64,
    inner: Mutex<LogoInner>,
}

impl LogoCache {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            inner: Mutex::new(LogoInner {
                ll: LruCache::unbounded(),
                cur_bytes: 0,
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<DynamicImage>> {
        if self.max_bytes == 0 {
            return None;
        }
        self.inner.lock().ll.get(key).map(|ent| ent.image.clone())
    }

    pub fn set(&self, key: &str, image: Arc<DynamicImage>) {
        if self.max_bytes == 0 {
            return;
        }
        let size = u64::from(image.width()) * u64::from(image.height()) * 4;
        if size == 0 || size > self.max_bytes {
            return;
        }
        let mut inner = self.inner.lock();
        if let Some(old) = inner.ll.put(key.to_string(), LogoEntry { image, size }) {
            inner.cur_bytes -= old.size;
        }
        inner.cur_bytes += size;
        while inner.cur_bytes > self.max_bytes {
            match inner.ll.pop_lru() {
                Some((_, ent)) => inner.cur_bytes -= ent.size,
                None => break,
            }
        }
    }
}
