use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::warn;

use crate::cache::{LogoCache, PngCache};
use crate::config::Config;
use crate::keys;
use crate::loglimit::LogLimiter;
use crate::ratelimit::IpLimiter;

const DEFAULT_ERROR_PNG: &[u8] = include_bytes!("../assets/error.png");

const LIMITER_TTL: Duration = Duration::from_secs(300);
const LOG_LIMIT_INTERVAL: Duration = Duration::from_secs(10);

/// Shared handler state. Everything is either read-only after startup or
/// guards its own interior mutability, so the whole struct is cheap to
/// clone per request.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub keys: Arc<keys::Store>,
    pub limiter: Arc<IpLimiter>,
    pub png_cache: Arc<PngCache>,
    pub logo_cache: Arc<LogoCache>,
    pub log_limiter: Arc<LogLimiter>,
    pub error_png: Arc<Vec<u8>>,
    readiness: Arc<RwLock<Readiness>>,
}

#[derive(Debug)]
struct Readiness {
    ready: bool,
    reason: String,
}

impl AppState {
    pub fn new(cfg: Config, keys: keys::Store) -> Self {
        let limiter = IpLimiter::new(cfg.rate_limit_rps, cfg.rate_limit_burst, LIMITER_TTL);
        let png_cache = PngCache::new(cfg.cache_png_max_bytes, cfg.cache_ttl);
        let logo_cache = LogoCache::new(cfg.cache_logo_max_bytes);
        let error_png = load_error_png(&cfg.error_png_path);

        Self {
            cfg: Arc::new(cfg),
            keys: Arc::new(keys),
            limiter: Arc::new(limiter),
            png_cache: Arc::new(png_cache),
            logo_cache: Arc::new(logo_cache),
            log_limiter: Arc::new(LogLimiter::new(LOG_LIMIT_INTERVAL)),
            error_png: Arc::new(error_png),
            readiness: Arc::new(RwLock::new(Readiness {
                ready: true,
                reason: "ready".to_string(),
            })),
        }
    }

    pub fn set_readiness(&self, ready: bool, reason: &str) {
        let mut r = self.readiness.write();
        r.ready = ready;
        let reason = reason.trim();
        r.reason = if reason.is_empty() {
            if ready { "ready" } else { "not ready" }.to_string()
        } else {
            reason.to_string()
        };
    }

    pub fn readiness(&self) -> (bool, String) {
        let r = self.readiness.read();
        (r.ready, r.reason.clone())
    }
}

fn load_error_png(path: &str) -> Vec<u8> {
    if !path.is_empty() {
        match std::fs::read(path) {
            Ok(bytes) if !bytes.is_empty() => return bytes,
            Ok(_) => warn!(path = %path, "error png is empty, using embedded default"),
            Err(e) => warn!(path = %path, "error png load failed, using embedded default: {e}"),
        }
    }
    DEFAULT_ERROR_PNG.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn state(cfg: Config) -> AppState {
        AppState::new(cfg, keys::Store::empty())
    }

    #[test]
    fn starts_ready() {
        let st = state(Config::default());
        assert_eq!(st.readiness(), (true, "ready".to_string()));
    }

    #[test]
    fn readiness_transitions() {
        let st = state(Config::default());
        st.set_readiness(false, "keys load failed: boom");
        assert_eq!(st.readiness(), (false, "keys load failed: boom".to_string()));

        st.set_readiness(false, "  ");
        assert_eq!(st.readiness(), (false, "not ready".to_string()));

        st.set_readiness(true, "");
        assert_eq!(st.readiness(), (true, "ready".to_string()));
    }

    #[test]
    fn embedded_error_png_is_used_by_default() {
        let st = state(Config::default());
        assert_eq!(&st.error_png[..4], &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn error_png_override_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"custom png bytes").unwrap();
        let cfg = Config {
            error_png_path: file.path().to_str().unwrap().to_string(),
            ..Config::default()
        };
        let st = state(cfg);
        assert_eq!(st.error_png.as_slice(), b"custom png bytes");
    }

    #[test]
    fn unreadable_error_png_falls_back() {
        let cfg = Config {
            error_png_path: "/no/such/error.png".to_string(),
            ..Config::default()
        };
        let st = state(cfg);
        assert_eq!(&st.error_png[..4], &[0x89, b'P', b'N', b'G']);
    }
}
