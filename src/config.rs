//! Process configuration from environment variables, loaded once at
//! startup. Optional values outside their range fall back to the default
//! with a warning; structurally broken values (listen port, logo ratio,
//! proxy CIDRs) are hard errors.

use std::env;
use std::time::Duration;

use ipnetwork::IpNetwork;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    pub version: String,
    pub commit: String,
    pub listen_ip: String,
    pub listen_port: u16,
    pub keys_file: String,
    pub logo_max_ratio: f64,

    pub tls_enabled: bool,
    pub tls_cert_file: String,
    pub tls_key_file: String,
    pub tls_hosts: Vec<String>,
    pub tls_auto_self_signed: bool,
    pub tls_cert_days: u32,

    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub idle_timeout: Duration,
    pub read_header_timeout: Duration,
    pub max_header_bytes: usize,
    pub max_body_bytes: usize,
    pub rate_limit_rps: f64,
    pub rate_limit_burst: u32,

    pub allow_query_api_key: bool,
    pub amount_lenient_ocr: bool,
    pub trusted_proxy_cidrs: Vec<IpNetwork>,
    pub require_keys: bool,
    pub require_api_key: bool,

    pub access_log: bool,

    pub cache_png_max_bytes: u64,
    pub cache_logo_max_bytes: u64,
    pub cache_ttl: Duration,
    pub cache_control: String,

    pub error_png_path: String,
    pub qr_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            commit: option_env!("SEPAQR_COMMIT").unwrap_or("unknown").to_string(),
            listen_ip: "127.0.0.1".to_string(),
            listen_port: 8089,
            keys_file: "./keys.json".to_string(),
            logo_max_ratio: 0.22,

            tls_enabled: false,
            tls_cert_file: "./tls/cert.pem".to_string(),
            tls_key_file: "./tls/key.pem".to_string(),
            tls_hosts: vec!["localhost".to_string(), "127.0.0.1".to_string()],
            tls_auto_self_signed: true,
            tls_cert_days: 365,

            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(15),
            idle_timeout: Duration::from_secs(60),
            read_header_timeout: Duration::from_secs(5),
            max_header_bytes: 1 << 20,
            max_body_bytes: 8 << 10,
            rate_limit_rps: 10.0,
            rate_limit_burst: 20,

            allow_query_api_key: false,
            amount_lenient_ocr: false,
            trusted_proxy_cidrs: Vec::new(),
            require_keys: false,
            require_api_key: false,

            access_log: false,

            cache_png_max_bytes: 256 << 20,
            cache_logo_max_bytes: 32 << 20,
            cache_ttl: Duration::from_secs(900),
            cache_control: "private, max-age=60".to_string(),

            error_png_path: String::new(),
            qr_size: 512,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid LISTEN_PORT: {0:?}")]
    InvalidListenPort(String),
    #[error("invalid LOGO_MAX_RATIO: {0:?}")]
    InvalidLogoMaxRatio(String),
    #[error("invalid TLS_CERT_DAYS: {0:?}")]
    InvalidTlsCertDays(String),
    #[error("invalid TRUSTED_PROXY_CIDRS entry: {0:?}")]
    InvalidTrustedProxyCidr(String),
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = Config::default();

        let ip = env_trim("LISTEN_IP");
        if !ip.is_empty() {
            cfg.listen_ip = ip;
        }

        let port = env_trim("LISTEN_PORT");
        if !port.is_empty() {
            cfg.listen_port = match port.parse::<u16>() {
                Ok(p) if p >= 1 => p,
                _ => return Err(ConfigError::InvalidListenPort(port)),
            };
        }

        let keys_file = env_trim("KEYS_FILE");
        if !keys_file.is_empty() {
            cfg.keys_file = keys_file;
        }

        let ratio = env_trim("LOGO_MAX_RATIO");
        if !ratio.is_empty() {
            cfg.logo_max_ratio = match ratio.parse::<f64>() {
                Ok(v) if v > 0.0 && v < 0.5 => v,
                _ => return Err(ConfigError::InvalidLogoMaxRatio(ratio)),
            };
        }

        cfg.tls_enabled = env_bool("TLS_ENABLED", false);
        let cert = env_trim("TLS_CERT_FILE");
        if !cert.is_empty() {
            cfg.tls_cert_file = cert;
        }
        let key = env_trim("TLS_KEY_FILE");
        if !key.is_empty() {
            cfg.tls_key_file = key;
        }
        let hosts = split_csv(&env_trim("TLS_HOSTS"));
        if !hosts.is_empty() {
            cfg.tls_hosts = hosts;
        }
        cfg.tls_auto_self_signed = env_bool("TLS_AUTO_SELF_SIGNED", true);
        let days = env_trim("TLS_CERT_DAYS");
        if !days.is_empty() {
            cfg.tls_cert_days = match days.parse::<u32>() {
                Ok(v) if (1..=3650).contains(&v) => v,
                _ => return Err(ConfigError::InvalidTlsCertDays(days)),
            };
        }

        cfg.read_timeout = env_seconds("READ_TIMEOUT_SEC", 10);
        cfg.write_timeout = env_seconds("WRITE_TIMEOUT_SEC", 15);
        cfg.idle_timeout = env_seconds("IDLE_TIMEOUT_SEC", 60);
        cfg.read_header_timeout = env_seconds("READ_HEADER_TIMEOUT_SEC", 5);

        cfg.max_header_bytes = env_int("MAX_HEADER_BYTES", 1 << 20, 8 << 10, 16 << 20) as usize;
        cfg.max_body_bytes = env_int("MAX_BODY_BYTES", 8 << 10, 1 << 10, 1 << 20) as usize;
        cfg.rate_limit_rps = env_float("RATE_LIMIT_RPS", 10.0, 0.0, 1_000_000.0);
        cfg.rate_limit_burst = env_int("RATE_LIMIT_BURST", 20, 1, 1_000_000) as u32;

        cfg.allow_query_api_key = env_bool("ALLOW_QUERY_API_KEY", false);
        cfg.amount_lenient_ocr = env_bool("AMOUNT_LENIENT_OCR", false);
        cfg.require_keys = env_bool("REQUIRE_KEYS", false);
        cfg.require_api_key = env_bool("REQUIRE_API_KEY", false);
        cfg.access_log = env_bool("ACCESS_LOG", false);

        cfg.cache_png_max_bytes = env_int("CACHE_PNG_MAX_BYTES", 256 << 20, 1 << 20, 2 << 30) as u64;
        cfg.cache_logo_max_bytes =
            env_int("CACHE_LOGO_MAX_BYTES", 32 << 20, 1 << 20, 512 << 20) as u64;
        cfg.cache_ttl = env_seconds("CACHE_TTL_SEC", 900);
        let cache_control = env_trim("CACHE_CONTROL");
        if !cache_control.is_empty() {
            cfg.cache_control = cache_control;
        }

        cfg.error_png_path = env_trim("ERROR_PNG_PATH");
        cfg.qr_size = env_int("QR_SIZE", 512, 512, 2048) as u32;

        cfg.trusted_proxy_cidrs = parse_trusted_proxy_cidrs(&env_trim("TRUSTED_PROXY_CIDRS"))?;

        Ok(cfg)
    }
}

fn env_trim(name: &str) -> String {
    env::var(name).unwrap_or_default().trim().to_string()
}

/// Seconds value restricted to 1..=600; out-of-range input falls back to
/// the default (which itself may exceed the range, e.g. the cache TTL).
fn env_seconds(name: &str, def: u64) -> Duration {
    let s = env_trim(name);
    if s.is_empty() {
        return Duration::from_secs(def);
    }
    match s.parse::<u64>() {
        Ok(v) if (1..=600).contains(&v) => Duration::from_secs(v),
        _ => {
            warn!("{name}={s:?} is invalid (must be integer 1..600); using default {def}s");
            Duration::from_secs(def)
        }
    }
}

fn env_int(name: &str, def: i64, min: i64, max: i64) -> i64 {
    let s = env_trim(name);
    if s.is_empty() {
        return def;
    }
    match s.parse::<i64>() {
        Ok(v) if v >= min && v <= max => v,
        _ => {
            warn!("{name}={s:?} is invalid (must be integer {min}..{max}); using default {def}");
            def
        }
    }
}

fn env_float(name: &str, def: f64, min: f64, max: f64) -> f64 {
    let s = env_trim(name);
    if s.is_empty() {
        return def;
    }
    match s.parse::<f64>() {
        Ok(v) if v >= min && v <= max => v,
        _ => {
            warn!("{name}={s:?} is invalid (must be float {min}..{max}); using default {def}");
            def
        }
    }
}

fn env_bool(name: &str, def: bool) -> bool {
    parse_bool(&env_trim(name), def)
}

fn parse_bool(s: &str, def: bool) -> bool {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => true,
        "0" | "false" | "no" | "n" | "off" => false,
        _ => def,
    }
}

fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_trusted_proxy_cidrs(s: &str) -> Result<Vec<IpNetwork>, ConfigError> {
    let mut out = Vec::new();
    for part in split_csv(s) {
        let net = part
            .parse::<IpNetwork>()
            .map_err(|_| ConfigError::InvalidTrustedProxyCidr(part.clone()))?;
        out.push(net);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.listen_ip, "127.0.0.1");
        assert_eq!(cfg.listen_port, 8089);
        assert_eq!(cfg.keys_file, "./keys.json");
        assert_eq!(cfg.logo_max_ratio, 0.22);
        assert_eq!(cfg.max_body_bytes, 8 << 10);
        assert_eq!(cfg.rate_limit_rps, 10.0);
        assert_eq!(cfg.rate_limit_burst, 20);
        assert_eq!(cfg.cache_png_max_bytes, 256 << 20);
        assert_eq!(cfg.cache_ttl, Duration::from_secs(900));
        assert_eq!(cfg.cache_control, "private, max-age=60");
        assert_eq!(cfg.qr_size, 512);
        assert!(!cfg.tls_enabled);
        assert!(!cfg.require_api_key);
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        for s in ["1", "true", "YES", "y", "On"] {
            assert!(parse_bool(s, false), "{s}");
        }
        for s in ["0", "false", "NO", "n", "Off"] {
            assert!(!parse_bool(s, true), "{s}");
        }
        assert!(parse_bool("maybe", true));
        assert!(!parse_bool("maybe", false));
    }

    #[test]
    fn split_csv_trims_and_drops_empties() {
        assert_eq!(
            split_csv(" a , b ,, c "),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
        assert!(split_csv("").is_empty());
        assert!(split_csv(" , ").is_empty());
    }

    #[test]
    fn cidr_parsing() {
        let nets = parse_trusted_proxy_cidrs("10.0.0.0/8, 192.168.1.0/24").unwrap();
        assert_eq!(nets.len(), 2);
        assert!(nets[0].contains("10.1.2.3".parse().unwrap()));
        assert!(!nets[1].contains("10.1.2.3".parse().unwrap()));

        assert!(parse_trusted_proxy_cidrs("not-a-cidr").is_err());
        assert!(parse_trusted_proxy_cidrs("").unwrap().is_empty());
    }

    #[test]
    fn env_overrides_and_fallbacks() {
        // One sequential test owns these variables to keep the parallel
        // test harness away from racing on the process environment.
        std::env::set_var("SEPAQR_TEST_SECONDS", "30");
        assert_eq!(env_seconds("SEPAQR_TEST_SECONDS", 10), Duration::from_secs(30));
        std::env::set_var("SEPAQR_TEST_SECONDS", "0");
        assert_eq!(env_seconds("SEPAQR_TEST_SECONDS", 10), Duration::from_secs(10));
        std::env::set_var("SEPAQR_TEST_SECONDS", "9999");
        assert_eq!(env_seconds("SEPAQR_TEST_SECONDS", 900), Duration::from_secs(900));
        std::env::remove_var("SEPAQR_TEST_SECONDS");

        std::env::set_var("SEPAQR_TEST_INT", "42");
        assert_eq!(env_int("SEPAQR_TEST_INT", 7, 1, 100), 42);
        std::env::set_var("SEPAQR_TEST_INT", "101");
        assert_eq!(env_int("SEPAQR_TEST_INT", 7, 1, 100), 7);
        std::env::set_var("SEPAQR_TEST_INT", "abc");
        assert_eq!(env_int("SEPAQR_TEST_INT", 7, 1, 100), 7);
        std::env::remove_var("SEPAQR_TEST_INT");

        std::env::set_var("SEPAQR_TEST_FLOAT", "2.5");
        assert_eq!(env_float("SEPAQR_TEST_FLOAT", 1.0, 0.0, 10.0), 2.5);
        std::env::set_var("SEPAQR_TEST_FLOAT", "-1");
        assert_eq!(env_float("SEPAQR_TEST_FLOAT", 1.0, 0.0, 10.0), 1.0);
        std::env::remove_var("SEPAQR_TEST_FLOAT");
    }
}
