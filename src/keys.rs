//! Per-API-key style configuration, loaded once at startup from a JSON
//! file. Entries with an empty key are skipped; invalid optional attributes
//! are reset to safe defaults instead of failing the whole key.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::warn;

use crate::logo::LogoShape;
use crate::qr_render::ModuleStyle;

static RE_HEX_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#?[0-9a-fA-F]{6}$").expect("valid regex"));

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Palette {
    pub fg: String,
    pub bg: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gradient {
    pub from: String,
    pub to: String,
    pub angle: f64,
}

impl Gradient {
    pub fn is_set(&self) -> bool {
        !self.from.is_empty() && !self.to.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct KeyConfig {
    pub name: String,
    /// Per-key pixel size override; 0 means use the global setting.
    pub qr_size: u32,
    /// Empty when no logo is configured or the file was not readable.
    pub logo_path: String,
    pub logo_bg_shape: LogoShape,
    pub palette: Palette,
    pub fg_gradient: Gradient,
    pub bg_gradient: Gradient,
    pub corner_radius: u32,
    pub module_style: ModuleStyle,
    pub module_radius: f64,
    pub quiet_zone: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPalette {
    fg: String,
    bg: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawGradient {
    from: String,
    to: String,
    angle: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawKey {
    key: String,
    name: String,
    qr_size: i64,
    logo_path: String,
    logo_bg_shape: String,
    palette: RawPalette,
    fg_gradient: RawGradient,
    bg_gradient: RawGradient,
    corner_radius: i64,
    module_style: String,
    module_radius: f64,
    quiet_zone: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StoreFile {
    keys: Vec<RawKey>,
}

#[derive(Debug, thiserror::Error)]
pub enum KeysError {
    #[error("read keys file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parse keys file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("no valid keys in file")]
    Empty,
}

/// Read-only map from API key to its style configuration.
#[derive(Debug, Default)]
pub struct Store {
    by_key: HashMap<String, KeyConfig>,
}

impl Store {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, KeysError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| KeysError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let sf: StoreFile = serde_json::from_str(&text).map_err(|source| KeysError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let mut by_key = HashMap::new();
        for raw in sf.keys {
            let key = raw.key.trim().to_string();
            if key.is_empty() {
                warn!(name = %raw.name, "keys: skipping entry with empty key");
                continue;
            }
            by_key.insert(key, sanitize(raw));
        }

        if by_key.is_empty() {
            return Err(KeysError::Empty);
        }
        Ok(Self { by_key })
    }

    pub fn get(&self, api_key: &str) -> Option<&KeyConfig> {
        self.by_key.get(api_key)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

fn sanitize(raw: RawKey) -> KeyConfig {
    let name = raw.name;

    let mut logo_path = raw.logo_path.trim().to_string();
    if !logo_path.is_empty() && !is_readable_file(&logo_path) {
        warn!(name = %name, logo = %logo_path, "keys: logo not readable, disabling");
        logo_path = String::new();
    }

    let fg = normalize_hex(&raw.palette.fg);
    if !raw.palette.fg.is_empty() && fg.is_empty() {
        warn!(name = %name, fg = %raw.palette.fg, "keys: invalid palette fg, disabling");
    }
    let bg = normalize_hex(&raw.palette.bg);
    if !raw.palette.bg.is_empty() && bg.is_empty() {
        warn!(name = %name, bg = %raw.palette.bg, "keys: invalid palette bg, disabling");
    }

    let fg_gradient = normalize_gradient(&name, "fg_gradient", raw.fg_gradient);
    let bg_gradient = normalize_gradient(&name, "bg_gradient", raw.bg_gradient);

    let module_radius = if raw.module_radius < 0.0 || raw.module_radius > 0.5 {
        warn!(name = %name, module_radius = raw.module_radius, "keys: invalid module_radius, disabling");
        0.0
    } else {
        raw.module_radius
    };

    let corner_radius = if raw.corner_radius < 0 {
        warn!(name = %name, corner_radius = raw.corner_radius, "keys: invalid corner_radius, disabling");
        0
    } else {
        raw.corner_radius as u32
    };

    let quiet_zone = if raw.quiet_zone < 0 || raw.quiet_zone > 20 {
        warn!(name = %name, quiet_zone = raw.quiet_zone, "keys: invalid quiet_zone, disabling");
        0
    } else {
        raw.quiet_zone as u32
    };

    let qr_size = if raw.qr_size != 0 && !(512..=2048).contains(&raw.qr_size) {
        warn!(name = %name, qr_size = raw.qr_size, "keys: invalid qr_size, disabling per-key override");
        0
    } else {
        raw.qr_size.max(0) as u32
    };

    KeyConfig {
        name,
        qr_size,
        logo_path,
        logo_bg_shape: LogoShape::parse(&raw.logo_bg_shape),
        palette: Palette { fg, bg },
        fg_gradient,
        bg_gradient,
        corner_radius,
        module_style: ModuleStyle::parse(&raw.module_style),
        module_radius,
        quiet_zone,
    }
}

/// Both endpoints must be valid hex or the whole gradient is dropped.
fn normalize_gradient(name: &str, field: &str, raw: RawGradient) -> Gradient {
    let from = normalize_hex(&raw.from);
    let to = normalize_hex(&raw.to);
    if (!raw.from.is_empty() && from.is_empty()) || (!raw.to.is_empty() && to.is_empty()) {
        warn!(name = %name, field = %field, from = %raw.from, to = %raw.to, "keys: invalid gradient, disabling");
        return Gradient::default();
    }
    Gradient {
        from,
        to,
        angle: raw.angle,
    }
}

/// Normalizes to lowercase `#rrggbb`; empty when the input is not a valid
/// 6-digit hex color.
fn normalize_hex(s: &str) -> String {
    let v = s.trim();
    if v.is_empty() || !RE_HEX_COLOR.is_match(v) {
        return String::new();
    }
    if v.starts_with('#') {
        v.to_lowercase()
    } else {
        format!("#{}", v.to_lowercase())
    }
}

fn is_readable_file(path: &str) -> bool {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => fs::File::open(path).is_ok(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn load(json: &str) -> Result<Store, KeysError> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        Store::load_from_file(file.path())
    }

    #[test]
    fn loads_and_normalizes_entries() {
        let store = load(
            r##"{"keys":[
                {"key":"k1","name":"Acme","qr_size":1024,
                 "palette":{"fg":"1A2B3C","bg":"#FFEEDD"},
                 "fg_gradient":{"from":"#000000","to":"#ffffff","angle":45},
                 "module_style":"rounded","module_radius":0.3,
                 "corner_radius":24,"quiet_zone":6,"logo_bg_shape":"circle"}
            ]}"##,
        )
        .unwrap();

        let cfg = store.get("k1").unwrap();
        assert_eq!(cfg.name, "Acme");
        assert_eq!(cfg.qr_size, 1024);
        assert_eq!(cfg.palette.fg, "#1a2b3c");
        assert_eq!(cfg.palette.bg, "#ffeedd");
        assert!(cfg.fg_gradient.is_set());
        assert_eq!(cfg.module_style, ModuleStyle::Rounded);
        assert_eq!(cfg.logo_bg_shape, LogoShape::Circle);
        assert_eq!(cfg.corner_radius, 24);
        assert_eq!(cfg.quiet_zone, 6);
    }

    #[test]
    fn skips_entries_with_empty_key() {
        let store = load(r#"{"keys":[{"key":"  ","name":"nope"},{"key":"ok","name":"y"}]}"#).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get("ok").is_some());
    }

    #[test]
    fn empty_store_is_an_error() {
        assert!(matches!(load(r#"{"keys":[]}"#), Err(KeysError::Empty)));
        assert!(matches!(
            load(r#"{"keys":[{"key":"","name":"x"}]}"#),
            Err(KeysError::Empty)
        ));
    }

    #[test]
    fn invalid_values_reset_to_defaults() {
        let store = load(
            r##"{"keys":[
                {"key":"k","name":"n","qr_size":100,
                 "palette":{"fg":"not-a-color","bg":"#12345"},
                 "fg_gradient":{"from":"#000000","to":"bad","angle":10},
                 "module_style":"hexagon","module_radius":0.9,
                 "corner_radius":-5,"quiet_zone":99,"logo_bg_shape":"star"}
            ]}"##,
        )
        .unwrap();

        let cfg = store.get("k").unwrap();
        assert_eq!(cfg.qr_size, 0);
        assert_eq!(cfg.palette.fg, "");
        assert_eq!(cfg.palette.bg, "");
        assert!(!cfg.fg_gradient.is_set());
        assert_eq!(cfg.fg_gradient, Gradient::default());
        assert_eq!(cfg.module_style, ModuleStyle::Square);
        assert_eq!(cfg.module_radius, 0.0);
        assert_eq!(cfg.corner_radius, 0);
        assert_eq!(cfg.quiet_zone, 0);
        assert_eq!(cfg.logo_bg_shape, LogoShape::Square);
    }

    #[test]
    fn qr_size_boundaries_are_closed() {
        let store = load(
            r#"{"keys":[
                {"key":"lo","name":"lo","qr_size":512},
                {"key":"hi","name":"hi","qr_size":2048},
                {"key":"under","name":"under","qr_size":511}
            ]}"#,
        )
        .unwrap();
        assert_eq!(store.get("lo").unwrap().qr_size, 512);
        assert_eq!(store.get("hi").unwrap().qr_size, 2048);
        assert_eq!(store.get("under").unwrap().qr_size, 0);
    }

    #[test]
    fn unreadable_logo_is_cleared() {
        let store = load(
            r#"{"keys":[{"key":"k","name":"n","logo_path":"/definitely/not/here.png"}]}"#,
        )
        .unwrap();
        assert_eq!(store.get("k").unwrap().logo_path, "");
    }

    #[test]
    fn readable_logo_is_kept() {
        let mut logo = tempfile::NamedTempFile::new().unwrap();
        logo.write_all(b"png bytes").unwrap();
        let json = format!(
            r#"{{"keys":[{{"key":"k","name":"n","logo_path":{:?}}}]}}"#,
            logo.path().to_str().unwrap()
        );
        let store = load(&json).unwrap();
        assert_eq!(
            store.get("k").unwrap().logo_path,
            logo.path().to_str().unwrap()
        );
    }

    #[test]
    fn missing_file_and_bad_json() {
        assert!(matches!(
            Store::load_from_file("/no/such/keys.json"),
            Err(KeysError::Read { .. })
        ));
        assert!(matches!(load("{not json"), Err(KeysError::Parse { .. })));
    }

    #[test]
    fn hex_normalization() {
        assert_eq!(normalize_hex("A1B2C3"), "#a1b2c3");
        assert_eq!(normalize_hex("#A1B2C3"), "#a1b2c3");
        assert_eq!(normalize_hex(" #a1b2c3 "), "#a1b2c3");
        assert_eq!(normalize_hex("a1b2c"), "");
        assert_eq!(normalize_hex("red"), "");
        assert_eq!(normalize_hex(""), "");
    }
}
