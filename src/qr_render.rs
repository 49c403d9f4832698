//! Pixel rendering of QR module grids.
//!
//! The plain renderer draws square modules dark-on-white; the styled
//! renderer draws onto a transparent canvas and supports rounded and blob
//! modules plus carved outer corners.

use image::{Rgba, RgbaImage};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ModuleStyle {
    #[default]
    Square,
    Rounded,
    Blob,
}

impl ModuleStyle {
    /// Lenient parse used by the key store: unknown values fall back to
    /// square.
    pub fn parse(s: &str) -> ModuleStyle {
        match s.trim().to_lowercase().as_str() {
            "rounded" => ModuleStyle::Rounded,
            "blob" => ModuleStyle::Blob,
            _ => ModuleStyle::Square,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleStyle::Square => "square",
            ModuleStyle::Rounded => "rounded",
            ModuleStyle::Blob => "blob",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Style {
    pub corner_radius: u32,
    pub module_style: ModuleStyle,
    /// Module corner radius as a fraction of the module size, 0..=0.5.
    pub module_radius: f64,
    /// 0 means the renderer default of 4 modules.
    pub quiet_zone: u32,
}

const DEFAULT_QUIET_ZONE: u32 = 4;

const DARK: Rgba<u8> = Rgba([0, 0, 0, 255]);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Draws the module grid as plain black squares on an opaque white canvas
/// with the default quiet zone.
pub fn render_plain(modules: &[Vec<bool>], size: u32) -> RgbaImage {
    let mut img = RgbaImage::from_pixel(size, size, WHITE);
    draw_modules(&mut img, modules, size, DEFAULT_QUIET_ZONE, 0.0);
    img
}

/// Draws the module grid onto a fully transparent canvas applying the given
/// style.
pub fn render_styled(modules: &[Vec<bool>], size: u32, style: &Style) -> RgbaImage {
    let mut img = RgbaImage::from_pixel(size, size, CLEAR);

    let quiet = if style.quiet_zone > 0 {
        style.quiet_zone
    } else {
        DEFAULT_QUIET_ZONE
    };

    let radius_frac = match style.module_style {
        ModuleStyle::Square => 0.0,
        ModuleStyle::Rounded => {
            if style.module_radius > 0.0 {
                style.module_radius
            } else {
                0.25
            }
        }
        ModuleStyle::Blob => {
            if style.module_radius > 0.0 {
                style.module_radius
            } else {
                0.5
            }
        }
    };

    draw_modules(&mut img, modules, size, quiet, radius_frac);

    if style.corner_radius > 0 {
        apply_corner_radius(&mut img, style.corner_radius);
    }

    img
}

fn draw_modules(
    img: &mut RgbaImage,
    modules: &[Vec<bool>],
    size: u32,
    quiet: u32,
    radius_frac: f64,
) {
    let n = modules.len() as u32;
    if n == 0 || size == 0 {
        return;
    }
    let total = n + quiet * 2;
    let scale = f64::from(size) / f64::from(total);

    for (y, row) in modules.iter().enumerate() {
        for (x, dark) in row.iter().enumerate() {
            if !dark {
                continue;
            }
            let (x, y) = (x as u32, y as u32);
            // Cell bounds derived from rounded grid positions so rows and
            // columns stay aligned at non-integer scales.
            let px = (f64::from(x + quiet) * scale).round() as u32;
            let py = (f64::from(y + quiet) * scale).round() as u32;
            let pw = ((f64::from(x + quiet + 1) * scale).round() as u32)
                .saturating_sub(px)
                .max(1);
            let ph = ((f64::from(y + quiet + 1) * scale).round() as u32)
                .saturating_sub(py)
                .max(1);

            if radius_frac <= 0.0 {
                fill_rect(img, px, py, pw, ph, DARK);
            } else {
                fill_rounded_rect(img, px, py, pw, ph, radius_frac, DARK);
            }
        }
    }
}

fn fill_rect(img: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32, color: Rgba<u8>) {
    for yy in y..(y + h).min(img.height()) {
        for xx in x..(x + w).min(img.width()) {
            img.put_pixel(xx, yy, color);
        }
    }
}

fn fill_rounded_rect(
    img: &mut RgbaImage,
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    radius_frac: f64,
    color: Rgba<u8>,
) {
    let r = (f64::from(w.min(h)) * radius_frac).round() as u32;
    if r == 0 {
        fill_rect(img, x, y, w, h, color);
        return;
    }
    let r2 = r * r;
    for yy in 0..h {
        for xx in 0..w {
            let (px, py) = (x + xx, y + yy);
            if px >= img.width() || py >= img.height() {
                continue;
            }
            let dx = xx.min(w - 1 - xx);
            let dy = yy.min(h - 1 - yy);
            if dx >= r || dy >= r {
                img.put_pixel(px, py, color);
                continue;
            }
            let ox = r - dx;
            let oy = r - dy;
            if ox * ox + oy * oy <= r2 {
                img.put_pixel(px, py, color);
            }
        }
    }
}

/// Carves the four outer corners to transparent with an inscribed circle,
/// radius capped at half the smaller canvas side.
fn apply_corner_radius(img: &mut RgbaImage, radius: u32) {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let r = radius.min(w / 2).min(h / 2);
    if r == 0 {
        return;
    }
    let r2 = r * r;
    for y in 0..h {
        for x in 0..w {
            let dx = x.min(w - 1 - x);
            let dy = y.min(h - 1 - y);
            if dx >= r || dy >= r {
                continue;
            }
            let ox = r - dx;
            let oy = r - dy;
            if ox * ox + oy * oy > r2 {
                img.put_pixel(x, y, CLEAR);
            }
        }
    }
}
