//! Palette and gradient recoloring of rendered QR PNGs.
//!
//! Pixels are classified as background (fully transparent or near white,
//! all channels above 0xEE to tolerate anti-aliasing fringes) or
//! foreground, then repainted from the requested palette or linear
//! gradients.

use image::Rgba;

use crate::qr;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradientSpec {
    pub from: String,
    pub to: String,
    pub angle: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum RecolorError {
    #[error("invalid fg color: {0}")]
    InvalidFg(String),
    #[error("invalid bg color: {0}")]
    InvalidBg(String),
    #[error("failed to decode png")]
    Decode,
    #[error("failed to encode png")]
    Encode,
}

/// Solid-color recoloring; `bg` accepts `transparent`/`none` literals.
pub fn recolor(qr_png: &[u8], fg_hex: &str, bg_hex: &str) -> Result<Vec<u8>, RecolorError> {
    recolor_gradient(qr_png, fg_hex, bg_hex, None, None)
}

pub fn recolor_gradient(
    qr_png: &[u8],
    fg_hex: &str,
    bg_hex: &str,
    fg_grad: Option<&GradientSpec>,
    bg_grad: Option<&GradientSpec>,
) -> Result<Vec<u8>, RecolorError> {
    let fg = parse_hex_color(fg_hex).ok_or_else(|| RecolorError::InvalidFg(fg_hex.to_string()))?;
    let (bg, transparent_bg) =
        parse_bg_color(bg_hex).ok_or_else(|| RecolorError::InvalidBg(bg_hex.to_string()))?;

    let src = image::load_from_memory(qr_png)
        .map_err(|_| RecolorError::Decode)?
        .to_rgba8();
    let (w, h) = src.dimensions();
    let mut out = image::RgbaImage::new(w, h);

    let fg_grad_fn = fg_grad.map(|g| make_gradient_fn(w, h, g));
    let bg_grad_fn = bg_grad.map(|g| make_gradient_fn(w, h, g));

    for (x, y, p) in src.enumerate_pixels() {
        let [r, g, b, a] = p.0;
        let is_background = a == 0 || (r > 0xEE && g > 0xEE && b > 0xEE);
        let color = if is_background {
            if transparent_bg {
                Rgba([0, 0, 0, 0])
            } else if let Some(f) = &bg_grad_fn {
                f(x, y)
            } else {
                bg
            }
        } else if let Some(f) = &fg_grad_fn {
            f(x, y)
        } else {
            fg
        };
        out.put_pixel(x, y, color);
    }

    qr::encode_rgba_png(&out).map_err(|_| RecolorError::Encode)
}

/// 6 hex digits, optional leading `#`, case-insensitive. Empty means black.
fn parse_hex_color(s: &str) -> Option<Rgba<u8>> {
    let v = s.trim().to_lowercase();
    if v.is_empty() {
        return Some(Rgba([0, 0, 0, 255]));
    }
    let v = v.strip_prefix('#').unwrap_or(&v);
    if v.len() != 6 {
        return None;
    }
    let bytes = hex::decode(v).ok()?;
    Some(Rgba([bytes[0], bytes[1], bytes[2], 255]))
}

/// Background colors also accept `transparent`/`none`; empty means white.
fn parse_bg_color(s: &str) -> Option<(Rgba<u8>, bool)> {
    let v = s.trim().to_lowercase();
    if v.is_empty() {
        return Some((Rgba([255, 255, 255, 255]), false));
    }
    if v == "transparent" || v == "none" {
        return Some((Rgba([0, 0, 0, 0]), true));
    }
    parse_hex_color(&v).map(|c| (c, false))
}

/// Linear gradient sampler: project each pixel onto the angle direction and
/// interpolate between the endpoint colors over the image's projected span.
fn make_gradient_fn(w: u32, h: u32, spec: &GradientSpec) -> impl Fn(u32, u32) -> Rgba<u8> {
    let from = parse_hex_color(&spec.from).unwrap_or(Rgba([0, 0, 0, 0]));
    let to = parse_hex_color(&spec.to).unwrap_or(Rgba([0, 0, 0, 0]));

    let rad = spec.angle.to_radians();
    let mut dx = rad.cos();
    let mut dy = rad.sin();
    if dx == 0.0 && dy == 0.0 {
        dx = 1.0;
        dy = 0.0;
    }

    let (wf, hf) = (f64::from(w), f64::from(h));
    let corners = [(0.0, 0.0), (wf, 0.0), (0.0, hf), (wf, hf)];
    let mut min_p = f64::INFINITY;
    let mut max_p = f64::NEG_INFINITY;
    for (cx, cy) in corners {
        let p = cx * dx + cy * dy;
        min_p = min_p.min(p);
        max_p = max_p.max(p);
    }
    let mut den = max_p - min_p;
    if den == 0.0 {
        den = 1.0;
    }

    move |x, y| {
        let p = f64::from(x) * dx + f64::from(y) * dy;
        let t = ((p - min_p) / den).clamp(0.0, 1.0);
        lerp_color(from, to, t)
    }
}

fn lerp_color(a: Rgba<u8>, b: Rgba<u8>, t: f64) -> Rgba<u8> {
    let ch = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * t) as u8;
    Rgba([
        ch(a.0[0], b.0[0]),
        ch(a.0[1], b.0[1]),
        ch(a.0[2], b.0[2]),
        ch(a.0[3], b.0[3]),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn test_png() -> Vec<u8> {
        // 4x1: transparent, white, near-white, black.
        let mut img = RgbaImage::new(4, 1);
        img.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        img.put_pixel(1, 0, Rgba([255, 255, 255, 255]));
        img.put_pixel(2, 0, Rgba([0xF0, 0xF0, 0xF0, 255]));
        img.put_pixel(3, 0, Rgba([0, 0, 0, 255]));
        qr::encode_rgba_png(&img).unwrap()
    }

    fn decode(png: &[u8]) -> RgbaImage {
        image::load_from_memory(png).unwrap().to_rgba8()
    }

    #[test]
    fn classifies_background_and_foreground() {
        let out = decode(&recolor(&test_png(), "#102030", "#a0b0c0").unwrap());
        let bg = Rgba([0xA0, 0xB0, 0xC0, 255]);
        let fg = Rgba([0x10, 0x20, 0x30, 255]);
        assert_eq!(*out.get_pixel(0, 0), bg);
        assert_eq!(*out.get_pixel(1, 0), bg);
        assert_eq!(*out.get_pixel(2, 0), bg); // near white counts as background
        assert_eq!(*out.get_pixel(3, 0), fg);
    }

    #[test]
    fn near_white_threshold_is_exclusive() {
        let mut img = RgbaImage::new(1, 1);
        img.put_pixel(0, 0, Rgba([0xEE, 0xEE, 0xEE, 255]));
        let png = qr::encode_rgba_png(&img).unwrap();
        let out = decode(&recolor(&png, "#112233", "").unwrap());
        // Exactly 0xEE is still foreground.
        assert_eq!(*out.get_pixel(0, 0), Rgba([0x11, 0x22, 0x33, 255]));
    }

    #[test]
    fn transparent_background_literals() {
        for bg in ["transparent", "none", "TRANSPARENT"] {
            let out = decode(&recolor(&test_png(), "", bg).unwrap());
            assert_eq!(out.get_pixel(1, 0).0[3], 0);
            assert_eq!(*out.get_pixel(3, 0), Rgba([0, 0, 0, 255]));
        }
    }

    #[test]
    fn empty_colors_default_to_black_on_white() {
        let out = decode(&recolor(&test_png(), "", "").unwrap());
        assert_eq!(*out.get_pixel(1, 0), Rgba([255, 255, 255, 255]));
        assert_eq!(*out.get_pixel(3, 0), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn invalid_colors_are_rejected() {
        assert!(matches!(
            recolor(&test_png(), "#12345", ""),
            Err(RecolorError::InvalidFg(_))
        ));
        assert!(matches!(
            recolor(&test_png(), "", "zzzzzz"),
            Err(RecolorError::InvalidBg(_))
        ));
    }

    #[test]
    fn hex_parsing() {
        assert_eq!(parse_hex_color("#FFcc00"), Some(Rgba([255, 204, 0, 255])));
        assert_eq!(parse_hex_color("ffcc00"), Some(Rgba([255, 204, 0, 255])));
        assert_eq!(parse_hex_color(""), Some(Rgba([0, 0, 0, 255])));
        assert_eq!(parse_hex_color("#ggg"), None);
    }

    #[test]
    fn horizontal_gradient_interpolates() {
        let mut img = RgbaImage::new(11, 1);
        for x in 0..11 {
            img.put_pixel(x, 0, Rgba([0, 0, 0, 255]));
        }
        let png = qr::encode_rgba_png(&img).unwrap();
        let grad = GradientSpec {
            from: "#000000".into(),
            to: "#ff0000".into(),
            angle: 0.0,
        };
        let out = decode(&recolor_gradient(&png, "", "", Some(&grad), None).unwrap());
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert!(out.get_pixel(10, 0).0[0] > 200);
        let mid = out.get_pixel(5, 0).0[0];
        assert!((100..=150).contains(&mid), "mid sample {mid}");
    }

    #[test]
    fn gradient_angle_changes_direction() {
        let mut img = RgbaImage::new(8, 8);
        for y in 0..8 {
            for x in 0..8 {
                img.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        let png = qr::encode_rgba_png(&img).unwrap();
        let spec = |angle: f64| GradientSpec {
            from: "#000000".into(),
            to: "#ffffff".into(),
            angle,
        };
        let horiz = decode(&recolor_gradient(&png, "", "", Some(&spec(0.0)), None).unwrap());
        let vert = decode(&recolor_gradient(&png, "", "", Some(&spec(90.0)), None).unwrap());
        // Horizontal varies along x, vertical along y.
        assert!(horiz.get_pixel(7, 0).0[0] > horiz.get_pixel(0, 0).0[0]);
        assert!(vert.get_pixel(0, 7).0[0] > vert.get_pixel(0, 0).0[0]);
    }

    #[test]
    fn background_gradient_fills_background() {
        let grad = GradientSpec {
            from: "#00ff00".into(),
            to: "#00ff00".into(),
            angle: 0.0,
        };
        let out = decode(&recolor_gradient(&test_png(), "", "", None, Some(&grad)).unwrap());
        assert_eq!(*out.get_pixel(1, 0), Rgba([0, 255, 0, 255]));
        assert_eq!(*out.get_pixel(3, 0), Rgba([0, 0, 0, 255]));
    }
}
