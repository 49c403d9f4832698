//! Centered logo overlay with a white backdrop.

use image::{imageops::FilterType, DynamicImage, GenericImageView, Rgba, RgbaImage};

use crate::qr;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogoShape {
    #[default]
    Square,
    Circle,
}

impl LogoShape {
    /// Lenient parse used by the key store: unknown values fall back to
    /// square.
    pub fn parse(s: &str) -> LogoShape {
        match s.trim().to_lowercase().as_str() {
            "circle" => LogoShape::Circle,
            _ => LogoShape::Square,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogoShape::Square => "square",
            LogoShape::Circle => "circle",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LogoError {
    #[error("failed to decode png")]
    Decode,
    #[error("failed to encode png")]
    Encode,
}

/// Scales the logo to at most `ratio` of the QR width (40 px floor),
/// centers it over an opaque white backdrop and re-encodes the PNG.
pub fn overlay_logo(
    qr_png: &[u8],
    logo: &DynamicImage,
    ratio: f64,
    shape: LogoShape,
) -> Result<Vec<u8>, LogoError> {
    if ratio <= 0.0 {
        return Ok(qr_png.to_vec());
    }

    let mut base = image::load_from_memory(qr_png)
        .map_err(|_| LogoError::Decode)?
        .to_rgba8();
    let (qr_w, qr_h) = base.dimensions();

    let target = ((f64::from(qr_w) * ratio).round() as i64).max(40);

    let (lw, lh) = logo.dimensions();
    if lw == 0 || lh == 0 {
        return Ok(qr_png.to_vec());
    }

    let scale = (target as f64 / f64::from(lw)).min(target as f64 / f64::from(lh));
    let new_w = ((f64::from(lw) * scale).round() as u32).max(1);
    let new_h = ((f64::from(lh) * scale).round() as u32).max(1);

    let resized = logo.resize_exact(new_w, new_h, FilterType::CatmullRom).to_rgba8();

    let x = (i64::from(qr_w) - i64::from(new_w)) / 2;
    let y = (i64::from(qr_h) - i64::from(new_h)) / 2;

    let pad = ((f64::from(qr_w) * 0.02).round() as i64).max(8);
    let bg_x0 = x - pad;
    let bg_y0 = y - pad;
    let bg_x1 = x + i64::from(new_w) + pad;
    let bg_y1 = y + i64::from(new_h) + pad;
    if shape == LogoShape::Circle {
        fill_circle(&mut base, bg_x0, bg_y0, bg_x1, bg_y1, Rgba([255, 255, 255, 255]));
    } else {
        fill_rect(&mut base, bg_x0, bg_y0, bg_x1, bg_y1, Rgba([255, 255, 255, 255]));
    }

    // Source-over composite of the scaled logo.
    for (ox, oy, p) in resized.enumerate_pixels() {
        let a = f64::from(p.0[3]) / 255.0;
        if a <= 0.0 {
            continue;
        }
        let bx = x + i64::from(ox);
        let by = y + i64::from(oy);
        if bx < 0 || by < 0 || bx >= i64::from(qr_w) || by >= i64::from(qr_h) {
            continue;
        }
        let bp = base.get_pixel_mut(bx as u32, by as u32);
        let inv = 1.0 - a;
        bp.0[0] = (f64::from(p.0[0]) * a + f64::from(bp.0[0]) * inv) as u8;
        bp.0[1] = (f64::from(p.0[1]) * a + f64::from(bp.0[1]) * inv) as u8;
        bp.0[2] = (f64::from(p.0[2]) * a + f64::from(bp.0[2]) * inv) as u8;
        bp.0[3] = 255;
    }

    qr::encode_rgba_png(&base).map_err(|_| LogoError::Encode)
}

fn fill_rect(img: &mut RgbaImage, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgba<u8>) {
    let (w, h) = img.dimensions();
    for y in y0.max(0)..y1.min(i64::from(h)) {
        for x in x0.max(0)..x1.min(i64::from(w)) {
            img.put_pixel(x as u32, y as u32, color);
        }
    }
}

fn fill_circle(img: &mut RgbaImage, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgba<u8>) {
    let rect_w = x1 - x0;
    let rect_h = y1 - y0;
    if rect_w <= 0 || rect_h <= 0 {
        return;
    }
    let r = rect_w.min(rect_h) / 2;
    let cx = x0 + rect_w / 2;
    let cy = y0 + rect_h / 2;
    let r2 = r * r;
    let (w, h) = img.dimensions();
    for y in y0.max(0)..y1.min(i64::from(h)) {
        for x in x0.max(0)..x1.min(i64::from(w)) {
            let dx = x - cx;
            let dy = y - cy;
            if dx * dx + dy * dy <= r2 {
                img.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qr_png(size: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(size, size, Rgba([0, 0, 0, 255]));
        qr::encode_rgba_png(&img).unwrap()
    }

    fn red_logo(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([255, 0, 0, 255])))
    }

    #[test]
    fn zero_ratio_is_a_no_op() {
        let png = qr_png(128);
        let out = overlay_logo(&png, &red_logo(32, 32), 0.0, LogoShape::Square).unwrap();
        assert_eq!(out, png);
    }

    #[test]
    fn logo_lands_in_the_center() {
        let out = overlay_logo(&qr_png(512), &red_logo(64, 64), 0.2, LogoShape::Square).unwrap();
        let img = image::load_from_memory(&out).unwrap().to_rgba8();
        let center = img.get_pixel(256, 256);
        assert_eq!(center.0, [255, 0, 0, 255]);
        // Far corner is untouched.
        assert_eq!(img.get_pixel(5, 5).0, [0, 0, 0, 255]);
    }

    #[test]
    fn backdrop_padding_is_white() {
        let out = overlay_logo(&qr_png(512), &red_logo(64, 64), 0.2, LogoShape::Square).unwrap();
        let img = image::load_from_memory(&out).unwrap().to_rgba8();
        // target = 102, logo from (205,205); pad = 10 ends at (195,195).
        assert_eq!(img.get_pixel(200, 256).0, [255, 255, 255, 255]);
    }

    #[test]
    fn circle_backdrop_keeps_rect_corners() {
        let out = overlay_logo(&qr_png(512), &red_logo(64, 64), 0.2, LogoShape::Circle).unwrap();
        let square = overlay_logo(&qr_png(512), &red_logo(64, 64), 0.2, LogoShape::Square).unwrap();
        let circ_img = image::load_from_memory(&out).unwrap().to_rgba8();
        let sq_img = image::load_from_memory(&square).unwrap().to_rgba8();
        // The backdrop rectangle corner is white for square, dark for circle.
        let (cx, cy) = (196, 196);
        assert_eq!(sq_img.get_pixel(cx, cy).0, [255, 255, 255, 255]);
        assert_eq!(circ_img.get_pixel(cx, cy).0, [0, 0, 0, 255]);
    }

    #[test]
    fn aspect_ratio_is_preserved() {
        let out = overlay_logo(&qr_png(512), &red_logo(100, 50), 0.2, LogoShape::Square).unwrap();
        let img = image::load_from_memory(&out).unwrap().to_rgba8();
        // Wide logo: scaled to 102x51, rows above it show the backdrop.
        assert_eq!(img.get_pixel(256, 256).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(256, 222).0, [255, 255, 255, 255]);
        assert_eq!(img.get_pixel(256, 210).0, [0, 0, 0, 255]);
    }

    #[test]
    fn small_qr_enforces_minimum_target() {
        // 64 px QR with ratio 0.1 would give target 6, floor is 40.
        let out = overlay_logo(&qr_png(64), &red_logo(80, 80), 0.1, LogoShape::Square).unwrap();
        let img = image::load_from_memory(&out).unwrap().to_rgba8();
        // Logo is 40x40 at (12, 12); its backdrop reaches out to (4, 4).
        assert_eq!(img.get_pixel(32, 32).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(32, 20).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(32, 8).0, [255, 255, 255, 255]);
    }

    #[test]
    fn shape_parse() {
        assert_eq!(LogoShape::parse(""), LogoShape::Square);
        assert_eq!(LogoShape::parse("Circle"), LogoShape::Circle);
        assert_eq!(LogoShape::parse("hex"), LogoShape::Square);
    }
}
