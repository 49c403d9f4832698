use image::{codecs::png::PngEncoder, ExtendedColorType, ImageEncoder, Rgba, RgbaImage};
use qrcode::{EcLevel, QrCode};

use crate::qr_render::{self, Style};

#[derive(Clone, Copy, Debug)]
pub struct Options {
    pub size: u32,
    pub ecc: EcLevel,
}

/// Public mode: fixed, boring, highly compatible.
pub fn default_public_options() -> Options {
    Options {
        size: 512,
        ecc: EcLevel::M,
    }
}

/// Auth mode: can be customized; error correction is increased only when a
/// logo covers part of the code.
pub fn default_auth_options(with_logo: bool) -> Options {
    Options {
        size: 512,
        ecc: if with_logo { EcLevel::H } else { EcLevel::M },
    }
}

/// Stable integer tag for an error-correction level, used in cache
/// fingerprints.
pub fn ecc_code(ecc: EcLevel) -> u8 {
    match ecc {
        EcLevel::L => 0,
        EcLevel::M => 1,
        EcLevel::Q => 2,
        EcLevel::H => 3,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QrError {
    #[error("failed to build qr")]
    Build,
    #[error("failed to encode png")]
    PngEncode,
}

/// Standard QR PNG: square modules, default quiet zone, white background
/// turned fully transparent.
pub fn make_qr(payload: &str, opt: Options) -> Result<Vec<u8>, QrError> {
    let code =
        QrCode::with_error_correction_level(payload.as_bytes(), opt.ecc).map_err(|_| QrError::Build)?;
    let mut img = qr_render::render_plain(&module_grid(&code), opt.size);
    make_background_transparent(&mut img);
    encode_rgba_png(&img).map_err(|_| QrError::PngEncode)
}

/// Styled QR PNG: custom module shapes, quiet zone and carved corners,
/// drawn over a transparent background.
pub fn make_qr_styled(payload: &str, opt: Options, style: &Style) -> Result<Vec<u8>, QrError> {
    let code =
        QrCode::with_error_correction_level(payload.as_bytes(), opt.ecc).map_err(|_| QrError::Build)?;
    let img = qr_render::render_styled(&module_grid(&code), opt.size, style);
    encode_rgba_png(&img).map_err(|_| QrError::PngEncode)
}

fn module_grid(code: &QrCode) -> Vec<Vec<bool>> {
    let n = code.width();
    (0..n)
        .map(|y| {
            (0..n)
                .map(|x| matches!(code[(x, y)], qrcode::Color::Dark))
                .collect()
        })
        .collect()
}

/// Pure white becomes fully transparent; every other pixel keeps its alpha.
pub fn make_background_transparent(img: &mut RgbaImage) {
    for p in img.pixels_mut() {
        if p.0[0] == 255 && p.0[1] == 255 && p.0[2] == 255 {
            *p = Rgba([0, 0, 0, 0]);
        }
    }
}

pub(crate) fn encode_rgba_png(img: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf).write_image(
        img,
        img.width(),
        img.height(),
        ExtendedColorType::Rgba8,
    )?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G'];

    #[test]
    fn make_qr_produces_png_of_requested_size() {
        let png = make_qr("BCD\n001\n1\nSCT", default_public_options()).unwrap();
        assert_eq!(&png[..4], PNG_MAGIC);
        let img = image::load_from_memory(&png).unwrap();
        assert_eq!(img.width(), 512);
        assert_eq!(img.height(), 512);
    }

    #[test]
    fn public_background_is_transparent() {
        let png = make_qr("hello", default_public_options()).unwrap();
        let img = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(img.get_pixel(0, 0).0[3], 0);
    }

    #[test]
    fn styled_output_respects_size() {
        let opt = Options {
            size: 640,
            ecc: EcLevel::M,
        };
        let png = make_qr_styled("hello", opt, &Style::default()).unwrap();
        let img = image::load_from_memory(&png).unwrap();
        assert_eq!(img.width(), 640);
    }

    #[test]
    fn auth_options_raise_ecc_for_logo() {
        assert_eq!(default_auth_options(false).ecc, EcLevel::M);
        assert_eq!(default_auth_options(true).ecc, EcLevel::H);
    }

    #[test]
    fn ecc_codes_are_distinct() {
        let codes = [
            ecc_code(EcLevel::L),
            ecc_code(EcLevel::M),
            ecc_code(EcLevel::Q),
            ecc_code(EcLevel::H),
        ];
        assert_eq!(codes, [0, 1, 2, 3]);
    }

    #[test]
    fn transparency_only_hits_pure_white() {
        let mut img = RgbaImage::from_pixel(2, 1, Rgba([255, 255, 255, 255]));
        img.put_pixel(1, 0, Rgba([254, 255, 255, 200]));
        make_background_transparent(&mut img);
        assert_eq!(img.get_pixel(0, 0).0[3], 0);
        assert_eq!(img.get_pixel(1, 0).0[3], 200);
    }
}
