//! Label drawing for the synthetic tiers.

use std::fs;
use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_circle_mut, draw_hollow_polygon_mut, draw_hollow_rect_mut,
    draw_line_segment_mut, draw_text_mut, text_size,
};
use imageproc::filter::gaussian_blur_f32;
use imageproc::noise::gaussian_noise_mut;
use imageproc::point::Point;
use imageproc::rect::Rect;

use super::{Background, FontResolution, PartType, Product, RenderingParams};
use crate::error::RenderError;

/// Paper colour of advanced labels before texturing.
pub const ADVANCED_BACKGROUND: &str = "#FAFAFA";

const BASIC_SIZE: (u32, u32) = (400, 300);
const ADVANCED_SIZE: (u32, u32) = (500, 400);

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// Draws one label for one product and writes it to `out` as PNG.
pub trait LabelRenderer: Send + Sync {
    fn render(&self, product: &Product, params: &RenderingParams, out: &Path) -> Result<(), RenderError>;
}

/// Default renderer: solid labels for the basic tier, textured labels with a
/// boxed code, part pattern and bars for the advanced tier.
#[derive(Debug, Default, Clone, Copy)]
pub struct LabelPainter;

impl LabelRenderer for LabelPainter {
    fn render(&self, product: &Product, params: &RenderingParams, out: &Path) -> Result<(), RenderError> {
        let face = Face::load(&params.font)?;
        let img = match &params.background {
            Background::Solid { colour } => paint_basic(product, parse_hex(colour)?, &face)?,
            Background::Textured { colour } => {
                paint_advanced(product, parse_hex(colour)?, params.variant.as_deref(), &face)?
            }
        };
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        img.save_with_format(out, ImageFormat::Png)?;
        Ok(())
    }
}

/// `#RRGGBB` → pixel.
pub fn parse_hex(colour: &str) -> Result<Rgb<u8>, RenderError> {
    let bad = || RenderError::Colour(colour.to_string());
    let hex = colour.strip_prefix('#').ok_or_else(bad)?;
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(bad());
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| bad());
    Ok(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}

// ── Layouts ──────────────────────────────────────────────────────────────────

fn paint_basic(product: &Product, background: Rgb<u8>, face: &Face) -> Result<RgbImage, RenderError> {
    let (w, h) = BASIC_SIZE;
    let mut img = RgbImage::from_pixel(w, h, background);

    let margin = 15;
    for inset in 0..3 {
        let side = margin + inset;
        draw_hollow_rect_mut(
            &mut img,
            Rect::at(side as i32, side as i32).of_size(w - 2 * side, h - 2 * side),
            WHITE,
        );
    }

    face.secondary(&mut img, WHITE, (w / 2, 45), 28.0, &product.name);
    face.primary(&mut img, WHITE, (w / 2, h / 2), 48.0, &product.code)?;
    face.secondary(&mut img, WHITE, (w / 2, h - 50), 18.0, &format!("€{}", product.price));

    draw_bars(&mut img, 10, (w / 2 - 95, h - 35), (15, 19), 15, WHITE);
    Ok(img)
}

fn paint_advanced(
    product: &Product,
    paper: Rgb<u8>,
    variant: Option<&str>,
    face: &Face,
) -> Result<RgbImage, RenderError> {
    let (w, h) = ADVANCED_SIZE;
    let mut img = RgbImage::from_pixel(w, h, paper);
    texture(&mut img, texture_seed(&product.code, variant.unwrap_or_default()));

    draw_hollow_rect_mut(
        &mut img,
        Rect::at(8, 8).of_size(w - 16, h - 16),
        Rgb([180, 180, 180]),
    );
    draw_part_pattern(&mut img, product.part_type, (w - 70, 150));

    face.secondary(&mut img, Rgb([40, 40, 40]), (w / 2, 40), 22.0, &product.name);
    draw_line_segment_mut(
        &mut img,
        (30.0, 70.0),
        ((w - 30) as f32, 70.0),
        Rgb([200, 200, 200]),
    );

    let code_centre = (w / 2, h / 2 - 20);
    let (tw, th) = face.size(60.0, &product.code)?;
    let box_margin = 15;
    let boxed = Rect::at(
        code_centre.0 as i32 - (tw / 2 + box_margin) as i32,
        code_centre.1 as i32 - (th / 2 + box_margin) as i32,
    )
    .of_size(tw + 2 * box_margin, th + 2 * box_margin);
    draw_filled_rect_mut(&mut img, boxed, Rgb([245, 245, 245]));
    draw_hollow_rect_mut(&mut img, boxed, Rgb([150, 150, 150]));
    face.primary(&mut img, BLACK, code_centre, 60.0, &product.code)?;

    face.secondary(
        &mut img,
        Rgb([60, 120, 200]),
        (w / 2, h / 2 + 50),
        16.0,
        &format!("Precio: €{}", product.price),
    );

    draw_bars(&mut img, 25, (w / 2 - 100, h - 75), (2, 30), 8, Rgb([100, 100, 100]));
    face.primary(&mut img, Rgb([100, 100, 100]), (w / 2, h - 25), 16.0, &product.code)?;
    Ok(img)
}

fn draw_bars(img: &mut RgbImage, count: u32, origin: (u32, u32), bar: (u32, u32), pitch: u32, colour: Rgb<u8>) {
    for i in 0..count {
        // Alternate widths so the strip reads as a barcode.
        let width = if i % 3 == 0 { bar.0 + 2 } else { bar.0 };
        let x = origin.0 + i * pitch;
        draw_filled_rect_mut(img, Rect::at(x as i32, origin.1 as i32).of_size(width, bar.1), colour);
    }
}

/// Paper grain: seeded noise and faint diagonal lines, softened by a blur.
fn texture(img: &mut RgbImage, seed: u64) {
    gaussian_noise_mut(img, 0.0, 6.0, seed);
    let (w, h) = img.dimensions();
    for offset in (0..w + h).step_by(8) {
        let start = (offset as f32, 0.0);
        let end = (offset as f32 - h as f32, h as f32);
        draw_line_segment_mut(img, start, end, Rgb([238, 238, 238]));
    }
    *img = gaussian_blur_f32(img, 1.0);
}

/// FNV-1a over code and variant so every label has its own stable grain.
fn texture_seed(code: &str, variant: &str) -> u64 {
    code.bytes()
        .chain([b'_'])
        .chain(variant.bytes())
        .fold(0xcbf2_9ce4_8422_2325, |hash, b| {
            (hash ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
        })
}

fn draw_part_pattern(img: &mut RgbImage, part: PartType, centre: (u32, u32)) {
    let (cx, cy) = (centre.0 as i32, centre.1 as i32);
    let line = Rgb([215, 215, 215]);
    match part {
        PartType::Screw => {
            for i in 0..6 {
                draw_hollow_circle_mut(img, (cx - 30 + i * 12, cy), 3, line);
            }
        }
        PartType::Washer => {
            draw_hollow_circle_mut(img, (cx, cy), 26, line);
            draw_hollow_circle_mut(img, (cx, cy), 10, line);
        }
        PartType::Nut => {
            let hexagon: Vec<Point<f32>> = (0..6)
                .map(|k| {
                    let angle = std::f32::consts::FRAC_PI_3 * k as f32;
                    Point::new(cx as f32 + 25.0 * angle.cos(), cy as f32 + 25.0 * angle.sin())
                })
                .collect();
            draw_hollow_polygon_mut(img, &hexagon, line);
            draw_hollow_circle_mut(img, (cx, cy), 10, line);
        }
        PartType::Bearing => {
            draw_hollow_circle_mut(img, (cx, cy), 20, line);
            for k in 0..8 {
                let angle = std::f32::consts::FRAC_PI_4 * k as f32;
                let (x, y) = (cx as f32 + 14.0 * angle.cos(), cy as f32 + 14.0 * angle.sin());
                draw_hollow_circle_mut(img, (x as i32, y as i32), 3, line);
            }
        }
        PartType::Cable => {
            for i in 0..8 {
                let x = (cx - 32 + i * 8) as f32;
                draw_line_segment_mut(img, (x, (cy - 5) as f32), (x + 4.0, (cy + 5) as f32), line);
            }
        }
    }
}

// ── Faces ────────────────────────────────────────────────────────────────────

/// A loaded font file or the built-in segment glyphs.
enum Face {
    File(FontVec),
    Builtin,
}

impl Face {
    fn load(resolution: &FontResolution) -> Result<Self, RenderError> {
        match resolution {
            FontResolution::Builtin => Ok(Face::Builtin),
            FontResolution::File(path) => {
                let bytes = fs::read(path).map_err(|e| RenderError::Font {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
                let font = FontVec::try_from_vec_and_index(bytes, 0).map_err(|e| RenderError::Font {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
                Ok(Face::File(font))
            }
        }
    }

    fn size(&self, px: f32, text: &str) -> Result<(u32, u32), RenderError> {
        match self {
            Face::File(font) => Ok(text_size(PxScale::from(px), font, text)),
            Face::Builtin => segments::size(px, text),
        }
    }

    /// Text that must appear on the label; fails when the face cannot draw it.
    fn primary(
        &self,
        img: &mut RgbImage,
        colour: Rgb<u8>,
        centre: (u32, u32),
        px: f32,
        text: &str,
    ) -> Result<(), RenderError> {
        let (tw, th) = self.size(px, text)?;
        let x = centre.0 as i32 - tw as i32 / 2;
        let y = centre.1 as i32 - th as i32 / 2;
        match self {
            Face::File(font) => draw_text_mut(img, colour, x, y, PxScale::from(px), font, text),
            Face::Builtin => segments::draw(img, colour, (x, y), px, text)?,
        }
        Ok(())
    }

    /// Decorative text; skipped by the built-in face.
    fn secondary(&self, img: &mut RgbImage, colour: Rgb<u8>, centre: (u32, u32), px: f32, text: &str) {
        if let Face::File(_) = self {
            // Sizing a file face never fails.
            let _ = self.primary(img, colour, centre, px, text);
        }
    }
}

/// Seven-segment digits drawn with filled rectangles.
mod segments {
    use image::{Rgb, RgbImage};
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    use crate::error::RenderError;

    // Segment bits: a=1 b=2 c=4 d=8 e=16 f=32 g=64.
    const DIGITS: [u8; 10] = [0x3F, 0x06, 0x5B, 0x4F, 0x66, 0x6D, 0x7D, 0x07, 0x7F, 0x6F];
    const G: u8 = 0x40;

    struct Metrics {
        height: u32,
        width: u32,
        stroke: u32,
    }

    impl Metrics {
        fn new(px: f32) -> Self {
            let height = (px * 0.7).round().max(8.0) as u32;
            Self {
                height,
                width: height / 2,
                stroke: (height / 8).max(1),
            }
        }

        fn advance(&self, c: char) -> Result<u32, RenderError> {
            match c {
                '0'..='9' | '-' => Ok(self.width + 2 * self.stroke),
                '.' => Ok(3 * self.stroke),
                ' ' => Ok(self.width),
                other => Err(RenderError::UnsupportedGlyph(other)),
            }
        }
    }

    pub(super) fn size(px: f32, text: &str) -> Result<(u32, u32), RenderError> {
        let m = Metrics::new(px);
        let mut width = 0;
        for c in text.chars() {
            width += m.advance(c)?;
        }
        Ok((width, m.height))
    }

    pub(super) fn draw(
        img: &mut RgbImage,
        colour: Rgb<u8>,
        origin: (i32, i32),
        px: f32,
        text: &str,
    ) -> Result<(), RenderError> {
        let m = Metrics::new(px);
        let mut x = origin.0;
        for c in text.chars() {
            let advance = m.advance(c)?;
            match c {
                '0'..='9' => glyph(img, colour, (x, origin.1), &m, DIGITS[c as usize - '0' as usize]),
                '-' => glyph(img, colour, (x, origin.1), &m, G),
                '.' => {
                    let s = m.stroke;
                    let y = origin.1 + (m.height - s) as i32;
                    draw_filled_rect_mut(img, Rect::at(x + s as i32, y).of_size(s, s), colour);
                }
                _ => {}
            }
            x += advance as i32;
        }
        Ok(())
    }

    fn glyph(img: &mut RgbImage, colour: Rgb<u8>, origin: (i32, i32), m: &Metrics, mask: u8) {
        let (x, y) = origin;
        let (w, h, t) = (m.width as i32, m.height as i32, m.stroke as i32);
        let half = h / 2;
        let bar = (m.width - 2 * m.stroke).max(1);
        let post = (m.height / 2).saturating_sub(m.stroke).max(1);
        let segments: [(u8, Rect); 7] = [
            (0x01, Rect::at(x + t, y).of_size(bar, m.stroke)),
            (0x02, Rect::at(x + w - t, y + t).of_size(m.stroke, post)),
            (0x04, Rect::at(x + w - t, y + half).of_size(m.stroke, post)),
            (0x08, Rect::at(x + t, y + h - t).of_size(bar, m.stroke)),
            (0x10, Rect::at(x, y + half).of_size(m.stroke, post)),
            (0x20, Rect::at(x, y + t).of_size(m.stroke, post)),
            (0x40, Rect::at(x + t, y + half - t / 2).of_size(bar, m.stroke)),
        ];
        for (bit, rect) in segments {
            if mask & bit != 0 {
                draw_filled_rect_mut(img, rect, colour);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin(background: Background) -> RenderingParams {
        RenderingParams {
            variant: Some("white_modern".into()),
            font_key: "sans".into(),
            font: FontResolution::Builtin,
            background,
        }
    }

    fn product(code: &str) -> Product {
        Product::new(code, "Tornillo M8x20", "0.50", "#FF6B6B", PartType::Screw)
    }

    #[test]
    fn parses_hex_colours() {
        assert_eq!(parse_hex("#FF6B6B").unwrap(), Rgb([255, 107, 107]));
        for bad in ["FF6B6B", "#FFF", "#GG0000", "#FF6B6B00"] {
            assert!(parse_hex(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn basic_label_has_expected_size() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("product_12345.png");
        let params = builtin(Background::Solid {
            colour: "#FF6B6B".into(),
        });
        LabelPainter.render(&product("12345"), &params, &out).unwrap();
        assert_eq!(image::image_dimensions(&out).unwrap(), BASIC_SIZE);
    }

    #[test]
    fn advanced_label_has_expected_size_and_code_ink() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("variants").join("12345_white_modern.png");
        let params = builtin(Background::Textured {
            colour: ADVANCED_BACKGROUND.into(),
        });
        LabelPainter.render(&product("12345"), &params, &out).unwrap();
        let img = image::open(&out).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), ADVANCED_SIZE);
        assert!(img.pixels().any(|p| p.0 == [0, 0, 0]), "code should be drawn in black");
    }

    #[test]
    fn builtin_face_rejects_letters_in_codes() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("product_AB12.png");
        let params = builtin(Background::Solid {
            colour: "#45B7D1".into(),
        });
        let err = LabelPainter.render(&product("AB12"), &params, &out).unwrap_err();
        assert!(matches!(err, RenderError::UnsupportedGlyph('A')), "{err:?}");
        assert!(!out.exists());
    }

    #[test]
    fn texture_seed_is_stable_and_distinct() {
        assert_eq!(texture_seed("12345", "white_modern"), texture_seed("12345", "white_modern"));
        assert_ne!(texture_seed("12345", "white_modern"), texture_seed("12345", "white_classic"));
    }

    #[test]
    fn missing_font_file_is_reported() {
        let err = Face::load(&FontResolution::File("/nonexistent/font.ttf".into())).err();
        assert!(matches!(err, Some(RenderError::Font { .. })));
    }
}
