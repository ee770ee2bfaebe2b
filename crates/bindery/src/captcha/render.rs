//! CAPTCHA image rendering.
//!
//! Renderers turn a code into a data URI. The text drawn is exactly the code;
//! only the noise and jitter around it are random.

use base64::{Engine, engine::general_purpose::STANDARD};
use image::{ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::draw_line_segment_mut;
use rand::Rng;
use rusttype::{Font, Scale, point};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

/// Image size used by both renderers
const WIDTH: u32 = 280;
const HEIGHT: u32 = 90;

/// Noise lines drawn behind the text
const NOISE_LINES: usize = 15;

/// Where common distributions install DejaVu Sans
pub const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/usr/local/share/fonts/DejaVuSans.ttf",
];

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("font has no glyph for {0:?}")]
    MissingGlyph(char),

    #[error("image encoding failed: {0}")]
    Encode(String),
}

/// Turns a code into an image the user can read
pub trait CaptchaRenderer: Send + Sync {
    /// Returns a `data:` URI
    fn render(&self, code: &str) -> Result<String, RenderError>;
}

/// PNG renderer using a TrueType font
pub struct RasterRenderer {
    font: Font<'static>,
    width: u32,
    height: u32,
}

impl RasterRenderer {
    /// Load the font used for glyphs
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("Failed to read CAPTCHA font {}: {}", path.display(), e))?;
        Self::from_bytes(data)
            .ok_or_else(|| anyhow::anyhow!("{} is not a usable TrueType font", path.display()))
    }

    /// Load `preferred`, falling back to the first usable font in `fallbacks`
    pub fn locate<P: AsRef<Path>>(preferred: &Path, fallbacks: &[P]) -> anyhow::Result<Self> {
        let preferred_err = match Self::from_file(preferred) {
            Ok(renderer) => return Ok(renderer),
            Err(e) => e,
        };

        for candidate in fallbacks {
            let candidate: &Path = candidate.as_ref();
            if !candidate.is_file() {
                continue;
            }
            match Self::from_file(candidate) {
                Ok(renderer) => {
                    tracing::warn!(
                        configured = ?preferred,
                        using = ?candidate,
                        "Configured CAPTCHA font unavailable, using fallback"
                    );
                    return Ok(renderer);
                }
                Err(e) => tracing::debug!(font = ?candidate, error = %e, "Skipping fallback font"),
            }
        }

        Err(preferred_err.context(format!(
            "no fallback font found in {} candidate locations",
            fallbacks.len()
        )))
    }

    pub fn from_bytes(data: Vec<u8>) -> Option<Self> {
        Font::try_from_vec(data).map(|font| Self {
            font,
            width: WIDTH,
            height: HEIGHT,
        })
    }
}

impl CaptchaRenderer for RasterRenderer {
    fn render(&self, code: &str) -> Result<String, RenderError> {
        let mut rng = rand::rng();
        let mut canvas = RgbaImage::from_pixel(self.width, self.height, Rgba([26, 26, 46, 255]));

        for _ in 0..NOISE_LINES {
            let start = (
                rng.random_range(0.0..self.width as f32),
                rng.random_range(0.0..self.height as f32),
            );
            let end = (
                rng.random_range(0.0..self.width as f32),
                rng.random_range(0.0..self.height as f32),
            );
            let shade = rng.random_range(60..120u8);
            draw_line_segment_mut(&mut canvas, start, end, Rgba([shade, shade, shade, 255]));
        }

        let scale = Scale::uniform(self.height as f32 * 0.6);
        let advance = self.width as f32 / (code.chars().count() as f32 + 1.0);

        for (i, c) in code.chars().enumerate() {
            let glyph = self.font.glyph(c);
            if glyph.id().0 == 0 {
                return Err(RenderError::MissingGlyph(c));
            }

            let x = advance * (i as f32 + 0.6);
            let baseline = self.height as f32 * 0.7 + rng.random_range(-8.0..8.0);
            let glyph = glyph.scaled(scale).positioned(point(x, baseline));
            let color = [
                rng.random_range(150..=255u8),
                rng.random_range(150..=255u8),
                rng.random_range(150..=255u8),
            ];

            let Some(bounds) = glyph.pixel_bounding_box() else {
                continue;
            };
            glyph.draw(|gx, gy, coverage| {
                let px = gx as i32 + bounds.min.x;
                let py = gy as i32 + bounds.min.y;
                if px < 0 || py < 0 || px >= self.width as i32 || py >= self.height as i32 {
                    return;
                }
                let pixel = canvas.get_pixel_mut(px as u32, py as u32);
                let alpha = coverage.clamp(0.0, 1.0);
                for (channel, target) in pixel.0.iter_mut().zip(color) {
                    *channel = (*channel as f32 * (1.0 - alpha) + target as f32 * alpha) as u8;
                }
            });
        }

        let mut png = Cursor::new(Vec::new());
        canvas
            .write_to(&mut png, ImageFormat::Png)
            .map_err(|e| RenderError::Encode(e.to_string()))?;

        Ok(format!(
            "data:image/png;base64,{}",
            STANDARD.encode(png.into_inner())
        ))
    }
}

/// Vector renderer with no font dependency.
///
/// The characters are plain SVG text, so this is for development and tests
/// rather than for facing real bots.
#[derive(Default)]
pub struct SvgRenderer;

impl CaptchaRenderer for SvgRenderer {
    fn render(&self, code: &str) -> Result<String, RenderError> {
        let mut rng = rand::rng();

        let mut svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}">"#,
            WIDTH, HEIGHT
        );

        // Background
        svg.push_str(r##"<rect width="100%" height="100%" fill="#1a1a2e"/>"##);

        // Noise lines
        for _ in 0..NOISE_LINES {
            let x1 = rng.random_range(0..WIDTH);
            let y1 = rng.random_range(0..HEIGHT);
            let x2 = rng.random_range(0..WIDTH);
            let y2 = rng.random_range(0..HEIGHT);
            let opacity = rng.random_range(20..50);
            svg.push_str(&format!(
                r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="rgba(255,255,255,0.{})" stroke-width="1"/>"#,
                x1, y1, x2, y2, opacity
            ));
        }

        // Text characters with slight randomization
        let char_width = WIDTH as f32 / (code.chars().count() as f32 + 1.0);
        for (i, c) in code.chars().enumerate() {
            let x = char_width * (i as f32 + 0.8);
            let y = 58 + rng.random_range(-10..10);
            let rotation = rng.random_range(-15..15);
            let color = format!(
                "rgb({},{},{})",
                rng.random_range(150..255),
                rng.random_range(150..255),
                rng.random_range(150..255)
            );

            svg.push_str(&format!(
                r#"<text x="{}" y="{}" font-family="monospace" font-size="40" font-weight="bold" fill="{}" transform="rotate({} {} {})">{}</text>"#,
                x, y, color, rotation, x, y, c
            ));
        }

        svg.push_str("</svg>");

        Ok(format!("data:image/svg+xml;base64,{}", STANDARD.encode(&svg)))
    }
}
