//! Glyph rasterization over an in-memory font face.
//!
//! Rasterized glyphs are cached by `(code point, size)` with the size
//! quantized to 0.1 px, so repeated requests never re-rasterize. The
//! active pixel size is a mutable property of the rasterizer; one-off
//! sizes (icon requests) set it, rasterize and restore it.

use rusttype::{point, Font, GlyphId, Scale};
use std::collections::HashMap;

use crate::text_layout::decode_utf8;

#[derive(Debug)]
pub enum FontError {
    InvalidFontData,
    InvalidPixelSize,
}

impl std::fmt::Display for FontError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FontError::InvalidFontData => write!(f, "font data is not a parsable face"),
            FontError::InvalidPixelSize => write!(f, "pixel size must be positive"),
        }
    }
}

impl std::error::Error for FontError {}

/// A rasterized glyph: 8-bit coverage bitmap plus metrics.
///
/// `bearing_y` is the distance from the baseline up to the bitmap's top
/// edge; `bearing_x` from the pen position to its left edge.
#[derive(Clone, Debug, Default)]
pub struct GlyphInfo {
    pub width: i32,
    pub height: i32,
    pub bearing_x: i32,
    pub bearing_y: i32,
    pub advance_x: f32,
    pub bitmap: Vec<u8>,
}

/// Pack `(code point, size)` into the cache key: high 32 bits carry the
/// size in tenths of a pixel, low 32 bits the code point.
#[inline]
pub fn glyph_cache_key(codepoint: u32, size: f32) -> u64 {
    (u64::from((size * 10.0).round() as u32) << 32) | u64::from(codepoint)
}

/// Walk `text` accumulating advances (plus kerning between neighbors) as
/// floats, stopping before the total would exceed `max_width` when it is
/// positive. Returns the accumulated width and the number of input bytes
/// consumed, so callers can resume from that offset.
///
/// Decoding stops silently at the first malformed UTF-8 boundary.
pub fn measure_advances<A, K>(
    text: &str,
    max_width: f32,
    mut advance: A,
    mut kerning: K,
) -> (f32, usize)
where
    A: FnMut(u32) -> f32,
    K: FnMut(u32, u32) -> f32,
{
    let bytes = text.as_bytes();
    let mut total = 0.0f32;
    let mut pos = 0usize;
    let mut prev: Option<u32> = None;

    while pos < bytes.len() {
        let Some((codepoint, len)) = decode_utf8(&bytes[pos..]) else {
            break;
        };

        let mut width = advance(codepoint);
        if let Some(prev_cp) = prev {
            width += kerning(prev_cp, codepoint);
        }

        if max_width > 0.0 && total + width > max_width {
            break;
        }

        total += width;
        prev = Some(codepoint);
        pos += len;
    }

    (total, pos)
}

pub struct FontRasterizer {
    font: Font<'static>,
    pixel_size: f32,
    glyph_cache: HashMap<u64, GlyphInfo>,
}

impl FontRasterizer {
    /// Load a face from an owned font buffer.
    pub fn from_bytes(data: Vec<u8>, pixel_size: f32) -> Result<Self, FontError> {
        if pixel_size <= 0.0 {
            return Err(FontError::InvalidPixelSize);
        }
        let font = Font::try_from_vec(data).ok_or(FontError::InvalidFontData)?;
        log::info!("loaded font face ({} glyphs) at {}px", font.glyph_count(), pixel_size);
        Ok(Self {
            font,
            pixel_size,
            glyph_cache: HashMap::new(),
        })
    }

    pub fn pixel_size(&self) -> f32 {
        self.pixel_size
    }

    pub fn set_pixel_size(&mut self, pixel_size: f32) {
        if pixel_size > 0.0 {
            self.pixel_size = pixel_size;
        }
    }

    /// Run `f` with the active size temporarily set to `pixel_size`; the
    /// previous size is restored afterwards.
    pub fn with_pixel_size<R>(&mut self, pixel_size: f32, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = self.pixel_size;
        self.set_pixel_size(pixel_size);
        let result = f(self);
        self.pixel_size = previous;
        result
    }

    /// Line height in pixels at the current size.
    pub fn font_height(&self) -> i32 {
        let metrics = self.font.v_metrics(self.scale());
        (metrics.ascent - metrics.descent + metrics.line_gap).ceil() as i32
    }

    /// Baseline offset from the top of a line, in pixels.
    pub fn baseline(&self) -> i32 {
        self.font.v_metrics(self.scale()).ascent.ceil() as i32
    }

    /// Rasterize `codepoint` at `size`, or return the cached result.
    ///
    /// Unmapped code points fall through to the face's `.notdef` glyph;
    /// zero-area glyphs (spaces) cache an empty bitmap with metrics.
    pub fn render_glyph(&mut self, codepoint: u32, size: f32) -> Option<&GlyphInfo> {
        let key = glyph_cache_key(codepoint, size);
        if !self.glyph_cache.contains_key(&key) {
            let info = self.with_pixel_size(size, |this| this.rasterize(codepoint));
            self.glyph_cache.insert(key, info);
        }
        self.glyph_cache.get(&key)
    }

    /// Measure a UTF-8 string at the current size.
    ///
    /// See [`measure_advances`] for the walk/stop semantics. Kerning is
    /// applied between adjacent glyphs where the face provides it.
    pub fn measure_string(&self, text: &str, max_width: f32) -> (f32, usize) {
        let scale = self.scale();
        measure_advances(
            text,
            max_width,
            |cp| {
                self.font
                    .glyph(Self::glyph_id(&self.font, cp))
                    .scaled(scale)
                    .h_metrics()
                    .advance_width
            },
            |prev, cp| match (char::from_u32(prev), char::from_u32(cp)) {
                (Some(a), Some(b)) => self.font.pair_kerning(scale, a, b),
                _ => 0.0,
            },
        )
    }

    pub fn measure_text_width(&self, text: &str) -> f32 {
        self.measure_string(text, 0.0).0
    }

    pub fn cached_glyphs(&self) -> usize {
        self.glyph_cache.len()
    }

    pub fn clear_cache(&mut self) {
        self.glyph_cache.clear();
    }

    fn scale(&self) -> Scale {
        Scale::uniform(self.pixel_size)
    }

    fn glyph_id(font: &Font<'static>, codepoint: u32) -> GlyphId {
        match char::from_u32(codepoint) {
            Some(ch) => font.glyph(ch).id(),
            None => GlyphId(0),
        }
    }

    fn rasterize(&self, codepoint: u32) -> GlyphInfo {
        let scale = self.scale();
        let glyph = self
            .font
            .glyph(Self::glyph_id(&self.font, codepoint))
            .scaled(scale);
        let advance_x = glyph.h_metrics().advance_width;
        let positioned = glyph.positioned(point(0.0, 0.0));

        let Some(bb) = positioned.pixel_bounding_box() else {
            // Whitespace and other blank glyphs still carry an advance.
            return GlyphInfo {
                advance_x,
                ..GlyphInfo::default()
            };
        };

        let width = bb.max.x - bb.min.x;
        let height = bb.max.y - bb.min.y;
        let mut bitmap = vec![0u8; (width * height).max(0) as usize];
        positioned.draw(|x, y, coverage| {
            let index = y as usize * width as usize + x as usize;
            bitmap[index] = (coverage * 255.0) as u8;
        });

        GlyphInfo {
            width,
            height,
            bearing_x: bb.min.x,
            bearing_y: -bb.min.y,
            advance_x,
            bitmap,
        }
    }
}
