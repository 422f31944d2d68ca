//! Embedded DejaVu Sans faces.
//!
//! The same bytes back [`crate::text::measure_text`] and the PNG rasteriser,
//! so layout and rendering agree on every host.

use ab_glyph::FontRef;

use crate::RenderError;

/// Family name written into SVG `font-family` attributes.
pub const FAMILY: &str = "DejaVu Sans";

static DEJAVU_REGULAR: &[u8] = include_bytes!("../fonts/DejaVuSans.ttf");
static DEJAVU_BOLD: &[u8] = include_bytes!("../fonts/DejaVuSans-Bold.ttf");
static DEJAVU_OBLIQUE: &[u8] = include_bytes!("../fonts/DejaVuSans-Oblique.ttf");

#[derive(Clone)]
pub struct FontHandle {
    pub regular: FontRef<'static>,
    pub bold: FontRef<'static>,
    pub italic: FontRef<'static>,
}

impl FontHandle {
    pub fn embedded() -> crate::Result<Self> {
        let load = |bytes: &'static [u8]| {
            FontRef::try_from_slice(bytes).map_err(|e| RenderError::Font(e.to_string()))
        };
        Ok(Self {
            regular: load(DEJAVU_REGULAR)?,
            bold: load(DEJAVU_BOLD)?,
            italic: load(DEJAVU_OBLIQUE)?,
        })
    }

    /// Bold wins over italic; there is no bold-oblique face.
    pub fn select(&self, bold: bool, italic: bool) -> &FontRef<'static> {
        match (bold, italic) {
            (true, _) => &self.bold,
            (false, true) => &self.italic,
            (false, false) => &self.regular,
        }
    }

    /// Raw font files, for loading into the rasteriser's font database.
    pub fn font_data() -> [&'static [u8]; 3] {
        [DEJAVU_REGULAR, DEJAVU_BOLD, DEJAVU_OBLIQUE]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_faces_load() {
        let fonts = FontHandle::embedded().unwrap();
        let _ = fonts.select(true, true);
        assert!(FontHandle::font_data().iter().all(|b| b.len() > 100_000));
    }
}
