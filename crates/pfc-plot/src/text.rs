//! ROOT-style `#latex` markup and font metrics.

use ab_glyph::{Font, FontRef, ScaleFont};

use crate::font::FontHandle;
use crate::primitives::TextStyle;

/// Size of super- and subscripts relative to the base text.
pub const SCRIPT_SCALE: f64 = 0.7;

#[derive(Debug, Clone, Copy)]
pub struct TextMetrics {
    pub width: f64,
    pub height: f64,
    pub ascent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shift {
    Normal,
    Super,
    Sub,
}

/// A run of text drawn at one baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub shift: Shift,
}

fn symbol(name: &str) -> Option<&'static str> {
    Some(match name {
        "alpha" => "α",
        "beta" => "β",
        "gamma" => "γ",
        "delta" => "δ",
        "Delta" => "Δ",
        "epsilon" => "ε",
        "eta" => "η",
        "theta" => "θ",
        "lambda" => "λ",
        "mu" => "μ",
        "pi" => "π",
        "sigma" => "σ",
        "Sigma" => "Σ",
        "tau" => "τ",
        "phi" => "φ",
        "chi" => "χ",
        "pm" => "±",
        "geq" => "≥",
        "leq" => "≤",
        "times" => "×",
        "to" => "→",
        "infty" => "∞",
        _ => return None,
    })
}

/// Split ROOT markup (`#sigma`, `x^{2}`, `p_{T}`) into spans.
///
/// Unknown `#name` sequences are kept verbatim.
pub fn parse_latex(src: &str) -> Vec<Span> {
    let mut spans: Vec<Span> = Vec::new();
    let push = |text: String, shift: Shift, spans: &mut Vec<Span>| {
        if text.is_empty() {
            return;
        }
        match spans.last_mut() {
            Some(last) if last.shift == shift => last.text.push_str(&text),
            _ => spans.push(Span { text, shift }),
        }
    };

    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    let mut shift = Shift::Normal;
    let mut depth = 0usize;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '#' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end].is_ascii_alphabetic() {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                match symbol(&name) {
                    Some(s) => push(s.to_string(), shift, &mut spans),
                    None => push(format!("#{name}"), shift, &mut spans),
                }
                i = end;
                continue;
            }
            '^' | '_' if depth == 0 && chars.get(i + 1) == Some(&'{') => {
                shift = if c == '^' { Shift::Super } else { Shift::Sub };
                depth = 1;
                i += 2;
                continue;
            }
            '{' if depth > 0 => depth += 1,
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    shift = Shift::Normal;
                    i += 1;
                    continue;
                }
            }
            _ => {}
        }
        push(c.to_string(), shift, &mut spans);
        i += 1;
    }
    spans
}

/// Markup with scripts flattened, for file names and logs.
pub fn to_plain(src: &str) -> String {
    parse_latex(src).into_iter().map(|s| s.text).collect()
}

/// Extent of a plain string in points, with kerning.
pub fn measure_text(font: &FontRef<'_>, text: &str, size_pt: f64) -> TextMetrics {
    let scaled = font.as_scaled(ab_glyph::PxScale::from(size_pt as f32));

    let mut width: f32 = 0.0;
    let mut prev = None;
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = prev {
            width += scaled.kern(prev, id);
        }
        width += scaled.h_advance(id);
        prev = Some(id);
    }

    let ascent = scaled.ascent();
    TextMetrics {
        width: f64::from(width),
        height: f64::from(ascent - scaled.descent()),
        ascent: f64::from(ascent),
    }
}

/// Extent of markup text: scripts are measured at their reduced size.
pub fn measure_styled(fonts: &FontHandle, text: &str, style: &TextStyle) -> TextMetrics {
    let font = fonts.select(style.bold, style.italic);
    let base = measure_text(font, "", style.size);
    let width = parse_latex(text)
        .iter()
        .map(|s| {
            let scale = if s.shift == Shift::Normal { 1.0 } else { SCRIPT_SCALE };
            measure_text(font, &s.text, style.size * scale).width
        })
        .sum();
    TextMetrics { width, ..base }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greek_and_scripts() {
        let spans = parse_latex("p_{T}^{gen} (#sigma #pm 1)");
        assert_eq!(
            spans,
            vec![
                Span { text: "p".into(), shift: Shift::Normal },
                Span { text: "T".into(), shift: Shift::Sub },
                Span { text: "gen".into(), shift: Shift::Super },
                Span { text: " (σ ± 1)".into(), shift: Shift::Normal },
            ]
        );
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(to_plain("E^{PF}/E^{gen}"), "EPF/Egen");
        assert_eq!(to_plain("#Delta R < 0.03"), "Δ R < 0.03");
        assert_eq!(to_plain("#foo"), "#foo");
        assert_eq!(to_plain("a^b"), "a^b");
    }

    #[test]
    fn glyph_shapes_set_the_width() {
        let fonts = FontHandle::embedded().unwrap();
        let wide = measure_text(&fonts.regular, "WWWWWWWWWW", 12.0).width;
        let narrow = measure_text(&fonts.regular, "iiiiiiiiii", 12.0).width;
        assert!(wide > 2.0 * narrow);
        let m = measure_text(&fonts.regular, "Hello", 12.0);
        assert!(m.width > 20.0 && m.height > 8.0 && m.ascent > 0.0);
    }

    #[test]
    fn scripts_are_narrower() {
        let fonts = FontHandle::embedded().unwrap();
        let style = TextStyle::default();
        let plain = measure_styled(&fonts, "Egen", &style).width;
        let scripted = measure_styled(&fonts, "E^{gen}", &style).width;
        assert!(scripted < plain);
        assert!(plain > 0.0);
        let bold = TextStyle { bold: true, ..TextStyle::default() };
        assert!(measure_styled(&fonts, "Egen", &bold).width > plain);
    }
}
