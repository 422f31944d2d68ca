use std::fmt::Write as FmtWrite;

use crate::color::Color;
use crate::primitives::*;
use crate::font::{FAMILY, FontHandle};
use crate::text::{SCRIPT_SCALE, Shift, TextMetrics, measure_styled, parse_latex};

#[derive(Debug, Clone)]
enum SvgElement {
    Rect { x: f64, y: f64, w: f64, h: f64, style: Style },
    Line { x1: f64, y1: f64, x2: f64, y2: f64, style: LineStyle },
    Polyline { points: Vec<(f64, f64)>, style: LineStyle },
    Polygon { points: Vec<(f64, f64)>, style: Style },
    Text { x: f64, y: f64, content: String, style: TextStyle, rotate: Option<f64> },
    Circle { cx: f64, cy: f64, r: f64, style: Style },
}

/// Immediate-mode SVG canvas. Coordinates in points (1pt = 1/72").
pub struct Canvas {
    pub width: f64,
    pub height: f64,
    elements: Vec<(SvgElement, Option<usize>)>,
    clips: Vec<(f64, f64, f64, f64)>,
    active_clip: Option<usize>,
    fonts: FontHandle,
}

impl Canvas {
    pub fn new(width: f64, height: f64) -> crate::Result<Self> {
        if !(width > 0.0 && height > 0.0) {
            return Err(crate::RenderError::Layout(format!("bad canvas size {width}x{height}")));
        }
        Ok(Self {
            width,
            height,
            elements: Vec::new(),
            clips: Vec::new(),
            active_clip: None,
            fonts: FontHandle::embedded()?,
        })
    }

    // --- Drawing primitives ---

    pub fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, style: &Style) {
        self.push(SvgElement::Rect { x, y, w, h, style: style.clone() });
    }

    pub fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, style: &LineStyle) {
        self.push(SvgElement::Line { x1, y1, x2, y2, style: style.clone() });
    }

    pub fn polyline(&mut self, points: &[(f64, f64)], style: &LineStyle) {
        if points.len() > 1 {
            self.push(SvgElement::Polyline { points: points.to_vec(), style: style.clone() });
        }
    }

    pub fn polygon(&mut self, points: &[(f64, f64)], style: &Style) {
        self.push(SvgElement::Polygon { points: points.to_vec(), style: style.clone() });
    }

    /// Text with ROOT `#latex` markup.
    pub fn text(&mut self, x: f64, y: f64, content: &str, style: &TextStyle) {
        self.push(SvgElement::Text {
            x,
            y,
            content: content.to_string(),
            style: style.clone(),
            rotate: None,
        });
    }

    pub fn text_rotated(&mut self, x: f64, y: f64, content: &str, style: &TextStyle, angle: f64) {
        self.push(SvgElement::Text {
            x,
            y,
            content: content.to_string(),
            style: style.clone(),
            rotate: Some(angle),
        });
    }

    pub fn circle(&mut self, cx: f64, cy: f64, r: f64, style: &Style) {
        self.push(SvgElement::Circle { cx, cy, r, style: style.clone() });
    }

    /// Vertical error bar without caps.
    pub fn error_bar(&mut self, x: f64, y_lo: f64, y_hi: f64, style: &LineStyle) {
        self.line(x, y_lo, x, y_hi, style);
    }

    pub fn error_bar_h(&mut self, x_lo: f64, x_hi: f64, y: f64, style: &LineStyle) {
        self.line(x_lo, y, x_hi, y, style);
    }

    pub fn marker(&mut self, x: f64, y: f64, marker: &MarkerStyle) {
        self.circle(x, y, marker.size, &Style::filled(marker.color));
    }

    // --- Clip paths ---

    /// Clip everything drawn until [`Canvas::pop_clip`] to the rectangle.
    pub fn push_clip(&mut self, x: f64, y: f64, w: f64, h: f64) {
        self.clips.push((x, y, w, h));
        self.active_clip = Some(self.clips.len() - 1);
    }

    pub fn pop_clip(&mut self) {
        self.active_clip = None;
    }

    pub fn measure_text(&self, content: &str, style: &TextStyle) -> TextMetrics {
        measure_styled(&self.fonts, content, style)
    }

    // --- SVG output ---

    fn push(&mut self, elem: SvgElement) {
        self.elements.push((elem, self.active_clip));
    }

    pub fn finish_svg(&self) -> String {
        let mut out = String::with_capacity(32 * 1024);
        let _ = writeln!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = self.width,
            h = self.height,
        );

        if !self.clips.is_empty() {
            out.push_str("<defs>\n");
            for (i, (x, y, w, h)) in self.clips.iter().enumerate() {
                let _ = writeln!(
                    out,
                    r#"<clipPath id="clip{i}"><rect x="{x:.2}" y="{y:.2}" width="{w:.2}" height="{h:.2}" /></clipPath>"#
                );
            }
            out.push_str("</defs>\n");
        }

        let _ = writeln!(out, r#"<rect width="{}" height="{}" fill="white" />"#, self.width, self.height);

        for (elem, clip) in &self.elements {
            render_element(&mut out, elem, *clip);
        }

        out.push_str("</svg>\n");
        out
    }
}

fn escape_into(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

fn write_points(out: &mut String, points: &[(f64, f64)]) {
    for (i, (x, y)) in points.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{x:.2},{y:.2}");
    }
}

fn render_element(out: &mut String, elem: &SvgElement, clip: Option<usize>) {
    let clip_attr = clip.map(|i| format!(r#" clip-path="url(#clip{i})""#)).unwrap_or_default();
    match elem {
        SvgElement::Rect { x, y, w, h, style } => {
            let _ = write!(out, r#"<rect x="{x:.2}" y="{y:.2}" width="{w:.2}" height="{h:.2}""#);
            write_style_attrs(out, style);
            out.push_str(&clip_attr);
            out.push_str(" />\n");
        }
        SvgElement::Line { x1, y1, x2, y2, style } => {
            let _ = write!(out, r#"<line x1="{x1:.2}" y1="{y1:.2}" x2="{x2:.2}" y2="{y2:.2}""#);
            write_line_attrs(out, style);
            out.push_str(&clip_attr);
            out.push_str(" />\n");
        }
        SvgElement::Polyline { points, style } => {
            out.push_str(r#"<polyline points=""#);
            write_points(out, points);
            out.push_str(r#"" fill="none""#);
            write_line_attrs(out, style);
            out.push_str(&clip_attr);
            out.push_str(" />\n");
        }
        SvgElement::Polygon { points, style } => {
            out.push_str(r#"<polygon points=""#);
            write_points(out, points);
            out.push('"');
            write_style_attrs(out, style);
            out.push_str(&clip_attr);
            out.push_str(" />\n");
        }
        SvgElement::Text { x, y, content, style, rotate } => {
            let _ = write!(out, r#"<text x="{x:.2}" y="{y:.2}""#);
            let _ = write!(
                out,
                r#" font-family="{FAMILY}, sans-serif" font-size="{:.1}""#,
                style.size
            );
            let _ = write!(out, r#" fill="{}""#, style.color.to_svg_fill());
            let _ = write!(out, r#" text-anchor="{}""#, style.anchor.svg());
            let _ = write!(out, r#" dominant-baseline="{}""#, style.baseline.svg());
            if style.bold {
                out.push_str(r#" font-weight="bold""#);
            }
            if style.italic {
                out.push_str(r#" font-style="italic""#);
            }
            if let Some(angle) = rotate {
                let _ = write!(out, r#" transform="rotate({angle:.1},{x:.2},{y:.2})""#);
            }
            out.push('>');
            for span in parse_latex(content) {
                match span.shift {
                    Shift::Normal => escape_into(out, &span.text),
                    Shift::Super | Shift::Sub => {
                        let shift = if span.shift == Shift::Super { "super" } else { "sub" };
                        let _ = write!(
                            out,
                            r#"<tspan baseline-shift="{shift}" font-size="{:.1}">"#,
                            style.size * SCRIPT_SCALE
                        );
                        escape_into(out, &span.text);
                        out.push_str("</tspan>");
                    }
                }
            }
            out.push_str("</text>\n");
        }
        SvgElement::Circle { cx, cy, r, style } => {
            let _ = write!(out, r#"<circle cx="{cx:.2}" cy="{cy:.2}" r="{r:.2}""#);
            write_style_attrs(out, style);
            out.push_str(&clip_attr);
            out.push_str(" />\n");
        }
    }
}

fn write_style_attrs(out: &mut String, style: &Style) {
    match &style.fill {
        Some(fill) => {
            let _ = write!(out, r#" fill="{}""#, fill.to_svg_fill());
        }
        None => out.push_str(r#" fill="none""#),
    }
    if let Some(stroke) = &style.stroke {
        let _ = write!(out, r#" stroke="{}" stroke-width="{:.2}""#, stroke.to_svg_fill(), style.stroke_width);
    }
    if (style.opacity - 1.0).abs() > 1e-4 {
        let _ = write!(out, r#" opacity="{:.3}""#, style.opacity);
    }
}

fn write_line_attrs(out: &mut String, style: &LineStyle) {
    let _ = write!(out, r#" stroke="{}" stroke-width="{:.2}""#, style.color.to_svg_fill(), style.width);
    if let Some(dash) = &style.dash {
        let _ = write!(out, r#" stroke-dasharray="{dash}""#);
    }
}
