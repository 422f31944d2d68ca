use serde::Deserialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Parse `#rrggbb`; malformed components read as zero.
    pub fn hex(s: &str) -> Self {
        let s = s.strip_prefix('#').unwrap_or(s);
        let part = |i: usize| s.get(i..i + 2).and_then(|p| u8::from_str_radix(p, 16).ok()).unwrap_or(0);
        Self { r: part(0), g: part(2), b: part(4), a: 1.0 }
    }

    pub const fn with_alpha(mut self, a: f64) -> Self {
        self.a = a;
        self
    }

    pub fn to_svg_fill(&self) -> String {
        if (self.a - 1.0).abs() < 1e-6 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("rgba({},{},{},{:.3})", self.r, self.g, self.b, self.a)
        }
    }

    /// Colour of a ROOT palette index (`kBlack = 1`, `kOrange = 800`, ...).
    ///
    /// Indices outside the handful used by the analyses map to mid grey.
    pub fn root(index: i32) -> Self {
        match index {
            0 => Color::WHITE,
            1 => Color::BLACK,
            2 => Color::rgb(255, 0, 0),
            3 => Color::rgb(0, 255, 0),
            4 => Color::rgb(0, 0, 255),
            5 => Color::rgb(255, 255, 0),
            6 => Color::rgb(255, 0, 255),
            7 => Color::rgb(0, 255, 255),
            8 => Color::rgb(89, 212, 84),
            9 => Color::rgb(89, 84, 217),
            40 => Color::rgb(171, 171, 207),
            42 => Color::rgb(212, 166, 138),
            46 => Color::rgb(207, 92, 97),
            49 => Color::rgb(204, 204, 255),
            800 => Color::rgb(255, 204, 0),
            860 => Color::rgb(0, 102, 255),
            920 => Color::rgb(204, 204, 204),
            _ => Color::rgb(128, 128, 128),
        }
    }
}

/// ROOT colour indices used by the plot recipes.
pub mod root {
    pub const WHITE: i32 = 0;
    pub const BLACK: i32 = 1;
    pub const RED: i32 = 2;
    pub const GREEN: i32 = 3;
    pub const BLUE: i32 = 4;
    pub const MAGENTA: i32 = 6;
    pub const DARK_GREEN: i32 = 8;
    pub const ORANGE: i32 = 800;
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_svg_fill())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Color::hex(&s))
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_parsing() {
        let c = Color::hex("#1D4ED8");
        assert_eq!((c.r, c.g, c.b), (0x1D, 0x4E, 0xD8));
        assert_eq!(Color::hex("#12").b, 0);
    }

    #[test]
    fn svg_fill() {
        assert_eq!(Color::rgb(29, 78, 216).to_svg_fill(), "#1d4ed8");
        assert_eq!(Color::rgb(29, 78, 216).with_alpha(0.5).to_svg_fill(), "rgba(29,78,216,0.500)");
    }

    #[test]
    fn root_indices() {
        assert_eq!(Color::root(root::BLACK), Color::BLACK);
        assert_eq!(Color::root(root::RED), Color::rgb(255, 0, 0));
        assert_eq!(Color::root(root::ORANGE), Color::rgb(255, 204, 0));
        assert_eq!(Color::root(12345), Color::rgb(128, 128, 128));
    }
}
