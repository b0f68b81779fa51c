//! Pen colors.

use peniko::Color;
use serde::{Deserialize, Serialize};

/// Straight-alpha RGBA8 color used for pen strokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PenColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl PenColor {
    pub const BLACK: Self = Self::new(0, 0, 0, 255);
    pub const WHITE: Self = Self::new(255, 255, 255, 255);
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa` (the leading `#` is optional).
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return None;
        }
        let byte = |s: &str| u8::from_str_radix(s, 16).ok();

        match hex.len() {
            3 => {
                let mut channels = [0u8; 3];
                for (i, c) in hex.chars().enumerate() {
                    let v = c.to_digit(16)? as u8;
                    channels[i] = v * 17;
                }
                Some(Self::rgb(channels[0], channels[1], channels[2]))
            }
            6 => Some(Self::rgb(byte(&hex[0..2])?, byte(&hex[2..4])?, byte(&hex[4..6])?)),
            8 => Some(Self::new(
                byte(&hex[0..2])?,
                byte(&hex[2..4])?,
                byte(&hex[4..6])?,
                byte(&hex[6..8])?,
            )),
            _ => None,
        }
    }

    /// Format as `#rrggbb`, or `#rrggbbaa` when not fully opaque.
    pub fn to_hex(self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl Default for PenColor {
    fn default() -> Self {
        Self::BLACK
    }
}

impl From<Color> for PenColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self::new(rgba.r, rgba.g, rgba.b, rgba.a)
    }
}

impl From<PenColor> for Color {
    fn from(color: PenColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// Swatches offered by the color picker.
pub const PALETTE: [PenColor; 8] = [
    PenColor::BLACK,
    PenColor::rgb(239, 68, 68),   // red
    PenColor::rgb(249, 115, 22),  // orange
    PenColor::rgb(234, 179, 8),   // yellow
    PenColor::rgb(34, 197, 94),   // green
    PenColor::rgb(59, 130, 246),  // blue
    PenColor::rgb(168, 85, 247),  // purple
    PenColor::rgb(236, 72, 153),  // pink
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_parsing() {
        assert_eq!(PenColor::from_hex("#000000"), Some(PenColor::BLACK));
        assert_eq!(PenColor::from_hex("fff"), Some(PenColor::WHITE));
        assert_eq!(
            PenColor::from_hex("#ec489980"),
            Some(PenColor::new(236, 72, 153, 128))
        );
        assert_eq!(PenColor::from_hex("#12345"), None);
        assert_eq!(PenColor::from_hex("#gg0000"), None);
    }

    #[test]
    fn test_hex_formatting() {
        assert_eq!(PenColor::BLACK.to_hex(), "#000000");
        assert_eq!(PenColor::new(1, 2, 3, 4).to_hex(), "#01020304");
    }

    #[test]
    fn test_peniko_conversion() {
        let color: Color = PenColor::rgb(59, 130, 246).into();
        assert_eq!(PenColor::from(color), PenColor::rgb(59, 130, 246));
    }
}
