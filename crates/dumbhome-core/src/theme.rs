//! Theme derivation.
//!
//! The entire launcher theme hangs off a single user-chosen accent color:
//! primary text and icons use the accent unchanged, secondary text uses a
//! dimmed variant derived here. There is no per-screen override state.

use std::fmt;

use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};

/// Per-channel scale applied to the accent color for secondary text.
pub const DIM_FACTOR: f64 = 0.45;

/// A packed RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse a hex color string. Accepts `#rrggbb`, `rrggbb`, and the
    /// 3-digit shorthand (`#fff` -> `#ffffff`). Returns None if invalid.
    pub fn parse_hex(color: &str) -> Option<Self> {
        let color = color.trim().trim_start_matches('#');

        // Expand shorthand (e.g., "fff" -> "ffffff")
        let color = if color.len() == 3 {
            color.chars().flat_map(|c| [c, c]).collect::<String>()
        } else {
            color.to_string()
        };

        if color.len() != 6 {
            return None;
        }

        let r = u8::from_str_radix(&color[0..2], 16).ok()?;
        let g = u8::from_str_radix(&color[2..4], 16).ok()?;
        let b = u8::from_str_radix(&color[4..6], 16).ok()?;

        Some(Self { r, g, b })
    }

    /// Scale each channel by `factor`, rounding down.
    ///
    /// Pure: the same input always produces the same output, and for factors
    /// in [0, 1] every output channel is <= its input channel.
    pub fn scaled(self, factor: f64) -> Self {
        Self {
            r: (self.r as f64 * factor) as u8,
            g: (self.g as f64 * factor) as u8,
            b: (self.b as f64 * factor) as u8,
        }
    }

    /// The dimmed variant used for secondary text.
    pub fn dim(self) -> Self {
        self.scaled(DIM_FACTOR)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Color::parse_hex(&s)
            .ok_or_else(|| de::Error::custom(format!("invalid hex color '{}'", s)))
    }
}

/// Resolved foreground colors, derived from one accent color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    /// Primary text and icons.
    pub foreground: Color,
    /// Secondary text (date line, hints, weather).
    pub dim: Color,
}

impl Theme {
    pub fn from_accent(accent: Color) -> Self {
        Self {
            foreground: accent,
            dim: accent.dim(),
        }
    }
}
