//! Container color palette
//!
//! Maps a sampled RGB value onto the fixed set of colors a container or
//! trailer can be recorded with. Classification is total: every input maps
//! to a palette label.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Allowed color names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorLabel {
    Red,
    Blue,
    Green,
    Yellow,
    Orange,
    White,
    Gray,
    Black,
    Brown,
    Beige,
}

impl ColorLabel {
    pub const ALL: [ColorLabel; 10] = [
        ColorLabel::Red,
        ColorLabel::Blue,
        ColorLabel::Green,
        ColorLabel::Yellow,
        ColorLabel::Orange,
        ColorLabel::White,
        ColorLabel::Gray,
        ColorLabel::Black,
        ColorLabel::Brown,
        ColorLabel::Beige,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ColorLabel::Red => "Red",
            ColorLabel::Blue => "Blue",
            ColorLabel::Green => "Green",
            ColorLabel::Yellow => "Yellow",
            ColorLabel::Orange => "Orange",
            ColorLabel::White => "White",
            ColorLabel::Gray => "Gray",
            ColorLabel::Black => "Black",
            ColorLabel::Brown => "Brown",
            ColorLabel::Beige => "Beige",
        }
    }

    /// Look up a label by name, accepting common spelling variants
    pub fn from_name(name: &str) -> Option<ColorLabel> {
        let normalized = name.trim().to_lowercase();
        let canonical = match normalized.as_str() {
            "grey" | "gray" => "gray",
            "tan" | "beige" => "beige",
            other => other,
        };
        ColorLabel::ALL
            .into_iter()
            .find(|label| label.as_str().eq_ignore_ascii_case(canonical))
    }
}

impl fmt::Display for ColorLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown color name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown color: {0}")]
pub struct UnknownColor(pub String);

impl FromStr for ColorLabel {
    type Err = UnknownColor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ColorLabel::from_name(s).ok_or_else(|| UnknownColor(s.to_string()))
    }
}

impl Serialize for ColorLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ColorLabel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Palette entry: centroid and acceptance radius
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaletteEntry {
    pub label: ColorLabel,
    pub rgb: (u8, u8, u8),
    pub tolerance: f64,
}

const fn entry(label: ColorLabel, rgb: (u8, u8, u8), tolerance: f64) -> PaletteEntry {
    PaletteEntry {
        label,
        rgb,
        tolerance,
    }
}

/// Typical container paint colors
pub const CONTAINER_PALETTE: [PaletteEntry; 10] = [
    entry(ColorLabel::Red, (170, 40, 35), 80.0),
    entry(ColorLabel::Blue, (30, 70, 140), 80.0),
    entry(ColorLabel::Green, (40, 110, 60), 75.0),
    entry(ColorLabel::Yellow, (225, 190, 40), 70.0),
    entry(ColorLabel::Orange, (225, 110, 30), 65.0),
    entry(ColorLabel::White, (235, 235, 230), 60.0),
    entry(ColorLabel::Gray, (128, 128, 128), 60.0),
    entry(ColorLabel::Black, (30, 30, 30), 60.0),
    entry(ColorLabel::Brown, (110, 65, 40), 60.0),
    entry(ColorLabel::Beige, (200, 180, 140), 55.0),
];

/// Nearest-palette color classifier
#[derive(Debug, Clone)]
pub struct ColorClassifier {
    palette: Vec<PaletteEntry>,
}

impl Default for ColorClassifier {
    fn default() -> Self {
        Self {
            palette: CONTAINER_PALETTE.to_vec(),
        }
    }
}

impl ColorClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_palette(palette: Vec<PaletteEntry>) -> Self {
        Self { palette }
    }

    /// Classify against the palette.
    ///
    /// Centroids whose tolerance covers the sample win by distance; when none
    /// does, the globally nearest centroid is used.
    pub fn classify(&self, rgb: (u8, u8, u8)) -> ColorLabel {
        let mut within: Option<(f64, ColorLabel)> = None;
        let mut nearest: Option<(f64, ColorLabel)> = None;

        for entry in &self.palette {
            let d = distance(rgb, entry.rgb);
            if d <= entry.tolerance && within.map_or(true, |(best, _)| d < best) {
                within = Some((d, entry.label));
            }
            if nearest.map_or(true, |(best, _)| d < best) {
                nearest = Some((d, entry.label));
            }
        }

        within
            .or(nearest)
            .map(|(_, label)| label)
            .unwrap_or(ColorLabel::Gray)
    }
}

fn distance(a: (u8, u8, u8), b: (u8, u8, u8)) -> f64 {
    let dr = a.0 as f64 - b.0 as f64;
    let dg = a.1 as f64 - b.1 as f64;
    let db = a.2 as f64 - b.2 as f64;
    (dr * dr + dg * dg + db * db).sqrt()
}
