//! Photo location vocabulary
//!
//! Every stored photo is filed under one location of a subject. Most
//! locations hold exactly one photo; damage locations hold one batch per
//! damaged site.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::recognition::CaptureKind;

/// Prefix for damage locations, e.g. `damage@Front Wall`
const DAMAGE_PREFIX: &str = "damage@";

/// Site of the container a damage batch is tagged with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DamageSite {
    FrontWall,
    BackWall,
    LeftSide,
    RightSide,
    Roof,
    Floor,
    Doors,
}

impl DamageSite {
    pub const ALL: [DamageSite; 7] = [
        DamageSite::FrontWall,
        DamageSite::BackWall,
        DamageSite::LeftSide,
        DamageSite::RightSide,
        DamageSite::Roof,
        DamageSite::Floor,
        DamageSite::Doors,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DamageSite::FrontWall => "Front Wall",
            DamageSite::BackWall => "Back Wall",
            DamageSite::LeftSide => "Left Side",
            DamageSite::RightSide => "Right Side",
            DamageSite::Roof => "Roof",
            DamageSite::Floor => "Floor",
            DamageSite::Doors => "Doors",
        }
    }

    fn from_label(label: &str) -> Option<DamageSite> {
        let label = label.trim();
        DamageSite::ALL
            .into_iter()
            .find(|site| site.as_str().eq_ignore_ascii_case(label))
    }
}

/// Where on the subject a photo was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhotoLocation {
    FrontWall,
    BackWall,
    LeftSide,
    RightSide,
    Inside,
    Trailer,
    Truck,
    Driver,
    Damage(DamageSite),
}

/// Label outside the location vocabulary
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid location label: {0}")]
pub struct InvalidLocationLabel(pub String);

impl PhotoLocation {
    pub const SINGLETONS: [PhotoLocation; 8] = [
        PhotoLocation::FrontWall,
        PhotoLocation::BackWall,
        PhotoLocation::LeftSide,
        PhotoLocation::RightSide,
        PhotoLocation::Inside,
        PhotoLocation::Trailer,
        PhotoLocation::Truck,
        PhotoLocation::Driver,
    ];

    /// Parse a location label
    pub fn parse(label: &str) -> Result<PhotoLocation, InvalidLocationLabel> {
        let trimmed = label.trim();

        if let Some(site) = strip_prefix_ignore_case(trimmed, DAMAGE_PREFIX) {
            return DamageSite::from_label(site)
                .map(PhotoLocation::Damage)
                .ok_or_else(|| InvalidLocationLabel(label.to_string()));
        }

        PhotoLocation::SINGLETONS
            .into_iter()
            .find(|location| location.singleton_label().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| InvalidLocationLabel(label.to_string()))
    }

    /// Damage locations hold a batch, everything else a single photo
    pub fn is_set(&self) -> bool {
        matches!(self, PhotoLocation::Damage(_))
    }

    /// Canonical label, also used as the index key
    pub fn label(&self) -> String {
        match self {
            PhotoLocation::Damage(site) => format!("{}{}", DAMAGE_PREFIX, site.as_str()),
            other => other.singleton_label().to_string(),
        }
    }

    /// Path-safe form for blob keys
    pub fn slug(&self) -> String {
        match self {
            PhotoLocation::Damage(site) => {
                format!("damage-{}", site.as_str().to_lowercase().replace(' ', "-"))
            }
            other => other.singleton_label().to_string(),
        }
    }

    /// Which extraction a capture at this location runs
    pub fn default_capture_kind(&self) -> CaptureKind {
        match self {
            PhotoLocation::FrontWall => CaptureKind::ContainerFrontWall,
            PhotoLocation::Trailer => CaptureKind::Trailer,
            _ => CaptureKind::Generic,
        }
    }

    fn singleton_label(&self) -> &'static str {
        match self {
            PhotoLocation::FrontWall => "front-wall",
            PhotoLocation::BackWall => "back-wall",
            PhotoLocation::LeftSide => "left-side",
            PhotoLocation::RightSide => "right-side",
            PhotoLocation::Inside => "inside",
            PhotoLocation::Trailer => "trailer",
            PhotoLocation::Truck => "truck",
            PhotoLocation::Driver => "driver",
            PhotoLocation::Damage(_) => "damage",
        }
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        value.get(prefix.len()..)
    } else {
        None
    }
}

impl fmt::Display for PhotoLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for PhotoLocation {
    type Err = InvalidLocationLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PhotoLocation::parse(s)
    }
}

impl Serialize for PhotoLocation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

impl<'de> Deserialize<'de> for PhotoLocation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        label.parse().map_err(serde::de::Error::custom)
    }
}
