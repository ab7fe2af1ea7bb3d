//! Categorical labels produced by local spatial statistics.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Moran scatterplot quadrant: the sign of an area's standardized value
/// against the sign of its spatial lag.
///
/// A value counts as high only when strictly positive. When both the
/// value and the lag are exactly zero there is no quadrant.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
pub enum Quadrant {
    /// High value, high neighborhood (hot spot).
    #[serde(rename = "HH")]
    #[strum(serialize = "HH")]
    HighHigh = 1,
    /// Low value, high neighborhood (spatial outlier).
    #[serde(rename = "LH")]
    #[strum(serialize = "LH")]
    LowHigh = 2,
    /// Low value, low neighborhood (cold spot).
    #[serde(rename = "LL")]
    #[strum(serialize = "LL")]
    LowLow = 3,
    /// High value, low neighborhood (spatial outlier).
    #[serde(rename = "HL")]
    #[strum(serialize = "HL")]
    HighLow = 4,
}

impl Quadrant {
    /// Numeric quadrant code (1 = HH, 2 = LH, 3 = LL, 4 = HL).
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Classifies a standardized value and its spatial lag.
    ///
    /// Exact zeros count as low; `None` only when both are exactly zero.
    #[must_use]
    pub fn from_signs(value: f64, lag: f64) -> Option<Self> {
        if value == 0.0 && lag == 0.0 {
            return None;
        }
        Some(match (value > 0.0, lag > 0.0) {
            (true, true) => Self::HighHigh,
            (false, true) => Self::LowHigh,
            (false, false) => Self::LowLow,
            (true, false) => Self::HighLow,
        })
    }

    /// Whether the area's own value is high.
    #[must_use]
    pub const fn is_high(self) -> bool {
        matches!(self, Self::HighHigh | Self::HighLow)
    }

    /// Whether this quadrant marks a spatial outlier (LH or HL).
    #[must_use]
    pub const fn is_outlier(self) -> bool {
        matches!(self, Self::LowHigh | Self::HighLow)
    }
}

/// Final per-area label after the significance filter.
///
/// Declaration order is the display order used for cross-tabulations.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
pub enum ClusterLabel {
    /// Significant high-high cluster.
    #[serde(rename = "HH")]
    #[strum(serialize = "HH")]
    HighHigh,
    /// Significant low-high outlier.
    #[serde(rename = "LH")]
    #[strum(serialize = "LH")]
    LowHigh,
    /// Significant high-low outlier.
    #[serde(rename = "HL")]
    #[strum(serialize = "HL")]
    HighLow,
    /// Significant low-low cluster.
    #[serde(rename = "LL")]
    #[strum(serialize = "LL")]
    LowLow,
    /// Pseudo p-value at or above the significance threshold.
    #[serde(rename = "NS")]
    #[strum(serialize = "NS")]
    NotSignificant,
    /// No quadrant (value and lag both zero) or no neighbors to compare.
    #[serde(rename = "UD")]
    #[strum(serialize = "UD")]
    Undefined,
}

impl ClusterLabel {
    /// Combines a quadrant with the outcome of the significance test.
    #[must_use]
    pub const fn from_quadrant(quadrant: Option<Quadrant>, significant: bool) -> Self {
        match (quadrant, significant) {
            (None, _) => Self::Undefined,
            (Some(_), false) => Self::NotSignificant,
            (Some(Quadrant::HighHigh), true) => Self::HighHigh,
            (Some(Quadrant::LowHigh), true) => Self::LowHigh,
            (Some(Quadrant::LowLow), true) => Self::LowLow,
            (Some(Quadrant::HighLow), true) => Self::HighLow,
        }
    }

    /// The quadrant behind a significant label.
    #[must_use]
    pub const fn quadrant(self) -> Option<Quadrant> {
        match self {
            Self::HighHigh => Some(Quadrant::HighHigh),
            Self::LowHigh => Some(Quadrant::LowHigh),
            Self::LowLow => Some(Quadrant::LowLow),
            Self::HighLow => Some(Quadrant::HighLow),
            Self::NotSignificant | Self::Undefined => None,
        }
    }
}

/// How an area's need cluster lines up with its demand cluster.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Alignment {
    /// High need (HH/HL) with low demand (LH/LL).
    Underserved,
    /// Low need (LH/LL) with high demand (HH/HL).
    Misaligned,
    /// Need and demand agree.
    Aligned,
    /// Either side is not significant or undefined.
    NotSignificant,
}

impl Alignment {
    /// Classifies a (need, demand) label pair.
    #[must_use]
    pub const fn classify(need: ClusterLabel, demand: ClusterLabel) -> Self {
        match (need.quadrant(), demand.quadrant()) {
            (Some(n), Some(d)) => match (n.is_high(), d.is_high()) {
                (true, false) => Self::Underserved,
                (false, true) => Self::Misaligned,
                _ => Self::Aligned,
            },
            _ => Self::NotSignificant,
        }
    }
}
