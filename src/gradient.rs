//! Gradient classification for the elevation profile.
//!
//! Each bucket carries its own display metadata (label, colour, direction)
//! so the presentation layer renders from the variant instead of repeating
//! numeric thresholds.
//!
//! | Bucket | Absolute gradient |
//! |--------|-------------------|
//! | Flat | ≤ 0.5% |
//! | Gentle | ≤ 3% |
//! | Moderate | ≤ 6% |
//! | Steep | ≤ 10% |
//! | Very steep | > 10% |

use serde::{Deserialize, Serialize};

/// Upper bounds (inclusive, absolute percent) of the non-flat buckets.
const FLAT_MAX_PCT: f64 = 0.5;
const GENTLE_MAX_PCT: f64 = 3.0;
const MODERATE_MAX_PCT: f64 = 6.0;
const STEEP_MAX_PCT: f64 = 10.0;

/// Whether a segment climbs, descends or is level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradientDirection {
    Ascent,
    Level,
    Descent,
}

/// Signed steepness class of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradientBucket {
    VerySteepDescent,
    SteepDescent,
    ModerateDescent,
    GentleDescent,
    Flat,
    GentleAscent,
    ModerateAscent,
    SteepAscent,
    VerySteepAscent,
}

impl GradientBucket {
    /// All buckets, from steepest descent to steepest ascent (legend order).
    pub const ALL: [GradientBucket; 9] = [
        GradientBucket::VerySteepDescent,
        GradientBucket::SteepDescent,
        GradientBucket::ModerateDescent,
        GradientBucket::GentleDescent,
        GradientBucket::Flat,
        GradientBucket::GentleAscent,
        GradientBucket::ModerateAscent,
        GradientBucket::SteepAscent,
        GradientBucket::VerySteepAscent,
    ];

    /// Classify a gradient in percent. Non-finite input is treated as flat.
    pub fn classify(gradient_pct: f64) -> Self {
        if !gradient_pct.is_finite() {
            return GradientBucket::Flat;
        }
        let magnitude = gradient_pct.abs();
        if magnitude <= FLAT_MAX_PCT {
            return GradientBucket::Flat;
        }

        let ascent = gradient_pct > 0.0;
        match (magnitude, ascent) {
            (m, true) if m <= GENTLE_MAX_PCT => GradientBucket::GentleAscent,
            (m, true) if m <= MODERATE_MAX_PCT => GradientBucket::ModerateAscent,
            (m, true) if m <= STEEP_MAX_PCT => GradientBucket::SteepAscent,
            (_, true) => GradientBucket::VerySteepAscent,
            (m, false) if m <= GENTLE_MAX_PCT => GradientBucket::GentleDescent,
            (m, false) if m <= MODERATE_MAX_PCT => GradientBucket::ModerateDescent,
            (m, false) if m <= STEEP_MAX_PCT => GradientBucket::SteepDescent,
            (_, false) => GradientBucket::VerySteepDescent,
        }
    }

    pub fn direction(&self) -> GradientDirection {
        match self {
            GradientBucket::Flat => GradientDirection::Level,
            GradientBucket::GentleAscent
            | GradientBucket::ModerateAscent
            | GradientBucket::SteepAscent
            | GradientBucket::VerySteepAscent => GradientDirection::Ascent,
            _ => GradientDirection::Descent,
        }
    }

    /// Human-readable label for legends and tooltips.
    pub fn label(&self) -> &'static str {
        match self {
            GradientBucket::VerySteepDescent => "Very steep descent",
            GradientBucket::SteepDescent => "Steep descent",
            GradientBucket::ModerateDescent => "Moderate descent",
            GradientBucket::GentleDescent => "Gentle descent",
            GradientBucket::Flat => "Flat",
            GradientBucket::GentleAscent => "Gentle climb",
            GradientBucket::ModerateAscent => "Moderate climb",
            GradientBucket::SteepAscent => "Steep climb",
            GradientBucket::VerySteepAscent => "Very steep climb",
        }
    }

    /// Fill colour for the profile segment (CSS hex).
    ///
    /// Climbs go green to dark red, descents use blues.
    pub fn color(&self) -> &'static str {
        match self {
            GradientBucket::VerySteepDescent => "#1e3a8a",
            GradientBucket::SteepDescent => "#2563eb",
            GradientBucket::ModerateDescent => "#60a5fa",
            GradientBucket::GentleDescent => "#bfdbfe",
            GradientBucket::Flat => "#9ca3af",
            GradientBucket::GentleAscent => "#22c55e",
            GradientBucket::ModerateAscent => "#eab308",
            GradientBucket::SteepAscent => "#f97316",
            GradientBucket::VerySteepAscent => "#b91c1c",
        }
    }

    /// Absolute gradient range covered by this bucket, in percent.
    /// The upper bound is `None` for the open-ended very steep buckets.
    pub fn magnitude_range(&self) -> (f64, Option<f64>) {
        match self {
            GradientBucket::Flat => (0.0, Some(FLAT_MAX_PCT)),
            GradientBucket::GentleAscent | GradientBucket::GentleDescent => {
                (FLAT_MAX_PCT, Some(GENTLE_MAX_PCT))
            }
            GradientBucket::ModerateAscent | GradientBucket::ModerateDescent => {
                (GENTLE_MAX_PCT, Some(MODERATE_MAX_PCT))
            }
            GradientBucket::SteepAscent | GradientBucket::SteepDescent => {
                (MODERATE_MAX_PCT, Some(STEEP_MAX_PCT))
            }
            GradientBucket::VerySteepAscent | GradientBucket::VerySteepDescent => {
                (STEEP_MAX_PCT, None)
            }
        }
    }
}
