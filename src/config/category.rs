use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::foundation::error::{StrataError, StrataResult};

/// Coarse content class of a source image; selects its rotation bound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ImageCategory {
    /// Anything without a more specific class.
    #[default]
    Default,
    /// Camera photographs.
    Photo,
    /// Drawn or rendered artwork.
    Illustration,
    /// Screen captures and text-heavy images.
    Screenshot,
    /// Content that already carries a visible tilt.
    PreRotated,
}

impl ImageCategory {
    /// Number of categories (size of lookup tables).
    pub const COUNT: usize = 5;

    /// Every category, in table order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Default,
        Self::Photo,
        Self::Illustration,
        Self::Screenshot,
        Self::PreRotated,
    ];

    /// Stable snake_case name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Photo => "photo",
            Self::Illustration => "illustration",
            Self::Screenshot => "screenshot",
            Self::PreRotated => "pre_rotated",
        }
    }

    /// Strict lookup by name (case-insensitive, `-` accepted for `_`).
    pub fn from_name(name: &str) -> Option<Self> {
        let norm = name.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL.into_iter().find(|c| c.name() == norm)
    }

    /// Lenient lookup: unknown names resolve to [`ImageCategory::Default`].
    pub fn parse(name: &str) -> Self {
        Self::from_name(name).unwrap_or_default()
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ImageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for ImageCategory {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for ImageCategory {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

/// Rotation range in degrees.
///
/// Accepts either a symmetric magnitude (`3.0` means `[-3, 3]`) or an explicit
/// `{ "min": .., "max": .. }` range.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RotationBound {
    /// `[-v, +v]`.
    Symmetric(f64),
    /// `[min, max]`.
    Range {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
}

impl RotationBound {
    /// Largest magnitude accepted for any bound.
    pub const MAX_DEGREES: f64 = 180.0;

    /// Validated `(min, max)` pair.
    pub fn resolve(self) -> StrataResult<(f64, f64)> {
        let (min, max) = match self {
            Self::Symmetric(v) => {
                if !v.is_finite() {
                    return Err(StrataError::configuration(
                        "rotation bound must be finite",
                    ));
                }
                if v < 0.0 {
                    return Err(StrataError::configuration(format!(
                        "rotation bound {v} is negative and has no lower bound"
                    )));
                }
                (-v, v)
            }
            Self::Range { min, max } => {
                if !min.is_finite() || !max.is_finite() {
                    return Err(StrataError::configuration(
                        "rotation range must be finite",
                    ));
                }
                if min > max {
                    return Err(StrataError::configuration(format!(
                        "rotation range min {min} exceeds max {max}"
                    )));
                }
                (min, max)
            }
        };
        if min < -Self::MAX_DEGREES || max > Self::MAX_DEGREES {
            return Err(StrataError::configuration(format!(
                "rotation range [{min}, {max}] exceeds +-{} degrees",
                Self::MAX_DEGREES
            )));
        }
        Ok((min, max))
    }
}

/// Per-category rotation bounds backed by a fixed-size table.
///
/// Categories without an override use the `default` bound.
#[derive(Clone, Debug, PartialEq)]
pub struct RotationBounds {
    default: RotationBound,
    overrides: [Option<RotationBound>; ImageCategory::COUNT],
}

impl Default for RotationBounds {
    fn default() -> Self {
        let mut t = Self::uniform(RotationBound::Symmetric(3.0));
        t.set(ImageCategory::Screenshot, RotationBound::Symmetric(1.5));
        t.set(ImageCategory::PreRotated, RotationBound::Symmetric(1.0));
        t
    }
}

impl RotationBounds {
    /// Table where every category uses `default`.
    pub fn uniform(default: RotationBound) -> Self {
        Self {
            default,
            overrides: [None; ImageCategory::COUNT],
        }
    }

    /// Override the bound for one category. Setting `Default` replaces the fallback.
    pub fn set(&mut self, category: ImageCategory, bound: RotationBound) {
        if category == ImageCategory::Default {
            self.default = bound;
        } else {
            self.overrides[category.index()] = Some(bound);
        }
    }

    /// Bound that applies to `category`.
    pub fn bound_for(&self, category: ImageCategory) -> RotationBound {
        self.overrides[category.index()].unwrap_or(self.default)
    }

    /// Validated `(min, max)` for `category`.
    pub fn resolve(&self, category: ImageCategory) -> StrataResult<(f64, f64)> {
        self.bound_for(category).resolve().map_err(|e| match e {
            StrataError::Configuration(msg) => {
                StrataError::configuration(format!("rotation_bounds.{category}: {msg}"))
            }
            other => other,
        })
    }

    /// Validate every entry of the table.
    pub fn validate(&self) -> StrataResult<()> {
        for category in ImageCategory::ALL {
            self.resolve(category)?;
        }
        Ok(())
    }
}

impl Serialize for RotationBounds {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = BTreeMap::<&'static str, RotationBound>::new();
        map.insert(ImageCategory::Default.name(), self.default);
        for category in ImageCategory::ALL {
            if let Some(b) = self.overrides[category.index()] {
                map.insert(category.name(), b);
            }
        }
        map.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RotationBounds {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = BTreeMap::<String, RotationBound>::deserialize(deserializer)?;
        let mut table = Self::default();
        for (key, bound) in raw {
            // Table keys are strict; unknown names are rejected.
            let category = ImageCategory::from_name(&key).ok_or_else(|| {
                serde::de::Error::custom(format!("unknown image category \"{key}\""))
            })?;
            table.set(category, bound);
        }
        Ok(table)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/config/category.rs"]
mod tests;
