//! Fixed-point math utilities for deterministic simulation.
//!
//! Timers, reload durations and probabilities all use fixed-point
//! arithmetic so that every client advances production queues and
//! rolls AI decisions identically.

use fixed::types::I32F32;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
pub type Fixed = I32F32;

/// Fixed-point 2D vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Serde support for fixed-point numbers written as decimal literals.
///
/// Used for hand-authored data files (`reload_time: 2.5`). Values are
/// rounded through `f64` exactly once at load time, never during simulation.
pub mod fixed_decimal {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize a fixed-point number as a decimal.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(value.to_num::<f64>())
    }

    /// Deserialize a fixed-point number from a decimal.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        Fixed::checked_from_num(value)
            .ok_or_else(|| serde::de::Error::custom(format!("value {value} out of fixed range")))
    }
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Create a vector from integer coordinates.
    #[must_use]
    pub fn from_ints(x: i32, y: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };
}

/// An inclusive range of fixed-point values sampled with a seeded RNG.
///
/// Used for randomized AI reload intervals and acceptance thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedRange {
    /// Lower bound.
    #[serde(with = "fixed_decimal")]
    pub min: Fixed,
    /// Upper bound.
    #[serde(with = "fixed_decimal")]
    pub max: Fixed,
}

impl FixedRange {
    /// Create a new range. Bounds are reordered if given backwards.
    #[must_use]
    pub fn new(min: Fixed, max: Fixed) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// A range that always yields `value`.
    #[must_use]
    pub const fn exactly(value: Fixed) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    /// Draw a value uniformly from `[min, max]`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Fixed {
        if self.min == self.max {
            return self.min;
        }
        Fixed::from_bits(rng.gen_range(self.min.to_bits()..=self.max.to_bits()))
    }
}

/// Draw a fixed-point value uniformly from `[0, 1)`.
pub fn unit_interval<R: Rng + ?Sized>(rng: &mut R) -> Fixed {
    Fixed::from_bits(rng.gen_range(0..Fixed::ONE.to_bits()))
}
