//! Byte quantities as written in CWL documents, config tables and Nextflow directives.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;
pub const TIB: u64 = 1024 * GIB;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,
    #[error("invalid number in quantity '{0}'")]
    InvalidNumber(String),
    #[error("unknown unit '{unit}' in quantity '{input}'")]
    UnknownUnit { input: String, unit: String },
    #[error("quantity '{0}' is negative")]
    Negative(String),
}

/// A memory or disk size in bytes.
///
/// All units are binary (1 GB = 1024 MB), which is how Nextflow interprets memory directives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ByteQuantity(u64);

impl ByteQuantity {
    pub const fn from_bytes(bytes: u64) -> Self {
        ByteQuantity(bytes)
    }

    pub const fn from_mebibytes(mebibytes: u64) -> Self {
        ByteQuantity(mebibytes * MIB)
    }

    pub const fn from_gibibytes(gibibytes: u64) -> Self {
        ByteQuantity(gibibytes * GIB)
    }

    /// Convert a fractional mebibyte count (CWL `ramMin` and friends), rounding up.
    pub fn from_mebibytes_f64(mebibytes: f64) -> Result<Self, QuantityError> {
        if mebibytes.is_nan() || mebibytes.is_infinite() {
            return Err(QuantityError::InvalidNumber(mebibytes.to_string()));
        }
        if mebibytes < 0.0 {
            return Err(QuantityError::Negative(mebibytes.to_string()));
        }
        Ok(ByteQuantity((mebibytes * MIB as f64).ceil() as u64))
    }

    pub const fn bytes(&self) -> u64 {
        self.0
    }

    /// Render in the `<n> <UNIT>` form accepted by Nextflow's `memory` and `disk` directives.
    ///
    /// Picks the largest unit that represents the value exactly so the text round-trips.
    pub fn to_nextflow(&self) -> String {
        let bytes = self.0;
        for (unit, size) in [("TB", TIB), ("GB", GIB)] {
            if bytes >= size && bytes % size == 0 {
                return format!("{} {}", bytes / size, unit);
            }
        }
        if bytes >= GIB {
            // Large odd sizes round up to whole megabytes.
            return format!("{} MB", bytes.div_ceil(MIB));
        }
        for (unit, size) in [("MB", MIB), ("KB", KIB)] {
            if bytes >= size && bytes % size == 0 {
                return format!("{} {}", bytes / size, unit);
            }
        }
        format!("{} B", bytes)
    }
}

impl fmt::Display for ByteQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_nextflow())
    }
}

impl FromStr for ByteQuantity {
    type Err = QuantityError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(QuantityError::Empty);
        }
        let split = trimmed
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(trimmed.len());
        let (number, unit) = trimmed.split_at(split);
        let value: f64 = number
            .trim()
            .parse()
            .map_err(|_| QuantityError::InvalidNumber(input.to_string()))?;
        if value < 0.0 {
            return Err(QuantityError::Negative(input.to_string()));
        }
        let multiplier = match unit.trim().to_ascii_uppercase().as_str() {
            "" | "B" => 1,
            "K" | "KB" | "KIB" => KIB,
            "M" | "MB" | "MIB" => MIB,
            "G" | "GB" | "GIB" => GIB,
            "T" | "TB" | "TIB" => TIB,
            other => {
                return Err(QuantityError::UnknownUnit {
                    input: input.to_string(),
                    unit: other.to_string(),
                })
            }
        };
        Ok(ByteQuantity((value * multiplier as f64).ceil() as u64))
    }
}

impl Serialize for ByteQuantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_nextflow())
    }
}

impl<'de> Deserialize<'de> for ByteQuantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
