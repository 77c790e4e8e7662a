//! Secret value generators.
//!
//! A generator never produces a secret locally. It only *describes* how the
//! backend should mint the value when it is first requested, so the
//! description must be stable and serializable.
//!
//! # Example YAML
//!
//! ```yaml
//! generator:
//!   type: alpha
//!   length: 10
//! ```
//!
//! New kinds are added by implementing [`Describe`] and registering a variant
//! on [`Generator`]. The policy synthesizer only ever calls
//! [`Describe::describe`].

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Stable, serializable description of a generator: a tag plus parameters.
///
/// Parameters live in a `BTreeMap` so the serialized form is byte-identical
/// across runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorDescription {
    /// Generator tag (e.g. `"alpha"`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Tag-specific parameters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
}

/// Capability shared by every generator kind.
pub trait Describe {
    /// Describe how the backend should generate the value.
    fn describe(&self) -> GeneratorDescription;
}

/// Alphanumeric value of fixed length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AlphaGenerator {
    length: u32,
}

impl AlphaGenerator {
    /// Tag used in configuration and descriptions.
    pub const TAG: &'static str = "alpha";

    /// Create an alphanumeric generator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if `length` is zero.
    pub fn new(length: u32) -> Result<Self> {
        if length == 0 {
            return Err(Error::InvalidConfiguration(
                "alpha generator length must be positive".to_string(),
            ));
        }
        Ok(Self { length })
    }

    /// Length of the generated value.
    #[must_use]
    pub fn length(&self) -> u32 {
        self.length
    }
}

impl Describe for AlphaGenerator {
    fn describe(&self) -> GeneratorDescription {
        GeneratorDescription {
            kind: Self::TAG.to_string(),
            params: BTreeMap::from([("length".to_string(), Value::from(self.length))]),
        }
    }
}

/// Lowercase hexadecimal value of fixed length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HexGenerator {
    length: u32,
}

impl HexGenerator {
    /// Tag used in configuration and descriptions.
    pub const TAG: &'static str = "hex";

    /// Create a hexadecimal generator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if `length` is zero.
    pub fn new(length: u32) -> Result<Self> {
        if length == 0 {
            return Err(Error::InvalidConfiguration(
                "hex generator length must be positive".to_string(),
            ));
        }
        Ok(Self { length })
    }

    /// Length of the generated value.
    #[must_use]
    pub fn length(&self) -> u32 {
        self.length
    }
}

impl Describe for HexGenerator {
    fn describe(&self) -> GeneratorDescription {
        GeneratorDescription {
            kind: Self::TAG.to_string(),
            params: BTreeMap::from([("length".to_string(), Value::from(self.length))]),
        }
    }
}

/// Registered generator kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Generator {
    /// Alphanumeric (`type: alpha`)
    Alpha(AlphaGenerator),
    /// Hexadecimal (`type: hex`)
    Hex(HexGenerator),
}

impl Generator {
    /// Shorthand for an alphanumeric generator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if `length` is zero.
    pub fn alpha(length: u32) -> Result<Self> {
        AlphaGenerator::new(length).map(Self::Alpha)
    }

    /// Shorthand for a hexadecimal generator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if `length` is zero.
    pub fn hex(length: u32) -> Result<Self> {
        HexGenerator::new(length).map(Self::Hex)
    }

    /// Build a generator from its tag and length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] for an unknown tag or a zero
    /// length.
    pub fn from_parts(kind: &str, length: u32) -> Result<Self> {
        match kind {
            AlphaGenerator::TAG => Self::alpha(length),
            HexGenerator::TAG => Self::hex(length),
            other => Err(Error::InvalidConfiguration(format!(
                "unknown generator type '{other}'"
            ))),
        }
    }
}

impl Describe for Generator {
    fn describe(&self) -> GeneratorDescription {
        match self {
            Self::Alpha(g) => g.describe(),
            Self::Hex(g) => g.describe(),
        }
    }
}

/// Wire form used when reading role files; validated through [`Generator::from_parts`].
#[derive(Deserialize)]
struct RawGenerator {
    #[serde(rename = "type")]
    kind: String,
    length: u32,
}

impl<'de> Deserialize<'de> for Generator {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawGenerator::deserialize(deserializer)?;
        Self::from_parts(&raw.kind, raw.length).map_err(serde::de::Error::custom)
    }
}
