//! Audio filters recognised by the player and their relay payloads.

use crate::errors::{Error, Result};
use serde::Serialize;
use std::{collections::BTreeMap, fmt, str::FromStr};

/// Gains of the fifteen equalizer bands used by `bassboost`.
pub const BASSBOOST_GAINS: [f64; 15] = [
    0.25, 0.25, 0.15, 0.05, 0.20, -0.15, -0.10, -0.10, -0.10, -0.10, -0.20, -0.20, -0.30, -0.30,
    -0.30,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterLabel {
    BassBoost,
    EightD,
    Nightcore,
}

impl FilterLabel {
    pub const ALL: [Self; 3] = [Self::BassBoost, Self::EightD, Self::Nightcore];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BassBoost => "bassboost",
            Self::EightD => "8d",
            Self::Nightcore => "nightcore",
        }
    }

    /// Payload applied for this label.
    #[must_use]
    pub fn spec(self) -> FilterSpec {
        match self {
            Self::BassBoost => FilterSpec::Equalizer(
                BASSBOOST_GAINS
                    .iter()
                    .zip(0u8..)
                    .map(|(&gain, band)| EqBand { band, gain })
                    .collect(),
            ),
            Self::EightD => FilterSpec::Rotation(RotationFilter { rotation_hz: 0.15 }),
            Self::Nightcore => FilterSpec::Timescale(TimescaleFilter {
                speed: 1.1,
                pitch: 1.2,
                rate: 1.2,
            }),
        }
    }
}

impl fmt::Display for FilterLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterLabel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let label = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|l| l.as_str() == label)
            .ok_or(Error::FilterUnknown { label })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EqBand {
    pub band: u8,
    pub gain: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationFilter {
    pub rotation_hz: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimescaleFilter {
    pub speed: f64,
    pub pitch: f64,
    pub rate: f64,
}

/// One filter as applied by the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterSpec {
    Equalizer(Vec<EqBand>),
    Rotation(RotationFilter),
    Timescale(TimescaleFilter),
}

/// Combined filter payload of a player.
///
/// Fields left as `None` are serialized away, which resets them on the node.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Filters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equalizer: Option<Vec<EqBand>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<RotationFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timescale: Option<TimescaleFilter>,
}

impl Filters {
    /// Merges the active filters of a player into one payload.
    #[must_use]
    pub fn combine(active: &BTreeMap<FilterLabel, FilterSpec>) -> Self {
        let mut filters = Self::default();
        for spec in active.values() {
            match spec.clone() {
                FilterSpec::Equalizer(bands) => filters.equalizer = Some(bands),
                FilterSpec::Rotation(rotation) => filters.rotation = Some(rotation),
                FilterSpec::Timescale(timescale) => filters.timescale = Some(timescale),
            }
        }
        filters
    }
}
