use core::fmt;
use serde::{Deserialize, Serialize};

/// Experiment arm a player is bucketed into.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Variant {
    A,
    B,
}

impl Variant {
    pub const ALL: [Variant; 2] = [Variant::A, Variant::B];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
        }
    }

    /// Maps a feature flag response onto an arm, `None` for anything unknown.
    pub fn from_flag_value(value: &str) -> Option<Self> {
        match value {
            "control" => Some(Self::A),
            "4-words" => Some(Self::B),
            _ => None,
        }
    }

    /// Parses the persisted form produced by [`Variant::as_str`].
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            _ => None,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
