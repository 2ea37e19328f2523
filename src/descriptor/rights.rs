//! Map rights and the rights evaluator.
//!
//! A user's rights are a bitmask. Rights-scoped ("ACP") tiles are cached one
//! permission slice at a time: each slice is a single bit, written as a
//! decimal suffix after the last `.` of the descriptor (`T1_4_2_0_10_20_en.64`).

use std::collections::HashMap;
use std::fmt;
use std::ops::{BitAnd, BitOr};

/// Bitmask of map permissions held by a user or carried by a tile slice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MapRights(u64);

impl MapRights {
    /// No rights at all.
    pub const NONE: MapRights = MapRights(0);

    /// Every right.
    pub const ALL: MapRights = MapRights(u64::MAX);

    pub const fn new(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every bit of `other` is also set in `self`.
    pub const fn contains(self, other: MapRights) -> bool {
        self.0 & other.0 == other.0
    }

    /// Split into single-bit slices, lowest bit first.
    pub fn slices(self) -> impl Iterator<Item = MapRights> {
        let bits = self.0;
        (0..64u32)
            .map(|shift| 1u64 << shift)
            .filter(move |bit| bits & bit != 0)
            .map(MapRights)
    }

    /// Parse a rights suffix.
    ///
    /// Only the canonical decimal form of a single bit is accepted, so that
    /// parsing and printing round-trip exactly and every suffix names one
    /// slice.
    pub fn parse_suffix(text: &str) -> Option<MapRights> {
        if text.is_empty() || text.starts_with('0') || !text.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        text.parse::<u64>()
            .ok()
            .filter(|bits| bits.is_power_of_two())
            .map(MapRights)
    }
}

impl fmt::Display for MapRights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl BitAnd for MapRights {
    type Output = MapRights;

    fn bitand(self, rhs: MapRights) -> MapRights {
        MapRights(self.0 & rhs.0)
    }
}

impl BitOr for MapRights {
    type Output = MapRights;

    fn bitor(self, rhs: MapRights) -> MapRights {
        MapRights(self.0 | rhs.0)
    }
}

// =============================================================================
// Rights Evaluator
// =============================================================================

/// Resolves the rights held by the user behind a request.
pub trait RightsEvaluator: Send + Sync {
    /// Rights for `user`; anonymous requests pass `None`.
    fn permissions_for(&self, user: Option<&str>) -> MapRights;
}

/// Rights evaluator backed by a fixed user table.
#[derive(Debug, Clone, Default)]
pub struct StaticRights {
    users: HashMap<String, MapRights>,
    anonymous: MapRights,
}

impl StaticRights {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `user=bits` entries, as given on the command line.
    pub fn from_entries<S: AsRef<str>>(entries: &[S]) -> Result<Self, String> {
        let mut rights = Self::new();
        for entry in entries {
            let entry = entry.as_ref();
            let (user, bits) = entry
                .split_once('=')
                .ok_or_else(|| format!("invalid user rights entry '{}': expected user=bits", entry))?;
            let bits: u64 = bits
                .trim()
                .parse()
                .map_err(|_| format!("invalid rights mask in '{}'", entry))?;
            rights = rights.with_user(user.trim(), MapRights::new(bits));
        }
        Ok(rights)
    }

    pub fn with_user(mut self, user: impl Into<String>, rights: MapRights) -> Self {
        self.users.insert(user.into(), rights);
        self
    }

    /// Rights granted to requests without a user.
    pub fn with_anonymous(mut self, rights: MapRights) -> Self {
        self.anonymous = rights;
        self
    }
}

impl RightsEvaluator for StaticRights {
    fn permissions_for(&self, user: Option<&str>) -> MapRights {
        user.and_then(|u| self.users.get(u).copied())
            .unwrap_or(self.anonymous)
    }
}
