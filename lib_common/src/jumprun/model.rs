//! Jump run value types. Distances are tenths of a mile, headings are
//! whole degrees magnetic.

use serde::{Deserialize, Serialize};

/// Maximum hook turns and parallel offsets.
pub const MAX_TURNS: usize = 4;

/// One hook turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Turn {
    /// Tenths of a mile flown before turning.
    pub distance: i32,
    /// Degrees magnetic after the turn.
    pub heading: i32,
}

impl Turn {
    /// An all-zero turn terminates the list.
    pub fn is_empty(&self) -> bool {
        self.distance == 0 && self.heading == 0
    }
}

/// The current jump run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Jumprun {
    /// Unix seconds when last set or reset.
    pub timestamp: i64,
    /// Degrees magnetic.
    pub heading: i32,
    /// Exit point relative to the origin, tenths of a mile; negative is before.
    pub exit_distance: i32,
    /// Degrees magnetic of the offset.
    pub offset_heading: i32,
    /// Tenths of a mile of the offset.
    pub offset_distance: i32,
    /// Hook turns; the first empty turn ends the list.
    pub hook_turns: [Turn; MAX_TURNS],
    /// Distinct non-zero parallel run offsets; zero ends the list.
    pub offsets: [i32; MAX_TURNS],
    /// Origin latitude, decimal degrees.
    pub latitude: String,
    /// Origin longitude, decimal degrees.
    pub longitude: String,
    /// Magnetic declination at the origin.
    pub magnetic_declination: i32,
    /// Camera height in feet for the overhead view.
    pub camera_height: i32,
    /// A run is currently set.
    pub is_set: bool,
}

impl Jumprun {
    /// Hook turns up to the first empty one.
    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.hook_turns.iter().take_while(|t| !t.is_empty())
    }

    /// Parallel offsets up to the first zero.
    pub fn parallel_offsets(&self) -> impl Iterator<Item = i32> + '_ {
        self.offsets.iter().copied().take_while(|o| *o != 0)
    }

    /// The origin as parsed coordinates, when set and well formed.
    pub fn origin(&self) -> Option<(f64, f64)> {
        if !self.is_set || self.latitude.is_empty() || self.longitude.is_empty() {
            return None;
        }
        Some((self.latitude.trim().parse().ok()?, self.longitude.trim().parse().ok()?))
    }
}
