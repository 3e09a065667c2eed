//! Change flags raised by sources and the sunrise/sunset scheduler.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// # Source Change Flags
    ///
    /// One bit per source that can change. Listeners receive a combination
    /// of these; the distributor ORs pending ones together before diffing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct SourceChangeFlags: u32 {
        /// Manifest loads changed.
        const BURBLE = 1 << 0;
        /// Jump run was set or reset.
        const JUMPRUN = 1 << 1;
        /// Surface weather changed.
        const METAR = 1 << 2;
        /// Winds aloft forecast changed.
        const WINDS_ALOFT = 1 << 3;
        /// Display options changed.
        const OPTIONS = 1 << 4;
        /// A minute within the hour before sunrise.
        const PRE_SUNRISE = 1 << 5;
        /// Sunrise happened.
        const SUNRISE = 1 << 6;
        /// A minute within the hour before sunset.
        const PRE_SUNSET = 1 << 7;
        /// Sunset happened.
        const SUNSET = 1 << 8;

        /// Flags that recompute the sunrise message.
        const SUNRISE_EDGES = Self::PRE_SUNRISE.bits() | Self::SUNRISE.bits();
        /// Flags that recompute the sunset message.
        const SUNSET_EDGES = Self::PRE_SUNSET.bits() | Self::SUNSET.bits();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_flags() {
        assert!(SourceChangeFlags::SUNRISE_EDGES.contains(SourceChangeFlags::PRE_SUNRISE));
        assert!(!SourceChangeFlags::SUNSET_EDGES.intersects(SourceChangeFlags::SUNRISE_EDGES));
        let f = SourceChangeFlags::BURBLE | SourceChangeFlags::METAR;
        assert_eq!(f.bits(), 0b101);
    }
}
