//! Options controlling diagnostic output.
//!
//! This module provides the `ReportFields` bitflags, which select how much
//! detail [`describe`](crate::vector::MultiVec::describe) includes in its
//! report: shape only, plus distribution, plus memory residency, up to a
//! full dump of the local values. The cumulative presets `LOW` through
//! `EXTREME` mirror the individual field flags.

use bitflags::bitflags;

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct ReportFields: u32 {
        const SHAPE        = 0b0001;
        const DISTRIBUTION = 0b0010;
        const RESIDENCY    = 0b0100;
        const VALUES       = 0b1000;
        const LOW          = Self::SHAPE.bits();
        const MEDIUM       = Self::LOW.bits() | Self::DISTRIBUTION.bits();
        const HIGH         = Self::MEDIUM.bits() | Self::RESIDENCY.bits();
        const EXTREME      = Self::HIGH.bits() | Self::VALUES.bits();
    }
}

impl Default for ReportFields {
    fn default() -> Self {
        ReportFields::MEDIUM
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_cumulative() {
        assert!(ReportFields::LOW.contains(ReportFields::SHAPE));
        assert!(!ReportFields::LOW.contains(ReportFields::DISTRIBUTION));
        assert!(ReportFields::MEDIUM.contains(ReportFields::LOW));
        assert!(ReportFields::HIGH.contains(ReportFields::MEDIUM));
        assert!(ReportFields::EXTREME.contains(ReportFields::HIGH));
        assert!(ReportFields::EXTREME.contains(ReportFields::VALUES));
    }

    #[test]
    fn default_is_medium() {
        assert_eq!(ReportFields::default(), ReportFields::MEDIUM);
    }
}
