// SPDX-License-Identifier: GPL-3.0-only

//! Standard and DV timings matching
//!
//! A standard id may carry several bits (a family such as `PAL` or a raw
//! query result such as `PAL_B`). Matching tries an exact id first, then
//! the first enumerated standard whose id intersects the candidate.

use crate::codec::{DvTimings, StandardDescriptor, TimingsDescriptor};
use crate::constants::{V4L2_STD_525_60, V4L2_STD_625_50};

/// Frame line system a standard belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSystem {
    /// 525 lines, 60 fields per second (NTSC, PAL-M, PAL-60)
    Lines525,
    /// 625 lines, 50 fields per second (PAL, SECAM)
    Lines625,
}

pub fn line_system(id: u64) -> Option<LineSystem> {
    if id & V4L2_STD_525_60 != 0 {
        Some(LineSystem::Lines525)
    } else if id & V4L2_STD_625_50 != 0 {
        Some(LineSystem::Lines625)
    } else {
        None
    }
}

/// Resolve `id` against an enumeration
///
/// Standards outside `allowed` (the active input's or output's mask) never
/// match. A zero mask means the input does not restrict standards.
pub fn match_standard(
    standards: &[StandardDescriptor],
    id: u64,
    allowed: u64,
) -> Option<&StandardDescriptor> {
    let permitted = |s: &&StandardDescriptor| allowed == 0 || s.id & allowed != 0;
    standards
        .iter()
        .filter(permitted)
        .find(|s| s.id == id)
        .or_else(|| standards.iter().filter(permitted).find(|s| s.id & id != 0))
}

/// Timings match only on full equality
pub fn match_timings<'a>(
    timings: &'a [TimingsDescriptor],
    wanted: &DvTimings,
) -> Option<&'a TimingsDescriptor> {
    timings.iter().find(|t| t.timings == *wanted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FixedName, Fraction};
    use crate::constants::*;

    fn std(index: u32, id: u64, name: &str) -> StandardDescriptor {
        StandardDescriptor {
            index,
            id,
            name: FixedName::truncated(name),
            frame_period: Fraction::new(1, 25),
            frame_lines: 625,
        }
    }

    fn list() -> Vec<StandardDescriptor> {
        vec![
            std(0, V4L2_STD_PAL, "PAL"),
            std(1, V4L2_STD_PAL_BG, "PAL-BG"),
            std(2, V4L2_STD_NTSC, "NTSC"),
        ]
    }

    #[test]
    fn test_exact_match_wins_over_intersection() {
        let standards = list();
        // PAL_BG intersects PAL (index 0) too, but the exact entry wins
        let found = match_standard(&standards, V4L2_STD_PAL_BG, 0).unwrap();
        assert_eq!(found.index, 1);
    }

    #[test]
    fn test_intersection_takes_first_in_order() {
        let standards = list();
        let found = match_standard(&standards, V4L2_STD_PAL_B, 0).unwrap();
        assert_eq!(found.name, "PAL");
    }

    #[test]
    fn test_no_match() {
        assert!(match_standard(&list(), V4L2_STD_SECAM, 0).is_none());
        assert!(match_standard(&list(), V4L2_STD_UNKNOWN, 0).is_none());
    }

    #[test]
    fn test_mask_restricts_candidates() {
        let standards = list();
        assert!(match_standard(&standards, V4L2_STD_PAL_BG, V4L2_STD_NTSC).is_none());
        assert_eq!(
            match_standard(&standards, V4L2_STD_NTSC_M, V4L2_STD_NTSC)
                .unwrap()
                .index,
            2
        );
    }

    #[test]
    fn test_line_systems() {
        assert_eq!(line_system(V4L2_STD_NTSC_M), Some(LineSystem::Lines525));
        assert_eq!(line_system(V4L2_STD_PAL_M), Some(LineSystem::Lines525));
        assert_eq!(line_system(V4L2_STD_SECAM_L), Some(LineSystem::Lines625));
        assert_eq!(line_system(V4L2_STD_UNKNOWN), None);
    }
}
