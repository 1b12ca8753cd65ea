// SPDX-License-Identifier: GPL-3.0-only

//! Frame size and frame interval domains
//!
//! Devices describe sizes and intervals either as a discrete list or as a
//! stepwise range; the two shapes never mix within one enumeration. The
//! domain types keep the shape so callers only get the operations that
//! apply to it.

use crate::codec::{
    FrameIntervalEntry, FrameIntervalKind, FrameSize, FrameSizeEntry, FrameSizeKind, Fraction,
    StepwiseSize,
};
use serde::Serialize;
use std::cmp::Ordering;

/// Legal frame sizes for the current pixel format
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameSizeDomain {
    /// Frame-size negotiation does not apply (radio, VBI, no format)
    #[default]
    Unavailable,
    Discrete(Vec<FrameSize>),
    Stepwise(StepwiseSize),
}

impl FrameSizeDomain {
    /// Build from an enumeration; nothing enumerated means `fallback`
    pub fn from_entries(entries: &[FrameSizeEntry], fallback: StepwiseSize) -> Self {
        let Some(first) = entries.first() else {
            return FrameSizeDomain::Stepwise(fallback);
        };
        match first.kind {
            FrameSizeKind::Discrete { .. } => FrameSizeDomain::Discrete(
                entries
                    .iter()
                    .filter_map(|e| match e.kind {
                        FrameSizeKind::Discrete { width, height } => Some(FrameSize::new(width, height)),
                        _ => None,
                    })
                    .collect(),
            ),
            FrameSizeKind::Stepwise(range) => FrameSizeDomain::Stepwise(range),
            FrameSizeKind::Continuous(range) => FrameSizeDomain::Stepwise(StepwiseSize {
                step_width: 1,
                step_height: 1,
                ..range
            }),
        }
    }

    pub fn is_discrete(&self) -> bool {
        matches!(self, FrameSizeDomain::Discrete(_))
    }

    /// Discrete sizes, empty for other shapes
    pub fn sizes(&self) -> &[FrameSize] {
        match self {
            FrameSizeDomain::Discrete(sizes) => sizes,
            _ => &[],
        }
    }

    /// Map a requested size onto the domain
    ///
    /// Discrete lists need an exact member. Stepwise ranges clamp and round
    /// to the nearest step.
    pub fn resolve(&self, width: u32, height: u32) -> Result<FrameSize, String> {
        match self {
            FrameSizeDomain::Unavailable => Err("frame sizes are not negotiable".to_string()),
            FrameSizeDomain::Discrete(sizes) => {
                let wanted = FrameSize::new(width, height);
                if sizes.contains(&wanted) {
                    Ok(wanted)
                } else {
                    Err(format!("{} is not an enumerated frame size", wanted))
                }
            }
            FrameSizeDomain::Stepwise(range) => Ok(range.snap(width, height)),
        }
    }
}

/// Legal frame intervals for the current format and size
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameIntervalDomain {
    #[default]
    Unavailable,
    Discrete(Vec<Fraction>),
    Stepwise {
        min: Fraction,
        max: Fraction,
        step: Fraction,
    },
}

impl FrameIntervalDomain {
    pub fn from_entries(entries: &[FrameIntervalEntry]) -> Self {
        let Some(first) = entries.first() else {
            return FrameIntervalDomain::Unavailable;
        };
        match first.kind {
            FrameIntervalKind::Discrete(_) => FrameIntervalDomain::Discrete(
                entries
                    .iter()
                    .filter_map(|e| match e.kind {
                        FrameIntervalKind::Discrete(f) => Some(f),
                        _ => None,
                    })
                    .collect(),
            ),
            FrameIntervalKind::Stepwise { min, max, step } => {
                FrameIntervalDomain::Stepwise { min, max, step }
            }
            FrameIntervalKind::Continuous { min, max } => FrameIntervalDomain::Stepwise {
                min,
                max,
                step: Fraction::new(0, 1),
            },
        }
    }

    /// Discrete: same value as a listed interval. Stepwise: inside the range.
    pub fn contains(&self, interval: Fraction) -> bool {
        if interval.denominator == 0 {
            return false;
        }
        match self {
            FrameIntervalDomain::Unavailable => false,
            FrameIntervalDomain::Discrete(list) => list
                .iter()
                .any(|f| compare_fractions(*f, interval) == Some(Ordering::Equal)),
            FrameIntervalDomain::Stepwise { min, max, .. } => {
                matches!(
                    compare_fractions(*min, interval),
                    Some(Ordering::Less | Ordering::Equal)
                ) && matches!(
                    compare_fractions(interval, *max),
                    Some(Ordering::Less | Ordering::Equal)
                )
            }
        }
    }
}

/// Exact comparison by cross multiplication; `None` for a zero denominator
pub fn compare_fractions(a: Fraction, b: Fraction) -> Option<Ordering> {
    if a.denominator == 0 || b.denominator == 0 {
        return None;
    }
    let lhs = a.numerator as u64 * b.denominator as u64;
    let rhs = b.numerator as u64 * a.denominator as u64;
    Some(lhs.cmp(&rhs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FourCc;

    const YUYV: FourCc = FourCc::new(b"YUYV");

    fn discrete(index: u32, width: u32, height: u32) -> FrameSizeEntry {
        FrameSizeEntry {
            index,
            pixelformat: YUYV,
            kind: FrameSizeKind::Discrete { width, height },
        }
    }

    fn fallback() -> StepwiseSize {
        StepwiseSize {
            min_width: 8,
            max_width: 4096,
            step_width: 1,
            min_height: 8,
            max_height: 2160,
            step_height: 1,
        }
    }

    #[test]
    fn test_discrete_requires_exact_member() {
        let domain =
            FrameSizeDomain::from_entries(&[discrete(0, 640, 480), discrete(1, 320, 240)], fallback());
        assert!(domain.is_discrete());
        assert_eq!(domain.resolve(320, 240), Ok(FrameSize::new(320, 240)));
        assert!(domain.resolve(321, 240).is_err());
    }

    #[test]
    fn test_stepwise_clamps_and_rounds() {
        let range = StepwiseSize {
            min_width: 640,
            max_width: 3840,
            step_width: 16,
            min_height: 480,
            max_height: 2160,
            step_height: 8,
        };
        let domain = FrameSizeDomain::from_entries(
            &[FrameSizeEntry {
                index: 0,
                pixelformat: YUYV,
                kind: FrameSizeKind::Stepwise(range),
            }],
            fallback(),
        );
        assert_eq!(domain.resolve(1000, 1000), Ok(FrameSize::new(1008, 1000)));
        assert_eq!(domain.resolve(10, 10), Ok(FrameSize::new(640, 480)));
        assert_eq!(domain.resolve(9999, 9999), Ok(FrameSize::new(3840, 2160)));
    }

    #[test]
    fn test_empty_enumeration_uses_fallback() {
        let domain = FrameSizeDomain::from_entries(&[], fallback());
        assert_eq!(domain, FrameSizeDomain::Stepwise(fallback()));
        assert_eq!(domain.resolve(4, 3000), Ok(FrameSize::new(8, 2160)));
    }

    #[test]
    fn test_interval_membership_by_value() {
        let entries: Vec<FrameIntervalEntry> = [Fraction::new(1, 30), Fraction::new(1, 15)]
            .iter()
            .enumerate()
            .map(|(i, f)| FrameIntervalEntry {
                index: i as u32,
                pixelformat: YUYV,
                width: 640,
                height: 480,
                kind: FrameIntervalKind::Discrete(*f),
            })
            .collect();
        let domain = FrameIntervalDomain::from_entries(&entries);
        assert!(domain.contains(Fraction::new(2, 60)));
        assert!(!domain.contains(Fraction::new(1, 25)));
        assert!(!domain.contains(Fraction::new(1, 0)));
    }

    #[test]
    fn test_stepwise_interval_range() {
        let domain = FrameIntervalDomain::Stepwise {
            min: Fraction::new(1, 60),
            max: Fraction::new(1, 1),
            step: Fraction::new(1, 60),
        };
        assert!(domain.contains(Fraction::new(1, 30)));
        assert!(domain.contains(Fraction::new(1, 1)));
        assert!(!domain.contains(Fraction::new(1, 120)));
        assert!(!domain.contains(Fraction::new(2, 1)));
    }
}
