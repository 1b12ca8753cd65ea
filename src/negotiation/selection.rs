// SPDX-License-Identifier: GPL-3.0-only

//! Crop and compose rectangles
//!
//! A selection lives inside its bounds. The extent is chosen first; the
//! legal offsets then follow from what is left of the bounds:
//! `left in [bounds.left, bounds.left + bounds.width - width]`.

use crate::codec::Rect;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionKind {
    /// Region of the source that is captured
    Crop,
    /// Region of the buffer the image is written to
    Compose,
}

impl fmt::Display for SelectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionKind::Crop => write!(f, "crop"),
            SelectionKind::Compose => write!(f, "compose"),
        }
    }
}

/// Bounds plus the working rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SelectionModel {
    pub kind: SelectionKind,
    pub bounds: Rect,
    pub rect: Rect,
    pub min_extent: u32,
}

fn offset_range(origin: i32, bound: u32, extent: u32) -> RangeInclusive<i32> {
    let slack = bound.saturating_sub(extent).min(i32::MAX as u32) as i32;
    origin..=origin.saturating_add(slack)
}

impl SelectionModel {
    pub fn new(kind: SelectionKind, bounds: Rect, rect: Rect, min_extent: u32) -> Self {
        Self {
            kind,
            bounds,
            rect,
            min_extent,
        }
    }

    pub fn width_range(&self) -> RangeInclusive<u32> {
        self.min_extent.min(self.bounds.width)..=self.bounds.width
    }

    pub fn height_range(&self) -> RangeInclusive<u32> {
        self.min_extent.min(self.bounds.height)..=self.bounds.height
    }

    /// Legal left offsets for the current width
    pub fn left_range(&self) -> RangeInclusive<i32> {
        offset_range(self.bounds.left, self.bounds.width, self.rect.width)
    }

    /// Legal top offsets for the current height
    pub fn top_range(&self) -> RangeInclusive<i32> {
        offset_range(self.bounds.top, self.bounds.height, self.rect.height)
    }

    /// Working rectangle resized to `width` x `height`, offsets pulled back
    /// inside the new range
    pub fn with_extent(&self, width: u32, height: u32) -> Result<Rect, String> {
        if !self.width_range().contains(&width) {
            return Err(format!(
                "{} width {} outside {}..={}",
                self.kind,
                width,
                self.width_range().start(),
                self.width_range().end()
            ));
        }
        if !self.height_range().contains(&height) {
            return Err(format!(
                "{} height {} outside {}..={}",
                self.kind,
                height,
                self.height_range().start(),
                self.height_range().end()
            ));
        }
        let left = offset_range(self.bounds.left, self.bounds.width, width);
        let top = offset_range(self.bounds.top, self.bounds.height, height);
        Ok(Rect::new(
            self.rect.left.clamp(*left.start(), *left.end()),
            self.rect.top.clamp(*top.start(), *top.end()),
            width,
            height,
        ))
    }

    /// Working rectangle moved to `left`, `top`, clamped to the legal ranges
    pub fn with_offsets(&self, left: i32, top: i32) -> Rect {
        let lr = self.left_range();
        let tr = self.top_range();
        Rect::new(
            left.clamp(*lr.start(), *lr.end()),
            top.clamp(*tr.start(), *tr.end()),
            self.rect.width,
            self.rect.height,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crop(width: u32) -> SelectionModel {
        SelectionModel::new(
            SelectionKind::Crop,
            Rect::new(0, 0, 720, 480),
            Rect::new(0, 0, width, 480),
            8,
        )
    }

    #[test]
    fn test_left_range_follows_width() {
        assert_eq!(crop(640).left_range(), 0..=80);
        assert_eq!(crop(720).left_range(), 0..=0);
    }

    #[test]
    fn test_offset_bounds_origin() {
        let model = SelectionModel::new(
            SelectionKind::Crop,
            Rect::new(16, 10, 704, 470),
            Rect::new(16, 10, 640, 400),
            8,
        );
        assert_eq!(model.left_range(), 16..=80);
        assert_eq!(model.top_range(), 10..=80);
    }

    #[test]
    fn test_extent_outside_range_is_rejected() {
        let model = crop(640);
        assert!(model.with_extent(4, 480).is_err());
        assert!(model.with_extent(721, 480).is_err());
        assert!(model.with_extent(640, 481).is_err());
    }

    #[test]
    fn test_growing_extent_pulls_offset_back() {
        let mut model = crop(640);
        model.rect.left = 80;
        let rect = model.with_extent(700, 480).unwrap();
        assert_eq!(rect, Rect::new(20, 0, 700, 480));
    }

    #[test]
    fn test_offsets_are_clamped() {
        let model = crop(640);
        assert_eq!(model.with_offsets(200, -5), Rect::new(80, 0, 640, 480));
        assert_eq!(model.with_offsets(40, 0), Rect::new(40, 0, 640, 480));
    }
}
