// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! The table of tube regions. Each tube owns a stable index in
//! `0..tube_count`, a genotype label and, once placed, a rectangle in frame
//! coordinates.

use imageproc::rect::Rect;
use log::{debug, info};

use crate::error::{DetectError, Result};

pub const DEFAULT_TUBE_COUNT: usize = 5;

/// Validating constructor for region rectangles. `Rect::of_size()` panics on
/// zero sizes; this reports them as a configuration error instead.
pub fn region_rect(x: i32, y: i32, width: u32, height: u32) -> Result<Rect> {
    if width == 0 || height == 0 {
        return Err(DetectError::InvalidConfiguration(format!(
            "region {}x{} at ({}, {}) must have positive size",
            width, height, x, y)));
    }
    Ok(Rect::at(x, y).of_size(width, height))
}

pub fn default_label(index: usize) -> String {
    format!("Tube {}", index + 1)
}

#[derive(Clone, Debug, PartialEq)]
pub struct TubeRegion {
    index: usize,
    rect: Option<Rect>,
    label: String,
}

impl TubeRegion {
    fn unplaced(index: usize) -> TubeRegion {
        TubeRegion{index, rect: None, label: default_label(index)}
    }

    pub fn index(&self) -> usize { self.index }

    /// None until the region has been placed.
    pub fn rect(&self) -> Option<Rect> { self.rect }

    pub fn label(&self) -> &str { &self.label }

    /// Tube height in pixels, 0 when unplaced.
    pub fn tube_height(&self) -> u32 {
        self.rect.map_or(0, |r| r.height())
    }
}

#[derive(Clone, Debug)]
pub struct TubeRegionSet {
    regions: Vec<TubeRegion>,

    // Rectangles as they were before apply_offset(), so repeated offsets are
    // relative to the placed layout rather than cumulative.
    offset_base: Option<Vec<Option<Rect>>>,
}

impl Default for TubeRegionSet {
    fn default() -> Self {
        Self::build(DEFAULT_TUBE_COUNT)
    }
}

impl TubeRegionSet {
    pub fn new(tube_count: usize) -> Result<TubeRegionSet> {
        check_tube_count(tube_count)?;
        Ok(Self::build(tube_count))
    }

    fn build(tube_count: usize) -> TubeRegionSet {
        TubeRegionSet{regions: (0..tube_count).map(TubeRegion::unplaced).collect(),
                      offset_base: None}
    }

    pub fn tube_count(&self) -> usize {
        self.regions.len()
    }

    /// Replaces the table wholesale: all regions become unplaced and labels
    /// revert to their defaults. Rejected (leaving the table untouched) when
    /// `tube_count < 1`.
    pub fn set_tube_count(&mut self, tube_count: usize) -> Result<()> {
        check_tube_count(tube_count)?;
        *self = Self::build(tube_count);
        info!("Tube count set to {}", tube_count);
        Ok(())
    }

    /// Unplaces every region and restores default labels, keeping the
    /// tube count.
    pub fn clear(&mut self) {
        *self = Self::build(self.regions.len());
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.regions.len() {
            return Err(DetectError::InvalidIndex{index,
                                                 tube_count: self.regions.len()});
        }
        Ok(())
    }

    pub fn get(&self, index: usize) -> Result<&TubeRegion> {
        self.check_index(index)?;
        Ok(&self.regions[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = &TubeRegion> {
        self.regions.iter()
    }

    pub fn rects(&self) -> Vec<Option<Rect>> {
        self.regions.iter().map(|r| r.rect).collect()
    }

    pub fn labels(&self) -> Vec<String> {
        self.regions.iter().map(|r| r.label.clone()).collect()
    }

    pub fn set_region(&mut self, index: usize, rect: Rect) -> Result<()> {
        self.check_index(index)?;
        self.regions[index].rect = Some(rect);
        self.offset_base = None;
        Ok(())
    }

    /// Places the first `min(rects.len(), tube_count)` regions; extra
    /// rectangles are ignored and remaining tubes keep their placement.
    pub fn set_regions(&mut self, rects: &[Rect]) {
        for (region, rect) in self.regions.iter_mut().zip(rects.iter()) {
            region.rect = Some(*rect);
        }
        self.offset_base = None;
    }

    /// Divides `area` into `tube_count` side by side columns of equal width.
    /// Any remainder of the width (when not evenly divisible) is left
    /// unassigned at the right edge.
    pub fn split_capture_area(&mut self, area: Rect) -> Result<()> {
        let tube_count = self.regions.len() as u32;
        let tube_width = area.width() / tube_count;
        if tube_width == 0 {
            return Err(DetectError::InvalidConfiguration(format!(
                "capture area width {} is too narrow for {} tubes",
                area.width(), tube_count)));
        }
        for (i, region) in self.regions.iter_mut().enumerate() {
            let x = area.left() + (i as u32 * tube_width) as i32;
            region.rect = Some(Rect::at(x, area.top()).of_size(tube_width, area.height()));
        }
        self.offset_base = None;
        info!("Split capture area {:?} into {} tubes of width {}",
              area, tube_count, tube_width);
        Ok(())
    }

    /// Drag-moves one region by (`dx`, `dy`), returning its new rectangle.
    pub fn move_region(&mut self, index: usize, dx: i32, dy: i32) -> Result<Rect> {
        self.check_index(index)?;
        let region = &mut self.regions[index];
        let Some(rect) = region.rect else {
            return Err(DetectError::InvalidConfiguration(format!(
                "{} has no region to move", region.label)));
        };
        let moved = Rect::at(rect.left() + dx, rect.top() + dy)
            .of_size(rect.width(), rect.height());
        region.rect = Some(moved);
        self.offset_base = None;
        debug!("Moved {} to {:?}", region.label, moved);
        Ok(moved)
    }

    /// Shifts every placed region by (`dx`, `dy`) relative to the layout that
    /// existed before the first offset was applied. Origins are clamped to be
    /// non-negative.
    pub fn apply_offset(&mut self, dx: i32, dy: i32) {
        let base = self.offset_base.get_or_insert_with(
            || self.regions.iter().map(|r| r.rect).collect());
        for (region, base_rect) in self.regions.iter_mut().zip(base.iter()) {
            if let Some(rect) = base_rect {
                region.rect = Some(
                    Rect::at((rect.left() + dx).max(0), (rect.top() + dy).max(0))
                        .of_size(rect.width(), rect.height()));
            }
        }
        debug!("Applied region offset ({}, {})", dx, dy);
    }

    /// Restores the layout from before apply_offset(). No effect if no offset
    /// is active.
    pub fn reset_offset(&mut self) {
        if let Some(base) = self.offset_base.take() {
            for (region, rect) in self.regions.iter_mut().zip(base) {
                region.rect = rect;
            }
        }
    }

    pub fn set_label(&mut self, index: usize, label: &str) -> Result<()> {
        self.check_index(index)?;
        self.regions[index].label = label.to_string();
        Ok(())
    }

    pub fn label(&self, index: usize) -> Result<&str> {
        Ok(self.get(index)?.label())
    }

    pub fn tube_height(&self, index: usize) -> Result<u32> {
        Ok(self.get(index)?.tube_height())
    }

    /// Index of the first placed region containing frame pixel (`x`, `y`).
    pub fn region_at(&self, x: i32, y: i32) -> Option<usize> {
        self.regions.iter()
            .find(|r| r.rect.is_some_and(|rect| {
                x >= rect.left() && x <= rect.right() &&
                    y >= rect.top() && y <= rect.bottom()
            }))
            .map(|r| r.index)
    }
}

fn check_tube_count(tube_count: usize) -> Result<()> {
    if tube_count < 1 {
        return Err(DetectError::InvalidConfiguration(format!(
            "tube count must be at least 1, got {}", tube_count)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let regions = TubeRegionSet::default();
        assert_eq!(regions.tube_count(), 5);
        for (i, region) in regions.iter().enumerate() {
            assert_eq!(region.index(), i);
            assert_eq!(region.rect(), None);
            assert_eq!(region.tube_height(), 0);
        }
        assert_eq!(regions.label(4).unwrap(), "Tube 5");
    }

    #[test]
    fn test_split_capture_area() {
        let mut regions = TubeRegionSet::new(4).unwrap();
        regions.split_capture_area(Rect::at(100, 50).of_size(400, 300)).unwrap();
        assert_eq!(regions.rects(), vec![
            Some(Rect::at(100, 50).of_size(100, 300)),
            Some(Rect::at(200, 50).of_size(100, 300)),
            Some(Rect::at(300, 50).of_size(100, 300)),
            Some(Rect::at(400, 50).of_size(100, 300))]);
    }

    #[test]
    fn test_split_capture_area_too_narrow() {
        let mut regions = TubeRegionSet::new(5).unwrap();
        let result = regions.split_capture_area(Rect::at(0, 0).of_size(4, 10));
        assert!(matches!(result, Err(DetectError::InvalidConfiguration(_))));
        assert_eq!(regions.rects(), vec![None; 5]);
    }

    #[test]
    fn test_set_tube_count_rejects_zero() {
        let mut regions = TubeRegionSet::new(3).unwrap();
        regions.set_label(1, "w1118").unwrap();
        regions.set_region(1, region_rect(0, 0, 10, 10).unwrap()).unwrap();

        let result = regions.set_tube_count(0);
        assert!(matches!(result, Err(DetectError::InvalidConfiguration(_))));
        assert_eq!(regions.tube_count(), 3);
        assert_eq!(regions.label(1).unwrap(), "w1118");
        assert!(regions.get(1).unwrap().rect().is_some());

        assert!(TubeRegionSet::new(0).is_err());
    }

    #[test]
    fn test_set_tube_count_replaces_table() {
        let mut regions = TubeRegionSet::new(3).unwrap();
        regions.set_label(0, "w1118").unwrap();
        regions.set_tube_count(2).unwrap();
        assert_eq!(regions.tube_count(), 2);
        assert_eq!(regions.labels(), vec!["Tube 1", "Tube 2"]);
    }

    #[test]
    fn test_invalid_index() {
        let mut regions = TubeRegionSet::new(3).unwrap();
        let rect = region_rect(0, 0, 5, 5).unwrap();
        for index in [3, 10, usize::MAX] {
            assert!(matches!(regions.get(index),
                             Err(DetectError::InvalidIndex{tube_count: 3, ..})));
            assert!(matches!(regions.set_region(index, rect),
                             Err(DetectError::InvalidIndex{..})));
            assert!(matches!(regions.set_label(index, "x"),
                             Err(DetectError::InvalidIndex{..})));
            assert!(matches!(regions.label(index),
                             Err(DetectError::InvalidIndex{..})));
            assert!(matches!(regions.move_region(index, 1, 1),
                             Err(DetectError::InvalidIndex{..})));
        }
    }

    #[test]
    fn test_region_rect_rejects_empty() {
        assert!(region_rect(0, 0, 0, 10).is_err());
        assert!(region_rect(0, 0, 10, 0).is_err());
        assert_eq!(region_rect(3, 4, 5, 6).unwrap(), Rect::at(3, 4).of_size(5, 6));
    }

    #[test]
    fn test_set_regions_partial_and_excess() {
        let mut regions = TubeRegionSet::new(3).unwrap();
        let a = region_rect(0, 0, 5, 5).unwrap();
        let b = region_rect(10, 0, 5, 5).unwrap();
        regions.set_regions(&[a]);
        assert_eq!(regions.rects(), vec![Some(a), None, None]);
        regions.set_regions(&[b, b, b, a]);
        assert_eq!(regions.rects(), vec![Some(b); 3]);
    }

    #[test]
    fn test_move_region() {
        let mut regions = TubeRegionSet::new(2).unwrap();
        assert!(regions.move_region(0, 1, 1).is_err());
        regions.set_region(0, region_rect(10, 10, 20, 40).unwrap()).unwrap();
        let moved = regions.move_region(0, -15, 5).unwrap();
        assert_eq!(moved, Rect::at(-5, 15).of_size(20, 40));
        assert_eq!(regions.get(0).unwrap().rect(), Some(moved));
    }

    #[test]
    fn test_apply_and_reset_offset() {
        let mut regions = TubeRegionSet::new(2).unwrap();
        regions.set_region(0, region_rect(10, 10, 20, 40).unwrap()).unwrap();
        regions.apply_offset(5, -3);
        assert_eq!(regions.get(0).unwrap().rect(),
                   Some(Rect::at(15, 7).of_size(20, 40)));
        // Offsets are relative to the placed layout, not cumulative.
        regions.apply_offset(-20, -20);
        assert_eq!(regions.get(0).unwrap().rect(),
                   Some(Rect::at(0, 0).of_size(20, 40)));
        assert_eq!(regions.get(1).unwrap().rect(), None);
        regions.reset_offset();
        assert_eq!(regions.get(0).unwrap().rect(),
                   Some(Rect::at(10, 10).of_size(20, 40)));
    }

    #[test]
    fn test_region_at() {
        let mut regions = TubeRegionSet::new(2).unwrap();
        regions.split_capture_area(Rect::at(0, 0).of_size(100, 50)).unwrap();
        assert_eq!(regions.region_at(10, 10), Some(0));
        assert_eq!(regions.region_at(50, 49), Some(1));
        assert_eq!(regions.region_at(100, 10), None);
        assert_eq!(regions.region_at(10, -1), None);
    }
}
