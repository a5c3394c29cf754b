// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use image::{Rgb, RgbImage};
use imageproc::drawing;

use crate::algorithm::BlobOrigin;
use crate::regions::TubeRegionSet;
use crate::store::DetectionStore;

pub const REGION_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const HEIGHT_LINE_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
pub const BLOB_RADIUS: i32 = 5;

fn blob_color(origin: BlobOrigin) -> Rgb<u8> {
    match origin {
        BlobOrigin::Auto => Rgb([255, 0, 0]),
        BlobOrigin::Merged => Rgb([255, 160, 0]),
        BlobOrigin::Manual => Rgb([255, 0, 255]),
    }
}

/// Scribbles the tube outlines, each tube's current blobs and a horizontal
/// line at its current climbing height onto `frame`. Unplaced tubes are
/// skipped.
pub fn draw_detections(frame: &mut RgbImage, regions: &TubeRegionSet,
                       store: &DetectionStore) {
    for region in regions.iter() {
        let Some(rect) = region.rect() else {
            continue;
        };
        drawing::draw_hollow_rect_mut(frame, rect, REGION_COLOR);

        let Ok(blobs) = store.current(region.index()) else {
            continue;
        };
        let current_height = store.stats(region.index())
            .map_or(0, |s| s.current_height);
        if current_height > 0 {
            let line_y = (rect.top() + rect.height() as i32 - current_height) as f32;
            drawing::draw_line_segment_mut(
                frame,
                (rect.left() as f32, line_y),
                ((rect.left() + rect.width() as i32) as f32, line_y),
                HEIGHT_LINE_COLOR);
        }
        for blob in blobs {
            drawing::draw_filled_circle_mut(frame, (blob.x, blob.y), BLOB_RADIUS,
                                            blob_color(blob.origin));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::rect::Rect;

    use crate::algorithm::Blob;

    #[test]
    fn test_draw_detections() {
        let mut regions = TubeRegionSet::new(2).unwrap();
        regions.set_region(0, Rect::at(10, 10).of_size(30, 60)).unwrap();
        let mut store = DetectionStore::new(2);
        store.record_pass(0, vec![Blob{x: 25, y: 40, height: 30, area: 60.0,
                                       origin: BlobOrigin::Auto}]).unwrap();
        store.record_pass(1, vec![Blob{x: 60, y: 40, height: 30, area: 60.0,
                                       origin: BlobOrigin::Auto}]).unwrap();

        let mut frame = RgbImage::new(80, 80);
        draw_detections(&mut frame, &regions, &store);

        assert_eq!(*frame.get_pixel(10, 10), REGION_COLOR);
        assert_eq!(*frame.get_pixel(25, 40), blob_color(BlobOrigin::Auto));
        // Height line at y = 10 + 60 - 30; blobs are drawn over it.
        assert_eq!(*frame.get_pixel(35, 40), HEIGHT_LINE_COLOR);
        // Tube 1 is unplaced and not drawn.
        assert_eq!(*frame.get_pixel(60, 40), Rgb([0, 0, 0]));
    }
}
