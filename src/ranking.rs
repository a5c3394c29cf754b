// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Picks the best observation window around a target frame. Frames are
//! scored by focus quality, the variance of their Laplacian response; the
//! sharpest frame and its two nearest neighbors are returned.

use std::time::Instant;

use image::{GrayImage, RgbImage};
use imageproc::filter::laplacian_filter;
use log::{debug, info, warn};

use crate::frame_source::FrameSource;
use crate::histogram_funcs::{laplacian_histogram, variance_of_histogram};
use crate::image_funcs::to_gray;

pub const DEFAULT_HALF_WINDOW: usize = 10;

/// A frame chosen by [rank_window()].
#[derive(Clone, Debug)]
pub struct RankedFrame {
    pub frame_number: usize,
    pub image: RgbImage,
    pub sharpness: f64,
}

/// Focus score of a grayscale image: the variance of its 3x3 Laplacian
/// response. Higher is sharper.
pub fn sharpness_of_gray(image: &GrayImage) -> f64 {
    let laplacian = laplacian_filter(image);
    let histogram = laplacian_histogram(laplacian.pixels().map(|p| p.0[0]));
    variance_of_histogram(&histogram)
}

pub fn sharpness(image: &RgbImage) -> f64 {
    sharpness_of_gray(&to_gray(image))
}

// Given window [start, end] and the sharpest frame within it, returns the
// sharpest frame and its neighbors in ascending order. At a window edge the
// triple is shifted inward so it still holds three distinct frames whenever
// the window has at least three.
fn select_neighbors(start: usize, end: usize, sharpest: usize) -> Vec<usize> {
    debug_assert!(start <= sharpest && sharpest <= end);
    let prev = sharpest.saturating_sub(1).max(start);
    let next = (sharpest + 1).min(end);
    let mut frames = if prev == sharpest {
        vec![sharpest, next, (next + 1).min(end)]
    } else if next == sharpest {
        vec![prev.saturating_sub(1).max(start), prev, sharpest]
    } else {
        vec![prev, sharpest, next]
    };
    frames.dedup();
    frames
}

/// Scores every frame in `[target - half_window, target + half_window]`
/// (clamped to the source's frames) and returns the sharpest one together
/// with its immediate neighbors.
///
/// Ties for sharpest go to the earliest frame. Frames the source cannot
/// deliver are skipped, so fewer than three frames may be returned.
///
/// # Returns
/// Up to three frames ordered by frame number. The source is left positioned
/// at the sharpest frame; if no frame could be scored, the result is empty
/// and the position is unchanged.
pub fn rank_window(source: &mut dyn FrameSource, target: usize,
                   half_window: usize) -> Vec<RankedFrame> {
    let rank_start = Instant::now();
    let total = source.total_frame_count();
    if total == 0 {
        warn!("Frame source is empty; nothing to rank");
        return Vec::new();
    }
    let start = target.saturating_sub(half_window);
    let end = target.saturating_add(half_window).min(total - 1);
    if start > end {
        warn!("Target frame {} is beyond the last frame {}", target, total - 1);
        return Vec::new();
    }

    let mut scored = Vec::<RankedFrame>::with_capacity(end - start + 1);
    for frame_number in start..=end {
        let Some(image) = source.get_frame(frame_number) else {
            debug!("Frame {} unavailable; not ranked", frame_number);
            continue;
        };
        let score = sharpness(&image);
        debug!("Frame {} sharpness {:.2}", frame_number, score);
        scored.push(RankedFrame{frame_number, image, sharpness: score});
    }

    let mut sharpest: Option<&RankedFrame> = None;
    for frame in &scored {
        if sharpest.map_or(true, |s| frame.sharpness > s.sharpness) {
            sharpest = Some(frame);
        }
    }
    let Some(sharpest) = sharpest.map(|f| f.frame_number) else {
        warn!("No frame in {}..={} could be read", start, end);
        return Vec::new();
    };

    let selected = select_neighbors(start, end, sharpest);
    let ranked: Vec<RankedFrame> = scored.into_iter()
        .filter(|f| selected.contains(&f.frame_number))
        .collect();
    source.seek(sharpest);
    info!("Ranked frames {}..={} in {:?}; sharpest {}, selected {:?}",
          start, end, rank_start.elapsed(), sharpest,
          ranked.iter().map(|f| f.frame_number).collect::<Vec<_>>());
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_source::FrameSequence;
    use image::Rgb;

    // Vertical stripes of the given contrast; more contrast is sharper.
    fn striped(contrast: u8) -> RgbImage {
        RgbImage::from_fn(16, 16, |x, _y| {
            let v = if x % 2 == 0 { 100 + contrast } else { 100 };
            Rgb([v, v, v])
        })
    }

    fn source_with_contrasts(contrasts: &[u8]) -> FrameSequence {
        FrameSequence::new(contrasts.iter().map(|&c| striped(c)).collect())
    }

    fn numbers(frames: &[RankedFrame]) -> Vec<usize> {
        frames.iter().map(|f| f.frame_number).collect()
    }

    // A source that cannot decode some frames.
    struct GappySource {
        inner: FrameSequence,
        missing: Vec<usize>,
    }

    impl FrameSource for GappySource {
        fn get_frame(&mut self, frame_number: usize) -> Option<RgbImage> {
            if self.missing.contains(&frame_number) {
                return None;
            }
            self.inner.get_frame(frame_number)
        }
        fn total_frame_count(&self) -> usize { self.inner.total_frame_count() }
        fn position(&self) -> usize { self.inner.position() }
        fn seek(&mut self, frame_number: usize) { self.inner.seek(frame_number) }
    }

    #[test]
    fn test_sharpness() {
        assert_eq!(sharpness(&striped(0)), 0.0);
        assert!(sharpness(&striped(40)) > sharpness(&striped(10)));
        assert!(sharpness(&striped(10)) > 0.0);
    }

    #[test]
    fn test_select_neighbors() {
        assert_eq!(select_neighbors(2, 22, 15), vec![14, 15, 16]);
        assert_eq!(select_neighbors(2, 22, 2), vec![2, 3, 4]);
        assert_eq!(select_neighbors(2, 22, 22), vec![20, 21, 22]);
        assert_eq!(select_neighbors(0, 1, 0), vec![0, 1]);
        assert_eq!(select_neighbors(0, 1, 1), vec![0, 1]);
        assert_eq!(select_neighbors(5, 5, 5), vec![5]);
    }

    #[test]
    fn test_rank_window_interior() {
        let mut contrasts = vec![5_u8; 30];
        contrasts[15] = 50;
        let mut source = source_with_contrasts(&contrasts);
        let ranked = rank_window(&mut source, 12, 10);
        assert_eq!(numbers(&ranked), vec![14, 15, 16]);
        assert!(ranked[1].sharpness > ranked[0].sharpness);
        assert_eq!(source.position(), 15);
    }

    #[test]
    fn test_rank_window_sharpest_at_edges() {
        let mut contrasts = vec![5_u8; 30];
        // Outside the 7..=13 window; must not win.
        contrasts[2] = 90;
        contrasts[7] = 50;
        let mut source = source_with_contrasts(&contrasts);
        assert_eq!(numbers(&rank_window(&mut source, 10, 3)), vec![7, 8, 9]);
        assert_eq!(source.position(), 7);

        contrasts[7] = 5;
        contrasts[13] = 50;
        let mut source = source_with_contrasts(&contrasts);
        assert_eq!(numbers(&rank_window(&mut source, 10, 3)), vec![11, 12, 13]);
        assert_eq!(source.position(), 13);
    }

    #[test]
    fn test_rank_window_tie_goes_to_first() {
        let mut contrasts = vec![5_u8; 20];
        contrasts[8] = 50;
        contrasts[12] = 50;
        let mut source = source_with_contrasts(&contrasts);
        assert_eq!(numbers(&rank_window(&mut source, 10, 10)), vec![7, 8, 9]);
        assert_eq!(source.position(), 8);
    }

    #[test]
    fn test_rank_window_clamped_to_source() {
        let mut source = source_with_contrasts(&[5, 30]);
        let ranked = rank_window(&mut source, 0, 10);
        assert_eq!(numbers(&ranked), vec![0, 1]);
        assert_eq!(source.position(), 1);

        let mut source = source_with_contrasts(&[5, 30, 5]);
        assert!(rank_window(&mut source, 50, 10).is_empty());
        assert_eq!(source.position(), 0);
    }

    #[test]
    fn test_rank_window_empty_source() {
        let mut source = FrameSequence::default();
        assert!(rank_window(&mut source, 0, 10).is_empty());
    }

    #[test]
    fn test_rank_window_skips_missing_frames() {
        let mut contrasts = vec![5_u8; 20];
        contrasts[10] = 50;
        let mut source = GappySource{inner: source_with_contrasts(&contrasts),
                                     missing: vec![11]};
        let ranked = rank_window(&mut source, 10, 5);
        assert_eq!(numbers(&ranked), vec![9, 10]);
        assert_eq!(source.position(), 10);

        let mut source = GappySource{inner: source_with_contrasts(&contrasts),
                                     missing: (0..20).collect()};
        assert!(rank_window(&mut source, 10, 5).is_empty());
        assert_eq!(source.position(), 0);
    }
}
