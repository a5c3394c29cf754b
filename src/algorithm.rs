// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Background subtraction blob detection within tube regions.
//!
//! Given a frame, an empty-tube background image and a tube region, the
//! detector finds fly-sized foreground objects and reports each as a [Blob]
//! carrying its centroid (frame coordinates) and its climbing height, the
//! distance from the tube's bottom edge up to the centroid.
//!
//! # Algorithm
//!
//! For each region:
//!
//! 1. The region is clamped to the frame and background bounds. A region
//!    that is dragged partly off-frame is thus analyzed only where it
//!    overlaps the image; one that is entirely off-frame yields nothing.
//! 2. The per-channel absolute difference between frame and background is
//!    reduced to intensity and binarized at `threshold`.
//! 3. One morphological opening followed by one closing, both with a 3x3
//!    square element, removes speckle noise and fills pinholes.
//! 4. Only external contours are kept: objects nested in the hole of another
//!    object are not reported separately.
//! 5. A contour's area is that of the polygon through its border pixels.
//!    Contours with area outside `[min_area, max_area]` are rejected.
//! 6. The centroid is taken from the polygon's zeroth and first moments and
//!    truncated to integer pixel coordinates.
//!
//! # Not ready
//!
//! With no background or no placed region, detection quietly returns no
//! blobs. A detection loop can therefore poll before setup is complete.

use std::time::Instant;

use image::{imageops, GrayImage, RgbImage};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close, open};
use imageproc::point::Point;
use imageproc::rect::Rect;
use log::{debug, info};
use serde::Serialize;

use crate::background::BackgroundModel;
use crate::image_funcs::{abs_diff_luma, binarize, clamp_to_image};
use crate::regions::TubeRegionSet;

pub const DEFAULT_THRESHOLD: u8 = 15;
pub const DEFAULT_MIN_AREA: f64 = 40.0;
pub const DEFAULT_MAX_AREA: f64 = 500.0;

/// Tunables for [detect_blobs_in_region()].
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct DetectionParams {
    /// Intensity difference a pixel must exceed to count as foreground.
    pub threshold: u8,

    /// Inclusive contour area limits, in square pixels.
    pub min_area: f64,
    pub max_area: f64,
}

impl Default for DetectionParams {
    fn default() -> Self {
        DetectionParams{threshold: DEFAULT_THRESHOLD,
                        min_area: DEFAULT_MIN_AREA,
                        max_area: DEFAULT_MAX_AREA}
    }
}

/// How a [Blob] came to be in a result.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BlobOrigin {
    /// Found by the detector in a single frame.
    Auto,
    /// Placed by the user.
    Manual,
    /// Representative of several observations across frames.
    Merged,
}

/// A candidate fly.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Blob {
    /// Centroid in frame coordinates.
    pub x: i32,
    pub y: i32,

    /// Distance in pixels from the tube's bottom edge up to the centroid.
    pub height: i32,

    /// Contour area in square pixels; 0 for manually placed blobs.
    pub area: f64,

    pub origin: BlobOrigin,
}

/// One detector pass over one frame: `blobs_by_region[i]` holds the blobs of
/// tube `i`.
#[derive(Clone, Debug)]
pub struct DetectionFrame {
    pub frame_number: usize,
    pub sharpness: f64,
    pub blobs_by_region: Vec<Vec<Blob>>,
}

// Zeroth and first moments of a closed polygon.
#[derive(Debug)]
struct PolygonMoments {
    m00: f64,
    m10: f64,
    m01: f64,
}

// Green's theorem over the polygon's edges. The polygon is implicitly closed
// (last point connects to the first). Orientation does not matter; moments
// are normalized to positive area.
fn polygon_moments(points: &[Point<i32>]) -> PolygonMoments {
    let mut m00 = 0.0;
    let mut m10 = 0.0;
    let mut m01 = 0.0;
    if points.len() < 3 {
        return PolygonMoments{m00, m10, m01};
    }
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        let (px, py) = (p.x as f64, p.y as f64);
        let (qx, qy) = (q.x as f64, q.y as f64);
        let cross = px * qy - qx * py;
        m00 += cross;
        m10 += cross * (px + qx);
        m01 += cross * (py + qy);
    }
    m00 /= 2.0;
    m10 /= 6.0;
    m01 /= 6.0;
    if m00 < 0.0 {
        m00 = -m00;
        m10 = -m10;
        m01 = -m01;
    }
    PolygonMoments{m00, m10, m01}
}

/// Area of the polygon through `points` (shoelace formula). Degenerate
/// polygons such as single points or lines have zero area.
pub fn contour_area(points: &[Point<i32>]) -> f64 {
    polygon_moments(points).m00
}

// Returns the region, its clamped rectangle and the external contours of the
// foreground mask within the clamped rectangle. Contour coordinates are
// relative to the clamped rectangle. None if the inputs are not ready.
fn region_contours(frame: &RgbImage, background: Option<&BackgroundModel>,
                   region: Option<Rect>, threshold: u8)
                   -> Option<(Rect, Rect, Vec<Contour<i32>>)> {
    let Some(background) = background else {
        debug!("No background; skipping region");
        return None;
    };
    let Some(region) = region else {
        debug!("Region not placed; skipping");
        return None;
    };
    let bg_image = background.image();
    let width = frame.width().min(bg_image.width());
    let height = frame.height().min(bg_image.height());
    let Some(roi) = clamp_to_image(&region, width, height) else {
        debug!("Region {:?} lies outside the {}x{} frame", region, width, height);
        return None;
    };

    let diff = abs_diff_luma(frame, bg_image, &roi);
    let mask = binarize(&diff, threshold);
    let mask = open(&mask, Norm::LInf, 1);
    let mask = close(&mask, Norm::LInf, 1);

    // find_contours() reports a component touching the image edge as a hole.
    // Tracing on a mask bordered by one pixel of background keeps every
    // component's outer border an Outer contour.
    let mut padded = GrayImage::new(mask.width() + 2, mask.height() + 2);
    imageops::replace(&mut padded, &mask, 1, 1);
    let contours: Vec<Contour<i32>> = find_contours::<i32>(&padded)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|mut c| {
            for p in c.points.iter_mut() {
                p.x -= 1;
                p.y -= 1;
            }
            c
        })
        .collect();
    Some((region, roi, contours))
}

/// Finds the blobs within one tube region of `frame`.
///
/// # Arguments
///   `frame` - The frame to analyze.
///
///   `background` - The empty-tube reference. If None, no blobs are returned.
///
///   `region` - The tube rectangle in frame coordinates. If None, no blobs
///   are returned.
///
///   `params` - Threshold and area limits.
///
/// # Returns
/// Blobs in contour discovery order, each with origin [BlobOrigin::Auto].
pub fn detect_blobs_in_region(frame: &RgbImage,
                              background: Option<&BackgroundModel>,
                              region: Option<Rect>,
                              params: &DetectionParams) -> Vec<Blob> {
    let Some((region, roi, contours)) =
        region_contours(frame, background, region, params.threshold) else {
        return Vec::new();
    };
    let tube_bottom = region.top() + region.height() as i32;

    let mut blobs = Vec::new();
    for contour in &contours {
        let moments = polygon_moments(&contour.points);
        let area = moments.m00;
        if area == 0.0 || area < params.min_area || area > params.max_area {
            debug!("Rejecting contour with area {} in region {:?}", area, region);
            continue;
        }
        let local_x = (moments.m10 / moments.m00) as i32;
        let local_y = (moments.m01 / moments.m00) as i32;
        let x = roi.left() + local_x;
        let y = roi.top() + local_y;
        blobs.push(Blob{x, y, height: tube_bottom - y, area,
                        origin: BlobOrigin::Auto});
    }
    blobs
}

/// Runs [detect_blobs_in_region()] over every tube; entry `i` of the result
/// holds tube `i`'s blobs.
pub fn detect_blobs_in_regions(frame: &RgbImage,
                               background: Option<&BackgroundModel>,
                               regions: &TubeRegionSet,
                               params: &DetectionParams) -> Vec<Vec<Blob>> {
    let detect_start = Instant::now();
    let results: Vec<Vec<Blob>> = regions.iter()
        .map(|r| detect_blobs_in_region(frame, background, r.rect(), params))
        .collect();
    info!("Detected {} blobs over {} tubes in {:?}",
          results.iter().map(Vec::len).sum::<usize>(),
          results.len(), detect_start.elapsed());
    results
}

/// Areas of every external contour with positive area in all tubes, ignoring
/// the configured area limits. Used to calibrate `min_area`.
pub fn contour_areas(frame: &RgbImage, background: Option<&BackgroundModel>,
                     regions: &TubeRegionSet, threshold: u8) -> Vec<f64> {
    let mut areas = Vec::new();
    for region in regions.iter() {
        if let Some((_region, _roi, contours)) =
            region_contours(frame, background, region.rect(), threshold)
        {
            areas.extend(contours.iter()
                         .map(|c| contour_area(&c.points))
                         .filter(|&a| a > 0.0));
        }
    }
    areas
}

/// Suggests a `min_area` of 70% of the mean observed fly area, kept within
/// [10, 200]. None if `areas` is empty.
pub fn suggest_min_area(areas: &[f64]) -> Option<u32> {
    if areas.is_empty() {
        return None;
    }
    let mean = areas.iter().sum::<f64>() / areas.len() as f64;
    Some(((mean * 0.7) as u32).clamp(10, 200))
}

// mod tests.
