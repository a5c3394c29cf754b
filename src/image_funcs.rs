// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use image::{GrayImage, Luma, RgbImage};
use imageproc::rect::Rect;
use log::warn;

// Integer BT.601 luma weights, scaled by 2^14.
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;

fn luma_of(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * LUMA_R + g as u32 * LUMA_G + b as u32 * LUMA_B + (1 << 13)) >> 14)
        as u8
}

/// Converts an RGB frame to single channel intensity.
pub fn to_gray(image: &RgbImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut gray_pixels = Vec::with_capacity((width * height) as usize);
    for rgb in image.as_raw().chunks_exact(3) {
        gray_pixels.push(luma_of(rgb[0], rgb[1], rgb[2]));
    }
    GrayImage::from_raw(width, height, gray_pixels)
        .unwrap_or_else(|| GrayImage::new(width, height))
}

/// Computes the per-channel absolute difference between `frame` and
/// `background` over `roi`, then reduces it to intensity. The result has the
/// size of `roi`; (0, 0) of the result is the ROI's top left pixel.
///
/// `roi` must lie within both images; see [clamp_to_image()].
pub fn abs_diff_luma(frame: &RgbImage, background: &RgbImage, roi: &Rect)
                     -> GrayImage {
    let mut diff = GrayImage::new(roi.width(), roi.height());
    for y in 0..roi.height() {
        for x in 0..roi.width() {
            let gx = roi.left() as u32 + x;
            let gy = roi.top() as u32 + y;
            let f = frame.get_pixel(gx, gy).0;
            let b = background.get_pixel(gx, gy).0;
            let value = luma_of(f[0].abs_diff(b[0]),
                                f[1].abs_diff(b[1]),
                                f[2].abs_diff(b[2]));
            diff.put_pixel(x, y, Luma([value]));
        }
    }
    diff
}

/// Pixels strictly brighter than `threshold` become 255, all others 0.
pub fn binarize(image: &GrayImage, threshold: u8) -> GrayImage {
    let (width, height) = image.dimensions();
    let pixels: Vec<u8> = image.as_raw().iter()
        .map(|&p| if p > threshold { 255 } else { 0 })
        .collect();
    GrayImage::from_raw(width, height, pixels)
        .unwrap_or_else(|| GrayImage::new(width, height))
}

/// Pixel-wise mean of `frames`. Frames whose dimensions differ from the first
/// frame are ignored.
///
/// # Returns
/// The mean image and the number of frames averaged into it, or None if
/// `frames` is empty.
pub fn average_frames(frames: &[RgbImage]) -> Option<(RgbImage, usize)> {
    let first = frames.first()?;
    if frames.len() == 1 {
        return Some((first.clone(), 1));
    }
    let (width, height) = first.dimensions();
    let mut sums = vec![0_u32; (width * height * 3) as usize];
    let mut count = 0_u32;
    for frame in frames {
        if frame.dimensions() != (width, height) {
            warn!("Ignoring {}x{} frame while averaging {}x{} frames",
                  frame.width(), frame.height(), width, height);
            continue;
        }
        for (sum, &value) in sums.iter_mut().zip(frame.as_raw().iter()) {
            *sum += value as u32;
        }
        count += 1;
    }
    // Truncate rather than round, matching a float mean cast back to u8.
    let averaged: Vec<u8> = sums.into_iter()
        .map(|sum| (sum as f32 / count as f32).clamp(0.0, 255.0) as u8)
        .collect();
    let image = RgbImage::from_raw(width, height, averaged)?;
    Some((image, count as usize))
}

/// Returns the part of `rect` that lies within a `width` x `height` image,
/// or None if they do not overlap.
pub fn clamp_to_image(rect: &Rect, width: u32, height: u32) -> Option<Rect> {
    if width == 0 || height == 0 {
        return None;
    }
    rect.intersect(Rect::at(0, 0).of_size(width, height))
}
