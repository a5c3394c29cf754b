// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! The empty-tube reference image used as the subtraction baseline.

use std::time::Instant;

use image::RgbImage;
use log::{info, warn};

use crate::error::{DetectError, Result};
use crate::frame_source::FrameSource;
use crate::image_funcs::average_frames;

/// At most this many frames are sampled when building a background.
pub const MAX_BACKGROUND_SAMPLES: usize = 15;

/// Resolves a background frame range for a recording of `total_frames`.
/// Without an explicit `end_frame` the range covers up to
/// [MAX_BACKGROUND_SAMPLES] frames from `start_frame`, stopping at the last
/// frame.
///
/// # Returns
/// `(start_frame, end_frame)`, or InvalidConfiguration if fewer than two
/// frames remain in the range.
pub fn background_range(start_frame: usize, end_frame: Option<usize>,
                        total_frames: usize) -> Result<(usize, usize)> {
    let last_frame = total_frames.saturating_sub(1);
    let end = end_frame.unwrap_or(
        (start_frame + MAX_BACKGROUND_SAMPLES - 1).min(last_frame));
    if total_frames < 2 || end <= start_frame {
        return Err(DetectError::InvalidConfiguration(format!(
            "background needs at least two frames starting at frame {}; \
             recording has {} frames and the range ends at {}",
            start_frame, total_frames, end)));
    }
    Ok((start_frame, end))
}

#[derive(Clone, Debug)]
pub struct BackgroundModel {
    image: RgbImage,
    sample_count: usize,
}

impl BackgroundModel {
    /// Averages `frames` into a background. Frames sized differently from
    /// the first are left out of the average and of the sample count.
    /// Returns None if `frames` is empty.
    pub fn from_frames(frames: &[RgbImage]) -> Option<BackgroundModel> {
        let (image, sample_count) = average_frames(frames)?;
        Some(BackgroundModel{image, sample_count})
    }

    /// Samples up to [MAX_BACKGROUND_SAMPLES] evenly spaced frames from
    /// `start_frame..=end_frame` and averages them.
    ///
    /// Returns Ok(None) when none of the sampled frames could be read, and
    /// InvalidConfiguration when the range is empty.
    pub fn from_source(source: &mut dyn FrameSource,
                       start_frame: usize, end_frame: usize)
                       -> Result<Option<BackgroundModel>> {
        if start_frame >= end_frame {
            return Err(DetectError::InvalidConfiguration(format!(
                "background range {}..={} is empty", start_frame, end_frame)));
        }
        let build_start = Instant::now();
        let span = end_frame - start_frame + 1;
        let sample_count = span.min(MAX_BACKGROUND_SAMPLES);
        let step = (span / sample_count).max(1);

        let mut frames = Vec::with_capacity(sample_count);
        for i in 0..sample_count {
            let frame_number = start_frame + i * step;
            if frame_number > end_frame {
                break;
            }
            match source.get_frame(frame_number) {
                Some(frame) => frames.push(frame),
                None => warn!("Background sample frame {} unavailable", frame_number),
            }
        }
        let model = BackgroundModel::from_frames(&frames);
        if let Some(m) = &model {
            info!("Background built from {} frames in {:?}",
                  m.sample_count, build_start.elapsed());
        }
        Ok(model)
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Number of frames averaged into the background.
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }
}
