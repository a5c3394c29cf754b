// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::fs;
use std::path::Path;

use image::{ImageReader, RgbImage};
use log::{info, warn};

use crate::error::Result;

/// The contract consumed from a video playback subsystem. Frames are numbered
/// from 0 to `total_frame_count() - 1`.
pub trait FrameSource {
    /// Decodes frame `frame_number`. Returns None for out of range numbers or
    /// frames that cannot be decoded. Does not move the logical position
    /// reported by `position()`.
    fn get_frame(&mut self, frame_number: usize) -> Option<RgbImage>;

    fn total_frame_count(&self) -> usize;

    /// The frame the playback cursor is on.
    fn position(&self) -> usize;

    /// Moves the playback cursor. Out of range requests are ignored.
    fn seek(&mut self, frame_number: usize);
}

/// An in-memory frame source; also stands in for a decoded video when frames
/// are supplied as a directory of still images.
#[derive(Clone, Debug, Default)]
pub struct FrameSequence {
    frames: Vec<RgbImage>,
    position: usize,
}

impl FrameSequence {
    pub fn new(frames: Vec<RgbImage>) -> FrameSequence {
        FrameSequence{frames, position: 0}
    }

    /// Loads every decodable image file in `dir`, ordered by file name.
    /// Files that fail to decode are skipped with a warning.
    pub fn from_dir(dir: &Path) -> Result<FrameSequence> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        let mut frames = Vec::with_capacity(paths.len());
        for path in paths {
            match ImageReader::open(&path)?.decode() {
                Ok(img) => frames.push(img.into_rgb8()),
                Err(e) => warn!("Skipping {:?} due to: {:?}", path, e),
            }
        }
        info!("Loaded {} frames from {:?}", frames.len(), dir);
        Ok(FrameSequence::new(frames))
    }
}

impl FrameSource for FrameSequence {
    fn get_frame(&mut self, frame_number: usize) -> Option<RgbImage> {
        self.frames.get(frame_number).cloned()
    }

    fn total_frame_count(&self) -> usize {
        self.frames.len()
    }

    fn position(&self) -> usize {
        self.position
    }

    fn seek(&mut self, frame_number: usize) {
        if frame_number < self.frames.len() {
            self.position = frame_number;
        }
    }
}
