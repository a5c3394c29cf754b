// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Merges per-frame detections into one set of positions per region.
//!
//! The same fly is usually detected in each of the ranked frames at nearly
//! the same place. Observations are clustered greedily: each is compared
//! against the representatives of the clusters seen so far, in creation
//! order, and joins the first one closer than [MERGE_DISTANCE]. A cluster's
//! representative is its highest-climbing observation. The result depends
//! on observation order.

use log::debug;

use crate::algorithm::{Blob, BlobOrigin, DetectionFrame};

/// Observations closer than this (pixels, Euclidean) are the same fly.
pub const MERGE_DISTANCE: f64 = 10.0;

struct Cluster {
    representative: Blob,
    observations: usize,
}

fn distance(a: &Blob, b: &Blob) -> f64 {
    let dx = (a.x - b.x) as f64;
    let dy = (a.y - b.y) as f64;
    (dx * dx + dy * dy).sqrt()
}

/// Clusters one region's observations, given in frame order and then in
/// discovery order within a frame.
///
/// # Returns
/// One representative per cluster, in order of cluster creation. A
/// representative that absorbed other observations is tagged
/// [BlobOrigin::Merged]; singletons keep their origin.
pub fn merge_observations<'a, I>(observations: I) -> Vec<Blob>
where I: IntoIterator<Item = &'a Blob>
{
    let mut clusters = Vec::<Cluster>::new();
    for blob in observations {
        match clusters.iter_mut()
            .find(|c| distance(&c.representative, blob) < MERGE_DISTANCE)
        {
            Some(cluster) => {
                cluster.observations += 1;
                if blob.height > cluster.representative.height {
                    cluster.representative = *blob;
                }
            },
            None => clusters.push(Cluster{representative: *blob, observations: 1}),
        }
    }
    clusters.into_iter().map(|c| {
        let mut blob = c.representative;
        if c.observations > 1 {
            blob.origin = BlobOrigin::Merged;
        }
        blob
    }).collect()
}

/// Merges the detections of several frames, region by region.
///
/// `frames` must be in frame order. The result has one entry per region;
/// regions absent from some frames are treated as having no observations
/// there.
pub fn merge_frames(frames: &[DetectionFrame]) -> Vec<Vec<Blob>> {
    let region_count = frames.iter()
        .map(|f| f.blobs_by_region.len()).max().unwrap_or(0);
    let merged: Vec<Vec<Blob>> = (0..region_count).map(|region| {
        merge_observations(frames.iter()
                           .filter_map(|f| f.blobs_by_region.get(region))
                           .flatten())
    }).collect();
    debug!("Merged {} frames into {:?} blobs per region", frames.len(),
           merged.iter().map(Vec::len).collect::<Vec<_>>());
    merged
}

/// How many flies one contributing frame yielded, across all regions.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameSummary {
    pub frame_number: usize,
    pub sharpness: f64,
    pub blob_count: usize,
}

/// Outcome of merging a set of frames: what each frame found on its own
/// and how many flies the consensus holds.
#[derive(Clone, Debug, PartialEq)]
pub struct MergeSummary {
    /// In the order the frames were merged.
    pub frames: Vec<FrameSummary>,
    pub merged_count: usize,
}

impl MergeSummary {
    /// Summarizes `frames` and the `merged` result of
    /// [merge_frames()] on them.
    pub fn new(frames: &[DetectionFrame], merged: &[Vec<Blob>]) -> MergeSummary {
        MergeSummary{
            frames: frames.iter().map(|f| FrameSummary{
                frame_number: f.frame_number,
                sharpness: f.sharpness,
                blob_count: f.blobs_by_region.iter().map(Vec::len).sum(),
            }).collect(),
            merged_count: merged.iter().map(Vec::len).sum(),
        }
    }

    pub fn frame_numbers(&self) -> Vec<usize> {
        self.frames.iter().map(|f| f.frame_number).collect()
    }

    /// Largest fly count of any single contributing frame.
    pub fn best_single_frame(&self) -> usize {
        self.frames.iter().map(|f| f.blob_count).max().unwrap_or(0)
    }

    /// Flies the consensus found beyond the best single frame.
    pub fn gained_over_best_frame(&self) -> usize {
        self.merged_count.saturating_sub(self.best_single_frame())
    }
}
