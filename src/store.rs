// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Per-region detection results and the climbing statistics derived from
//! them.
//!
//! Each region has a *current result* (the blobs shown to the user and
//! exported as the consensus) and a *history* of every height observed by a
//! detection pass since the last reset. A pass updates:
//!
//! * current height: the highest blob of the pass, or 0 if none;
//! * maximum height: the largest current height seen;
//! * average height: mean of the history.
//!
//! Manual corrections edit the current result only; they neither extend the
//! history nor change the statistics.

use serde::Serialize;

use crate::algorithm::{Blob, DetectionParams};
use crate::error::{DetectError, Result};
use crate::regions::TubeRegionSet;

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct RegionStats {
    pub current_height: i32,
    pub max_height: i32,
    pub avg_height: f64,
}

/// One entry of [DetectionStore::compare_genotypes()].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GenotypeComparison {
    #[serde(rename = "name")]
    pub label: String,
    pub index: usize,
    pub max_height: i32,
    pub avg_height: f64,
    pub current_height: i32,
}

/// Everything the exporters need, copied out of the session so writing can
/// proceed without borrowing it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExportSnapshot {
    pub tube_count: usize,
    pub genotype_names: Vec<String>,
    pub detection_history: Vec<Vec<i32>>,
    pub max_heights: Vec<i32>,
    pub avg_heights: Vec<f64>,
    pub climbing_heights: Vec<i32>,
    /// `[x, y, width, height]` per region; None for unset regions.
    pub tube_regions: Vec<Option<(i32, i32, u32, u32)>>,
    pub genotype_comparison: Vec<GenotypeComparison>,
    pub detection_parameters: DetectionParams,

    /// Heights of each region's current result.
    #[serde(skip)]
    pub fly_heights: Vec<Vec<i32>>,
    /// 0 for unset regions.
    #[serde(skip)]
    pub tube_heights: Vec<u32>,
}

#[derive(Clone, Debug, Default)]
struct RegionRecord {
    current: Vec<Blob>,
    stats: RegionStats,
    history: Vec<i32>,
}

impl RegionRecord {
    fn record(&mut self, blobs: Vec<Blob>) {
        self.stats.current_height = blobs.iter().map(|b| b.height).max().unwrap_or(0);
        self.stats.max_height = self.stats.max_height.max(self.stats.current_height);
        self.history.extend(blobs.iter().map(|b| b.height));
        if !self.history.is_empty() {
            let sum: i64 = self.history.iter().map(|&h| h as i64).sum();
            self.stats.avg_height = sum as f64 / self.history.len() as f64;
        }
        self.current = blobs;
    }
}

#[derive(Clone, Debug)]
pub struct DetectionStore {
    records: Vec<RegionRecord>,
}

impl DetectionStore {
    pub fn new(tube_count: usize) -> DetectionStore {
        DetectionStore{records: vec![RegionRecord::default(); tube_count]}
    }

    pub fn tube_count(&self) -> usize {
        self.records.len()
    }

    fn record(&self, index: usize) -> Result<&RegionRecord> {
        let tube_count = self.records.len();
        self.records.get(index).ok_or(DetectError::InvalidIndex{index, tube_count})
    }

    /// Makes `blobs` region `index`'s current result and runs one
    /// statistics pass with their heights.
    pub fn record_pass(&mut self, index: usize, blobs: Vec<Blob>) -> Result<()> {
        let tube_count = self.records.len();
        self.records.get_mut(index)
            .ok_or(DetectError::InvalidIndex{index, tube_count})?
            .record(blobs);
        Ok(())
    }

    /// Replaces every region's current result with the merged blobs and
    /// runs one statistics pass per region. `results` must hold one entry
    /// per region.
    pub fn apply_consensus(&mut self, results: Vec<Vec<Blob>>) -> Result<()> {
        if results.len() != self.records.len() {
            return Err(DetectError::InvalidConfiguration(format!(
                "consensus has {} regions, store has {}",
                results.len(), self.records.len())));
        }
        for (record, blobs) in self.records.iter_mut().zip(results) {
            record.record(blobs);
        }
        Ok(())
    }

    pub fn current(&self, index: usize) -> Result<&[Blob]> {
        Ok(&self.record(index)?.current)
    }

    pub(crate) fn current_mut(&mut self, index: usize) -> Result<&mut Vec<Blob>> {
        let tube_count = self.records.len();
        self.records.get_mut(index)
            .map(|r| &mut r.current)
            .ok_or(DetectError::InvalidIndex{index, tube_count})
    }

    pub fn stats(&self, index: usize) -> Result<RegionStats> {
        Ok(self.record(index)?.stats)
    }

    pub fn history(&self, index: usize) -> Result<&[i32]> {
        Ok(&self.record(index)?.history)
    }

    /// Ranks the placed regions that have any history by average height,
    /// highest first. Equal averages keep region order.
    pub fn compare_genotypes(&self, regions: &TubeRegionSet) -> Vec<GenotypeComparison> {
        let mut comparison: Vec<GenotypeComparison> = self.records.iter()
            .enumerate()
            .filter(|(_, r)| !r.history.is_empty())
            .filter_map(|(index, r)| {
                let region = regions.get(index).ok()
                    .filter(|region| region.rect().is_some())?;
                Some(GenotypeComparison{label: region.label().to_string(),
                                        index,
                                        max_height: r.stats.max_height,
                                        avg_height: r.stats.avg_height,
                                        current_height: r.stats.current_height})
            })
            .collect();
        comparison.sort_by(|a, b| b.avg_height.total_cmp(&a.avg_height));
        comparison
    }

    /// Clears results, statistics and history of every region.
    pub fn reset(&mut self) {
        let tube_count = self.records.len();
        self.records = vec![RegionRecord::default(); tube_count];
    }

    /// Discards everything and starts over with `tube_count` empty regions.
    pub fn resize(&mut self, tube_count: usize) {
        self.records = vec![RegionRecord::default(); tube_count];
    }

    pub fn export(&self, regions: &TubeRegionSet, params: &DetectionParams) -> ExportSnapshot {
        let region_list: Vec<_> = regions.iter().collect();
        ExportSnapshot{
            tube_count: self.records.len(),
            genotype_names: regions.labels(),
            detection_history: self.records.iter().map(|r| r.history.clone()).collect(),
            max_heights: self.records.iter().map(|r| r.stats.max_height).collect(),
            avg_heights: self.records.iter().map(|r| r.stats.avg_height).collect(),
            climbing_heights: self.records.iter()
                .map(|r| r.stats.current_height).collect(),
            tube_regions: region_list.iter()
                .map(|r| r.rect().map(|rect| (rect.left(), rect.top(),
                                              rect.width(), rect.height())))
                .collect(),
            genotype_comparison: self.compare_genotypes(regions),
            detection_parameters: *params,
            fly_heights: self.records.iter()
                .map(|r| r.current.iter().map(|b| b.height).collect())
                .collect(),
            tube_heights: region_list.iter().map(|r| r.tube_height()).collect(),
        }
    }
}
