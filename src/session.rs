// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! A [ClimbingSession] holds everything about one assay recording: tube
//! layout, background, detection parameters, results, and manual edits. All
//! mutation goes through `&mut self`, so region edits, detection and manual
//! corrections are naturally serialized.

use std::sync::mpsc::Receiver;

use image::RgbImage;
use imageproc::rect::Rect;
use log::{debug, info};

use crate::algorithm::{contour_areas, detect_blobs_in_regions, suggest_min_area,
                       Blob, DetectionFrame, DetectionParams};
use crate::background::BackgroundModel;
use crate::consensus::{merge_frames, MergeSummary};
use crate::corrections::{ManualCorrectionLog, ManualEdit, UndoOutcome};
use crate::error::{DetectError, Result};
use crate::events::{EventBus, SessionEvent};
use crate::frame_source::FrameSource;
use crate::ranking::{rank_window, RankedFrame};
use crate::regions::TubeRegionSet;
use crate::store::{ExportSnapshot, DetectionStore};

#[derive(Debug)]
pub struct ClimbingSession {
    regions: TubeRegionSet,
    background: Option<BackgroundModel>,
    params: DetectionParams,
    store: DetectionStore,
    corrections: ManualCorrectionLog,
    events: EventBus,
}

impl Default for ClimbingSession {
    fn default() -> Self {
        Self::with_regions(TubeRegionSet::default())
    }
}

impl ClimbingSession {
    pub fn new(tube_count: usize) -> Result<ClimbingSession> {
        Ok(Self::with_regions(TubeRegionSet::new(tube_count)?))
    }

    fn with_regions(regions: TubeRegionSet) -> ClimbingSession {
        let store = DetectionStore::new(regions.tube_count());
        ClimbingSession{regions, background: None,
                        params: DetectionParams::default(), store,
                        corrections: ManualCorrectionLog::new(),
                        events: EventBus::new()}
    }

    pub fn subscribe(&mut self) -> Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn regions(&self) -> &TubeRegionSet {
        &self.regions
    }

    pub fn background(&self) -> Option<&BackgroundModel> {
        self.background.as_ref()
    }

    pub fn params(&self) -> &DetectionParams {
        &self.params
    }

    pub fn store(&self) -> &DetectionStore {
        &self.store
    }

    pub fn corrections(&self) -> &ManualCorrectionLog {
        &self.corrections
    }

    pub fn set_params(&mut self, params: DetectionParams) -> Result<()> {
        if params.min_area > params.max_area {
            return Err(DetectError::InvalidConfiguration(format!(
                "min_area {} exceeds max_area {}", params.min_area, params.max_area)));
        }
        self.params = params;
        Ok(())
    }

    /// Rebuilds the region table with `tube_count` unplaced tubes. Results
    /// and manual edits are discarded since they refer to the old layout.
    pub fn set_tube_count(&mut self, tube_count: usize) -> Result<()> {
        self.regions.set_tube_count(tube_count)?;
        self.store.resize(tube_count);
        self.corrections.clear();
        self.events.publish(SessionEvent::RegionsReplaced{tube_count});
        Ok(())
    }

    pub fn split_capture_area(&mut self, area: Rect) -> Result<()> {
        self.regions.split_capture_area(area)?;
        self.events.publish(SessionEvent::RegionsReplaced{
            tube_count: self.regions.tube_count()});
        Ok(())
    }

    pub fn set_regions(&mut self, rects: &[Rect]) {
        self.regions.set_regions(rects);
        self.events.publish(SessionEvent::RegionsReplaced{
            tube_count: self.regions.tube_count()});
    }

    pub fn move_region(&mut self, index: usize, dx: i32, dy: i32) -> Result<Rect> {
        let rect = self.regions.move_region(index, dx, dy)?;
        self.events.publish(SessionEvent::RegionMoved{index, rect});
        Ok(rect)
    }

    pub fn apply_offset(&mut self, dx: i32, dy: i32) {
        self.regions.apply_offset(dx, dy);
        self.events.publish(SessionEvent::RegionsReplaced{
            tube_count: self.regions.tube_count()});
    }

    /// Undoes every [apply_offset()](Self::apply_offset) since the regions
    /// were last placed.
    pub fn reset_offset(&mut self) {
        self.regions.reset_offset();
        self.events.publish(SessionEvent::RegionsReplaced{
            tube_count: self.regions.tube_count()});
    }

    pub fn set_label(&mut self, index: usize, label: &str) -> Result<()> {
        self.regions.set_label(index, label)?;
        self.events.publish(SessionEvent::LabelChanged{index, label: label.to_string()});
        Ok(())
    }

    pub fn set_background(&mut self, background: BackgroundModel) {
        let sample_count = background.sample_count();
        self.background = Some(background);
        self.events.publish(SessionEvent::BackgroundUpdated{sample_count});
    }

    /// Builds the background from `start_frame..=end_frame` of `source`.
    /// Returns false, keeping any previous background, if no frame in the
    /// range could be read.
    pub fn set_background_from_range(&mut self, source: &mut dyn FrameSource,
                                     start_frame: usize, end_frame: usize)
                                     -> Result<bool> {
        match BackgroundModel::from_source(source, start_frame, end_frame)? {
            Some(background) => {
                self.set_background(background);
                Ok(true)
            },
            None => Ok(false),
        }
    }

    fn not_ready(&self) -> bool {
        if self.background.is_none() {
            debug!("No background yet; skipping detection");
            return true;
        }
        false
    }

    /// Live detection of a single frame. Each placed region's blobs become
    /// its current result and go through one statistics pass. Before a
    /// background exists nothing is recorded and every list is empty.
    pub fn detect_frame(&mut self, frame_number: usize, frame: &RgbImage)
                        -> Result<Vec<Vec<Blob>>> {
        if self.not_ready() {
            return Ok(vec![Vec::new(); self.regions.tube_count()]);
        }
        let results = detect_blobs_in_regions(frame, self.background.as_ref(),
                                              &self.regions, &self.params);
        for (region, blobs) in self.regions.iter().zip(&results) {
            if region.rect().is_some() {
                self.store.record_pass(region.index(), blobs.clone())?;
            }
        }
        self.events.publish(SessionEvent::FrameDetected{frame_number});
        Ok(results)
    }

    /// Ranks the frames around `target`, then detects and merges the chosen
    /// frames as [apply_ranked()](Self::apply_ranked) does.
    ///
    /// # Returns
    /// What the contributing frames found, or None if nothing was applied.
    pub fn final_frame_detection(&mut self, source: &mut dyn FrameSource,
                                 target: usize, half_window: usize)
                                 -> Result<Option<MergeSummary>> {
        if self.not_ready() {
            return Ok(None);
        }
        let ranked = rank_window(source, target, half_window);
        self.apply_ranked(&ranked)
    }

    /// Detects blobs in each ranked frame, merges them across frames and
    /// replaces every region's current result with the consensus.
    pub fn apply_ranked(&mut self, ranked: &[RankedFrame])
                        -> Result<Option<MergeSummary>> {
        if self.not_ready() || ranked.is_empty() {
            return Ok(None);
        }
        let frames: Vec<DetectionFrame> = ranked.iter().map(|r| {
            DetectionFrame{
                frame_number: r.frame_number,
                sharpness: r.sharpness,
                blobs_by_region: detect_blobs_in_regions(
                    &r.image, self.background.as_ref(), &self.regions, &self.params),
            }
        }).collect();
        let mut consensus = merge_frames(&frames);
        let summary = MergeSummary::new(&frames, &consensus);
        consensus.resize(self.regions.tube_count(), Vec::new());
        self.store.apply_consensus(consensus)?;

        let frame_numbers = summary.frame_numbers();
        info!("Applied consensus of frames {:?}: {} flies, {} more than the best frame",
              frame_numbers, summary.merged_count, summary.gained_over_best_frame());
        self.events.publish(SessionEvent::ConsensusApplied{frame_numbers});
        Ok(Some(summary))
    }

    /// Adds a manual blob with an explicit height.
    pub fn add_manual(&mut self, tube_index: usize, x: i32, y: i32, height: i32)
                      -> Result<ManualEdit> {
        let edit = self.corrections.add(&mut self.store, tube_index, x, y, height)?;
        self.events.publish(SessionEvent::ManualEditApplied(edit));
        Ok(edit)
    }

    /// Adds a manual blob at frame pixel (`x`, `y`) in tube `tube_index`,
    /// with its height measured up from the tube's bottom edge and clamped to
    /// the tube.
    pub fn add_manual_at(&mut self, tube_index: usize, x: i32, y: i32)
                         -> Result<ManualEdit> {
        let region = self.regions.get(tube_index)?;
        let Some(rect) = region.rect() else {
            return Err(DetectError::InvalidConfiguration(format!(
                "{} is not placed", region.label())));
        };
        let tube_height = rect.height() as i32;
        let height = (rect.top() + tube_height - y).clamp(0, tube_height);
        self.add_manual(tube_index, x, y, height)
    }

    /// Like [add_manual_at()](Self::add_manual_at) for whichever tube
    /// contains the point. None if the point is outside every tube.
    pub fn add_manual_click(&mut self, x: i32, y: i32) -> Result<Option<ManualEdit>> {
        match self.regions.region_at(x, y) {
            Some(index) => Ok(Some(self.add_manual_at(index, x, y)?)),
            None => Ok(None),
        }
    }

    pub fn undo(&mut self) -> UndoOutcome {
        let outcome = self.corrections.undo(&mut self.store);
        if let UndoOutcome::Removed(edit) = outcome {
            self.events.publish(SessionEvent::EditUndone(edit));
        }
        outcome
    }

    /// Clears results, statistics, history and the undo stack. The region
    /// layout, labels and background are kept.
    pub fn reset(&mut self) {
        self.store.reset();
        self.corrections.clear();
        self.events.publish(SessionEvent::ResultsReset);
    }

    /// Prepares for a different recording: results are reset, the
    /// background is dropped and the tubes become unplaced with default
    /// labels.
    pub fn start_new_video(&mut self) {
        self.regions.clear();
        self.background = None;
        self.reset();
        self.events.publish(SessionEvent::RegionsReplaced{
            tube_count: self.regions.tube_count()});
    }

    pub fn export_snapshot(&self) -> ExportSnapshot {
        self.store.export(&self.regions, &self.params)
    }

    /// Computes a `min_area` from the contours found in `frame` and makes it
    /// the active setting. None, leaving parameters unchanged, if no
    /// background is set or no contour was found.
    pub fn optimize_min_area(&mut self, frame: &RgbImage) -> Option<u32> {
        if self.not_ready() {
            return None;
        }
        let areas = contour_areas(frame, self.background.as_ref(), &self.regions,
                                  self.params.threshold);
        let min_area = suggest_min_area(&areas)?;
        self.params.min_area = (min_area as f64).min(self.params.max_area);
        info!("Optimized min_area to {} from {} contours", min_area, areas.len());
        Some(min_area)
    }
}
