// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Runs frame ranking off the calling thread.
//!
//! Ranking decodes and filters up to `2 * half_window + 1` frames, which is
//! slow enough to stall an interactive caller. The worker takes ownership of
//! the frame source for the duration and hands it back, repositioned at the
//! sharpest frame, together with the ranked frames. The caller then applies
//! them with [ClimbingSession::apply_ranked()](crate::session::ClimbingSession::apply_ranked).

use std::sync::mpsc::{channel, Receiver, TryRecvError};
use std::thread;

use log::{debug, warn};

use crate::error::{DetectError, Result};
use crate::frame_source::FrameSource;
use crate::ranking::{rank_window, RankedFrame};

pub struct RankingReply<S> {
    pub source: S,
    pub target: usize,
    pub frames: Vec<RankedFrame>,
}

pub struct RankingWorker<S> {
    receiver: Receiver<RankingReply<S>>,
}

impl<S: FrameSource + Send + 'static> RankingWorker<S> {
    pub fn spawn(mut source: S, target: usize, half_window: usize)
                 -> Result<RankingWorker<S>> {
        let (sender, receiver) = channel();
        thread::Builder::new()
            .name("ranking_worker".to_string())
            .spawn(move || {
                let frames = rank_window(&mut source, target, half_window);
                debug!("Ranking worker done for target {}", target);
                if sender.send(RankingReply{source, target, frames}).is_err() {
                    warn!("Ranking result for target {} was not collected", target);
                }
            })?;
        Ok(RankingWorker{receiver})
    }

    /// Returns the reply if ranking has finished, None if it is still
    /// running.
    pub fn try_result(&self) -> Result<Option<RankingReply<S>>> {
        match self.receiver.try_recv() {
            Ok(reply) => Ok(Some(reply)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(DetectError::WorkerDisconnected),
        }
    }

    /// Blocks until ranking finishes.
    pub fn wait(self) -> Result<RankingReply<S>> {
        self.receiver.recv().map_err(|_| DetectError::WorkerDisconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use imageproc::drawing::draw_filled_circle_mut;
    use imageproc::rect::Rect;

    use crate::background::BackgroundModel;
    use crate::frame_source::FrameSequence;
    use crate::session::ClimbingSession;

    #[test]
    fn test_worker_ranks_and_returns_source() {
        let frames: Vec<RgbImage> = (0..12).map(|i| {
            let mut frame = RgbImage::from_pixel(32, 32, Rgb([90, 90, 90]));
            if i == 8 {
                draw_filled_circle_mut(&mut frame, (16, 16), 6, Rgb([250, 250, 250]));
            }
            frame
        }).collect();
        let worker = RankingWorker::spawn(FrameSequence::new(frames), 6, 4).unwrap();
        let reply = worker.wait().unwrap();
        assert_eq!(reply.target, 6);
        assert_eq!(reply.frames.iter().map(|f| f.frame_number).collect::<Vec<_>>(),
                   vec![7, 8, 9]);
        assert_eq!(reply.source.position(), 8);
    }

    #[test]
    fn test_worker_result_applies_to_session() {
        let empty = RgbImage::from_pixel(60, 60, Rgb([100, 100, 100]));
        let mut with_fly = empty.clone();
        draw_filled_circle_mut(&mut with_fly, (20, 30), 5, Rgb([255, 255, 255]));

        let mut session = ClimbingSession::new(1).unwrap();
        session.split_capture_area(Rect::at(0, 0).of_size(40, 60)).unwrap();
        session.set_background(BackgroundModel::from_frames(&[empty.clone()]).unwrap());

        let source = FrameSequence::new(vec![empty, with_fly.clone(), with_fly]);
        let worker = RankingWorker::spawn(source, 1, 10).unwrap();
        let reply = loop {
            if let Some(reply) = worker.try_result().unwrap() {
                break reply;
            }
            thread::yield_now();
        };
        let summary = session.apply_ranked(&reply.frames).unwrap().unwrap();
        assert_eq!(summary.frame_numbers(), vec![0, 1, 2]);
        assert_eq!(summary.best_single_frame(), 1);
        assert_eq!(summary.merged_count, 1);
        assert_eq!(session.store().current(0).unwrap().len(), 1);
    }
}
