// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Notifications published by a [ClimbingSession](crate::session::ClimbingSession)
//! so displays can refresh without polling.

use std::sync::mpsc::{channel, Receiver, Sender};

use imageproc::rect::Rect;

use crate::corrections::ManualEdit;

#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// Regions were rebuilt: new tube count, auto-split, or bulk placement.
    RegionsReplaced { tube_count: usize },
    RegionMoved { index: usize, rect: Rect },
    LabelChanged { index: usize, label: String },
    BackgroundUpdated { sample_count: usize },
    /// A single frame was detected and recorded.
    FrameDetected { frame_number: usize },
    /// Ranked frames were merged into the current results.
    ConsensusApplied { frame_numbers: Vec<usize> },
    ManualEditApplied(ManualEdit),
    EditUndone(ManualEdit),
    ResultsReset,
}

/// Fan-out of [SessionEvent]s to any number of subscribers.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<Sender<SessionEvent>>,
}

impl EventBus {
    pub fn new() -> EventBus {
        EventBus::default()
    }

    /// Every event published after this call is delivered to the returned
    /// receiver, in publication order.
    pub fn subscribe(&mut self) -> Receiver<SessionEvent> {
        let (sender, receiver) = channel();
        self.subscribers.push(sender);
        receiver
    }

    /// Subscribers whose receiver was dropped are forgotten.
    pub fn publish(&mut self, event: SessionEvent) {
        self.subscribers.retain(|s| s.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
