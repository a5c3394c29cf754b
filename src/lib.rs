// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Fly climbing assay analysis.
//!
//! In a negative geotaxis assay, flies confined to vertical tubes are
//! startled to the bottom and then climb. This crate measures how high each
//! tube's flies get:
//!
//! * [regions] lays out the tubes within the camera frame;
//! * [background] averages frames of the empty setup into a reference;
//! * [algorithm] finds flies as foreground blobs within each tube;
//! * [ranking] picks the best-focused frames around a moment of interest;
//! * [consensus] merges the detections of those frames;
//! * [store] keeps per-tube results and climbing statistics;
//! * [corrections] lets a user add and undo fly positions by hand;
//! * [session] ties these together for one recording;
//! * [export] writes CSV and JSON reports.
//!
//! Video decoding is outside this crate; frames are supplied through the
//! [frame_source::FrameSource] trait.

pub mod algorithm;
pub mod annotate;
pub mod background;
pub mod consensus;
pub mod corrections;
pub mod error;
pub mod events;
pub mod export;
pub mod frame_source;
pub mod histogram_funcs;
pub mod image_funcs;
pub mod ranking;
pub mod regions;
pub mod session;
pub mod store;
pub mod worker;

pub use crate::error::{DetectError, Result};
pub use crate::session::ClimbingSession;
