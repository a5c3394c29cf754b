// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use imageproc::rect::Rect;
use log::info;

use climb_detect::algorithm::DetectionParams;
use climb_detect::annotate::draw_detections;
use climb_detect::background::background_range;
use climb_detect::export::export_all;
use climb_detect::frame_source::{FrameSequence, FrameSource};
use climb_detect::ranking::DEFAULT_HALF_WINDOW;
use climb_detect::regions::{region_rect, DEFAULT_TUBE_COUNT};
use climb_detect::{ClimbingSession, DetectError};

/// Measures fly climbing heights in a recorded climbing assay. The
/// recording is given as a directory of frame images, ordered by file name.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about=None)]
struct Args {
    /// Directory of frame images.
    #[arg(short, long)]
    input: String,

    /// Directory where reports and the annotated frame are written.
    #[arg(short, long)]
    output: String,

    /// Base name of the report files.
    #[arg(long, default_value = "climbing")]
    name: String,

    /// Number of tubes.
    #[arg(short, long, default_value_t = DEFAULT_TUBE_COUNT)]
    tubes: usize,

    /// Capture area "x,y,width,height" divided evenly among the tubes.
    /// Defaults to the whole frame.
    #[arg(short, long, value_parser = parse_area)]
    area: Option<Rect>,

    /// Genotype labels, left to right.
    #[arg(short, long, value_delimiter = ',')]
    labels: Vec<String>,

    /// Intensity difference from background that counts as foreground.
    #[arg(long, default_value_t = DetectionParams::default().threshold)]
    threshold: u8,

    /// Smallest fly area in square pixels.
    #[arg(long, default_value_t = DetectionParams::default().min_area)]
    min_area: f64,

    /// Largest fly area in square pixels.
    #[arg(long, default_value_t = DetectionParams::default().max_area)]
    max_area: f64,

    /// Derive min_area from the flies visible in the target frame.
    #[arg(long, default_value_t = false)]
    optimize_min_area: std::primitive::bool,

    /// Frame to measure. Defaults to the last frame.
    #[arg(long)]
    target: Option<usize>,

    /// Frames on either side of the target that are ranked for sharpness.
    #[arg(long, default_value_t = DEFAULT_HALF_WINDOW)]
    half_window: usize,

    /// First frame of the empty-tube background range.
    #[arg(long, default_value_t = 0)]
    background_start: usize,

    /// Last frame of the background range.
    #[arg(long)]
    background_end: Option<usize>,

    /// Output list of fly positions.
    #[arg(short, long, default_value_t = false)]
    coords: std::primitive::bool,
}

fn parse_area(arg: &str) -> Result<Rect, String> {
    let parts: Vec<&str> = arg.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err(format!("expected x,y,width,height; got '{}'", arg));
    }
    let x = parts[0].parse::<i32>().map_err(|e| e.to_string())?;
    let y = parts[1].parse::<i32>().map_err(|e| e.to_string())?;
    let width = parts[2].parse::<u32>().map_err(|e| e.to_string())?;
    let height = parts[3].parse::<u32>().map_err(|e| e.to_string())?;
    region_rect(x, y, width, height).map_err(|e| e.to_string())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let output_metadata = fs::metadata(&args.output).map_err(|e| {
        format!("Output dir '{}' does not exist? {:?}", args.output, e)
    })?;
    if !output_metadata.is_dir() {
        return Err(format!("Output '{}' must be a directory", args.output).into());
    }

    let analysis_start = Instant::now();
    let mut source = FrameSequence::from_dir(&PathBuf::from(&args.input))?;
    let total = source.total_frame_count();
    let Some(first_frame) = source.get_frame(0) else {
        return Err(format!("No readable frames in '{}'", args.input).into());
    };
    let (width, height) = first_frame.dimensions();

    let mut session = ClimbingSession::new(args.tubes)?;
    session.set_params(DetectionParams{threshold: args.threshold,
                                       min_area: args.min_area,
                                       max_area: args.max_area})?;
    let area = match args.area {
        Some(area) => area,
        None => region_rect(0, 0, width, height)?,
    };
    session.split_capture_area(area)?;
    for (index, label) in args.labels.iter().enumerate().take(args.tubes) {
        session.set_label(index, label)?;
    }

    let (background_start, background_end) =
        background_range(args.background_start, args.background_end, total)?;
    if !session.set_background_from_range(&mut source, background_start,
                                          background_end)? {
        return Err(DetectError::InvalidConfiguration(format!(
            "no background frames in {}..={}",
            background_start, background_end)).into());
    }

    let target = args.target.unwrap_or(total - 1);
    if args.optimize_min_area {
        if let Some(frame) = source.get_frame(target) {
            session.optimize_min_area(&frame);
        }
    }
    let Some(summary) = session.final_frame_detection(
        &mut source, target, args.half_window)? else {
        return Err(format!("No frames near {} could be ranked", target).into());
    };
    info!("WxH: {}x{}; {} frames; measured frames {:?} in {:?}",
          width, height, total, summary.frame_numbers(), analysis_start.elapsed());
    for frame in &summary.frames {
        info!("frame {}: {} flies, sharpness {:.1}",
              frame.frame_number, frame.blob_count, frame.sharpness);
    }
    info!("merged: {} flies, {} more than the best single frame",
          summary.merged_count, summary.gained_over_best_frame());

    let mut report_path = PathBuf::from(&args.output);
    report_path.push(format!("{}.csv", args.name));
    export_all(&session.export_snapshot(), &report_path)?;

    // Scribble regions and fly positions onto the sharpest frame.
    if let Some(mut frame) = source.get_frame(source.position()) {
        draw_detections(&mut frame, session.regions(), session.store());
        let mut annotated_path = PathBuf::from(&args.output);
        annotated_path.push(format!("{}_annotated.png", args.name));
        frame.save(&annotated_path)?;
    }

    let store = session.store();
    for region in session.regions().iter() {
        let stats = store.stats(region.index())?;
        info!("{}: current {}px, max {}px, avg {:.1}px",
              region.label(), stats.current_height, stats.max_height,
              stats.avg_height);
    }
    if args.coords {
        let mut coords_str = String::new();
        coords_str.push_str(format!("# WxH {}x{}\n", width, height).as_str());
        coords_str.push_str("# tube: (x, y, height)\n");
        for region in session.regions().iter() {
            for blob in store.current(region.index())? {
                coords_str.push_str(format!(
                    "{}: ({}, {}, {}),\n", region.index() + 1,
                    blob.x, blob.y, blob.height).as_str());
            }
        }
        info!("{}", coords_str);
    }
    Ok(())
}
