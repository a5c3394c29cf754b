// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Writers for the three export files produced from an [ExportSnapshot]:
//!
//! * raw CSV: per tube the label, maximum and average height, then every
//!   height in the detection history;
//! * optimized JSON: the full snapshot including region geometry, genotype
//!   ranking and detection parameters;
//! * percentage CSV: each fly of the current results as a percentage of its
//!   tube's height, one column per tube.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;

use crate::error::Result;
use crate::store::ExportSnapshot;

// Quotes a CSV field when it contains a separator, quote or line break.
fn csv_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

fn write_csv_row<W: Write>(writer: &mut W, fields: &[String]) -> Result<()> {
    let row: Vec<Cow<str>> = fields.iter().map(|f| csv_field(f)).collect();
    writeln!(writer, "{}", row.join(","))?;
    Ok(())
}

/// Writes the raw CSV. Rows with a shorter history are padded with empty
/// cells.
pub fn write_raw_csv<W: Write>(snapshot: &ExportSnapshot, writer: &mut W) -> Result<()> {
    let sample_count = snapshot.detection_history.iter().map(Vec::len).max().unwrap_or(0);
    let mut header: Vec<String> = ["tube_number", "label", "max_height", "avg_height"]
        .iter().map(|s| s.to_string()).collect();
    header.extend((1..=sample_count).map(|i| format!("sample_{}", i)));
    write_csv_row(writer, &header)?;

    for i in 0..snapshot.tube_count {
        let history = snapshot.detection_history.get(i).map_or(&[][..], Vec::as_slice);
        let mut row = vec![
            (i + 1).to_string(),
            snapshot.genotype_names.get(i).cloned().unwrap_or_default(),
            snapshot.max_heights.get(i).copied().unwrap_or(0).to_string(),
            format!("{:?}", snapshot.avg_heights.get(i).copied().unwrap_or(0.0)),
        ];
        row.extend(history.iter().map(i32::to_string));
        row.resize(header.len(), String::new());
        write_csv_row(writer, &row)?;
    }
    Ok(())
}

pub fn write_optimized_json<W: Write>(snapshot: &ExportSnapshot, writer: &mut W)
                                      -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, snapshot)?;
    writeln!(writer)?;
    Ok(())
}

fn percentage_cell(heights: &[i32], fly: usize, tube_height: u32) -> String {
    match heights.get(fly) {
        Some(&height) if tube_height > 0 =>
            format!("{:.1}%", height as f64 / tube_height as f64 * 100.0),
        _ => "-".to_string(),
    }
}

/// Writes the percentage CSV: row `i` holds fly `i + 1` of every tube, `-`
/// where a tube has fewer flies or no height.
pub fn write_percentage_csv<W: Write>(snapshot: &ExportSnapshot, writer: &mut W)
                                      -> Result<()> {
    let fly_count = snapshot.fly_heights.iter().map(Vec::len).max().unwrap_or(0);
    let mut header = vec!["fly_number".to_string()];
    header.extend(snapshot.genotype_names.iter().cloned());
    write_csv_row(writer, &header)?;

    for fly in 0..fly_count {
        let mut row = vec![format!("fly_{}", fly + 1)];
        for tube in 0..snapshot.tube_count {
            let heights = snapshot.fly_heights.get(tube).map_or(&[][..], Vec::as_slice);
            let tube_height = snapshot.tube_heights.get(tube).copied().unwrap_or(0);
            row.push(percentage_cell(heights, fly, tube_height));
        }
        write_csv_row(writer, &row)?;
    }
    Ok(())
}

fn sibling_path(csv_path: &Path, suffix: &str) -> PathBuf {
    let stem = csv_path.file_stem().map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    csv_path.with_file_name(format!("{}{}", stem, suffix))
}

fn write_file<F>(path: &Path, write: F) -> Result<()>
where F: FnOnce(&mut BufWriter<File>) -> Result<()>
{
    let mut writer = BufWriter::new(File::create(path)?);
    write(&mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Writes the raw CSV to `csv_path` and, next to it,
/// `<stem>_optimized.json` and `<stem>_percentage.csv`.
///
/// # Returns
/// The paths of the raw CSV, JSON and percentage CSV files, in that order.
pub fn export_all(snapshot: &ExportSnapshot, csv_path: &Path) -> Result<[PathBuf; 3]> {
    let json_path = sibling_path(csv_path, "_optimized.json");
    let percentage_path = sibling_path(csv_path, "_percentage.csv");
    write_file(csv_path, |w| write_raw_csv(snapshot, w))?;
    write_file(&json_path, |w| write_optimized_json(snapshot, w))?;
    write_file(&percentage_path, |w| write_percentage_csv(snapshot, w))?;
    info!("Exported results to {:?}, {:?} and {:?}",
          csv_path, json_path, percentage_path);
    Ok([csv_path.to_path_buf(), json_path, percentage_path])
}
