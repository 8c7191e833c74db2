//! Writing the merged flows.

use anyhow::{Context as _, Result};
use flowmerge_core::{FlowRecord, MergeBatch, Timestamp};
use serde::Serialize;
use serde_json::Value;
use std::{
    fs::File,
    io::{BufWriter, Write as _},
    num::NonZeroUsize,
    path::{Path, PathBuf},
};
use tracing::info;

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Cannot create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("Cannot write {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("Cannot write {}", path.display()))
}

/// Write the final batch, in total order, as a JSON array.
pub fn write_flows(path: &Path, batch: &MergeBatch) -> Result<()> {
    write_json(path, batch)?;
    info!(flows = batch.len(), path = %path.display(), "merged flows written");
    Ok(())
}

/// `<dir>/<stem><index>.json` for `dir/stem.ext`.
pub fn section_path(output: &Path, index: usize) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!("{stem}{index}.json"))
}

/// Split the flows in `sections` time sections of equal length, between
/// the earliest `t_first` and the latest `t_last`.
///
/// A flow crossing a section boundary is cut at the boundary; each piece
/// but the last gets `in_bytes` prorated by its share of the flow
/// duration (rounded down), the last piece gets the remainder. The
/// `collector` and `in_packets` fields are not part of the sections.
pub fn split_sections(batch: &MergeBatch, sections: NonZeroUsize) -> Result<Vec<Vec<Value>>> {
    let sections = sections.get();
    let mut split = vec![Vec::new(); sections];

    let Some(start) = batch.iter().map(|flow| flow.t_first).min() else {
        return Ok(split);
    };
    let end = batch
        .iter()
        .map(|flow| flow.t_last.max(flow.t_first))
        .max()
        .unwrap_or(start);

    let span = i128::from(end.as_micros() - start.as_micros());
    let boundaries: Vec<Timestamp> = (1..sections)
        .map(|k| {
            let offset = span * k as i128 / sections as i128;
            Timestamp::from_micros(start.as_micros() + offset as i64)
        })
        .collect();

    for flow in batch {
        for (section, piece) in cut(flow, &boundaries) {
            split[section].push(section_record(piece)?);
        }
    }

    Ok(split)
}

fn cut(flow: &FlowRecord, boundaries: &[Timestamp]) -> Vec<(usize, FlowRecord)> {
    let t_last = flow.t_last.max(flow.t_first);
    let duration = u128::try_from(t_last.as_micros() - flow.t_first.as_micros()).unwrap_or(0);

    let mut section = boundaries.iter().filter(|b| flow.t_first >= **b).count();
    let mut piece_start = flow.t_first;
    let mut remaining = flow.in_bytes;
    let mut pieces = Vec::new();

    while let Some(&boundary) = boundaries.get(section)
        && t_last > boundary
    {
        let elapsed = u128::try_from(boundary.as_micros() - piece_start.as_micros()).unwrap_or(0);
        let bytes = u128::from(flow.in_bytes) * elapsed / duration.max(1);
        let bytes = u64::try_from(bytes).unwrap_or(u64::MAX).min(remaining);
        remaining -= bytes;

        let mut piece = flow.clone();
        piece.t_first = piece_start;
        piece.t_last = boundary;
        piece.in_bytes = bytes;
        pieces.push((section, piece));

        piece_start = boundary;
        section += 1;
    }

    let mut last = flow.clone();
    last.t_first = piece_start;
    last.in_bytes = remaining;
    pieces.push((section, last));

    pieces
}

fn section_record(mut flow: FlowRecord) -> Result<Value> {
    flow.collector = None;
    let mut value = serde_json::to_value(flow)?;
    if let Some(object) = value.as_object_mut() {
        object.remove("in_packets");
    }
    Ok(value)
}

/// Write `sections` files next to `output`, see [`split_sections`].
pub fn write_sections(output: &Path, batch: &MergeBatch, sections: NonZeroUsize) -> Result<()> {
    for (index, section) in split_sections(batch, sections)?.iter().enumerate() {
        let path = section_path(output, index);
        write_json(&path, section)?;
        info!(section = index, flows = section.len(), path = %path.display(), "section written");
    }
    Ok(())
}
