//! Output module for persisting crawl results
//!
//! This module handles:
//! - Exporting the ordered thread records as CSV or JSON
//! - Recording crawl statistics

pub mod stats;

pub use stats::{print_statistics, CrawlStats};

use crate::config::OutputFormat;
use crate::extract::format_instant;
use crate::record::ThreadRecord;
use crate::SweepError;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Column order of the CSV export
pub const CSV_HEADER: [&str; 7] = [
    "tid",
    "title",
    "author",
    "post_time",
    "replies",
    "url",
    "content",
];

/// Byte order mark written ahead of the CSV header so spreadsheet tools
/// pick UTF-8
const UTF8_BOM: &str = "\u{feff}";

/// Writes records to `path` in the given format
///
/// Records are written in the order given; the crawler hands them over
/// newest first.
pub fn write_records(
    path: &Path,
    format: OutputFormat,
    records: &[ThreadRecord],
) -> Result<(), SweepError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    match format {
        OutputFormat::Csv => write_csv(records, &mut writer)?,
        OutputFormat::Json => write_json(records, &mut writer)?,
    }

    writer.flush()?;
    tracing::info!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

/// Writes records as UTF-8 CSV with a leading BOM
pub fn write_csv<W: Write>(records: &[ThreadRecord], mut w: W) -> io::Result<()> {
    write!(w, "{}", UTF8_BOM)?;
    write_row(&mut w, &CSV_HEADER)?;

    for record in records {
        let summary = &record.summary;
        let post_time = format_instant(&summary.post_time);
        let replies = summary.replies.to_string();
        write_row(
            &mut w,
            &[
                summary.tid.as_str(),
                summary.title.as_str(),
                summary.author.as_str(),
                post_time.as_str(),
                replies.as_str(),
                summary.url.as_str(),
                record.content.as_str(),
            ],
        )?;
    }

    Ok(())
}

/// Writes records as a pretty-printed JSON array
pub fn write_json<W: Write>(records: &[ThreadRecord], w: W) -> Result<(), SweepError> {
    serde_json::to_writer_pretty(w, records)?;
    Ok(())
}

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Writes one CSV row, quoting fields as RFC 4180 requires
fn write_row<W: Write>(mut w: W, row: &[&str]) -> io::Result<()> {
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            write!(w, ",")?;
        }
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            write!(w, "{}", cell)?;
        }
    }
    write!(w, "\r\n")
}
